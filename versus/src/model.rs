//! Comparison data model
//!
//! A comparison defines typed properties; each contender in it carries
//! per-property values keyed by the property's `key`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Value vocabulary shared by property definitions and AI extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Text,
    Number,
    Rating,
    Datetime,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Number => "number",
            PropertyType::Rating => "rating",
            PropertyType::Datetime => "datetime",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(PropertyType::Text),
            "number" | "numeric" => Ok(PropertyType::Number),
            "rating" => Ok(PropertyType::Rating),
            "datetime" | "date" => Ok(PropertyType::Datetime),
            other => Err(format!("unknown property type: {}", other)),
        }
    }
}

/// A scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    /// 1 to 5 inclusive
    Rating(u8),
    Datetime(DateTime<Utc>),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Text(_) => PropertyType::Text,
            PropertyValue::Number(_) => PropertyType::Number,
            PropertyValue::Rating(_) => PropertyType::Rating,
            PropertyValue::Datetime(_) => PropertyType::Datetime,
        }
    }

    /// Coerce a loosely typed JSON value (as returned by a provider) into the
    /// declared property type. Returns `None` when the value cannot represent
    /// that type.
    pub fn coerce(value: &serde_json::Value, property_type: PropertyType) -> Option<Self> {
        use serde_json::Value;

        match property_type {
            PropertyType::Text => match value {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(PropertyValue::Text(s.trim().to_string())),
                Value::Number(n) => Some(PropertyValue::Text(n.to_string())),
                Value::Bool(b) => Some(PropertyValue::Text(b.to_string())),
                other => Some(PropertyValue::Text(other.to_string())),
            },
            PropertyType::Number => match value {
                Value::Number(n) => n.as_f64().map(PropertyValue::Number),
                Value::String(s) => parse_number(s).map(PropertyValue::Number),
                _ => None,
            },
            PropertyType::Rating => {
                let raw = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => parse_number(s),
                    _ => None,
                }?;
                let rounded = raw.round();
                if (1.0..=5.0).contains(&rounded) {
                    Some(PropertyValue::Rating(rounded as u8))
                } else {
                    None
                }
            }
            PropertyType::Datetime => match value {
                Value::String(s) => parse_datetime(s).map(PropertyValue::Datetime),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
                    .map(PropertyValue::Datetime),
                _ => None,
            },
        }
    }

    /// Parse user input for a declared type (used by the CLI).
    pub fn parse_as(input: &str, property_type: PropertyType) -> Option<Self> {
        Self::coerce(&serde_json::Value::String(input.to_string()), property_type)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::Rating(r) => write!(f, "{}/5", r),
            PropertyValue::Datetime(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

/// Reads the first numeric token, skipping a currency prefix and dropping
/// thousands separators ("$1,299.00" -> 1299.0, "4.5/5" -> 4.5, "12 kg" -> 12.0).
fn parse_number(s: &str) -> Option<f64> {
    let bytes = s.trim().as_bytes();
    let digit_at = |i: usize| bytes.get(i).map_or(false, |b| b.is_ascii_digit());

    let starts_number = |i: usize| match bytes[i] {
        b if b.is_ascii_digit() => true,
        b'.' => digit_at(i + 1),
        b'-' => digit_at(i + 1) || (bytes.get(i + 1) == Some(&b'.') && digit_at(i + 2)),
        _ => false,
    };
    let start = (0..bytes.len()).find(|&i| starts_number(i))?;

    let mut token = String::new();
    let mut i = start;
    if bytes[i] == b'-' {
        token.push('-');
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b if b.is_ascii_digit() => token.push(b as char),
            b',' if digit_at(i + 1) && token.ends_with(|c: char| c.is_ascii_digit()) => {}
            _ => break,
        }
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') && digit_at(i + 1) {
        token.push('.');
        i += 1;
        while digit_at(i) {
            token.push(bytes[i] as char);
            i += 1;
        }
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let sign = matches!(bytes.get(i + 1), Some(b'+' | b'-'));
        let first = if sign { i + 2 } else { i + 1 };
        if digit_at(first) {
            token.push('e');
            if sign {
                token.push(bytes[i + 1] as char);
            }
            i = first;
            while digit_at(i) {
                token.push(bytes[i] as char);
                i += 1;
            }
        }
    }
    token.parse::<f64>().ok()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// A property configured on a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Storage key in each contender's property map
    pub key: String,
    /// Human-readable name, used for matching AI output
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        let name = name.into();
        Self {
            key: slug(&name),
            name,
            property_type,
        }
    }
}

/// Lowercase key derived from a display name ("Battery Life" -> "battery_life").
pub fn slug(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut last_sep = true;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            key.extend(c.to_lowercase());
            last_sep = false;
        } else if !last_sep {
            key.push('_');
            last_sep = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

/// Base64 document or image attached to a contender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub media_type: String,
    /// Base64 payload without a `data:` prefix
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comparison {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            properties: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a property, replacing an existing one with the same key.
    pub fn add_property(&mut self, definition: PropertyDefinition) {
        match self.properties.iter_mut().find(|p| p.key == definition.key) {
            Some(existing) => *existing = definition,
            None => self.properties.push(definition),
        }
        self.updated_at = Utc::now();
    }

    pub fn property(&self, key: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// An item being compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contender {
    pub id: Uuid,
    pub comparison_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contender {
    pub fn new(comparison_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            comparison_id,
            name: name.into(),
            description: None,
            link: None,
            attachment: None,
            properties: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set one property value and bump `updated_at`.
    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    /// True when there is anything an analysis could work from.
    pub fn has_analyzable_content(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        self.attachment.is_some()
            || filled(&self.link)
            || filled(&self.description)
            || !self.name.trim().is_empty()
    }
}
