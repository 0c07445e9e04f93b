//! Analysis orchestration for one contender edit session.
//!
//! ```text
//! Idle ──▶ Validating ──▶ Running ──▶ Merged
//!              │              │
//!              └──────────────┴──────▶ Failed
//! ```
//!
//! A session validates the provider configuration and the contender, checks
//! connectivity, runs one analysis, merges the returned values into the
//! contender's properties and keeps a snapshot for undo.

use chrono::Utc;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::ai::adapter::ProviderAdapter;
use crate::ai::progress::ProgressObserver;
use crate::ai::provider::ProviderKind;
use crate::ai::registry::ProviderRegistry;
use crate::ai::types::{
    AnalysisContent, AnalysisContext, AnalysisKind, AnalysisOutput, AnalysisRequest,
};
use crate::ai::AIError;
use crate::model::{Comparison, Contender, PropertyDefinition, PropertyValue};
use crate::storage::{DocumentStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Validating,
    Running,
    Merged,
    Failed,
}

/// Why an analysis did not produce a merge. Messages are shown to the user as-is.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("AI analysis is not set up. Choose a provider and enable it in the AI settings.")]
    ProviderUnavailable,
    #[error("The local provider needs a server endpoint.")]
    EndpointMissing,
    #[error("Add an API key for {} in the AI settings.", .0.display_name())]
    CredentialMissing(ProviderKind),
    #[error("Choose a model for {} in the AI settings.", .0.display_name())]
    ModelMissing(ProviderKind),
    #[error("This comparison has no properties yet. Add at least one property before analyzing.")]
    NoProperties,
    #[error("Nothing to analyze. Add an attachment, link, name or description first.")]
    NoContent,
    #[error("{0}")]
    ConnectionFailed(String),
    #[error("No property values could be extracted")]
    NothingExtracted,
    #[error("Analysis failed: {0}")]
    Provider(AIError),
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Could not save the contender: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

/// Persistence for merged contenders.
pub trait ContenderStore {
    fn save_contender(&self, contender: &Contender) -> Result<(), StoreError>;
}

impl ContenderStore for DocumentStore {
    fn save_contender(&self, contender: &Contender) -> Result<(), StoreError> {
        DocumentStore::save_contender(self, contender)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    /// Keys whose value differs from before the merge
    pub changed: Vec<String>,
    /// Returned values that landed on a configured property
    pub matched: usize,
    /// Returned names with no matching property, or values of the wrong shape
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisOutcome {
    Merged(MergeReport),
    /// Summary and attachment analyses return text and leave properties alone
    Text(String),
}

pub struct AnalysisSession {
    contender: Contender,
    state: SessionState,
    changed: BTreeSet<String>,
    snapshot: Option<BTreeMap<String, PropertyValue>>,
    custom_instructions: Option<String>,
    abort: Option<AbortRegistration>,
}

impl AnalysisSession {
    pub fn new(contender: Contender) -> Self {
        Self {
            contender,
            state: SessionState::Idle,
            changed: BTreeSet::new(),
            snapshot: None,
            custom_instructions: None,
            abort: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn contender(&self) -> &Contender {
        &self.contender
    }

    pub fn into_contender(self) -> Contender {
        self.contender
    }

    pub fn changed_fields(&self) -> Vec<&str> {
        self.changed.iter().map(String::as_str).collect()
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.changed.contains(key)
    }

    pub fn can_undo(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Returns a handle that cancels the next `run`. Aborting stops waiting on
    /// the provider; a request already sent is not recalled.
    pub fn arm_abort(&mut self) -> AbortHandle {
        let (handle, registration) = AbortHandle::new_pair();
        self.abort = Some(registration);
        handle
    }

    /// Check everything that can be checked without the network.
    pub fn validate(
        &self,
        kind: AnalysisKind,
        comparison: &Comparison,
        registry: &ProviderRegistry,
    ) -> Result<ProviderAdapter, SessionError> {
        let config = registry
            .active_config()
            .filter(|c| c.enabled)
            .ok_or(SessionError::ProviderUnavailable)?;

        if config.kind.is_local() {
            if config.endpoint().is_none() {
                return Err(SessionError::EndpointMissing);
            }
        } else if config.credential().is_none() {
            return Err(SessionError::CredentialMissing(config.kind));
        }
        if config.model().is_none() {
            return Err(SessionError::ModelMissing(config.kind));
        }

        if kind.expects_json() && comparison.properties.is_empty() {
            return Err(SessionError::NoProperties);
        }
        if !self.contender.has_analyzable_content() {
            return Err(SessionError::NoContent);
        }

        registry
            .resolve_adapter()
            .ok_or(SessionError::ProviderUnavailable)
    }

    /// Validate, check connectivity, analyze and merge. A successful merge is
    /// saved to `store` before returning.
    pub async fn run(
        &mut self,
        kind: AnalysisKind,
        comparison: &Comparison,
        registry: &ProviderRegistry,
        store: &dyn ContenderStore,
        observer: &dyn ProgressObserver,
    ) -> Result<AnalysisOutcome, SessionError> {
        self.state = SessionState::Validating;
        let adapter = match self.validate(kind, comparison, registry) {
            Ok(adapter) => adapter,
            Err(e) => {
                self.abort = None;
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        self.state = SessionState::Running;
        let request = self.build_request(kind, comparison);
        let endpoint = registry
            .active_config()
            .and_then(|c| c.endpoint())
            .map(str::to_string);

        let work = async {
            if !adapter.test_connection().await {
                return Err(SessionError::ConnectionFailed(connection_hint(
                    adapter.kind(),
                    endpoint.as_deref(),
                )));
            }
            adapter
                .analyze_with_progress(&request, observer)
                .await
                .map_err(|e| match e {
                    AIError::ParseError(_) if kind.expects_json() => SessionError::NothingExtracted,
                    other => SessionError::Provider(other),
                })
        };

        let result = match self.abort.take() {
            Some(registration) => match Abortable::new(work, registration).await {
                Ok(result) => result,
                Err(_aborted) => {
                    tracing::info!("Analysis of {} cancelled", self.contender.id);
                    self.state = SessionState::Idle;
                    return Err(SessionError::Cancelled);
                }
            },
            None => work.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        if let AnalysisOutput::Summary(text) = output {
            self.state = SessionState::Merged;
            return Ok(AnalysisOutcome::Text(text));
        }

        let report = self.merge_output(&comparison.properties, &output);
        if report.matched == 0 {
            self.state = SessionState::Failed;
            return Err(SessionError::NothingExtracted);
        }

        if let Err(e) = store.save_contender(&self.contender) {
            self.state = SessionState::Failed;
            return Err(e.into());
        }
        tracing::info!(
            "Merged {} value(s) into {} ({} changed)",
            report.matched,
            self.contender.id,
            report.changed.len()
        );
        self.state = SessionState::Merged;
        Ok(AnalysisOutcome::Merged(report))
    }

    fn build_request(&self, kind: AnalysisKind, comparison: &Comparison) -> AnalysisRequest {
        let content = match &self.contender.attachment {
            Some(attachment) => AnalysisContent::Binary(attachment.clone()),
            None => AnalysisContent::text(describe_contender(&self.contender)),
        };
        AnalysisRequest::new(kind, content).with_context(AnalysisContext {
            properties: comparison.properties.clone(),
            comparison_name: Some(comparison.name.clone()),
            item_name: Some(self.contender.name.clone()).filter(|n| !n.trim().is_empty()),
            custom_instructions: self.custom_instructions.clone(),
        })
    }

    /// Merge returned values into the contender. Names match property names
    /// exactly, then property keys; unmatched names and values that do not fit
    /// the property's type are dropped. Replaces the undo snapshot when
    /// anything changed.
    pub fn merge_output(
        &mut self,
        definitions: &[PropertyDefinition],
        output: &AnalysisOutput,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let mut merged = BTreeMap::new();

        for (name, value) in output.named_values() {
            let definition = definitions
                .iter()
                .find(|d| d.name == name)
                .or_else(|| definitions.iter().find(|d| d.key == name));
            let Some(definition) = definition else {
                report.dropped.push(name.to_string());
                continue;
            };
            match PropertyValue::coerce(value, definition.property_type) {
                Some(v) => {
                    merged.insert(definition.key.clone(), v);
                }
                None => report.dropped.push(name.to_string()),
            }
        }
        report.matched = merged.len();

        let prior = self.contender.properties.clone();
        let changed: BTreeSet<String> = merged
            .iter()
            .filter(|(key, value)| prior.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();

        if changed.is_empty() {
            return report;
        }

        self.contender.properties.extend(merged);
        self.contender.updated_at = Utc::now();
        self.snapshot = Some(prior);
        report.changed = changed.iter().cloned().collect();
        self.changed = changed;
        report
    }

    /// Restore every property to its pre-analysis value. Returns false when
    /// there is nothing to undo.
    pub fn undo_all(&mut self) -> bool {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.contender.properties = snapshot;
                self.contender.updated_at = Utc::now();
                self.changed.clear();
                true
            }
            None => false,
        }
    }

    /// Restore one changed property. The snapshot is dropped once no changed
    /// fields remain.
    pub fn undo_field(&mut self, key: &str) -> bool {
        if !self.changed.remove(key) {
            return false;
        }
        if let Some(snapshot) = &self.snapshot {
            match snapshot.get(key) {
                Some(previous) => {
                    self.contender
                        .properties
                        .insert(key.to_string(), previous.clone());
                }
                None => {
                    self.contender.properties.remove(key);
                }
            }
            self.contender.updated_at = Utc::now();
        }
        if self.changed.is_empty() {
            self.snapshot = None;
        }
        true
    }

    /// The user focused a changed field: stop flagging it, keep its value.
    pub fn acknowledge(&mut self, key: &str) -> bool {
        self.changed.remove(key)
    }
}

fn describe_contender(contender: &Contender) -> String {
    let mut parts = Vec::new();
    if !contender.name.trim().is_empty() {
        parts.push(format!("Name: {}", contender.name.trim()));
    }
    if let Some(link) = contender.link.as_deref().filter(|l| !l.trim().is_empty()) {
        parts.push(format!("Link: {}", link.trim()));
    }
    if let Some(description) = contender
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        parts.push(format!("Description:\n{}", description.trim()));
    }
    parts.join("\n")
}

/// User-facing advice after a failed connectivity check.
pub fn connection_hint(kind: ProviderKind, endpoint: Option<&str>) -> String {
    if kind.is_local() {
        format!(
            "Could not reach the local model server at {}. Is it running and reachable from this machine?",
            endpoint.unwrap_or("the configured endpoint")
        )
    } else {
        format!(
            "Could not connect to {}. Check your network connection and that the API key is valid.",
            kind.display_name()
        )
    }
}
