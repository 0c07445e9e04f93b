//! Versus CLI - build comparisons and run AI-assisted property extraction from the command line.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use uuid::Uuid;
use versus::ai::{
    AnalysisKind, OllamaClient, ProgressEvent, ProgressObserver, ProgressPhase, ProviderConfig,
    ProviderKind, ProviderRegistry,
};
use versus::orchestrator::connection_hint;
use versus::{
    AnalysisOutcome, AnalysisSession, Attachment, Comparison, Contender, DocumentStore,
    MirrorClient, PropertyDefinition, PropertyType, PropertyValue,
};

#[derive(Parser)]
#[command(name = "versus")]
#[command(about = "Structured comparisons with AI-assisted property extraction", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the comparison, contender and AI settings documents
    #[arg(long, global = true, env = "VERSUS_DATA_DIR", default_value = "versus-data")]
    data_dir: PathBuf,

    /// Relay used for cloud providers and for mirroring
    #[arg(
        long,
        global = true,
        env = "VERSUS_RELAY_URL",
        default_value = "http://127.0.0.1:8787"
    )]
    relay_url: String,

    /// Mirror every write to the relay's data endpoint (best effort)
    #[arg(long, global = true)]
    mirror: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage AI provider settings
    #[command(subcommand)]
    Providers(ProviderCommand),

    /// Create and inspect comparisons
    #[command(subcommand)]
    Comparison(ComparisonCommand),

    /// Add, edit and inspect contenders
    #[command(subcommand)]
    Contender(ContenderCommand),

    /// Run an AI analysis on a contender and merge the results
    Analyze {
        /// Contender id or name
        #[arg(value_name = "CONTENDER")]
        contender: String,

        /// extract-properties, generate-summary, suggest-values or analyze-attachment
        #[arg(short, long, default_value = "extract-properties")]
        kind: AnalysisKind,

        /// Extra instructions appended to the prompt
        #[arg(long)]
        instructions: Option<String>,

        /// Revert these property keys after merging
        #[arg(long = "undo", value_name = "KEY")]
        undo: Vec<String>,

        /// Revert every merged change (keeps nothing)
        #[arg(long, conflicts_with = "undo")]
        undo_all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ProviderCommand {
    /// Show every configured provider and the active selection
    List {
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Create or update the settings for one provider
    Set {
        /// anthropic, openai or ollama
        kind: ProviderKind,

        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Keep the settings but stop using this provider
        #[arg(long)]
        disable: bool,
    },

    /// Select the provider used for analysis ("none" to turn AI off)
    Activate {
        #[arg(value_name = "KIND")]
        kind: String,
    },

    /// Check that the active provider answers
    Test,

    /// List models installed on a local Ollama server
    Models {
        /// Server to query; defaults to the configured local endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Subcommand)]
enum ComparisonCommand {
    /// Create an empty comparison
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List comparisons
    List,

    /// Add a typed property to a comparison
    AddProperty {
        /// Comparison id or name
        comparison: String,

        /// Property name, e.g. "Battery life"
        name: String,

        /// text, number, rating or datetime
        #[arg(short = 't', long = "type", default_value = "text")]
        property_type: PropertyType,
    },
}

#[derive(Subcommand)]
enum ContenderCommand {
    /// Add a contender to a comparison
    Add {
        /// Comparison id or name
        comparison: String,

        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        link: Option<String>,

        /// Document or image to analyze (pdf, images, plain text)
        #[arg(long, value_name = "FILE")]
        attach: Option<PathBuf>,
    },

    /// List the contenders of a comparison
    List {
        /// Comparison id or name
        comparison: String,
    },

    /// Show a contender and its property values
    Show {
        /// Contender id or name
        contender: String,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Set one property value by hand
    SetValue {
        /// Contender id or name
        contender: String,

        /// Property name or key
        property: String,

        value: String,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

struct App {
    store: DocumentStore,
    relay_url: String,
    mirror: Option<MirrorClient>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut store = DocumentStore::open(&cli.data_dir)
        .with_context(|| format!("cannot open data directory {}", cli.data_dir.display()))?;
    let mirror = cli.mirror.then(|| MirrorClient::new(cli.relay_url.clone()));
    if let Some(mirror) = &mirror {
        store = store.with_mirror(mirror.clone());
    }
    let app = App {
        store,
        relay_url: cli.relay_url,
        mirror,
    };

    match cli.command {
        Commands::Providers(cmd) => handle_providers(&app, cmd).await?,
        Commands::Comparison(cmd) => handle_comparison(&app, cmd)?,
        Commands::Contender(cmd) => handle_contender(&app, cmd)?,
        Commands::Analyze {
            contender,
            kind,
            instructions,
            undo,
            undo_all,
            format,
        } => handle_analyze(&app, &contender, kind, instructions, &undo, undo_all, format).await?,
    }

    sync_mirror(&app).await;
    Ok(())
}

/// Background pushes may not finish before the process exits; push the full
/// snapshot once more and wait for it.
async fn sync_mirror(app: &App) {
    let Some(mirror) = &app.mirror else {
        return;
    };
    let snapshot = match app.store.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Cannot read documents for mirroring: {}", e);
            return;
        }
    };
    if let Err(e) = mirror.push(&snapshot).await {
        tracing::warn!("Mirror sync failed: {}", e);
    }
}

fn load_registry(app: &App) -> Result<ProviderRegistry> {
    ProviderRegistry::load(Box::new(app.store.clone()), app.relay_url.clone())
        .context("cannot load AI settings")
}

async fn handle_providers(app: &App, cmd: ProviderCommand) -> Result<()> {
    let mut registry = load_registry(app)?;

    match cmd {
        ProviderCommand::List { format } => output_providers(&registry, &format)?,
        ProviderCommand::Set {
            kind,
            api_key,
            endpoint,
            model,
            disable,
        } => {
            let mut config = registry
                .provider(kind)
                .cloned()
                .unwrap_or_else(|| ProviderConfig::new(kind));
            if let Some(key) = api_key {
                config.credential = Some(key);
            }
            if let Some(endpoint) = endpoint {
                config.endpoint = Some(endpoint);
            }
            if let Some(model) = model {
                config.model = model;
            }
            config.enabled = !disable;
            let usable = config.is_usable();
            let missing = config.missing_field();
            registry.upsert_provider(config)?;

            println!("Saved {} settings", kind.display_name());
            if !usable {
                match missing {
                    Some(field) => println!("  Not usable yet: missing {}", field),
                    None => println!("  Not usable: provider is disabled"),
                }
            }
        }
        ProviderCommand::Activate { kind } => {
            let selection = match kind.trim().to_lowercase().as_str() {
                "none" | "off" => None,
                other => Some(other.parse::<ProviderKind>().map_err(|e| anyhow!(e))?),
            };
            registry.set_active_provider(selection)?;
            match selection {
                Some(kind) if registry.is_available() => {
                    println!("Active provider: {}", kind.display_name())
                }
                Some(kind) => println!(
                    "Active provider: {} (unavailable until it is configured and enabled)",
                    kind.display_name()
                ),
                None => println!("AI analysis turned off"),
            }
        }
        ProviderCommand::Test => {
            let adapter = registry.resolve_adapter().ok_or_else(|| {
                anyhow!(versus::SessionError::ProviderUnavailable.to_string())
            })?;
            println!(
                "Testing {} ({})...",
                adapter.kind().display_name(),
                adapter.model()
            );
            if !adapter.test_connection().await {
                let endpoint = registry.active_config().and_then(|c| c.endpoint());
                bail!(connection_hint(adapter.kind(), endpoint));
            }
            println!("Connection OK");
        }
        ProviderCommand::Models { endpoint } => {
            let endpoint = endpoint.or_else(|| {
                registry
                    .provider(ProviderKind::Ollama)
                    .and_then(|c| c.endpoint())
                    .map(str::to_string)
            });
            let client = OllamaClient::new(endpoint, None);
            let list = client
                .list_models()
                .await
                .with_context(|| format!("cannot list models at {}", client.base_url()))?;
            if list.models.is_empty() {
                println!("No models installed at {}", client.base_url());
            }
            for model in &list.models {
                let size = model
                    .size
                    .map(|s| format!("{:.1} GB", s as f64 / 1_000_000_000.0))
                    .unwrap_or_default();
                println!(
                    "  {:<28} {:<10} {}",
                    model.name,
                    size,
                    model.family.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn output_providers(registry: &ProviderRegistry, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "status": registry.status(),
                "providers": registry.providers().iter().map(|p| serde_json::json!({
                    "kind": p.kind,
                    "enabled": p.enabled,
                    "model": p.model,
                    "endpoint": p.endpoint(),
                    "hasCredential": p.credential().is_some(),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Human => {
            let active = registry.active_provider();
            if registry.providers().is_empty() {
                println!("No providers configured");
            }
            for config in registry.providers() {
                let marker = if Some(config.kind) == active { "*" } else { " " };
                println!(
                    "{} {:<10} {:<9} model={}",
                    marker,
                    config.kind,
                    if config.enabled { "enabled" } else { "disabled" },
                    config.model
                );
                if let Some(endpoint) = config.endpoint() {
                    println!("    endpoint: {}", endpoint);
                }
                if let Some(key) = config.credential() {
                    println!("    api key:  {}", mask(key));
                }
            }
            println!();
            match active {
                None => println!("Active provider: none"),
                Some(kind) if registry.is_available() => {
                    println!("Active provider: {} (available)", kind)
                }
                Some(kind) => println!("Active provider: {} (unavailable)", kind),
            }
        }
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

fn handle_comparison(app: &App, cmd: ComparisonCommand) -> Result<()> {
    match cmd {
        ComparisonCommand::Create { name, description } => {
            if name.trim().is_empty() {
                bail!("comparison name cannot be empty");
            }
            let mut comparison = Comparison::new(name.trim());
            comparison.description = description;
            app.store.save_comparison(&comparison)?;
            println!("Created comparison {} ({})", comparison.name, comparison.id);
        }
        ComparisonCommand::List => {
            let comparisons = app.store.comparisons()?;
            if comparisons.is_empty() {
                println!("No comparisons yet");
            }
            for comparison in comparisons {
                let count = app.store.contenders_of(comparison.id)?.len();
                println!(
                    "{}  {}  ({} properties, {} contenders)",
                    comparison.id,
                    comparison.name,
                    comparison.properties.len(),
                    count
                );
            }
        }
        ComparisonCommand::AddProperty {
            comparison,
            name,
            property_type,
        } => {
            if name.trim().is_empty() {
                bail!("property name cannot be empty");
            }
            let mut comparison = find_comparison(&app.store, &comparison)?;
            let definition = PropertyDefinition::new(name.trim(), property_type);
            println!(
                "Added property {} ({}) to {}",
                definition.name, definition.property_type, comparison.name
            );
            comparison.add_property(definition);
            app.store.save_comparison(&comparison)?;
        }
    }
    Ok(())
}

fn handle_contender(app: &App, cmd: ContenderCommand) -> Result<()> {
    match cmd {
        ContenderCommand::Add {
            comparison,
            name,
            description,
            link,
            attach,
        } => {
            let comparison = find_comparison(&app.store, &comparison)?;
            let mut contender = Contender::new(comparison.id, name.trim());
            contender.description = description;
            contender.link = link;
            if let Some(path) = attach {
                contender.attachment = Some(read_attachment(&path)?);
            }
            app.store.save_contender(&contender)?;
            println!("Added contender {} ({})", contender.name, contender.id);
        }
        ContenderCommand::List { comparison } => {
            let comparison = find_comparison(&app.store, &comparison)?;
            let contenders = app.store.contenders_of(comparison.id)?;
            if contenders.is_empty() {
                println!("No contenders in {}", comparison.name);
            }
            for contender in contenders {
                println!(
                    "{}  {}  ({} values)",
                    contender.id,
                    contender.name,
                    contender.properties.len()
                );
            }
        }
        ContenderCommand::Show { contender, format } => {
            let contender = find_contender(&app.store, &contender)?;
            let comparison = app.store.comparison(contender.comparison_id)?;
            output_contender(&contender, comparison.as_ref(), &[], &format)?;
        }
        ContenderCommand::SetValue {
            contender,
            property,
            value,
        } => {
            let mut contender = find_contender(&app.store, &contender)?;
            let comparison = app
                .store
                .comparison(contender.comparison_id)?
                .ok_or_else(|| anyhow!("comparison {} not found", contender.comparison_id))?;
            let definition = comparison
                .properties
                .iter()
                .find(|d| d.name == property || d.key == property)
                .ok_or_else(|| anyhow!("{} has no property {}", comparison.name, property))?;
            let parsed = PropertyValue::parse_as(&value, definition.property_type)
                .ok_or_else(|| {
                    anyhow!(
                        "{:?} is not a valid {} value",
                        value,
                        definition.property_type
                    )
                })?;
            println!("{}: {}", definition.name, parsed);
            contender.set_property(definition.key.clone(), parsed);
            app.store.save_contender(&contender)?;
        }
    }
    Ok(())
}

async fn handle_analyze(
    app: &App,
    contender: &str,
    kind: AnalysisKind,
    instructions: Option<String>,
    undo: &[String],
    undo_all: bool,
    format: OutputFormat,
) -> Result<()> {
    let contender = find_contender(&app.store, contender)?;
    let comparison = app
        .store
        .comparison(contender.comparison_id)?
        .ok_or_else(|| anyhow!("comparison {} not found", contender.comparison_id))?;
    let registry = load_registry(app)?;

    let mut session = AnalysisSession::new(contender);
    if let Some(instructions) = instructions {
        session = session.with_instructions(instructions);
    }

    let abort = session.arm_abort();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let outcome = session
        .run(kind, &comparison, &registry, &app.store, &StderrProgress)
        .await?;

    let report = match outcome {
        AnalysisOutcome::Text(text) => {
            match format {
                OutputFormat::Human => println!("{}", text),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "text": text }))?
                ),
            }
            return Ok(());
        }
        AnalysisOutcome::Merged(report) => report,
    };

    if undo_all {
        if session.undo_all() {
            app.store.save_contender(session.contender())?;
            eprintln!("Reverted all changes");
        }
    } else {
        for key in undo {
            if session.undo_field(key) {
                eprintln!("Reverted {}", key);
            } else {
                eprintln!("{} was not changed by this analysis", key);
            }
        }
        if !undo.is_empty() {
            app.store.save_contender(session.contender())?;
        }
    }

    let changed: Vec<&str> = session.changed_fields();
    match format {
        OutputFormat::Human => {
            output_contender(session.contender(), Some(&comparison), &changed, &format)?;
            if !report.dropped.is_empty() {
                println!("\n  Ignored: {}", report.dropped.join(", "));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "contender": session.contender(),
                "changed": changed,
                "dropped": report.dropped,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn output_contender(
    contender: &Contender,
    comparison: Option<&Comparison>,
    changed: &[&str],
    format: &OutputFormat,
) -> Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(contender)?);
        return Ok(());
    }

    println!("\nContender: {}", contender.name);
    println!("{}", "─".repeat(60));
    if let Some(link) = &contender.link {
        println!("  Link: {}", link);
    }
    if let Some(attachment) = &contender.attachment {
        println!(
            "  Attachment: {} ({})",
            attachment.file_name.as_deref().unwrap_or("unnamed"),
            attachment.media_type
        );
    }

    let definitions = comparison.map(|c| c.properties.as_slice()).unwrap_or(&[]);
    if definitions.is_empty() && contender.properties.is_empty() {
        println!("  No properties");
        return Ok(());
    }
    println!();
    for definition in definitions {
        let value = contender
            .properties
            .get(&definition.key)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if changed.contains(&definition.key.as_str()) {
            "  (changed)"
        } else {
            ""
        };
        println!("  {:<20} {}{}", definition.name, value, marker);
    }
    Ok(())
}

struct StderrProgress;

impl ProgressObserver for StderrProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let label = match event.phase {
            ProgressPhase::Preparing => "prepare",
            ProgressPhase::Contacting => "contact",
            ProgressPhase::Processing => "process",
            ProgressPhase::Done => "done",
            ProgressPhase::Error => "error",
        };
        eprintln!("[{}] {}", label, event.message);
    }
}

fn find_comparison(store: &DocumentStore, needle: &str) -> Result<Comparison> {
    let comparisons = store.comparisons()?;
    if let Ok(id) = needle.parse::<Uuid>() {
        if let Some(found) = comparisons.iter().find(|c| c.id == id) {
            return Ok(found.clone());
        }
    }
    let mut matches = comparisons
        .into_iter()
        .filter(|c| c.name.eq_ignore_ascii_case(needle.trim()));
    match (matches.next(), matches.next()) {
        (Some(found), None) => Ok(found),
        (Some(_), Some(_)) => bail!("more than one comparison is named {}; use its id", needle),
        (None, _) => bail!("comparison {} not found", needle),
    }
}

fn find_contender(store: &DocumentStore, needle: &str) -> Result<Contender> {
    let contenders = store.contenders()?;
    if let Ok(id) = needle.parse::<Uuid>() {
        if let Some(found) = contenders.iter().find(|c| c.id == id) {
            return Ok(found.clone());
        }
    }
    let mut matches = contenders
        .into_iter()
        .filter(|c| c.name.eq_ignore_ascii_case(needle.trim()));
    match (matches.next(), matches.next()) {
        (Some(found), None) => Ok(found),
        (Some(_), Some(_)) => bail!("more than one contender is named {}; use its id", needle),
        (None, _) => bail!("contender {} not found", needle),
    }
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let media_type = match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        _ => bail!(
            "unsupported attachment type {:?}; use pdf, png, jpg, gif, webp, txt, md, csv, json or html",
            ext
        ),
    };
    Ok(Attachment {
        media_type: media_type.to_string(),
        data: BASE64.encode(bytes),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    })
}
