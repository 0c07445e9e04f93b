//! Versus - structured comparisons with AI-assisted property extraction
//!
//! A comparison defines typed properties; contenders carry values for them.
//! The `ai` module talks to a configured provider (Anthropic or OpenAI through
//! a relay, or a local Ollama server) and turns its replies into property
//! values that an [`AnalysisSession`] merges into a contender with undo.
//!
//! # Quick Start
//!
//! ```no_run
//! use versus::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DocumentStore::open("versus-data")?;
//! let registry = ProviderRegistry::load(Box::new(store.clone()), "http://127.0.0.1:8787")?;
//!
//! let comparison = store.comparisons()?.remove(0);
//! let contender = store.contenders_of(comparison.id)?.remove(0);
//!
//! let mut session = AnalysisSession::new(contender);
//! let outcome = session
//!     .run(AnalysisKind::ExtractProperties, &comparison, &registry, &store, &NoProgress)
//!     .await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod model;
pub mod orchestrator;
pub mod storage;

pub use model::{
    Attachment, Comparison, Contender, PropertyDefinition, PropertyType, PropertyValue,
};
pub use orchestrator::{
    AnalysisOutcome, AnalysisSession, ContenderStore, MergeReport, SessionError, SessionState,
};
pub use storage::{Collection, DocumentStore, MirrorClient, Snapshot, StoreError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::ai::{
        AIError, AnalysisKind, NoProgress, ProgressObserver, ProviderConfig, ProviderKind,
        ProviderRegistry,
    };
    pub use crate::{
        AnalysisOutcome, AnalysisSession, Comparison, Contender, DocumentStore, PropertyType,
        PropertyValue, SessionError,
    };
}
