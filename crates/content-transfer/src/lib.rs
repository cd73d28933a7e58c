//! Engine for moving content between two projects through pluggable
//! providers.
//!
//! A transfer pipes five kinds of records (schemas, entities, assets, links,
//! configuration) from a [`SourceProvider`] to a [`DestinationProvider`].
//! Before anything is written the engine checks that the two projects are
//! compatible: version numbers under a configurable [`VersionMatching`]
//! strategy and content schemas under a [`SchemaMatching`] strategy. Stages
//! stream record by record over bounded channels, so a slow destination
//! throttles the source instead of buffering the dataset in memory, and the
//! engine publishes live progress events while it runs.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_transfer::{
//!     create_transfer_engine, DestinationProvider, SourceProvider, TransferOptions,
//! };
//!
//! # struct ExportFile;
//! # impl SourceProvider for ExportFile {
//! #     fn name(&self) -> &str { "export-file" }
//! # }
//! # struct LocalProject;
//! # impl DestinationProvider for LocalProject {
//! #     fn name(&self) -> &str { "local-project" }
//! # }
//! # async fn run() -> content_transfer::Result<()> {
//! let source: Arc<dyn SourceProvider> = Arc::new(ExportFile);
//! let destination: Arc<dyn DestinationProvider> = Arc::new(LocalProject);
//!
//! let mut engine = create_transfer_engine(source, destination, TransferOptions::default())?;
//!
//! let mut events = engine.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{}: {:?}", event.stage, event.kind);
//!     }
//! });
//!
//! let result = engine.transfer().await?;
//! println!("{}", result.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod provider;
pub mod schema;
pub mod version;

mod stage;

pub use config::TransferOptions;
pub use engine::{create_transfer_engine, TransferEngine, TransferResult};
pub use error::{Result, TransferError};
pub use progress::{
    Counters, StageProgress, TransferEvent, TransferEventKind, TransferProgress,
};
pub use provider::{
    AssetRecord, AssetStats, ConfigurationRecord, DestinationProvider, EntityRecord, LinkRecord,
    ProviderKind, ProviderMetadata, RecordSink, RecordStream, SchemaRecord, SourceProvider,
    TransferStage,
};
pub use schema::{EntitySchema, SchemaDiff, SchemaDiffKind, SchemaMap, SchemaMatching};
pub use version::{assert_versions_compatible, VersionMatching};
