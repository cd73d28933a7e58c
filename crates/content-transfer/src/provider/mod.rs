//! Provider contract: what the engine calls on the two sides of a transfer.
//!
//! A provider is an abstract capability set, not a concrete transport. The
//! engine only ever talks to [`SourceProvider`] and [`DestinationProvider`]
//! trait objects; how a provider reads an export archive, queries a database
//! or speaks HTTP is its own concern. Every lifecycle hook and stream factory
//! has an `Ok`-default implementation, so providers implement only what they
//! support. A missing stream/sink pair means that stage is skipped, not an
//! error.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TransferError};
use crate::schema::SchemaMap;

/// One of the five transfer stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Schemas,
    Entities,
    Assets,
    Links,
    Configuration,
}

impl TransferStage {
    /// All stages in the fixed order the engine runs them.
    pub const ALL: [TransferStage; 5] = [
        TransferStage::Schemas,
        TransferStage::Entities,
        TransferStage::Assets,
        TransferStage::Links,
        TransferStage::Configuration,
    ];
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Schemas => "schemas",
            TransferStage::Entities => "entities",
            TransferStage::Assets => "assets",
            TransferStage::Links => "links",
            TransferStage::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Role a provider plays in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Source,
    Destination,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Source => f.write_str("source"),
            ProviderKind::Destination => f.write_str("destination"),
        }
    }
}

/// Metadata a provider reports about the project it wraps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Project version, checked against the destination's version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Any additional provider-specific metadata.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProviderMetadata {
    /// Metadata carrying only a project version.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// A schema definition flowing through the schemas stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Model category, the aggregation key for schema progress.
    #[serde(rename = "modelType")]
    pub model_type: String,

    /// The schema body. Should be a JSON object.
    #[serde(flatten)]
    pub data: Value,
}

/// An entity flowing through the entities stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity-type uid, the aggregation key for entity progress.
    #[serde(rename = "type")]
    pub entity_type: String,

    /// The entity body. Should be a JSON object.
    #[serde(flatten)]
    pub data: Value,
}

impl EntityRecord {
    pub fn new(entity_type: impl Into<String>, data: Value) -> Self {
        Self {
            entity_type: entity_type.into(),
            data,
        }
    }
}

/// A media file flowing through the assets stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub filename: String,
    pub stats: AssetStats,

    /// Provider-specific payload (chunk handles, upload metadata).
    #[serde(flatten)]
    pub data: Value,
}

/// File statistics for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStats {
    /// File size in bytes, used as the progress byte metric.
    pub size: u64,
}

impl AssetRecord {
    pub fn new(filename: impl Into<String>, size: u64, data: Value) -> Self {
        Self {
            filename: filename.into(),
            stats: AssetStats { size },
            data,
        }
    }

    /// File extension with leading dot (`.jpg`), the aggregation key for
    /// asset progress. Empty for extensionless files.
    pub fn extension(&self) -> String {
        match Path::new(&self.filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{ext}"),
            None => String::new(),
        }
    }
}

/// An opaque relational link flowing through the links stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord(pub Value);

/// An opaque configuration entry flowing through the configuration stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord(pub Value);

/// A lazy sequence of stage records produced by a source provider.
///
/// The bounded channel is the backpressure boundary: when the destination
/// stops pulling, the channel fills and the producing task suspends on
/// `send`.
pub type RecordStream<T> = mpsc::Receiver<Result<T>>;

/// A writable sink produced by a destination provider for one stage.
///
/// Records are pushed through the bounded sender; the provider resolves the
/// completion channel once its write side has fully committed (or failed).
/// Dropping the sender is the end-of-stream signal.
pub struct RecordSink<T> {
    tx: mpsc::Sender<T>,
    done: oneshot::Receiver<Result<()>>,
}

impl<T: Send + 'static> RecordSink<T> {
    /// Spawn a consumer task and wire it into a sink.
    ///
    /// `consume` receives the channel's read side and must drain it until the
    /// sender closes, returning once every record is committed. `capacity`
    /// bounds the in-flight buffer and must be at least 1.
    pub fn spawn<F, Fut>(capacity: usize, consume: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let (done_tx, done) = oneshot::channel();

        tokio::spawn(async move {
            let _ = done_tx.send(consume(rx).await);
        });

        Self { tx, done }
    }
}

impl<T> RecordSink<T> {
    /// Build a sink from an already wired channel pair.
    pub fn from_parts(tx: mpsc::Sender<T>, done: oneshot::Receiver<Result<()>>) -> Self {
        Self { tx, done }
    }

    pub(crate) fn into_parts(self) -> (mpsc::Sender<T>, oneshot::Receiver<Result<()>>) {
        (self.tx, self.done)
    }
}

/// The reading side of a transfer.
///
/// All hooks and stream factories are optional: the defaults report no
/// metadata, no schemas and no streams, and succeed as no-ops.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Human-readable identifier, used in error messages.
    fn name(&self) -> &str;

    /// Role tag, asserted by the engine at construction.
    fn kind(&self) -> ProviderKind {
        ProviderKind::Source
    }

    /// Provider-populated results, surfaced unchanged in the final output.
    fn results(&self) -> Value {
        Value::Null
    }

    async fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn before_transfer(&self) -> Result<()> {
        Ok(())
    }

    /// Project metadata used by the integrity check.
    async fn metadata(&self) -> Result<Option<ProviderMetadata>> {
        Ok(None)
    }

    /// Schema map used by the integrity check.
    async fn schemas(&self) -> Result<Option<SchemaMap>> {
        Ok(None)
    }

    async fn stream_schemas(&self) -> Result<Option<RecordStream<SchemaRecord>>> {
        Ok(None)
    }

    async fn stream_entities(&self) -> Result<Option<RecordStream<EntityRecord>>> {
        Ok(None)
    }

    async fn stream_assets(&self) -> Result<Option<RecordStream<AssetRecord>>> {
        Ok(None)
    }

    async fn stream_links(&self) -> Result<Option<RecordStream<LinkRecord>>> {
        Ok(None)
    }

    async fn stream_configuration(&self) -> Result<Option<RecordStream<ConfigurationRecord>>> {
        Ok(None)
    }
}

/// The writing side of a transfer.
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    /// Human-readable identifier, used in error messages.
    fn name(&self) -> &str;

    /// Role tag, asserted by the engine at construction.
    fn kind(&self) -> ProviderKind {
        ProviderKind::Destination
    }

    /// Provider-populated results, surfaced unchanged in the final output.
    fn results(&self) -> Value {
        Value::Null
    }

    async fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn before_transfer(&self) -> Result<()> {
        Ok(())
    }

    /// Best-effort undo of partial writes after a failed transfer.
    ///
    /// Receives the error that aborted the transfer. The engine does not
    /// attempt any partial undo itself.
    async fn rollback(&self, error: &TransferError) -> Result<()> {
        let _ = error;
        Ok(())
    }

    /// Project metadata used by the integrity check.
    async fn metadata(&self) -> Result<Option<ProviderMetadata>> {
        Ok(None)
    }

    /// Receive the other side's metadata so writes can use source context.
    async fn set_metadata(&self, scope: ProviderKind, metadata: &ProviderMetadata) -> Result<()> {
        let _ = (scope, metadata);
        Ok(())
    }

    /// Schema map used by the integrity check.
    async fn schemas(&self) -> Result<Option<SchemaMap>> {
        Ok(None)
    }

    async fn schemas_sink(&self) -> Result<Option<RecordSink<SchemaRecord>>> {
        Ok(None)
    }

    async fn entities_sink(&self) -> Result<Option<RecordSink<EntityRecord>>> {
        Ok(None)
    }

    async fn assets_sink(&self) -> Result<Option<RecordSink<AssetRecord>>> {
        Ok(None)
    }

    async fn links_sink(&self) -> Result<Option<RecordSink<LinkRecord>>> {
        Ok(None)
    }

    async fn configuration_sink(&self) -> Result<Option<RecordSink<ConfigurationRecord>>> {
        Ok(None)
    }
}
