//! Transfer engine - main workflow orchestrator.
//!
//! Drives a transfer from a source provider to a destination provider:
//! bootstrap → init → integrity check → before-transfer → the five stages in
//! fixed order (schemas, entities, assets, links, configuration) → close.
//! Any failure triggers a best-effort rollback on the destination and the
//! original error is rethrown; no stage is retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::TransferOptions;
use crate::error::{Result, TransferError};
use crate::progress::{StageAggregates, TransferEvent, TransferProgress};
use crate::provider::{
    AssetRecord, DestinationProvider, EntityRecord, ProviderKind, ProviderMetadata, SchemaRecord,
    SourceProvider, TransferStage,
};
use crate::schema::diff_schema_maps;
use crate::stage::run_stage;
use crate::version::assert_versions_compatible;

/// Create a transfer engine after asserting both providers' roles.
pub fn create_transfer_engine(
    source: Arc<dyn SourceProvider>,
    destination: Arc<dyn DestinationProvider>,
    options: TransferOptions,
) -> Result<TransferEngine> {
    TransferEngine::new(source, destination, options)
}

/// Result of a completed transfer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the transfer started.
    pub started_at: DateTime<Utc>,

    /// When the transfer completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Results populated by the source provider, surfaced unchanged.
    pub source: Value,

    /// Results populated by the destination provider, surfaced unchanged.
    pub destination: Value,

    /// The engine's own accounting, per stage.
    pub engine: TransferProgress,
}

impl TransferResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Provider metadata fetched at most once per `transfer()` call.
///
/// The outer `Option` distinguishes "not fetched yet" from "provider reports
/// no metadata".
#[derive(Debug, Default)]
struct MetadataCache {
    source: Option<Option<ProviderMetadata>>,
    destination: Option<Option<ProviderMetadata>>,
}

/// Transfer engine orchestrating a source and a destination provider.
pub struct TransferEngine {
    source: Arc<dyn SourceProvider>,
    destination: Arc<dyn DestinationProvider>,
    options: TransferOptions,
    progress: TransferProgress,
    events: broadcast::Sender<TransferEvent>,
    metadata: MetadataCache,
    last_integrity_failure: Option<TransferError>,
}

impl TransferEngine {
    /// Create a new engine.
    ///
    /// Fails synchronously, before any I/O, when a provider reports a role
    /// that does not match its position.
    pub fn new(
        source: Arc<dyn SourceProvider>,
        destination: Arc<dyn DestinationProvider>,
        options: TransferOptions,
    ) -> Result<Self> {
        if source.kind() != ProviderKind::Source {
            return Err(TransferError::configuration(format!(
                "provider {} cannot be used as a source (reports {})",
                source.name(),
                source.kind()
            )));
        }
        if destination.kind() != ProviderKind::Destination {
            return Err(TransferError::configuration(format!(
                "provider {} cannot be used as a destination (reports {})",
                destination.name(),
                destination.kind()
            )));
        }
        options.validate()?;

        let (events, _) = broadcast::channel(1024);

        Ok(Self {
            source,
            destination,
            options,
            progress: TransferProgress::default(),
            events,
            metadata: MetadataCache::default(),
            last_integrity_failure: None,
        })
    }

    /// Subscribe to the live event stream (`start`, `progress`, `complete`).
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    /// The engine's accounting so far.
    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// The error swallowed by the most recent failed integrity check.
    ///
    /// [`integrity_check`](Self::integrity_check) only reports a boolean;
    /// this side channel keeps the version/schema detail inspectable.
    pub fn last_integrity_failure(&self) -> Option<&TransferError> {
        self.last_integrity_failure.as_ref()
    }

    /// Run the transfer.
    pub async fn transfer(&mut self) -> Result<TransferResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();

        // Metadata is fetched at most once per run.
        self.metadata = MetadataCache::default();
        self.last_integrity_failure = None;

        info!(
            "Starting transfer run {}: {} -> {}",
            run_id,
            self.source.name(),
            self.destination.name()
        );

        if let Err(error) = self.run_to_completion().await {
            warn!("Transfer failed: {error}");
            // Partial writes are the destination's concern; close is skipped.
            if let Err(rollback_error) = self.destination.rollback(&error).await {
                warn!(
                    "Rollback on {} failed: {rollback_error}",
                    self.destination.name()
                );
            }
            return Err(error);
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = TransferResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds,
            source: self.source.results(),
            destination: self.destination.results(),
            engine: self.progress.clone(),
        };

        info!(
            "Transfer completed in {:.1}s ({} stages ran)",
            result.duration_seconds,
            result.engine.stages.len()
        );

        Ok(result)
    }

    async fn run_to_completion(&mut self) -> Result<()> {
        self.bootstrap().await?;
        self.init().await?;

        if !self.integrity_check().await {
            return Err(TransferError::UnableToTransfer {
                source_name: self.source.name().to_string(),
                destination_name: self.destination.name().to_string(),
            });
        }

        self.before_transfer().await?;
        self.run_stages().await?;
        self.close().await
    }

    /// Run both providers' bootstrap hooks concurrently.
    async fn bootstrap(&self) -> Result<()> {
        debug!("Running provider bootstrap hooks");
        try_join(self.source.bootstrap(), self.destination.bootstrap()).await?;
        Ok(())
    }

    /// Fetch and cache both providers' metadata, pushing source context into
    /// the destination so it can use it while writing.
    async fn init(&mut self) -> Result<()> {
        let source_metadata = self.resolve_source_metadata().await?;
        self.resolve_destination_metadata().await?;

        if let Some(metadata) = source_metadata {
            self.destination
                .set_metadata(ProviderKind::Source, &metadata)
                .await?;
        }

        Ok(())
    }

    async fn before_transfer(&self) -> Result<()> {
        debug!("Running provider before-transfer hooks");
        try_join(
            self.source.before_transfer(),
            self.destination.before_transfer(),
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Running provider close hooks");
        try_join(self.source.close(), self.destination.close()).await?;
        Ok(())
    }

    /// Check version and schema compatibility between the providers.
    ///
    /// Returns `true` when both pass. A failure is downgraded to `false`
    /// here; the detail stays available through
    /// [`last_integrity_failure`](Self::last_integrity_failure).
    pub async fn integrity_check(&mut self) -> bool {
        match self.assert_integrity().await {
            Ok(()) => {
                self.last_integrity_failure = None;
                true
            }
            Err(error) => {
                warn!("Integrity check failed: {error}");
                self.last_integrity_failure = Some(error);
                false
            }
        }
    }

    async fn assert_integrity(&mut self) -> Result<()> {
        let source_metadata = self.resolve_source_metadata().await?;
        let destination_metadata = self.resolve_destination_metadata().await?;

        assert_versions_compatible(
            source_metadata.as_ref().and_then(|m| m.version.as_deref()),
            destination_metadata
                .as_ref()
                .and_then(|m| m.version.as_deref()),
            self.options.version_matching,
        )?;

        let (source_schemas, destination_schemas) =
            try_join(self.source.schemas(), self.destination.schemas()).await?;

        if let (Some(source_schemas), Some(destination_schemas)) =
            (source_schemas, destination_schemas)
        {
            let diffs = diff_schema_maps(
                &source_schemas,
                &destination_schemas,
                self.options.schemas_matching,
            );
            if !diffs.is_empty() {
                return Err(TransferError::SchemaMismatch { diffs });
            }
        }

        Ok(())
    }

    async fn resolve_source_metadata(&mut self) -> Result<Option<ProviderMetadata>> {
        if let Some(cached) = &self.metadata.source {
            return Ok(cached.clone());
        }
        let fetched = self.source.metadata().await?;
        self.metadata.source = Some(fetched.clone());
        Ok(fetched)
    }

    async fn resolve_destination_metadata(&mut self) -> Result<Option<ProviderMetadata>> {
        if let Some(cached) = &self.metadata.destination {
            return Ok(cached.clone());
        }
        let fetched = self.destination.metadata().await?;
        self.metadata.destination = Some(fetched.clone());
        Ok(fetched)
    }

    /// Run the five stages strictly in order.
    async fn run_stages(&mut self) -> Result<()> {
        for stage in TransferStage::ALL {
            if !self.options.stage_enabled(stage) {
                debug!("{stage}: stage excluded by options");
                continue;
            }
            match stage {
                TransferStage::Schemas => self.transfer_schemas().await?,
                TransferStage::Entities => self.transfer_entities().await?,
                TransferStage::Assets => self.transfer_assets().await?,
                TransferStage::Links => self.transfer_links().await?,
                TransferStage::Configuration => self.transfer_configuration().await?,
            }
        }
        Ok(())
    }

    async fn transfer_schemas(&mut self) -> Result<()> {
        let Some(stream) = self.source.stream_schemas().await? else {
            debug!("schemas: stage skipped, source provides no stream");
            return Ok(());
        };
        let Some(sink) = self.destination.schemas_sink().await? else {
            debug!("schemas: stage skipped, destination provides no sink");
            return Ok(());
        };

        run_stage(
            TransferStage::Schemas,
            stream,
            sink,
            &mut self.progress,
            &self.events,
            StageAggregates::keyed(|record: &SchemaRecord| record.model_type.clone()),
            self.options.throttle(),
        )
        .await
    }

    async fn transfer_entities(&mut self) -> Result<()> {
        let Some(stream) = self.source.stream_entities().await? else {
            debug!("entities: stage skipped, source provides no stream");
            return Ok(());
        };
        let Some(sink) = self.destination.entities_sink().await? else {
            debug!("entities: stage skipped, destination provides no sink");
            return Ok(());
        };

        run_stage(
            TransferStage::Entities,
            stream,
            sink,
            &mut self.progress,
            &self.events,
            StageAggregates::keyed(|record: &EntityRecord| record.entity_type.clone()),
            self.options.throttle(),
        )
        .await
    }

    async fn transfer_assets(&mut self) -> Result<()> {
        let Some(stream) = self.source.stream_assets().await? else {
            debug!("assets: stage skipped, source provides no stream");
            return Ok(());
        };
        let Some(sink) = self.destination.assets_sink().await? else {
            debug!("assets: stage skipped, destination provides no sink");
            return Ok(());
        };

        run_stage(
            TransferStage::Assets,
            stream,
            sink,
            &mut self.progress,
            &self.events,
            StageAggregates::keyed_with_size(
                |record: &AssetRecord| record.extension(),
                |record: &AssetRecord| record.stats.size,
            ),
            self.options.throttle(),
        )
        .await
    }

    async fn transfer_links(&mut self) -> Result<()> {
        let Some(stream) = self.source.stream_links().await? else {
            debug!("links: stage skipped, source provides no stream");
            return Ok(());
        };
        let Some(sink) = self.destination.links_sink().await? else {
            debug!("links: stage skipped, destination provides no sink");
            return Ok(());
        };

        run_stage(
            TransferStage::Links,
            stream,
            sink,
            &mut self.progress,
            &self.events,
            StageAggregates::none(),
            self.options.throttle(),
        )
        .await
    }

    async fn transfer_configuration(&mut self) -> Result<()> {
        let Some(stream) = self.source.stream_configuration().await? else {
            debug!("configuration: stage skipped, source provides no stream");
            return Ok(());
        };
        let Some(sink) = self.destination.configuration_sink().await? else {
            debug!("configuration: stage skipped, destination provides no sink");
            return Ok(());
        };

        run_stage(
            TransferStage::Configuration,
            stream,
            sink,
            &mut self.progress,
            &self.events,
            StageAggregates::none(),
            self.options.throttle(),
        )
        .await
    }
}
