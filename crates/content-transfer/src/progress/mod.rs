//! Progress accounting and the live event stream.
//!
//! The [`ProgressTracker`] is a pure observation point inserted between a
//! stage's source stream and destination sink. It counts records and bytes,
//! optionally bucketed by a per-record aggregate key, publishes a snapshot on
//! the shared event channel, and forwards the record unchanged. It never
//! buffers; backpressure from the destination reaches the source through the
//! bounded channel the tracker sits between.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::provider::TransferStage;

/// Count/byte totals for one aggregate bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub count: u64,
    pub bytes: u64,
}

/// Accumulated totals for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub count: u64,
    pub bytes: u64,

    /// Per-key buckets, present only for stages with an aggregate key
    /// (entities by type, assets by extension, schemas by model type).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregates: BTreeMap<String, Counters>,
}

/// Progress for the whole transfer, keyed by stage.
///
/// Monotonically increasing within a single `transfer()` call; stages that
/// never ran have no entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    #[serde(flatten)]
    pub stages: BTreeMap<TransferStage, StageProgress>,
}

impl TransferProgress {
    /// Progress for one stage, if it has started.
    pub fn stage(&self, stage: TransferStage) -> Option<&StageProgress> {
        self.stages.get(&stage)
    }
}

/// Kind of a live transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferEventKind {
    Start,
    Progress,
    Complete,
}

/// A live event published while stages execute.
///
/// `data` is a full snapshot of the progress at emission time.
#[derive(Debug, Clone, Serialize)]
pub struct TransferEvent {
    pub kind: TransferEventKind,
    pub stage: TransferStage,
    pub data: TransferProgress,
}

pub(crate) fn emit_event(
    events: &broadcast::Sender<TransferEvent>,
    kind: TransferEventKind,
    stage: TransferStage,
    progress: &TransferProgress,
) {
    // No subscribers is fine; events are fire-and-forget.
    let _ = events.send(TransferEvent {
        kind,
        stage,
        data: progress.clone(),
    });
}

/// Aggregate key/size functions for one stage.
///
/// `key` buckets records (entity type, file extension, model type); `size`
/// overrides the generic serialized-length byte metric (assets use the file
/// size on disk).
pub struct StageAggregates<T> {
    pub key: Option<fn(&T) -> String>,
    pub size: Option<fn(&T) -> u64>,
}

impl<T> StageAggregates<T> {
    pub fn none() -> Self {
        Self {
            key: None,
            size: None,
        }
    }

    pub fn keyed(key: fn(&T) -> String) -> Self {
        Self {
            key: Some(key),
            size: None,
        }
    }

    pub fn keyed_with_size(key: fn(&T) -> String, size: fn(&T) -> u64) -> Self {
        Self {
            key: Some(key),
            size: Some(size),
        }
    }
}

/// Record-at-a-time accounting for one stage.
pub struct ProgressTracker<'a, T> {
    stage: TransferStage,
    progress: &'a mut TransferProgress,
    events: &'a broadcast::Sender<TransferEvent>,
    aggregates: StageAggregates<T>,
}

impl<'a, T: Serialize> ProgressTracker<'a, T> {
    pub fn new(
        stage: TransferStage,
        progress: &'a mut TransferProgress,
        events: &'a broadcast::Sender<TransferEvent>,
        aggregates: StageAggregates<T>,
    ) -> Self {
        Self {
            stage,
            progress,
            events,
            aggregates,
        }
    }

    /// Account for one record and publish a progress snapshot.
    ///
    /// The record itself is untouched; the caller forwards it downstream.
    pub fn observe(&mut self, record: &T) {
        let bytes = match self.aggregates.size {
            Some(size) => size(record),
            None => serialized_size(record),
        };

        let stage_progress = self.progress.stages.entry(self.stage).or_default();
        stage_progress.count += 1;
        stage_progress.bytes += bytes;

        if let Some(key) = self.aggregates.key {
            let bucket = stage_progress.aggregates.entry(key(record)).or_default();
            bucket.count += 1;
            bucket.bytes += bytes;
        }

        emit_event(
            self.events,
            TransferEventKind::Progress,
            self.stage,
            self.progress,
        );
    }
}

/// Generic byte estimate: length of the record's JSON serialization.
fn serialized_size<T: Serialize>(record: &T) -> u64 {
    serde_json::to_vec(record).map(|b| b.len() as u64).unwrap_or(0)
}
