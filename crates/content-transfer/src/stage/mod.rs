//! Generic stage runner: pipe a source stream into a destination sink while
//! tracking progress.
//!
//! Every stage uses the same routine; only the aggregate key/size functions
//! differ. Records flow source stream → tracker → destination sink through
//! bounded channels, so a slow destination stalls the source instead of
//! growing an in-memory buffer.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{Result, TransferError};
use crate::progress::{
    emit_event, ProgressTracker, StageAggregates, TransferEvent, TransferEventKind,
    TransferProgress,
};
use crate::provider::{RecordSink, RecordStream, TransferStage};

/// Drive one stage to completion.
///
/// Emits `Start` before the first record and `Complete` once the destination
/// acknowledges end-of-write. First error wins: an `Err` item from the source
/// rejects the stage immediately; a destination failure surfaces through the
/// sink's completion channel.
pub(crate) async fn run_stage<T: Serialize>(
    stage: TransferStage,
    mut stream: RecordStream<T>,
    sink: RecordSink<T>,
    progress: &mut TransferProgress,
    events: &broadcast::Sender<TransferEvent>,
    aggregates: StageAggregates<T>,
    throttle: Option<Duration>,
) -> Result<()> {
    info!("{stage}: stage started");
    emit_event(events, TransferEventKind::Start, stage, progress);

    let (tx, done) = sink.into_parts();
    let mut source_error: Option<TransferError> = None;
    let mut destination_closed = false;

    {
        let mut tracker = ProgressTracker::new(stage, progress, events, aggregates);

        while let Some(item) = stream.recv().await {
            let record = match item {
                Ok(record) => record,
                Err(error) => {
                    source_error = Some(error);
                    break;
                }
            };

            tracker.observe(&record);

            if let Some(delay) = throttle {
                tokio::time::sleep(delay).await;
            }

            // A closed receiver means the destination stopped early; the
            // reason arrives on the completion channel below.
            if tx.send(record).await.is_err() {
                destination_closed = true;
                break;
            }
        }
    }

    // Dropping the sender is the end-of-stream signal for the destination.
    drop(tx);

    if let Some(error) = source_error {
        return Err(error);
    }

    match done.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => return Err(error),
        Err(_) => {
            return Err(TransferError::stage(
                stage,
                "destination stream ended without reporting completion",
            ))
        }
    }

    if destination_closed {
        return Err(TransferError::stage(
            stage,
            "destination stream closed before the source stream was drained",
        ));
    }

    let count = progress.stage(stage).map(|s| s.count).unwrap_or(0);
    emit_event(events, TransferEventKind::Complete, stage, progress);
    info!("{stage}: stage complete ({count} records)");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LinkRecord;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn stream_of<T: Send + 'static>(items: Vec<Result<T>>) -> RecordStream<T> {
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn links(n: usize) -> Vec<Result<LinkRecord>> {
        (0..n)
            .map(|i| Ok(LinkRecord(json!({ "left": i, "right": i + 1 }))))
            .collect()
    }

    fn counting_sink<T: Send + 'static>(written: Arc<AtomicUsize>) -> RecordSink<T> {
        RecordSink::spawn(2, move |mut rx| async move {
            while rx.recv().await.is_some() {
                written.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_runs_stage_to_completion() {
        let (events, mut rx) = broadcast::channel(64);
        let mut progress = TransferProgress::default();
        let written = Arc::new(AtomicUsize::new(0));

        run_stage(
            TransferStage::Links,
            stream_of(links(3)),
            counting_sink(written.clone()),
            &mut progress,
            &events,
            StageAggregates::none(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(written.load(Ordering::SeqCst), 3);
        assert_eq!(progress.stage(TransferStage::Links).unwrap().count, 3);

        let kinds: Vec<TransferEventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransferEventKind::Start,
                TransferEventKind::Progress,
                TransferEventKind::Progress,
                TransferEventKind::Progress,
                TransferEventKind::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_source_error_rejects_stage() {
        let (events, _rx) = broadcast::channel(64);
        let mut progress = TransferProgress::default();
        let written = Arc::new(AtomicUsize::new(0));

        let mut items = links(2);
        items.push(Err(TransferError::provider("test-source", "read failed")));

        let err = run_stage(
            TransferStage::Links,
            stream_of(items),
            counting_sink(written.clone()),
            &mut progress,
            &events,
            StageAggregates::none(),
            None,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("read failed"));
        // Records before the failure were still observed.
        assert_eq!(progress.stage(TransferStage::Links).unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_destination_error_rejects_stage() {
        let (events, _rx) = broadcast::channel(64);
        let mut progress = TransferProgress::default();

        let sink: RecordSink<LinkRecord> = RecordSink::spawn(2, |mut rx| async move {
            // Accept one record, then fail.
            let _ = rx.recv().await;
            Err(TransferError::provider("test-destination", "write failed"))
        });

        let err = run_stage(
            TransferStage::Links,
            stream_of(links(5)),
            sink,
            &mut progress,
            &events,
            StageAggregates::none(),
            None,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("write failed"));
    }

    #[tokio::test]
    async fn test_destination_closing_early_is_an_error() {
        let (events, _rx) = broadcast::channel(64);
        let mut progress = TransferProgress::default();

        // Consumer stops after one record but reports success.
        let sink: RecordSink<LinkRecord> = RecordSink::spawn(1, |mut rx| async move {
            let _ = rx.recv().await;
            Ok(())
        });

        let err = run_stage(
            TransferStage::Links,
            stream_of(links(10)),
            sink,
            &mut progress,
            &events,
            StageAggregates::none(),
            None,
        )
        .await
        .unwrap_err();

        assert!(err
            .to_string()
            .contains("closed before the source stream was drained"));
    }

    #[tokio::test]
    async fn test_throttle_still_completes() {
        let (events, _rx) = broadcast::channel(64);
        let mut progress = TransferProgress::default();
        let written = Arc::new(AtomicUsize::new(0));

        run_stage(
            TransferStage::Links,
            stream_of(links(3)),
            counting_sink(written.clone()),
            &mut progress,
            &events,
            StageAggregates::none(),
            Some(Duration::from_millis(1)),
        )
        .await
        .unwrap();

        assert_eq!(written.load(Ordering::SeqCst), 3);
    }
}
