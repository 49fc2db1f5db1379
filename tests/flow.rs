//! Integration tests for the upload flow.
//!
//! The conversion service is injected as a mock, and the timer-sensitive
//! tests run on tokio's paused clock, so the whole suite runs instantly
//! with no network and no real sleeping.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use sheet2csv::{
    ConvertOutcome, ConvertService, ConvertedArtifact, DownloadOutcome, FlowConfig, FlowEvent,
    FlowEventStream, FlowState, Selection, UploadError, UploadFlowController,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{self, Duration};
use tokio_test::assert_ok;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Scriptable stand-in for the remote service, with call counters.
#[derive(Default)]
struct MockService {
    /// Artifact reference returned on upload success.
    output: String,
    /// Body returned by `fetch`.
    body: Vec<u8>,
    /// When set, uploads fail with this error instead of succeeding.
    fail_upload: Option<UploadError>,
    /// When set, uploads park until the gate is notified.
    gate: Option<Arc<Notify>>,
    uploads: AtomicUsize,
    fetches: AtomicUsize,
    cleanups: AtomicUsize,
}

impl MockService {
    fn succeeding(output: &str, body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            output: output.to_string(),
            body: body.to_vec(),
            ..Self::default()
        })
    }

    fn failing(error: UploadError) -> Arc<Self> {
        Arc::new(Self {
            fail_upload: Some(error),
            ..Self::default()
        })
    }

    fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            output: "http://host/out.csv".to_string(),
            gate: Some(gate),
            ..Self::default()
        })
    }
}

#[async_trait]
impl ConvertService for MockService {
    async fn upload(&self, _path: &Path, _name: &str) -> Result<ConvertedArtifact, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = &self.fail_upload {
            return Err(error.clone());
        }
        Ok(ConvertedArtifact {
            output: self.output.clone(),
        })
    }

    async fn fetch(&self, _reference: &str) -> Result<Vec<u8>, UploadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }

    async fn cleanup(&self) -> Result<(), UploadError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn controller_with(service: Arc<MockService>, output_dir: &Path) -> UploadFlowController {
    let config = FlowConfig::builder()
        .service(service as Arc<dyn ConvertService>)
        .output_dir(output_dir)
        .build()
        .expect("mock config is valid");
    UploadFlowController::new(config).expect("controller builds from a mock service")
}

fn controller(service: Arc<MockService>) -> UploadFlowController {
    controller_with(service, Path::new("."))
}

/// Let spawned tasks and freshly-woken timers run without moving the clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock, then let whatever it woke run.
async fn advance(ms: u64) {
    time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

/// Pull every event the stream has buffered, without waiting for more.
fn drain(stream: &mut FlowEventStream) -> Vec<FlowEvent> {
    let mut events = Vec::new();
    while let Some(Some(event)) = stream.next().now_or_never() {
        events.push(event);
    }
    events
}

// ── Selection ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_accepts_only_excel_suffixes() {
    let flow = controller(MockService::succeeding("http://host/f.csv", b""));

    // Uppercase suffix is fine; the check is case-insensitive.
    assert!(matches!(
        flow.select(Some(Path::new("Report.XLSX"))),
        Selection::Accepted { .. }
    ));
    assert_eq!(flow.state(), FlowState::Ready);

    // Wrong extension: rejected with a surfaced message.
    let outcome = flow.select(Some(Path::new("data.csv")));
    let Selection::Rejected { name, message } = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(name, "data.csv");
    assert!(message.contains(".xlsx or .xls"));
    assert_eq!(flow.state(), FlowState::Idle);
    assert_eq!(flow.last_error().as_deref(), Some(message.as_str()));
    assert!(flow.selected_file().is_none());

    // Empty selection: silent reset, no message.
    assert_eq!(flow.select(None), Selection::Cleared);
    assert_eq!(flow.state(), FlowState::Idle);
    assert!(flow.last_error().is_none());
}

#[tokio::test]
async fn accepted_selection_invalidates_prior_state() {
    let flow = controller(MockService::failing(UploadError::Rejected {
        status: 500,
        message: None,
    }));

    flow.select(Some(Path::new("ledger.xls")));
    let outcome = flow.convert().await.unwrap();
    assert!(matches!(outcome, ConvertOutcome::Failed { .. }));
    assert!(flow.last_error().is_some());

    // Selecting again clears the failure message and starts a fresh cycle.
    assert!(matches!(
        flow.select(Some(Path::new("ledger2.xls"))),
        Selection::Accepted { .. }
    ));
    assert!(flow.last_error().is_none());
    assert_eq!(flow.state(), FlowState::Ready);
}

// ── Convert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_without_selection_is_ignored() {
    let service = MockService::succeeding("http://host/f.csv", b"");
    let flow = controller(Arc::clone(&service));

    let outcome = assert_ok!(flow.convert().await);
    assert_eq!(outcome, ConvertOutcome::Ignored);
    assert_eq!(flow.state(), FlowState::Idle);
    assert_eq!(service.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_success_moves_flow_to_converted() {
    let service = MockService::succeeding("http://host/f.csv", b"");
    let flow = controller(Arc::clone(&service));

    flow.select(Some(Path::new("Sales Q1.xlsx")));
    let outcome = assert_ok!(flow.convert().await);
    assert_eq!(
        outcome,
        ConvertOutcome::Converted {
            output: "http://host/f.csv".into()
        }
    );
    assert_eq!(flow.state(), FlowState::Converted);
    assert_eq!(service.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_failure_returns_flow_to_ready() {
    let flow = controller(MockService::failing(UploadError::Rejected {
        status: 500,
        message: None,
    }));

    flow.select(Some(Path::new("report.xlsx")));
    let outcome = flow.convert().await.unwrap();

    let ConvertOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error.to_string(), "Conversion failed");

    // Back to an actionable state: convert available again, progress at 0,
    // selection re-enabled.
    assert_eq!(flow.state(), FlowState::Ready);
    assert_eq!(flow.progress(), 0);
    assert_eq!(flow.last_error().as_deref(), Some("Conversion failed"));
    assert!(matches!(
        flow.select(Some(Path::new("other.xlsx"))),
        Selection::Accepted { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn second_convert_during_upload_is_ignored() {
    let gate = Arc::new(Notify::new());
    let service = MockService::gated(Arc::clone(&gate));
    let flow = controller(Arc::clone(&service));

    flow.select(Some(Path::new("report.xlsx")));
    let in_flight = tokio::spawn({
        let flow = flow.clone();
        async move { flow.convert().await }
    });
    settle().await;
    assert_eq!(flow.state(), FlowState::Converting);

    // The second call must neither error nor disturb the one in flight.
    let second = flow.convert().await.unwrap();
    assert_eq!(second, ConvertOutcome::Ignored);
    assert_eq!(service.uploads.load(Ordering::SeqCst), 1);

    // Selection is disabled while converting.
    assert_eq!(flow.select(Some(Path::new("other.xlsx"))), Selection::Ignored);

    gate.notify_one();
    settle().await;
    let outcome = in_flight.await.unwrap().unwrap();
    assert!(matches!(outcome, ConvertOutcome::Converted { .. }));
}

#[tokio::test(start_paused = true)]
async fn stale_upload_completion_after_reset_is_discarded() {
    let gate = Arc::new(Notify::new());
    let service = MockService::gated(Arc::clone(&gate));
    let flow = controller(Arc::clone(&service));

    flow.select(Some(Path::new("report.xlsx")));
    let in_flight = tokio::spawn({
        let flow = flow.clone();
        async move { flow.convert().await }
    });
    settle().await;
    assert_eq!(flow.state(), FlowState::Converting);

    flow.reset();
    assert_eq!(flow.state(), FlowState::Idle);

    // The upload now completes into a torn-down flow; nothing may change.
    gate.notify_one();
    settle().await;
    let outcome = in_flight.await.unwrap().unwrap();
    assert_eq!(outcome, ConvertOutcome::Ignored);
    assert_eq!(flow.state(), FlowState::Idle);
    assert!(flow.selected_file().is_none());
}

// ── Progress simulation ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn progress_fills_after_exactly_two_seconds() {
    let gate = Arc::new(Notify::new());
    let service = MockService::gated(Arc::clone(&gate));
    let flow = controller(Arc::clone(&service));
    let mut events = flow.subscribe();

    flow.select(Some(Path::new("report.xlsx")));
    let in_flight = tokio::spawn({
        let flow = flow.clone();
        async move { flow.convert().await }
    });
    settle().await;
    assert_eq!(flow.progress(), 0);

    // Ten increments of 10, one per 200 ms, regardless of the upload still
    // hanging: the bar is decorative.
    for expected in (10..=90).step_by(10) {
        advance(200).await;
        assert_eq!(flow.progress(), expected as u8);
    }
    advance(200).await;
    assert_eq!(flow.progress(), 100);

    // Parked: more time must not push it past 100.
    advance(1000).await;
    assert_eq!(flow.progress(), 100);

    let ticks: Vec<u8> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            FlowEvent::ProgressTicked { percent } => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

    gate.notify_one();
    settle().await;
    in_flight.await.unwrap().unwrap();
}

// ── Download, cleanup, countdown ─────────────────────────────────────────────

#[tokio::test]
async fn download_before_convert_is_ignored() {
    let flow = controller(MockService::succeeding("http://host/f.csv", b""));
    flow.select(Some(Path::new("report.xlsx")));
    let outcome = flow.download().await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Ignored);
    assert_eq!(flow.state(), FlowState::Ready);
}

#[tokio::test]
async fn saved_file_uses_derived_csv_name_and_body() {
    let dir = tempfile::tempdir().unwrap();
    let service = MockService::succeeding("http://host/f.csv", b"a,b\n1,2\n");
    let flow = controller_with(Arc::clone(&service), dir.path());

    flow.select(Some(Path::new("Sales Q1.xlsx")));
    flow.convert().await.unwrap();
    let outcome = flow.download().await.unwrap();

    let DownloadOutcome::Saved { path } = outcome else {
        panic!("expected a saved file, got {outcome:?}");
    };
    assert_eq!(path, dir.path().join("Sales Q1.csv"));
    assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n1,2\n");
    assert_eq!(service.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(flow.state(), FlowState::CountingDown);
}

#[tokio::test(start_paused = true)]
async fn download_schedules_one_cleanup_and_counts_down_to_reset() {
    let dir = tempfile::tempdir().unwrap();
    let service = MockService::succeeding("http://host/f.csv", b"a,b\n");
    let flow = controller_with(Arc::clone(&service), dir.path());
    let mut events = flow.subscribe();

    flow.select(Some(Path::new("report.xlsx")));
    flow.convert().await.unwrap();

    let saving = tokio::spawn({
        let flow = flow.clone();
        async move { flow.download().await }
    });
    // The save goes through the blocking fs pool; spin until it lands
    // without letting the paused clock move.
    while !saving.is_finished() {
        tokio::task::yield_now().await;
    }
    let outcome = saving.await.unwrap().unwrap();
    assert!(matches!(outcome, DownloadOutcome::Saved { .. }));
    assert_eq!(flow.state(), FlowState::CountingDown);

    // Cleanup fires after exactly one second, and exactly once.
    assert_eq!(service.cleanups.load(Ordering::SeqCst), 0);
    advance(999).await;
    assert_eq!(service.cleanups.load(Ordering::SeqCst), 0);
    advance(1).await;
    assert_eq!(service.cleanups.load(Ordering::SeqCst), 1);

    // One countdown tick has passed with that first second.
    let so_far = drain(&mut events);
    assert!(so_far.contains(&FlowEvent::CountdownTicked { seconds_left: 10 }));
    assert!(so_far.contains(&FlowEvent::CountdownTicked { seconds_left: 9 }));
    assert!(so_far.contains(&FlowEvent::CleanupTriggered));
    assert!(!so_far.contains(&FlowEvent::Reset));

    // Nine more one-second ticks reach the reset trigger.
    for _ in 0..9 {
        advance(1000).await;
    }
    assert_eq!(flow.state(), FlowState::Idle);
    assert!(flow.selected_file().is_none());
    assert_eq!(flow.progress(), 0);
    assert_eq!(service.cleanups.load(Ordering::SeqCst), 1);

    let rest = drain(&mut events);
    assert!(rest.contains(&FlowEvent::CountdownTicked { seconds_left: 0 }));
    assert!(rest.contains(&FlowEvent::Reset));

    // A new cycle can start after teardown.
    assert!(matches!(
        flow.select(Some(Path::new("next.xlsx"))),
        Selection::Accepted { .. }
    ));
}

// ── Events ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn events_follow_the_flow_order() {
    let flow = controller(MockService::succeeding("http://host/f.csv", b""));
    let mut events = flow.subscribe();

    flow.select(Some(Path::new("report.xlsx")));
    flow.convert().await.unwrap();
    settle().await;

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            FlowEvent::FileSelected {
                name: "report.xlsx".into()
            },
            FlowEvent::ConvertStarted {
                name: "report.xlsx".into()
            },
            FlowEvent::Converted {
                output: "http://host/f.csv".into()
            },
        ]
    );
}
