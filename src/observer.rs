//! Observer trait for flow lifecycle events.
//!
//! Inject an [`Arc<dyn FlowObserver>`] via
//! [`crate::config::FlowConfigBuilder::observer`] to receive events as the
//! controller moves through the flow.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal progress bar, a GUI channel, or a log
//! sink without the library knowing anything about how the host renders.
//! The trait is `Send + Sync` because the progress ticker, the countdown,
//! and the cleanup task each fire callbacks from their own spawned task.
//! Hosts that prefer streams use [`crate::UploadFlowController::subscribe`]
//! instead; the two surfaces carry the same information.

use std::path::Path;
use std::sync::Arc;

/// Called by the flow controller as the cycle progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must protect shared mutable state
/// with appropriate synchronisation primitives; callbacks may arrive from
/// different tasks.
pub trait FlowObserver: Send + Sync {
    /// A file with an accepted extension was selected.
    fn on_file_selected(&self, name: &str) {
        let _ = name;
    }

    /// A file was selected but rejected for its extension. `message` is the
    /// user-visible validation text.
    fn on_selection_rejected(&self, name: &str, message: &str) {
        let _ = (name, message);
    }

    /// The selection was emptied. No message is surfaced for this case.
    fn on_selection_cleared(&self) {}

    /// The upload was issued and the flow entered `Converting`.
    fn on_convert_started(&self, name: &str) {
        let _ = name;
    }

    /// One cosmetic progress tick. `percent` parks at 100; it carries no
    /// information about the real transfer.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// The service returned an artifact reference; the flow is `Converted`.
    fn on_converted(&self, output: &str) {
        let _ = output;
    }

    /// The upload failed; the flow returned to `Ready`. `message` is the
    /// user-visible error text.
    fn on_upload_failed(&self, message: &str) {
        let _ = message;
    }

    /// The download step began; `file_name` is the derived CSV name.
    fn on_download_started(&self, file_name: &str) {
        let _ = file_name;
    }

    /// The artifact was written to `path`.
    fn on_saved(&self, path: &Path) {
        let _ = path;
    }

    /// One countdown tick, including the initial full value. When
    /// `seconds_left` reaches 0 the controller resets.
    fn on_countdown_tick(&self, seconds_left: u64) {
        let _ = seconds_left;
    }

    /// The delayed cleanup request completed successfully. Failures are
    /// logged, not surfaced.
    fn on_cleanup_triggered(&self) {}

    /// The flow tore down and returned to `Idle`.
    fn on_reset(&self) {}
}

/// A no-op implementation for callers that don't need flow events.
pub struct NoopFlowObserver;

impl FlowObserver for NoopFlowObserver {}

/// Convenience alias matching the type stored in [`crate::config::FlowConfig`].
pub type FlowObserverHandle = Arc<dyn FlowObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct TrackingObserver {
        selections: AtomicUsize,
        rejections: AtomicUsize,
        progress_ticks: AtomicUsize,
        last_percent: AtomicUsize,
        countdown_ticks: AtomicUsize,
        last_seconds: AtomicU64,
        resets: AtomicUsize,
    }

    impl FlowObserver for TrackingObserver {
        fn on_file_selected(&self, _name: &str) {
            self.selections.fetch_add(1, Ordering::SeqCst);
        }

        fn on_selection_rejected(&self, _name: &str, _message: &str) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, percent: u8) {
            self.progress_ticks.fetch_add(1, Ordering::SeqCst);
            self.last_percent.store(percent as usize, Ordering::SeqCst);
        }

        fn on_countdown_tick(&self, seconds_left: u64) {
            self.countdown_ticks.fetch_add(1, Ordering::SeqCst);
            self.last_seconds.store(seconds_left, Ordering::SeqCst);
        }

        fn on_reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopFlowObserver;
        obs.on_file_selected("report.xlsx");
        obs.on_selection_rejected("data.csv", "wrong extension");
        obs.on_selection_cleared();
        obs.on_convert_started("report.xlsx");
        obs.on_progress(50);
        obs.on_converted("http://host/report.csv");
        obs.on_upload_failed("Conversion failed");
        obs.on_download_started("report.csv");
        obs.on_saved(Path::new("./report.csv"));
        obs.on_countdown_tick(10);
        obs.on_cleanup_triggered();
        obs.on_reset();
    }

    #[test]
    fn tracking_observer_receives_events() {
        let tracker = TrackingObserver {
            selections: AtomicUsize::new(0),
            rejections: AtomicUsize::new(0),
            progress_ticks: AtomicUsize::new(0),
            last_percent: AtomicUsize::new(0),
            countdown_ticks: AtomicUsize::new(0),
            last_seconds: AtomicU64::new(0),
            resets: AtomicUsize::new(0),
        };

        tracker.on_file_selected("a.xlsx");
        tracker.on_selection_rejected("b.csv", "wrong extension");
        for pct in [10, 20, 30] {
            tracker.on_progress(pct);
        }
        tracker.on_countdown_tick(10);
        tracker.on_countdown_tick(9);
        tracker.on_reset();

        assert_eq!(tracker.selections.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.rejections.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.progress_ticks.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.last_percent.load(Ordering::SeqCst), 30);
        assert_eq!(tracker.countdown_ticks.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.last_seconds.load(Ordering::SeqCst), 9);
        assert_eq!(tracker.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: Arc<dyn FlowObserver> = Arc::new(NoopFlowObserver);
        obs.on_progress(100);
        obs.on_countdown_tick(0);
    }
}
