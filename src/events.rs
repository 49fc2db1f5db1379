//! Flow events as a broadcast stream.
//!
//! Every observer callback has a matching [`FlowEvent`] variant; hosts that
//! prefer `Stream`-based consumption over implementing a trait call
//! [`crate::UploadFlowController::subscribe`] and fold the events into
//! whatever state their UI renders from. Subscribing is cheap and multiple
//! subscribers each see the full sequence from the moment they subscribe.

use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;

/// One observable step of the flow, in the order the controller emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// A file with an accepted extension was selected.
    FileSelected { name: String },
    /// A selection was rejected for its extension, with the user-visible
    /// message.
    SelectionRejected { name: String, message: String },
    /// The selection was emptied; nothing is surfaced to the user.
    SelectionCleared,
    /// The upload was issued.
    ConvertStarted { name: String },
    /// Cosmetic progress tick; parks at 100.
    ProgressTicked { percent: u8 },
    /// The service returned an artifact reference.
    Converted { output: String },
    /// The upload failed with the user-visible message; flow back to ready.
    UploadFailed { message: String },
    /// The download step began with the derived CSV name.
    DownloadStarted { file_name: String },
    /// The artifact was written to disk.
    Saved { path: PathBuf },
    /// Countdown tick, including the initial full value; 0 precedes reset.
    CountdownTicked { seconds_left: u64 },
    /// The delayed cleanup request completed.
    CleanupTriggered,
    /// The flow tore down and returned to idle.
    Reset,
}

/// A boxed stream of flow events.
pub type FlowEventStream = Pin<Box<dyn Stream<Item = FlowEvent> + Send>>;
