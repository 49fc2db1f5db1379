//! The upload flow controller: one explicit state machine for the whole
//! select / convert / download / cleanup cycle.
//!
//! ## States
//!
//! ```text
//! Idle ──select──▶ Ready ──convert──▶ Converting ──▶ Converted
//!   ▲                ▲                    │              │
//!   │                └──── upload failed ─┘          download
//!   │                                                    │
//!   └────────────── countdown reaches 0 ◀── CountingDown ┘
//! ```
//!
//! An upload failure is transient: the flow lands back in `Ready` with the
//! message recorded in [`UploadFlowController::last_error`], so hosts render
//! it alongside the state instead of from a resting error variant.
//!
//! ## Guards
//!
//! Every operation checks the state under one lock before doing anything, so
//! a second `convert()` while one is in flight, a `download()` without a
//! result, or a selection while the file control is consumed are all quiet
//! no-ops (`Ignored`), never corruption.
//!
//! ## Timers
//!
//! The cosmetic progress ticker and the countdown are spawned tasks whose
//! abort handles live in the controller, so [`reset`](UploadFlowController::reset)
//! cancels them deterministically. A generation counter guards the upload
//! await: a completion that arrives after a reset is discarded.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, UploadError};
use crate::events::{FlowEvent, FlowEventStream};
use crate::selection::{derive_output_name, SelectedFile, SELECTION_ERROR};
use crate::service::{ConvertService, ConvertedArtifact, HttpConvertService};

/// Where the flow currently is. Hosts render purely from this plus the
/// snapshot accessors; there is no hidden state inferred from UI widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// No valid file selected.
    Idle,
    /// A valid file is selected; convert is available.
    Ready,
    /// The upload is in flight; selection and convert are unavailable.
    Converting,
    /// An artifact reference is held; download is available.
    Converted,
    /// The post-download countdown is running; reset follows at 0.
    CountingDown,
}

/// Outcome of [`UploadFlowController::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The file has an accepted extension; the flow is `Ready`.
    Accepted { name: String },
    /// The extension was rejected; the flow is `Idle` with the message
    /// surfaced.
    Rejected { name: String, message: String },
    /// No file was chosen; the flow is `Idle` with nothing surfaced.
    Cleared,
    /// Selection is disabled in the current state.
    Ignored,
}

/// Outcome of [`UploadFlowController::convert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// The service returned an artifact reference; the flow is `Converted`.
    Converted { output: String },
    /// The upload failed; the flow is back in `Ready`. `error` displays the
    /// user-visible message.
    Failed { error: UploadError },
    /// Nothing was selected, or a conversion was already in flight.
    Ignored,
}

/// Outcome of [`UploadFlowController::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The artifact was saved; the countdown is running.
    Saved { path: PathBuf },
    /// No artifact was available to download.
    Ignored,
}

struct Inner {
    state: FlowState,
    file: Option<SelectedFile>,
    artifact: Option<ConvertedArtifact>,
    progress: u8,
    last_error: Option<String>,
    /// Bumped on reset; in-flight work from an older generation is stale.
    generation: u64,
    progress_task: Option<JoinHandle<()>>,
    countdown_task: Option<JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: FlowState::Idle,
            file: None,
            artifact: None,
            progress: 0,
            last_error: None,
            generation: 0,
            progress_task: None,
            countdown_task: None,
        }
    }
}

fn abort_task(slot: &mut Option<JoinHandle<()>>) {
    if let Some(task) = slot.take() {
        task.abort();
    }
}

/// Drives one file selection / conversion / download / cleanup cycle.
///
/// The controller is a cheap cloneable handle; clones share the same flow.
/// At most one selected file and at most one artifact exist at a time, and
/// an accepted selection invalidates any prior artifact.
#[derive(Clone)]
pub struct UploadFlowController {
    inner: Arc<Mutex<Inner>>,
    config: FlowConfig,
    service: Arc<dyn ConvertService>,
    events: broadcast::Sender<FlowEvent>,
}

impl std::fmt::Debug for UploadFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFlowController").finish_non_exhaustive()
    }
}

impl UploadFlowController {
    /// Create a controller from the given configuration.
    ///
    /// The service comes from `config.service` when injected, otherwise it
    /// is built over HTTP from `config.endpoint`.
    pub fn new(config: FlowConfig) -> Result<Self, FlowError> {
        let service = resolve_service(&config)?;
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            config,
            service,
            events,
        })
    }

    // ── Snapshot accessors ───────────────────────────────────────────────

    pub fn state(&self) -> FlowState {
        self.locked().state
    }

    /// Cosmetic progress percentage, 0 to 100.
    pub fn progress(&self) -> u8 {
        self.locked().progress
    }

    /// Name of the currently selected file, if any.
    pub fn selected_file(&self) -> Option<String> {
        self.locked().file.as_ref().map(|f| f.name.clone())
    }

    /// The user-visible message from the last rejection or upload failure.
    /// Cleared by an accepted selection, a new conversion, and reset.
    pub fn last_error(&self) -> Option<String> {
        self.locked().last_error.clone()
    }

    /// Subscribe to the flow's event stream. Events emitted before the call
    /// are not replayed.
    pub fn subscribe(&self) -> FlowEventStream {
        use futures::StreamExt;
        use tokio_stream::wrappers::BroadcastStream;
        let rx = self.events.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|item| async move { item.ok() }))
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Record a file selection, or clear it with `None`.
    ///
    /// Only the extension is validated: `xlsx`/`xls`, case-insensitive,
    /// taken from after the final `.` of the file name. An accepted
    /// selection discards any prior artifact and error message. An empty
    /// selection clears silently. Selections are ignored from `Converting`
    /// onward; the file control is consumed for the rest of the cycle.
    pub fn select(&self, path: Option<&Path>) -> Selection {
        let mut inner = self.locked();
        match inner.state {
            FlowState::Idle | FlowState::Ready => {}
            _ => return Selection::Ignored,
        }

        let Some(path) = path else {
            inner.file = None;
            inner.artifact = None;
            inner.last_error = None;
            inner.state = FlowState::Idle;
            drop(inner);
            debug!("selection cleared");
            if let Some(obs) = &self.config.observer {
                obs.on_selection_cleared();
            }
            self.emit(FlowEvent::SelectionCleared);
            return Selection::Cleared;
        };

        let file = SelectedFile::from_path(path);
        if file.is_convertible() {
            inner.file = Some(file.clone());
            inner.artifact = None;
            inner.last_error = None;
            inner.state = FlowState::Ready;
            drop(inner);
            info!("selected {}", file.name);
            if let Some(obs) = &self.config.observer {
                obs.on_file_selected(&file.name);
            }
            self.emit(FlowEvent::FileSelected {
                name: file.name.clone(),
            });
            Selection::Accepted { name: file.name }
        } else {
            inner.file = None;
            inner.artifact = None;
            inner.last_error = Some(SELECTION_ERROR.to_string());
            inner.state = FlowState::Idle;
            drop(inner);
            debug!("rejected selection {} (extension)", file.name);
            if let Some(obs) = &self.config.observer {
                obs.on_selection_rejected(&file.name, SELECTION_ERROR);
            }
            self.emit(FlowEvent::SelectionRejected {
                name: file.name.clone(),
                message: SELECTION_ERROR.to_string(),
            });
            Selection::Rejected {
                name: file.name,
                message: SELECTION_ERROR.to_string(),
            }
        }
    }

    /// Upload the selected file for conversion.
    ///
    /// A quiet no-op unless the flow is `Ready` with a file selected, which
    /// covers both "nothing selected" and a second call racing a conversion
    /// already in flight. On success the flow is `Converted`; on failure it
    /// returns to `Ready` with progress reset to 0 and the message recorded.
    pub async fn convert(&self) -> Result<ConvertOutcome, FlowError> {
        let (file, generation) = {
            let mut inner = self.locked();
            if inner.state != FlowState::Ready {
                return Ok(ConvertOutcome::Ignored);
            }
            let Some(file) = inner.file.clone() else {
                return Ok(ConvertOutcome::Ignored);
            };
            inner.state = FlowState::Converting;
            inner.progress = 0;
            inner.last_error = None;
            (file, inner.generation)
        };

        info!("uploading {} for conversion", file.name);
        if let Some(obs) = &self.config.observer {
            obs.on_convert_started(&file.name);
        }
        self.emit(FlowEvent::ConvertStarted {
            name: file.name.clone(),
        });
        self.spawn_progress_ticker(generation);

        let result = self.service.upload(&file.path, &file.name).await;

        let mut inner = self.locked();
        if inner.generation != generation {
            // Reset happened while the upload was in flight; nobody is
            // listening for this completion any more.
            debug!("discarding stale upload completion for {}", file.name);
            return Ok(ConvertOutcome::Ignored);
        }
        abort_task(&mut inner.progress_task);

        match result {
            Ok(artifact) => {
                inner.state = FlowState::Converted;
                inner.artifact = Some(artifact.clone());
                drop(inner);
                info!("conversion ready: {}", artifact.output);
                if let Some(obs) = &self.config.observer {
                    obs.on_converted(&artifact.output);
                }
                self.emit(FlowEvent::Converted {
                    output: artifact.output.clone(),
                });
                Ok(ConvertOutcome::Converted {
                    output: artifact.output,
                })
            }
            Err(error) => {
                inner.state = FlowState::Ready;
                inner.progress = 0;
                let message = error.to_string();
                inner.last_error = Some(message.clone());
                drop(inner);
                warn!("upload failed: {message}");
                if let Some(obs) = &self.config.observer {
                    obs.on_upload_failed(&message);
                }
                self.emit(FlowEvent::UploadFailed { message });
                Ok(ConvertOutcome::Failed { error })
            }
        }
    }

    /// Save the converted artifact and start the teardown countdown.
    ///
    /// A quiet no-op unless the flow is `Converted`. The artifact reference
    /// is consumed here, exactly once. The countdown and the delayed cleanup
    /// request are scheduled first; the save itself runs immediately and is
    /// never gated by the countdown. The CSV lands at
    /// `<output_dir>/<original-basename>.csv`, written via temp-file rename
    /// so a crash never leaves a partial file.
    pub async fn download(&self) -> Result<DownloadOutcome, FlowError> {
        let (file, artifact, generation) = {
            let mut inner = self.locked();
            if inner.state != FlowState::Converted {
                return Ok(DownloadOutcome::Ignored);
            }
            let file = inner
                .file
                .clone()
                .ok_or_else(|| FlowError::Internal("converted flow without a file".into()))?;
            let artifact = inner
                .artifact
                .take()
                .ok_or_else(|| FlowError::Internal("converted flow without an artifact".into()))?;
            inner.state = FlowState::CountingDown;
            (file, artifact, inner.generation)
        };

        let save_name = derive_output_name(&file.name);
        info!("downloading {} as {}", artifact.output, save_name);
        if let Some(obs) = &self.config.observer {
            obs.on_download_started(&save_name);
        }
        self.emit(FlowEvent::DownloadStarted {
            file_name: save_name.clone(),
        });

        self.spawn_countdown(generation);
        self.schedule_cleanup();

        let bytes = self
            .service
            .fetch(&artifact.output)
            .await
            .map_err(|e| FlowError::FetchFailed {
                reference: artifact.output.clone(),
                reason: e.to_string(),
            })?;

        let path = self.config.output_dir.join(&save_name);
        write_atomic(&path, &bytes).await?;

        info!("saved converted file to {}", path.display());
        if let Some(obs) = &self.config.observer {
            obs.on_saved(&path);
        }
        self.emit(FlowEvent::Saved { path: path.clone() });
        Ok(DownloadOutcome::Saved { path })
    }

    /// Tear the flow down unconditionally: cancel the progress and countdown
    /// tasks, discard the selection, artifact, progress, and error message,
    /// and return to `Idle`. Invoked automatically when the countdown hits
    /// 0; hosts may also call it directly.
    pub fn reset(&self) {
        {
            let mut inner = self.locked();
            inner.generation = inner.generation.wrapping_add(1);
            abort_task(&mut inner.progress_task);
            abort_task(&mut inner.countdown_task);
            inner.state = FlowState::Idle;
            inner.file = None;
            inner.artifact = None;
            inner.progress = 0;
            inner.last_error = None;
        }
        info!("flow reset");
        if let Some(obs) = &self.config.observer {
            obs.on_reset();
        }
        self.emit(FlowEvent::Reset);
    }

    // ── Timer tasks ──────────────────────────────────────────────────────

    /// Cosmetic progress: a fixed increment on a fixed clock, parking at
    /// 100. Entirely decorative; the bar can fill before or after the real
    /// upload settles, and carries no completion information either way.
    fn spawn_progress_ticker(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let observer = self.config.observer.clone();
        let events = self.events.clone();
        let step = self.config.progress_step;
        let period = Duration::from_millis(self.config.progress_interval_ms);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            // The first interval tick completes immediately; skip it so the
            // first increment lands one full period in.
            interval.tick().await;
            loop {
                interval.tick().await;
                let percent = {
                    let mut inner = inner.lock().expect("flow state lock poisoned");
                    if inner.state != FlowState::Converting || inner.generation != generation {
                        break;
                    }
                    inner.progress = inner.progress.saturating_add(step).min(100);
                    inner.progress
                };
                if let Some(obs) = &observer {
                    obs.on_progress(percent);
                }
                let _ = events.send(FlowEvent::ProgressTicked { percent });
                if percent >= 100 {
                    break;
                }
            }
        });

        let mut inner = self.locked();
        abort_task(&mut inner.progress_task);
        inner.progress_task = Some(handle);
    }

    /// Visible teardown countdown. Emits the initial full value right away,
    /// then one tick per interval; at 0 the controller resets.
    fn spawn_countdown(&self, generation: u64) {
        let start = self.config.countdown_start_secs;
        let period = Duration::from_millis(self.config.countdown_interval_ms);

        if let Some(obs) = &self.config.observer {
            obs.on_countdown_tick(start);
        }
        self.emit(FlowEvent::CountdownTicked {
            seconds_left: start,
        });

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let mut seconds_left = start;
            let mut interval = time::interval(period);
            interval.tick().await;
            while seconds_left > 0 {
                interval.tick().await;
                {
                    let inner = controller.locked();
                    if inner.state != FlowState::CountingDown || inner.generation != generation {
                        return;
                    }
                }
                seconds_left -= 1;
                if let Some(obs) = &controller.config.observer {
                    obs.on_countdown_tick(seconds_left);
                }
                controller.emit(FlowEvent::CountdownTicked { seconds_left });
            }
            controller.reset();
        });

        let mut inner = self.locked();
        abort_task(&mut inner.countdown_task);
        inner.countdown_task = Some(handle);
    }

    /// One cleanup request per completed download, after a fixed delay.
    /// Failures are logged only; the user already has their file.
    fn schedule_cleanup(&self) {
        let service = Arc::clone(&self.service);
        let observer = self.config.observer.clone();
        let events = self.events.clone();
        let delay = Duration::from_millis(self.config.cleanup_delay_ms);

        tokio::spawn(async move {
            time::sleep(delay).await;
            match service.cleanup().await {
                Ok(()) => {
                    debug!("server cleanup triggered");
                    if let Some(obs) = &observer {
                        obs.on_cleanup_triggered();
                    }
                    let _ = events.send(FlowEvent::CleanupTriggered);
                }
                Err(e) => warn!("cleanup request failed: {e}"),
            }
        });
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("flow state lock poisoned")
    }

    fn emit(&self, event: FlowEvent) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.events.send(event);
    }
}

/// Resolve the service, most-specific first: a pre-built implementation from
/// the config, else HTTP against the configured endpoint.
fn resolve_service(config: &FlowConfig) -> Result<Arc<dyn ConvertService>, FlowError> {
    if let Some(service) = &config.service {
        return Ok(Arc::clone(service));
    }
    let endpoint = config.endpoint.as_deref().ok_or_else(|| {
        FlowError::InvalidConfig("either an endpoint or a pre-built service is required".into())
    })?;
    Ok(Arc::new(HttpConvertService::new(
        endpoint,
        config.upload_timeout_secs,
    )?))
}

/// Write via temp file + rename so readers never observe a partial CSV.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FlowError> {
    let save_err = |source: std::io::Error| FlowError::SaveFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(save_err)?;
        }
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(save_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(save_err)?;
    Ok(())
}
