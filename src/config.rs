//! Configuration types for the upload flow.
//!
//! All flow behaviour is controlled through [`FlowConfig`], built via its
//! [`FlowConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across tasks, serialise the plain fields for logging,
//! and diff two runs to understand why their behaviour differs.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::FlowError;
use crate::observer::FlowObserverHandle;
use crate::service::ConvertService;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one upload flow controller.
///
/// Built via [`FlowConfig::builder()`] or using [`FlowConfig::default()`]
/// (the default has no endpoint and no service, so `builder().build()` on it
/// fails validation until one of the two is provided).
///
/// # Example
/// ```rust
/// use sheet2csv::FlowConfig;
///
/// let config = FlowConfig::builder()
///     .endpoint("http://localhost:8000")
///     .output_dir("downloads")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FlowConfig {
    /// Base URL of the conversion service, e.g. `http://localhost:8000`.
    /// `/upload` and `/cleanup` are appended to it. Required unless a
    /// pre-built [`service`](Self::service) is injected.
    pub endpoint: Option<String>,

    /// Directory the converted CSV is saved into. Default: `.`.
    pub output_dir: PathBuf,

    /// Timeout for the upload call in seconds. Default: 120.
    ///
    /// Workbooks are small but the conversion runs synchronously inside the
    /// service's upload handler, so the response waits on the conversion
    /// itself. Two minutes covers large multi-sheet workbooks.
    pub upload_timeout_secs: u64,

    /// Percent added to the cosmetic progress indicator per tick. Default: 10.
    ///
    /// The indicator is decorative: it advances on a fixed clock with no
    /// relationship to the real transfer, parks at 100, and must never be
    /// used to infer completion. The `Converted` transition is the only
    /// completion signal.
    pub progress_step: u8,

    /// Milliseconds between cosmetic progress ticks. Default: 200.
    ///
    /// With the default step of 10 the bar fills in exactly 2 seconds.
    pub progress_interval_ms: u64,

    /// Seconds shown on the post-download countdown. Default: 10.
    ///
    /// When the countdown reaches 0 the controller resets unconditionally,
    /// discarding all per-cycle state. There is no manual cancel short of
    /// [`crate::UploadFlowController::reset`] itself.
    pub countdown_start_secs: u64,

    /// Milliseconds between countdown ticks. Default: 1000.
    pub countdown_interval_ms: u64,

    /// Delay before the cleanup request is issued, in milliseconds.
    /// Default: 1000.
    ///
    /// The delay gives the artifact GET a head start; by the time cleanup
    /// runs the user already has their file, which is why cleanup failures
    /// are logged and never surfaced.
    pub cleanup_delay_ms: u64,

    /// Pre-constructed service implementation. Takes precedence over
    /// [`endpoint`](Self::endpoint). Useful in tests or when the caller
    /// needs custom middleware around the HTTP calls.
    pub service: Option<Arc<dyn ConvertService>>,

    /// Observer receiving flow events. If `None`, no callbacks fire; the
    /// event stream from [`crate::UploadFlowController::subscribe`] still
    /// carries everything.
    pub observer: Option<FlowObserverHandle>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            output_dir: PathBuf::from("."),
            upload_timeout_secs: 120,
            progress_step: 10,
            progress_interval_ms: 200,
            countdown_start_secs: 10,
            countdown_interval_ms: 1000,
            cleanup_delay_ms: 1000,
            service: None,
            observer: None,
        }
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("endpoint", &self.endpoint)
            .field("output_dir", &self.output_dir)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("progress_step", &self.progress_step)
            .field("progress_interval_ms", &self.progress_interval_ms)
            .field("countdown_start_secs", &self.countdown_start_secs)
            .field("countdown_interval_ms", &self.countdown_interval_ms)
            .field("cleanup_delay_ms", &self.cleanup_delay_ms)
            .field("service", &self.service.as_ref().map(|_| "<dyn ConvertService>"))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn FlowObserver>"))
            .finish()
    }
}

impl FlowConfig {
    /// Create a new builder for `FlowConfig`.
    pub fn builder() -> FlowConfigBuilder {
        FlowConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FlowConfig`].
#[derive(Debug)]
pub struct FlowConfigBuilder {
    config: FlowConfig,
}

impl FlowConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_step(mut self, step: u8) -> Self {
        self.config.progress_step = step.clamp(1, 100);
        self
    }

    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.progress_interval_ms = ms.max(1);
        self
    }

    pub fn countdown_start_secs(mut self, secs: u64) -> Self {
        self.config.countdown_start_secs = secs.max(1);
        self
    }

    pub fn countdown_interval_ms(mut self, ms: u64) -> Self {
        self.config.countdown_interval_ms = ms.max(1);
        self
    }

    pub fn cleanup_delay_ms(mut self, ms: u64) -> Self {
        self.config.cleanup_delay_ms = ms;
        self
    }

    pub fn service(mut self, service: Arc<dyn ConvertService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn observer(mut self, observer: FlowObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlowConfig, FlowError> {
        let c = &self.config;
        if c.endpoint.is_none() && c.service.is_none() {
            return Err(FlowError::InvalidConfig(
                "either an endpoint or a pre-built service is required".into(),
            ));
        }
        if c.progress_step == 0 || c.progress_step > 100 {
            return Err(FlowError::InvalidConfig(format!(
                "progress step must be 1-100, got {}",
                c.progress_step
            )));
        }
        if c.countdown_start_secs == 0 {
            return Err(FlowError::InvalidConfig(
                "countdown must start at >= 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
