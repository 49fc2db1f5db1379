//! # sheet2csv
//!
//! Upload Excel workbooks to a remote conversion service and fetch the
//! resulting CSV.
//!
//! ## Why this crate?
//!
//! The conversion itself happens server-side and is opaque to this client.
//! What the client must get right is the lifecycle around it: validating the
//! selection, driving the upload, retrieving the artifact, and asking the
//! server to clear its temporary files afterwards. Doing that ad hoc with
//! loose flags invites illegal transitions (converting twice, downloading
//! before a result exists, re-selecting mid-upload). This crate centres the
//! whole lifecycle in one explicit state machine so hosts render their UI as
//! a function of flow state instead of juggling booleans.
//!
//! ## Flow Overview
//!
//! ```text
//! workbook
//!  |
//!  |- 1. Select    validate the .xlsx/.xls extension
//!  |- 2. Convert   multipart upload, cosmetic progress ticker
//!  |- 3. Download  GET the artifact, save <basename>.csv
//!  |- 4. Countdown 10 visible seconds, cleanup request after 1 s
//!  `- 5. Reset     discard all per-cycle state
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheet2csv::{ConvertOutcome, FlowConfig, UploadFlowController};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlowConfig::builder()
//!         .endpoint("http://localhost:8000")
//!         .build()?;
//!     let flow = UploadFlowController::new(config)?;
//!
//!     flow.select(Some(Path::new("report.xlsx")));
//!     match flow.convert().await? {
//!         ConvertOutcome::Converted { output } => println!("converted: {output}"),
//!         ConvertOutcome::Failed { error } => eprintln!("{error}"),
//!         ConvertOutcome::Ignored => unreachable!("a file was selected"),
//!     }
//!     flow.download().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheet2csv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! sheet2csv = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod observer;
pub mod selection;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FlowConfig, FlowConfigBuilder};
pub use controller::{ConvertOutcome, DownloadOutcome, FlowState, Selection, UploadFlowController};
pub use error::{FlowError, UploadError};
pub use events::{FlowEvent, FlowEventStream};
pub use observer::{FlowObserver, FlowObserverHandle, NoopFlowObserver};
pub use selection::{derive_output_name, SelectedFile, ACCEPTED_EXTENSIONS, SELECTION_ERROR};
pub use service::{ConvertService, ConvertedArtifact, HttpConvertService};
