//! Error types for the sheet2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FlowError`]: **fatal**, the operation cannot produce its result at
//!   all (bad endpoint, unwritable output path). Returned as `Err(FlowError)`
//!   from the controller operations.
//!
//! * [`UploadError`]: **non-fatal**, the upload call failed but the flow
//!   itself survives and returns to `Ready` for another attempt. Carried
//!   inside [`crate::controller::ConvertOutcome::Failed`] so callers can
//!   surface the message and let the user try again rather than tearing the
//!   whole cycle down.
//!
//! A rejected file selection (wrong extension) is not an error type at all;
//! it is a [`crate::controller::Selection`] outcome, because it blocks
//! progression without failing any operation.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the sheet2csv library.
///
/// Upload failures use [`UploadError`] and are carried in
/// [`crate::controller::ConvertOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FlowError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The endpoint string could not be parsed into service URLs.
    #[error("Invalid service endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Download errors ───────────────────────────────────────────────────
    /// The converted artifact could not be retrieved from the reference the
    /// service returned.
    #[error("Failed to retrieve converted file '{reference}': {reason}")]
    FetchFailed { reference: String, reason: String },

    /// Could not create or write the output CSV file.
    #[error("Failed to save output file '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal upload failure. The flow returns to `Ready`; no retry is
/// attempted automatically.
///
/// `Display` is the user-visible message: the transport or server message
/// when one exists, `"Conversion failed"` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The request never produced an HTTP response.
    #[error("{reason}")]
    Transport { reason: String },

    /// The service answered with a non-success status.
    #[error("{}", .message.as_deref().unwrap_or("Conversion failed"))]
    Rejected { status: u16, message: Option<String> },

    /// A success response arrived without a usable `output` reference.
    #[error("Conversion failed")]
    MissingOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_without_message_falls_back() {
        let e = UploadError::Rejected {
            status: 500,
            message: None,
        };
        assert_eq!(e.to_string(), "Conversion failed");
    }

    #[test]
    fn rejected_with_message_uses_it() {
        let e = UploadError::Rejected {
            status: 400,
            message: Some("Invalid file type. Only .xlsx files are allowed".into()),
        };
        assert!(e.to_string().contains("Only .xlsx"));
    }

    #[test]
    fn missing_output_falls_back() {
        let e = UploadError::MissingOutput;
        assert_eq!(e.to_string(), "Conversion failed");
    }

    #[test]
    fn transport_display_carries_reason() {
        let e = UploadError::Transport {
            reason: "connection refused".into(),
        };
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn invalid_endpoint_display() {
        let e = FlowError::InvalidEndpoint {
            endpoint: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("not a url"), "got: {msg}");
    }

    #[test]
    fn save_failed_keeps_source() {
        use std::error::Error as _;
        let e = FlowError::SaveFailed {
            path: PathBuf::from("/out/report.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("report.csv"));
        assert!(e.source().is_some());
    }
}
