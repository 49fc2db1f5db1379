//! The conversion-service boundary: upload, artifact retrieval, cleanup.
//!
//! The service is an external collaborator with two fixed endpoints plus the
//! artifact reference its upload response hands back:
//!
//! * `POST {endpoint}/upload`: multipart form, field `file`; success is a
//!   2xx with a JSON body whose `output` field references the converted CSV.
//! * `GET {output}`: the artifact body itself.
//! * `DELETE {endpoint}/cleanup`: no body; asks the service to clear its
//!   temporary files. Fire-and-forget at the call site.
//!
//! All three go through the [`ConvertService`] trait so tests and embedders
//! can substitute the transport wholesale; [`HttpConvertService`] is the
//! reqwest-backed implementation the controller builds from an endpoint.

use crate::error::{FlowError, UploadError};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Server-returned reference to the converted artifact. Created when the
/// upload response is received; consumed exactly once by the download step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    /// Opaque reference (in practice a URL) to the converted CSV.
    pub output: String,
}

/// The remote conversion service, as seen by the flow controller.
#[async_trait]
pub trait ConvertService: Send + Sync {
    /// Upload the workbook at `path` as multipart field `file` and return
    /// the artifact reference from the response body.
    async fn upload(&self, path: &Path, file_name: &str) -> Result<ConvertedArtifact, UploadError>;

    /// Retrieve the converted artifact's bytes.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, UploadError>;

    /// Ask the service to delete its temporary files.
    async fn cleanup(&self) -> Result<(), UploadError>;
}

// ── Wire bodies ──────────────────────────────────────────────────────────

/// Successful `/upload` response. The service also sends `success`,
/// `message`, and `input` fields; only `output` matters here.
#[derive(Debug, Deserialize)]
struct UploadBody {
    output: String,
}

/// Failure body the service sends with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// [`ConvertService`] over HTTP via reqwest.
#[derive(Debug)]
pub struct HttpConvertService {
    client: reqwest::Client,
    upload_url: reqwest::Url,
    cleanup_url: reqwest::Url,
}

impl HttpConvertService {
    /// Build a service client for the given base endpoint.
    ///
    /// The endpoint is normalised so trailing-slash differences do not
    /// change the target URLs.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, FlowError> {
        let base = endpoint.trim_end_matches('/');
        let parse = |url: String| {
            reqwest::Url::parse(&url).map_err(|e| FlowError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
        };
        let upload_url = parse(format!("{base}/upload"))?;
        let cleanup_url = parse(format!("{base}/cleanup"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FlowError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            upload_url,
            cleanup_url,
        })
    }
}

#[async_trait]
impl ConvertService for HttpConvertService {
    async fn upload(&self, path: &Path, file_name: &str) -> Result<ConvertedArtifact, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Transport {
                reason: format!("failed to read '{}': {e}", path.display()),
            })?;

        let part = multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = multipart::Form::new().part("file", part);

        debug!("POST {}", self.upload_url);
        let response = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            // The failure body's `error` field becomes the user-visible
            // message when present; Display falls back otherwise.
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadBody = response
            .json()
            .await
            .map_err(|_| UploadError::MissingOutput)?;

        Ok(ConvertedArtifact {
            output: body.output,
        })
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, UploadError> {
        debug!("GET {reference}");
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message: None,
            });
        }

        let bytes = response.bytes().await.map_err(|e| UploadError::Transport {
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn cleanup(&self) -> Result<(), UploadError> {
        debug!("DELETE {}", self.cleanup_url);
        let response = self
            .client
            .delete(self.cleanup_url.clone())
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message: None,
            });
        }
        Ok(())
    }
}
