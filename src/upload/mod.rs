//! Upload module
//!
//! Moves a local file to presigned object storage, either as one `PutObject`
//! or as a concurrent multipart session.

use crate::signing::SignAction;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod multipart;
pub mod orchestrator;
pub mod part;
pub mod plan;
pub mod progress;
pub mod put_object;
pub mod scheduler;

pub use multipart::{MultipartCoordinator, MultipartSession, SessionState};
pub use orchestrator::{UploadOutcome, UploadResult, Uploader};
pub use plan::{plan_upload, PartBoundary, Strategy, UploadPlan};
pub use put_object::{PutObjectHandler, PutObjectResult};

/// Why a remote call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store answered with an `<Error>` envelope
    Service {
        status: u16,
        code: String,
        message: String,
    },
    /// Non-success status with a body that is not an error envelope
    Raw { status: u16, body: String },
    /// Connection, TLS or local read failure
    Transport(String),
    /// Response was well-formed HTTP but missing something we need
    Malformed(String),
}

impl RemoteError {
    /// Error code from the envelope, if the store sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Service {
                status,
                code,
                message,
            } => write!(f, "{} {}: {}", status, code, message),
            RemoteError::Raw { status, body } => write!(f, "HTTP {}: {}", status, body),
            RemoteError::Transport(e) => write!(f, "transport error: {}", e),
            RemoteError::Malformed(e) => write!(f, "malformed response: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File not readable: {path}: {source}")]
    FileNotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file size: {0} bytes")]
    InvalidFileSize(u64),

    #[error("Compression failed for {path}: {source}")]
    CompressionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Signing failed for {action}: {}", signing_detail(.status, .body))]
    SigningFailed {
        action: SignAction,
        status: Option<u16>,
        body: String,
    },

    #[error("PutObject failed: {0}")]
    PutObjectFailed(RemoteError),

    #[error("CreateMultipartUpload failed: {0}")]
    SessionCreateFailed(RemoteError),

    #[error("UploadPart {part_number} failed: {error}")]
    PartUploadFailed { part_number: u32, error: RemoteError },

    #[error("CompleteMultipartUpload failed: {0}")]
    CompletionFailed(RemoteError),

    #[error("AbortMultipartUpload failed: {0}")]
    AbortFailed(RemoteError),

    #[error("Part scheduler error: {0}")]
    Scheduler(String),
}

fn signing_detail(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("HTTP {}: {}", status, body),
        None => body.to_string(),
    }
}

impl UploadError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::FileNotReadable { .. } => "file_not_readable",
            UploadError::InvalidFileSize(_) => "invalid_file_size",
            UploadError::CompressionFailed { .. } => "compression_failed",
            UploadError::SigningFailed { .. } => "signing_failed",
            UploadError::PutObjectFailed(_) => "put_object_failed",
            UploadError::SessionCreateFailed(_) => "session_create_failed",
            UploadError::PartUploadFailed { .. } => "part_upload_failed",
            UploadError::CompletionFailed(_) => "completion_failed",
            UploadError::AbortFailed(_) => "abort_failed",
            UploadError::Scheduler(_) => "scheduler",
        }
    }

    /// Structured remote detail, when the failure came from the store
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            UploadError::PutObjectFailed(e)
            | UploadError::SessionCreateFailed(e)
            | UploadError::CompletionFailed(e)
            | UploadError::AbortFailed(e) => Some(e),
            UploadError::PartUploadFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}
