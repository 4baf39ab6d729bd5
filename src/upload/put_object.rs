//! PutObject handler
//!
//! Handles single-request uploads for files under the multipart threshold.
//! The whole file is streamed as the body with `Content-Length` set from the
//! inspected size.

use super::plan::part_boundaries;
use super::progress::{ProgressReporter, ProgressTracker};
use super::UploadError;
use crate::inspect::FileMeta;
use crate::signing::{SignAction, SignContext, SignRequest, SigningClient};
use crate::storage::{range_body, unquote_etag, xml, StorageClient};
use std::sync::Arc;
use std::time::Duration;

/// Result of a single-request upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectResult {
    /// ETag from the response, unquoted
    pub etag: Option<String>,
    pub bytes_written: u64,
}

/// Single-request upload handler
pub struct PutObjectHandler {
    storage: StorageClient,
    signer: Arc<dyn SigningClient>,
    progress_interval: Duration,
    show_progress: bool,
}

impl PutObjectHandler {
    pub fn new(storage: StorageClient, signer: Arc<dyn SigningClient>) -> Self {
        Self {
            storage,
            signer,
            progress_interval: super::progress::DEFAULT_PROGRESS_INTERVAL,
            show_progress: false,
        }
    }

    /// Draw a progress bar every `interval` while the body streams
    pub fn with_progress(mut self, interval: Duration, visible: bool) -> Self {
        self.progress_interval = interval;
        self.show_progress = visible;
        self
    }

    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, meta, context),
        fields(
            object.key = %context.basename,
            upload.bytes = meta.file_size,
            http.status_code = tracing::field::Empty,
            object.etag = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        meta: &FileMeta,
        context: &SignContext,
    ) -> Result<PutObjectResult, UploadError> {
        // One part spanning the file; also rejects empty files
        let whole = part_boundaries(meta.file_size, meta.file_size)?;

        let signed = self
            .signer
            .request_signed_upload(SignRequest::new(SignAction::PutObject, context))
            .await?;

        let tracker = Arc::new(ProgressTracker::new(&whole));
        let reporter =
            ProgressReporter::start(tracker.clone(), self.progress_interval, self.show_progress);

        let on_chunk = {
            let tracker = tracker.clone();
            move |n| tracker.record(0, n)
        };
        let body = range_body(&meta.file_name, 0, meta.file_size - 1, on_chunk)
            .await
            .map_err(|e| UploadError::FileNotReadable {
                path: meta.file_name.clone(),
                source: e,
            })?;

        let response = self
            .storage
            .execute(&signed, "PUT", Some(body))
            .await
            .map_err(UploadError::PutObjectFailed)?;

        let span = tracing::Span::current();
        span.record("http.status_code", response.status);

        if response.status != 200 {
            return Err(UploadError::PutObjectFailed(xml::remote_error(
                response.status,
                response.body,
            )));
        }
        reporter.finish();

        let result = PutObjectResult {
            etag: response.etag.as_deref().map(unquote_etag),
            bytes_written: meta.file_size,
        };

        if let Some(etag) = &result.etag {
            span.record("object.etag", etag.as_str());
        }
        tracing::info!(
            etag = ?result.etag,
            bytes_written = result.bytes_written,
            "PutObject upload completed"
        );

        Ok(result)
    }
}
