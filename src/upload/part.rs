//! Part uploader
//!
//! Streams one byte range of the file as an `UploadPart` request and turns
//! the response into a [`PartResult`].

use super::plan::{PartBoundary, PartResult};
use super::progress::ProgressTracker;
use super::{RemoteError, UploadError};
use crate::config::RetryConfig;
use crate::metrics;
use crate::signing::{SignAction, SignContext, SignRequest, SignedRequest, SigningClient};
use crate::storage::{range_body, unquote_etag, xml, StorageClient};
use std::path::PathBuf;
use std::sync::Arc;

/// Uploads parts of one multipart session
pub struct PartUploader {
    storage: StorageClient,
    signer: Arc<dyn SigningClient>,
    file_name: PathBuf,
    context: SignContext,
    upload_id: String,
    retry: RetryConfig,
}

impl PartUploader {
    pub fn new(
        storage: StorageClient,
        signer: Arc<dyn SigningClient>,
        file_name: PathBuf,
        context: SignContext,
        upload_id: String,
        retry: RetryConfig,
    ) -> Self {
        Self {
            storage,
            signer,
            file_name,
            context,
            upload_id,
            retry,
        }
    }

    /// Sign and upload `part`, retrying per the retry policy.
    ///
    /// Each attempt gets a fresh signature and re-reads the range. Signing
    /// failures are returned immediately.
    pub async fn upload(
        &self,
        part: PartBoundary,
        progress: Arc<ProgressTracker>,
    ) -> Result<PartResult, UploadError> {
        let part_number = part.part_number();
        let mut attempt = 1;

        loop {
            let signed = self
                .signer
                .request_signed_upload(
                    SignRequest::new(SignAction::UploadPart, &self.context)
                        .part_number(part_number)
                        .upload_id(&self.upload_id),
                )
                .await?;

            match self.send(&signed, &part, progress.clone()).await {
                Ok(result) => {
                    metrics::record_part("success");
                    return Ok(result);
                }
                Err(error) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        part_number = part_number,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Part upload failed, retrying"
                    );
                    metrics::record_part("retry");
                    progress.reset(part.index);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    metrics::record_part("failure");
                    return Err(UploadError::PartUploadFailed { part_number, error });
                }
            }
        }
    }

    /// One `UploadPart` request for `part` using `signed`
    #[tracing::instrument(
        name = "upload.multipart.upload_part",
        skip(self, signed, part, progress),
        fields(
            upload_id = %self.upload_id,
            part_number = part.part_number(),
            upload.bytes = part.part_size,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn send(
        &self,
        signed: &SignedRequest,
        part: &PartBoundary,
        progress: Arc<ProgressTracker>,
    ) -> Result<PartResult, RemoteError> {
        let index = part.index;
        let body = range_body(&self.file_name, part.start, part.end, move |n| {
            progress.record(index, n)
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("reading part: {}", e)))?;

        let response = self.storage.execute(signed, "PUT", Some(body)).await?;
        tracing::Span::current().record("http.status_code", response.status);

        if response.status != 200 {
            return Err(xml::remote_error(response.status, response.body));
        }

        let etag = response
            .etag
            .ok_or_else(|| RemoteError::Malformed("UploadPart response has no ETag".into()))?;

        tracing::debug!(part_number = part.part_number(), etag = %etag, "Uploaded part");

        Ok(PartResult::new(part.part_number(), unquote_etag(&etag)))
    }
}
