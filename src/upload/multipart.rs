//! Multipart upload coordinator
//!
//! Drives one session through `Created -> PartsInFlight -> Completing ->
//! Completed`. Any failure moves it to `Failed`.

use super::part::PartUploader;
use super::plan::{PartBoundary, PartResult};
use super::scheduler::PartScheduler;
use super::{RemoteError, UploadError};
use crate::config::UploadConfig;
use crate::inspect::FileMeta;
use crate::metrics;
use crate::signing::{SignAction, SignContext, SignRequest, SigningClient};
use crate::storage::xml::{self, CompleteMultipartUploadResult};
use crate::storage::{SizedBody, StorageClient};
use std::sync::Arc;

/// Multipart session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    PartsInFlight,
    Completing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Remote session state held for one upload
#[derive(Debug)]
pub struct MultipartSession {
    pub upload_id: String,
    parts: Vec<PartBoundary>,
    results: Vec<PartResult>,
    state: SessionState,
}

impl MultipartSession {
    pub fn new(upload_id: impl Into<String>, parts: Vec<PartBoundary>) -> Self {
        Self {
            upload_id: upload_id.into(),
            parts,
            results: Vec::new(),
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn parts(&self) -> &[PartBoundary] {
        &self.parts
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            upload_id = %self.upload_id,
            from = ?self.state,
            to = ?next,
            "Multipart session transition"
        );
        self.state = next;
    }

    /// Mark the session failed unless it already finished
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.transition(SessionState::Failed);
        }
    }

    /// Add part results in whatever order they finished
    pub fn record_results(&mut self, results: impl IntoIterator<Item = PartResult>) {
        self.results.extend(results);
    }

    /// Results sorted by part number, once every part has exactly one.
    pub fn completed_parts(&self) -> Result<Vec<PartResult>, RemoteError> {
        let mut sorted = self.results.clone();
        sorted.sort_by_key(|r| r.part_number);

        if sorted.len() != self.parts.len() {
            return Err(RemoteError::Malformed(format!(
                "{} of {} parts have results",
                sorted.len(),
                self.parts.len()
            )));
        }

        for (expected, result) in (1u32..).zip(&sorted) {
            if result.part_number != expected {
                return Err(RemoteError::Malformed(format!(
                    "part numbers are not contiguous: expected {}, found {}",
                    expected, result.part_number
                )));
            }
        }

        Ok(sorted)
    }
}

/// Runs multipart sessions against the signing service and the store
pub struct MultipartCoordinator {
    storage: StorageClient,
    signer: Arc<dyn SigningClient>,
    config: UploadConfig,
}

impl MultipartCoordinator {
    pub fn new(
        storage: StorageClient,
        signer: Arc<dyn SigningClient>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            signer,
            config,
        }
    }

    /// Upload `meta.file_name` as `parts` and complete the object.
    ///
    /// With `abort_on_failure` the remote session is aborted before the
    /// original error is returned.
    pub async fn upload(
        &self,
        meta: &FileMeta,
        context: &SignContext,
        parts: Vec<PartBoundary>,
    ) -> Result<CompleteMultipartUploadResult, UploadError> {
        let parts_count = parts.len();
        let mut session = self.create(context, parts).await?;

        let outcome = match self.upload_parts(&mut session, meta, context).await {
            Ok(()) => self.complete(&mut session, context).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                metrics::record_multipart_parts(parts_count);
                Ok(result)
            }
            Err(e) => {
                session.fail();
                if self.config.abort_on_failure {
                    if let Err(abort_err) = self.abort(&session, context).await {
                        tracing::warn!(
                            upload_id = %session.upload_id,
                            error = %abort_err,
                            "Could not abort failed multipart upload"
                        );
                    }
                } else {
                    tracing::warn!(
                        upload_id = %session.upload_id,
                        "Multipart upload failed; remote session left open"
                    );
                }
                Err(e)
            }
        }
    }

    /// Open a session and return it in `Created`
    #[tracing::instrument(
        name = "upload.multipart.create",
        skip(self, context, parts),
        fields(
            object.key = %context.basename,
            parts_count = parts.len(),
            upload_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn create(
        &self,
        context: &SignContext,
        parts: Vec<PartBoundary>,
    ) -> Result<MultipartSession, UploadError> {
        let signed = self
            .signer
            .request_signed_upload(SignRequest::new(SignAction::CreateMultipartUpload, context))
            .await?;

        let response = self
            .storage
            .execute(&signed, "POST", None)
            .await
            .map_err(UploadError::SessionCreateFailed)?;
        tracing::Span::current().record("http.status_code", response.status);

        if let Some(envelope) = xml::parse_error(&response.body) {
            return Err(UploadError::SessionCreateFailed(RemoteError::Service {
                status: response.status,
                code: envelope.code,
                message: envelope.message,
            }));
        }
        if !response.is_success() {
            return Err(UploadError::SessionCreateFailed(xml::remote_error(
                response.status,
                response.body,
            )));
        }

        let upload_id = xml::parse_initiate(&response.body)
            .map_err(UploadError::SessionCreateFailed)?
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                UploadError::SessionCreateFailed(RemoteError::Malformed(
                    "response has no UploadId".into(),
                ))
            })?;

        tracing::Span::current().record("upload_id", upload_id.as_str());
        tracing::info!(upload_id = %upload_id, "Created multipart upload");

        Ok(MultipartSession::new(upload_id, parts))
    }

    /// Upload every part of `session` through the scheduler
    pub async fn upload_parts(
        &self,
        session: &mut MultipartSession,
        meta: &FileMeta,
        context: &SignContext,
    ) -> Result<(), UploadError> {
        session.transition(SessionState::PartsInFlight);

        let uploader = Arc::new(PartUploader::new(
            self.storage.clone(),
            self.signer.clone(),
            meta.file_name.clone(),
            context.clone(),
            session.upload_id.clone(),
            self.config.retry.clone(),
        ));

        let scheduler = PartScheduler::from_config(&self.config);
        tracing::info!(
            upload_id = %session.upload_id,
            parts = session.parts().len(),
            concurrency = scheduler.concurrency(),
            "Uploading parts"
        );

        let results = scheduler
            .run(session.parts(), |part, progress| {
                let uploader = uploader.clone();
                async move { uploader.upload(part, progress).await }
            })
            .await?;

        session.record_results(results);
        Ok(())
    }

    /// Submit the sorted part list and confirm the object was assembled.
    ///
    /// The store can report failure inside a 200 response, so the body is
    /// always checked for an `<Error>` envelope.
    #[tracing::instrument(
        name = "upload.multipart.complete",
        skip(self, session, context),
        fields(
            upload_id = %session.upload_id,
            parts_count = session.parts().len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete(
        &self,
        session: &mut MultipartSession,
        context: &SignContext,
    ) -> Result<CompleteMultipartUploadResult, UploadError> {
        let parts = session
            .completed_parts()
            .map_err(UploadError::CompletionFailed)?;
        session.transition(SessionState::Completing);

        let signed = self
            .signer
            .request_signed_upload(
                SignRequest::new(SignAction::CompleteMultipartUpload, context)
                    .upload_id(&session.upload_id)
                    .etag_results(&parts),
            )
            .await?;

        let body = match &signed.options.body {
            Some(_) => None,
            None => {
                let document = xml::complete_body(&parts).map_err(UploadError::CompletionFailed)?;
                Some(SizedBody {
                    content_length: document.len() as u64,
                    body: document.into(),
                })
            }
        };

        let response = self
            .storage
            .execute(&signed, "POST", body)
            .await
            .map_err(UploadError::CompletionFailed)?;
        tracing::Span::current().record("http.status_code", response.status);

        if let Some(envelope) = xml::parse_error(&response.body) {
            return Err(UploadError::CompletionFailed(RemoteError::Service {
                status: response.status,
                code: envelope.code,
                message: envelope.message,
            }));
        }
        if !response.is_success() {
            return Err(UploadError::CompletionFailed(xml::remote_error(
                response.status,
                response.body,
            )));
        }

        let result = if response.body.trim().is_empty() {
            CompleteMultipartUploadResult::default()
        } else {
            xml::parse_complete(&response.body).map_err(UploadError::CompletionFailed)?
        };

        session.transition(SessionState::Completed);
        tracing::info!(
            upload_id = %session.upload_id,
            etag = ?result.etag,
            "Completed multipart upload"
        );

        Ok(result)
    }

    /// Abort the remote session
    #[tracing::instrument(
        name = "upload.multipart.abort",
        skip(self, session, context),
        fields(upload_id = %session.upload_id),
        err
    )]
    pub async fn abort(
        &self,
        session: &MultipartSession,
        context: &SignContext,
    ) -> Result<(), UploadError> {
        let signed = self
            .signer
            .request_signed_upload(
                SignRequest::new(SignAction::AbortMultipartUpload, context)
                    .upload_id(&session.upload_id),
            )
            .await?;

        let response = self
            .storage
            .execute(&signed, "DELETE", None)
            .await
            .map_err(UploadError::AbortFailed)?;

        if !response.is_success() {
            return Err(UploadError::AbortFailed(xml::remote_error(
                response.status,
                response.body,
            )));
        }

        tracing::info!(upload_id = %session.upload_id, "Aborted multipart upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::plan::part_boundaries;

    #[test]
    fn test_completed_parts_sorted_regardless_of_finish_order() {
        let mut session = MultipartSession::new("u", part_boundaries(30, 10).unwrap());
        session.record_results(vec![
            PartResult::new(3, "c"),
            PartResult::new(1, "a"),
            PartResult::new(2, "b"),
        ]);

        let sorted = session.completed_parts().unwrap();
        let numbers: Vec<u32> = sorted.iter().map(|r| r.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(sorted[0].etag, "a");
    }

    #[test]
    fn test_completion_refused_with_missing_parts() {
        let mut session = MultipartSession::new("u", part_boundaries(30, 10).unwrap());
        session.record_results(vec![PartResult::new(1, "a"), PartResult::new(3, "c")]);
        assert!(session.completed_parts().is_err());
    }

    #[test]
    fn test_completion_refused_with_duplicate_parts() {
        let mut session = MultipartSession::new("u", part_boundaries(20, 10).unwrap());
        session.record_results(vec![PartResult::new(1, "a"), PartResult::new(1, "b")]);
        assert!(session.completed_parts().is_err());
    }

    #[test]
    fn test_fail_keeps_terminal_state() {
        let mut session = MultipartSession::new("u", part_boundaries(10, 10).unwrap());
        assert_eq!(session.state(), SessionState::Created);

        session.transition(SessionState::Completed);
        session.fail();
        assert_eq!(session.state(), SessionState::Completed);

        let mut session = MultipartSession::new("u", part_boundaries(10, 10).unwrap());
        session.transition(SessionState::PartsInFlight);
        session.fail();
        assert_eq!(session.state(), SessionState::Failed);
    }
}
