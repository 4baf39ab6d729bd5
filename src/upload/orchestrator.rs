//! Upload orchestrator
//!
//! Inspect, optionally compress, plan, then upload with the chosen strategy.

use super::multipart::MultipartCoordinator;
use super::plan::{plan_upload, Strategy};
use super::put_object::{PutObjectHandler, PutObjectResult};
use super::UploadError;
use crate::compress::{needs_compression, Compressor};
use crate::config::{Config, UploadConfig};
use crate::inspect::{inspect_file, FileMeta};
use crate::metrics;
use crate::signing::{HttpSigningClient, SignContext, SigningClient};
use crate::storage::xml::CompleteMultipartUploadResult;
use crate::storage::StorageClient;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Remote result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    PutObject(PutObjectResult),
    Multipart(CompleteMultipartUploadResult),
}

impl UploadResult {
    pub fn etag(&self) -> Option<&str> {
        match self {
            UploadResult::PutObject(r) => r.etag.as_deref(),
            UploadResult::Multipart(r) => r.etag.as_deref(),
        }
    }
}

/// What [`Uploader::upload`] returns
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Metadata as uploaded. After compression `file_name` points at a copy
    /// that has already been removed.
    pub file_meta: FileMeta,
    pub strategy: Strategy,
    pub result: UploadResult,
}

/// Entry point for uploading one file
pub struct Uploader {
    config: UploadConfig,
    signer: Arc<dyn SigningClient>,
    storage: StorageClient,
}

impl Uploader {
    pub fn new(config: UploadConfig, signer: Arc<dyn SigningClient>) -> Result<Self, reqwest::Error> {
        Ok(Self::with_storage(config, signer, StorageClient::new()?))
    }

    pub fn with_storage(
        config: UploadConfig,
        signer: Arc<dyn SigningClient>,
        storage: StorageClient,
    ) -> Self {
        Self {
            config,
            signer,
            storage,
        }
    }

    /// Build an uploader that signs through the configured HTTP service
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let signer = HttpSigningClient::new(config.signing.client_config())?;
        Self::new(config.upload.clone(), Arc::new(signer))
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload the file at `path` on behalf of `app_id`/`env_id`
    pub async fn upload(
        &self,
        path: impl AsRef<Path>,
        app_id: u64,
        env_id: u64,
    ) -> Result<UploadOutcome, UploadError> {
        let start_time = Instant::now();
        let mut meta = inspect_file(path).await.inspect_err(record_failure)?;
        // Checked before compression, which would turn nothing into a gzip header
        if meta.file_size == 0 {
            let err = UploadError::InvalidFileSize(0);
            record_failure(&err);
            return Err(err);
        }

        // Held until the upload finishes so the compressed copy outlives it
        let _compressor = if needs_compression(&meta, self.config.compress_threshold) {
            let compressor = Compressor::new()
                .map_err(|source| UploadError::CompressionFailed {
                    path: meta.file_name.clone(),
                    source,
                })
                .inspect_err(record_failure)?;
            compressor
                .compress(&mut meta)
                .await
                .inspect_err(record_failure)?;
            Some(compressor)
        } else {
            None
        };

        let plan = plan_upload(
            meta.file_size,
            self.config.multipart_threshold,
            self.config.part_size,
        )
        .inspect_err(record_failure)?;
        let strategy = plan.strategy;
        let context = SignContext::new(meta.basename.clone(), app_id, env_id);

        tracing::info!(
            basename = %meta.basename,
            file_size = meta.file_size,
            is_compressed = meta.is_compressed,
            strategy = strategy.as_str(),
            parts = plan.parts.len(),
            "Starting upload"
        );

        let result = match strategy {
            Strategy::Single => PutObjectHandler::new(self.storage.clone(), self.signer.clone())
                .with_progress(self.config.progress_interval(), self.config.show_progress)
                .upload(&meta, &context)
                .await
                .map(UploadResult::PutObject),
            Strategy::Multipart => MultipartCoordinator::new(
                self.storage.clone(),
                self.signer.clone(),
                self.config.clone(),
            )
            .upload(&meta, &context, plan.parts)
            .await
            .map(UploadResult::Multipart),
        };

        let duration = start_time.elapsed();
        metrics::record_upload_duration(strategy.as_str(), duration.as_secs_f64());

        match result {
            Ok(result) => {
                metrics::record_upload_success(strategy.as_str(), meta.file_size);
                tracing::info!(
                    basename = %meta.basename,
                    etag = ?result.etag(),
                    duration_ms = duration.as_millis() as u64,
                    "Upload completed"
                );
                Ok(UploadOutcome {
                    file_meta: meta,
                    strategy,
                    result,
                })
            }
            Err(e) => {
                metrics::record_upload_failure(strategy.as_str());
                metrics::record_error(e.kind());
                tracing::error!(
                    basename = %meta.basename,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    "Upload failed"
                );
                Err(e)
            }
        }
    }
}

/// Failures before a strategy is chosen
fn record_failure(e: &UploadError) {
    metrics::record_error(e.kind());
    tracing::error!(error = %e, "Upload failed before transfer");
}
