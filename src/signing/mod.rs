//! Signing client
//!
//! The uploader never holds storage credentials. Every storage call is made
//! against a short-lived request descriptor handed out by a signing service.
//!
//! # Wire format
//!
//! The service receives a JSON document describing the action:
//!
//! ```json
//! {"action":"UploadPart","basename":"dump.sql.gz","appId":1,"envId":2,"partNumber":3,"uploadId":"abc"}
//! ```
//!
//! and answers with the request to perform:
//!
//! ```json
//! {"url":"https://bucket.example.com/dump.sql.gz?partNumber=3&uploadId=abc&X-Amz-Signature=...",
//!  "options":{"method":"PUT","headers":{"x-amz-acl":"private"}}}
//! ```

use crate::upload::plan::PartResult;
use crate::upload::UploadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

mod http;

pub use http::HttpSigningClient;

/// Storage actions the signing service can authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignAction {
    PutObject,
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    ListParts,
}

impl SignAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignAction::PutObject => "PutObject",
            SignAction::CreateMultipartUpload => "CreateMultipartUpload",
            SignAction::UploadPart => "UploadPart",
            SignAction::CompleteMultipartUpload => "CompleteMultipartUpload",
            SignAction::AbortMultipartUpload => "AbortMultipartUpload",
            SignAction::ListParts => "ListParts",
        }
    }
}

impl fmt::Display for SignAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the upload belongs to and what it is called remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignContext {
    pub basename: String,
    pub app_id: u64,
    pub env_id: u64,
}

impl SignContext {
    pub fn new(basename: impl Into<String>, app_id: u64, env_id: u64) -> Self {
        Self {
            basename: basename.into(),
            app_id,
            env_id,
        }
    }
}

/// Body posted to the signing service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest<'a> {
    pub action: SignAction,
    pub basename: &'a str,
    pub app_id: u64,
    pub env_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag_results: Option<&'a [PartResult]>,
}

impl<'a> SignRequest<'a> {
    pub fn new(action: SignAction, context: &'a SignContext) -> Self {
        Self {
            action,
            basename: &context.basename,
            app_id: context.app_id,
            env_id: context.env_id,
            part_number: None,
            upload_id: None,
            etag_results: None,
        }
    }

    pub fn part_number(mut self, part_number: u32) -> Self {
        self.part_number = Some(part_number);
        self
    }

    pub fn upload_id(mut self, upload_id: &'a str) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    pub fn etag_results(mut self, results: &'a [PartResult]) -> Self {
        self.etag_results = Some(results);
        self
    }
}

/// A presigned request descriptor. Use it once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub url: String,
    #[serde(default)]
    pub options: SignedRequestOptions,
}

/// Request options returned alongside the URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequestOptions {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Prepared request body, used by `CompleteMultipartUpload`
    #[serde(default)]
    pub body: Option<String>,
}

impl SignedRequest {
    /// HTTP method to use, falling back to the action's conventional verb
    pub fn method_or(&self, default: &str) -> String {
        self.options
            .method
            .as_deref()
            .unwrap_or(default)
            .to_ascii_uppercase()
    }
}

/// Source of presigned requests
#[async_trait]
pub trait SigningClient: Send + Sync {
    /// Ask for a presigned request for `request.action`
    async fn request_signed_upload(
        &self,
        request: SignRequest<'_>,
    ) -> Result<SignedRequest, UploadError>;
}

/// Signing client settings
#[derive(Debug, Clone)]
pub struct SigningClientConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout: Duration,
}
