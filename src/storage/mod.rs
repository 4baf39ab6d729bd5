//! Object-store HTTP plumbing
//!
//! Executes presigned request descriptors and reads back what the store
//! answered. Knows nothing about which action it is performing; callers
//! decide what a response means.

use crate::signing::SignedRequest;
use crate::upload::RemoteError;
use std::time::Duration;

pub mod body;
pub mod xml;

pub use body::{range_body, SizedBody};

/// Connect timeout for storage requests. Transfers themselves are unbounded.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status, ETag and body of a store response
#[derive(Debug, Clone)]
pub struct StorageResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: String,
}

impl StorageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client for presigned storage requests
#[derive(Clone)]
pub struct StorageClient {
    http_client: reqwest::Client,
}

impl StorageClient {
    /// Create a new storage client
    pub fn new() -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http_client })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Perform `signed` with an optional sized body.
    ///
    /// `default_method` is used when the descriptor does not name one.
    /// A prepared body inside the descriptor is only sent when `body` is `None`.
    pub async fn execute(
        &self,
        signed: &SignedRequest,
        default_method: &str,
        body: Option<SizedBody>,
    ) -> Result<StorageResponse, RemoteError> {
        let method_name = signed.method_or(default_method);
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| RemoteError::Malformed(format!("invalid method '{}'", method_name)))?;

        let mut request = self.http_client.request(method, &signed.url);
        for (name, value) in &signed.options.headers {
            request = request.header(name, value);
        }

        request = match body {
            Some(sized) => request
                .header(reqwest::header::CONTENT_LENGTH, sized.content_length)
                .body(sized.body),
            None => match &signed.options.body {
                Some(prepared) => request.body(prepared.clone()),
                None => request.header(reqwest::header::CONTENT_LENGTH, 0),
            },
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(StorageResponse { status, etag, body })
    }
}

/// Strip the JSON quoting stores put around ETag values.
///
/// Values that are not JSON strings are returned unchanged.
pub fn unquote_etag(raw: &str) -> String {
    serde_json::from_str::<String>(raw.trim()).unwrap_or_else(|_| raw.trim().to_string())
}
