//! HTTP signing client

use super::{SignRequest, SignedRequest, SigningClient, SigningClientConfig};
use crate::upload::UploadError;
use async_trait::async_trait;

/// Signing client backed by a JSON-over-HTTP service
pub struct HttpSigningClient {
    config: SigningClientConfig,
    http_client: reqwest::Client,
}

impl HttpSigningClient {
    /// Create a new signing client
    pub fn new(config: SigningClientConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the signing endpoint
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl SigningClient for HttpSigningClient {
    #[tracing::instrument(
        name = "upload.sign",
        skip(self, request),
        fields(
            sign.action = %request.action,
            sign.part_number = ?request.part_number,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn request_signed_upload(
        &self,
        request: SignRequest<'_>,
    ) -> Result<SignedRequest, UploadError> {
        let action = request.action;
        let failed = |status: Option<u16>, body: String| UploadError::SigningFailed {
            action,
            status,
            body,
        };

        let mut builder = self.http_client.post(&self.config.endpoint).json(&request);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| failed(None, e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        let body = response
            .text()
            .await
            .map_err(|e| failed(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(failed(Some(status.as_u16()), body));
        }

        serde_json::from_str::<SignedRequest>(&body).map_err(|e| {
            tracing::debug!(error = %e, "Signing response is not a request descriptor");
            failed(Some(status.as_u16()), body)
        })
    }
}
