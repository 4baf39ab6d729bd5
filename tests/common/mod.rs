//! Common Test Infrastructure
//!
//! Provides shared utilities for integration tests:
//! - A signing service stand-in that hands out URLs on a mock store
//! - Object store responders for parts
//! - Test data generation

#![allow(dead_code)]

use ferry_uploadr::config::UploadConfig;
use ferry_uploadr::signing::{HttpSigningClient, SigningClientConfig};
use ferry_uploadr::upload::Uploader;
use rand::RngCore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path the signing service listens on
pub const SIGN_PATH: &str = "/v1/uploads/sign";

/// Bucket prefix used in presigned URLs
pub const BUCKET: &str = "test-bucket";

/// Upload id handed out by the mock store
pub const UPLOAD_ID: &str = "upload-id-12345";

/// Answers sign requests with URLs on the store mock.
///
/// Every URL carries the action in `X-Amz-Action` so the store mocks can
/// tell them apart.
pub struct SigningResponder {
    store_uri: String,
}

impl SigningResponder {
    pub fn new(store: &MockServer) -> Self {
        Self {
            store_uri: store.uri(),
        }
    }
}

impl Respond for SigningResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400).set_body_string("bad json"),
        };

        let action = body["action"].as_str().unwrap_or_default();
        let basename = body["basename"].as_str().unwrap_or_default();
        let object = format!("{}/{}/{}", self.store_uri, BUCKET, basename);

        let url = match action {
            "PutObject" => format!("{}?X-Amz-Action=PutObject", object),
            "CreateMultipartUpload" => {
                format!("{}?uploads&X-Amz-Action=CreateMultipartUpload", object)
            }
            "UploadPart" => format!(
                "{}?partNumber={}&uploadId={}&X-Amz-Action=UploadPart",
                object,
                body["partNumber"],
                body["uploadId"].as_str().unwrap_or_default()
            ),
            "CompleteMultipartUpload" | "AbortMultipartUpload" | "ListParts" => format!(
                "{}?uploadId={}&X-Amz-Action={}",
                object,
                body["uploadId"].as_str().unwrap_or_default(),
                action
            ),
            _ => return ResponseTemplate::new(400).set_body_string("unknown action"),
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "url": url,
            "options": {
                "headers": { "x-amz-signed-action": action }
            }
        }))
    }
}

/// Store responder for `UploadPart`: quoted ETag derived from the part number
pub struct PartResponder;

impl Respond for PartResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let part_number = query_value(request, "partNumber").unwrap_or_default();
        ResponseTemplate::new(200).insert_header("ETag", format!("\"etag-{}\"", part_number))
    }
}

/// Value of query parameter `key` in `request`
pub fn query_value(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Signing service and object store mocks for one test
pub struct TestEnv {
    pub signer: MockServer,
    pub store: MockServer,
}

impl TestEnv {
    pub async fn start() -> Self {
        let signer = MockServer::start().await;
        let store = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .respond_with(SigningResponder::new(&store))
            .mount(&signer)
            .await;

        Self { signer, store }
    }

    pub fn signing_endpoint(&self) -> String {
        format!("{}{}", self.signer.uri(), SIGN_PATH)
    }

    pub fn signing_client(&self) -> HttpSigningClient {
        HttpSigningClient::new(SigningClientConfig {
            endpoint: self.signing_endpoint(),
            token: Some("test-token".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    pub fn uploader(&self, config: UploadConfig) -> Uploader {
        Uploader::new(config, Arc::new(self.signing_client())).unwrap()
    }

    /// Object path on the store for `basename`
    pub fn object_path(basename: &str) -> String {
        format!("/{}/{}", BUCKET, basename)
    }

    /// Sign request bodies received so far, for `action`
    pub async fn sign_requests(&self, action: &str) -> Vec<Value> {
        self.signer
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter(|body| body["action"] == action)
            .collect()
    }

    /// Store requests received so far, for `action`
    pub async fn store_requests(&self, action: &str) -> Vec<Request> {
        self.store
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| query_value(r, "X-Amz-Action").as_deref() == Some(action))
            .collect()
    }
}

/// Upload settings small enough for tests: 1 KiB parts, no compression, no bar
pub fn test_upload_config() -> UploadConfig {
    UploadConfig {
        compress_threshold: u64::MAX,
        multipart_threshold: 4096,
        part_size: 1024,
        concurrent_parts: 3,
        progress_interval_ms: 20,
        show_progress: false,
        ..UploadConfig::default()
    }
}

/// `len` random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    data
}

/// Write `data` to `dir/name`
pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

pub fn initiate_xml(upload_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult>
    <Bucket>{}</Bucket>
    <Key>object</Key>
    <UploadId>{}</UploadId>
</InitiateMultipartUploadResult>"#,
        BUCKET, upload_id
    )
}

pub fn complete_xml(etag: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult>
    <Location>http://store/{}/object</Location>
    <Bucket>{}</Bucket>
    <Key>object</Key>
    <ETag>"{}"</ETag>
</CompleteMultipartUploadResult>"#,
        BUCKET, BUCKET, etag
    )
}

pub fn error_xml(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <RequestId>4442587FB7D0A2F9</RequestId>
</Error>"#,
        code, message
    )
}
