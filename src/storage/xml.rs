//! Object-store XML documents

use crate::upload::plan::PartResult;
use crate::upload::RemoteError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// `<Error>` envelope returned by the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// `<InitiateMultipartUploadResult>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "Bucket", default)]
    pub bucket: Option<String>,
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
    #[serde(rename = "UploadId", default)]
    pub upload_id: Option<String>,
}

/// `<CompleteMultipartUploadResult>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "Location", default)]
    pub location: Option<String>,
    #[serde(rename = "Bucket", default)]
    pub bucket: Option<String>,
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
}

#[derive(Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload<'a> {
    #[serde(rename = "Part")]
    parts: Vec<CompletedPartXml<'a>>,
}

#[derive(Serialize)]
struct CompletedPartXml<'a> {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: &'a str,
}

/// Local name of the document's root element
pub fn root_element(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// The `<Error>` envelope in `body`, if that is what it holds
pub fn parse_error(body: &str) -> Option<ErrorEnvelope> {
    if root_element(body).as_deref() != Some("Error") {
        return None;
    }
    quick_xml::de::from_str(body).ok()
}

/// Describe a failed response: the envelope when present, the raw body otherwise
pub fn remote_error(status: u16, body: String) -> RemoteError {
    match parse_error(&body) {
        Some(envelope) => RemoteError::Service {
            status,
            code: envelope.code,
            message: envelope.message,
        },
        None => RemoteError::Raw { status, body },
    }
}

/// Parse `<InitiateMultipartUploadResult>`
pub fn parse_initiate(body: &str) -> Result<InitiateMultipartUploadResult, RemoteError> {
    quick_xml::de::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Parse `<CompleteMultipartUploadResult>`
pub fn parse_complete(body: &str) -> Result<CompleteMultipartUploadResult, RemoteError> {
    quick_xml::de::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Build the `<CompleteMultipartUpload>` document. `parts` must already be sorted.
pub fn complete_body(parts: &[PartResult]) -> Result<String, RemoteError> {
    let doc = CompleteMultipartUpload {
        parts: parts
            .iter()
            .map(|p| CompletedPartXml {
                part_number: p.part_number,
                etag: &p.etag,
            })
            .collect(),
    };
    quick_xml::se::to_string(&doc).map_err(|e| RemoteError::Malformed(e.to_string()))
}
