//! Content inspection
//!
//! Size, remote name, compressed-format sniffing and MD5 of a local file.
//! Reads only; never touches the filesystem otherwise.

use crate::upload::UploadError;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read buffer for checksumming
pub const HASH_BUFFER_SIZE: usize = 65536; // 64KB

/// Magic prefixes of formats we treat as already compressed
const COMPRESSED_SIGNATURES: &[(&str, &[u8])] = &[
    ("zip", &[0x50, 0x4b, 0x03, 0x04]),
    ("zip-empty", &[0x50, 0x4b, 0x05, 0x06]),
    ("zip-spanned", &[0x50, 0x4b, 0x07, 0x08]),
    ("gzip", &[0x1f, 0x8b, 0x08]),
];

/// Bytes read from the head of the file for sniffing
const SNIFF_LEN: usize = 9;

/// What we know about the file being uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Object name in storage
    pub basename: String,
    /// Current local path (the compressed copy once compressed)
    pub file_name: PathBuf,
    pub file_size: u64,
    pub is_compressed: bool,
    /// Hex MD5 of the original content. Not updated by compression.
    pub md5: String,
}

/// Inspect `path` and build its [`FileMeta`]
#[tracing::instrument(name = "upload.inspect", skip_all, fields(file = %path.as_ref().display()), err)]
pub async fn inspect_file(path: impl AsRef<Path>) -> Result<FileMeta, UploadError> {
    let path = path.as_ref();
    let not_readable = |source| UploadError::FileNotReadable {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(not_readable)?;
    if !metadata.is_file() {
        return Err(not_readable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            not_readable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;

    let is_compressed = detect_compressed(path).await.map_err(not_readable)?;
    let md5 = md5_file(path).await.map_err(not_readable)?;

    let meta = FileMeta {
        basename,
        file_name: path.to_path_buf(),
        file_size: metadata.len(),
        is_compressed,
        md5,
    };

    tracing::debug!(
        basename = %meta.basename,
        size = meta.file_size,
        compressed = meta.is_compressed,
        md5 = %meta.md5,
        "Inspected file"
    );

    Ok(meta)
}

/// True when the file starts with a known compressed-format signature
pub async fn detect_compressed(path: impl AsRef<Path>) -> std::io::Result<bool> {
    let mut file = File::open(path).await?;
    let mut head = [0u8; SNIFF_LEN];
    let mut filled = 0;

    while filled < SNIFF_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(matches_signature(&head[..filled]).is_some())
}

/// Name of the signature `head` starts with, if any
pub fn matches_signature(head: &[u8]) -> Option<&'static str> {
    COMPRESSED_SIGNATURES
        .iter()
        .find(|(_, magic)| head.starts_with(magic))
        .map(|(name, _)| *name)
}

/// Stream the file through MD5 and return the hex digest
pub async fn md5_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(hex::encode(context.compute().0))
}
