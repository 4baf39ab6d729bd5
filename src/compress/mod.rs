//! Gzip compression into a scoped temp directory
//!
//! The directory is removed when the [`Compressor`] is dropped, whether the
//! upload succeeded or not.

use crate::inspect::FileMeta;
use crate::upload::UploadError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Default size at which uncompressed files get gzipped (16 MiB)
pub const DEFAULT_COMPRESS_THRESHOLD: u64 = 16 * 1024 * 1024;

const GZ_SUFFIX: &str = ".gz";

/// Whether the orchestrator should compress this file first
pub fn needs_compression(meta: &FileMeta, threshold: u64) -> bool {
    !meta.is_compressed && meta.file_size >= threshold
}

/// `name` with a single `.gz` suffix
pub fn gz_name(name: &str) -> String {
    if name.ends_with(GZ_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, GZ_SUFFIX)
    }
}

/// Owns the temp directory compressed copies are written to
pub struct Compressor {
    dir: TempDir,
}

impl Compressor {
    /// Create a compressor with a fresh temp directory
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("ferry-uploadr-").tempdir()?;
        Ok(Self { dir })
    }

    /// Directory compressed files are written to
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Gzip `meta.file_name` and point `meta` at the compressed copy.
    ///
    /// `md5` keeps describing the original content.
    #[tracing::instrument(
        name = "upload.compress",
        skip_all,
        fields(file = %meta.file_name.display(), original_size = meta.file_size),
        err
    )]
    pub async fn compress(&self, meta: &mut FileMeta) -> Result<(), UploadError> {
        let target = compressed_path(self.dir.path(), &meta.basename);
        let failed = |source_err| UploadError::CompressionFailed {
            path: meta.file_name.clone(),
            source: source_err,
        };

        let result = {
            let source = meta.file_name.clone();
            let target = target.clone();
            tokio::task::spawn_blocking(move || gzip_file(&source, &target))
                .await
                .map_err(|e| io::Error::other(e.to_string()))
                .and_then(|r| r)
        };

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                // Drop the partial archive
                let _ = std::fs::remove_file(&target);
                return Err(failed(e));
            }
        };

        let original_size = meta.file_size;
        meta.basename = gz_name(&meta.basename);
        meta.file_name = target;
        meta.file_size = written;
        meta.is_compressed = true;

        tracing::info!(
            original_size = original_size,
            compressed_size = written,
            "Compressed file"
        );
        crate::metrics::record_compression(original_size, written);

        Ok(())
    }
}

/// Gzip `source` into `target`, returning the compressed size.
///
/// The encoder is finished and the file synced before returning, so a
/// returned size always describes a complete archive.
pub fn gzip_file(source: &Path, target: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(source)?);
    let writer = BufWriter::new(File::create(target)?);
    let mut encoder = GzEncoder::new(writer, Compression::default());

    io::copy(&mut reader, &mut encoder)?;

    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(std::fs::metadata(target)?.len())
}

/// Path a compressed copy of `basename` would have inside `dir`
pub fn compressed_path(dir: &Path, basename: &str) -> PathBuf {
    dir.join(gz_name(basename))
}
