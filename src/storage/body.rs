//! Ranged file bodies
//!
//! A part body is a lazy, finite stream over `[start, end]` of a file. It is
//! read once as the request is sent and cannot be rewound; retries open a new one.

use bytes::{Bytes, BytesMut};
use futures::{stream, TryStreamExt};
use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Chunk size for body reads
pub const READ_CHUNK_SIZE: usize = 65536; // 64KB

/// A request body with a known length
pub struct SizedBody {
    pub body: reqwest::Body,
    pub content_length: u64,
}

/// Stream of the bytes in `[start, end]` of `path`.
///
/// `on_chunk` is called with the length of every chunk handed to the
/// transport. A file that ends before `end` yields `UnexpectedEof`.
pub async fn range_stream<F>(
    path: &Path,
    start: u64,
    end: u64,
    mut on_chunk: F,
) -> io::Result<impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static>
where
    F: FnMut(u64) + Send + 'static,
{
    if end < start {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("empty range {}..={}", start, end),
        ));
    }

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let reader = file.take(end - start + 1);

    let stream = stream::try_unfold(reader, |mut reader| async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            if reader.limit() > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended {} bytes before range end", reader.limit()),
                ));
            }
            return Ok(None);
        }
        Ok::<_, io::Error>(Some((buf.freeze(), reader)))
    })
    .inspect_ok(move |chunk: &Bytes| on_chunk(chunk.len() as u64));

    Ok(stream)
}

/// Request body over `[start, end]` of `path` with `Content-Length` known up front
pub async fn range_body<F>(path: &Path, start: u64, end: u64, on_chunk: F) -> io::Result<SizedBody>
where
    F: FnMut(u64) + Send + 'static,
{
    let stream = range_stream(path, start, end, on_chunk).await?;
    Ok(SizedBody {
        body: reqwest::Body::wrap_stream(stream),
        content_length: end - start + 1,
    })
}
