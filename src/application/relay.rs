//! Chunked byte pumps between gRPC streams, storage readers and subprocess pipes.
//!
//! Every pump owns the writer it is handed and closes it when the source
//! reaches end-of-stream, so the process on the other end sees EOF.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Upper bound of a chunk on the wire and on the pipes.
pub const CHUNK_SIZE: usize = 32_000;

/// Copy `reader` into `writer` in reads of at most `chunk_size`, then shut the writer down.
pub async fn drain_to_writer<R, W>(
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read]).await?;
        total += read as u64;
    }
    writer.shutdown().await?;
    Ok(total)
}

/// Write every chunk of `stream` into `writer`, then shut the writer down.
///
/// The first error item aborts the pump and is returned as is.
pub async fn pump_stream_to_writer<S, E, W>(mut stream: S, mut writer: W) -> Result<u64, E>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: From<io::Error>,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    writer.shutdown().await?;
    Ok(total)
}

/// Send `reader` to `sender` as chunks of at most `chunk_size` bytes.
///
/// Fails with `BrokenPipe` once the receiving side is gone.
pub async fn pump_reader_to_stream<R, E>(
    mut reader: R,
    chunk_size: usize,
    sender: &mpsc::Sender<Result<Bytes, E>>,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            return Ok(total);
        }
        sender
            .send(Ok(Bytes::copy_from_slice(&buf[..read])))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "chunk receiver closed"))?;
        total += read as u64;
    }
}
