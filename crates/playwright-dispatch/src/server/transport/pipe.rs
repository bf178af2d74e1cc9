use super::{EventSink, TransportEvent, TransportReceiver, TransportSender};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 32_768; // 32KB chunks

/// Write one frame using 4-byte little-endian length-prefixed framing
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(frame.len()).map_err(|_| {
        Error::TransportError(format!("Frame too large: {} bytes", frame.len()))
    })?;

    writer
        .write_all(&length.to_le_bytes())
        .await
        .map_err(|e| Error::TransportError(format!("Failed to write length: {}", e)))?;

    writer
        .write_all(frame)
        .await
        .map_err(|e| Error::TransportError(format!("Failed to write message: {}", e)))?;

    writer
        .flush()
        .await
        .map_err(|e| Error::TransportError(format!("Failed to flush: {}", e)))?;

    Ok(())
}

/// Pipe-based transport for a driver reached through a pair of byte streams
pub struct PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    writer: W,
    reader: R,
    sink: EventSink,
}

/// Send-only part of PipeTransport
pub struct PipeTransportSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    writer: W,
    sink: EventSink,
}

/// Receive-only part of PipeTransport
pub struct PipeTransportReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    reader: R,
    sink: EventSink,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (sink, events_rx) = EventSink::new();
        (
            Self {
                writer,
                reader,
                sink,
            },
            events_rx,
        )
    }

    pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
        (
            PipeTransportSender {
                writer: self.writer,
                sink: self.sink.clone(),
            },
            PipeTransportReceiver {
                reader: self.reader,
                sink: self.sink,
            },
        )
    }
}

impl<R> PipeTransportReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read frames until EOF or the first failure, then emit `Closed`.
    pub async fn run_loop(&mut self) -> Result<()> {
        let result = self.read_frames().await;
        match &result {
            Ok(()) => self.sink.close("driver closed the pipe"),
            Err(e) => {
                tracing::error!("Pipe transport read failed: {}", e);
                self.sink.close(e.to_string());
            }
        }
        result
    }

    async fn read_frames(&mut self) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 4];

            let n = self.reader.read(&mut len_buf).await.map_err(|e| {
                Error::TransportError(format!("Failed to read length prefix: {}", e))
            })?;

            if n == 0 {
                return Ok(());
            }

            if n < 4 {
                self.reader
                    .read_exact(&mut len_buf[n..])
                    .await
                    .map_err(|e| {
                        Error::TransportError(format!(
                            "Failed to finish reading length prefix: {}",
                            e
                        ))
                    })?;
            }

            let length = u32::from_le_bytes(len_buf) as usize;

            // Large payloads are read chunk by chunk so a bogus length cannot
            // force one huge allocation up front.
            let mut frame = BytesMut::with_capacity(length.min(CHUNK_SIZE));
            let mut remaining = length;
            let mut chunk = vec![0u8; length.min(CHUNK_SIZE)];
            while remaining > 0 {
                let to_read = remaining.min(CHUNK_SIZE);
                self.reader
                    .read_exact(&mut chunk[..to_read])
                    .await
                    .map_err(|e| {
                        Error::TransportError(format!("Failed to read message: {}", e))
                    })?;
                frame.extend_from_slice(&chunk[..to_read]);
                remaining -= to_read;
            }

            if !self.sink.deliver(frame.freeze()) {
                return Ok(());
            }
        }
    }
}

impl<W> TransportSender for PipeTransportSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send(&mut self, frame: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.sink.ensure_open()?;
            if let Err(e) = write_frame(&mut self.writer, &frame).await {
                tracing::error!("Pipe transport write failed: {}", e);
                self.sink.close(e.to_string());
                return Err(Error::Disconnected(e.to_string()));
            }
            Ok(())
        })
    }
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.run_loop().await })
    }
}
