//! Transport over any tokio I/O object

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::transport::Transport;
use crate::{Result, StreamError};

/// Bytes reserved before each read.
const READ_CAPACITY: usize = 1024;

/// Wraps an `AsyncRead + AsyncWrite` object (a serial stream, a TCP socket,
/// one end of [`tokio::io::duplex`]) as a [`Transport`].
#[derive(Debug)]
pub struct IoTransport<T> {
    io: T,
    buffer: BytesMut,
    label: String,
}

impl<T> IoTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(io: T) -> Self {
        Self::with_label(io, "io")
    }

    /// Wrap `io`, naming it `label` in logs and errors.
    pub fn with_label(io: T, label: impl Into<String>) -> Self {
        Self { io, buffer: BytesMut::with_capacity(READ_CAPACITY), label: label.into() }
    }

    /// Give back the wrapped object.
    pub fn into_inner(self) -> T {
        self.io
    }
}

#[async_trait::async_trait]
impl<T> Transport for IoTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&mut self) -> Result<Option<Bytes>> {
        self.buffer.reserve(READ_CAPACITY);
        // read_buf is cancel safe: a dropped call has read nothing.
        let read = self.io.read_buf(&mut self.buffer).await.map_err(|e| {
            StreamError::transport_failed_with_source(format!("read from {} failed", self.label), Box::new(e))
        })?;
        if read == 0 {
            return Ok(None);
        }
        trace!(bytes = read, transport = %self.label, "Read");
        Ok(Some(self.buffer.split().freeze()))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let label = &self.label;
        let wrap = |e: std::io::Error| {
            StreamError::transport_failed_with_source(format!("write to {} failed", label), Box::new(e))
        };
        self.io.write_all(data).await.map_err(wrap)?;
        self.io.flush().await.map_err(wrap)?;
        trace!(bytes = data.len(), transport = %self.label, "Wrote");
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
