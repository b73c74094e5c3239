//! Serial port transport

use bytes::Bytes;

use crate::config::StreamConfig;
use crate::transport::Transport;
use crate::Result;

#[cfg(feature = "serial")]
use {
    super::io::IoTransport,
    crate::StreamError,
    tokio_serial::{SerialPortBuilderExt, SerialStream},
    tracing::info,
};

/// Serial link to a board, 8N1 at the configured baud rate.
#[cfg(feature = "serial")]
#[derive(Debug)]
pub struct SerialTransport {
    inner: IoTransport<SerialStream>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    /// Open `config.port` at `config.baud_rate`.
    pub fn open(config: &StreamConfig) -> Result<Self> {
        info!(port = %config.port, baud_rate = config.baud_rate, "Opening serial port");

        let port = tokio_serial::new(&config.port, config.baud_rate).open_native_async().map_err(|e| {
            StreamError::transport_failed_with_source(format!("failed to open {}", config.port), Box::new(e))
        })?;

        info!(port = %config.port, "Serial port opened");
        Ok(Self { inner: IoTransport::with_label(port, config.port.clone()) })
    }
}

#[cfg(feature = "serial")]
#[async_trait::async_trait]
impl Transport for SerialTransport {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        self.inner.read().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

// Stub used when the crate is built without serial support
#[cfg(not(feature = "serial"))]
#[derive(Debug)]
pub struct SerialTransport {
    _private: (),
}

#[cfg(not(feature = "serial"))]
impl SerialTransport {
    /// Always fails: serial support was compiled out.
    ///
    /// Rebuild with the `serial` feature, or connect through an
    /// [`IoTransport`](super::IoTransport) wrapping your own port.
    pub fn open(_config: &StreamConfig) -> Result<Self> {
        Err(crate::StreamError::unsupported("Serial transport", "the `serial` feature"))
    }
}

#[cfg(not(feature = "serial"))]
#[async_trait::async_trait]
impl Transport for SerialTransport {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        Err(crate::StreamError::unsupported("Serial transport", "the `serial` feature"))
    }

    async fn write(&mut self, _data: &[u8]) -> Result<()> {
        Err(crate::StreamError::unsupported("Serial transport", "the `serial` feature"))
    }

    fn describe(&self) -> String {
        "serial (unavailable)".to_string()
    }
}
