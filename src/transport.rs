//! Transport trait for byte links to the board

use bytes::Bytes;

use crate::Result;

/// Full-duplex byte link to an acquisition board.
///
/// Transports move bytes and nothing else: they know nothing about frames,
/// commands, or the session lifecycle. A serial port, an in-memory pipe and
/// the simulated board all look the same to the driver.
///
/// `read` must be cancel safe. The driver polls it inside `select!` next to
/// timers and control messages, and drops the future whenever another branch
/// wins. Dropping a pending read must not lose bytes.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Wait for the next bytes from the board.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - Bytes arrived; never empty
    /// - `Ok(None)` - The link reached end of stream
    /// - `Err(e)` - The link failed
    async fn read(&mut self) -> Result<Option<Bytes>>;

    /// Write all of `data` to the board.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Short human-readable name for logs, such as the port path.
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl Transport for Box<dyn Transport> {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        (**self).read().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
