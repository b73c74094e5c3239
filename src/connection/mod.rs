//! Handle to a running stream
//!
//! [`StreamHandle`] is what [`OpenBci::connect`](crate::OpenBci::connect)
//! returns. Lifecycle methods only queue a request for the driver task and
//! return immediately; observe their effect through [`StreamHandle::state`],
//! [`StreamHandle::state_updates`] or [`StreamHandle::events`].

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::{Control, Driver};
use crate::sink::{BroadcastSink, SinkSet};
use crate::transport::Transport;
use crate::types::{Chunk, SessionEvent, SessionState, StreamStats};
use crate::{Result, StreamConfig, StreamError};

#[cfg(test)]
mod tests;

/// Chunks buffered per [`StreamHandle::chunks`] subscriber before it lags.
const CHUNK_CAPACITY: usize = 32;

/// Control and observation handle for one driver task.
///
/// Dropping the handle cancels the driver, which stops the board before it
/// exits. Use [`StreamHandle::shutdown`] to wait for that and learn whether
/// the driver ended cleanly.
pub struct StreamHandle {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<SessionState>,
    stats: watch::Receiver<StreamStats>,
    events: broadcast::Sender<SessionEvent>,
    chunks: BroadcastSink,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl StreamHandle {
    /// Validate `config` and spawn the driver for `transport`.
    ///
    /// `sinks` receive every chunk in registration order; the stream behind
    /// [`StreamHandle::chunks`] is fed after them.
    pub fn spawn<T: Transport>(transport: T, config: StreamConfig, mut sinks: SinkSet) -> Result<Self> {
        config.validate()?;

        let chunks = BroadcastSink::new(CHUNK_CAPACITY);
        sinks.push(chunks.clone());
        debug!(sinks = sinks.len(), chunk_size = config.chunk_size, "Spawning stream driver");

        let channels = Driver::spawn(transport, config, sinks);
        Ok(Self {
            control: channels.control,
            state: channels.state,
            stats: channels.stats,
            events: channels.events,
            chunks,
            cancel: channels.cancel,
            task: Some(channels.task),
        })
    }

    /// Send init and wait for the board to report ready.
    pub fn init(&self) -> Result<()> {
        self.send(Control::Init)
    }

    /// Start binary streaming. Ignored until the board is ready, and while
    /// already streaming.
    pub fn start_streaming(&self) -> Result<()> {
        self.send(Control::StartStreaming)
    }

    /// Stop streaming. Valid in any state.
    pub fn stop_streaming(&self) -> Result<()> {
        self.send(Control::StopStreaming)
    }

    /// Deliver the partial chunk, if any, to the sinks now.
    pub fn flush(&self) -> Result<()> {
        self.send(Control::Flush)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Latest diagnostics snapshot.
    pub fn stats(&self) -> StreamStats {
        *self.stats.borrow()
    }

    /// Session state now and after every change.
    pub fn state_updates(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Lifecycle events from now on.
    pub fn events(&self) -> impl Stream<Item = SessionEvent> + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Event subscriber: {}", e);
                    None
                }
            }
        })
    }

    /// Completed chunks from now on.
    ///
    /// A subscriber that falls more than a few dozen chunks behind skips the
    /// oldest ones and logs a warning.
    pub fn chunks(&self) -> impl Stream<Item = Arc<Chunk>> + 'static {
        BroadcastStream::new(self.chunks.subscribe()).filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    warn!("Chunk subscriber: {}", e);
                    None
                }
            }
        })
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> Result<()> {
        let mut state = self.state.clone();
        let reached = tokio::time::timeout(timeout, async {
            state.wait_for(|current| *current == target).await.map(|_| ())
        })
        .await
        .map_err(|_| StreamError::Timeout { duration: timeout })?;
        reached.map_err(|_| StreamError::channel_closed("state updates"))
    }

    /// Stop the board, end the driver and report how it ended.
    pub async fn shutdown(mut self) -> Result<()> {
        // The driver may already have ended on its own.
        let _ = self.control.send(Control::Shutdown);
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| StreamError::channel_closed(format!("driver task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Whether the driver task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    fn send(&self, control: Control) -> Result<()> {
        self.control.send(control).map_err(|_| StreamError::channel_closed(format!("{:?}", control)))
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        debug!("Dropping stream handle");
        // Cancel the driver on drop; it stops the board on its way out.
        self.cancel.cancel();
    }
}
