//! Driver task that owns the session and talks to the transport

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::aggregator::ChunkAggregator;
use crate::config::StreamConfig;
use crate::protocol::Command;
use crate::session::{SessionOutput, StreamingSession};
use crate::sink::SinkSet;
use crate::transport::Transport;
use crate::types::{Chunk, SessionEvent, SessionState, StreamStats};
use crate::watchdog::{ReconnectKind, ReconnectStep, Watchdog, WatchdogDecision};
use crate::{Result, StreamError};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

/// Requests from a handle to the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Init,
    StartStreaming,
    StopStreaming,
    /// Deliver the partial chunk to sinks
    Flush,
    /// Stop streaming and end the task
    Shutdown,
}

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Sender for lifecycle requests
    pub control: mpsc::UnboundedSender<Control>,
    /// Receiver for session state changes
    pub state: watch::Receiver<SessionState>,
    /// Receiver for diagnostics, refreshed after every read
    pub stats: watch::Receiver<StreamStats>,
    /// Sender half of the event channel; subscribe to receive events
    pub events: broadcast::Sender<SessionEvent>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// The task itself; resolves to the reason it ended
    pub task: JoinHandle<Result<()>>,
}

/// Why streaming is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    /// Requested through a handle
    Manual,
    /// The watchdog is about to reconnect
    Reconnect,
    /// Init was requested while streaming
    Reinit,
    /// The driver is ending
    Shutdown,
}

/// What one turn of the driver loop is reacting to.
enum Wakeup {
    Control(Control),
    Reconnect(ReconnectStep),
    Check,
    Read(Result<Option<bytes::Bytes>>),
}

/// Driver spawns and manages the streaming task
///
/// One task owns the transport, the session state machine, the watchdog,
/// the aggregator and the sinks. Everything that touches them runs on that
/// task, so none of them need locking.
pub struct Driver;

impl Driver {
    /// Spawn the driver task for `transport`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<T>(transport: T, config: StreamConfig, sinks: SinkSet) -> DriverChannels
    where
        T: Transport,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (stats_tx, stats_rx) = watch::channel(StreamStats::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (steps_tx, steps_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = DriverTask {
            session: StreamingSession::new(&config),
            watchdog: Watchdog::new(&config),
            aggregator: ChunkAggregator::new(config.chunk_size),
            transport,
            sinks,
            config,
            counters: StreamStats::default(),
            state_tx,
            stats_tx,
            events_tx: events_tx.clone(),
            steps_tx,
        };

        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move { task.run(control_rx, steps_rx, cancel_task).await });

        DriverChannels { control: control_tx, state: state_rx, stats: stats_rx, events: events_tx, cancel, task }
    }
}

struct DriverTask<T> {
    transport: T,
    config: StreamConfig,
    session: StreamingSession,
    watchdog: Watchdog,
    aggregator: ChunkAggregator,
    sinks: SinkSet,
    /// Driver-level counters; the session supplies the rest
    counters: StreamStats,
    state_tx: watch::Sender<SessionState>,
    stats_tx: watch::Sender<StreamStats>,
    events_tx: broadcast::Sender<SessionEvent>,
    steps_tx: mpsc::UnboundedSender<ReconnectStep>,
}

impl<T: Transport> DriverTask<T> {
    async fn run(
        mut self,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        mut steps_rx: mpsc::UnboundedReceiver<ReconnectStep>,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(transport = %self.transport.describe(), "Stream driver started");

        let result = self.event_loop(&mut control_rx, &mut steps_rx, &cancel).await;
        if let Err(e) = &result {
            error!("Stream driver failed: {}", e);
        }

        self.watchdog.cancel_pending();
        if self.session.is_streaming() {
            // Best effort: the link may be what failed.
            if let Err(e) = self.stop_streaming(StopCause::Shutdown).await {
                warn!("Failed to stop board on shutdown: {}", e);
            }
        }
        self.publish_stats();

        let stats = self.stats();
        info!(
            packets_decoded = stats.packets_decoded,
            chunks_emitted = stats.chunks_emitted,
            skipped_bytes = stats.skipped_bytes,
            reconnects = stats.reconnects,
            "Stream driver ended"
        );
        result
    }

    async fn event_loop(
        &mut self,
        control_rx: &mut mpsc::UnboundedReceiver<Control>,
        steps_rx: &mut mpsc::UnboundedReceiver<ReconnectStep>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.config.init_on_connect {
            self.init().await?;
        }

        loop {
            let wakeup = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stream driver cancelled");
                    return Ok(());
                }
                control = control_rx.recv() => match control {
                    Some(control) => Wakeup::Control(control),
                    None => {
                        debug!("All stream handles dropped");
                        return Ok(());
                    }
                },
                Some(step) = steps_rx.recv() => Wakeup::Reconnect(step),
                _ = self.watchdog.tick() => Wakeup::Check,
                read = self.transport.read() => Wakeup::Read(read),
            };

            match wakeup {
                Wakeup::Control(Control::Shutdown) => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                Wakeup::Control(control) => self.on_control(control).await?,
                Wakeup::Reconnect(step) => self.on_reconnect_step(step).await?,
                Wakeup::Check => self.check_connection().await?,
                Wakeup::Read(Ok(Some(bytes))) => self.on_data(&bytes).await?,
                Wakeup::Read(Ok(None)) => {
                    return Err(StreamError::transport_failed(format!(
                        "{} reached end of stream",
                        self.transport.describe()
                    )));
                }
                Wakeup::Read(Err(e)) => return Err(e),
            }
        }
    }

    async fn on_control(&mut self, control: Control) -> Result<()> {
        debug!(?control, "Control request");
        match control {
            Control::Init => self.init().await,
            Control::StartStreaming => self.start_streaming().await,
            Control::StopStreaming => self.stop_streaming(StopCause::Manual).await,
            Control::Flush => {
                self.flush();
                self.publish_stats();
                Ok(())
            }
            Control::Shutdown => Ok(()),
        }
    }

    async fn init(&mut self) -> Result<()> {
        if self.session.is_streaming() {
            self.stop_streaming(StopCause::Reinit).await?;
        }
        let command = self.session.init();
        self.write_command(command).await?;
        info!("Init sent, waiting for board ready");
        self.publish_state();
        Ok(())
    }

    async fn start_streaming(&mut self) -> Result<()> {
        let Some(command) = self.session.start_streaming() else {
            return Ok(());
        };
        self.write_command(command).await?;
        self.watchdog.arm();
        info!("Streaming started");
        self.publish_state();
        self.emit(SessionEvent::StreamingStarted);
        Ok(())
    }

    async fn stop_streaming(&mut self, cause: StopCause) -> Result<()> {
        self.watchdog.disarm();
        if cause == StopCause::Manual && self.config.cancel_reconnect_on_stop {
            self.watchdog.cancel_pending();
        }

        let was_streaming = self.session.is_streaming();
        let command = self.session.stop_streaming();
        self.write_command(command).await?;

        let flush = self.config.flush_on_stop && matches!(cause, StopCause::Manual | StopCause::Shutdown);
        if flush {
            self.flush();
        } else {
            let discarded = self.aggregator.discard();
            if discarded > 0 {
                debug!(discarded, "Partial chunk dropped on stop");
            }
        }

        info!(?cause, "Streaming stopped");
        self.publish_state();
        self.publish_stats();
        if was_streaming {
            self.emit(SessionEvent::StreamingStopped);
        }
        Ok(())
    }

    async fn check_connection(&mut self) -> Result<()> {
        match self.watchdog.check(self.session.packets_dropped()) {
            WatchdogDecision::Healthy => Ok(()),
            WatchdogDecision::Reconnect { packets_dropped } => self.reconnect(packets_dropped).await,
        }
    }

    async fn reconnect(&mut self, packets_dropped: u64) -> Result<()> {
        warn!(
            packets_dropped,
            max_packets_to_skip = self.config.max_packets_to_skip,
            "Too many dropped packets, reconnecting"
        );
        self.session.reset_packets_dropped();
        self.stop_streaming(StopCause::Reconnect).await?;
        self.watchdog.schedule_reconnect(&self.steps_tx);
        self.counters.reconnects += 1;
        self.emit(SessionEvent::Reconnecting { packets_dropped });
        self.publish_stats();
        Ok(())
    }

    async fn on_reconnect_step(&mut self, step: ReconnectStep) -> Result<()> {
        if !self.watchdog.accept(step) {
            return Ok(());
        }
        info!(generation = step.generation, kind = ?step.kind, "Reconnect step");
        match step.kind {
            ReconnectKind::Reinit => self.init().await,
            ReconnectKind::Restart => self.start_streaming().await,
        }
    }

    async fn on_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.session.extend(bytes);
        while let Some(output) = self.session.poll() {
            match output {
                SessionOutput::Ready => {
                    info!("Board ready");
                    self.publish_state();
                    self.emit(SessionEvent::Ready);
                    // A stop during the handshake leaves the session Stopped.
                    if self.config.auto_start && self.session.state() == SessionState::Ready {
                        self.start_streaming().await?;
                    }
                }
                SessionOutput::Sample(sample) => {
                    if let Some(chunk) = self.aggregator.push(sample) {
                        self.dispatch(chunk);
                    }
                }
            }
        }
        self.publish_stats();
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(chunk) = self.aggregator.flush() {
            debug!(size = chunk.len(), "Flushing partial chunk");
            self.dispatch(chunk);
        }
    }

    fn dispatch(&mut self, chunk: Chunk) {
        self.sinks.dispatch(&chunk);
        self.counters.chunks_emitted += 1;
        trace!(size = chunk.len(), chunks_emitted = self.counters.chunks_emitted, "Chunk dispatched");
    }

    async fn write_command(&mut self, command: Command) -> Result<()> {
        debug!(?command, byte = %(command.as_byte() as char), "Writing command");
        self.transport.write(&[command.as_byte()]).await
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn stats(&self) -> StreamStats {
        StreamStats {
            chunks_emitted: self.counters.chunks_emitted,
            reconnects: self.counters.reconnects,
            ..self.session.stats()
        }
    }

    fn publish_state(&self) {
        let state = self.session.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats());
    }
}
