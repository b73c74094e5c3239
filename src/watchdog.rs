//! Connection watchdog.
//!
//! While streaming, the watchdog wakes every `check_interval` and compares
//! the dropped-packet count against `max_packets_to_skip`. On a breach the
//! driver stops the stream and the watchdog schedules the two reconnect
//! steps (re-init, then re-start) as cancellable timer tasks. Each timer
//! reports back over a channel so the driver, which owns all session state,
//! performs the step itself.
//!
//! Every scheduled sequence carries a generation number. Steps from a
//! sequence that was cancelled or superseded are recognised and ignored.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::StreamConfig;

/// Which half of a reconnect sequence a timer fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectKind {
    /// Re-send init and wait for the ready line
    Reinit,
    /// Re-start streaming
    Restart,
}

/// Message a reconnect timer sends when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectStep {
    pub generation: u64,
    pub kind: ReconnectKind,
}

/// Outcome of a periodic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogDecision {
    Healthy,
    /// Too many packets were dropped since the last reset
    Reconnect { packets_dropped: u64 },
}

#[derive(Debug)]
struct PendingReconnect {
    generation: u64,
    cancel: CancellationToken,
}

/// Periodic link-health check plus the reconnect timers it owns.
#[derive(Debug)]
pub struct Watchdog {
    check_interval: Duration,
    max_packets_to_skip: u64,
    reinit_delay: Duration,
    restart_delay: Duration,
    /// `Some` while armed
    interval: Option<Interval>,
    pending: Option<PendingReconnect>,
    generation: u64,
}

impl Watchdog {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            max_packets_to_skip: config.max_packets_to_skip,
            reinit_delay: config.reinit_delay(),
            restart_delay: config.restart_delay(),
            interval: None,
            pending: None,
            generation: 0,
        }
    }

    /// Start periodic checks; the first one is one interval from now.
    pub fn arm(&mut self) {
        let mut interval = interval_at(Instant::now() + self.check_interval, self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        debug!(interval = ?self.check_interval, "Watchdog armed");
    }

    /// Stop periodic checks. Pending reconnect timers are unaffected.
    pub fn disarm(&mut self) {
        if self.interval.take().is_some() {
            debug!("Watchdog disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next check. Never completes while disarmed.
    ///
    /// Cancel safe, so it can sit in a `select!` next to transport reads.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Judge the link from the number of packets dropped since the last reset.
    pub fn check(&self, packets_dropped: u64) -> WatchdogDecision {
        trace!(packets_dropped, max = self.max_packets_to_skip, "Watchdog check");
        if packets_dropped > self.max_packets_to_skip {
            WatchdogDecision::Reconnect { packets_dropped }
        } else {
            WatchdogDecision::Healthy
        }
    }

    /// Spawn the reinit and restart timers for a new reconnect sequence.
    ///
    /// Any sequence still pending is cancelled first. Returns the generation
    /// the new steps will carry.
    pub fn schedule_reconnect(&mut self, steps: &mpsc::UnboundedSender<ReconnectStep>) -> u64 {
        self.cancel_pending();
        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();

        for (kind, delay) in [
            (ReconnectKind::Reinit, self.reinit_delay),
            (ReconnectKind::Restart, self.restart_delay),
        ] {
            let cancel = cancel.clone();
            let steps = steps.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!(generation, ?kind, "Reconnect timer cancelled");
                    }
                    _ = tokio::time::sleep(delay) => {
                        // The driver may already be gone.
                        let _ = steps.send(ReconnectStep { generation, kind });
                    }
                }
            });
        }

        info!(
            generation,
            reinit_in = ?self.reinit_delay,
            restart_in = ?self.restart_delay,
            "Reconnect scheduled"
        );
        self.pending = Some(PendingReconnect { generation, cancel });
        generation
    }

    /// Cancel the pending reconnect sequence. Returns whether there was one.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.cancel.cancel();
                info!(generation = pending.generation, "Pending reconnect cancelled");
                true
            }
            None => false,
        }
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether a fired step belongs to the live sequence and should run.
    ///
    /// The restart step completes the sequence.
    pub fn accept(&mut self, step: ReconnectStep) -> bool {
        let live = self.pending.as_ref().is_some_and(|p| p.generation == step.generation);
        if !live {
            debug!(generation = step.generation, kind = ?step.kind, "Ignoring stale reconnect step");
            return false;
        }
        if step.kind == ReconnectKind::Restart {
            self.pending = None;
        }
        true
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }
}
