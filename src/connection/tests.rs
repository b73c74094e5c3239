//! Driver and handle tests
//!
//! These run the full driver against [`SimulatedBoard`] with tokio's clock
//! paused, so board packets, watchdog checks and reconnect timers all fire
//! deterministically and instantly.

use super::*;
use crate::OpenBci;
use crate::config::EndMarkerPolicy;
use crate::protocol::Command;
use crate::test_utils::{RecordingSink, init_tracing};
use crate::transports::{BoardProbe, IoTransport, SimulatedBoard};
use futures::StreamExt;
use std::pin::pin;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

const WAIT: Duration = Duration::from_secs(5);

fn connect(config: StreamConfig) -> (StreamHandle, BoardProbe, RecordingSink) {
    init_tracing();
    let board = SimulatedBoard::new();
    let probe = board.probe();
    let recorder = RecordingSink::new();
    let mut sinks = SinkSet::new();
    sinks.push(recorder.clone());
    let handle = OpenBci::connect(board, config, sinks).expect("valid config");
    (handle, probe, recorder)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn handshake_auto_starts_and_chunks_flow() {
    let config = StreamConfig::default().with_chunk_size(25);
    let (handle, probe, recorder) = connect(config);

    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    assert_eq!(probe.commands(), b"vb".to_vec());

    tokio::time::sleep(Duration::from_secs(1)).await;

    let chunks = recorder.chunks();
    info!("Received {} chunks", chunks.len());
    assert!((9..=10).contains(&chunks.len()));
    assert!(chunks.iter().all(|chunk| chunk.len() == 25));

    let ids: Vec<u8> = recorder.samples().iter().map(|s| s.id).collect();
    let expected: Vec<u8> = (0..ids.len()).map(|i| i as u8).collect();
    assert_eq!(ids, expected);

    let stats = handle.stats();
    assert_eq!(stats.chunks_emitted, chunks.len() as u64);
    // The "$$$" prompt after the banner is the only garbage.
    assert_eq!(stats.skipped_bytes, 3);
    assert_eq!(stats.reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn start_before_ready_is_ignored_and_start_is_written_once() {
    let config = StreamConfig::default().with_init_on_connect(false).with_auto_start(false);
    let (handle, probe, _recorder) = connect(config);

    handle.start_streaming().unwrap();
    settle().await;
    assert!(probe.commands().is_empty());
    assert_eq!(handle.state(), SessionState::Idle);

    handle.init().unwrap();
    handle.wait_for_state(SessionState::Ready, WAIT).await.unwrap();

    handle.start_streaming().unwrap();
    handle.start_streaming().unwrap();
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    settle().await;

    assert_eq!(probe.count(Command::StartStreaming), 1);
    assert_eq!(probe.commands(), b"vb".to_vec());
}

#[tokio::test(start_paused = true)]
async fn manual_stop_drops_the_partial_chunk() {
    let config = StreamConfig::default().with_chunk_size(1000);
    let (handle, probe, recorder) = connect(config);
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop_streaming().unwrap();
    handle.wait_for_state(SessionState::Stopped, WAIT).await.unwrap();

    let decoded = handle.stats().packets_decoded;
    assert!(decoded > 0);
    assert!(recorder.chunks().is_empty());
    assert_eq!(probe.commands().last(), Some(&b's'));

    // The board is quiet and nothing arrives later.
    let sent = probe.frames_sent();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.frames_sent(), sent);
    assert!(recorder.chunks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_on_stop_delivers_the_partial_chunk() {
    let config = StreamConfig::default().with_chunk_size(1000).with_flush_on_stop(true);
    let (handle, _probe, recorder) = connect(config);
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop_streaming().unwrap();
    handle.wait_for_state(SessionState::Stopped, WAIT).await.unwrap();

    let chunks = recorder.chunks();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len() as u64, handle.stats().packets_decoded);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_delivers_partial_chunk_and_streaming_continues() {
    let config = StreamConfig::default().with_chunk_size(1000);
    let (handle, _probe, recorder) = connect(config);
    let mut chunks = pin!(handle.chunks());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.flush().unwrap();

    let flushed = tokio::time::timeout(WAIT, chunks.next()).await.unwrap().unwrap();
    assert!(!flushed.is_empty());
    assert_eq!(recorder.chunks().len(), 1);
    assert_eq!(handle.state(), SessionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn watchdog_breach_runs_one_reconnect_sequence() {
    let config = StreamConfig::default().with_end_marker(EndMarkerPolicy::Validate);
    let (handle, probe, _recorder) = connect(config);
    let mut events = pin!(handle.events());

    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    probe.corrupt_next(20);

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let event = tokio::time::timeout(WAIT, events.next()).await.unwrap().unwrap();
        seen.push(event);
    }

    assert_eq!(&seen[..3], &[SessionEvent::Ready, SessionEvent::StreamingStarted, SessionEvent::StreamingStopped]);
    assert!(matches!(seen[3], SessionEvent::Reconnecting { packets_dropped } if packets_dropped >= 20));
    assert_eq!(&seen[4..], &[SessionEvent::Ready, SessionEvent::StreamingStarted]);

    // Let the restart timer fire; it finds the stream already running.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.commands(), b"vbsvb".to_vec());

    let stats = handle.stats();
    assert_eq!(stats.reconnects, 1);
    assert_eq!(stats.packets_dropped, 0);
    assert_eq!(handle.state(), SessionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn healthy_stream_never_reconnects() {
    let config = StreamConfig::default().with_end_marker(EndMarkerPolicy::Validate);
    let (handle, probe, _recorder) = connect(config);
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    // Exactly the limit is tolerated.
    probe.corrupt_next(10);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(handle.stats().reconnects, 0);
    assert_eq!(probe.commands(), b"vb".to_vec());
}

#[tokio::test(start_paused = true)]
async fn manual_stop_cancels_a_pending_reconnect() {
    let config = StreamConfig::default().with_end_marker(EndMarkerPolicy::Validate);
    let (handle, probe, _recorder) = connect(config);
    let mut events = pin!(handle.events());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    probe.corrupt_next(20);

    loop {
        let event = tokio::time::timeout(WAIT, events.next()).await.unwrap().unwrap();
        if matches!(event, SessionEvent::Reconnecting { .. }) {
            break;
        }
    }
    handle.stop_streaming().unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(probe.commands(), b"vbss".to_vec());
    assert_eq!(handle.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn reconnect_survives_manual_stop_when_configured() {
    let config = StreamConfig::default()
        .with_end_marker(EndMarkerPolicy::Validate)
        .with_cancel_reconnect_on_stop(false);
    let (handle, probe, _recorder) = connect(config);
    let mut events = pin!(handle.events());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    probe.corrupt_next(20);

    loop {
        let event = tokio::time::timeout(WAIT, events.next()).await.unwrap().unwrap();
        if matches!(event, SessionEvent::Reconnecting { .. }) {
            break;
        }
    }
    handle.stop_streaming().unwrap();
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    assert_eq!(probe.commands(), b"vbssvb".to_vec());
}

#[tokio::test(start_paused = true)]
async fn state_updates_follow_the_lifecycle() {
    init_tracing();
    let (near, mut board) = tokio::io::duplex(1024);
    let config = StreamConfig::default().with_auto_start(false);
    let handle = OpenBci::connect(IoTransport::new(near), config, SinkSet::new()).unwrap();
    let mut states = pin!(handle.state_updates());
    let mut command = [0u8; 1];

    assert_eq!(states.next().await, Some(SessionState::Idle));

    board.read_exact(&mut command).await.unwrap();
    assert_eq!(&command, b"v");
    assert_eq!(states.next().await, Some(SessionState::AwaitingReady));

    board.write_all(b"OpenBCI V3 8-16 channel\r\nFree RAM: 453\r\n$$$").await.unwrap();
    assert_eq!(states.next().await, Some(SessionState::Ready));

    handle.start_streaming().unwrap();
    board.read_exact(&mut command).await.unwrap();
    assert_eq!(&command, b"b");
    assert_eq!(states.next().await, Some(SessionState::Streaming));

    handle.stop_streaming().unwrap();
    board.read_exact(&mut command).await.unwrap();
    assert_eq!(&command, b"s");
    assert_eq!(states.next().await, Some(SessionState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn stop_during_handshake_is_not_undone_by_auto_start() {
    let (handle, probe, _recorder) = connect(StreamConfig::default().with_init_on_connect(false));
    let mut events = pin!(handle.events());

    // Both requests are handled before the banner is read back.
    handle.init().unwrap();
    handle.stop_streaming().unwrap();

    let event = tokio::time::timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event, SessionEvent::Ready);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.state(), SessionState::Stopped);
    assert_eq!(probe.commands(), b"vs".to_vec());

    // The handshake still counts, so an explicit start needs no new init.
    handle.start_streaming().unwrap();
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    assert_eq!(probe.commands(), b"vsb".to_vec());
}

#[tokio::test(start_paused = true)]
async fn init_while_streaming_stops_first() {
    let (handle, probe, _recorder) = connect(StreamConfig::default().with_auto_start(false));
    handle.wait_for_state(SessionState::Ready, WAIT).await.unwrap();
    handle.start_streaming().unwrap();
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    handle.init().unwrap();
    handle.wait_for_state(SessionState::Ready, WAIT).await.unwrap();
    assert_eq!(probe.commands(), b"vbsv".to_vec());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_board() {
    let (handle, probe, _recorder) = connect(StreamConfig::default());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    handle.shutdown().await.unwrap();
    assert_eq!(probe.commands(), b"vbs".to_vec());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_board() {
    let (handle, probe, _recorder) = connect(StreamConfig::default());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    drop(handle);
    settle().await;
    assert_eq!(probe.commands(), b"vbs".to_vec());
}

#[tokio::test(start_paused = true)]
async fn unplugged_board_ends_the_driver_with_a_transport_error() {
    let (handle, probe, _recorder) = connect(StreamConfig::default());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();

    probe.close();
    settle().await;
    assert!(handle.is_finished());

    let result = handle.shutdown().await;
    assert!(matches!(result, Err(StreamError::Transport { .. })));
}

#[tokio::test(start_paused = true)]
async fn requests_after_the_driver_ended_are_channel_errors() {
    let (handle, probe, _recorder) = connect(StreamConfig::default());
    handle.wait_for_state(SessionState::Streaming, WAIT).await.unwrap();
    probe.close();
    settle().await;

    let err = handle.start_streaming().unwrap_err();
    assert!(matches!(err, StreamError::ChannelClosed { .. }));
}

#[test]
fn invalid_config_is_rejected_before_spawning() {
    let config = StreamConfig::default().with_chunk_size(0);
    let result = OpenBci::connect(SimulatedBoard::new(), config, SinkSet::new());
    assert!(matches!(result, Err(StreamError::Config { .. })));
}
