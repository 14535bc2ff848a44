//! Shared helpers for pcmout-player integration tests
//!
//! Provides a fast playback configuration, deterministic PCM payloads and
//! event sequence checks.

#![allow(dead_code)]

use pcmout_common::config::PlaybackConfig;
use pcmout_common::{AudioFormat, ErrorKind};
use pcmout_player::{PlaybackController, PlaybackEvent};
use std::time::{Duration, Instant};

/// Small buffer, short timeouts, tight polling
pub fn fast_config() -> PlaybackConfig {
    PlaybackConfig {
        buffer_duration_ms: 20,
        chunk_frames: 64,
        write_timeout_ms: 1_000,
        shutdown_timeout_ms: 2_000,
        drain_poll_interval_ms: 1,
        device: None,
    }
}

pub fn controller(config: PlaybackConfig) -> PlaybackController {
    PlaybackController::new(config).expect("valid test config")
}

/// `frames` frames of a repeating byte ramp, distinguishable by position
pub fn ramp(format: &AudioFormat, frames: usize) -> Vec<u8> {
    (0..format.bytes_for_frames(frames))
        .map(|i| (i % 251) as u8)
        .collect()
}

pub fn event_names(events: &[PlaybackEvent]) -> Vec<&'static str> {
    events.iter().map(PlaybackEvent::name).collect()
}

/// Assert `opened, flush*, terminal` with nothing after the terminal event
pub fn assert_event_grammar(events: &[PlaybackEvent]) {
    let names = event_names(events);
    assert!(names.len() >= 2, "too few events: {:?}", names);
    assert_eq!(names[0], "opened", "events: {:?}", names);
    let last = names.len() - 1;
    assert!(events[last].is_terminal(), "events: {:?}", names);
    for name in &names[1..last] {
        assert_eq!(*name, "flush", "events: {:?}", names);
    }
}

/// Kind of the terminal error event, if the sequence ended in error
pub fn terminal_error_kind(events: &[PlaybackEvent]) -> Option<ErrorKind> {
    match events.last() {
        Some(PlaybackEvent::Error { kind, .. }) => Some(*kind),
        _ => None,
    }
}

/// Bytes delivered according to the final flush event
pub fn last_flush(events: &[PlaybackEvent]) -> Option<u64> {
    events.iter().rev().find_map(|event| match event {
        PlaybackEvent::Flush { bytes_delivered } => Some(*bytes_delivered),
        _ => None,
    })
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
