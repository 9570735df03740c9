//! Feed a capture through a real link over the in-memory transport.
//!
//! The captured device is attached through [`GamepadDriver`] exactly as a
//! hotplugged controller would be; every capture then completes one read.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use hid_8bitdo_protocol::ControlState;
use openpad_link::{
    Capabilities, GamepadDriver, InputFrame, InputSink, LinkConfig, LinkCounterSnapshot,
    SinkDevice, SinkError, TeardownReport,
};
use openpad_usb_common::mock::MockTransport;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::{CaptureFile, format_hex_bytes};

/// Bus path the replayed device is attached at.
pub const REPLAY_BUS_PATH: &str = "replay-0";

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Honour the capture timestamps instead of replaying back to back.
    pub realtime: bool,
    pub config: LinkConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub device: String,
    pub captures: usize,
    /// Span of the capture timestamps.
    pub duration_us: u64,
    pub delivered: usize,
    /// Captures whose data could not be parsed.
    pub skipped: usize,
    pub frames: usize,
    /// Rising edges of the heartbeat chord.
    pub heartbeats: usize,
    pub counters: LinkCounterSnapshot,
    pub final_state: ControlState,
    /// Every interrupt-out payload, in capture notation.
    pub writes: Vec<String>,
    pub teardown: TeardownReport,
}

/// Sink that keeps the frames it is given.
#[derive(Debug, Default)]
pub struct ReplaySink {
    frames: Mutex<Vec<InputFrame>>,
}

impl ReplaySink {
    pub fn frames(&self) -> Vec<InputFrame> {
        self.frames.lock().clone()
    }
}

impl InputSink for ReplaySink {
    fn register(&self, device: &SinkDevice, capabilities: &Capabilities) -> Result<(), SinkError> {
        info!(
            name = %device.name,
            phys = %device.phys,
            keys = capabilities.keys.len(),
            axes = capabilities.axes.len(),
            "input device registered"
        );
        Ok(())
    }

    fn report(&self, device: &SinkDevice, frame: &InputFrame) {
        debug!(phys = %device.phys, pressed = ?frame.pressed(), "frame");
        self.frames.lock().push(*frame);
    }

    fn unregister(&self, device: &SinkDevice) {
        info!(phys = %device.phys, "input device removed");
    }
}

pub async fn replay(file: &CaptureFile, options: &ReplayOptions) -> Result<ReplaySummary> {
    let identity = file.identity(REPLAY_BUS_PATH)?;
    let transport = Arc::new(MockTransport::interrupt_pair(identity));
    let sink = Arc::new(ReplaySink::default());
    let mut driver = GamepadDriver::new(sink.clone(), options.config.clone());

    let device = driver
        .attach(transport.clone())
        .await
        .context("Failed to attach captured device")?
        .device()
        .phys
        .clone();
    // The controller acknowledges the announce before it streams.
    if !transport.complete_out() {
        warn!("announce was not sent");
    }

    let mut delivered = 0;
    let mut skipped = 0;
    let mut heartbeats = 0;
    let mut heartbeat = false;
    let mut previous_us: Option<u64> = None;

    for (index, capture) in file.captures.iter().enumerate() {
        if options.realtime {
            if let Some(previous) = previous_us {
                let gap = capture.timestamp_us.saturating_sub(previous);
                tokio::time::sleep(Duration::from_micros(gap)).await;
            }
            previous_us = Some(capture.timestamp_us);
        }

        let bytes = match capture.bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(index, %error, "skipping malformed capture");
                skipped += 1;
                continue;
            }
        };
        if !transport.complete_in(&bytes) {
            warn!(index, "read loop is no longer armed, stopping replay");
            break;
        }
        delivered += 1;

        let level = driver
            .link(REPLAY_BUS_PATH)
            .is_some_and(|link| link.state().heartbeat);
        if level && !heartbeat {
            heartbeats += 1;
        }
        heartbeat = level;
    }

    let (counters, final_state) = driver
        .link(REPLAY_BUS_PATH)
        .map(|link| (link.counters(), link.state()))
        .ok_or_else(|| anyhow!("link for {REPLAY_BUS_PATH} disappeared during replay"))?;
    let teardown = driver
        .shutdown()
        .await
        .into_iter()
        .map(|(_, report)| report)
        .next()
        .unwrap_or_default();

    Ok(ReplaySummary {
        device,
        captures: file.captures.len(),
        duration_us: file.duration_us(),
        delivered,
        skipped,
        frames: sink.frames().len(),
        heartbeats,
        counters,
        final_state,
        writes: transport
            .write_history()
            .iter()
            .map(|payload| format_hex_bytes(payload))
            .collect(),
        teardown,
    })
}

// ── BDD-style scenario tests ────────────────────────────────────────────────
