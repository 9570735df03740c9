//! Output report encoding (interrupt-out endpoint).
//!
//! All functions are pure and allocation-free.
//!
//! # Rumble report (8 bytes)
//! ```text
//! 0x00 0x08 0x00 <strong> <weak> 0x00 0x00 0x00
//! ```
//! Byte 3 drives the left (heavy) motor and byte 4 the right (light) motor.
//! Each motor takes 8-bit power, so only the high byte of the 16-bit
//! force-feedback magnitude is sent. The low byte is discarded on purpose.
//!
//! # Announce report (3 bytes)
//! ```text
//! 0x01 0x03 0x00
//! ```
//! This is the Xbox LED command. The controller has no programmable LED but
//! only starts streaming input reports after receiving it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire size of a rumble report.
pub const RUMBLE_REPORT_LEN: usize = 8;

/// Wire size of the announce report.
pub const ANNOUNCE_REPORT_LEN: usize = 3;

/// Size of the device-side output buffer; every output report fits.
pub const OUTPUT_BUFFER_LEN: usize = 32;

const RUMBLE_TAG: u8 = 0x00;
const RUMBLE_SUB_TAG: u8 = 0x08;
const ANNOUNCE_TAG: u8 = 0x01;
const ANNOUNCE_SUB_TAG: u8 = 0x03;

/// Two-channel rumble intensity, as delivered by the force-feedback layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RumbleCommand {
    /// Light (right) motor magnitude.
    pub weak: u16,
    /// Heavy (left) motor magnitude.
    pub strong: u16,
}

impl RumbleCommand {
    /// Both motors off.
    pub const STOP: Self = Self { weak: 0, strong: 0 };

    pub const fn new(weak: u16, strong: u16) -> Self {
        Self { weak, strong }
    }

    /// `true` for the zero/zero command that stops both motors.
    pub const fn is_stop(&self) -> bool {
        self.weak == 0 && self.strong == 0
    }
}

/// Build the 8-byte rumble report.
pub fn build_rumble_report(command: RumbleCommand) -> [u8; RUMBLE_REPORT_LEN] {
    let [strong, _] = command.strong.to_be_bytes();
    let [weak, _] = command.weak.to_be_bytes();
    [
        RUMBLE_TAG,
        RUMBLE_SUB_TAG,
        0x00,
        strong,
        weak,
        0x00,
        0x00,
        0x00,
    ]
}

/// Build the 3-byte announce report sent once after attach.
pub fn build_announce_report() -> [u8; ANNOUNCE_REPORT_LEN] {
    [ANNOUNCE_TAG, ANNOUNCE_SUB_TAG, 0x00]
}

/// Errors returned by [`OutputReport::encode_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("output buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
}

/// Any report the host sends on the interrupt-out endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputReport {
    Rumble(RumbleCommand),
    Announce,
}

impl OutputReport {
    /// Bytes this report occupies on the wire.
    pub const fn wire_len(&self) -> usize {
        match self {
            OutputReport::Rumble(_) => RUMBLE_REPORT_LEN,
            OutputReport::Announce => ANNOUNCE_REPORT_LEN,
        }
    }

    /// `true` for a rumble report that stops both motors.
    pub const fn is_stop(&self) -> bool {
        matches!(self, OutputReport::Rumble(command) if command.is_stop())
    }

    /// Write the report into the head of `out` and return its length.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, EncodeError> {
        let have = out.len();
        let need = self.wire_len();
        let dst = out
            .get_mut(..need)
            .ok_or(EncodeError::BufferTooSmall { need, have })?;
        match self {
            OutputReport::Rumble(command) => dst.copy_from_slice(&build_rumble_report(*command)),
            OutputReport::Announce => dst.copy_from_slice(&build_announce_report()),
        }
        Ok(need)
    }
}
