//! Capture file format and hex helpers.
//!
//! A capture is the JSON document written by a HID capture session:
//!
//! ```json
//! {
//!   "vendor_id": "0x2DC8",
//!   "product_id": "0x310A",
//!   "captures": [
//!     { "timestamp_us": 1000, "report_id": 0, "data": "0x00 0x14 0x01 ..." }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use openpad_usb_common::DeviceIdentity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub timestamp_us: u64,
    pub report_id: u8,
    /// Space-separated `0xNN` bytes.
    pub data: String,
}

impl CaptureReport {
    pub fn bytes(&self) -> Result<Vec<u8>, String> {
        parse_hex_bytes(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub vendor_id: String,
    pub product_id: String,
    pub captures: Vec<CaptureReport>,
}

impl CaptureFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture file '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse capture file '{}'", path.display()))
    }

    /// Identity of the captured device, placed at a synthetic bus path.
    pub fn identity(&self, bus_path: &str) -> Result<DeviceIdentity> {
        let vid = parse_hex_u16(&self.vendor_id).map_err(anyhow::Error::msg)?;
        let pid = parse_hex_u16(&self.product_id).map_err(anyhow::Error::msg)?;
        Ok(DeviceIdentity::new(vid, pid, bus_path))
    }

    /// Microseconds between the first and last capture.
    pub fn duration_us(&self) -> u64 {
        match (self.captures.first(), self.captures.last()) {
            (Some(first), Some(last)) => last.timestamp_us.saturating_sub(first.timestamp_us),
            _ => 0,
        }
    }
}

pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

/// Decimal, or hex with a `0x` prefix.
pub fn parse_magnitude(s: &str) -> Result<u16, String> {
    if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex_u16(s)
    } else {
        s.parse::<u16>()
            .map_err(|e| format!("invalid magnitude '{s}': {e}"))
    }
}

/// Parse `0x00 0x14 ...`, `00 14 ...`, `00,14` or a packed `0014...` string.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for token in s.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let digits = token.trim_start_matches("0x").trim_start_matches("0X");
        if digits.is_empty() {
            return Err(format!("empty hex byte '{token}'"));
        }
        if digits.len() <= 2 {
            bytes.push(parse_hex_byte(digits)?);
            continue;
        }
        if digits.len() % 2 != 0 {
            return Err(format!("odd number of hex digits in '{token}'"));
        }
        for pair in digits.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair)
                .map_err(|e| format!("invalid hex digits in '{token}': {e}"))?;
            bytes.push(parse_hex_byte(pair)?);
        }
    }
    Ok(bytes)
}

fn parse_hex_byte(digits: &str) -> Result<u8, String> {
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex byte '{digits}': {e}"))
}

pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── BDD-style scenario tests ────────────────────────────────────────────────
