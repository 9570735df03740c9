//! 8BitDo Ultimate 2C USB protocol: input report decoding and rumble encoding.
//!
//! This crate is intentionally I/O-free and allocation-free. It provides pure
//! functions over the controller's fixed report layout so the codec can be
//! tested without hardware.
//!
//! # Reports
//! - Input: 32 bytes on the interrupt-in endpoint, tag byte `0x00`.
//! - Rumble: 8 bytes on the interrupt-out endpoint (`0x00 0x08 ...`).
//! - Announce: 3 bytes (`0x01 0x03 0x00`). The controller stays silent until
//!   the host sends this once after attach.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod ids;
pub mod input;
pub mod output;
pub mod types;

pub use ids::{is_supported, product_name, DEVICE_NAME, PRODUCT_ULTIMATE_2C, VENDOR_ID};
pub use input::{
    decode, parse, trigger_button, Decoded, ParseError, INPUT_REPORT_LEN, INPUT_REPORT_TAG,
    TRIGGER_PRESS_ABOVE, TRIGGER_RELEASE_BELOW,
};
pub use output::{
    build_announce_report, build_rumble_report, EncodeError, OutputReport, RumbleCommand,
    ANNOUNCE_REPORT_LEN, OUTPUT_BUFFER_LEN, RUMBLE_REPORT_LEN,
};
pub use types::ControlState;
