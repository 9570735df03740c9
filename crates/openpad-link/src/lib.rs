//! Control link for the 8BitDo Ultimate 2C.
//!
//! A [`Link`] owns one interrupt-in and one interrupt-out transfer on a
//! [`UsbTransport`](openpad_usb_common::UsbTransport):
//!
//! - the inbound read loop decodes every report into a
//!   [`ControlState`](hid_8bitdo_protocol::ControlState) and publishes it to
//!   an [`InputSink`];
//! - the outbound slot sends rumble commands with stop coalescing;
//! - teardown cancels in-flight work and finishes within a bounded time even
//!   if the device never answers.
//!
//! The crate never installs a `tracing` subscriber.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod anchor;
pub mod config;
pub mod counters;
pub mod driver;
pub mod error;
mod inbound;
pub mod link;
pub mod outbound;
pub mod sink;

pub use anchor::{Anchor, TransferKind};
pub use config::{LinkConfig, LinkConfigBuilder};
pub use counters::{LinkCounterSnapshot, LinkCounters};
pub use driver::{GamepadDriver, HotplugEvent, ID_TABLE};
pub use error::{ConfigError, DriverError, LinkError, LinkResult, SinkError};
pub use link::{Link, LinkPhase, TeardownReport};
pub use outbound::{RejectReason, SlotStatus, SubmitOutcome};
pub use sink::{
    AbsInfo, Axis, Capabilities, FfOutcome, ForceFeedbackEffect, InputFrame, InputSink, Key,
    MAPPING_VERSION, RumbleHandle, SinkDevice, capabilities, map_state,
};
