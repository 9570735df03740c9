//! Common USB abstractions for OpenPad gamepad links.
//!
//! This crate models the host-controller services a link consumes:
//! device-accessible buffers, transfer request objects, asynchronous
//! submission with out-of-band completion, and cancellation. Real backends
//! implement [`UsbTransport`]; tests use [`mock::MockTransport`].

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod device_info;
pub mod endpoint;
pub mod mock;
pub mod transfer;
pub mod transport;

pub use device_info::*;
pub use endpoint::*;
pub use transfer::*;
pub use transport::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Out of memory")]
    NoMemory,

    #[error("Device is gone")]
    NoDevice,

    #[error("Transfer request already in flight")]
    Busy,

    #[error("Invalid endpoint 0x{0:02x}")]
    InvalidEndpoint(u8),

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
