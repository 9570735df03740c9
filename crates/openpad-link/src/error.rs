//! Error types for link operations.

use openpad_usb_common::{Direction, TransportError};
use thiserror::Error;

/// Errors from loading or validating a [`crate::LinkConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for this shape.
    #[error("Invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
    /// A numeric field is outside its accepted range.
    #[error("Invalid configuration: {field} = {value} (must be 1..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Errors reported by an [`crate::InputSink`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink refused to create the input device.
    #[error("Input device registration rejected: {0}")]
    Registration(String),
    /// An input device with this physical path is already registered.
    #[error("Input device already registered: {0}")]
    AlreadyRegistered(String),
}

/// Errors that abort [`crate::Link::connect`].
///
/// Every variant is returned only after the partially built link has been
/// rolled back, so no transport resources remain allocated.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport could not allocate a buffer or request object.
    #[error("Resource exhaustion during connect: {0}")]
    ResourceExhaustion(#[source] TransportError),
    /// The active interface lacks an interrupt endpoint in this direction.
    #[error("No interrupt-{0} endpoint on the active interface")]
    EndpointNotFound(Direction),
    /// The transport refused an allocation or the first read for another reason.
    #[error("Transport error during connect: {0}")]
    Transport(#[source] TransportError),
    /// The input sink refused registration.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The supplied configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LinkError {
    /// Classify an allocation failure.
    pub(crate) fn allocation(error: TransportError) -> Self {
        match error {
            TransportError::NoMemory => Self::ResourceExhaustion(error),
            other => Self::Transport(other),
        }
    }
}

/// Errors returned by [`crate::GamepadDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device is not in the id table.
    #[error("Unsupported device {vendor_id:04x}:{product_id:04x}")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },
    /// A link already exists for this bus path.
    #[error("Device already attached at {0}")]
    AlreadyAttached(String),
    /// No link exists for this bus path.
    #[error("No device attached at {0}")]
    NotAttached(String),
    /// Connecting the link failed.
    #[error("Link setup failed: {0}")]
    Link(#[from] LinkError),
}

/// A specialized `Result` type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
