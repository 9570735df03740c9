//! Transfer requests, buffers and completions.
//!
//! Ownership of a [`DmaBuffer`] travels with the transfer: it moves into the
//! transport on [`Transfer`] submission and comes back either in the
//! [`Completion`] handed to the completion handler or in a [`SubmitError`]
//! when dispatch is refused. At no point do the submitter and the transport
//! both hold it.

use crate::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Identifies one transfer request object for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(u64);

impl TransferId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xfer#{}", self.0)
    }
}

/// A reusable transfer request object bound to one endpoint.
///
/// Allocated with [`crate::UsbTransport::alloc_request`] and released with
/// [`crate::UsbTransport::free_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferRequest {
    id: TransferId,
    endpoint: u8,
}

impl TransferRequest {
    pub const fn new(id: TransferId, endpoint: u8) -> Self {
        Self { id, endpoint }
    }

    pub const fn id(&self) -> TransferId {
        self.id
    }

    /// Endpoint address, including the direction bit.
    pub const fn endpoint(&self) -> u8 {
        self.endpoint
    }
}

/// Device-accessible transfer buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct DmaBuffer {
    id: u64,
    data: Box<[u8]>,
}

impl DmaBuffer {
    /// Zero-filled buffer. Only transports should mint buffers.
    pub fn new(id: u64, len: usize) -> Self {
        Self {
            id,
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Deref for DmaBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for DmaBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Final status of a transfer as reported to its completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Completed,
    /// Asynchronous unlink took effect.
    Cancelled,
    /// Forced kill took effect.
    Killed,
    Stalled,
    /// Device removed while the transfer was queued.
    NoDevice,
    /// Host-controller specific error code.
    Error(i32),
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }

    /// Status produced by an intentional cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransferStatus::Cancelled | TransferStatus::Killed)
    }
}

/// Delivered exactly once per accepted transfer.
#[derive(Debug)]
pub struct Completion {
    pub request: TransferId,
    pub status: TransferStatus,
    pub buffer: DmaBuffer,
    pub actual_length: usize,
}

pub type CompletionHandler = Box<dyn FnOnce(Completion) + Send + 'static>;

/// A transfer ready for submission.
pub struct Transfer {
    pub request: TransferRequest,
    pub buffer: DmaBuffer,
    /// Bytes to send (out) or the maximum to receive (in).
    pub length: usize,
    pub on_complete: CompletionHandler,
}

impl Transfer {
    pub fn new(
        request: TransferRequest,
        buffer: DmaBuffer,
        length: usize,
        on_complete: impl FnOnce(Completion) + Send + 'static,
    ) -> Self {
        Self {
            request,
            buffer,
            length,
            on_complete: Box::new(on_complete),
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("request", &self.request)
            .field("buffer", &self.buffer.id())
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Dispatch refused; the buffer is handed back to the submitter.
#[derive(Debug, Error)]
#[error("submit failed: {error}")]
pub struct SubmitError {
    #[source]
    pub error: TransportError,
    pub buffer: DmaBuffer,
}
