//! The transport trait a link drives.

use crate::{
    DeviceIdentity, DmaBuffer, EndpointDescriptor, InterfaceDescriptor, SubmitError, Transfer,
    TransferId, TransferRequest, TransportResult,
};

/// Host-controller services for one attached device.
///
/// Completion handlers run on whatever context the transport delivers
/// completions on, possibly concurrently with the caller.
///
/// # Contract
///
/// - A completion handler is never invoked from inside [`submit`](Self::submit).
///   Callers may hold their own locks across `submit`.
/// - Every accepted transfer completes exactly once.
/// - [`unlink`](Self::unlink) only requests cancellation. The completion may
///   arrive later, or not at all if the device is unresponsive.
/// - [`kill`](Self::kill) is forced. A well-behaved transport completes the
///   transfer before returning.
pub trait UsbTransport: Send + Sync {
    fn identity(&self) -> &DeviceIdentity;

    /// Active alternate setting of the bound interface.
    fn interface(&self) -> &InterfaceDescriptor;

    fn alloc_buffer(&self, len: usize) -> TransportResult<DmaBuffer>;

    fn free_buffer(&self, buffer: DmaBuffer);

    fn alloc_request(&self, endpoint: &EndpointDescriptor) -> TransportResult<TransferRequest>;

    fn free_request(&self, request: TransferRequest);

    /// # Errors
    ///
    /// Returns the buffer together with the reason when dispatch is refused.
    fn submit(&self, transfer: Transfer) -> Result<(), SubmitError>;

    fn unlink(&self, request: TransferId);

    fn kill(&self, request: TransferId);
}
