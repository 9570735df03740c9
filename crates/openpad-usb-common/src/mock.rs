//! Scripted in-memory transport.
//!
//! Transfers stay pending until the test delivers a completion explicitly,
//! so every interleaving a real host controller can produce is reachable
//! from a single thread. Completion handlers are always invoked with the
//! internal lock released.

use crate::{
    Completion, CompletionHandler, DeviceIdentity, Direction, DmaBuffer, ENDPOINT_DIR_IN,
    EndpointDescriptor, InterfaceDescriptor, SubmitError, Transfer, TransferId, TransferRequest,
    TransferStatus, TransportError, TransportResult, UsbTransport,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// What the mock does when asked to cancel a pending transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelBehavior {
    /// Complete the transfer with a cancellation status before returning.
    #[default]
    Complete,
    /// Leave it pending, as an unresponsive device would.
    Ignore,
}

struct PendingTransfer {
    request: TransferRequest,
    buffer: DmaBuffer,
    length: usize,
    on_complete: CompletionHandler,
}

impl PendingTransfer {
    fn direction(&self) -> Direction {
        if self.request.endpoint() & ENDPOINT_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    fn deliver(self, status: TransferStatus, actual_length: usize) {
        (self.on_complete)(Completion {
            request: self.request.id(),
            status,
            buffer: self.buffer,
            actual_length,
        });
    }
}

#[derive(Default)]
struct MockState {
    next_buffer_id: u64,
    next_request_id: u64,
    live_buffers: HashSet<u64>,
    live_requests: HashSet<TransferId>,
    buffer_budget: Option<usize>,
    request_budget: Option<usize>,
    submit_failures: usize,
    unlink: CancelBehavior,
    kill: CancelBehavior,
    pending: BTreeMap<TransferId, PendingTransfer>,
    write_history: Vec<Vec<u8>>,
    submits: usize,
    unlinks: Vec<TransferId>,
    kills: Vec<TransferId>,
    invalid_frees: usize,
    disconnected: bool,
}

impl MockState {
    fn take_first(&mut self, direction: Direction) -> Option<PendingTransfer> {
        let id = self
            .pending
            .iter()
            .find(|(_, pending)| pending.direction() == direction)
            .map(|(id, _)| *id)?;
        self.pending.remove(&id)
    }
}

pub struct MockTransport {
    identity: DeviceIdentity,
    interface: InterfaceDescriptor,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(identity: DeviceIdentity, interface: InterfaceDescriptor) -> Self {
        Self {
            identity,
            interface,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Interface 0 with interrupt-in 0x81 and interrupt-out 0x02, 32 bytes each.
    pub fn interrupt_pair(identity: DeviceIdentity) -> Self {
        Self::new(
            identity,
            InterfaceDescriptor::new(
                0,
                vec![
                    EndpointDescriptor::interrupt_in(1, 32, 1),
                    EndpointDescriptor::interrupt_out(2, 32, 1),
                ],
            ),
        )
    }

    /// Allow only `limit` more buffer allocations; `None` removes the limit.
    pub fn set_buffer_alloc_limit(&self, limit: Option<usize>) {
        self.state.lock().buffer_budget = limit;
    }

    /// Allow only `limit` more request allocations; `None` removes the limit.
    pub fn set_request_alloc_limit(&self, limit: Option<usize>) {
        self.state.lock().request_budget = limit;
    }

    /// Refuse the next `count` submissions.
    pub fn fail_next_submits(&self, count: usize) {
        self.state.lock().submit_failures = count;
    }

    pub fn set_unlink_behavior(&self, behavior: CancelBehavior) {
        self.state.lock().unlink = behavior;
    }

    pub fn set_kill_behavior(&self, behavior: CancelBehavior) {
        self.state.lock().kill = behavior;
    }

    /// Complete the oldest pending interrupt-in transfer with `data`.
    ///
    /// Returns `false` if no read was pending.
    pub fn complete_in(&self, data: &[u8]) -> bool {
        let pending = self.state.lock().take_first(Direction::In);
        match pending {
            Some(mut pending) => {
                let len = data.len().min(pending.length).min(pending.buffer.len());
                if let (Some(dst), Some(src)) = (pending.buffer.get_mut(..len), data.get(..len)) {
                    dst.copy_from_slice(src);
                }
                pending.deliver(TransferStatus::Completed, len);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest pending interrupt-out transfer successfully.
    pub fn complete_out(&self) -> bool {
        self.finish_first(Direction::Out, TransferStatus::Completed)
    }

    /// Complete the oldest pending transfer in `direction` with `status`.
    pub fn finish_first(&self, direction: Direction, status: TransferStatus) -> bool {
        let pending = self.state.lock().take_first(direction);
        match pending {
            Some(pending) => {
                let len = if status.is_success() { pending.length } else { 0 };
                pending.deliver(status, len);
                true
            }
            None => false,
        }
    }

    /// Complete a specific transfer, e.g. one an unlink was ignored for.
    pub fn finish(&self, id: TransferId, status: TransferStatus) -> bool {
        let pending = self.state.lock().pending.remove(&id);
        match pending {
            Some(pending) => {
                let len = if status.is_success() { pending.length } else { 0 };
                pending.deliver(status, len);
                true
            }
            None => false,
        }
    }

    /// Model surprise removal: fail every pending transfer and refuse new ones.
    pub fn disconnect(&self) {
        let drained: Vec<PendingTransfer> = {
            let mut state = self.state.lock();
            state.disconnected = true;
            std::mem::take(&mut state.pending).into_values().collect()
        };
        for pending in drained {
            pending.deliver(TransferStatus::NoDevice, 0);
        }
    }

    pub fn has_pending(&self, direction: Direction) -> bool {
        self.state
            .lock()
            .pending
            .values()
            .any(|pending| pending.direction() == direction)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn pending_ids(&self) -> Vec<TransferId> {
        self.state.lock().pending.keys().copied().collect()
    }

    /// Payloads of every accepted interrupt-out transfer, oldest first.
    pub fn write_history(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_history.clone()
    }

    /// Accepted submissions in either direction.
    pub fn submit_count(&self) -> usize {
        self.state.lock().submits
    }

    pub fn unlink_requests(&self) -> Vec<TransferId> {
        self.state.lock().unlinks.clone()
    }

    pub fn kill_requests(&self) -> Vec<TransferId> {
        self.state.lock().kills.clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().live_buffers.len()
    }

    pub fn live_requests(&self) -> usize {
        self.state.lock().live_requests.len()
    }

    /// Frees of unknown or already freed objects.
    pub fn invalid_frees(&self) -> usize {
        self.state.lock().invalid_frees
    }

    fn cancel(&self, request: TransferId, status: TransferStatus) {
        let pending = {
            let mut state = self.state.lock();
            let behavior = if status == TransferStatus::Killed {
                state.kills.push(request);
                state.kill
            } else {
                state.unlinks.push(request);
                state.unlink
            };
            match behavior {
                CancelBehavior::Complete => state.pending.remove(&request),
                CancelBehavior::Ignore => None,
            }
        };
        if let Some(pending) = pending {
            pending.deliver(status, 0);
        }
    }
}

impl UsbTransport for MockTransport {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    fn alloc_buffer(&self, len: usize) -> TransportResult<DmaBuffer> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(TransportError::NoDevice);
        }
        if let Some(budget) = state.buffer_budget.as_mut() {
            if *budget == 0 {
                return Err(TransportError::NoMemory);
            }
            *budget -= 1;
        }
        state.next_buffer_id += 1;
        let id = state.next_buffer_id;
        state.live_buffers.insert(id);
        Ok(DmaBuffer::new(id, len))
    }

    fn free_buffer(&self, buffer: DmaBuffer) {
        let mut state = self.state.lock();
        if !state.live_buffers.remove(&buffer.id()) {
            state.invalid_frees += 1;
            warn!(buffer = buffer.id(), "free of unknown buffer");
        }
    }

    fn alloc_request(&self, endpoint: &EndpointDescriptor) -> TransportResult<TransferRequest> {
        if !self.interface.endpoints.contains(endpoint) {
            return Err(TransportError::InvalidEndpoint(endpoint.address));
        }
        let mut state = self.state.lock();
        if let Some(budget) = state.request_budget.as_mut() {
            if *budget == 0 {
                return Err(TransportError::NoMemory);
            }
            *budget -= 1;
        }
        state.next_request_id += 1;
        let id = TransferId::new(state.next_request_id);
        state.live_requests.insert(id);
        Ok(TransferRequest::new(id, endpoint.address))
    }

    fn free_request(&self, request: TransferRequest) {
        let mut state = self.state.lock();
        // An in-flight request stays usable until its completion is delivered,
        // as with a refcounted host-controller request.
        if !state.live_requests.remove(&request.id()) {
            state.invalid_frees += 1;
            warn!(request = %request.id(), "free of unknown request");
        }
    }

    fn submit(&self, transfer: Transfer) -> Result<(), SubmitError> {
        let mut state = self.state.lock();
        let Transfer {
            request,
            buffer,
            length,
            on_complete,
        } = transfer;

        let refused = if state.disconnected {
            Some(TransportError::NoDevice)
        } else if state.submit_failures > 0 {
            state.submit_failures -= 1;
            Some(TransportError::Rejected("injected failure".to_string()))
        } else if !state.live_requests.contains(&request.id()) {
            Some(TransportError::InvalidEndpoint(request.endpoint()))
        } else if state.pending.contains_key(&request.id()) {
            Some(TransportError::Busy)
        } else if length > buffer.len() {
            Some(TransportError::Rejected(format!(
                "length {length} exceeds buffer of {}",
                buffer.len()
            )))
        } else {
            None
        };
        if let Some(error) = refused {
            return Err(SubmitError { error, buffer });
        }

        let pending = PendingTransfer {
            request,
            buffer,
            length,
            on_complete,
        };
        if pending.direction() == Direction::Out {
            let payload = pending.buffer.get(..length).unwrap_or_default().to_vec();
            state.write_history.push(payload);
        }
        state.submits += 1;
        state.pending.insert(request.id(), pending);
        Ok(())
    }

    fn unlink(&self, request: TransferId) {
        self.cancel(request, TransferStatus::Cancelled);
    }

    fn kill(&self, request: TransferId) {
        self.cancel(request, TransferStatus::Killed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn transport() -> MockTransport {
        MockTransport::interrupt_pair(DeviceIdentity::new(0x2dc8, 0x310a, "usb-1-1"))
    }

    fn out_endpoint(transport: &MockTransport) -> EndpointDescriptor {
        transport
            .interface()
            .find_interrupt(Direction::Out)
            .copied()
            .unwrap_or(EndpointDescriptor::interrupt_out(2, 32, 1))
    }

    #[test]
    fn test_completion_returns_buffer() -> TestResult {
        let transport = transport();
        let ep = out_endpoint(&transport);
        let request = transport.alloc_request(&ep)?;
        let mut buffer = transport.alloc_buffer(8)?;
        buffer[0] = 0x42;

        let returned = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&returned);
        let transfer = Transfer::new(request, buffer, 1, move |c: Completion| {
            *slot.lock() = Some((c.status, c.buffer));
        });
        transport.submit(transfer)?;
        assert!(returned.lock().is_none(), "handler must not run inside submit");

        assert!(transport.complete_out());
        let (status, buffer) = returned.lock().take().ok_or("completion not delivered")?;
        assert_eq!(status, TransferStatus::Completed);
        assert_eq!(transport.write_history(), vec![vec![0x42]]);

        transport.free_buffer(buffer);
        transport.free_request(request);
        assert_eq!(transport.live_buffers(), 0);
        assert_eq!(transport.live_requests(), 0);
        assert_eq!(transport.invalid_frees(), 0);
        Ok(())
    }

    #[test]
    fn test_injected_submit_failure_returns_buffer() -> TestResult {
        let transport = transport();
        let ep = out_endpoint(&transport);
        let request = transport.alloc_request(&ep)?;
        let buffer = transport.alloc_buffer(8)?;
        transport.fail_next_submits(1);

        let Err(err) = transport.submit(Transfer::new(request, buffer, 8, |_| {})) else {
            return Err("submit should fail".into());
        };
        assert!(matches!(err.error, TransportError::Rejected(_)));
        assert_eq!(err.buffer.len(), 8);
        assert_eq!(transport.submit_count(), 0);
        Ok(())
    }

    #[test]
    fn test_ignored_unlink_keeps_transfer_pending() -> TestResult {
        let transport = transport();
        transport.set_unlink_behavior(CancelBehavior::Ignore);
        let ep = out_endpoint(&transport);
        let request = transport.alloc_request(&ep)?;
        let buffer = transport.alloc_buffer(8)?;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        transport.submit(Transfer::new(request, buffer, 8, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))?;

        transport.unlink(request.id());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.pending_count(), 1);

        transport.kill(request.id());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn test_alloc_budget() {
        let transport = transport();
        transport.set_buffer_alloc_limit(Some(1));
        assert!(transport.alloc_buffer(4).is_ok());
        assert!(matches!(
            transport.alloc_buffer(4),
            Err(TransportError::NoMemory)
        ));
    }

    #[test]
    fn test_double_free_is_counted() -> TestResult {
        let transport = transport();
        let buffer = transport.alloc_buffer(4)?;
        let id = buffer.id();
        transport.free_buffer(buffer);
        transport.free_buffer(DmaBuffer::new(id, 4));
        assert_eq!(transport.invalid_frees(), 1);
        Ok(())
    }
}
