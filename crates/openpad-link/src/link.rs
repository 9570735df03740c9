//! Link lifecycle.
//!
//! ```text
//! Uninitialized -> Allocating -> Active -> Deactivating -> Freed
//!                      |                        ^
//!                      +------ (failure) -------+
//! ```
//!
//! Connect failures roll back through the same teardown path as a normal
//! disconnect. Every release step takes the resource out of an `Option`, so
//! a partially allocated link frees cleanly.

use crate::anchor::{Anchor, TransferKind};
use crate::config::LinkConfig;
use crate::counters::{LinkCounterSnapshot, LinkCounters};
use crate::error::{LinkError, LinkResult};
use crate::inbound::InboundChannel;
use crate::outbound::{OutboundChannel, SlotStatus, SubmitOutcome};
use crate::sink::{InputSink, RumbleHandle, SinkDevice, capabilities};
use hid_8bitdo_protocol::{ControlState, INPUT_REPORT_LEN, OUTPUT_BUFFER_LEN, RumbleCommand};
use openpad_usb_common::{Direction, UsbTransport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkPhase {
    Uninitialized,
    Allocating,
    Active,
    Deactivating,
    Freed,
}

/// How teardown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Every in-flight transfer completed within the grace period.
    pub graceful: bool,
    /// Transfers that had to be killed.
    pub forced: usize,
    /// Killed transfers the transport never completed; their completions
    /// were synthesized.
    pub synthesized: usize,
}

/// State shared by both channels and their completion handlers.
pub(crate) struct LinkCore {
    pub(crate) transport: Arc<dyn UsbTransport>,
    pub(crate) anchor: Anchor,
    pub(crate) counters: LinkCounters,
    pub(crate) config: LinkConfig,
    active: AtomicBool,
}

impl LinkCore {
    pub(crate) fn new(transport: Arc<dyn UsbTransport>, config: LinkConfig) -> Self {
        Self {
            transport,
            anchor: Anchor::new(),
            counters: LinkCounters::new(),
            config,
            active: AtomicBool::new(false),
        }
    }

    /// The single authority on whether new transfers may be submitted.
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }
}

/// A connected controller.
///
/// Call [`disconnect`](Self::disconnect) to tear down. Dropping a link
/// without it stops all resubmission but abandons in-flight transfers.
pub struct Link {
    core: Arc<LinkCore>,
    outbound: Arc<OutboundChannel>,
    inbound: Arc<InboundChannel>,
    sink: Arc<dyn InputSink>,
    device: SinkDevice,
    phase: LinkPhase,
    sink_registered: bool,
}

impl Link {
    /// Allocate, announce, register with the sink and start the read loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, an allocation fails, an
    /// interrupt endpoint is missing, the sink refuses registration or the
    /// first read is refused. The link is fully rolled back in every case.
    pub async fn connect(
        transport: Arc<dyn UsbTransport>,
        sink: Arc<dyn InputSink>,
        config: LinkConfig,
    ) -> LinkResult<Self> {
        config.validate()?;
        let device = SinkDevice::for_identity(transport.identity());
        let core = Arc::new(LinkCore::new(transport, config));
        let mut link = Self {
            outbound: OutboundChannel::new(Arc::clone(&core)),
            inbound: InboundChannel::new(Arc::clone(&core), device.clone()),
            core,
            sink,
            device,
            phase: LinkPhase::Uninitialized,
            sink_registered: false,
        };

        let result = link.allocate().and_then(|()| link.activate());
        if let Err(error) = result {
            warn!(device = %link.device.phys, %error, "connect failed, rolling back");
            let report = link.teardown().await;
            debug!(?report, "rollback complete");
            return Err(error);
        }

        info!(device = %link.device.phys, name = %link.device.name, "link active");
        Ok(link)
    }

    fn allocate(&mut self) -> LinkResult<()> {
        self.phase = LinkPhase::Allocating;
        let transport = Arc::clone(&self.core.transport);

        let buffer = transport
            .alloc_buffer(INPUT_REPORT_LEN)
            .map_err(LinkError::allocation)?;
        self.inbound.install_buffer(buffer);
        let buffer = transport
            .alloc_buffer(OUTPUT_BUFFER_LEN)
            .map_err(LinkError::allocation)?;
        self.outbound.install_buffer(buffer);

        let interface = transport.interface();
        let in_ep = *interface
            .find_interrupt(Direction::In)
            .ok_or(LinkError::EndpointNotFound(Direction::In))?;
        let out_ep = *interface
            .find_interrupt(Direction::Out)
            .ok_or(LinkError::EndpointNotFound(Direction::Out))?;

        let request = transport
            .alloc_request(&in_ep)
            .map_err(LinkError::allocation)?;
        self.inbound.install_request(request);
        let request = transport
            .alloc_request(&out_ep)
            .map_err(LinkError::allocation)?;
        self.outbound.install_request(request);

        debug!(
            in_ep = in_ep.address,
            out_ep = out_ep.address,
            "link resources allocated"
        );
        Ok(())
    }

    fn activate(&mut self) -> LinkResult<()> {
        self.phase = LinkPhase::Active;
        self.core.set_active(true);

        match self.outbound.announce() {
            SubmitOutcome::Accepted => {}
            outcome => warn!(?outcome, "announce not sent, device may stay silent"),
        }

        self.sink.register(&self.device, &capabilities())?;
        self.sink_registered = true;
        self.inbound.attach_sink(Arc::clone(&self.sink));

        self.inbound.start().map_err(LinkError::Transport)
    }

    /// Tear the link down.
    ///
    /// Completes within `teardown_grace_ms + kill_grace_ms` whatever the
    /// device does.
    pub async fn disconnect(mut self) -> TeardownReport {
        let report = self.teardown().await;
        info!(
            device = %self.device.phys,
            graceful = report.graceful,
            forced = report.forced,
            "link closed"
        );
        report
    }

    async fn teardown(&mut self) -> TeardownReport {
        // Must come before any cancellation so no completion resubmits.
        self.core.set_active(false);
        self.phase = LinkPhase::Deactivating;
        // Anything dispatched by a handler that saw the link active is now
        // in the anchor and will be cancelled below.
        self.inbound.quiesce();
        self.outbound.quiesce();

        if self.sink_registered {
            self.inbound.detach_sink();
            self.sink.unregister(&self.device);
            self.sink_registered = false;
        }

        let transport = Arc::clone(&self.core.transport);
        for (id, kind) in self.core.anchor.in_flight() {
            // The outbound slot is left to drain so a final stop reaches the motors.
            if kind == TransferKind::Inbound {
                transport.unlink(id);
            }
        }

        let mut report = TeardownReport {
            graceful: true,
            ..TeardownReport::default()
        };
        let config = &self.core.config;
        if !self.core.anchor.wait_empty(config.teardown_grace()).await {
            let remaining = self.core.anchor.in_flight();
            report.graceful = false;
            report.forced = remaining.len();
            warn!(
                count = remaining.len(),
                grace_ms = config.teardown_grace_ms,
                "transfers outlived the grace period, killing"
            );
            for (id, _) in &remaining {
                transport.kill(*id);
            }

            if !self.core.anchor.wait_empty(config.kill_grace()).await {
                let orphaned = self.core.anchor.force_release_all();
                report.synthesized = orphaned.len();
                self.core
                    .counters
                    .inc_forced_cancellations_by(orphaned.len() as u64);
                warn!(
                    count = orphaned.len(),
                    "transport ignored kill, completions synthesized"
                );
            }
        }

        let (in_request, in_buffer) = self.inbound.release_resources();
        let (out_request, out_buffer) = self.outbound.release_resources();
        for request in [in_request, out_request].into_iter().flatten() {
            transport.free_request(request);
        }
        for buffer in [in_buffer, out_buffer].into_iter().flatten() {
            transport.free_buffer(buffer);
        }

        self.phase = LinkPhase::Freed;
        report
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    pub fn device(&self) -> &SinkDevice {
        &self.device
    }

    /// Last decoded snapshot.
    pub fn state(&self) -> ControlState {
        self.inbound.state()
    }

    pub fn rumble(&self, command: RumbleCommand) -> SubmitOutcome {
        self.outbound.submit(command)
    }

    pub fn announce(&self) -> SubmitOutcome {
        self.outbound.announce()
    }

    /// Handle for the sink's force-feedback path.
    pub fn rumble_handle(&self) -> RumbleHandle {
        RumbleHandle::new(Arc::downgrade(&self.outbound))
    }

    pub fn outbound_status(&self) -> SlotStatus {
        self.outbound.status()
    }

    /// Transfers currently handed to the transport.
    pub fn in_flight(&self) -> usize {
        self.core.anchor.len()
    }

    pub fn counters(&self) -> LinkCounterSnapshot {
        self.core.counters.snapshot()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("device", &self.device.phys)
            .field("phase", &self.phase)
            .field("active", &self.core.is_active())
            .finish_non_exhaustive()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if self.phase == LinkPhase::Freed {
            return;
        }
        self.core.set_active(false);
        if self.sink_registered {
            self.inbound.detach_sink();
            self.sink.unregister(&self.device);
        }
        warn!(
            device = %self.device.phys,
            in_flight = self.core.anchor.len(),
            "link dropped without disconnect"
        );
    }
}
