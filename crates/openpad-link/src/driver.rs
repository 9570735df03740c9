//! Device registry boundary.
//!
//! The registry reports attach and detach events; the driver matches the
//! identity against its id table and owns one [`Link`] per bus path.

use crate::config::LinkConfig;
use crate::error::DriverError;
use crate::link::{Link, TeardownReport};
use crate::sink::InputSink;
use hid_8bitdo_protocol::{PRODUCT_ULTIMATE_2C, VENDOR_ID};
use openpad_usb_common::{DeviceIdentity, DeviceMatch, UsbTransport};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Devices this driver binds to.
pub const ID_TABLE: [DeviceMatch; 1] = [DeviceMatch::new(VENDOR_ID, PRODUCT_ULTIMATE_2C)];

pub enum HotplugEvent {
    Attached(Arc<dyn UsbTransport>),
    /// Bus path of the removed device.
    Detached(String),
}

impl fmt::Debug for HotplugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotplugEvent::Attached(transport) => f
                .debug_tuple("Attached")
                .field(&transport.identity().path)
                .finish(),
            HotplugEvent::Detached(path) => f.debug_tuple("Detached").field(path).finish(),
        }
    }
}

pub struct GamepadDriver {
    sink: Arc<dyn InputSink>,
    config: LinkConfig,
    links: HashMap<String, Link>,
}

impl GamepadDriver {
    pub fn new(sink: Arc<dyn InputSink>, config: LinkConfig) -> Self {
        Self {
            sink,
            config,
            links: HashMap::new(),
        }
    }

    pub fn supports(identity: &DeviceIdentity) -> bool {
        ID_TABLE.iter().any(|entry| entry.matches(identity))
    }

    /// Bind a newly attached device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not in the id table, its path is
    /// already bound, or the link fails to connect.
    pub async fn attach(
        &mut self,
        transport: Arc<dyn UsbTransport>,
    ) -> Result<&Link, DriverError> {
        let identity = transport.identity().clone();
        if !Self::supports(&identity) {
            return Err(DriverError::UnsupportedDevice {
                vendor_id: identity.vendor_id,
                product_id: identity.product_id,
            });
        }
        if self.links.contains_key(&identity.path) {
            return Err(DriverError::AlreadyAttached(identity.path));
        }

        let link = Link::connect(transport, Arc::clone(&self.sink), self.config.clone()).await?;
        info!(path = %identity.path, "device attached");
        Ok(self.links.entry(identity.path).or_insert(link))
    }

    /// Tear down the link for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotAttached`] if nothing is bound at `path`.
    pub async fn detach(&mut self, path: &str) -> Result<TeardownReport, DriverError> {
        let link = self
            .links
            .remove(path)
            .ok_or_else(|| DriverError::NotAttached(path.to_string()))?;
        let report = link.disconnect().await;
        info!(path, graceful = report.graceful, "device detached");
        Ok(report)
    }

    /// # Errors
    ///
    /// Propagates the error from [`attach`](Self::attach) or [`detach`](Self::detach).
    pub async fn handle_event(&mut self, event: HotplugEvent) -> Result<(), DriverError> {
        match event {
            HotplugEvent::Attached(transport) => self.attach(transport).await.map(|_| ()),
            HotplugEvent::Detached(path) => self.detach(&path).await.map(|_| ()),
        }
    }

    /// Process events until the registry closes the channel, then shut down.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HotplugEvent>,
    ) -> Vec<(String, TeardownReport)> {
        while let Some(event) = events.recv().await {
            let description = format!("{event:?}");
            if let Err(error) = self.handle_event(event).await {
                warn!(event = %description, %error, "hotplug event failed");
            }
        }
        self.shutdown().await
    }

    /// Disconnect every link, in path order.
    pub async fn shutdown(&mut self) -> Vec<(String, TeardownReport)> {
        let mut links: Vec<(String, Link)> = self.links.drain().collect();
        links.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut reports = Vec::with_capacity(links.len());
        for (path, link) in links {
            reports.push((path, link.disconnect().await));
        }
        reports
    }

    pub fn link(&self, path: &str) -> Option<&Link> {
        self.links.get(path)
    }

    /// Bound paths, sorted.
    pub fn attached(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.links.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl fmt::Debug for GamepadDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GamepadDriver")
            .field("config", &self.config)
            .field("links", &self.attached())
            .finish_non_exhaustive()
    }
}
