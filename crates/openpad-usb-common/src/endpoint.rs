//! Endpoint and interface descriptors.
//!
//! Only the fields a link needs are modelled: the endpoint address (number
//! plus direction bit), the transfer type from `bmAttributes`, packet size
//! and polling interval.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction bit of `bEndpointAddress`.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

const ENDPOINT_NUMBER_MASK: u8 = 0x0f;
const TRANSFER_TYPE_MASK: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("in"),
            Direction::Out => f.write_str("out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    /// Polling interval in frames.
    pub interval: u8,
}

impl EndpointDescriptor {
    pub fn interrupt_in(number: u8, max_packet_size: u16, interval: u8) -> Self {
        Self {
            address: ENDPOINT_DIR_IN | (number & ENDPOINT_NUMBER_MASK),
            attributes: 0x03,
            max_packet_size,
            interval,
        }
    }

    pub fn interrupt_out(number: u8, max_packet_size: u16, interval: u8) -> Self {
        Self {
            address: number & ENDPOINT_NUMBER_MASK,
            attributes: 0x03,
            max_packet_size,
            interval,
        }
    }

    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_NUMBER_MASK
    }

    pub fn direction(&self) -> Direction {
        if self.address & ENDPOINT_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn transfer_type(&self) -> TransferType {
        match self.attributes & TRANSFER_TYPE_MASK {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        self.transfer_type() == TransferType::Interrupt
    }
}

/// The active alternate setting of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alt_setting: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(number: u8, endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            number,
            alt_setting: 0,
            endpoints,
        }
    }

    /// First interrupt endpoint in `direction`, scanning in descriptor order.
    pub fn find_interrupt(&self, direction: Direction) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|ep| ep.is_interrupt() && ep.direction() == direction)
    }
}
