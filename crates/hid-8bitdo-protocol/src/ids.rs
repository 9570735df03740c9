//! 8BitDo USB vendor and product ID constants.
//!
//! The Ultimate 2C enumerates as a vendor-class device (not HID) when
//! connected by cable or through its 2.4 GHz dongle, which is why it needs a
//! dedicated driver instead of the generic HID stack. Bluetooth mode uses a
//! different PID and is not covered here.

/// 8BitDo USB Vendor ID.
pub const VENDOR_ID: u16 = 0x2DC8;

/// Ultimate 2C (wired and 2.4 GHz dongle) product ID.
pub const PRODUCT_ULTIMATE_2C: u16 = 0x310A;

/// Name presented to the input layer.
pub const DEVICE_NAME: &str = "8BitDo Ultimate 2C";

/// Returns `true` when the VID/PID pair is a device this codec understands.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && product_name(product_id).is_some()
}

/// Human-readable product name for a known 8BitDo PID.
pub fn product_name(product_id: u16) -> Option<&'static str> {
    match product_id {
        PRODUCT_ULTIMATE_2C => Some(DEVICE_NAME),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ultimate_2c_is_supported() {
        assert!(is_supported(VENDOR_ID, PRODUCT_ULTIMATE_2C));
    }

    #[test]
    fn wrong_vendor_is_rejected() {
        assert!(!is_supported(0x045E, PRODUCT_ULTIMATE_2C));
    }

    #[test]
    fn unknown_product_has_no_name() {
        assert_eq!(product_name(0x0001), None);
        assert!(!is_supported(VENDOR_ID, 0x0001));
    }
}
