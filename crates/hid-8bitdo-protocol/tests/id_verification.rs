//! Cross-reference tests for the 8BitDo VID/PID constants.
//!
//! If any assertion fails, the device table in the driver stops matching the
//! hardware. Change `ids.rs` only after confirming against a USB capture.

use hid_8bitdo_protocol::{is_supported, product_name, PRODUCT_ULTIMATE_2C, VENDOR_ID};

#[test]
fn vendor_id_is_2dc8() {
    assert_eq!(VENDOR_ID, 0x2DC8, "8BitDo VID changed, update ids.rs");
}

#[test]
fn ultimate_2c_pid_is_310a() {
    assert_eq!(PRODUCT_ULTIMATE_2C, 0x310A);
}

#[test]
fn ultimate_2c_name() {
    assert_eq!(product_name(0x310A), Some("8BitDo Ultimate 2C"));
    assert!(is_supported(0x2DC8, 0x310A));
}
