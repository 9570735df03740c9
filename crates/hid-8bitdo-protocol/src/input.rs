//! Input report decoding (32-byte interrupt-in report, tag `0x00`).
//!
//! # Report layout
//! | Offset | Size | Field                                                   |
//! |--------|------|---------------------------------------------------------|
//! | 0      | u8   | tag, `0x00` for the controller state report             |
//! | 1      | u8   | length / unused                                         |
//! | 2      | u8   | d-pad up/down/left/right (bits 0–3), plus, minus, L3, R3 |
//! | 3      | u8   | LB, RB, menu, –, A, B, X, Y (bits 0–7)                   |
//! | 4      | u8   | left trigger, 0–255                                      |
//! | 5      | u8   | right trigger, 0–255                                     |
//! | 6–7    | i16  | left stick X, LE                                         |
//! | 8–9    | i16  | left stick Y, LE (positive = down)                       |
//! | 10–11  | i16  | right stick X, LE                                        |
//! | 12–13  | i16  | right stick Y, LE (positive = down)                      |
//! | 14–31  | –    | unused                                                   |
//!
//! The controller labels its face buttons Nintendo-style while the wire bits
//! follow the Xbox positions, so the X and Y bits are swapped during decode:
//! logical X comes from bit 7 of byte 3 and logical Y from bit 6.

use crate::types::ControlState;
use thiserror::Error;

/// Full input report length in bytes.
pub const INPUT_REPORT_LEN: usize = 32;

/// Tag byte of the controller state report.
pub const INPUT_REPORT_TAG: u8 = 0x00;

/// Trigger travel below this value releases the derived trigger button.
pub const TRIGGER_RELEASE_BELOW: u8 = 16;

/// Trigger travel above this value presses the derived trigger button.
pub const TRIGGER_PRESS_ABOVE: u8 = 32;

/// Number of leading bytes that carry state; the rest of the report is padding.
const DATA_LEN: usize = 14;

/// Bit masks for byte 2.
pub mod byte2 {
    pub const DPAD_TOP: u8 = 0x01;
    pub const DPAD_BOTTOM: u8 = 0x02;
    pub const DPAD_LEFT: u8 = 0x04;
    pub const DPAD_RIGHT: u8 = 0x08;
    pub const PLUS: u8 = 0x10;
    pub const MINUS: u8 = 0x20;
    pub const STICK_LEFT: u8 = 0x40;
    pub const STICK_RIGHT: u8 = 0x80;
}

/// Bit masks for byte 3 (wire positions, before the X/Y swap).
pub mod byte3 {
    pub const BUMPER_LEFT: u8 = 0x01;
    pub const BUMPER_RIGHT: u8 = 0x02;
    pub const MENU: u8 = 0x04;
    pub const A: u8 = 0x10;
    pub const B: u8 = 0x20;
    pub const X: u8 = 0x40;
    pub const Y: u8 = 0x80;
}

/// Outcome of decoding one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A controller state report.
    State(ControlState),
    /// Some other report type shares the endpoint; nothing to do.
    NotApplicable,
}

impl Decoded {
    /// The decoded state, if any.
    pub fn state(self) -> Option<ControlState> {
        match self {
            Decoded::State(state) => Some(state),
            Decoded::NotApplicable => None,
        }
    }
}

/// Errors returned by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A state report was truncated before the stick axes.
    #[error("report too short: got {got} bytes, need {need}")]
    TooShort { got: usize, need: usize },
}

/// Derived trigger button with a schmitt band.
///
/// Below [`TRIGGER_RELEASE_BELOW`] the button is released, above
/// [`TRIGGER_PRESS_ABOVE`] it is pressed, and inside the band it keeps
/// `previous` so a trigger resting near the threshold does not chatter.
pub fn trigger_button(magnitude: u8, previous: bool) -> bool {
    if magnitude < TRIGGER_RELEASE_BELOW {
        false
    } else if magnitude > TRIGGER_PRESS_ABOVE {
        true
    } else {
        previous
    }
}

/// Decode one full input report.
///
/// `previous` is the last published snapshot; only its trigger buttons are
/// consulted (hysteresis). Reports with a foreign tag yield
/// [`Decoded::NotApplicable`].
pub fn decode(packet: &[u8; INPUT_REPORT_LEN], previous: &ControlState) -> Decoded {
    if packet[0] != INPUT_REPORT_TAG {
        return Decoded::NotApplicable;
    }

    let b2 = packet[2];
    let b3 = packet[3];
    let bit = |byte: u8, mask: u8| byte & mask != 0;

    let mut state = ControlState {
        dpad_top: bit(b2, byte2::DPAD_TOP),
        dpad_bottom: bit(b2, byte2::DPAD_BOTTOM),
        dpad_left: bit(b2, byte2::DPAD_LEFT),
        dpad_right: bit(b2, byte2::DPAD_RIGHT),
        start: bit(b2, byte2::PLUS),
        select: bit(b2, byte2::MINUS),
        stick_click_left: bit(b2, byte2::STICK_LEFT),
        stick_click_right: bit(b2, byte2::STICK_RIGHT),

        bumper_left: bit(b3, byte3::BUMPER_LEFT),
        bumper_right: bit(b3, byte3::BUMPER_RIGHT),
        mode: bit(b3, byte3::MENU),
        button_a: bit(b3, byte3::A),
        button_b: bit(b3, byte3::B),
        button_x: bit(b3, byte3::Y),
        button_y: bit(b3, byte3::X),

        trigger_left: packet[4],
        trigger_right: packet[5],
        trigger_left_button: trigger_button(packet[4], previous.trigger_left_button),
        trigger_right_button: trigger_button(packet[5], previous.trigger_right_button),

        stick_left_x: i16::from_le_bytes([packet[6], packet[7]]),
        stick_left_y: i16::from_le_bytes([packet[8], packet[9]]),
        stick_right_x: i16::from_le_bytes([packet[10], packet[11]]),
        stick_right_y: i16::from_le_bytes([packet[12], packet[13]]),

        ..ControlState::default()
    };

    apply_macros(&mut state);
    state.heartbeat = state.start && state.select && state.bumper_left && state.bumper_right;

    Decoded::State(state)
}

/// Decode a report of arbitrary length.
///
/// Empty slices and foreign tags are [`Decoded::NotApplicable`]. A state report
/// shorter than 32 bytes is accepted as long as it reaches the stick axes; the
/// missing tail is padding.
pub fn parse(data: &[u8], previous: &ControlState) -> Result<Decoded, ParseError> {
    match data.first() {
        Some(&INPUT_REPORT_TAG) => {}
        _ => return Ok(Decoded::NotApplicable),
    }
    if data.len() < DATA_LEN {
        return Err(ParseError::TooShort {
            got: data.len(),
            need: DATA_LEN,
        });
    }

    let mut packet = [0u8; INPUT_REPORT_LEN];
    let len = data.len().min(INPUT_REPORT_LEN);
    if let (Some(dst), Some(src)) = (packet.get_mut(..len), data.get(..len)) {
        dst.copy_from_slice(src);
    }
    Ok(decode(&packet, previous))
}

/// L4/R4 chords. When either fires, the four buttons that form the chords
/// are cleared so the sink never sees the macro together with its trigger.
fn apply_macros(state: &mut ControlState) {
    let both_sticks = state.stick_click_left && state.stick_click_right;
    state.extra_left = both_sticks && state.select;
    state.extra_right = both_sticks && state.start;

    if state.extra_left || state.extra_right {
        state.stick_click_left = false;
        state.stick_click_right = false;
        state.start = false;
        state.select = false;
    }
}
