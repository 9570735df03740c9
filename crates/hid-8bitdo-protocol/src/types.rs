//! Decoded controller state.

use serde::{Deserialize, Serialize};

/// Snapshot of every button, trigger and stick after one input report.
///
/// A snapshot is replaced wholesale on every decoded report. Logical X and Y
/// already carry the factory label swap (see [`crate::input`]), and the
/// macro buttons `extra_left`/`extra_right` are never reported together with
/// the raw buttons that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlState {
    // Face buttons
    pub button_a: bool,
    pub button_b: bool,
    pub button_x: bool,
    pub button_y: bool,

    // Menu buttons (wire names: plus, minus, menu)
    pub start: bool,
    pub select: bool,
    pub mode: bool,

    // Shoulders
    pub bumper_left: bool,
    pub bumper_right: bool,
    /// L4, synthesized from stick-click-left + stick-click-right + select.
    pub extra_left: bool,
    /// R4, synthesized from stick-click-left + stick-click-right + start.
    pub extra_right: bool,

    pub stick_click_left: bool,
    pub stick_click_right: bool,

    pub dpad_top: bool,
    pub dpad_bottom: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,

    /// Raw trigger travel, 0–255.
    pub trigger_left: u8,
    pub trigger_right: u8,
    /// Trigger travel folded into a button with a 16..=32 hysteresis band.
    pub trigger_left_button: bool,
    pub trigger_right_button: bool,

    // Wire orientation: positive Y is down.
    pub stick_left_x: i16,
    pub stick_left_y: i16,
    pub stick_right_x: i16,
    pub stick_right_y: i16,

    /// Level signal: start + select + both bumpers held.
    pub heartbeat: bool,
}

impl ControlState {
    /// Number of digital inputs currently reported as pressed.
    pub fn pressed_count(&self) -> usize {
        [
            self.button_a,
            self.button_b,
            self.button_x,
            self.button_y,
            self.start,
            self.select,
            self.mode,
            self.bumper_left,
            self.bumper_right,
            self.extra_left,
            self.extra_right,
            self.stick_click_left,
            self.stick_click_right,
            self.dpad_top,
            self.dpad_bottom,
            self.dpad_left,
            self.dpad_right,
            self.trigger_left_button,
            self.trigger_right_button,
        ]
        .iter()
        .filter(|pressed| **pressed)
        .count()
    }

    /// `true` when nothing is pressed and every analog value rests at zero.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    /// Horizontal d-pad as a tri-state value: −1 left, 0 centered, 1 right.
    pub fn hat_x(&self) -> i8 {
        i8::from(self.dpad_right) - i8::from(self.dpad_left)
    }

    /// Vertical d-pad as a tri-state value: −1 up, 0 centered, 1 down.
    pub fn hat_y(&self) -> i8 {
        i8::from(self.dpad_bottom) - i8::from(self.dpad_top)
    }
}
