//! Input sink boundary.
//!
//! The sink is the generic input-device layer that exposes decoded state as
//! OS-level events. This module fixes the mapping from [`ControlState`] to
//! keys and absolute axes, and carries force-feedback requests back into the
//! link through [`RumbleHandle`].
//!
//! # Mapping (version 1)
//! | Source                          | Event                         |
//! |---------------------------------|-------------------------------|
//! | A / B / X / Y                   | `BTN_A` / `BTN_B` / `BTN_X` / `BTN_Y` |
//! | start / select / mode           | `BTN_START` / `BTN_SELECT` / `BTN_MODE` |
//! | bumpers                         | `BTN_TL` / `BTN_TR`           |
//! | derived trigger buttons         | `BTN_TL2` / `BTN_TR2`         |
//! | stick clicks                    | `BTN_THUMBL` / `BTN_THUMBR`   |
//! | extra-left / extra-right        | `BTN_TRIGGER_HAPPY1` / `2`    |
//! | d-pad                           | `ABS_HAT0X` / `ABS_HAT0Y`, −1..1 |
//! | sticks                          | `ABS_X`/`ABS_Y`, `ABS_RX`/`ABS_RY`, Y inverted |
//!
//! Trigger travel is not exposed as an axis.

use crate::error::SinkError;
use crate::outbound::{OutboundChannel, SubmitOutcome};
use hid_8bitdo_protocol::{ControlState, RumbleCommand, product_name};
use openpad_usb_common::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Bumped whenever a key or axis assignment changes.
pub const MAPPING_VERSION: u32 = 1;

pub const KEY_COUNT: usize = 15;
pub const AXIS_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    A,
    B,
    X,
    Y,
    Start,
    Select,
    Mode,
    BumperLeft,
    BumperRight,
    TriggerLeft,
    TriggerRight,
    ThumbLeft,
    ThumbRight,
    ExtraLeft,
    ExtraRight,
}

impl Key {
    pub const ALL: [Key; KEY_COUNT] = [
        Key::A,
        Key::B,
        Key::X,
        Key::Y,
        Key::Start,
        Key::Select,
        Key::Mode,
        Key::BumperLeft,
        Key::BumperRight,
        Key::TriggerLeft,
        Key::TriggerRight,
        Key::ThumbLeft,
        Key::ThumbRight,
        Key::ExtraLeft,
        Key::ExtraRight,
    ];

    /// Linux evdev key code.
    pub const fn code(self) -> u16 {
        match self {
            Key::A => 0x130,
            Key::B => 0x131,
            Key::X => 0x133,
            Key::Y => 0x134,
            Key::BumperLeft => 0x136,
            Key::BumperRight => 0x137,
            Key::TriggerLeft => 0x138,
            Key::TriggerRight => 0x139,
            Key::Select => 0x13a,
            Key::Start => 0x13b,
            Key::Mode => 0x13c,
            Key::ThumbLeft => 0x13d,
            Key::ThumbRight => 0x13e,
            Key::ExtraLeft => 0x2c0,
            Key::ExtraRight => 0x2c1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    Hat0X,
    Hat0Y,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::LeftX,
        Axis::LeftY,
        Axis::RightX,
        Axis::RightY,
        Axis::Hat0X,
        Axis::Hat0Y,
    ];

    /// Linux evdev absolute axis code.
    pub const fn code(self) -> u16 {
        match self {
            Axis::LeftX => 0x00,
            Axis::LeftY => 0x01,
            Axis::RightX => 0x03,
            Axis::RightY => 0x04,
            Axis::Hat0X => 0x10,
            Axis::Hat0Y => 0x11,
        }
    }

    pub const fn info(self) -> AbsInfo {
        match self {
            Axis::Hat0X | Axis::Hat0Y => AbsInfo {
                minimum: -1,
                maximum: 1,
                fuzz: 0,
                flat: 0,
            },
            Axis::LeftX | Axis::LeftY | Axis::RightX | Axis::RightY => AbsInfo {
                minimum: i16::MIN as i32,
                maximum: i16::MAX as i32,
                fuzz: 16,
                flat: 128,
            },
        }
    }
}

/// Range and noise parameters of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsInfo {
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
}

/// Everything the sink must know before the first frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub mapping_version: u32,
    pub keys: Vec<Key>,
    pub axes: Vec<(Axis, AbsInfo)>,
    /// Only two-channel rumble is supported.
    pub rumble: bool,
}

pub fn capabilities() -> Capabilities {
    Capabilities {
        mapping_version: MAPPING_VERSION,
        keys: Key::ALL.to_vec(),
        axes: Axis::ALL.iter().map(|axis| (*axis, axis.info())).collect(),
        rumble: true,
    }
}

/// One synchronized batch of key and axis values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    pub keys: [(Key, bool); KEY_COUNT],
    pub axes: [(Axis, i32); AXIS_COUNT],
}

impl InputFrame {
    pub fn key(&self, key: Key) -> Option<bool> {
        self.keys
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, pressed)| *pressed)
    }

    pub fn axis(&self, axis: Axis) -> Option<i32> {
        self.axes
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, value)| *value)
    }

    pub fn pressed(&self) -> Vec<Key> {
        self.keys
            .iter()
            .filter(|(_, pressed)| *pressed)
            .map(|(key, _)| *key)
            .collect()
    }
}

/// Map a decoded snapshot to sink events.
pub fn map_state(state: &ControlState) -> InputFrame {
    InputFrame {
        keys: [
            (Key::A, state.button_a),
            (Key::B, state.button_b),
            (Key::X, state.button_x),
            (Key::Y, state.button_y),
            (Key::Start, state.start),
            (Key::Select, state.select),
            (Key::Mode, state.mode),
            (Key::BumperLeft, state.bumper_left),
            (Key::BumperRight, state.bumper_right),
            (Key::TriggerLeft, state.trigger_left_button),
            (Key::TriggerRight, state.trigger_right_button),
            (Key::ThumbLeft, state.stick_click_left),
            (Key::ThumbRight, state.stick_click_right),
            (Key::ExtraLeft, state.extra_left),
            (Key::ExtraRight, state.extra_right),
        ],
        axes: [
            (Axis::LeftX, i32::from(state.stick_left_x)),
            // Wire Y is positive-down; -32768 saturates to 32767.
            (Axis::LeftY, i32::from(state.stick_left_y.saturating_neg())),
            (Axis::RightX, i32::from(state.stick_right_x)),
            (Axis::RightY, i32::from(state.stick_right_y.saturating_neg())),
            (Axis::Hat0X, i32::from(state.hat_x())),
            (Axis::Hat0Y, i32::from(state.hat_y())),
        ],
    }
}

/// The input device a link registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDevice {
    pub name: String,
    /// `<bus path>/input0`
    pub phys: String,
    pub identity: DeviceIdentity,
}

impl SinkDevice {
    pub fn for_identity(identity: &DeviceIdentity) -> Self {
        let name = product_name(identity.product_id)
            .map(str::to_string)
            .unwrap_or_else(|| identity.display_name());
        Self {
            name,
            phys: format!("{}/input0", identity.path),
            identity: identity.clone(),
        }
    }
}

/// Generic input-device layer.
///
/// `report` is called from completion context and must not block.
pub trait InputSink: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the device cannot be created.
    fn register(&self, device: &SinkDevice, capabilities: &Capabilities) -> Result<(), SinkError>;

    fn report(&self, device: &SinkDevice, frame: &InputFrame);

    fn unregister(&self, device: &SinkDevice);
}

/// Force-feedback effect as uploaded by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForceFeedbackEffect {
    Rumble { strong: u16, weak: u16 },
    Constant { level: i16 },
    Periodic { magnitude: i16, period_ms: u16 },
    Condition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum FfOutcome {
    Submitted(SubmitOutcome),
    /// Non-rumble effect; ignored.
    Unsupported,
    /// The link is gone.
    Detached,
}

/// Entry point for force-feedback playback. Does not keep the link alive.
#[derive(Debug, Clone)]
pub struct RumbleHandle {
    outbound: Weak<OutboundChannel>,
}

impl RumbleHandle {
    pub(crate) fn new(outbound: Weak<OutboundChannel>) -> Self {
        Self { outbound }
    }

    pub fn play(&self, effect: &ForceFeedbackEffect) -> FfOutcome {
        let ForceFeedbackEffect::Rumble { strong, weak } = *effect else {
            return FfOutcome::Unsupported;
        };
        match self.outbound.upgrade() {
            Some(outbound) => {
                FfOutcome::Submitted(outbound.submit(RumbleCommand::new(weak, strong)))
            }
            None => FfOutcome::Detached,
        }
    }
}

pub mod mock {
    //! Sink that records everything it is told.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct Recorded {
        registered: HashMap<String, SinkDevice>,
        registrations: usize,
        unregistrations: usize,
        frames: Vec<(String, InputFrame)>,
        capabilities: Option<Capabilities>,
        fail_register: bool,
    }

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        inner: Mutex<Recorded>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink whose `register` always fails.
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.inner.lock().fail_register = true;
            sink
        }

        pub fn is_registered(&self, phys: &str) -> bool {
            self.inner.lock().registered.contains_key(phys)
        }

        pub fn registered_count(&self) -> usize {
            self.inner.lock().registered.len()
        }

        pub fn registrations(&self) -> usize {
            self.inner.lock().registrations
        }

        pub fn unregistrations(&self) -> usize {
            self.inner.lock().unregistrations
        }

        pub fn capabilities(&self) -> Option<Capabilities> {
            self.inner.lock().capabilities.clone()
        }

        pub fn frames(&self) -> Vec<InputFrame> {
            self.inner
                .lock()
                .frames
                .iter()
                .map(|(_, frame)| *frame)
                .collect()
        }

        pub fn frames_for(&self, phys: &str) -> Vec<InputFrame> {
            self.inner
                .lock()
                .frames
                .iter()
                .filter(|(p, _)| p == phys)
                .map(|(_, frame)| *frame)
                .collect()
        }

        pub fn last_frame(&self) -> Option<InputFrame> {
            self.inner.lock().frames.last().map(|(_, frame)| *frame)
        }
    }

    impl InputSink for RecordingSink {
        fn register(
            &self,
            device: &SinkDevice,
            capabilities: &Capabilities,
        ) -> Result<(), SinkError> {
            let mut inner = self.inner.lock();
            if inner.fail_register {
                return Err(SinkError::Registration("scripted failure".to_string()));
            }
            if inner.registered.contains_key(&device.phys) {
                return Err(SinkError::AlreadyRegistered(device.phys.clone()));
            }
            inner.registered.insert(device.phys.clone(), device.clone());
            inner.registrations += 1;
            inner.capabilities = Some(capabilities.clone());
            Ok(())
        }

        fn report(&self, device: &SinkDevice, frame: &InputFrame) {
            self.inner.lock().frames.push((device.phys.clone(), *frame));
        }

        fn unregister(&self, device: &SinkDevice) {
            let mut inner = self.inner.lock();
            if inner.registered.remove(&device.phys).is_some() {
                inner.unregistrations += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_state_maps_to_released_and_centered() {
        let frame = map_state(&ControlState::default());
        assert!(frame.pressed().is_empty());
        assert!(frame.axes.iter().all(|(_, value)| *value == 0));
    }

    #[test]
    fn test_stick_y_inverted_with_saturation() {
        let state = ControlState {
            stick_left_y: i16::MIN,
            stick_right_y: 100,
            stick_left_x: -5,
            ..ControlState::default()
        };
        let frame = map_state(&state);
        assert_eq!(frame.axis(Axis::LeftY), Some(32767));
        assert_eq!(frame.axis(Axis::RightY), Some(-100));
        assert_eq!(frame.axis(Axis::LeftX), Some(-5));
    }

    #[test]
    fn test_dpad_as_hat() {
        let state = ControlState {
            dpad_top: true,
            dpad_right: true,
            ..ControlState::default()
        };
        let frame = map_state(&state);
        assert_eq!(frame.axis(Axis::Hat0X), Some(1));
        assert_eq!(frame.axis(Axis::Hat0Y), Some(-1));
    }

    #[test]
    fn test_every_button_has_a_key() {
        let state = ControlState {
            button_a: true,
            button_b: true,
            button_x: true,
            button_y: true,
            start: true,
            select: true,
            mode: true,
            bumper_left: true,
            bumper_right: true,
            trigger_left_button: true,
            trigger_right_button: true,
            stick_click_left: true,
            stick_click_right: true,
            extra_left: true,
            extra_right: true,
            ..ControlState::default()
        };
        assert_eq!(map_state(&state).pressed(), Key::ALL.to_vec());
    }

    #[test]
    fn test_capabilities_cover_mapping() {
        let caps = capabilities();
        assert_eq!(caps.mapping_version, 1);
        assert_eq!(caps.keys.len(), KEY_COUNT);
        assert!(caps.rumble);
        let hat = caps.axes.iter().find(|(axis, _)| *axis == Axis::Hat0Y);
        assert_eq!(hat.map(|(_, info)| (info.minimum, info.maximum)), Some((-1, 1)));
        let stick = caps.axes.iter().find(|(axis, _)| *axis == Axis::RightX);
        assert_eq!(
            stick.map(|(_, info)| *info),
            Some(AbsInfo {
                minimum: -32768,
                maximum: 32767,
                fuzz: 16,
                flat: 128
            })
        );
    }

    #[test]
    fn test_key_codes_are_distinct() {
        let mut codes: Vec<u16> = Key::ALL.iter().map(|key| key.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), KEY_COUNT);
    }

    #[test]
    fn test_sink_device_naming() {
        let device = SinkDevice::for_identity(&DeviceIdentity::new(0x2dc8, 0x310a, "usb-1-4"));
        assert_eq!(device.name, "8BitDo Ultimate 2C");
        assert_eq!(device.phys, "usb-1-4/input0");
    }

    #[test]
    fn test_non_rumble_effects_unsupported() {
        let handle = RumbleHandle::new(Weak::new());
        assert_eq!(
            handle.play(&ForceFeedbackEffect::Constant { level: 100 }),
            FfOutcome::Unsupported
        );
        assert_eq!(handle.play(&ForceFeedbackEffect::Condition), FfOutcome::Unsupported);
        assert_eq!(
            handle.play(&ForceFeedbackEffect::Rumble {
                strong: 1,
                weak: 1
            }),
            FfOutcome::Detached
        );
    }
}
