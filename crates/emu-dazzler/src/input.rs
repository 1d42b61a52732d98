//! Host input mapped to Dazzler device reports.
//!
//! Gamepads are polled through gilrs: the first two connected pads become
//! joystick 1 and joystick 2, with the left stick on the axes and
//! south/east/west/north on buttons 1-4. Keyboard events arrive from winit
//! and are forwarded as ASCII key reports.

use cromemco_dazzler::{BTN_1, BTN_2, BTN_3, BTN_4, JoystickTracker};
use gilrs::{Axis, Button, Gilrs};
use winit::keyboard::{Key, NamedKey};

/// Scale a gilrs axis value (-1.0..=1.0) to the wire range.
fn scale_axis(value: f32) -> i8 {
    (value * 127.0).clamp(-127.0, 127.0) as i8
}

pub struct Joysticks {
    gilrs: Option<Gilrs>,
    trackers: [JoystickTracker; 2],
}

impl Joysticks {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(gilrs) => Some(gilrs),
            Err(e) => {
                eprintln!("Gamepad support disabled: {e}");
                None
            }
        };
        Self {
            gilrs,
            trackers: [JoystickTracker::new(), JoystickTracker::new()],
        }
    }

    /// Poll gamepad state and return the reports that changed since the
    /// last poll (at most one per stick).
    pub fn poll(&mut self) -> Vec<[u8; 3]> {
        let Some(gilrs) = self.gilrs.as_mut() else {
            return Vec::new();
        };

        // Pump the event queue so gamepad state is current
        while gilrs.next_event().is_some() {}

        let mut reports = Vec::new();
        for (stick, (_, gamepad)) in gilrs.gamepads().take(2).enumerate() {
            let mut buttons = 0;
            if gamepad.is_pressed(Button::South) {
                buttons |= BTN_1;
            }
            if gamepad.is_pressed(Button::East) {
                buttons |= BTN_2;
            }
            if gamepad.is_pressed(Button::West) {
                buttons |= BTN_3;
            }
            if gamepad.is_pressed(Button::North) {
                buttons |= BTN_4;
            }
            let x = scale_axis(gamepad.value(Axis::LeftStickX));
            let y = scale_axis(gamepad.value(Axis::LeftStickY));

            if let Some(report) = self.trackers[stick].update(stick, buttons, x, y) {
                reports.push(report);
            }
        }
        reports
    }
}

/// Map a winit logical key to the ASCII byte the host expects, or `None`
/// for keys with no ASCII meaning.
pub fn key_ascii(logical_key: &Key) -> Option<u8> {
    match logical_key {
        Key::Character(text) => {
            let mut chars = text.chars();
            let ch = chars.next()?;
            if chars.next().is_some() || !ch.is_ascii() {
                return None;
            }
            Some(ch as u8)
        }
        Key::Named(named) => match named {
            NamedKey::Enter => Some(b'\r'),
            NamedKey::Space => Some(b' '),
            NamedKey::Tab => Some(b'\t'),
            NamedKey::Backspace => Some(0x08),
            NamedKey::Escape => Some(0x1B),
            NamedKey::Delete => Some(0x7F),
            _ => None,
        },
        _ => None,
    }
}
