//! Outbound device reports: joystick, keyboard, and vsync.
//!
//! These are the bytes the peripheral volunteers to the host, as opposed to
//! the replies solicited by a packet. All encoders here are pure; the caller
//! owns the transport.

/// Report header for joystick 1. Joystick 2 uses [`JOY2_REPORT`].
pub const JOY1_REPORT: u8 = 0x10;
pub const JOY2_REPORT: u8 = 0x20;
/// Report header for an ASCII key press.
pub const KEY_REPORT: u8 = 0x30;
/// Single-byte vertical-sync notification.
pub const VSYNC_REPORT: u8 = 0x40;

/// Joystick button mask: bit N = button N+1 pressed.
pub const BTN_1: u8 = 0x01;
pub const BTN_2: u8 = 0x02;
pub const BTN_3: u8 = 0x04;
pub const BTN_4: u8 = 0x08;

/// Encode a joystick report: header with the button states in the low
/// nibble, then the two axes.
///
/// `buttons` uses pressed-is-set polarity ([`BTN_1`]..[`BTN_4`]); the wire
/// format is active-low, so the nibble is inverted here. Axes follow the
/// Dazzler convention: positive x right, positive y up, full scale ±127.
#[must_use]
pub fn joystick_report(stick: usize, buttons: u8, x: i8, y: i8) -> [u8; 3] {
    let header = if stick == 0 { JOY1_REPORT } else { JOY2_REPORT };
    [header | (!buttons & 0x0F), x as u8, y as u8]
}

/// Encode a key-press report for one ASCII character.
#[must_use]
pub fn key_report(ascii: u8) -> [u8; 2] {
    [KEY_REPORT, ascii]
}

/// Encode a vsync notification.
#[must_use]
pub fn vsync_report() -> [u8; 1] {
    [VSYNC_REPORT]
}

/// Deduplicates joystick reports: the host only needs to hear about changes,
/// and some controllers re-send identical state every poll interval.
#[derive(Default)]
pub struct JoystickTracker {
    last: Option<(u8, i8, i8)>,
}

impl JoystickTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a report for the current state, or `None` if it matches the
    /// previously sent state.
    pub fn update(&mut self, stick: usize, buttons: u8, x: i8, y: i8) -> Option<[u8; 3]> {
        let state = (buttons, x, y);
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(joystick_report(stick, buttons, x, y))
    }
}
