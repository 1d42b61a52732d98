//! Cromemco Dazzler graphics and sound peripheral emulator.
//!
//! The Dazzler is an S-100 framebuffer card driven here over a byte-stream
//! protocol: the host machine serializes register writes, video RAM updates,
//! and audio samples into packets, and this crate decodes them into a
//! 128x128 ARGB32 framebuffer and a two-channel PCM stream.
//!
//! # Standalone IC
//!
//! This crate has no dependencies and does no I/O. Transport, windowing, and
//! audio output live in the runner; the peripheral consumes bytes via
//! [`Dazzler::push_byte`] and exposes its outputs as plain data.
//!
//! # Packet format (host to device)
//!
//! The top nibble of the first byte selects the packet kind:
//!
//! | Kind      | Header | Payload                               |
//! |-----------|--------|---------------------------------------|
//! | MEMBYTE   | 0x1B   | addr low byte, value (B = buf + addr hi) |
//! | FULLFRAME | 0x2B   | 512 or 2048 VRAM bytes                |
//! | CTRL      | 0x30   | control register value                |
//! | CTRLPIC   | 0x40   | picture control register value        |
//! | DAC       | 0x5C   | delay low, delay high, sample         |
//! | VERSION   | 0xF0   | none (solicits a 3-byte reply)        |
//!
//! # Device to host
//!
//! Joystick, key, and vsync reports ([`report`]) plus the VERSION reply.
//!
//! # Video modes
//!
//! Four modes from two picture-control bits: 32x32 and 64x64 colour
//! (4-bit pixels), 64x64 and 128x128 monochrome (1-bit pixels with a
//! programmable foreground colour). Everything scales to the fixed
//! 128x128 framebuffer.

#![allow(clippy::cast_possible_truncation)]

mod dac;
mod palette;
mod protocol;
mod report;
mod video;

pub use dac::{Dac, DacChannel, NUM_CHANNELS, QUEUE_DEPTH, SAMPLE_RATE, SETTLE_DELAY_US, TICK_INTERVAL_US};
pub use palette::{COLOURS, GREYS, NUM_COLOURS};
pub use protocol::{version_reply, DacCommand, Dazzler, DAZZLER_VERSION};
pub use report::{
    joystick_report, key_report, vsync_report, JoystickTracker, BTN_1, BTN_2, BTN_3, BTN_4,
};
pub use video::{DazzlerVideo, Palette, VideoMode, FB_HEIGHT, FB_WIDTH, NUM_BUFFERS, VRAM_SIZE};
