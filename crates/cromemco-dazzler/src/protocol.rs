//! Dazzler wire-protocol dispatcher.
//!
//! The host streams packets whose kind lives in the top nibble of the first
//! byte; the low nibble and any following bytes are packet-specific:
//!
//! | Kind      | Top | Payload                | Effect |
//! |-----------|-----|------------------------|--------|
//! | MEMBYTE   | 0x1 | addr-low, value        | write one VRAM byte |
//! | FULLFRAME | 0x2 | 512 or 2048 values     | bulk VRAM write |
//! | CTRL      | 0x3 | 1 byte (low nibble 0)  | on/off + active buffer |
//! | CTRLPIC   | 0x4 | 1 byte (low nibble 0)  | mode, palette, foreground |
//! | DAC       | 0x5 | delay u16 LE, sample   | queue an audio sample |
//! | VERSION   | 0xF | none                   | capability reply |
//!
//! The dispatcher is a push-driven state machine: [`Dazzler::push_byte`]
//! consumes one byte at a time, so it works over any byte source without
//! needing lookahead. Unrecognized bytes are discarded; the stream is assumed
//! to resynchronize at the next byte boundary.
//!
//! # CTRL/CTRLPIC pairing
//!
//! Hosts send CTRL and CTRLPIC back to back, in either order, and a VRAM
//! refresh after each one would replay 2048 bytes twice. Worse, the refresh
//! after CTRLPIC alone could hit the wrong buffer when the CTRL that selects
//! the buffer follows it. The dispatcher therefore defers the refresh
//! decision until it sees the byte after a completed CTRL or CTRLPIC packet:
//! if that byte opens the partner packet, both registers are applied first
//! and a single refresh runs on the buffer CTRL selected, only if the
//! picture control actually changed. Call [`Dazzler::flush_pending`] when
//! the transport goes idle so a deferred refresh is not held waiting for a
//! partner that never arrives.

use crate::video::DazzlerVideo;

/// Packet kind selectors (top nibble, pre-shifted).
pub const DAZ_MEMBYTE: u8 = 0x10;
pub const DAZ_FULLFRAME: u8 = 0x20;
pub const DAZ_CTRL: u8 = 0x30;
pub const DAZ_CTRLPIC: u8 = 0x40;
pub const DAZ_DAC: u8 = 0x50;
pub const DAZ_VERSION: u8 = 0xF0;

/// Protocol version reported in the VERSION reply's low nibble.
pub const DAZZLER_VERSION: u8 = 0x02;

/// Capability bits advertised in the VERSION reply.
pub const FEAT_VIDEO: u8 = 0x01;
pub const FEAT_JOYSTICK: u8 = 0x02;
pub const FEAT_DUAL_BUF: u8 = 0x04;
pub const FEAT_VSYNC: u8 = 0x08;
pub const FEAT_DAC: u8 = 0x10;
pub const FEAT_KEYBOARD: u8 = 0x20;

/// Everything this implementation supports.
const FEATURES: u8 =
    FEAT_VIDEO | FEAT_JOYSTICK | FEAT_DUAL_BUF | FEAT_VSYNC | FEAT_DAC | FEAT_KEYBOARD;

/// An audio sample decoded from a DAC packet, handed to the playback
/// context. The dispatcher never touches the channel queues itself: the
/// audio tick context is their sole consumer, so commands cross over as
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacCommand {
    pub channel: usize,
    pub delay_us: u16,
    pub sample: u8,
}

/// Where the next pushed byte lands.
enum ParseState {
    /// Expecting a packet header.
    Header,
    /// CTRL value byte. `paired_pic_changed` is set when this CTRL closes a
    /// CTRLPIC+CTRL pair and carries whether the picture control changed.
    CtrlValue { paired_pic_changed: Option<bool> },
    /// CTRLPIC value byte. `paired_ctrl_buffer` is set when this CTRLPIC
    /// closes a CTRL+CTRLPIC pair and carries the buffer CTRL selected.
    CtrlPicValue { paired_ctrl_buffer: Option<usize> },
    /// MEMBYTE address-low byte; the high bits came from the header.
    MemAddrLo { buffer: usize, addr_hi: usize },
    /// MEMBYTE value byte.
    MemValue { buffer: usize, addr: usize },
    /// FULLFRAME payload run.
    FullFrame { buffer: usize, addr: usize, remaining: usize },
    /// DAC delay low byte.
    DacDelayLo { channel: usize },
    /// DAC delay high byte.
    DacDelayHi { channel: usize, delay_lo: u8 },
    /// DAC sample byte.
    DacSample { channel: usize, delay_us: u16 },
}

/// A refresh decision deferred until the next header byte arrives.
enum PendingPair {
    None,
    /// A CTRL packet completed; waiting to see if CTRLPIC follows.
    AfterCtrl { buffer: usize, ctrl_changed: bool },
    /// A CTRLPIC packet completed; waiting to see if CTRL follows.
    AfterCtrlPic { pic_changed: bool },
}

/// The Dazzler peripheral: video engine plus protocol dispatcher.
///
/// Feed inbound transport bytes to [`push_byte`](Self::push_byte), then drain
/// [`take_output`](Self::take_output) (reply bytes for the transport) and
/// [`take_dac_commands`](Self::take_dac_commands) (samples for the audio
/// context).
pub struct Dazzler {
    video: DazzlerVideo,
    state: ParseState,
    pending: PendingPair,
    /// Outbound reply bytes awaiting the transport.
    output: Vec<u8>,
    /// Decoded DAC samples awaiting the audio context.
    dac_commands: Vec<DacCommand>,
    /// Bytes discarded for an unrecognized or unsupported header.
    discarded: u64,
}

impl Dazzler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            video: DazzlerVideo::new(),
            state: ParseState::Header,
            pending: PendingPair::None,
            output: Vec::new(),
            dac_commands: Vec::new(),
            discarded: 0,
        }
    }

    /// Consume one inbound byte.
    pub fn push_byte(&mut self, byte: u8) {
        match std::mem::replace(&mut self.state, ParseState::Header) {
            ParseState::Header => self.dispatch_header(byte),
            ParseState::CtrlValue { paired_pic_changed } => {
                self.apply_ctrl_value(byte, paired_pic_changed);
            }
            ParseState::CtrlPicValue { paired_ctrl_buffer } => {
                self.apply_ctrlpic_value(byte, paired_ctrl_buffer);
            }
            ParseState::MemAddrLo { buffer, addr_hi } => {
                self.state = ParseState::MemValue {
                    buffer,
                    addr: addr_hi + usize::from(byte),
                };
            }
            ParseState::MemValue { buffer, addr } => {
                self.video.set_vram(buffer, addr, byte, false);
            }
            ParseState::FullFrame { buffer, addr, remaining } => {
                self.video.set_vram(buffer, addr, byte, false);
                if remaining > 1 {
                    self.state = ParseState::FullFrame {
                        buffer,
                        addr: addr + 1,
                        remaining: remaining - 1,
                    };
                }
            }
            ParseState::DacDelayLo { channel } => {
                self.state = ParseState::DacDelayHi { channel, delay_lo: byte };
            }
            ParseState::DacDelayHi { channel, delay_lo } => {
                self.state = ParseState::DacSample {
                    channel,
                    delay_us: u16::from_le_bytes([delay_lo, byte]),
                };
            }
            ParseState::DacSample { channel, delay_us } => {
                self.dac_commands.push(DacCommand { channel, delay_us, sample: byte });
            }
        }
    }

    /// Consume a slice of inbound bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    /// Resolve a deferred CTRL/CTRLPIC pair decision without a partner.
    ///
    /// Call when the transport reports no bytes available, so a lone CTRL or
    /// CTRLPIC still refreshes promptly instead of waiting on the next
    /// packet.
    pub fn flush_pending(&mut self) {
        match std::mem::replace(&mut self.pending, PendingPair::None) {
            PendingPair::None => {}
            PendingPair::AfterCtrl { buffer, ctrl_changed } => {
                if ctrl_changed {
                    self.video.refresh(buffer);
                }
                self.video.set_active_buffer(buffer);
            }
            PendingPair::AfterCtrlPic { pic_changed } => {
                if pic_changed {
                    let buffer = self.video.active_buffer();
                    self.video.refresh(buffer);
                }
            }
        }
    }

    /// Drain outbound reply bytes for the transport.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Drain decoded DAC samples for the audio context.
    pub fn take_dac_commands(&mut self) -> Vec<DacCommand> {
        std::mem::take(&mut self.dac_commands)
    }

    /// The video engine (scanout consumer side).
    #[must_use]
    pub fn video(&self) -> &DazzlerVideo {
        &self.video
    }

    /// The video engine, mutable (frame latching).
    pub fn video_mut(&mut self) -> &mut DazzlerVideo {
        &mut self.video
    }

    /// Bytes discarded for unrecognized or unsupported headers.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    // === Header dispatch ===

    fn dispatch_header(&mut self, byte: u8) {
        // A deferred pair decision resolves against this header first: the
        // partner packet kind absorbs it, anything else flushes it.
        match std::mem::replace(&mut self.pending, PendingPair::None) {
            PendingPair::AfterCtrl { buffer, ctrl_changed } => {
                // Only an exact CTRLPIC header opens the partner packet; a
                // header with a nonzero low nibble carries no payload.
                if byte == DAZ_CTRLPIC {
                    self.state = ParseState::CtrlPicValue {
                        paired_ctrl_buffer: Some(buffer),
                    };
                    return;
                }
                if ctrl_changed {
                    self.video.refresh(buffer);
                }
                self.video.set_active_buffer(buffer);
            }
            PendingPair::AfterCtrlPic { pic_changed } => {
                if byte == DAZ_CTRL {
                    self.state = ParseState::CtrlValue {
                        paired_pic_changed: Some(pic_changed),
                    };
                    return;
                }
                if pic_changed {
                    let buffer = self.video.active_buffer();
                    self.video.refresh(buffer);
                }
            }
            PendingPair::None => {}
        }

        match byte & 0xF0 {
            DAZ_VERSION => {
                self.output.extend_from_slice(&version_reply());
            }
            DAZ_CTRL => {
                if byte & 0x0F == 0 {
                    self.state = ParseState::CtrlValue { paired_pic_changed: None };
                }
                // Non-zero low nibble: header carries no payload and changes
                // nothing.
            }
            DAZ_CTRLPIC => {
                if byte & 0x0F == 0 {
                    self.state = ParseState::CtrlPicValue { paired_ctrl_buffer: None };
                }
            }
            DAZ_MEMBYTE => {
                self.state = ParseState::MemAddrLo {
                    buffer: usize::from(byte >> 3) & 1,
                    addr_hi: usize::from(byte & 0x07) * 256,
                };
            }
            DAZ_FULLFRAME => {
                if byte & 0x06 == 0 {
                    self.state = ParseState::FullFrame {
                        buffer: usize::from(byte >> 3) & 1,
                        addr: 0,
                        remaining: if byte & 0x01 != 0 { 2048 } else { 512 },
                    };
                } else {
                    // Undefined packet shape: drop the header, let the stream
                    // resync on the next byte.
                    self.discarded += 1;
                }
            }
            DAZ_DAC => {
                self.state = ParseState::DacDelayLo {
                    channel: usize::from(byte & 0x0F != 0),
                };
            }
            _ => {
                self.discarded += 1;
            }
        }
    }

    /// Apply a CTRL value byte. Mirrors the hardware registers: the buffer
    /// selection only moves when the register changed with the display on.
    fn apply_ctrl_value(&mut self, value: u8, paired_pic_changed: Option<bool>) {
        let changed = self.video.set_ctrl(value);
        let buffer = if changed && self.video.is_on() {
            self.video.ctrl_buffer()
        } else {
            self.video.active_buffer()
        };

        match paired_pic_changed {
            Some(pic_changed) => {
                // Closing a CTRLPIC+CTRL pair: one refresh, on the buffer
                // this CTRL selected, only if the picture control changed.
                if pic_changed {
                    self.video.refresh(buffer);
                }
                self.video.set_active_buffer(buffer);
            }
            None => {
                self.pending = PendingPair::AfterCtrl { buffer, ctrl_changed: changed };
            }
        }
    }

    /// Apply a CTRLPIC value byte.
    fn apply_ctrlpic_value(&mut self, value: u8, paired_ctrl_buffer: Option<usize>) {
        let changed = self.video.set_picture_ctrl(value);

        match paired_ctrl_buffer {
            Some(buffer) => {
                // Closing a CTRL+CTRLPIC pair.
                if changed {
                    self.video.refresh(buffer);
                }
                self.video.set_active_buffer(buffer);
            }
            None => {
                self.pending = PendingPair::AfterCtrlPic { pic_changed: changed };
            }
        }
    }
}

impl Default for Dazzler {
    fn default() -> Self {
        Self::new()
    }
}

/// The 3-byte VERSION capability reply.
#[must_use]
pub fn version_reply() -> [u8; 3] {
    [DAZ_VERSION | (DAZZLER_VERSION & 0x0F), FEATURES, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{COLOURS, GREYS};
    use crate::video::{FB_WIDTH, VRAM_SIZE};

    /// CTRL value: on, buffer 0.
    const CTRL_ON: u8 = 0x80;
    /// CTRLPIC value: x4 + 2K + colour, foreground 15 (Mono128x128).
    const PIC_MONO128: u8 = 0x7F;
    /// Same mode with foreground 9 (bright red). Distinguishable from every
    /// grey-palette rendering, so a refresh is observable.
    const PIC_MONO128_RED: u8 = 0x79;

    fn pixel(daz: &Dazzler, buffer: usize, x: usize, y: usize) -> u32 {
        daz.video().buffer_pixels(buffer)[y * FB_WIDTH + x]
    }

    #[test]
    fn version_reply_bytes() {
        let mut daz = Dazzler::new();
        daz.push_byte(0xF0);
        assert_eq!(daz.take_output(), vec![0xF2, 0x3F, 0x00]);
        assert!(daz.take_output().is_empty(), "output drained");
    }

    #[test]
    fn membyte_address_packing() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x40, PIC_MONO128]); // CTRLPIC first
        daz.flush_pending();

        // Buffer bit set, address high bits 7 → addr 7*256 + 0xFF = 2047
        daz.push_bytes(&[0x1F, 0xFF, 0x80]);
        assert_eq!(daz.video().buffer_raw(1)[2047], 0x80);
        assert_eq!(daz.video().buffer_raw(0)[2047], 0x00);
    }

    #[test]
    fn fullframe_fills_shadow() {
        let mut daz = Dazzler::new();
        daz.push_byte(0x21); // buffer 0, 2048 bytes
        for i in 0..2048u32 {
            daz.push_byte((i % 256) as u8);
        }
        let raw = daz.video().buffer_raw(0);
        assert_eq!(raw[0], 0);
        assert_eq!(raw[255], 255);
        assert_eq!(raw[2047], 255);

        // Next byte is a fresh header again
        daz.push_byte(0xF0);
        assert_eq!(daz.take_output().len(), 3);
    }

    #[test]
    fn fullframe_short_form_is_512_bytes() {
        let mut daz = Dazzler::new();
        daz.push_byte(0x20);
        for _ in 0..512 {
            daz.push_byte(0xAA);
        }
        assert_eq!(daz.video().buffer_raw(0)[511], 0xAA);
        assert_eq!(daz.video().buffer_raw(0)[512], 0x00);

        daz.push_byte(0xF0);
        assert_eq!(daz.take_output().len(), 3);
    }

    #[test]
    fn fullframe_disallowed_shape_is_ignored() {
        let mut daz = Dazzler::new();
        daz.push_byte(0x22); // low nibble & 6 != 0
        assert_eq!(daz.discarded(), 1);

        // The next byte is treated as a header, not payload
        daz.push_byte(0xF0);
        assert_eq!(daz.take_output().len(), 3);
    }

    #[test]
    fn unknown_header_resyncs_on_next_byte() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x60, 0x00, 0xE5]);
        assert_eq!(daz.discarded(), 3);
        daz.push_byte(0xF0);
        assert_eq!(daz.take_output().len(), 3);
    }

    #[test]
    fn dac_packet_produces_command() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x50, 0x64, 0x00, 0x7F]); // channel 0, delay 100
        daz.push_bytes(&[0x51, 0x10, 0x27, 0x81]); // channel 1, delay 10000
        assert_eq!(
            daz.take_dac_commands(),
            vec![
                DacCommand { channel: 0, delay_us: 100, sample: 0x7F },
                DacCommand { channel: 1, delay_us: 10_000, sample: 0x81 },
            ]
        );
        assert!(daz.take_dac_commands().is_empty());
    }

    #[test]
    fn ctrl_selects_buffer_and_refreshes_on_change() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x40, PIC_MONO128]);
        daz.flush_pending();

        // VRAM byte into buffer 1 before it is selected
        daz.push_bytes(&[0x18, 0x00, 0xFF]);

        daz.push_bytes(&[0x30, CTRL_ON | 0x01]);
        daz.flush_pending();
        assert_eq!(daz.video().active_buffer(), 1);
        assert!(daz.video().is_on());
        assert_eq!(pixel(&daz, 1, 0, 0), COLOURS[15]);
    }

    #[test]
    fn ctrl_with_nonzero_low_nibble_has_no_payload() {
        let mut daz = Dazzler::new();
        daz.push_byte(0x31);
        // The next byte must be parsed as a header
        daz.push_byte(0xF0);
        assert_eq!(daz.take_output().len(), 3);
    }

    /// Count refreshes by observing pixels: a refresh under a new mode
    /// re-derives the framebuffer, so a stale framebuffer means no refresh
    /// happened.
    #[test]
    fn ctrl_then_ctrlpic_pair_refreshes_once_on_paired_buffer() {
        let mut daz = Dazzler::new();
        // Seed buffer 1's shadow while modes are still default
        daz.push_bytes(&[0x18, 0x00, 0xFF]);

        // CTRL(on, buffer 1) + CTRLPIC(Mono128x128) back to back
        daz.push_bytes(&[0x30, CTRL_ON | 0x01, 0x40, PIC_MONO128_RED]);
        daz.flush_pending();

        assert_eq!(daz.video().active_buffer(), 1);
        // Buffer 1 re-derived under the new mode: full foreground cell
        assert_eq!(pixel(&daz, 1, 3, 1), COLOURS[9]);
        // Buffer 0 was never refreshed
        assert_eq!(pixel(&daz, 0, 0, 0), 0xFF00_0000);
    }

    #[test]
    fn ctrlpic_then_ctrl_pair_refreshes_ctrl_selected_buffer() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x18, 0x00, 0xFF]); // seed buffer 1

        // Reverse order: CTRLPIC first, then the CTRL that picks buffer 1
        daz.push_bytes(&[0x40, PIC_MONO128_RED, 0x30, CTRL_ON | 0x01]);
        daz.flush_pending();

        assert_eq!(daz.video().active_buffer(), 1);
        assert_eq!(pixel(&daz, 1, 3, 1), COLOURS[9], "refresh hit buffer 1");
        assert_eq!(pixel(&daz, 0, 0, 0), 0xFF00_0000, "buffer 0 untouched");
    }

    #[test]
    fn unchanged_pair_does_not_refresh() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x30, CTRL_ON, 0x40, PIC_MONO128]);
        daz.flush_pending();

        daz.push_bytes(&[0x10, 0x00, 0x01]);
        assert_eq!(pixel(&daz, 0, 0, 0), COLOURS[15]);

        // Repeating the exact same control pair must leave the registers and
        // pixels as they were. A redundant refresh is idempotent, so this
        // checks consistency rather than refresh suppression.
        daz.push_bytes(&[0x30, CTRL_ON, 0x40, PIC_MONO128]);
        daz.flush_pending();
        assert_eq!(pixel(&daz, 0, 0, 0), COLOURS[15]);
    }

    #[test]
    fn lone_ctrlpic_refreshes_active_buffer_after_flush() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x30, CTRL_ON]);
        daz.flush_pending();

        // Bytes arrive before the mode that gives them meaning
        daz.push_bytes(&[0x10, 0x00, 0xFF]);

        daz.push_bytes(&[0x40, PIC_MONO128_RED]);
        daz.flush_pending();
        assert_eq!(pixel(&daz, 0, 3, 1), COLOURS[9]);
    }

    #[test]
    fn pending_pair_resolves_against_non_partner_header() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x10, 0x00, 0xFF]); // seed buffer 0

        // CTRLPIC followed by a MEMBYTE: the deferred refresh must run
        // before the MEMBYTE is processed.
        daz.push_bytes(&[0x40, PIC_MONO128_RED]);
        daz.push_bytes(&[0x10, 0x10, 0x01]);
        assert_eq!(pixel(&daz, 0, 3, 1), COLOURS[9], "refresh ran");
        assert_eq!(daz.video().buffer_raw(0)[16], 0x01, "membyte followed");
    }

    #[test]
    fn foreground_change_rederives_pixels() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x30, CTRL_ON, 0x40, PIC_MONO128]);
        daz.flush_pending();
        daz.push_bytes(&[0x10, 0x00, 0x01]);
        assert_eq!(pixel(&daz, 0, 0, 0), COLOURS[15]);

        // Same mode and palette, different foreground colour
        daz.push_bytes(&[0x40, 0x70 | 0x09]);
        daz.flush_pending();
        assert_eq!(pixel(&daz, 0, 0, 0), COLOURS[9]);
    }

    #[test]
    fn palette_bit_selects_grey_table() {
        let mut daz = Dazzler::new();
        daz.push_bytes(&[0x30, CTRL_ON, 0x40, 0x60 | 0x0F]); // mono128, grey
        daz.flush_pending();
        daz.push_bytes(&[0x10, 0x00, 0x01]);
        assert_eq!(pixel(&daz, 0, 0, 0), GREYS[15]);
    }

    #[test]
    fn full_shadow_replay_survives_mode_flip() {
        let mut daz = Dazzler::new();
        daz.push_byte(0x21);
        for i in 0..VRAM_SIZE {
            daz.push_byte((i % 256) as u8);
        }
        daz.push_bytes(&[0x30, CTRL_ON, 0x40, PIC_MONO128]);
        daz.flush_pending();

        // Compare against decoding the same bytes directly in Mono128x128
        let mut direct = Dazzler::new();
        direct.push_bytes(&[0x30, CTRL_ON, 0x40, PIC_MONO128]);
        direct.flush_pending();
        direct.push_byte(0x21);
        for i in 0..VRAM_SIZE {
            direct.push_byte((i % 256) as u8);
        }

        assert_eq!(daz.video().buffer_pixels(0), direct.video().buffer_pixels(0));
    }
}
