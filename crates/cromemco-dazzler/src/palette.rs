//! Fixed Dazzler colour lookup tables.
//!
//! The Dazzler resolves every 4-bit pixel value through one of two tables:
//! `COLOURS` in colour mode, `GREYS` in black-and-white mode. Entries 0–7 of
//! the colour table are the dim (0x80 component) versions of entries 8–15;
//! index 8 is black again, as on the real hardware.

/// Number of palette entries (4-bit pixel values).
pub const NUM_COLOURS: usize = 16;

/// 16 colours used in colour mode (ARGB32).
///
/// Bit 0 = red, bit 1 = green, bit 2 = blue, bit 3 = intensity.
pub const COLOURS: [u32; NUM_COLOURS] = [
    0xFF00_0000, // 0: black
    0xFF80_0000, // 1: dim red
    0xFF00_8000, // 2: dim green
    0xFF80_8000, // 3: dim yellow
    0xFF00_0080, // 4: dim blue
    0xFF80_0080, // 5: dim magenta
    0xFF00_8080, // 6: dim cyan
    0xFF80_8080, // 7: dim white
    0xFF00_0000, // 8: black (same)
    0xFFFF_0000, // 9: red
    0xFF00_FF00, // 10: green
    0xFFFF_FF00, // 11: yellow
    0xFF00_00FF, // 12: blue
    0xFFFF_00FF, // 13: magenta
    0xFF00_FFFF, // 14: cyan
    0xFFFF_FFFF, // 15: white
];

/// 16 grey levels used in black-and-white mode (ARGB32).
///
/// Linear ramp: component = 0x11 * index.
pub const GREYS: [u32; NUM_COLOURS] = [
    0xFF00_0000,
    0xFF11_1111,
    0xFF22_2222,
    0xFF33_3333,
    0xFF44_4444,
    0xFF55_5555,
    0xFF66_6666,
    0xFF77_7777,
    0xFF88_8888,
    0xFF99_9999,
    0xFFAA_AAAA,
    0xFFBB_BBBB,
    0xFFCC_CCCC,
    0xFFDD_DDDD,
    0xFFEE_EEEE,
    0xFFFF_FFFF,
];
