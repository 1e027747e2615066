//! Accessors for the packed bitfields and BCD digits used throughout the IFO
//! and NAV structures. Bits are numbered from the LSB, so `field(b, 6, 2)`
//! reads the two topmost bits of `b`.

/// Extracts `width` bits of `byte` starting at bit `shift` (0 = LSB).
pub fn field(byte: u8, shift: u8, width: u8) -> u8 {
    debug_assert!(shift + width <= 8);
    (byte >> shift) & (((1u16 << width) - 1) as u8)
}

/// Tests a single bit of `byte` (0 = LSB).
pub fn flag(byte: u8, bit: u8) -> bool {
    field(byte, bit, 1) == 1
}

/// Decodes a two-digit packed BCD byte.
///
/// Nibbles above 9 are not rejected; they decode the same way the players
/// decode them (tens * 10 + units).
pub fn bcd(byte: u8) -> u32 {
    u32::from(byte >> 4) * 10 + u32::from(byte & 0x0F)
}

/// Reads two ASCII bytes as a language code, if both are letters.
pub fn iso639(hi: u8, lo: u8) -> Option<String> {
    if hi.is_ascii_alphabetic() && lo.is_ascii_alphabetic() {
        let code = [hi.to_ascii_lowercase(), lo.to_ascii_lowercase()];
        Some(String::from_utf8_lossy(&code).into_owned())
    } else {
        None
    }
}
