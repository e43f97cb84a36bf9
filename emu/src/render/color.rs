use std::fmt::Display;

use crate::bitwise::Bits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 0xFF,
        }
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{},{})", self.red, self.green, self.blue, self.alpha)
    }
}

/// Widens a 5-bit channel so that 0x1F maps to 0xFF.
#[allow(clippy::cast_possible_truncation)]
const fn expand_5bit(channel: u16) -> u8 {
    ((channel << 3) | (channel >> 2)) as u8
}

impl From<u16> for Color {
    fn from(color: u16) -> Self {
        // Channel   Bits
        //-----------------
        // red  ---> 11-15
        // green --> 6-10
        // blue ---> 1-5
        // alpha --> 0 (coverage)

        Self {
            red: expand_5bit(color.get_bits(11..=15)),
            green: expand_5bit(color.get_bits(6..=10)),
            blue: expand_5bit(color.get_bits(1..=5)),
            alpha: if color.get_bit(0) { 0xFF } else { 0 },
        }
    }
}

impl From<[u8; 2]> for Color {
    fn from(color: [u8; 2]) -> Self {
        Self::from(u16::from_be_bytes(color))
    }
}

impl From<u32> for Color {
    fn from(color: u32) -> Self {
        let [red, green, blue, alpha] = color.to_be_bytes();
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

impl From<Color> for u32 {
    fn from(color: Color) -> Self {
        Self::from_be_bytes([color.red, color.green, color.blue, color.alpha])
    }
}

pub mod colors {

    use crate::render::color::Color;

    pub const BLACK: Color = Color::from_rgb(0, 0, 0);
    pub const WHITE: Color = Color::from_rgb(255, 255, 255);
}
