//! Indexed palettes and colour conversion for the Sega 8-bit video chips.
//!
//! Pixel values are indices into colour RAM; this module turns the stored
//! colour words into 24-bit `0x00RRGGBB` values.
//!
//! # Formats
//!
//! - Master System: 32 bytes of CRAM, `--BBGGRR` (2 bits per component)
//! - Game Gear: 32 words of CRAM, `----BBBBGGGGRRRR` (4 bits per component)
//! - TMS9918 (SG-1000, legacy modes): fixed 16-colour palette

use serde::{Deserialize, Serialize};

/// Fixed TMS9918 palette (index 0 is transparent and drawn as black).
pub const TMS9918_PALETTE: [u32; 16] = [
    0x000000, 0x000000, 0x21C842, 0x5EDC78, 0x5455ED, 0x7D76FC, 0xD4524D, 0x42EBF5,
    0xFC5554, 0xFF7978, 0xD4C154, 0xE6CE80, 0x21B03B, 0xC95BBA, 0xCCCCCC, 0xFFFFFF,
];

/// Master System colour byte to RGB.
pub fn sms_color(value: u8) -> u32 {
    let expand = |c: u8| (c as u32 & 3) * 85;
    (expand(value) << 16) | (expand(value >> 2) << 8) | expand(value >> 4)
}

/// Game Gear 12-bit colour word to RGB.
pub fn gg_color(value: u16) -> u32 {
    let expand = |c: u16| (c as u32 & 0x0F) * 17;
    (expand(value) << 16) | (expand(value >> 4) << 8) | expand(value >> 8)
}

/// Palette that maps color indices to RGB values.
///
/// The video chip wraps this with its own CRAM write rules (byte versus
/// latched word writes).
pub trait IndexedPalette {
    /// Get the RGB color for a palette index (`0x00RRGGBB`).
    fn get_color(&self, index: usize) -> u32;

    fn set_color(&mut self, index: usize, color: u32);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded palette kept next to the raw CRAM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamPalette {
    colors: Vec<u32>,
}

impl RamPalette {
    /// A palette of `size` black entries.
    pub fn new(size: usize) -> Self {
        Self {
            colors: vec![0; size],
        }
    }

    pub fn from_colors(colors: Vec<u32>) -> Self {
        Self { colors }
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }
}

impl IndexedPalette for RamPalette {
    fn get_color(&self, index: usize) -> u32 {
        self.colors.get(index).copied().unwrap_or(0)
    }

    fn set_color(&mut self, index: usize, color: u32) {
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = color;
        }
    }

    fn len(&self) -> usize {
        self.colors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_color_components() {
        assert_eq!(sms_color(0x00), 0x000000);
        assert_eq!(sms_color(0x03), 0xFF0000);
        assert_eq!(sms_color(0x0C), 0x00FF00);
        assert_eq!(sms_color(0x30), 0x0000FF);
        assert_eq!(sms_color(0x3F), 0xFFFFFF);
        assert_eq!(sms_color(0x15), 0x555555);
        // Upper two bits are unused.
        assert_eq!(sms_color(0xC0), 0x000000);
    }

    #[test]
    fn test_gg_color_components() {
        assert_eq!(gg_color(0x000F), 0xFF0000);
        assert_eq!(gg_color(0x00F0), 0x00FF00);
        assert_eq!(gg_color(0x0F00), 0x0000FF);
        assert_eq!(gg_color(0x0888), 0x888888);
        assert_eq!(gg_color(0xF000), 0x000000);
    }

    #[test]
    fn test_ram_palette_set_get() {
        let mut palette = RamPalette::new(32);
        assert_eq!(palette.len(), 32);
        assert!(!palette.is_empty());
        palette.set_color(5, 0xFF0000);
        assert_eq!(palette.get_color(5), 0xFF0000);
        assert_eq!(palette.colors()[5], 0xFF0000);
    }

    #[test]
    fn test_ram_palette_out_of_bounds() {
        let mut palette = RamPalette::from_colors(vec![1, 2, 3]);
        assert_eq!(palette.get_color(10), 0);
        palette.set_color(10, 0xFFFFFF);
        assert_eq!(palette.len(), 3);
    }
}
