//! Tile decoding for the Mode 4 video path.
//!
//! Mode 4 tiles (Master System and Game Gear) are 32 bytes, one row per four
//! consecutive bytes holding bitplanes 0-3. TMS9918 patterns are plain 1bpp
//! bytes and need no decoding step.

#[derive(Debug, Clone, Copy)]
pub struct Planar4BppDecoder;

impl Planar4BppDecoder {
    pub const TILE_SIZE: usize = 32;

    /// Decode one row from its four plane bytes.
    #[inline]
    pub fn row_from_planes(planes: [u8; 4]) -> [u8; 8] {
        let mut row = [0u8; 8];
        for (x, px) in row.iter_mut().enumerate() {
            let bit = 7 - x;
            *px = ((planes[0] >> bit) & 1)
                | (((planes[1] >> bit) & 1) << 1)
                | (((planes[2] >> bit) & 1) << 2)
                | (((planes[3] >> bit) & 1) << 3);
        }
        row
    }

    /// Row `y` of a whole tile; short data decodes as transparent.
    pub fn decode_row(tile_data: &[u8], y: u8) -> [u8; 8] {
        let base = y as usize * 4;
        match tile_data.get(base..base + 4) {
            Some(p) if tile_data.len() >= Self::TILE_SIZE => Self::row_from_planes([p[0], p[1], p[2], p[3]]),
            _ => [0; 8],
        }
    }
}
