//! Reusable building blocks for tile-based video chips.
//!
//! Tile decoding and colour conversion shared by the Master System, Game Gear
//! and TMS9918-compatible rendering paths.

pub mod palette;
pub mod tile;

pub use palette::{gg_color, sms_color, IndexedPalette, RamPalette, TMS9918_PALETTE};
pub use tile::Planar4BppDecoder;
