//! Sega 8-bit console emulator: Master System, Game Gear and SG-1000.
//!
//! # Architecture
//!
//! - **CPU**: Zilog Z80A @ 3.58 MHz (NTSC) / 3.55 MHz (PAL)
//! - **VDP**: Sega 315-5124 / 315-5246 (Mode 4 plus TMS9918 modes), Game Gear VDP
//! - **Sound**: SN76489 PSG, optional YM2413 FM unit
//! - **RAM**: 8 KB main RAM (1 KB on SG-1000), 16 KB video RAM
//!
//! [`SmsSystem`] owns the CPU; the CPU owns the [`bus::SmsBus`], which owns
//! every other device. A frame runs until the VDP enters vertical blank.

pub mod audio;
pub mod bus;
pub mod cartridge;
pub mod cheats;
pub mod config;
pub mod error;
pub mod game_db;
pub mod input;
pub mod mappers;
mod save_state;
pub mod system;
pub mod vdp;

pub use cartridge::{Cartridge, CartridgeInfo, ConsoleType, MapperType, Zone};
pub use cheats::Cheat;
pub use config::{ForcedConfig, GlassesMode, LeftBar, Overscan, SmsConfig};
pub use error::SmsError;
pub use input::Key;
pub use save_state::{STATE_MAGIC, STATE_VERSION};
pub use system::{RuntimeInfo, SmsSystem};
