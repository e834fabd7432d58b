//! Cartridge mappers
//!
//! Each mapper owns its bank registers and any cartridge RAM; the ROM image
//! stays in the [`Cartridge`](crate::cartridge::Cartridge) and is passed in
//! on every read, so mapper state can be saved without the image.

mod codemasters;
mod janggun;
mod korean;
mod msx;
mod rom_only;
mod sega;
mod sg1000;

pub use codemasters::Codemasters;
pub use janggun::Janggun;
pub use korean::Korean;
pub use msx::Msx;
pub use rom_only::RomOnly;
pub use sega::Sega;
pub use sg1000::Sg1000;

use serde::{Deserialize, Serialize};

use crate::cartridge::{CartridgeInfo, MapperType};

/// Byte `offset` of `bank` when the image is split into `size`-byte banks.
/// Bank numbers wrap at the number of banks present.
#[inline]
pub(crate) fn bank_byte(rom: &[u8], bank: usize, size: usize, offset: usize) -> u8 {
    let count = rom.len().div_ceil(size).max(1);
    rom.get((bank % count) * size + offset).copied().unwrap_or(0xFF)
}

/// Unified mapper enum that dispatches to specific implementations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mapper {
    RomOnly(RomOnly),
    Sega(Sega),
    Codemasters(Codemasters),
    Korean(Korean),
    Msx(Msx),
    Janggun(Janggun),
    Sg1000(Sg1000),
}

impl Mapper {
    pub fn from_info(info: &CartridgeInfo) -> Self {
        match info.mapper {
            MapperType::Sega => Mapper::Sega(Sega::new(info.ram_size)),
            MapperType::Codemasters => Mapper::Codemasters(Codemasters::new(info.ram_size)),
            MapperType::Korean => Mapper::Korean(Korean::new()),
            MapperType::Msx => Mapper::Msx(Msx::new()),
            MapperType::Janggun => Mapper::Janggun(Janggun::new()),
            MapperType::Sg1000 => Mapper::Sg1000(Sg1000::new(info.ram_size)),
            MapperType::RomOnly | MapperType::Unknown | MapperType::Unsupported => {
                Mapper::RomOnly(RomOnly)
            }
        }
    }

    /// Read from the cartridge window (0x0000-0xBFFF)
    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        match self {
            Mapper::RomOnly(m) => m.read(rom, addr),
            Mapper::Sega(m) => m.read(rom, addr),
            Mapper::Codemasters(m) => m.read(rom, addr),
            Mapper::Korean(m) => m.read(rom, addr),
            Mapper::Msx(m) => m.read(rom, addr),
            Mapper::Janggun(m) => m.read(rom, addr),
            Mapper::Sg1000(m) => m.read(rom, addr),
        }
    }

    /// Observe a CPU write anywhere in the address space (bank registers
    /// live both inside the ROM window and in the RAM area).
    pub fn write(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::RomOnly(_) => {
                // No registers
                let _ = (addr, val);
            }
            Mapper::Sega(m) => m.write(addr, val),
            Mapper::Codemasters(m) => m.write(addr, val),
            Mapper::Korean(m) => m.write(addr, val),
            Mapper::Msx(m) => m.write(addr, val),
            Mapper::Janggun(m) => m.write(addr, val),
            Mapper::Sg1000(m) => m.write(addr, val),
        }
    }

    pub fn cart_ram(&self) -> &[u8] {
        match self {
            Mapper::Sega(m) => m.ram(),
            Mapper::Codemasters(m) => m.ram(),
            Mapper::Sg1000(m) => m.ram(),
            _ => &[],
        }
    }

    pub fn cart_ram_mut(&mut self) -> &mut [u8] {
        match self {
            Mapper::Sega(m) => m.ram_mut(),
            Mapper::Codemasters(m) => m.ram_mut(),
            Mapper::Sg1000(m) => m.ram_mut(),
            _ => &mut [],
        }
    }

    /// The game has mapped its RAM at least once since load.
    pub fn ram_used(&self) -> bool {
        match self {
            Mapper::Sega(m) => m.ram_used(),
            Mapper::Codemasters(m) => m.ram_used(),
            Mapper::Sg1000(m) => !m.ram().is_empty(),
            _ => false,
        }
    }

    /// Return bank registers to their power-on values; RAM is kept.
    pub fn reset(&mut self) {
        match self {
            Mapper::RomOnly(_) => {}
            Mapper::Sega(m) => m.reset(),
            Mapper::Codemasters(m) => m.reset(),
            Mapper::Korean(m) => m.reset(),
            Mapper::Msx(m) => m.reset(),
            Mapper::Janggun(m) => m.reset(),
            Mapper::Sg1000(_) => {}
        }
    }

    pub fn kind(&self) -> MapperType {
        match self {
            Mapper::RomOnly(_) => MapperType::RomOnly,
            Mapper::Sega(_) => MapperType::Sega,
            Mapper::Codemasters(_) => MapperType::Codemasters,
            Mapper::Korean(_) => MapperType::Korean,
            Mapper::Msx(_) => MapperType::Msx,
            Mapper::Janggun(_) => MapperType::Janggun,
            Mapper::Sg1000(_) => MapperType::Sg1000,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_byte_wraps() {
        let rom = test_rom::banked(4, 0x4000);
        assert_eq!(bank_byte(&rom, 1, 0x4000, 0), 1);
        assert_eq!(bank_byte(&rom, 5, 0x4000, 0x10), 1);
        assert_eq!(bank_byte(&rom, 7, 0x2000, 0), 3);
    }

    #[test]
    fn test_dispatch_kind() {
        assert_eq!(Mapper::Sega(Sega::new(0x8000)).kind(), MapperType::Sega);
        assert_eq!(Mapper::RomOnly(RomOnly).cart_ram().len(), 0);
        assert!(!Mapper::Korean(Korean::new()).ram_used());
    }
}
