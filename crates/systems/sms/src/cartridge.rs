//! Cartridge image loading and classification.
//!
//! A ROM image carries no reliable description of the hardware on the
//! cartridge, so metadata is resolved per field in priority order:
//! 1. values forced by the caller
//! 2. the checksum database ([`crate::game_db`])
//! 3. heuristics over the `TMR SEGA` header, the Codemasters header, the
//!    image size and the file extension

use std::path::Path;

use emu_core::apu::{NoiseVariant, TimingMode};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use crate::config::ForcedConfig;
use crate::error::SmsError;
use crate::game_db;

pub const MIN_ROM_SIZE: usize = 0x2000;
/// Largest image any mapper can address (256 × 16 KB banks).
pub const MAX_ROM_SIZE: usize = 0x40_0000;
const COPIER_HEADER: usize = 0x200;
const HEADER_OFFSETS: [usize; 3] = [0x7FF0, 0x3FF0, 0x1FF0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsoleType {
    #[default]
    Unknown,
    Sms,
    GameGear,
    Sg1000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Zone {
    #[default]
    Unknown,
    JapanNtsc,
    JapanPal,
    ExportNtsc,
    ExportPal,
    InternationalNtsc,
    InternationalPal,
}

impl Zone {
    pub fn is_pal(&self) -> bool {
        matches!(self, Zone::JapanPal | Zone::ExportPal | Zone::InternationalPal)
    }

    pub fn is_japan(&self) -> bool {
        matches!(self, Zone::JapanNtsc | Zone::JapanPal)
    }

    pub fn timing(&self) -> TimingMode {
        if self.is_pal() {
            TimingMode::Pal
        } else {
            TimingMode::Ntsc
        }
    }

    /// Same territory with the given timing.
    pub fn with_timing(self, timing: TimingMode) -> Self {
        let pal = timing == TimingMode::Pal;
        match self {
            Zone::JapanNtsc | Zone::JapanPal if pal => Zone::JapanPal,
            Zone::JapanNtsc | Zone::JapanPal => Zone::JapanNtsc,
            Zone::InternationalNtsc | Zone::InternationalPal if pal => Zone::InternationalPal,
            Zone::InternationalNtsc | Zone::InternationalPal => Zone::InternationalNtsc,
            _ if pal => Zone::ExportPal,
            _ => Zone::ExportNtsc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MapperType {
    #[default]
    Unknown,
    RomOnly,
    Sega,
    Codemasters,
    Korean,
    Msx,
    Janggun,
    Sg1000,
    Unsupported,
}

/// Resolved description of a cartridge. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeInfo {
    pub crc32: u32,
    pub system: ConsoleType,
    pub zone: Zone,
    pub mapper: MapperType,
    /// Cartridge RAM in bytes
    pub ram_size: usize,
    pub battery: bool,
    pub title: Option<String>,
    pub pal: bool,
    /// The game drives the YM2413 when one is present
    pub fm: bool,
    pub noise: NoiseVariant,
    /// A `TMR SEGA` header was found
    pub valid_header: bool,
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    info: CartridgeInfo,
}

impl Cartridge {
    /// Parse and classify a ROM image.
    pub fn load(data: &[u8], forced: &ForcedConfig, path_hint: Option<&Path>) -> Result<Self, SmsError> {
        let image = if data.len() % 0x2000 == COPIER_HEADER && data.len() > COPIER_HEADER {
            log(LogCategory::Cartridge, LogLevel::Info, || {
                "Cartridge: stripping 512-byte copier header".to_string()
            });
            &data[COPIER_HEADER..]
        } else {
            data
        };

        if image.len() < MIN_ROM_SIZE {
            return Err(SmsError::RomTooSmall(image.len()));
        }
        if image.len() > MAX_ROM_SIZE {
            return Err(SmsError::UnsupportedMapper(image.len()));
        }

        let crc32 = crc32fast::hash(image);
        let info = resolve(image, crc32, forced, path_hint);
        if info.mapper == MapperType::Unsupported {
            return Err(SmsError::UnsupportedMapper(image.len()));
        }

        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "Cartridge: CRC {:08X}, {:?} {:?}, mapper {:?}, RAM {} bytes{}",
                info.crc32,
                info.system,
                info.zone,
                info.mapper,
                info.ram_size,
                info.title.as_deref().map(|t| format!(", \"{}\"", t)).unwrap_or_default()
            )
        });

        Ok(Self {
            rom: image.to_vec(),
            info,
        })
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn info(&self) -> &CartridgeInfo {
        &self.info
    }

    pub fn crc32(&self) -> u32 {
        self.info.crc32
    }

    /// Overwrite ROM bytes (Game Genie patches).
    pub(crate) fn rom_mut(&mut self) -> &mut [u8] {
        &mut self.rom
    }
}

/// Header fields found at one of the `TMR SEGA` locations.
struct SegaHeader {
    region: u8,
}

fn find_sega_header(rom: &[u8]) -> Option<SegaHeader> {
    HEADER_OFFSETS.iter().find_map(|&offset| {
        let sig = rom.get(offset..offset + 8)?;
        if sig == b"TMR SEGA" {
            let region = rom.get(offset + 0x0F)? >> 4;
            Some(SegaHeader { region })
        } else {
            None
        }
    })
}

/// Codemasters images carry a checksum and its 16-bit complement at 0x7FE6.
fn has_codemasters_header(rom: &[u8]) -> bool {
    if rom.len() < 0x8000 {
        return false;
    }
    let checksum = u16::from_le_bytes([rom[0x7FE6], rom[0x7FE7]]);
    let inverse = u16::from_le_bytes([rom[0x7FE8], rom[0x7FE9]]);
    checksum != 0 && checksum.wrapping_add(inverse) == 0
}

fn system_from_extension(path: &Path) -> Option<ConsoleType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "gg" => Some(ConsoleType::GameGear),
        "sg" | "sc" => Some(ConsoleType::Sg1000),
        "sms" => Some(ConsoleType::Sms),
        _ => None,
    }
}

/// Resolve every metadata field for an image with checksum `crc32`.
pub(crate) fn resolve(rom: &[u8], crc32: u32, forced: &ForcedConfig, path_hint: Option<&Path>) -> CartridgeInfo {
    let entry = game_db::lookup(crc32);
    let header = find_sega_header(rom);

    let detected_system = path_hint
        .and_then(system_from_extension)
        .or_else(|| {
            header.as_ref().and_then(|h| match h.region {
                3 | 4 => Some(ConsoleType::Sms),
                5..=7 => Some(ConsoleType::GameGear),
                _ => None,
            })
        })
        .unwrap_or(ConsoleType::Sms);
    let system = match forced.system {
        ConsoleType::Unknown => entry.map(|e| e.system).unwrap_or(detected_system),
        s => s,
    };

    let detected_zone = match header.as_ref().map(|h| h.region) {
        Some(3) | Some(5) => Zone::JapanNtsc,
        Some(4) | Some(6) => Zone::ExportNtsc,
        Some(7) => Zone::InternationalNtsc,
        _ if system == ConsoleType::Sg1000 => Zone::JapanNtsc,
        _ => Zone::Unknown,
    };
    let mut zone = match forced.zone {
        Zone::Unknown => entry.map(|e| e.zone).unwrap_or(detected_zone),
        z => z,
    };
    if let Some(timing) = forced.timing {
        zone = zone.with_timing(timing);
    }

    let detected_mapper = if system == ConsoleType::Sg1000 {
        MapperType::Sg1000
    } else if has_codemasters_header(rom) {
        MapperType::Codemasters
    } else if rom.len() > 0xC000 {
        MapperType::Sega
    } else {
        MapperType::RomOnly
    };
    let mapper = match forced.mapper {
        MapperType::Unknown => entry.map(|e| e.mapper).unwrap_or(detected_mapper),
        m => m,
    };

    let default_ram = match mapper {
        MapperType::Sega => 0x8000,
        MapperType::Codemasters => 0x2000,
        _ => 0,
    };
    let ram_size = entry.and_then(|e| e.ram_size).unwrap_or(default_ram);

    let noise = if system == ConsoleType::Sg1000 {
        NoiseVariant::Ti
    } else {
        NoiseVariant::Sega
    };

    CartridgeInfo {
        crc32,
        system,
        zone,
        mapper,
        ram_size,
        battery: entry.map(|e| e.battery).unwrap_or(false),
        title: entry.map(|e| e.title.to_string()),
        pal: zone.is_pal(),
        fm: entry.map(|e| e.fm).unwrap_or(false),
        noise,
        valid_header: header.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header(size: usize, region: u8) -> Vec<u8> {
        let mut rom = vec![0u8; size];
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = (region << 4) | 0x0C;
        rom
    }

    #[test]
    fn test_export_header_rom_only() {
        let rom = rom_with_header(0x8000, 4);
        let cart = Cartridge::load(&rom, &ForcedConfig::default(), None).unwrap();
        let info = cart.info();
        assert_eq!(info.system, ConsoleType::Sms);
        assert_eq!(info.zone, Zone::ExportNtsc);
        assert_eq!(info.mapper, MapperType::RomOnly);
        assert!(!info.battery);
        assert!(info.valid_header);
        assert_eq!(info.noise, NoiseVariant::Sega);
    }

    #[test]
    fn test_game_gear_header() {
        let rom = rom_with_header(0x40000, 6);
        let info = Cartridge::load(&rom, &ForcedConfig::default(), None).unwrap().info().clone();
        assert_eq!(info.system, ConsoleType::GameGear);
        assert_eq!(info.mapper, MapperType::Sega);
        assert_eq!(info.ram_size, 0x8000);
    }

    #[test]
    fn test_too_small() {
        let err = Cartridge::load(&[0u8; 0x1000], &ForcedConfig::default(), None).unwrap_err();
        assert!(matches!(err, SmsError::RomTooSmall(0x1000)));
    }

    #[test]
    fn test_too_large() {
        let rom = vec![0u8; MAX_ROM_SIZE + 0x4000];
        let err = Cartridge::load(&rom, &ForcedConfig::default(), None).unwrap_err();
        assert!(matches!(err, SmsError::UnsupportedMapper(_)));
    }

    #[test]
    fn test_copier_header_stripped() {
        let mut data = vec![0xEEu8; COPIER_HEADER];
        data.extend(rom_with_header(0x8000, 4));
        let cart = Cartridge::load(&data, &ForcedConfig::default(), None).unwrap();
        assert_eq!(cart.rom().len(), 0x8000);
        assert!(cart.info().valid_header);
    }

    #[test]
    fn test_codemasters_detection() {
        let mut rom = vec![0u8; 0x20000];
        rom[0x7FE6..0x7FE8].copy_from_slice(&0x1234u16.to_le_bytes());
        rom[0x7FE8..0x7FEA].copy_from_slice(&0x1234u16.wrapping_neg().to_le_bytes());
        let info = Cartridge::load(&rom, &ForcedConfig::default(), None).unwrap().info().clone();
        assert_eq!(info.mapper, MapperType::Codemasters);
        assert_eq!(info.ram_size, 0x2000);
    }

    #[test]
    fn test_extension_hint() {
        let rom = vec![0u8; 0x8000];
        let info = Cartridge::load(&rom, &ForcedConfig::default(), Some(Path::new("game.SG")))
            .unwrap()
            .info()
            .clone();
        assert_eq!(info.system, ConsoleType::Sg1000);
        assert_eq!(info.mapper, MapperType::Sg1000);
        assert_eq!(info.zone, Zone::JapanNtsc);
        assert_eq!(info.noise, NoiseVariant::Ti);
    }

    #[test]
    fn test_forced_values_win() {
        let rom = rom_with_header(0x8000, 4);
        let forced = ForcedConfig {
            system: ConsoleType::GameGear,
            zone: Zone::JapanNtsc,
            mapper: MapperType::Sega,
            timing: Some(TimingMode::Pal),
        };
        let info = Cartridge::load(&rom, &forced, None).unwrap().info().clone();
        assert_eq!(info.system, ConsoleType::GameGear);
        assert_eq!(info.zone, Zone::JapanPal);
        assert_eq!(info.mapper, MapperType::Sega);
        assert!(info.pal);
    }

    #[test]
    fn test_database_overrides_header() {
        for entry in game_db::entries() {
            // An image whose header says otherwise still takes the recorded values.
            let rom = rom_with_header(0x8000, 7);
            let info = resolve(&rom, entry.crc32, &ForcedConfig::default(), Some(Path::new("x.gg")));
            assert_eq!(info.mapper, entry.mapper, "{}", entry.title);
            assert_eq!(info.zone, entry.zone, "{}", entry.title);
            assert_eq!(info.system, entry.system, "{}", entry.title);
            assert_eq!(info.battery, entry.battery, "{}", entry.title);
            assert_eq!(info.pal, entry.zone.is_pal(), "{}", entry.title);
            assert_eq!(info.title.as_deref(), Some(entry.title));
            if let Some(ram) = entry.ram_size {
                assert_eq!(info.ram_size, ram, "{}", entry.title);
            }
        }
    }

    #[test]
    fn test_zone_timing() {
        assert_eq!(Zone::ExportNtsc.with_timing(TimingMode::Pal), Zone::ExportPal);
        assert_eq!(Zone::JapanPal.with_timing(TimingMode::Ntsc), Zone::JapanNtsc);
        assert_eq!(Zone::Unknown.with_timing(TimingMode::Ntsc), Zone::ExportNtsc);
        assert_eq!(Zone::ExportPal.timing(), TimingMode::Pal);
        assert!(Zone::JapanNtsc.is_japan());
    }
}
