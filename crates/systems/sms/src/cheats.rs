//! Cheat codes.
//!
//! - Pro Action Replay: `00AAAA:VV` (or `00AAAAVV`), a RAM poke re-applied
//!   after every frame.
//! - Game Genie: `DDA-AAA` or `DDA-AAA-CxC`, a ROM patch with an optional
//!   compare byte. Patches are written into the ROM image and undone when
//!   the cheats are cleared.

use std::str::FromStr;

use emu_core::logging::{log, LogCategory, LogLevel};

use crate::error::SmsError;

const BANK_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cheat {
    RamPoke { addr: u16, value: u8 },
    RomPatch { addr: u16, value: u8, compare: Option<u8> },
}

fn hex_digits(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect()
}

impl FromStr for Cheat {
    type Err = SmsError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let invalid = || SmsError::InvalidCheat(code.to_string());
        let trimmed = code.trim();

        if trimmed.contains('-') {
            let digits = hex_digits(&trimmed.replace('-', "")).ok_or_else(invalid)?;
            let groups: Vec<&str> = trimmed.split('-').collect();
            if groups.iter().any(|g| g.len() != 3) || !(6..=9).contains(&digits.len()) {
                return Err(invalid());
            }
            let d = |i: usize| digits[i] as u16;
            let value = ((d(0) << 4) | d(1)) as u8;
            let addr = ((d(5) ^ 0x0F) << 12) | (d(2) << 8) | (d(3) << 4) | d(4);
            let compare = (digits.len() == 9).then(|| {
                let raw = ((d(6) << 4) | d(8)) as u8;
                raw.rotate_right(2) ^ 0xBA
            });
            if addr >= 0xC000 {
                return Err(invalid());
            }
            return Ok(Cheat::RomPatch { addr, value, compare });
        }

        let compact = trimmed.replace(':', "");
        let digits = hex_digits(&compact).ok_or_else(invalid)?;
        if digits.len() != 8 {
            return Err(invalid());
        }
        let word = digits.iter().fold(0u32, |acc, &d| (acc << 4) | d as u32);
        let addr = (word >> 8) as u16;
        if word >> 24 != 0 || addr < 0xC000 {
            return Err(invalid());
        }
        Ok(Cheat::RamPoke {
            addr,
            value: word as u8,
        })
    }
}

/// Active cheats and the ROM bytes the patches replaced.
#[derive(Debug, Clone, Default)]
pub struct CheatEngine {
    cheats: Vec<(String, Cheat)>,
    /// (ROM offset, original byte)
    originals: Vec<(usize, u8)>,
}

impl CheatEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.cheats.iter().map(|(code, _)| code.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cheats.is_empty()
    }

    /// Parse `code` and, for ROM patches, apply it to `rom` right away.
    pub fn add(&mut self, code: &str, rom: Option<&mut [u8]>) -> Result<Cheat, SmsError> {
        let cheat: Cheat = code.parse()?;
        if let (Cheat::RomPatch { addr, value, compare }, Some(rom)) = (cheat, rom) {
            self.patch_rom(rom, addr, value, compare);
        }
        log(LogCategory::Bus, LogLevel::Info, || format!("Cheat: {} -> {:?}", code, cheat));
        self.cheats.push((code.to_string(), cheat));
        Ok(cheat)
    }

    fn patch_rom(&mut self, rom: &mut [u8], addr: u16, value: u8, compare: Option<u8>) {
        if rom.is_empty() {
            return;
        }
        let offsets: Vec<usize> = match compare {
            // Without a compare byte only the address as seen at power-on
            None => vec![addr as usize % rom.len()],
            // With one, every bank holding the expected byte at that offset
            Some(expected) => {
                let offset = addr as usize % BANK_SIZE;
                let first = if addr < 0x4000 { 0 } else { 1 };
                (first..rom.len().div_ceil(BANK_SIZE))
                    .map(|bank| bank * BANK_SIZE + offset)
                    .filter(|&i| rom.get(i) == Some(&expected))
                    .collect()
            }
        };
        for i in offsets {
            self.originals.push((i, rom[i]));
            rom[i] = value;
        }
    }

    /// Re-apply the RAM pokes; `ram` is the 8 KB console RAM at 0xC000.
    pub fn apply_ram(&self, ram: &mut [u8]) {
        if ram.is_empty() {
            return;
        }
        for (_, cheat) in &self.cheats {
            if let Cheat::RamPoke { addr, value } = *cheat {
                let len = ram.len();
                ram[(addr as usize - 0xC000) % len] = value;
            }
        }
    }

    /// Drop every cheat and restore patched ROM bytes.
    pub fn clear(&mut self, rom: Option<&mut [u8]>) {
        if let Some(rom) = rom {
            for &(i, original) in self.originals.iter().rev() {
                if let Some(byte) = rom.get_mut(i) {
                    *byte = original;
                }
            }
        }
        self.originals.clear();
        self.cheats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_replay() {
        assert_eq!(
            "00C0FF:09".parse::<Cheat>().unwrap(),
            Cheat::RamPoke { addr: 0xC0FF, value: 0x09 }
        );
        assert_eq!(
            "00DE1201".parse::<Cheat>().unwrap(),
            Cheat::RamPoke { addr: 0xDE12, value: 0x01 }
        );
        // ROM addresses and a non-zero prefix are rejected.
        assert!("001234:01".parse::<Cheat>().is_err());
        assert!("01C000:01".parse::<Cheat>().is_err());
        assert!("00C0FG:01".parse::<Cheat>().is_err());
    }

    #[test]
    fn test_parse_game_genie() {
        assert_eq!(
            "00A-17B-C49".parse::<Cheat>().unwrap(),
            Cheat::RomPatch { addr: 0x4A17, value: 0x00, compare: Some(0xC8) }
        );
        assert_eq!(
            "3EA-17F".parse::<Cheat>().unwrap(),
            Cheat::RomPatch { addr: 0x0A17, value: 0x3E, compare: None }
        );
        assert!("3EA-17".parse::<Cheat>().is_err());
        assert!(matches!(
            "nonsense".parse::<Cheat>(),
            Err(SmsError::InvalidCheat(_))
        ));
    }

    #[test]
    fn test_ram_poke_applied() {
        let mut engine = CheatEngine::new();
        engine.add("00C010:7F", None).unwrap();
        let mut ram = vec![0u8; 0x2000];
        engine.apply_ram(&mut ram);
        assert_eq!(ram[0x10], 0x7F);
        // 0xE000 mirrors 0xC000
        engine.add("00E011:01", None).unwrap();
        engine.apply_ram(&mut ram);
        assert_eq!(ram[0x11], 0x01);
    }

    #[test]
    fn test_rom_patch_and_restore() {
        let mut rom = vec![0u8; 0x10000];
        rom[0x4A17] = 0xC8;
        rom[0xCA17] = 0xC8;
        rom[0x8A17] = 0x11;
        let mut engine = CheatEngine::new();
        engine.add("00A-17B-C49", Some(&mut rom)).unwrap();
        engine.add("12A-17F", Some(&mut rom)).unwrap();
        assert_eq!(rom[0x4A17], 0x00);
        assert_eq!(rom[0xCA17], 0x00);
        assert_eq!(rom[0x8A17], 0x11);
        assert_eq!(rom[0x0A17], 0x12);

        engine.clear(Some(&mut rom));
        assert!(engine.is_empty());
        assert_eq!(rom[0x4A17], 0xC8);
        assert_eq!(rom[0xCA17], 0xC8);
        assert_eq!(rom[0x0A17], 0x00);
    }
}
