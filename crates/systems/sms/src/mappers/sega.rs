use serde::{Deserialize, Serialize};

use super::bank_byte;
use emu_core::logging::{log, LogCategory, LogLevel};

const BANK_SIZE: usize = 0x4000;

/// Sega mapper (315-5208/5235): three 16 KB slots controlled at 0xFFFC-0xFFFF.
///
/// - 0xFFFC: bit 3 maps cartridge RAM into slot 2, bit 2 picks its 16 KB bank
/// - 0xFFFD/0xFFFE/0xFFFF: ROM bank for slots 0/1/2
///
/// The first 1 KB always comes from bank 0 so the interrupt vectors survive
/// slot 0 switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sega {
    control: u8,
    banks: [u8; 3],
    ram: Vec<u8>,
    ram_used: bool,
}

impl Sega {
    pub fn new(ram_size: usize) -> Self {
        Self {
            control: 0,
            banks: [0, 1, 2],
            ram: vec![0; ram_size],
            ram_used: false,
        }
    }

    pub fn reset(&mut self) {
        self.control = 0;
        self.banks = [0, 1, 2];
    }

    fn ram_offset(&self, addr: u16) -> Option<usize> {
        if self.control & 0x08 == 0 || self.ram.is_empty() {
            return None;
        }
        let bank = if self.control & 0x04 != 0 { BANK_SIZE } else { 0 };
        Some((bank + (addr as usize & 0x3FFF)) % self.ram.len())
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        let offset = addr as usize & 0x3FFF;
        match addr {
            0x0000..=0x03FF => rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x0400..=0x3FFF => bank_byte(rom, self.banks[0] as usize, BANK_SIZE, offset),
            0x4000..=0x7FFF => bank_byte(rom, self.banks[1] as usize, BANK_SIZE, offset),
            0x8000..=0xBFFF => match self.ram_offset(addr) {
                Some(i) => self.ram[i],
                None => bank_byte(rom, self.banks[2] as usize, BANK_SIZE, offset),
            },
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x8000..=0xBFFF => {
                if let Some(i) = self.ram_offset(addr) {
                    self.ram[i] = val;
                }
            }
            0xFFFC => {
                if val & 0x08 != 0 && !self.ram_used {
                    log(LogCategory::Bus, LogLevel::Debug, || {
                        "Sega mapper: cartridge RAM enabled".to_string()
                    });
                    self.ram_used = !self.ram.is_empty();
                }
                if val & 0x03 != 0 {
                    log(LogCategory::Stubs, LogLevel::Warn, || {
                        format!("Sega mapper: bank shift {} ignored", val & 0x03)
                    });
                }
                self.control = val;
            }
            0xFFFD..=0xFFFF => {
                self.banks[(addr - 0xFFFD) as usize] = val;
            }
            _ => {}
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn ram_used(&self) -> bool {
        self.ram_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::test_rom::banked;

    #[test]
    fn sega_power_on_banks() {
        let rom = banked(8, BANK_SIZE);
        let m = Sega::new(0x8000);
        assert_eq!(m.read(&rom, 0x0000), 0);
        assert_eq!(m.read(&rom, 0x4000), 1);
        assert_eq!(m.read(&rom, 0x8000), 2);
    }

    #[test]
    fn sega_bank_switching() {
        let rom = banked(8, BANK_SIZE);
        let mut m = Sega::new(0x8000);
        m.write(0xFFFD, 3);
        m.write(0xFFFE, 4);
        m.write(0xFFFF, 13);
        // First kilobyte stays on bank 0.
        assert_eq!(m.read(&rom, 0x0100), 0);
        assert_eq!(m.read(&rom, 0x0400), 3);
        assert_eq!(m.read(&rom, 0x4000), 4);
        // Bank numbers wrap at the image size.
        assert_eq!(m.read(&rom, 0x8000), 5);
    }

    #[test]
    fn sega_cartridge_ram() {
        let rom = banked(8, BANK_SIZE);
        let mut m = Sega::new(0x8000);
        m.write(0x8000, 0x55);
        assert_eq!(m.read(&rom, 0x8000), 2, "write ignored while ROM is mapped");
        assert!(!m.ram_used());

        m.write(0xFFFC, 0x08);
        m.write(0x8000, 0x55);
        assert_eq!(m.read(&rom, 0x8000), 0x55);
        assert!(m.ram_used());

        // Second RAM bank
        m.write(0xFFFC, 0x0C);
        assert_eq!(m.read(&rom, 0x8000), 0x00);
        m.write(0x8000, 0x66);
        assert_eq!(m.ram()[0x4000], 0x66);

        m.write(0xFFFC, 0x00);
        assert_eq!(m.read(&rom, 0x8000), 2);
    }

    #[test]
    fn sega_reset_keeps_ram() {
        let mut m = Sega::new(0x8000);
        m.write(0xFFFC, 0x08);
        m.write(0x8001, 0x99);
        m.write(0xFFFF, 7);
        m.reset();
        assert_eq!(m.ram()[1], 0x99);
        assert_eq!(m.banks, [0, 1, 2]);
    }
}
