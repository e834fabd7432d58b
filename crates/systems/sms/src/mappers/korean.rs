use serde::{Deserialize, Serialize};

use super::bank_byte;

const BANK_SIZE: usize = 0x4000;

/// Korean mapper: a single register at 0xA000 selects the slot 2 bank;
/// slots 0 and 1 are fixed to banks 0 and 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Korean {
    bank: u8,
}

impl Default for Korean {
    fn default() -> Self {
        Self::new()
    }
}

impl Korean {
    pub fn new() -> Self {
        Self { bank: 2 }
    }

    pub fn reset(&mut self) {
        self.bank = 2;
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        let offset = addr as usize & 0x3FFF;
        match addr {
            0x0000..=0x3FFF => bank_byte(rom, 0, BANK_SIZE, offset),
            0x4000..=0x7FFF => bank_byte(rom, 1, BANK_SIZE, offset),
            0x8000..=0xBFFF => bank_byte(rom, self.bank as usize, BANK_SIZE, offset),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if addr == 0xA000 {
            self.bank = val;
        }
    }
}
