use serde::{Deserialize, Serialize};

use super::bank_byte;

const BANK_SIZE: usize = 0x4000;

/// Codemasters mapper: bank registers are the first byte of each slot.
/// Bit 7 of the slot 1 value maps 8 KB of RAM over 0xA000-0xBFFF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codemasters {
    banks: [u8; 3],
    ram_enabled: bool,
    ram: Vec<u8>,
    ram_used: bool,
}

impl Codemasters {
    pub fn new(ram_size: usize) -> Self {
        Self {
            banks: [0, 1, 0],
            ram_enabled: false,
            ram: vec![0; ram_size],
            ram_used: false,
        }
    }

    pub fn reset(&mut self) {
        self.banks = [0, 1, 0];
        self.ram_enabled = false;
    }

    fn ram_offset(&self, addr: u16) -> Option<usize> {
        (self.ram_enabled && addr >= 0xA000 && !self.ram.is_empty())
            .then(|| (addr as usize - 0xA000) % self.ram.len())
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        let slot = (addr >> 14) as usize;
        if slot > 2 {
            return 0xFF;
        }
        if let Some(i) = self.ram_offset(addr) {
            return self.ram[i];
        }
        bank_byte(rom, self.banks[slot] as usize, BANK_SIZE, addr as usize & 0x3FFF)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000 => self.banks[0] = val,
            0x4000 => {
                self.banks[1] = val & 0x7F;
                self.ram_enabled = val & 0x80 != 0;
                self.ram_used |= self.ram_enabled && !self.ram.is_empty();
            }
            0x8000 => self.banks[2] = val,
            0xA000..=0xBFFF => {
                if let Some(i) = self.ram_offset(addr) {
                    self.ram[i] = val;
                }
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
    fn codemasters_banking() {
        let rom = banked(8, BANK_SIZE);
        let mut m = Codemasters::new(0x2000);
        assert_eq!(m.read(&rom, 0x8000), 0);
        m.write(0x0000, 5);
        m.write(0x4000, 6);
        m.write(0x8000, 7);
        assert_eq!(m.read(&rom, 0x0000), 5);
        assert_eq!(m.read(&rom, 0x4000), 6);
        assert_eq!(m.read(&rom, 0xBFFF), 7);
    }

    #[test]
    fn codemasters_ram_window() {
        let rom = banked(8, BANK_SIZE);
        let mut m = Codemasters::new(0x2000);
        m.write(0x8000, 3);
        m.write(0x4000, 0x81);
        assert!(m.ram_used());
        assert_eq!(m.read(&rom, 0x4000), 1);
        // Lower half of slot 2 is still ROM.
        assert_eq!(m.read(&rom, 0x8000), 3);
        m.write(0xA123, 0x77);
        assert_eq!(m.read(&rom, 0xA123), 0x77);
        m.write(0x4000, 0x01);
        assert_eq!(m.read(&rom, 0xA123), 3);
        assert_eq!(m.ram()[0x123], 0x77);
    }
}
