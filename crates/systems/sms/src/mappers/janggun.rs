use serde::{Deserialize, Serialize};

use super::bank_byte;

const PAGE_SIZE: usize = 0x2000;

/// Janggun-ui Adeul mapper: four 8 KB pages over 0x4000-0xBFFF.
///
/// Each page is selected by a write to its own base address; 0xFFFE and
/// 0xFFFF select 16 KB (two consecutive pages) for 0x4000 and 0x8000. Bit 6
/// of a selection makes bytes read through that page come out bit-reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Janggun {
    /// Pages for 0x4000, 0x6000, 0x8000, 0xA000
    pages: [u8; 4],
    reversed: [bool; 4],
}

impl Default for Janggun {
    fn default() -> Self {
        Self::new()
    }
}

impl Janggun {
    pub fn new() -> Self {
        Self {
            pages: [2, 3, 4, 5],
            reversed: [false; 4],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0xBFFF => {
                let window = (addr as usize - 0x4000) / PAGE_SIZE;
                let byte = bank_byte(rom, self.pages[window] as usize, PAGE_SIZE, addr as usize & 0x1FFF);
                if self.reversed[window] {
                    byte.reverse_bits()
                } else {
                    byte
                }
            }
            _ => 0xFF,
        }
    }

    fn select_page(&mut self, window: usize, val: u8) {
        self.pages[window] = val & 0x3F;
        self.reversed[window] = val & 0x40 != 0;
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x4000 => self.select_page(0, val),
            0x6000 => self.select_page(1, val),
            0x8000 => self.select_page(2, val),
            0xA000 => self.select_page(3, val),
            0xFFFE | 0xFFFF => {
                let first = if addr == 0xFFFE { 0 } else { 2 };
                let bank = (val & 0x3F) << 1;
                let flags = val & 0x40;
                self.select_page(first, bank | flags);
                self.select_page(first + 1, (bank + 1) | flags);
            }
            _ => {}
        }
    }
}
