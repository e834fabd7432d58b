use serde::{Deserialize, Serialize};

use super::bank_byte;

const PAGE_SIZE: usize = 0x2000;

/// Korean MSX-style mapper: four 8 KB pages over 0x4000-0xBFFF.
///
/// Writes to 0x0000-0x0003 select the pages at 0x8000, 0xA000, 0x4000 and
/// 0x6000 respectively; 0x0000-0x3FFF is fixed to the start of the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msx {
    /// Pages for 0x4000, 0x6000, 0x8000, 0xA000
    pages: [u8; 4],
}

impl Default for Msx {
    fn default() -> Self {
        Self::new()
    }
}

impl Msx {
    pub fn new() -> Self {
        Self { pages: [0; 4] }
    }

    pub fn reset(&mut self) {
        self.pages = [0; 4];
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0xBFFF => {
                let window = (addr as usize - 0x4000) / PAGE_SIZE;
                bank_byte(rom, self.pages[window] as usize, PAGE_SIZE, addr as usize & 0x1FFF)
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000 => self.pages[2] = val,
            0x0001 => self.pages[3] = val,
            0x0002 => self.pages[0] = val,
            0x0003 => self.pages[1] = val,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::test_rom::banked;

    #[test]
    fn msx_page_registers() {
        let rom = banked(16, PAGE_SIZE);
        let mut m = Msx::new();
        m.write(0x0000, 4);
        m.write(0x0001, 5);
        m.write(0x0002, 6);
        m.write(0x0003, 7);
        assert_eq!(m.read(&rom, 0x8000), 4);
        assert_eq!(m.read(&rom, 0xA000), 5);
        assert_eq!(m.read(&rom, 0x4000), 6);
        assert_eq!(m.read(&rom, 0x6000), 7);
        // Fixed area
        assert_eq!(m.read(&rom, 0x0000), 0);
        assert_eq!(m.read(&rom, 0x2000), 1);
    }
}
