use serde::{Deserialize, Serialize};

/// SG-1000 cartridge: ROM over 0x0000-0xBFFF, with an optional 8 KB
/// expansion RAM at 0x2000-0x3FFF on the titles that carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sg1000 {
    ram: Vec<u8>,
}

impl Sg1000 {
    pub fn new(ram_size: usize) -> Self {
        Self {
            ram: vec![0; ram_size.min(0x2000)],
        }
    }

    fn ram_offset(&self, addr: u16) -> Option<usize> {
        ((0x2000..0x4000).contains(&addr) && !self.ram.is_empty())
            .then(|| (addr as usize - 0x2000) % self.ram.len())
    }

    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        if let Some(i) = self.ram_offset(addr) {
            return self.ram[i];
        }
        if rom.is_empty() || addr >= 0xC000 {
            return 0xFF;
        }
        rom[addr as usize % rom.len()]
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if let Some(i) = self.ram_offset(addr) {
            self.ram[i] = val;
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sg1000_without_ram() {
        let mut rom = vec![0u8; 0x8000];
        rom[0x2000] = 0x12;
        let mut m = Sg1000::new(0);
        m.write(0x2000, 0x99);
        assert_eq!(m.read(&rom, 0x2000), 0x12);
    }

    #[test]
    fn sg1000_expansion_ram() {
        let rom = vec![0xAAu8; 0x8000];
        let mut m = Sg1000::new(0x2000);
        m.write(0x2000, 0x99);
        m.write(0x3FFF, 0x11);
        assert_eq!(m.read(&rom, 0x2000), 0x99);
        assert_eq!(m.read(&rom, 0x3FFF), 0x11);
        assert_eq!(m.read(&rom, 0x4000), 0xAA);
    }
}
