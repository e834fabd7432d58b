use serde::{Deserialize, Serialize};

/// Plain ROM mirrored over 0x0000-0xBFFF, no control registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RomOnly;

impl RomOnly {
    pub fn read(&self, rom: &[u8], addr: u16) -> u8 {
        if rom.is_empty() {
            return 0xFF;
        }
        rom[addr as usize % rom.len()]
    }
}
