//! Checksum database for cartridges whose hardware cannot be detected from
//! the image: non-Sega mappers, PAL-only releases, battery-backed RAM and FM
//! sound support.

use crate::cartridge::{ConsoleType, MapperType, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameEntry {
    pub crc32: u32,
    pub title: &'static str,
    pub system: ConsoleType,
    pub zone: Zone,
    pub mapper: MapperType,
    /// Cartridge RAM size when it differs from the mapper default
    pub ram_size: Option<usize>,
    pub battery: bool,
    pub fm: bool,
}

const fn game(
    crc32: u32,
    title: &'static str,
    system: ConsoleType,
    zone: Zone,
    mapper: MapperType,
) -> GameEntry {
    GameEntry {
        crc32,
        title,
        system,
        zone,
        mapper,
        ram_size: None,
        battery: false,
        fm: false,
    }
}

const fn with_battery(mut entry: GameEntry) -> GameEntry {
    entry.battery = true;
    entry
}

const fn with_ram(mut entry: GameEntry, size: usize) -> GameEntry {
    entry.ram_size = Some(size);
    entry
}

const fn with_fm(mut entry: GameEntry) -> GameEntry {
    entry.fm = true;
    entry
}

use ConsoleType::{GameGear as GG, Sg1000 as SG, Sms as SMS};
use MapperType::{Codemasters, Janggun, Korean, Msx, Sega, Sg1000};

/// Sorted by checksum.
static GAMES: &[GameEntry] = &[
    game(0x06965ED9, "F-1 Spirit (KR)", SMS, Zone::JapanNtsc, Msx),
    with_ram(game(0x092F29D6, "The Castle", SG, Zone::JapanNtsc, Sg1000), 0x2000),
    game(0x152F0DCC, "Drop Zone", GG, Zone::ExportNtsc, Codemasters),
    game(0x18FB98A3, "Jang Pung 3", SMS, Zone::JapanNtsc, Korean),
    game(0x192949D5, "Janggun-ui Adeul", SMS, Zone::JapanNtsc, Janggun),
    game(0x29822980, "Cosmic Spacehead", SMS, Zone::ExportPal, Codemasters),
    game(0x2D48C1D3, "Back to the Future Part III", SMS, Zone::ExportPal, Sega),
    game(0x445525E2, "Penguin Adventure (KR)", SMS, Zone::JapanNtsc, Msx),
    with_battery(with_fm(game(0x6605D36A, "Phantasy Star (J)", SMS, Zone::JapanNtsc, Sega))),
    game(0x6CAA625B, "Cosmic Spacehead", GG, Zone::ExportNtsc, Codemasters),
    game(0x72981057, "CJ Elephant Fugitive", SMS, Zone::ExportPal, Codemasters),
    game(0x77EFE84A, "Cyborg Z (KR)", SMS, Zone::JapanNtsc, Msx),
    game(0x83F0EEDE, "Street Master (KR)", SMS, Zone::JapanNtsc, Korean),
    game(0x8813514B, "The Excellent Dizzy Collection", SMS, Zone::ExportPal, Codemasters),
    game(0x89B79E77, "Dodgeball King (KR)", SMS, Zone::JapanNtsc, Korean),
    game(0x97D03541, "Sangokushi 3 (KR)", SMS, Zone::JapanNtsc, Korean),
    game(0xA577CE46, "Micro Machines", SMS, Zone::ExportPal, Codemasters),
    game(0xAA140C9C, "The Excellent Dizzy Collection", GG, Zone::ExportNtsc, Codemasters),
    game(0xB519E833, "Sonic the Hedgehog", SMS, Zone::ExportNtsc, Sega),
    game(0xB9664AE1, "Fantastic Dizzy", SMS, Zone::ExportPal, Codemasters),
    game(0xC1756BEE, "Pete Sampras Tennis", GG, Zone::ExportNtsc, Codemasters),
    game(0xC888222B, "Fantastic Dizzy", GG, Zone::ExportNtsc, Codemasters),
    game(0xDBE8895C, "Micro Machines 2: Turbo Tournament", GG, Zone::ExportNtsc, Codemasters),
    game(0xE316C06D, "Nemesis (KR)", SMS, Zone::JapanNtsc, Msx),
    with_battery(with_fm(game(0xE4A65E79, "Phantasy Star", SMS, Zone::ExportNtsc, Sega))),
    game(0xEA5C3A6F, "Dinobasher Starring Bignose the Caveman", SMS, Zone::ExportPal, Codemasters),
    game(0xF8176918, "Sensible Soccer", SMS, Zone::ExportPal, Sega),
];

pub fn lookup(crc32: u32) -> Option<&'static GameEntry> {
    GAMES
        .binary_search_by_key(&crc32, |g| g.crc32)
        .ok()
        .map(|i| &GAMES[i])
}

pub fn entries() -> &'static [GameEntry] {
    GAMES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_unique() {
        for pair in GAMES.windows(2) {
            assert!(
                pair[0].crc32 < pair[1].crc32,
                "{:08X} before {:08X}",
                pair[0].crc32,
                pair[1].crc32
            );
        }
    }

    #[test]
    fn test_lookup() {
        for entry in entries() {
            assert_eq!(lookup(entry.crc32), Some(entry));
        }
        assert!(lookup(0x0000_0001).is_none());
    }

    #[test]
    fn test_flags() {
        let castle = lookup(0x092F29D6).unwrap();
        assert_eq!(castle.ram_size, Some(0x2000));
        assert!(lookup(0xE4A65E79).unwrap().battery);
        assert!(lookup(0x6605D36A).unwrap().fm);
        assert!(lookup(0x6605D36A).unwrap().battery);
        assert!(lookup(0xE4A65E79).unwrap().fm);
    }
}
