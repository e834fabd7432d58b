//! Memory and I/O bus shared by the Master System, Game Gear and SG-1000

use emu_core::cpu_z80::MemoryZ80;
use emu_core::logging::{log, LogCategory, LogLevel};

use crate::audio::SmsAudio;
use crate::cartridge::{Cartridge, CartridgeInfo, ConsoleType, Zone};
use crate::config::SmsConfig;
use crate::input::Input;
use crate::mappers::{Mapper, RomOnly};
use crate::vdp::{Vdp, VdpModel};

const RAM_SIZE: usize = 0x2000;
const SG_RAM_SIZE: usize = 0x0400;

/// Console memory and devices, as seen from the Z80.
///
/// Memory Map:
/// - 0x0000-0xBFFF: cartridge window (mapper), or the boot ROM while mapped
/// - 0xC000-0xDFFF: RAM (8 KB; 1 KB mirrored on SG-1000)
/// - 0xE000-0xFFFF: RAM mirror; mapper registers at 0xFFFC-0xFFFF and the
///   3-D glasses latch at 0xFFF8-0xFFFB are write-through
///
/// I/O Ports (decoded by A7, A6 and A0):
/// - 0x3E/0x3F: memory control / I/O control
/// - 0x40-0x7F: V/H counters (read), PSG (write)
/// - 0x80-0xBF: VDP data / control
/// - 0xC0-0xFF: controller ports 0xDC/0xDD
/// - 0x00-0x06: Game Gear start button, serial and stereo registers
/// - 0xF0-0xF2: YM2413 and audio mix control, when fitted
pub struct SmsBus {
    pub(crate) cart: Option<Cartridge>,
    pub(crate) mapper: Mapper,
    pub(crate) ram: Vec<u8>,
    bios: Option<Vec<u8>>,
    pub(crate) bios_mapped: bool,
    pub(crate) memory_control: u8,

    pub(crate) vdp: Vdp,
    pub(crate) audio: SmsAudio,
    pub(crate) input: Input,

    console: ConsoleType,
    japan: bool,
    pal: bool,

    /// Cycle within the current frame of the instruction being executed
    pub(crate) cycle: u32,
}

/// Only Japanese consoles shipped with the FM unit; export games that drive
/// it are flagged in the database.
fn fm_expected(info: Option<&CartridgeInfo>) -> bool {
    info.map_or(true, |i| {
        i.fm || matches!(i.zone, Zone::JapanNtsc | Zone::JapanPal | Zone::Unknown)
    })
}

impl SmsBus {
    pub fn new(cart: Option<Cartridge>, bios: Option<Vec<u8>>, config: &SmsConfig) -> Self {
        let info = cart.as_ref().map(|c| c.info().clone());
        let console = info.as_ref().map(|i| i.system).unwrap_or(ConsoleType::Sms);
        // Forced timing is already folded into the resolved zone.
        let timing = info
            .as_ref()
            .map(|i| i.zone.timing())
            .or(config.forced.timing)
            .unwrap_or_default();
        let model = match console {
            ConsoleType::GameGear => VdpModel::GameGear,
            ConsoleType::Sg1000 => VdpModel::Tms9918,
            _ => VdpModel::Sms,
        };
        let noise = info.as_ref().map(|i| i.noise).unwrap_or_default();
        let fm_fitted = config.fm_enabled && model == VdpModel::Sms && fm_expected(info.as_ref());

        let mut vdp = Vdp::new(model, timing);
        vdp.set_glasses_mode(config.glasses);

        let ram_size = if console == ConsoleType::Sg1000 { SG_RAM_SIZE } else { RAM_SIZE };
        let bios_mapped = config.bios_enabled && bios.is_some() && console != ConsoleType::Sg1000;

        Self {
            mapper: info.as_ref().map(Mapper::from_info).unwrap_or(Mapper::RomOnly(RomOnly)),
            cart,
            ram: vec![0; ram_size],
            bios,
            bios_mapped,
            memory_control: 0,
            vdp,
            audio: SmsAudio::new(timing, config.sample_rate, noise, fm_fitted),
            input: Input::new(config.allow_up_down),
            console,
            japan: info.as_ref().is_some_and(|i| i.zone.is_japan()),
            pal: info.as_ref().is_some_and(|i| i.zone.is_pal()),
            cycle: 0,
        }
    }

    pub fn info(&self) -> Option<&CartridgeInfo> {
        self.cart.as_ref().map(|c| c.info())
    }

    pub fn console(&self) -> ConsoleType {
        self.console
    }

    pub fn bios(&self) -> Option<&[u8]> {
        self.bios.as_deref()
    }

    /// Install or remove the boot ROM; it is mapped in on the next reset.
    pub fn set_bios(&mut self, bios: Option<Vec<u8>>) {
        if bios.is_none() {
            self.bios_mapped = false;
        }
        self.bios = bios;
    }

    /// Power-on state for everything behind the bus. Cartridge RAM survives
    /// only when `keep_cart_ram` is set.
    pub fn reset(&mut self, keep_cart_ram: bool, keep_ram: bool, bios_enabled: bool) {
        self.mapper.reset();
        if !keep_cart_ram {
            self.mapper.cart_ram_mut().fill(0);
        }
        if !keep_ram {
            self.ram.fill(0);
        }
        self.bios_mapped = bios_enabled && self.bios.is_some() && self.console != ConsoleType::Sg1000;
        self.memory_control = 0;
        self.vdp.reset();
        self.audio.reset();
        self.input.reset();
        self.cycle = 0;
    }

    fn gg_read(&self, port: u8) -> u8 {
        match port {
            0x00 => self.input.read_gg_port(self.japan, self.pal),
            0x01 => 0x7F,
            0x02 => 0xFF,
            0x03 => 0x00,
            0x04 => 0xFF,
            0x05 => 0x00,
            _ => 0xFF,
        }
    }

    fn fm_mapped(&self, port: u8) -> bool {
        self.audio.fm_fitted() && (0xF0..=0xF2).contains(&port)
    }
}

impl MemoryZ80 for SmsBus {
    fn read(&self, addr: u16) -> u8 {
        if addr >= 0xC000 {
            return self.ram[addr as usize % self.ram.len()];
        }
        if self.bios_mapped {
            if let Some(bios) = self.bios.as_deref().filter(|b| !b.is_empty()) {
                return bios[addr as usize % bios.len()];
            }
        }
        match self.cart.as_ref() {
            Some(cart) => self.mapper.read(cart.rom(), addr),
            None => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.mapper.write(addr, val);
        if addr >= 0xC000 {
            let len = self.ram.len();
            self.ram[addr as usize % len] = val;
            if (0xFFF8..=0xFFFB).contains(&addr) {
                self.vdp.set_shutter(val);
            }
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        let port = port as u8;
        if self.console == ConsoleType::GameGear && port < 0x07 {
            return self.gg_read(port);
        }
        if self.fm_mapped(port) {
            return if port == 0xF2 { self.audio.read_fm_control() } else { 0xFF };
        }
        match port & 0xC1 {
            0x40 => self.vdp.v_counter(),
            0x41 => self.vdp.h_latch(),
            0x80 => self.vdp.read_data(),
            0x81 => self.vdp.read_status(),
            0xC0 => self.input.read_port_a(),
            0xC1 => {
                let light = self.vdp.light_detected();
                self.input.read_port_b(light, self.japan)
            }
            _ => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("Bus: read from unmapped port {:02X}", port)
                });
                0xFF
            }
        }
    }

    fn io_write(&mut self, port: u16, val: u8) {
        let port = port as u8;
        if self.console == ConsoleType::GameGear && port < 0x07 {
            if port == 0x06 {
                self.audio.write_stereo(self.cycle, val);
            }
            return;
        }
        if self.fm_mapped(port) {
            match port {
                0xF2 => self.audio.write_fm_control(self.cycle, val),
                _ => self.audio.write_fm(self.cycle, port, val),
            }
            return;
        }
        match port & 0xC1 {
            0x00 => {
                self.memory_control = val;
                if self.bios_mapped && val & 0x08 != 0 {
                    log(LogCategory::Bus, LogLevel::Info, || {
                        "Bus: boot ROM unmapped".to_string()
                    });
                    self.bios_mapped = false;
                }
            }
            0x01 => {
                if self.input.write_io_control(val) {
                    self.vdp.latch_h_counter();
                }
            }
            0x40 | 0x41 => self.audio.write_psg(self.cycle, val),
            0x80 => self.vdp.write_data(val),
            0x81 => self.vdp.write_control(val),
            _ => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("Bus: write {:02X} to unmapped port {:02X}", val, port)
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForcedConfig;

    fn cart(size: usize, forced: ForcedConfig) -> Cartridge {
        let mut rom: Vec<u8> = (0..size).map(|i| (i / 0x4000) as u8).collect();
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = 0x4C;
        Cartridge::load(&rom, &forced, None).unwrap()
    }

    fn bus(size: usize) -> SmsBus {
        SmsBus::new(Some(cart(size, ForcedConfig::default())), None, &SmsConfig::default())
    }

    #[test]
    fn test_ram_mirror() {
        let mut bus = bus(0x20000);
        bus.write(0xC123, 0x42);
        assert_eq!(bus.read(0xE123), 0x42);
    }

    #[test]
    fn test_sega_mapper_through_bus() {
        let mut bus = bus(0x20000);
        assert_eq!(bus.read(0x8000), 2);
        bus.write(0xFFFF, 5);
        assert_eq!(bus.read(0x8000), 5);
        // Register writes land in RAM as well.
        assert_eq!(bus.read(0xFFFF), 5);
    }

    #[test]
    fn test_bios_overlay() {
        let config = SmsConfig {
            bios_enabled: true,
            ..SmsConfig::default()
        };
        let mut bus = SmsBus::new(Some(cart(0x8000, ForcedConfig::default())), Some(vec![0xAB; 0x2000]), &config);
        assert_eq!(bus.read(0x0000), 0xAB);
        assert_eq!(bus.read(0x4000), 0xAB);
        bus.io_write(0x3E, 0xA8);
        assert_eq!(bus.read(0x0000), 0x00);
        assert_eq!(bus.read(0x4000), 0x01);
    }

    #[test]
    fn test_vdp_ports() {
        let mut bus = bus(0x8000);
        // Register 1 <- 0x40
        bus.io_write(0xBF, 0x40);
        bus.io_write(0xBF, 0x81);
        assert_eq!(bus.vdp.register(1), 0x40);
        // VRAM write at 0x0010 then read back
        bus.io_write(0xBF, 0x10);
        bus.io_write(0xBF, 0x40);
        bus.io_write(0xBE, 0x99);
        bus.io_write(0xBF, 0x10);
        bus.io_write(0xBF, 0x00);
        assert_eq!(bus.io_read(0xBE), 0x99);
        // Mirrors
        bus.io_write(0x81, 0x0E);
        bus.io_write(0x81, 0x82);
        assert_eq!(bus.vdp.register(2), 0x0E);
    }

    #[test]
    fn test_controller_and_unmapped_ports() {
        let mut bus = bus(0x8000);
        assert_eq!(bus.io_read(0xDC), 0xFF);
        assert_eq!(bus.io_read(0xC0), 0xFF);
        assert_eq!(bus.io_read(0x3E), 0xFF);
    }

    #[test]
    fn test_fm_ports() {
        let japan = || ForcedConfig {
            zone: Zone::JapanNtsc,
            ..ForcedConfig::default()
        };
        let mut bus = SmsBus::new(Some(cart(0x8000, japan())), None, &SmsConfig::default());
        bus.io_write(0xF2, 0x03);
        assert_eq!(bus.io_read(0xF2), 0x03);

        let config = SmsConfig {
            fm_enabled: false,
            ..SmsConfig::default()
        };
        let mut bus = SmsBus::new(Some(cart(0x8000, japan())), None, &config);
        bus.io_write(0xF2, 0x03);
        // Falls through to the controller port mirror
        assert_eq!(bus.io_read(0xF2), 0xFF);
    }

    #[test]
    fn test_fm_fitted_for_japan_and_fm_titles() {
        // Export header, no database entry: an export console has no FM unit.
        assert!(!bus(0x8000).audio.fm_fitted());

        // Export Phantasy Star is listed as driving the FM unit.
        let mut rom = vec![0u8; 0x8000];
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = 0x4C;
        let export = crate::cartridge::resolve(&rom, 0, &ForcedConfig::default(), None);
        assert!(!fm_expected(Some(&export)));
        let listed = crate::cartridge::resolve(&rom, 0xE4A65E79, &ForcedConfig::default(), None);
        assert!(listed.fm);
        assert!(fm_expected(Some(&listed)));

        // No cartridge: the console defaults to having one.
        assert!(fm_expected(None));
        assert!(SmsBus::new(None, None, &SmsConfig::default()).audio.fm_fitted());
    }

    #[test]
    fn test_game_gear_ports() {
        let forced = ForcedConfig {
            system: ConsoleType::GameGear,
            ..ForcedConfig::default()
        };
        let mut bus = SmsBus::new(Some(cart(0x8000, forced)), None, &SmsConfig::default());
        assert_eq!(bus.io_read(0x00) & 0x80, 0x80);
        assert_eq!(bus.io_read(0x01), 0x7F);
        assert_eq!(bus.io_read(0x05), 0x00);
        // FM is never fitted to a Game Gear.
        assert!(!bus.audio.fm_fitted());
    }

    #[test]
    fn test_glasses_latch() {
        let mut bus = bus(0x8000);
        bus.write(0xFFF8, 0x01);
        assert_eq!(bus.read(0xFFF8), 0x01);
    }

    #[test]
    fn test_sg1000_ram_mirror() {
        let forced = ForcedConfig {
            system: ConsoleType::Sg1000,
            ..ForcedConfig::default()
        };
        let mut bus = SmsBus::new(Some(cart(0x8000, forced)), None, &SmsConfig::default());
        bus.write(0xC001, 0x5A);
        assert_eq!(bus.read(0xC401), 0x5A);
        assert_eq!(bus.read(0xFC01), 0x5A);
    }
}
