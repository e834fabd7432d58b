//! Master System / Game Gear / SG-1000 machine: CPU, bus, frame scheduling,
//! output post-processing and save states.

use std::path::Path;

use emu_core::cpu_z80::CpuZ80;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::{AudioSample, Frame};
use emu_core::{MountPointInfo, System};
use serde::Serialize;
use serde_json::Value;

use crate::bus::SmsBus;
use crate::cartridge::{Cartridge, CartridgeInfo, ConsoleType, MapperType, Zone};
use crate::cheats::{Cheat, CheatEngine};
use crate::config::{ForcedConfig, GlassesMode, LeftBar, SmsConfig};
use crate::error::SmsError;
use crate::input::{Key, Phaser};
use crate::save_state::{self, MemoryRef, StateRef};
use crate::vdp::VdpModel;

const GG_WIDTH: u32 = 160;
const GG_HEIGHT: u32 = 144;
const GG_LEFT: u32 = 48;
const GG_TOP: u32 = 24;
const LEFT_BAR_WIDTH: u32 = 8;

/// What a host needs to size its video and audio output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeInfo {
    pub width: u32,
    pub height: u32,
    pub zone: Zone,
    /// Nominal refresh: 60 or 50
    pub frame_rate: u32,
    /// Exact field rate for the current timing
    pub frame_rate_hz: f64,
    pub sample_rate: u32,
}

/// Sega 8-bit console emulator
pub struct SmsSystem {
    cpu: CpuZ80<SmsBus>,
    config: SmsConfig,
    cheats: CheatEngine,
    paused: bool,
    frame_count: u64,
    /// Cycles already run into the next frame
    frame_cycle: u32,
}

impl SmsSystem {
    pub fn new(config: SmsConfig) -> Self {
        let bus = SmsBus::new(None, None, &config);
        let mut cpu = CpuZ80::new(bus);
        cpu.set_strict_opcodes(config.strict_opcodes);
        Self {
            cpu,
            config,
            cheats: CheatEngine::new(),
            paused: false,
            frame_count: 0,
            frame_cycle: 0,
        }
    }

    pub fn config(&self) -> &SmsConfig {
        &self.config
    }

    /// Apply new settings. Video, input and CPU settings take effect at
    /// once; region, FM and sample-rate changes apply on the next load.
    pub fn set_config(&mut self, config: SmsConfig) {
        self.cpu.set_strict_opcodes(config.strict_opcodes);
        self.cpu.memory.vdp.set_glasses_mode(config.glasses);
        self.cpu.memory.input.set_allow_up_down(config.allow_up_down);
        self.config = config;
    }

    pub fn set_glasses_mode(&mut self, mode: GlassesMode) {
        self.config.glasses = mode;
        self.cpu.memory.vdp.set_glasses_mode(mode);
    }

    pub fn load_rom_from_path(&mut self, path: impl AsRef<Path>) -> Result<(), SmsError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        self.load_rom(&data, &ForcedConfig::default(), Some(path))
    }

    /// Insert a cartridge and power on. Fields of `forced` left at their
    /// defaults fall back to the configured overrides. On error the
    /// machine is left untouched.
    pub fn load_rom(&mut self, data: &[u8], forced: &ForcedConfig, path_hint: Option<&Path>) -> Result<(), SmsError> {
        let base = self.config.forced;
        let forced = ForcedConfig {
            system: pick(forced.system, base.system, ConsoleType::Unknown),
            zone: pick(forced.zone, base.zone, Zone::Unknown),
            mapper: pick(forced.mapper, base.mapper, MapperType::Unknown),
            timing: forced.timing.or(base.timing),
        };
        let cart = Cartridge::load(data, &forced, path_hint)?;

        let bios = self.cpu.memory.bios().map(<[u8]>::to_vec);
        self.cheats = CheatEngine::new();
        self.install(SmsBus::new(Some(cart), bios, &self.config));
        Ok(())
    }

    /// Install a boot ROM. It runs from the next reset when enabled.
    pub fn load_bios(&mut self, data: &[u8]) -> Result<(), SmsError> {
        if data.is_empty() {
            return Err(SmsError::RomTooSmall(0));
        }
        self.cpu.memory.set_bios(Some(data.to_vec()));
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("BIOS: {} bytes, CRC {:08X}", data.len(), crc32fast::hash(data))
        });
        if self.config.bios_enabled {
            self.reset();
        }
        Ok(())
    }

    fn install(&mut self, bus: SmsBus) {
        let mut cpu = CpuZ80::new(bus);
        cpu.set_strict_opcodes(self.config.strict_opcodes);
        self.cpu = cpu;
        self.paused = false;
        self.frame_count = 0;
        self.frame_cycle = 0;
    }

    pub fn cartridge(&self) -> Option<&CartridgeInfo> {
        self.cpu.memory.info()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Total CPU cycles since power-on.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.cycles
    }

    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Cartridge RAM outlives a power cycle: the database says so, or the
    /// game has switched its RAM in, which only battery-backed boards do.
    pub fn battery_backed(&self) -> bool {
        let Some(info) = self.cartridge() else {
            return false;
        };
        let mapper = &self.cpu.memory.mapper;
        !mapper.cart_ram().is_empty() && (info.battery || mapper.ram_used())
    }

    /// Power cycle. Console RAM is cleared; cartridge RAM survives only
    /// when battery backed.
    pub fn reset(&mut self) {
        let battery = self.battery_backed();
        self.cpu.memory.reset(battery, false, self.config.bios_enabled);
        self.restart_cpu();
    }

    /// Reset button: registers and devices restart, all RAM is kept.
    pub fn reset_preserving_ram(&mut self) {
        self.cpu.memory.reset(true, true, self.config.bios_enabled);
        self.restart_cpu();
    }

    fn restart_cpu(&mut self) {
        self.cpu.reset();
        self.frame_cycle = 0;
        let phaser = self.cpu.memory.input.phaser();
        self.cpu.memory.vdp.set_phaser_target(phaser.map(|p| (p.x, p.y)));
    }

    /// Press a pad button. Start on a Master System is the console's pause
    /// button and raises an NMI.
    pub fn key_pressed(&mut self, player: usize, key: Key) {
        let newly = self.cpu.memory.input.press(player, key);
        if newly && key == Key::Start && self.cpu.memory.console() != ConsoleType::GameGear {
            self.cpu.request_nmi();
        }
    }

    pub fn key_released(&mut self, player: usize, key: Key) {
        self.cpu.memory.input.release(player, key);
    }

    /// Aim the light phaser at a pixel of the active display.
    pub fn set_phaser(&mut self, x: i32, y: i32, trigger: bool) {
        self.cpu.memory.input.set_phaser(Some(Phaser { x, y, trigger }));
        self.cpu.memory.vdp.set_phaser_target(Some((x, y)));
    }

    pub fn clear_phaser(&mut self) {
        self.cpu.memory.input.set_phaser(None);
        self.cpu.memory.vdp.set_phaser_target(None);
    }

    /// Parse and install a cheat code against the loaded cartridge.
    pub fn add_cheat(&mut self, code: &str) -> Result<Cheat, SmsError> {
        let cart = self.cpu.memory.cart.as_mut().ok_or(SmsError::NoCartridge)?;
        self.cheats.add(code, Some(cart.rom_mut()))
    }

    pub fn clear_cheats(&mut self) {
        let rom = self.cpu.memory.cart.as_mut().map(|c| c.rom_mut());
        self.cheats.clear(rom);
    }

    pub fn cheat_codes(&self) -> Vec<String> {
        self.cheats.codes().map(str::to_string).collect()
    }

    /// Cartridge RAM worth persisting, if the game has any.
    pub fn save_ram(&self) -> Option<&[u8]> {
        self.battery_backed().then(|| self.cpu.memory.mapper.cart_ram())
    }

    pub fn load_ram(&mut self, data: &[u8]) -> Result<(), SmsError> {
        if self.cartridge().is_none() {
            return Err(SmsError::NoCartridge);
        }
        let ram = self.cpu.memory.mapper.cart_ram_mut();
        if ram.len() != data.len() {
            return Err(SmsError::RamSizeMismatch {
                expected: ram.len(),
                got: data.len(),
            });
        }
        ram.copy_from_slice(data);
        Ok(())
    }

    /// Run until the VDP enters vertical blank, then publish the finished
    /// field and the frame's samples. Returns the number of `i16` values
    /// written to `audio`.
    pub fn run_to_vblank(&mut self, video: Option<&mut [u8]>, audio: Option<&mut [AudioSample]>) -> Result<usize, SmsError> {
        if self.cpu.memory.cart.is_none() {
            return Err(SmsError::NoCartridge);
        }
        if self.paused {
            return Ok(0);
        }

        let mut frame_cycle = self.frame_cycle;
        loop {
            self.cpu.memory.cycle = frame_cycle;
            let cycles = self.cpu.step()?;
            frame_cycle += cycles;
            let vblank = self.cpu.memory.vdp.advance(cycles);
            let irq = self.cpu.memory.vdp.irq();
            self.cpu.set_irq_line(irq);
            if vblank {
                break;
            }
        }

        let overrun = self.cpu.memory.vdp.line_cycles();
        let frame_len = frame_cycle.saturating_sub(overrun);
        self.cpu.memory.audio.end_frame(frame_len);
        self.frame_cycle = overrun;
        self.frame_count += 1;

        self.cheats.apply_ram(&mut self.cpu.memory.ram);

        if let Some(dst) = video {
            let frame = self.output_frame();
            let format = self.config.pixel_format;
            let needed = frame.pixels.len() * format.bytes_per_pixel();
            frame.write_to(format, dst).ok_or(SmsError::BufferTooSmall {
                needed,
                got: dst.len(),
            })?;
        }

        Ok(match audio {
            Some(out) => self.cpu.memory.audio.read_samples(out),
            None => {
                self.cpu.memory.audio.discard_samples();
                0
            }
        })
    }

    /// Output picture size for the current display and settings.
    pub fn output_size(&self) -> (u32, u32) {
        let vdp = &self.cpu.memory.vdp;
        if vdp.model() == VdpModel::GameGear {
            return (GG_WIDTH, GG_HEIGHT);
        }
        let active = vdp.display().height;
        let height = self.config.overscan.full_height(vdp.timing()).map_or(active, |h| h.max(active));
        (vdp.display().width + 2 * self.config.overscan.side_border(), height)
    }

    /// Last field after cropping, borders and left-bar masking.
    pub fn output_frame(&self) -> Frame {
        let vdp = &self.cpu.memory.vdp;
        let src = vdp.display();
        let (width, height) = self.output_size();
        let mut out = Frame::new(width, height);

        if vdp.model() == VdpModel::GameGear {
            let top = GG_TOP + src.height.saturating_sub(192) / 2;
            for y in 0..height.min(src.height.saturating_sub(top)) {
                let from = ((top + y) * src.width + GG_LEFT) as usize;
                let to = (y * width) as usize;
                out.pixels[to..to + width as usize].copy_from_slice(&src.pixels[from..from + width as usize]);
            }
            return out;
        }

        out.pixels.fill(vdp.backdrop_color());
        let side = self.config.overscan.side_border();
        let top = (height - src.height) / 2;
        let hide_left = vdp.model() == VdpModel::Sms
            && match self.config.left_bar {
                LeftBar::Never => false,
                LeftBar::Always => true,
                LeftBar::Auto => vdp.left_column_masked(),
            };
        for y in 0..src.height {
            let from = (y * src.width) as usize;
            let to = ((top + y) * width + side) as usize;
            let row = &mut out.pixels[to..to + src.width as usize];
            row.copy_from_slice(&src.pixels[from..from + src.width as usize]);
            if hide_left {
                row[..LEFT_BAR_WIDTH as usize].fill(0);
            }
        }
        out
    }

    pub fn runtime_info(&self) -> RuntimeInfo {
        let (width, height) = self.output_size();
        let timing = self.cpu.memory.vdp.timing();
        RuntimeInfo {
            width,
            height,
            zone: self.cartridge().map(|c| c.zone).unwrap_or_default(),
            frame_rate: timing.frame_rate_hz().round() as u32,
            frame_rate_hz: timing.frame_rate_hz(),
            sample_rate: self.cpu.memory.audio.sample_rate(),
        }
    }

    fn encode_state(&self) -> Result<Vec<u8>, SmsError> {
        let crc32 = self.cartridge().map(|c| c.crc32).ok_or(SmsError::NoCartridge)?;
        let bus = &self.cpu.memory;
        let state = StateRef {
            cpu: self.cpu.registers(),
            memory: MemoryRef {
                ram: &bus.ram,
                mapper: &bus.mapper,
                bios_mapped: bus.bios_mapped,
                memory_control: bus.memory_control,
            },
            vdp: &bus.vdp,
            audio: &bus.audio,
            input: &bus.input,
            frame_count: self.frame_count,
            frame_cycle: self.frame_cycle,
        };
        save_state::encode(crc32, &state)
    }

    fn decode_state(&mut self, buf: &[u8]) -> Result<(), SmsError> {
        let crc32 = self.cartridge().map(|c| c.crc32).ok_or(SmsError::NoCartridge)?;
        let state = save_state::decode(buf, crc32)?;

        let bus = &self.cpu.memory;
        if state.memory.ram.len() != bus.ram.len() {
            return Err(SmsError::StateDecode(format!(
                "RAM is {} bytes, expected {}",
                state.memory.ram.len(),
                bus.ram.len()
            )));
        }
        if state.memory.mapper.kind() != bus.mapper.kind()
            || state.memory.mapper.cart_ram().len() != bus.mapper.cart_ram().len()
        {
            return Err(SmsError::StateDecode(format!(
                "state is for a {:?} cartridge",
                state.memory.mapper.kind()
            )));
        }
        if state.vdp.model() != bus.vdp.model() || state.audio.fm_fitted() != bus.audio.fm_fitted() {
            return Err(SmsError::StateDecode("state is for different hardware".to_string()));
        }
        if !state.vdp.display_consistent() {
            return Err(SmsError::StateDecode("malformed display field".to_string()));
        }

        self.cpu.set_registers(&state.cpu);
        let bus = &mut self.cpu.memory;
        bus.ram = state.memory.ram;
        bus.mapper = state.memory.mapper;
        bus.bios_mapped = state.memory.bios_mapped && bus.bios().is_some();
        bus.memory_control = state.memory.memory_control;
        bus.vdp = state.vdp;
        bus.audio = state.audio;
        bus.input = state.input;
        bus.cycle = 0;

        // Host-side settings are not part of the state.
        bus.vdp.set_glasses_mode(self.config.glasses);
        bus.input.set_allow_up_down(self.config.allow_up_down);
        let phaser = bus.input.phaser();
        bus.vdp.set_phaser_target(phaser.map(|p| (p.x, p.y)));

        self.frame_count = state.frame_count;
        self.frame_cycle = state.frame_cycle;
        self.paused = false;
        Ok(())
    }

    pub fn debug_state(&self) -> Value {
        let audit = self.cpu.audit();
        serde_json::json!({
            "cpu": serde_json::to_value(self.cpu.registers()).unwrap_or(Value::Null),
            "vdp": self.cpu.memory.vdp.debug_state(),
            "cartridge": serde_json::to_value(self.cartridge()).unwrap_or(Value::Null),
            "frame": self.frame_count,
            "frame_cycle": self.frame_cycle,
            "paused": self.paused,
            "memory_control": self.cpu.memory.memory_control,
            "bios_mapped": self.cpu.memory.bios_mapped,
            "undocumented_opcodes": audit.undocumented,
            "unassigned_opcodes": audit.unassigned,
            "cheats": self.cheat_codes(),
        })
    }
}

fn pick<T: PartialEq + Copy>(value: T, fallback: T, unset: T) -> T {
    if value != unset {
        value
    } else {
        fallback
    }
}

impl Default for SmsSystem {
    fn default() -> Self {
        Self::new(SmsConfig::default())
    }
}

impl System for SmsSystem {
    type Error = SmsError;

    fn reset(&mut self) {
        SmsSystem::reset(self);
    }

    fn run_frame(&mut self, video: Option<&mut [u8]>, audio: Option<&mut [AudioSample]>) -> Result<usize, Self::Error> {
        self.run_to_vblank(video, audio)
    }

    fn save_state_size(&self) -> Result<usize, Self::Error> {
        Ok(self.encode_state()?.len())
    }

    fn save_state(&self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let state = self.encode_state()?;
        let got = buf.len();
        let dst = buf.get_mut(..state.len()).ok_or(SmsError::BufferTooSmall {
            needed: state.len(),
            got,
        })?;
        dst.copy_from_slice(&state);
        Ok(state.len())
    }

    fn load_state(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.decode_state(buf)
    }

    fn debug_state(&self) -> Value {
        SmsSystem::debug_state(self)
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: "Cartridge".to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: ["sms", "gg", "sg", "sc", "bin"].iter().map(|e| e.to_string()).collect(),
                required: true,
            },
            MountPointInfo {
                id: "Bios".to_string(),
                name: "BIOS ROM".to_string(),
                extensions: ["sms", "bin", "rom"].iter().map(|e| e.to_string()).collect(),
                required: false,
            },
        ]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        match mount_point_id {
            "Cartridge" => self.load_rom(data, &ForcedConfig::default(), None),
            "Bios" => self.load_bios(data),
            _ => Err(SmsError::InvalidMountPoint(mount_point_id.to_string())),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        match mount_point_id {
            "Cartridge" => {
                let bios = self.cpu.memory.bios().map(<[u8]>::to_vec);
                self.cheats = CheatEngine::new();
                self.install(SmsBus::new(None, bios, &self.config));
                Ok(())
            }
            "Bios" => {
                self.cpu.memory.set_bios(None);
                Ok(())
            }
            _ => Err(SmsError::InvalidMountPoint(mount_point_id.to_string())),
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            "Cartridge" => self.cpu.memory.cart.is_some(),
            "Bios" => self.cpu.memory.bios().is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overscan;
    use emu_core::types::PixelFormat;

    /// 32 KB export image: `DI; IM 1; JP 0x0003` with `RETN` at the NMI
    /// vector and a valid header.
    fn spin_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[..6].copy_from_slice(&[0xF3, 0xED, 0x56, 0xC3, 0x03, 0x00]);
        rom[0x66..0x68].copy_from_slice(&[0xED, 0x45]);
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = 0x4C;
        rom
    }

    fn loaded() -> SmsSystem {
        let mut sms = SmsSystem::default();
        sms.load_rom(&spin_rom(), &ForcedConfig::default(), None).unwrap();
        sms
    }

    #[test]
    fn test_run_requires_cartridge() {
        let mut sms = SmsSystem::default();
        assert!(matches!(sms.run_to_vblank(None, None), Err(SmsError::NoCartridge)));
        assert!(!sms.is_mounted("Cartridge"));
    }

    #[test]
    fn test_failed_load_keeps_machine() {
        let mut sms = loaded();
        sms.run_to_vblank(None, None).unwrap();
        let crc = sms.cartridge().unwrap().crc32;
        assert!(sms.load_rom(&[0u8; 16], &ForcedConfig::default(), None).is_err());
        assert_eq!(sms.cartridge().unwrap().crc32, crc);
        assert_eq!(sms.frame_count(), 1);
    }

    #[test]
    fn test_paused_frame_does_nothing() {
        let mut sms = loaded();
        sms.pause(true);
        assert_eq!(sms.run_to_vblank(None, None).unwrap(), 0);
        assert_eq!(sms.frame_count(), 0);
        assert_eq!(sms.cpu_cycles(), 0);
    }

    #[test]
    fn test_frame_output_and_audio() {
        let mut sms = loaded();
        let mut video = vec![0u8; 256 * 192 * 4];
        let mut audio = vec![0i16; 4096];
        let n = sms.run_to_vblank(Some(&mut video), Some(&mut audio)).unwrap();
        assert!((1470..=1474).contains(&n), "{n} values");
        assert_eq!(sms.runtime_info().width, 256);
        assert_eq!(sms.runtime_info().frame_rate, 60);

        let mut small = vec![0u8; 16];
        assert!(matches!(
            sms.run_to_vblank(Some(&mut small), None),
            Err(SmsError::BufferTooSmall { needed: 196_608, got: 16 })
        ));
    }

    #[test]
    fn test_overscan_and_left_bar() {
        let mut sms = loaded();
        sms.set_config(SmsConfig {
            overscan: Overscan::Full284,
            left_bar: LeftBar::Always,
            pixel_format: PixelFormat::Rgb565,
            ..SmsConfig::default()
        });
        sms.run_to_vblank(None, None).unwrap();
        assert_eq!(sms.output_size(), (284, 240));

        let frame = sms.output_frame();
        let top = (240 - 192) / 2;
        let row = (top * 284 + 14) as usize;
        assert!(frame.pixels[row..row + 8].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_pause_button_raises_nmi() {
        let mut sms = loaded();
        sms.key_pressed(0, Key::Start);
        assert!(sms.cpu.registers().nmi_pending);
        sms.run_to_vblank(None, None).unwrap();
        // Held: no second NMI
        sms.key_pressed(0, Key::Start);
        assert!(!sms.cpu.registers().nmi_pending);
    }

    #[test]
    fn test_save_ram_roundtrip_and_mismatch() {
        let mut sms = loaded();
        assert!(sms.save_ram().is_none());
        assert!(matches!(
            sms.load_ram(&[0u8; 3]),
            Err(SmsError::RamSizeMismatch { got: 3, .. })
        ));
        let mut empty = SmsSystem::default();
        assert!(matches!(empty.load_ram(&[]), Err(SmsError::NoCartridge)));
    }

    #[test]
    fn test_enabled_cart_ram_survives_power_cycle() {
        use emu_core::cpu_z80::MemoryZ80;

        // 256 KB with no database entry: Sega mapper from the size alone.
        let mut rom = vec![0u8; 0x40000];
        rom[..6].copy_from_slice(&spin_rom()[..6]);
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = 0x4C;
        let mut sms = SmsSystem::default();
        sms.load_rom(&rom, &ForcedConfig::default(), None).unwrap();
        let info = sms.cartridge().unwrap();
        assert_eq!(info.mapper, MapperType::Sega);
        assert!(!info.battery);
        assert!(!sms.battery_backed());
        assert!(sms.save_ram().is_none());

        sms.cpu.memory.write(0xFFFC, 0x08);
        sms.cpu.memory.write(0x8000, 0x5A);
        assert!(sms.battery_backed());

        sms.reset();
        assert_eq!(sms.save_ram().unwrap()[0], 0x5A);
        sms.cpu.memory.write(0xFFFC, 0x08);
        assert_eq!(sms.cpu.memory.read(0x8000), 0x5A);
    }

    #[test]
    fn test_unused_cart_ram_cleared_by_power_cycle() {
        use emu_core::cpu_z80::MemoryZ80;

        let mut rom = vec![0u8; 0x40000];
        rom[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
        rom[0x7FFF] = 0x4C;
        let mut sms = SmsSystem::default();
        sms.load_rom(&rom, &ForcedConfig::default(), None).unwrap();
        sms.load_ram(&vec![0x11; 0x8000]).unwrap();
        sms.reset();
        sms.cpu.memory.write(0xFFFC, 0x08);
        assert_eq!(sms.cpu.memory.read(0x8000), 0x00);
    }

    #[test]
    fn test_state_rejects_other_rom() {
        let mut sms = loaded();
        sms.run_to_vblank(None, None).unwrap();
        let size = sms.save_state_size().unwrap();
        let mut state = vec![0u8; size];
        assert_eq!(sms.save_state(&mut state).unwrap(), size);

        let mut other_rom = spin_rom();
        other_rom[0x100] = 0x55;
        let mut other = SmsSystem::default();
        other.load_rom(&other_rom, &ForcedConfig::default(), None).unwrap();
        assert!(matches!(other.load_state(&state), Err(SmsError::StateChecksum { .. })));
        assert_eq!(other.frame_count(), 0);

        let mut short = vec![0u8; size - 1];
        assert!(matches!(sms.save_state(&mut short), Err(SmsError::BufferTooSmall { .. })));
    }

    #[test]
    fn test_mount_points() {
        let mut sms = SmsSystem::default();
        assert_eq!(sms.mount_points().len(), 2);
        sms.mount("Cartridge", &spin_rom()).unwrap();
        assert!(sms.is_mounted("Cartridge"));
        sms.unmount("Cartridge").unwrap();
        assert!(!sms.is_mounted("Cartridge"));
        assert!(matches!(sms.mount("Tape", &[]), Err(SmsError::InvalidMountPoint(_))));
    }
}
