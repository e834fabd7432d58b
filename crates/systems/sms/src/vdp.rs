//! Video Display Processor (315-5124/5246 and the Game Gear variant)
//!
//! The VDP is a superset of the TI TMS9918A: it keeps the four legacy modes
//! the SG-1000 uses and adds Mode 4, with 4bpp tiles, a 32-entry colour RAM,
//! hardware scrolling and a line interrupt.
//!
//! # Timing
//!
//! The chip is advanced in CPU cycles; every 228 cycles a new scanline
//! starts. Lines inside the active area are rendered when they start. The
//! line at the active height is the start of vertical blanking: the frame
//! interrupt flag is raised there and [`Vdp::advance`] reports it so the
//! scheduler can end the frame.
//!
//! # Ports
//!
//! - data port: VRAM/CRAM access through an auto-incrementing address
//! - control port: two-byte address/register writes, status reads
//! - V/H counters: beam position, with the H counter latched on TH edges

mod render;

use emu_core::apu::{TimingMode, CYCLES_PER_LINE};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::{gg_color, sms_color, IndexedPalette, RamPalette, TMS9918_PALETTE};
use emu_core::types::Frame;
use serde::{Deserialize, Serialize};

use crate::config::GlassesMode;

pub const SCREEN_WIDTH: u32 = 256;
/// Tallest active area (Mode 4, 240 lines).
pub const MAX_HEIGHT: u32 = 240;

const STATUS_VBLANK: u8 = 0x80;
const STATUS_OVERFLOW: u8 = 0x40;
const STATUS_COLLISION: u8 = 0x20;

/// Which chip revision is on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VdpModel {
    #[default]
    Sms,
    GameGear,
    /// SG-1000: legacy modes only, fixed palette
    Tms9918,
}

fn blank_frame() -> Frame {
    Frame::new(SCREEN_WIDTH, MAX_HEIGHT)
}

fn blank_display() -> Frame {
    Frame::new(SCREEN_WIDTH, 192)
}

/// VDP state and rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vdp {
    model: VdpModel,
    timing: TimingMode,

    regs: [u8; 16],
    vram: Vec<u8>,
    /// 32 bytes (SMS) or 64 bytes (GG, little-endian words)
    cram: Vec<u8>,
    /// Pending low byte of a Game Gear CRAM word
    cram_latch: u8,
    palette: RamPalette,

    address: u16,
    code: u8,
    /// First control byte, waiting for the second
    control_low: Option<u8>,
    read_buffer: u8,
    status: u8,

    line: u32,
    line_cycles: u32,
    line_counter: u8,
    line_irq: bool,
    /// Vertical scroll, sampled at the start of each field
    vscroll: u8,
    h_latch: u8,

    /// 3-D glasses shutter: `true` while the right eye is open
    shutter_right: bool,
    field_accepted: bool,
    #[serde(skip)]
    glasses: GlassesMode,

    /// Light phaser aim point, if one is plugged in
    #[serde(skip)]
    phaser_target: Option<(i32, i32)>,
    #[serde(skip)]
    light_detected: bool,

    /// Picture being drawn, line by line
    #[serde(skip, default = "blank_frame")]
    frame: Frame,
    /// Last accepted field at its active height. Saved with the state: under
    /// 3-D glasses it is what a rejected field leaves on screen.
    display: Frame,
}

impl Vdp {
    pub fn new(model: VdpModel, timing: TimingMode) -> Self {
        let cram_size = if model == VdpModel::GameGear { 64 } else { 32 };
        let mut vdp = Self {
            model,
            timing,
            regs: [0; 16],
            vram: vec![0; 0x4000],
            cram: vec![0; cram_size],
            cram_latch: 0,
            palette: RamPalette::new(32),
            address: 0,
            code: 0,
            control_low: None,
            read_buffer: 0,
            status: 0,
            line: 0,
            line_cycles: 0,
            line_counter: 0xFF,
            line_irq: false,
            vscroll: 0,
            h_latch: 0,
            shutter_right: false,
            field_accepted: true,
            glasses: GlassesMode::Both,
            phaser_target: None,
            light_detected: false,
            frame: blank_frame(),
            display: blank_display(),
        };
        vdp.reset();
        vdp
    }

    /// Power-on state. VRAM and CRAM are cleared; the beam is placed at the
    /// start of vertical blanking so the first frame is a full one.
    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.vram.iter_mut().for_each(|b| *b = 0);
        self.cram.iter_mut().for_each(|b| *b = 0);
        self.cram_latch = 0;
        self.palette = RamPalette::new(32);
        self.address = 0;
        self.code = 0;
        self.control_low = None;
        self.read_buffer = 0;
        self.status = 0;
        self.line = self.active_height();
        self.line_cycles = 0;
        self.line_counter = 0xFF;
        self.line_irq = false;
        self.vscroll = 0;
        self.h_latch = 0;
        self.shutter_right = false;
        self.field_accepted = true;
        self.light_detected = false;
        self.frame = blank_frame();
        self.display = Frame::new(SCREEN_WIDTH, self.active_height());
    }

    pub fn model(&self) -> VdpModel {
        self.model
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    pub fn register(&self, index: usize) -> u8 {
        self.regs.get(index).copied().unwrap_or(0)
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Cycles elapsed in the current line.
    pub fn line_cycles(&self) -> u32 {
        self.line_cycles
    }

    /// Last accepted field.
    pub fn display(&self) -> &Frame {
        &self.display
    }

    /// The saved picture has a real field's shape.
    pub(crate) fn display_consistent(&self) -> bool {
        let d = &self.display;
        d.width == SCREEN_WIDTH
            && matches!(d.height, 192 | 224 | 240)
            && d.pixels.len() == (d.width * d.height) as usize
    }

    pub(crate) fn mode4(&self) -> bool {
        self.model != VdpModel::Tms9918 && self.regs[0] & 0x04 != 0
    }

    /// Visible lines for the current mode: 192, or 224/240 in the extended
    /// Mode 4 heights.
    pub fn active_height(&self) -> u32 {
        if !self.mode4() || self.regs[0] & 0x02 == 0 {
            return 192;
        }
        match (self.regs[1] & 0x10 != 0, self.regs[1] & 0x08 != 0) {
            (true, false) => 224,
            (false, true) if self.model == VdpModel::Sms => 240,
            _ => 192,
        }
    }

    pub fn display_enabled(&self) -> bool {
        self.regs[1] & 0x40 != 0
    }

    /// Column 0 is masked by the game (reg0 bit 5).
    pub fn left_column_masked(&self) -> bool {
        self.mode4() && self.regs[0] & 0x20 != 0
    }

    /// Colour of the border and of transparent pixels.
    pub fn backdrop_color(&self) -> u32 {
        let index = (self.regs[7] & 0x0F) as usize;
        if self.mode4() {
            self.palette.get_color(16 + index)
        } else {
            TMS9918_PALETTE[index]
        }
    }

    /// Level of the interrupt output.
    pub fn irq(&self) -> bool {
        let frame = self.status & STATUS_VBLANK != 0 && self.regs[1] & 0x20 != 0;
        let line = self.line_irq && self.regs[0] & 0x10 != 0 && self.model != VdpModel::Tms9918;
        frame || line
    }

    pub fn set_glasses_mode(&mut self, mode: GlassesMode) {
        self.glasses = mode;
    }

    /// 3-D glasses shutter latch (bit 0: 0 = left eye, 1 = right eye).
    pub fn set_shutter(&mut self, value: u8) {
        self.shutter_right = value & 0x01 != 0;
    }

    pub fn set_phaser_target(&mut self, target: Option<(i32, i32)>) {
        self.phaser_target = target;
        if target.is_none() {
            self.light_detected = false;
        }
    }

    /// The phaser sensor sees the beam on the current line.
    pub fn light_detected(&self) -> bool {
        self.light_detected
    }

    // ---- ports ----

    pub fn read_data(&mut self) -> u8 {
        self.control_low = None;
        let value = self.read_buffer;
        self.read_buffer = self.vram[self.address as usize];
        self.increment_address();
        value
    }

    pub fn write_data(&mut self, value: u8) {
        self.control_low = None;
        if self.code == 3 && self.model != VdpModel::Tms9918 {
            self.write_cram(value);
        } else {
            self.vram[self.address as usize] = value;
        }
        self.read_buffer = value;
        self.increment_address();
    }

    fn increment_address(&mut self) {
        self.address = (self.address + 1) & 0x3FFF;
    }

    fn write_cram(&mut self, value: u8) {
        match self.model {
            VdpModel::GameGear => {
                let addr = self.address as usize & 0x3F;
                if addr & 1 == 0 {
                    self.cram_latch = value;
                } else {
                    self.cram[addr - 1] = self.cram_latch;
                    self.cram[addr] = value & 0x0F;
                    let word = u16::from_le_bytes([self.cram_latch, value]);
                    self.palette.set_color(addr >> 1, gg_color(word));
                }
            }
            _ => {
                let addr = self.address as usize & 0x1F;
                self.cram[addr] = value & 0x3F;
                self.palette.set_color(addr, sms_color(value));
            }
        }
    }

    /// Status read: returns the flags and clears the interrupt sources.
    pub fn read_status(&mut self) -> u8 {
        self.control_low = None;
        let value = match self.model {
            VdpModel::Tms9918 => self.status,
            _ => self.status | 0x1F,
        };
        self.status &= !(STATUS_VBLANK | STATUS_OVERFLOW | STATUS_COLLISION);
        self.line_irq = false;
        value
    }

    pub fn write_control(&mut self, value: u8) {
        let Some(low) = self.control_low.take() else {
            self.control_low = Some(value);
            self.address = (self.address & 0x3F00) | value as u16;
            return;
        };
        self.code = value >> 6;
        self.address = ((value as u16 & 0x3F) << 8) | low as u16;
        match self.code {
            0 => {
                self.read_buffer = self.vram[self.address as usize];
                self.increment_address();
            }
            2 => self.write_register(value & 0x0F, low),
            _ => {}
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        log(LogCategory::Vdp, LogLevel::Trace, || {
            format!("VDP: R{} <- {:02X} (line {})", reg, value, self.line)
        });
        let reg = reg as usize;
        if reg > 10 {
            return;
        }
        let old_height = self.active_height();
        self.regs[reg] = value;
        if self.active_height() != old_height {
            log(LogCategory::Vdp, LogLevel::Debug, || {
                format!("VDP: active height {} -> {}", old_height, self.active_height())
            });
        }
    }

    /// V counter: the line number as seen by the CPU, with the jump back
    /// that keeps it within eight bits.
    pub fn v_counter(&self) -> u8 {
        let segments: &[(u32, u32)] = match (self.timing, self.active_height()) {
            (TimingMode::Ntsc, 224) => &[(0x00, 0xEA), (0xE5, 0xFF)],
            (TimingMode::Ntsc, 240) => &[(0x00, 0xFF), (0x00, 0x05)],
            (TimingMode::Ntsc, _) => &[(0x00, 0xDA), (0xD5, 0xFF)],
            (TimingMode::Pal, 224) => &[(0x00, 0xFF), (0x00, 0x02), (0xCA, 0xFF)],
            (TimingMode::Pal, 240) => &[(0x00, 0xFF), (0x00, 0x0A), (0xD2, 0xFF)],
            (TimingMode::Pal, _) => &[(0x00, 0xF2), (0xBA, 0xFF)],
        };
        let mut remaining = self.line;
        for &(start, end) in segments {
            let len = end - start + 1;
            if remaining < len {
                return (start + remaining) as u8;
            }
            remaining -= len;
        }
        0xFF
    }

    /// Live H counter: 171 steps per line, skipping from 0x93 to 0xE9.
    pub fn h_counter(&self) -> u8 {
        let h = self.line_cycles * 3 / 4;
        if h <= 0x93 {
            h as u8
        } else {
            (h - 0x94 + 0xE9) as u8
        }
    }

    /// Value latched by the last TH edge or phaser hit.
    pub fn h_latch(&self) -> u8 {
        self.h_latch
    }

    pub fn latch_h_counter(&mut self) {
        self.h_latch = self.h_counter();
    }

    // ---- timing ----

    /// Advance by `cycles` CPU cycles. Returns `true` if vertical blanking
    /// started during the interval.
    pub fn advance(&mut self, cycles: u32) -> bool {
        self.line_cycles += cycles;
        let mut vblank = false;
        while self.line_cycles >= CYCLES_PER_LINE {
            self.line_cycles -= CYCLES_PER_LINE;
            self.line = (self.line + 1) % self.timing.lines_per_frame();
            vblank |= self.start_line();
        }
        vblank
    }

    fn start_line(&mut self) -> bool {
        let line = self.line;
        let height = self.active_height();

        if line == 0 {
            self.vscroll = self.regs[9];
            self.field_accepted = match self.glasses {
                GlassesMode::Both => true,
                GlassesMode::Left => !self.shutter_right,
                GlassesMode::Right => self.shutter_right,
            };
        }

        self.light_detected = false;
        if line < height {
            self.render_line(line);
        }

        if line <= height {
            let (counter, underflow) = self.line_counter.overflowing_sub(1);
            if underflow {
                self.line_counter = self.regs[10];
                self.line_irq = true;
                log(LogCategory::Interrupts, LogLevel::Trace, || {
                    format!("VDP: line interrupt at line {}", line)
                });
            } else {
                self.line_counter = counter;
            }
        } else {
            self.line_counter = self.regs[10];
        }

        if line == height {
            self.status |= STATUS_VBLANK;
            self.finish_field(height);
            return true;
        }
        false
    }

    fn finish_field(&mut self, height: u32) {
        if !self.field_accepted {
            return;
        }
        if self.display.height != height {
            self.display = Frame::new(SCREEN_WIDTH, height);
        }
        let len = (SCREEN_WIDTH * height) as usize;
        self.display.pixels.copy_from_slice(&self.frame.pixels[..len]);
    }

    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "model": format!("{:?}", self.model),
            "registers": self.regs[..11].to_vec(),
            "status": self.status,
            "address": self.address,
            "code": self.code,
            "line": self.line,
            "v_counter": self.v_counter(),
            "line_counter": self.line_counter,
            "mode4": self.mode4(),
            "active_height": self.active_height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_reg(vdp: &mut Vdp, reg: u8, value: u8) {
        vdp.write_control(value);
        vdp.write_control(0x80 | reg);
    }

    fn set_address(vdp: &mut Vdp, addr: u16, code: u8) {
        vdp.write_control(addr as u8);
        vdp.write_control((code << 6) | (addr >> 8) as u8);
    }

    fn run_lines(vdp: &mut Vdp, lines: u32) -> u32 {
        let mut vblanks = 0;
        for _ in 0..lines {
            if vdp.advance(CYCLES_PER_LINE) {
                vblanks += 1;
            }
        }
        vblanks
    }

    #[test]
    fn test_register_write() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 1, 0xE0);
        assert_eq!(vdp.register(1), 0xE0);
        assert!(vdp.display_enabled());
    }

    #[test]
    fn test_vram_read_is_buffered() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_address(&mut vdp, 0x1234, 1);
        vdp.write_data(0xAA);
        vdp.write_data(0xBB);
        set_address(&mut vdp, 0x1234, 0);
        assert_eq!(vdp.read_data(), 0xAA);
        assert_eq!(vdp.read_data(), 0xBB);
    }

    #[test]
    fn test_cram_write() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x04);
        set_reg(&mut vdp, 7, 0x00);
        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x03);
        assert_eq!(vdp.backdrop_color(), 0xFF0000);
    }

    #[test]
    fn test_gg_cram_latched_word() {
        let mut vdp = Vdp::new(VdpModel::GameGear, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x04);
        set_address(&mut vdp, 0x0020, 3);
        vdp.write_data(0xF0);
        // Nothing changes until the odd byte arrives.
        assert_eq!(vdp.backdrop_color(), 0x000000);
        vdp.write_data(0x0F);
        assert_eq!(vdp.backdrop_color(), 0x00FFFF);
    }

    #[test]
    fn test_status_read_clears_flags() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 1, 0x20);
        assert_eq!(run_lines(&mut vdp, 262), 1);
        assert!(vdp.irq());
        vdp.write_control(0x00);
        let status = vdp.read_status();
        assert_eq!(status & 0x80, 0x80);
        assert!(!vdp.irq());
        // Status read also resets the control latch.
        assert!(vdp.control_low.is_none());
    }

    #[test]
    fn test_frame_is_whole_field() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        assert_eq!(run_lines(&mut vdp, 261), 0);
        assert_eq!(run_lines(&mut vdp, 1), 1);
        assert_eq!(vdp.line(), 192);

        let mut pal = Vdp::new(VdpModel::Sms, TimingMode::Pal);
        assert_eq!(run_lines(&mut pal, 312), 0);
        assert_eq!(run_lines(&mut pal, 1), 1);
    }

    #[test]
    fn test_line_interrupt() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x14);
        set_reg(&mut vdp, 10, 9);
        // Lines past the active area reload the counter.
        run_lines(&mut vdp, 262 - 192);
        assert_eq!(vdp.line(), 0);
        assert!(!vdp.irq());
        // Reload value 9: the counter underflows on line 9.
        run_lines(&mut vdp, 8);
        assert!(!vdp.irq());
        run_lines(&mut vdp, 1);
        assert!(vdp.irq());
        vdp.read_status();
        assert!(!vdp.irq());
    }

    #[test]
    fn test_v_counter_ntsc_192() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        run_lines(&mut vdp, 262 - 192);
        assert_eq!(vdp.v_counter(), 0x00);
        run_lines(&mut vdp, 0xDA);
        assert_eq!(vdp.v_counter(), 0xDA);
        run_lines(&mut vdp, 1);
        assert_eq!(vdp.v_counter(), 0xD5);
        run_lines(&mut vdp, 261 - 0xDB);
        assert_eq!(vdp.v_counter(), 0xFF);
    }

    #[test]
    fn test_v_counter_pal_192() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Pal);
        run_lines(&mut vdp, 313 - 192 + 0xF3);
        assert_eq!(vdp.v_counter(), 0xBA);
    }

    #[test]
    fn test_h_counter() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        assert_eq!(vdp.h_counter(), 0);
        vdp.advance(196);
        assert_eq!(vdp.h_counter(), 0x93);
        vdp.advance(2);
        assert_eq!(vdp.h_counter(), 0xE9);
        vdp.latch_h_counter();
        assert_eq!(vdp.h_latch(), 0xE9);
    }

    #[test]
    fn test_extended_heights() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x06);
        set_reg(&mut vdp, 1, 0x10);
        assert_eq!(vdp.active_height(), 224);
        set_reg(&mut vdp, 1, 0x08);
        assert_eq!(vdp.active_height(), 240);
        // Legacy modes are always 192 lines.
        set_reg(&mut vdp, 0, 0x02);
        assert_eq!(vdp.active_height(), 192);
    }

    #[test]
    fn test_glasses_shutter_filters_fields() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        // Display blanked: every line is backdrop.
        set_reg(&mut vdp, 0, 0x04);
        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x03);
        vdp.set_glasses_mode(GlassesMode::Left);

        vdp.set_shutter(0);
        run_lines(&mut vdp, 262);
        assert_eq!(vdp.display().pixels[0], 0xFF0000);

        // Right-eye field is rejected; the left one stays on screen.
        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x30);
        vdp.set_shutter(1);
        run_lines(&mut vdp, 262);
        assert_eq!(vdp.display().pixels[0], 0xFF0000);

        vdp.set_shutter(0);
        run_lines(&mut vdp, 262);
        assert_eq!(vdp.display().pixels[0], 0x0000FF);
    }

    #[test]
    fn test_glasses_mode_change_waits_for_next_field() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x04);
        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x03);
        vdp.set_shutter(0);

        // 70 lines reach line 0 of the next field, 100 more are mid-screen.
        assert_eq!(run_lines(&mut vdp, 170), 0);
        vdp.set_glasses_mode(GlassesMode::Right);
        assert_eq!(run_lines(&mut vdp, 92), 1);
        assert_eq!(vdp.display().pixels[0], 0xFF0000);

        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x30);
        run_lines(&mut vdp, 262);
        assert_eq!(vdp.display().pixels[0], 0xFF0000);
    }

    #[test]
    fn test_accepted_field_survives_serialization() {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x04);
        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x03);
        vdp.set_glasses_mode(GlassesMode::Left);
        vdp.set_shutter(0);
        run_lines(&mut vdp, 262);
        assert_eq!(vdp.display().pixels[0], 0xFF0000);

        set_address(&mut vdp, 0x0010, 3);
        vdp.write_data(0x30);
        vdp.set_shutter(1);

        let json = serde_json::to_string(&vdp).unwrap();
        let mut restored: Vdp = serde_json::from_str(&json).unwrap();
        restored.set_glasses_mode(GlassesMode::Left);
        assert_eq!(restored.display(), vdp.display());

        // The right-eye field is rejected on both copies alike.
        run_lines(&mut vdp, 262);
        run_lines(&mut restored, 262);
        assert_eq!(restored.display().pixels[0], 0xFF0000);
        assert_eq!(restored.display(), vdp.display());
    }
}
