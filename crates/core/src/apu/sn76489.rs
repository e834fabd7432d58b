//! Texas Instruments SN76489 Programmable Sound Generator
//!
//! Used by the SG-1000, Master System and Game Gear (the latter two carry
//! Sega's SN76496 derivative).
//!
//! # Architecture
//! - 3 square wave tone channels with 10-bit periods
//! - 1 noise channel driven by a linear-feedback shift register
//! - 4-bit attenuation per channel (2 dB steps, 15 = off)
//! - a one-byte latch/data command protocol
//! - Game Gear only: a per-channel left/right enable register
//!
//! Synthesis is event driven. Each channel remembers the cycle of its next
//! transition and, when run over a window of cycles, emits the amplitude
//! steps that fall inside it into a band-limited buffer.

use serde::{Deserialize, Serialize};

use super::{AudioChip, Routing, StereoBuffer};
use crate::logging::{log, LogCategory, LogLevel};

/// Output amplitude for each attenuation value.
const VOLUMES: [i32; 16] = [64, 50, 39, 31, 24, 19, 15, 12, 9, 7, 5, 4, 3, 2, 1, 0];
/// Scale from the table above to buffer units.
const AMPLITUDE_SCALE: i32 = 64;
/// Fixed noise periods, in CPU cycles before the doubling applied at run time.
const NOISE_PERIODS: [u32; 3] = [0x100, 0x200, 0x400];
/// Periods at or below this (in CPU cycles) are above 14 kHz and only
/// phase-tracked.
const INAUDIBLE_PERIOD: u32 = 128;
/// Noise shift period used when tone 2's period register is zero.
pub const NOISE_FALLBACK_PERIOD: u32 = 16;

/// Shift register configuration of the noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseVariant {
    /// Sega SN76496: 16-bit register, taps on bits 0 and 3
    #[default]
    Sega,
    /// Texas Instruments SN76489: 15-bit register, taps on bits 0 and 1
    Ti,
}

impl NoiseVariant {
    fn white_feedback(self) -> u16 {
        match self {
            NoiseVariant::Sega => 0x0009,
            NoiseVariant::Ti => 0x0003,
        }
    }

    fn periodic_feedback(self) -> u16 {
        match self {
            NoiseVariant::Sega => 0x8000,
            NoiseVariant::Ti => 0x4000,
        }
    }

    fn seed(self) -> u16 {
        self.periodic_feedback()
    }
}

/// State shared by the four oscillators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Osc {
    attenuation: u8,
    routing: Routing,
    /// Amplitude currently present in the output buffer.
    last_amp: i32,
    /// Cycles past the end of the last run window until the next transition.
    delay: u32,
}

impl Osc {
    fn volume(&self, enabled: bool) -> i32 {
        if enabled {
            VOLUMES[self.attenuation as usize & 0x0F] * AMPLITUDE_SCALE
        } else {
            0
        }
    }

    fn set_amp(&mut self, time: u32, amp: i32, out: &mut StereoBuffer) {
        let delta = amp - self.last_amp;
        if delta != 0 {
            self.last_amp = amp;
            out.add_delta(self.routing, time, delta);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Square {
    osc: Osc,
    /// Half-wave period in CPU cycles (register value × 16).
    period: u32,
    phase: bool,
}

impl Square {
    fn run(&mut self, start: u32, end: u32, enabled: bool, out: &mut StereoBuffer) {
        let volume = self.osc.volume(enabled);
        let mut time = start + self.osc.delay;

        if volume == 0 || self.period <= INAUDIBLE_PERIOD {
            self.osc.set_amp(start, 0, out);
            if self.period == 0 {
                time = end;
            } else if time < end {
                let count = (end - time).div_ceil(self.period);
                self.phase ^= count & 1 == 1;
                time += count * self.period;
            }
        } else {
            let amp = if self.phase { volume } else { -volume };
            self.osc.set_amp(start, amp, out);
            if time < end {
                let mut delta = amp * 2;
                while time < end {
                    delta = -delta;
                    out.add_delta(self.osc.routing, time, delta);
                    time += self.period;
                    self.phase = !self.phase;
                }
                self.osc.last_amp = if self.phase { volume } else { -volume };
            }
        }
        self.osc.delay = time.saturating_sub(end);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Noise {
    osc: Osc,
    shifter: u16,
    feedback: u16,
    /// Low two bits of the noise register; 3 slaves the rate to tone 2.
    rate: u8,
}

impl Noise {
    fn run(&mut self, start: u32, end: u32, tone2: u32, enabled: bool, out: &mut StereoBuffer) {
        let volume = self.osc.volume(enabled);
        let amp = if self.shifter & 1 != 0 { -volume } else { volume };
        self.osc.set_amp(start, amp, out);

        let mut time = start + self.osc.delay;
        if volume == 0 {
            time = time.max(end);
        }
        if time < end {
            let period = match self.rate {
                r @ 0..=2 => NOISE_PERIODS[r as usize] * 2,
                _ => tone2 * 2,
            };
            let period = if period == 0 {
                NOISE_FALLBACK_PERIOD
            } else {
                period
            };
            let mut delta = amp * 2;
            while time < end {
                let changed = self.shifter.wrapping_add(1);
                self.shifter = (self.feedback & 0u16.wrapping_sub(self.shifter & 1)) ^ (self.shifter >> 1);
                if changed & 2 != 0 {
                    delta = -delta;
                    out.add_delta(self.osc.routing, time, delta);
                }
                time += period;
            }
            self.osc.last_amp = delta / 2;
        }
        self.osc.delay = time.saturating_sub(end);
    }
}

/// SN76489 PSG state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sn76489Psg {
    squares: [Square; 3],
    noise: Noise,
    /// Last latch byte; selects the register data bytes go to.
    latch: u8,
    /// Cycle (within the current frame) synthesis has reached.
    last_time: u32,
    variant: NoiseVariant,
    stereo: u8,
    enabled: bool,
}

impl Default for Sn76489Psg {
    fn default() -> Self {
        Self::new(NoiseVariant::Sega)
    }
}

impl Sn76489Psg {
    pub fn new(variant: NoiseVariant) -> Self {
        let mut psg = Self {
            squares: [Square::default(); 3],
            noise: Noise::default(),
            latch: 0,
            last_time: 0,
            variant,
            stereo: 0xFF,
            enabled: true,
        };
        psg.reset_state();
        psg
    }

    pub fn variant(&self) -> NoiseVariant {
        self.variant
    }

    /// Select the noise shift register layout; takes effect on reset.
    pub fn set_variant(&mut self, variant: NoiseVariant) {
        self.variant = variant;
    }

    fn reset_state(&mut self) {
        for square in self.squares.iter_mut() {
            *square = Square::default();
            square.osc.attenuation = 0x0F;
        }
        self.noise = Noise {
            shifter: self.variant.seed(),
            feedback: self.variant.periodic_feedback(),
            ..Noise::default()
        };
        self.noise.osc.attenuation = 0x0F;
        self.latch = 0;
        self.last_time = 0;
        self.stereo = 0xFF;
        self.enabled = true;
    }

    fn run_until_time(&mut self, time: u32, out: &mut StereoBuffer) {
        if time <= self.last_time {
            return;
        }
        let start = self.last_time;
        for square in self.squares.iter_mut() {
            square.run(start, time, self.enabled, out);
        }
        let tone2 = self.squares[2].period;
        self.noise.run(start, time, tone2, self.enabled, out);
        self.last_time = time;
    }

    fn osc_mut(&mut self, index: usize) -> &mut Osc {
        match index {
            0..=2 => &mut self.squares[index].osc,
            _ => &mut self.noise.osc,
        }
    }

    /// Write a command byte (port 0x7F on Sega hardware).
    pub fn write_data(&mut self, time: u32, data: u8, out: &mut StereoBuffer) {
        self.run_until_time(time, out);

        if data & 0x80 != 0 {
            self.latch = data;
        }
        let index = ((self.latch >> 5) & 3) as usize;

        if self.latch & 0x10 != 0 {
            self.osc_mut(index).attenuation = data & 0x0F;
        } else if index < 3 {
            let square = &mut self.squares[index];
            square.period = if data & 0x80 != 0 {
                (square.period & 0x3F00) | ((data as u32) << 4 & 0x00F0)
            } else {
                (square.period & 0x00F0) | ((data as u32) << 8 & 0x3F00)
            };
        } else {
            self.noise.rate = data & 3;
            self.noise.feedback = if data & 0x04 != 0 {
                self.variant.white_feedback()
            } else {
                self.variant.periodic_feedback()
            };
            self.noise.shifter = self.variant.seed();
        }
    }

    /// Game Gear stereo register (port 0x06): bits 0-3 enable the right
    /// output of channels 0-3, bits 4-7 the left output.
    pub fn write_stereo(&mut self, time: u32, data: u8, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
        self.stereo = data;
        for index in 0..4 {
            let routing = Routing::from_bits(data >> index & 1 != 0, data >> (index + 4) & 1 != 0);
            let osc = self.osc_mut(index);
            if osc.routing != routing {
                // Take the level off the side being left; the next run puts it
                // back on the new side.
                if osc.last_amp != 0 {
                    out.add_delta(osc.routing, time, -osc.last_amp);
                    osc.last_amp = 0;
                }
                osc.routing = routing;
            }
        }
        log(LogCategory::Psg, LogLevel::Trace, || {
            format!("PSG: stereo register <- {:02X}", data)
        });
    }

    pub fn stereo(&self) -> u8 {
        self.stereo
    }

    /// 10-bit period register of tone channel `index`.
    pub fn tone_period(&self, index: usize) -> u16 {
        (self.squares[index % 3].period >> 4) as u16
    }

    /// Attenuation (0 loudest, 15 off) of channel `index` (3 = noise).
    pub fn attenuation(&self, index: usize) -> u8 {
        match index {
            0..=2 => self.squares[index].osc.attenuation,
            _ => self.noise.osc.attenuation,
        }
    }

    /// Period in CPU cycles between noise shifts.
    pub fn noise_shift_period(&self) -> u32 {
        let period = match self.noise.rate {
            r @ 0..=2 => NOISE_PERIODS[r as usize] * 2,
            _ => self.squares[2].period * 2,
        };
        if period == 0 {
            NOISE_FALLBACK_PERIOD
        } else {
            period
        }
    }
}

impl AudioChip for Sn76489Psg {
    fn write_register(&mut self, time: u32, addr: u16, val: u8, out: &mut StereoBuffer) {
        match addr & 0xFF {
            0x06 => self.write_stereo(time, val, out),
            _ => self.write_data(time, val, out),
        }
    }

    fn run_until(&mut self, time: u32, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
    }

    fn rebase(&mut self, frame_cycles: u32) {
        self.last_time = self.last_time.saturating_sub(frame_cycles);
    }

    fn set_enabled(&mut self, time: u32, enabled: bool, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
        self.enabled = enabled;
    }

    fn reset(&mut self) {
        self.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> StereoBuffer {
        StereoBuffer::new(3_579_545, 44_100, 4096)
    }

    fn frame_peak(psg: &mut Sn76489Psg, out: &mut StereoBuffer) -> i16 {
        psg.end_frame(59_736, out);
        out.end_frame(59_736);
        let mut samples = vec![0i16; 4096];
        let n = out.read_interleaved(&mut samples);
        samples[..n].iter().map(|s| s.abs()).max().unwrap_or(0)
    }

    #[test]
    fn test_latch_and_data_bytes() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        psg.write_data(0, 0x84, &mut out); // tone 0, low nibble 4
        psg.write_data(0, 0x1A, &mut out); // high six bits
        assert_eq!(psg.tone_period(0), 0x1A4);

        psg.write_data(0, 0xB5, &mut out); // tone 1 attenuation 5
        assert_eq!(psg.attenuation(1), 5);
        // A data byte after a volume latch updates the volume.
        psg.write_data(0, 0x07, &mut out);
        assert_eq!(psg.attenuation(1), 7);
    }

    #[test]
    fn test_power_on_is_silent() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        for index in 0..4 {
            assert_eq!(psg.attenuation(index), 0x0F);
        }
        assert_eq!(frame_peak(&mut psg, &mut out), 0);
    }

    #[test]
    fn test_audible_tone_produces_output() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        psg.write_data(0, 0x8E, &mut out);
        psg.write_data(0, 0x0F, &mut out); // period 0x0FE, about 440 Hz
        psg.write_data(0, 0x90, &mut out); // full volume
        assert!(frame_peak(&mut psg, &mut out) > 2000);
    }

    #[test]
    fn test_ultrasonic_tone_is_only_phase_tracked() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        psg.write_data(0, 0x81, &mut out);
        psg.write_data(0, 0x00, &mut out); // period 1
        psg.write_data(0, 0x90, &mut out);
        assert_eq!(frame_peak(&mut psg, &mut out), 0);
    }

    #[test]
    fn test_noise_zero_period_uses_fallback() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        psg.write_data(0, 0xE7, &mut out); // white noise, rate from tone 2
        assert_eq!(psg.tone_period(2), 0);
        assert_eq!(psg.noise_shift_period(), NOISE_FALLBACK_PERIOD);

        psg.write_data(0, 0xF0, &mut out);
        // Synthesis keeps going rather than stalling on a zero period.
        psg.run_until(1000, &mut out);
        assert_eq!(psg.last_time, 1000);
        assert!(psg.noise.osc.delay < NOISE_FALLBACK_PERIOD);
    }

    #[test]
    fn test_noise_variant_feedback() {
        let mut sega = Sn76489Psg::new(NoiseVariant::Sega);
        let mut ti = Sn76489Psg::new(NoiseVariant::Ti);
        let mut out = buffer();
        sega.write_data(0, 0xE4, &mut out);
        ti.write_data(0, 0xE4, &mut out);
        assert_eq!(sega.noise.feedback, 0x0009);
        assert_eq!(sega.noise.shifter, 0x8000);
        assert_eq!(ti.noise.feedback, 0x0003);
        assert_eq!(ti.noise.shifter, 0x4000);
        assert_eq!(sega.noise_shift_period(), 0x200);
    }

    #[test]
    fn test_stereo_reroute_removes_level_from_old_side() {
        let mut psg = Sn76489Psg::default();
        let mut out = buffer();
        psg.write_data(0, 0x8E, &mut out);
        psg.write_data(0, 0x0F, &mut out);
        psg.write_data(0, 0x90, &mut out);
        psg.write_stereo(0, 0x01, &mut out); // tone 0 right only
        psg.run_until(1000, &mut out);
        assert_ne!(psg.squares[0].osc.last_amp, 0);

        psg.write_stereo(1000, 0x10, &mut out); // tone 0 left only
        assert_eq!(psg.squares[0].osc.last_amp, 0);
        assert_eq!(psg.squares[0].osc.routing, Routing::Left);

        // With no channel routed right any more, the right side returns to
        // silence instead of holding the old level.
        psg.write_data(1000, 0x9F, &mut out);
        psg.end_frame(59_736, &mut out);
        out.end_frame(59_736);
        let mut samples = vec![0i16; 4096];
        let n = out.read_interleaved(&mut samples);
        let tail_right = samples[n - 1];
        assert!(tail_right.abs() < 64, "right tail = {}", tail_right);
    }
}
