//! Yamaha YM2413 (OPLL) FM synthesizer
//!
//! Fitted in the Japanese Master System and the Mark III FM Sound Unit.
//!
//! # Architecture
//! - 9 melodic channels of two operators (modulator → carrier)
//! - 15 instruments in ROM plus one user-defined instrument (regs 0x00-0x07)
//! - rhythm mode: channels 6-8 become bass drum, snare, tom, cymbal, hi-hat
//! - per-operator ADSR envelope, key scaling, tremolo (AM) and vibrato (PM)
//!
//! The chip produces one sample every 72 CPU cycles (49.7 kHz). Each sample
//! is fed to the band-limited buffer as a step, so it shares the PSG's
//! resampling path.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::{AudioChip, Routing, StereoBuffer};
use crate::logging::{log, LogCategory, LogLevel};

/// CPU cycles per FM output sample.
pub const FM_SAMPLE_CYCLES: u32 = 72;

const SINE_BITS: u32 = 10;
const SINE_SIZE: usize = 1 << SINE_BITS;
/// Phase accumulator width; the top `SINE_BITS` index the sine table.
const PHASE_BITS: u32 = 19;
const PHASE_MASK: u32 = (1 << PHASE_BITS) - 1;
/// Envelope attenuation is 7 bits of 0.375 dB.
const ENV_MAX: u32 = 127;
const GAIN_SIZE: usize = 512;

/// Multiplier × 2 for each MULT value (0 means ½).
const MULTIPLIERS: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Key-scale level base per F-number high nibble, in 0.75 dB at block 7.
const KSL_BASE: [u32; 16] = [0, 24, 32, 37, 40, 43, 45, 47, 48, 50, 51, 52, 53, 54, 55, 56];

/// Vibrato deviation in F-number/64 units across the eight LFO steps.
const PM_STEPS: [i32; 8] = [0, 1, 2, 1, 0, -1, -2, -1];
/// LFO periods in samples (6.4 Hz vibrato, 3.7 Hz tremolo).
const PM_PERIOD: u32 = 7_768;
const AM_PERIOD: u32 = 13_436;
/// Peak tremolo depth (4.8 dB) in envelope units.
const AM_DEPTH: u32 = 13;

/// Instrument ROM: index 0 is the user instrument (taken from registers),
/// 1-15 melodic presets, 16-18 rhythm (bass drum, hi-hat/snare, tom/cymbal).
#[rustfmt::skip]
const PATCHES: [[u8; 8]; 19] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x71, 0x61, 0x1E, 0x17, 0xD0, 0x78, 0x00, 0x17], // violin
    [0x13, 0x41, 0x1A, 0x0D, 0xD8, 0xF7, 0x23, 0x13], // guitar
    [0x13, 0x01, 0x99, 0x00, 0xF2, 0xC4, 0x21, 0x23], // piano
    [0x11, 0x61, 0x0E, 0x07, 0x8D, 0x64, 0x70, 0x27], // flute
    [0x32, 0x21, 0x1E, 0x06, 0xE1, 0x76, 0x01, 0x28], // clarinet
    [0x31, 0x22, 0x16, 0x05, 0xE0, 0x71, 0x00, 0x18], // oboe
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07], // trumpet
    [0x33, 0x21, 0x2D, 0x13, 0xB0, 0x70, 0x00, 0x07], // organ
    [0x61, 0x61, 0x1B, 0x06, 0x64, 0x65, 0x10, 0x17], // horn
    [0x41, 0x61, 0x0B, 0x18, 0x85, 0xF0, 0x81, 0x07], // synthesizer
    [0x33, 0x01, 0x83, 0x11, 0xEA, 0xEF, 0x10, 0x04], // harpsichord
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12], // vibraphone
    [0x61, 0x50, 0x0C, 0x05, 0xD2, 0xF5, 0x40, 0x16], // synth bass
    [0x01, 0x01, 0x55, 0x03, 0xE9, 0x90, 0x03, 0x02], // wood bass
    [0x41, 0x41, 0x89, 0x03, 0xF1, 0xE4, 0xC0, 0x13], // electric guitar
    [0x01, 0x01, 0x18, 0x0F, 0xDF, 0xF8, 0x6A, 0x6D], // bass drum
    [0x01, 0x01, 0x00, 0x00, 0xC8, 0xD8, 0xA7, 0x68], // hi-hat / snare
    [0x05, 0x01, 0x00, 0x00, 0xF8, 0xAA, 0x59, 0x55], // tom / cymbal
];

struct Tables {
    sine: [i32; SINE_SIZE],
    gain: [i32; GAIN_SIZE],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut sine = [0i32; SINE_SIZE];
        for (i, s) in sine.iter_mut().enumerate() {
            let angle = (i as f64 + 0.5) * 2.0 * std::f64::consts::PI / SINE_SIZE as f64;
            *s = (angle.sin() * 4095.0).round() as i32;
        }
        let mut gain = [0i32; GAIN_SIZE];
        for (att, g) in gain.iter_mut().enumerate() {
            let db = att as f64 * 0.375;
            *g = (4096.0 * 10f64.powf(-db / 20.0)).round() as i32;
        }
        Tables { sine, gain }
    })
}

/// Operator parameters decoded from an instrument.
#[derive(Debug, Clone, Copy)]
struct OpParams {
    am: bool,
    pm: bool,
    sustained: bool,
    ksr: bool,
    mult: u32,
    ksl: u32,
    rectify: bool,
    ar: u32,
    dr: u32,
    sl: u32,
    rr: u32,
}

impl OpParams {
    fn decode(patch: &[u8; 8], carrier: bool) -> Self {
        let i = carrier as usize;
        let flags = patch[i];
        let (ksl, rectify) = if carrier {
            (patch[3] as u32 >> 6, patch[3] & 0x10 != 0)
        } else {
            (patch[2] as u32 >> 6, patch[3] & 0x08 != 0)
        };
        Self {
            am: flags & 0x80 != 0,
            pm: flags & 0x40 != 0,
            sustained: flags & 0x20 != 0,
            ksr: flags & 0x10 != 0,
            mult: MULTIPLIERS[(flags & 0x0F) as usize],
            ksl,
            rectify,
            ar: patch[4 + i] as u32 >> 4,
            dr: patch[4 + i] as u32 & 0x0F,
            sl: patch[6 + i] as u32 >> 4,
            rr: patch[6 + i] as u32 & 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum EgState {
    Attack,
    Decay,
    Sustain,
    Release,
    #[default]
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Operator {
    phase: u32,
    env: u32,
    state: EgState,
    /// Last two outputs, for modulator self-feedback.
    history: [i32; 2],
}

impl Default for Operator {
    fn default() -> Self {
        Self {
            phase: 0,
            env: ENV_MAX,
            state: EgState::Off,
            history: [0; 2],
        }
    }
}

impl Operator {
    fn key_on(&mut self) {
        self.phase = 0;
        self.state = EgState::Attack;
    }

    fn key_off(&mut self) {
        if self.state != EgState::Off {
            self.state = EgState::Release;
        }
    }

    /// Advance the envelope one sample. `rks` is the key-scaling offset,
    /// `sustain_pedal` the channel's sustain bit.
    fn clock_envelope(&mut self, p: &OpParams, rks: u32, sustain_pedal: bool, counter: u32) {
        let rate_for = |r: u32| if r == 0 { 0 } else { (r * 4 + rks).min(63) };
        match self.state {
            EgState::Attack => {
                if p.ar == 15 {
                    self.env = 0;
                } else if let Some(inc) = eg_increment(rate_for(p.ar), counter) {
                    let step = ((self.env * inc) >> 3).max(1);
                    self.env = self.env.saturating_sub(step);
                }
                if self.env == 0 {
                    self.state = EgState::Decay;
                }
            }
            EgState::Decay => {
                if let Some(inc) = eg_increment(rate_for(p.dr), counter) {
                    self.env = (self.env + inc).min(ENV_MAX);
                }
                if self.env >= p.sl * 8 {
                    self.state = EgState::Sustain;
                }
            }
            EgState::Sustain => {
                // Percussive instruments keep decaying at the release rate.
                if !p.sustained {
                    if let Some(inc) = eg_increment(rate_for(p.rr), counter) {
                        self.env = (self.env + inc).min(ENV_MAX);
                    }
                }
            }
            EgState::Release => {
                let rate = if sustain_pedal {
                    rate_for(5)
                } else if p.sustained {
                    rate_for(p.rr)
                } else {
                    rate_for(7.max(p.rr))
                };
                if let Some(inc) = eg_increment(rate, counter) {
                    self.env = (self.env + inc).min(ENV_MAX);
                }
                if self.env >= ENV_MAX {
                    self.state = EgState::Off;
                }
            }
            EgState::Off => self.env = ENV_MAX,
        }
    }
}

/// Envelope step for `rate` (0-63) on this sample, if any.
fn eg_increment(rate: u32, counter: u32) -> Option<u32> {
    if rate < 4 {
        return None;
    }
    let shift = 13u32.saturating_sub(rate >> 2);
    if counter & ((1 << shift) - 1) != 0 {
        return None;
    }
    if shift > 0 && (counter >> shift) & 7 >= 4 + (rate & 3) {
        return None;
    }
    Some(if rate >= 52 { 1 << ((rate >> 2) - 13) } else { 1 })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Channel {
    modulator: Operator,
    carrier: Operator,
    key: bool,
}

/// Register-derived view of one channel.
struct ChannelRegs {
    fnum: u32,
    block: u32,
    sustain: bool,
    key: bool,
    instrument: usize,
    volume: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ym2413 {
    address: u8,
    regs: Vec<u8>,
    channels: [Channel; 9],
    /// Key state of the five rhythm voices (BD, SD, TOM, CYM, HH).
    rhythm_keys: u8,
    noise: u32,
    eg_counter: u32,
    am_counter: u32,
    pm_counter: u32,
    /// Cycle of the next output sample within the current frame.
    next_sample: u32,
    last_output: i32,
    enabled: bool,
}

impl Default for Ym2413 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ym2413 {
    pub fn new() -> Self {
        Self {
            address: 0,
            regs: vec![0; 0x40],
            channels: [Channel::default(); 9],
            rhythm_keys: 0,
            noise: 1,
            eg_counter: 0,
            am_counter: 0,
            pm_counter: 0,
            next_sample: 0,
            last_output: 0,
            enabled: true,
        }
    }

    pub fn write_address(&mut self, value: u8) {
        self.address = value & 0x3F;
    }

    pub fn register(&self, index: u8) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    pub fn rhythm_mode(&self) -> bool {
        self.regs[0x0E] & 0x20 != 0
    }

    /// Write the latched register at `time`.
    pub fn write_data(&mut self, time: u32, value: u8, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
        let reg = self.address as usize;
        log(LogCategory::Fm, LogLevel::Trace, || {
            format!("FM: reg {:02X} <- {:02X}", reg, value)
        });
        self.regs[reg] = value;

        match reg {
            0x0E => self.update_rhythm_keys(),
            0x20..=0x28 => {
                let ch = reg - 0x20;
                let key = value & 0x10 != 0;
                let channel = &mut self.channels[ch];
                if key && !channel.key {
                    channel.modulator.key_on();
                    channel.carrier.key_on();
                } else if !key && channel.key {
                    channel.modulator.key_off();
                    channel.carrier.key_off();
                }
                channel.key = key;
            }
            _ => {}
        }
    }

    fn update_rhythm_keys(&mut self) {
        let keys = if self.rhythm_mode() {
            self.regs[0x0E] & 0x1F
        } else {
            0
        };
        let rising = keys & !self.rhythm_keys;
        let falling = self.rhythm_keys & !keys;
        // Bit 4 bass drum, 3 snare, 2 tom, 1 cymbal, 0 hi-hat.
        let voices: [(u8, usize, bool); 5] = [
            (0x10, 6, true),
            (0x10, 6, false),
            (0x08, 7, true),
            (0x04, 8, false),
            (0x02, 8, true),
        ];
        for (bit, ch, carrier) in voices {
            let op = if carrier {
                &mut self.channels[ch].carrier
            } else {
                &mut self.channels[ch].modulator
            };
            if rising & bit != 0 {
                op.key_on();
            } else if falling & bit != 0 {
                op.key_off();
            }
        }
        let hh = &mut self.channels[7].modulator;
        if rising & 0x01 != 0 {
            hh.key_on();
        } else if falling & 0x01 != 0 {
            hh.key_off();
        }
        self.rhythm_keys = keys;
    }

    fn channel_regs(&self, ch: usize) -> ChannelRegs {
        let hi = self.regs[0x20 + ch];
        let inst = self.regs[0x30 + ch];
        ChannelRegs {
            fnum: self.regs[0x10 + ch] as u32 | ((hi as u32 & 1) << 8),
            block: (hi as u32 >> 1) & 7,
            sustain: hi & 0x20 != 0,
            key: hi & 0x10 != 0,
            instrument: (inst >> 4) as usize,
            volume: inst as u32 & 0x0F,
        }
    }

    fn patch(&self, index: usize) -> [u8; 8] {
        if index == 0 {
            let mut user = [0u8; 8];
            user.copy_from_slice(&self.regs[0..8]);
            user
        } else {
            PATCHES[index.min(PATCHES.len() - 1)]
        }
    }

    fn phase_increment(&self, fnum: u32, block: u32, p: &OpParams) -> u32 {
        let mut fnum = fnum as i32;
        if p.pm {
            let step = (self.pm_counter * 8 / PM_PERIOD) as usize & 7;
            fnum += (fnum >> 6) * PM_STEPS[step];
        }
        (((fnum.max(0) as u32) << block) * p.mult) >> 1
    }

    fn am_level(&self) -> u32 {
        let half = AM_PERIOD / 2;
        let pos = self.am_counter % AM_PERIOD;
        let tri = if pos < half { pos } else { AM_PERIOD - pos };
        tri * AM_DEPTH / half
    }

    fn ksl_attenuation(fnum: u32, block: u32, ksl: u32) -> u32 {
        if ksl == 0 {
            return 0;
        }
        let base = (KSL_BASE[(fnum >> 5) as usize & 0x0F] as i32 - 8 * (7 - block as i32)).max(0);
        ((base as u32) * 2) >> (3 - ksl)
    }

    fn key_scale_rate(fnum: u32, block: u32, ksr: bool) -> u32 {
        let kcode = (block << 1) | (fnum >> 8);
        if ksr {
            kcode
        } else {
            kcode >> 2
        }
    }

    /// Advance one operator (phase and envelope) and compute its output for
    /// a phase offset `modulation` (in sine table units).
    fn operator_output(
        &self,
        op: &mut Operator,
        p: &OpParams,
        regs: &ChannelRegs,
        base_att: u32,
        modulation: i32,
    ) -> i32 {
        let t = tables();
        let rks = Self::key_scale_rate(regs.fnum, regs.block, p.ksr);
        op.clock_envelope(p, rks, regs.sustain, self.eg_counter);
        let index = ((op.phase >> (PHASE_BITS - SINE_BITS)) as i32 + modulation) as usize & (SINE_SIZE - 1);
        op.phase = (op.phase + self.phase_increment(regs.fnum, regs.block, p)) & PHASE_MASK;

        let mut att = op.env + base_att + Self::ksl_attenuation(regs.fnum, regs.block, p.ksl);
        if p.am {
            att += self.am_level();
        }
        if op.env >= ENV_MAX || att as usize >= GAIN_SIZE {
            return 0;
        }
        let s = t.sine[index];
        if p.rectify && s < 0 {
            return 0;
        }
        (s * t.gain[att as usize]) >> 12
    }

    fn melodic(&mut self, ch: usize) -> i32 {
        let regs = self.channel_regs(ch);
        let patch = self.patch(regs.instrument);
        self.two_op(ch, &regs, &patch, regs.volume * 8)
    }

    fn two_op(&mut self, ch: usize, regs: &ChannelRegs, patch: &[u8; 8], carrier_att: u32) -> i32 {
        let mp = OpParams::decode(patch, false);
        let cp = OpParams::decode(patch, true);
        let feedback = (patch[3] & 7) as u32;
        let tl = (patch[2] & 0x3F) as u32 * 2;

        let mut channel = self.channels[ch];
        let fb = if feedback == 0 {
            0
        } else {
            (channel.modulator.history[0] + channel.modulator.history[1]) >> (9 - feedback)
        };
        let m = self.operator_output(&mut channel.modulator, &mp, regs, tl, fb);
        channel.modulator.history = [channel.modulator.history[1], m];
        let c = self.operator_output(&mut channel.carrier, &cp, regs, carrier_att, m >> 1);
        self.channels[ch] = channel;
        c
    }

    /// Single-operator rhythm voice with a fixed phase pattern.
    fn rhythm_voice(&self, op: &mut Operator, p: &OpParams, regs: &ChannelRegs, att: u32, index: u32) -> i32 {
        let t = tables();
        let rks = Self::key_scale_rate(regs.fnum, regs.block, p.ksr);
        op.clock_envelope(p, rks, false, self.eg_counter);
        op.phase = (op.phase + self.phase_increment(regs.fnum, regs.block, p)) & PHASE_MASK;
        let att = op.env + att;
        if op.env >= ENV_MAX || att as usize >= GAIN_SIZE {
            return 0;
        }
        (t.sine[index as usize & (SINE_SIZE - 1)] * t.gain[att as usize]) >> 12
    }

    fn rhythm(&mut self) -> i32 {
        let mut out = 0;

        // Bass drum: ordinary two-operator voice on channel 6.
        let bd_regs = self.channel_regs(6);
        let bd_patch = PATCHES[16];
        out += 2 * self.two_op(6, &bd_regs, &bd_patch, bd_regs.volume * 8);

        let noise = self.noise & 1 != 0;
        let r7 = self.channel_regs(7);
        let r8 = self.channel_regs(8);
        let hh_sd = PATCHES[17];
        let tom_cym = PATCHES[18];
        let vol7 = self.regs[0x37];
        let vol8 = self.regs[0x38];

        let mut ch7 = self.channels[7];
        let mut ch8 = self.channels[8];
        let hh_phase = ch7.modulator.phase >> (PHASE_BITS - SINE_BITS);
        let cym_phase = ch8.carrier.phase >> (PHASE_BITS - SINE_BITS);
        let bit = |v: u32, n: u32| (v >> n) & 1;
        let res1 = ((bit(hh_phase, 2) ^ bit(hh_phase, 7)) | bit(hh_phase, 3)) != 0;
        let res2 = (bit(cym_phase, 3) ^ bit(cym_phase, 5)) != 0;
        let ring = res1 || res2;

        // Hi-hat
        let hh_index = match (ring, noise) {
            (true, true) => 0x200 | 0xD0,
            (true, false) => 0x200 | (0xD0 >> 2),
            (false, true) => 0xD0 >> 2,
            (false, false) => 0xD0,
        };
        let hh_params = OpParams::decode(&hh_sd, false);
        out += 2 * self.rhythm_voice(&mut ch7.modulator, &hh_params, &r7, (vol7 as u32 >> 4) * 8, hh_index);

        // Snare drum
        let sd_bit = bit(hh_phase, 8) != 0;
        let mut sd_index = if sd_bit { 0x200 } else { 0x100 };
        if noise {
            sd_index ^= 0x100;
        }
        let sd_params = OpParams::decode(&hh_sd, true);
        out += 2 * self.rhythm_voice(&mut ch7.carrier, &sd_params, &r7, (vol7 as u32 & 0x0F) * 8, sd_index);

        // Tom-tom: plain sine at its own pitch
        let tom_params = OpParams::decode(&tom_cym, false);
        let tom_index = ch8.modulator.phase >> (PHASE_BITS - SINE_BITS);
        out += 2 * self.rhythm_voice(&mut ch8.modulator, &tom_params, &r8, (vol8 as u32 >> 4) * 8, tom_index);

        // Top cymbal
        let cym_index = if ring { 0x300 } else { 0x100 };
        let cym_params = OpParams::decode(&tom_cym, true);
        out += 2 * self.rhythm_voice(&mut ch8.carrier, &cym_params, &r8, (vol8 as u32 & 0x0F) * 8, cym_index);

        self.channels[7] = ch7;
        self.channels[8] = ch8;
        out
    }

    /// Compute one output sample.
    fn sample(&mut self) -> i32 {
        let melodic_channels = if self.rhythm_mode() { 6 } else { 9 };
        let mut out = 0;
        for ch in 0..melodic_channels {
            out += self.melodic(ch);
        }
        if self.rhythm_mode() {
            out += self.rhythm();
        }

        if self.noise & 1 != 0 {
            self.noise ^= 0x80_0302;
        }
        self.noise >>= 1;
        self.eg_counter = self.eg_counter.wrapping_add(1);
        self.am_counter = (self.am_counter + 1) % AM_PERIOD;
        self.pm_counter = (self.pm_counter + 1) % PM_PERIOD;
        out
    }

    fn run_until_time(&mut self, time: u32, out: &mut StereoBuffer) {
        while self.next_sample < time {
            let s = self.sample();
            let s = if self.enabled { s } else { 0 };
            let delta = s - self.last_output;
            if delta != 0 {
                out.add_delta(Routing::Center, self.next_sample, delta);
                self.last_output = s;
            }
            self.next_sample += FM_SAMPLE_CYCLES;
        }
    }

    /// Whether any carrier is currently audible.
    pub fn is_active(&self) -> bool {
        self.channels
            .iter()
            .any(|ch| ch.carrier.state != EgState::Off || ch.modulator.state != EgState::Off)
    }
}

impl AudioChip for Ym2413 {
    fn write_register(&mut self, time: u32, addr: u16, val: u8, out: &mut StereoBuffer) {
        if addr & 1 == 0 {
            self.write_address(val);
        } else {
            self.write_data(time, val, out);
        }
    }

    fn read_register(&self, addr: u16) -> u8 {
        self.register(addr as u8)
    }

    fn run_until(&mut self, time: u32, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
    }

    fn rebase(&mut self, frame_cycles: u32) {
        self.next_sample = self.next_sample.saturating_sub(frame_cycles);
    }

    fn set_enabled(&mut self, time: u32, enabled: bool, out: &mut StereoBuffer) {
        self.run_until_time(time, out);
        self.enabled = enabled;
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
