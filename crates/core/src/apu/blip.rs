//! Band-limited sound buffer.
//!
//! Sound chips report amplitude *changes* (`add_delta`) at the exact CPU
//! cycle they happen. Each change is spread over a short windowed-sinc step
//! so the resampled output contains no energy above the output Nyquist
//! frequency, however high the square wave frequency is. `end_frame` turns
//! the accumulated deltas into readable samples and `read_samples`
//! integrates them back into a waveform, with a gentle high-pass to remove
//! DC.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::logging::{log, LogCategory, LogLevel};

/// Fixed-point bits of the sample position.
const TIME_BITS: u32 = 32;
const TIME_UNIT: u64 = 1 << TIME_BITS;
/// Sub-sample phases of the step kernel.
const PHASE_BITS: u32 = 6;
const PHASE_COUNT: usize = 1 << PHASE_BITS;
/// Kernel length in output samples.
const KERNEL_WIDTH: usize = 16;
/// Each kernel phase sums to `1 << DELTA_BITS`.
const DELTA_BITS: u32 = 15;
/// High-pass strength; larger removes less bass.
const BASS_SHIFT: u32 = 9;

type Kernel = [[i32; KERNEL_WIDTH]; PHASE_COUNT];

/// Windowed-sinc step kernels, one per sub-sample phase.
fn kernel() -> &'static Kernel {
    static KERNEL: OnceLock<Kernel> = OnceLock::new();
    KERNEL.get_or_init(|| {
        let mut table = [[0i32; KERNEL_WIDTH]; PHASE_COUNT];
        let cutoff = 0.92;
        let half = KERNEL_WIDTH as f64 / 2.0;
        for (phase, taps) in table.iter_mut().enumerate() {
            let frac = phase as f64 / PHASE_COUNT as f64;
            let mut raw = [0f64; KERNEL_WIDTH];
            for (i, tap) in raw.iter_mut().enumerate() {
                let x = i as f64 - half + 1.0 - frac;
                let sinc = if x.abs() < 1e-9 {
                    cutoff
                } else {
                    (std::f64::consts::PI * cutoff * x).sin() / (std::f64::consts::PI * x)
                };
                // Blackman window over the kernel span
                let w = (x + half) / KERNEL_WIDTH as f64;
                let window = 0.42 - 0.5 * (2.0 * std::f64::consts::PI * w).cos()
                    + 0.08 * (4.0 * std::f64::consts::PI * w).cos();
                *tap = sinc * window.max(0.0);
            }
            let sum: f64 = raw.iter().sum();
            let scale = (1 << DELTA_BITS) as f64 / sum;
            let mut total = 0i32;
            for (dst, src) in taps.iter_mut().zip(raw.iter()) {
                *dst = (src * scale).round() as i32;
                total += *dst;
            }
            // Exact unity gain keeps DC from drifting.
            taps[KERNEL_WIDTH / 2 - 1] += (1 << DELTA_BITS) - total;
        }
        table
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlipBuffer {
    /// Output samples per input clock, in `TIME_BITS` fixed point.
    factor: u64,
    /// Fractional sample position at which the current frame starts.
    offset: u64,
    /// Samples completed by `end_frame` and not yet read.
    avail: usize,
    integrator: i64,
    buf: Vec<i64>,
}

impl BlipBuffer {
    /// A buffer holding up to `capacity` output samples between reads.
    pub fn new(clock_rate: u32, sample_rate: u32, capacity: usize) -> Self {
        let mut blip = Self {
            factor: 0,
            offset: 0,
            avail: 0,
            integrator: 0,
            buf: vec![0; capacity + KERNEL_WIDTH + 1],
        };
        blip.set_rates(clock_rate, sample_rate);
        blip
    }

    /// Change the input clock rate; pending samples are kept.
    pub fn set_rates(&mut self, clock_rate: u32, sample_rate: u32) {
        let clock = clock_rate.max(1) as u64;
        self.factor = ((sample_rate as u64) << TIME_BITS).div_ceil(clock);
        if self.offset == 0 {
            self.offset = self.factor / 2;
        }
    }

    pub fn clear(&mut self) {
        self.offset = self.factor / 2;
        self.avail = 0;
        self.integrator = 0;
        self.buf.iter_mut().for_each(|v| *v = 0);
    }

    pub fn capacity(&self) -> usize {
        self.buf.len() - KERNEL_WIDTH - 1
    }

    /// Samples ready to read.
    pub fn samples_avail(&self) -> usize {
        self.avail
    }

    /// Number of output samples `clocks` input clocks produce from here.
    pub fn clocks_to_samples(&self, clocks: u32) -> usize {
        ((clocks as u64 * self.factor + self.offset) >> TIME_BITS) as usize
    }

    /// Add an amplitude step of `delta` at `time` clocks into the frame.
    ///
    /// A step past the end of the buffer lands on its last slot, so the
    /// waveform keeps its level even when a frame overruns.
    pub fn add_delta(&mut self, time: u32, delta: i32) {
        if delta == 0 {
            return;
        }
        let pos = time as u64 * self.factor + self.offset;
        let mut index = self.avail + (pos >> TIME_BITS) as usize;
        let mut phase = ((pos >> (TIME_BITS - PHASE_BITS)) as usize) & (PHASE_COUNT - 1);
        // The whole kernel must stay inside what a read carries over.
        let last = self.capacity();
        if index > last {
            log(LogCategory::Audio, LogLevel::Warn, || {
                format!("Blip: delta at clock {} is {} samples past capacity", time, index - last)
            });
            index = last;
            phase = 0;
        }
        let taps = &kernel()[phase];
        let delta = delta as i64;
        for (slot, &tap) in self.buf[index..index + KERNEL_WIDTH].iter_mut().zip(taps) {
            *slot += tap as i64 * delta;
        }
    }

    /// Finish a frame of `clocks` input clocks, making its samples readable.
    ///
    /// Samples beyond capacity are dropped; the next frame starts right after
    /// the last kept one, and steps clamped by [`add_delta`](Self::add_delta)
    /// carry over into it.
    pub fn end_frame(&mut self, clocks: u32) {
        let pos = clocks as u64 * self.factor + self.offset;
        let produced = self.avail + (pos >> TIME_BITS) as usize;
        let capacity = self.capacity();
        if produced > capacity {
            log(LogCategory::Audio, LogLevel::Warn, || {
                format!("Blip: buffer full, {} sample(s) dropped", produced - capacity)
            });
        }
        self.avail = produced.min(capacity);
        self.offset = pos & (TIME_UNIT - 1);
    }

    /// Read up to `count` samples into `out[0]`, `out[stride]`, ...
    /// Returns the number of samples read.
    pub fn read_samples(&mut self, out: &mut [i16], count: usize, stride: usize) -> usize {
        let stride = stride.max(1);
        let count = count.min(self.avail).min(out.len().div_ceil(stride));
        let mut sum = self.integrator;
        for i in 0..count {
            let s = (sum >> DELTA_BITS).clamp(i16::MIN as i64, i16::MAX as i64);
            sum += self.buf[i];
            if let Some(slot) = out.get_mut(i * stride) {
                *slot = s as i16;
            }
            sum -= s << (DELTA_BITS - BASS_SHIFT);
        }
        self.integrator = sum;
        self.remove_samples(count);
        count
    }

    fn remove_samples(&mut self, count: usize) {
        let remain = self.avail + KERNEL_WIDTH - count;
        self.avail -= count;
        self.buf.copy_within(count..count + remain, 0);
        self.buf[remain..].iter_mut().for_each(|v| *v = 0);
    }
}

/// A left/right pair of buffers sharing one clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StereoBuffer {
    pub left: BlipBuffer,
    pub right: BlipBuffer,
}

/// Destination of a channel's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Routing {
    Off,
    Right,
    Left,
    #[default]
    Center,
}

impl Routing {
    /// Decode the two-bit right/left pair used by the Game Gear stereo port.
    pub fn from_bits(right: bool, left: bool) -> Self {
        match (left, right) {
            (false, false) => Routing::Off,
            (false, true) => Routing::Right,
            (true, false) => Routing::Left,
            (true, true) => Routing::Center,
        }
    }
}

impl StereoBuffer {
    pub fn new(clock_rate: u32, sample_rate: u32, capacity: usize) -> Self {
        Self {
            left: BlipBuffer::new(clock_rate, sample_rate, capacity),
            right: BlipBuffer::new(clock_rate, sample_rate, capacity),
        }
    }

    pub fn set_rates(&mut self, clock_rate: u32, sample_rate: u32) {
        self.left.set_rates(clock_rate, sample_rate);
        self.right.set_rates(clock_rate, sample_rate);
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    pub fn add_delta(&mut self, routing: Routing, time: u32, delta: i32) {
        match routing {
            Routing::Off => {}
            Routing::Right => self.right.add_delta(time, delta),
            Routing::Left => self.left.add_delta(time, delta),
            Routing::Center => {
                self.left.add_delta(time, delta);
                self.right.add_delta(time, delta);
            }
        }
    }

    pub fn end_frame(&mut self, clocks: u32) {
        self.left.end_frame(clocks);
        self.right.end_frame(clocks);
    }

    pub fn samples_avail(&self) -> usize {
        self.left.samples_avail().min(self.right.samples_avail())
    }

    /// Read interleaved L/R pairs; returns the number of `i16` values written.
    pub fn read_interleaved(&mut self, out: &mut [i16]) -> usize {
        let frames = self.samples_avail().min(out.len() / 2);
        if frames == 0 {
            return 0;
        }
        self.left.read_samples(out, frames, 2);
        self.right.read_samples(&mut out[1..], frames, 2);
        frames * 2
    }

    /// Drop the pending samples (used when the caller passes no buffer).
    pub fn discard(&mut self) {
        let frames = self.samples_avail();
        let mut scratch = vec![0i16; frames];
        self.left.read_samples(&mut scratch, frames, 1);
        self.right.read_samples(&mut scratch, frames, 1);
    }
}
