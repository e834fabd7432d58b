//! Sound hardware: the SN76489 PSG, the optional YM2413 FM unit and the
//! band-limited output buffers they share.
//!
//! Both chips are clocked lazily by the bus: every register write carries the
//! cycle it happened at, and [`SmsAudio::end_frame`] closes the frame once
//! the scheduler reaches vblank.

use emu_core::apu::{AudioChip, NoiseVariant, Sn76489Psg, StereoBuffer, TimingMode, Ym2413};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Mix selection written to port 0xF2 (bits 0-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mix {
    Psg,
    Fm,
    Silent,
    Both,
}

impl Mix {
    fn from_control(value: u8) -> Self {
        match value & 0x03 {
            0 => Mix::Psg,
            1 => Mix::Fm,
            2 => Mix::Silent,
            _ => Mix::Both,
        }
    }

    fn psg(self) -> bool {
        matches!(self, Mix::Psg | Mix::Both)
    }

    fn fm(self) -> bool {
        matches!(self, Mix::Fm | Mix::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsAudio {
    psg: Sn76489Psg,
    fm: Option<Ym2413>,
    fm_control: u8,
    buffer: StereoBuffer,
    sample_rate: u32,
}

impl SmsAudio {
    pub fn new(timing: TimingMode, sample_rate: u32, noise: NoiseVariant, fm_fitted: bool) -> Self {
        // A tenth of a second of headroom
        let capacity = (sample_rate / 10).max(1024) as usize;
        let mut audio = Self {
            psg: Sn76489Psg::new(noise),
            fm: fm_fitted.then(Ym2413::new),
            fm_control: 0,
            buffer: StereoBuffer::new(timing.cpu_clock_hz(), sample_rate, capacity),
            sample_rate,
        };
        audio.apply_mix(0);
        audio
    }

    pub fn reset(&mut self) {
        self.psg.reset();
        if let Some(fm) = self.fm.as_mut() {
            fm.reset();
        }
        self.fm_control = 0;
        self.buffer.clear();
        self.apply_mix(0);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn psg(&self) -> &Sn76489Psg {
        &self.psg
    }

    pub fn fm(&self) -> Option<&Ym2413> {
        self.fm.as_ref()
    }

    pub fn fm_fitted(&self) -> bool {
        self.fm.is_some()
    }

    pub fn write_psg(&mut self, time: u32, value: u8) {
        self.psg.write_data(time, value, &mut self.buffer);
    }

    /// Game Gear stereo register (port 0x06).
    pub fn write_stereo(&mut self, time: u32, value: u8) {
        self.psg.write_stereo(time, value, &mut self.buffer);
    }

    /// FM ports 0xF0 (address) and 0xF1 (data).
    pub fn write_fm(&mut self, time: u32, port: u8, value: u8) {
        if let Some(fm) = self.fm.as_mut() {
            fm.write_register(time, port as u16 & 1, value, &mut self.buffer);
        }
    }

    /// Port 0xF2: audio mix control and FM detection latch.
    pub fn write_fm_control(&mut self, time: u32, value: u8) {
        log(LogCategory::Fm, LogLevel::Debug, || {
            format!("FM: mix control <- {:02X} at cycle {}", value, time)
        });
        self.fm_control = value & 0x07;
        self.apply_mix(time);
    }

    pub fn read_fm_control(&self) -> u8 {
        self.fm_control
    }

    fn apply_mix(&mut self, time: u32) {
        let mix = if self.fm.is_some() {
            Mix::from_control(self.fm_control)
        } else {
            Mix::Psg
        };
        self.psg.set_enabled(time, mix.psg(), &mut self.buffer);
        if let Some(fm) = self.fm.as_mut() {
            fm.set_enabled(time, mix.fm(), &mut self.buffer);
        }
    }

    /// Close a frame of `frame_cycles` cycles; its samples become readable.
    pub fn end_frame(&mut self, frame_cycles: u32) {
        self.psg.end_frame(frame_cycles, &mut self.buffer);
        if let Some(fm) = self.fm.as_mut() {
            fm.end_frame(frame_cycles, &mut self.buffer);
        }
        self.buffer.end_frame(frame_cycles);
    }

    /// Stereo frames waiting to be read.
    pub fn samples_avail(&self) -> usize {
        self.buffer.samples_avail()
    }

    /// Copy interleaved L/R samples into `out`; returns the `i16` count.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        self.buffer.read_interleaved(out)
    }

    pub fn discard_samples(&mut self) {
        self.buffer.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_on(audio: &mut SmsAudio) {
        // Channel 0: period 0x0FE, full volume
        audio.write_psg(0, 0x8E);
        audio.write_psg(0, 0x0F);
        audio.write_psg(0, 0x90);
    }

    fn frame_peak(audio: &mut SmsAudio) -> i16 {
        audio.end_frame(TimingMode::Ntsc.cycles_per_frame());
        let mut out = vec![0i16; 4096];
        let n = audio.read_samples(&mut out);
        out[..n].iter().map(|s| s.saturating_abs()).max().unwrap_or(0)
    }

    #[test]
    fn test_frame_sample_count() {
        let mut audio = SmsAudio::new(TimingMode::Ntsc, 44_100, NoiseVariant::Sega, false);
        audio.end_frame(TimingMode::Ntsc.cycles_per_frame());
        // 44100 / 59.92 stereo frames
        let frames = audio.samples_avail();
        assert!((735..=737).contains(&frames), "{}", frames);
        let mut out = vec![0i16; 2048];
        assert_eq!(audio.read_samples(&mut out), frames * 2);
        assert_eq!(audio.samples_avail(), 0);
    }

    #[test]
    fn test_psg_mix_control() {
        let mut audio = SmsAudio::new(TimingMode::Ntsc, 44_100, NoiseVariant::Sega, true);
        tone_on(&mut audio);
        assert!(frame_peak(&mut audio) > 500);

        // FM only: the PSG goes quiet.
        audio.write_fm_control(0, 0x01);
        frame_peak(&mut audio);
        assert!(frame_peak(&mut audio) < 100);
        assert_eq!(audio.read_fm_control(), 0x01);
    }

    #[test]
    fn test_fm_control_ignored_without_fm() {
        let mut audio = SmsAudio::new(TimingMode::Ntsc, 44_100, NoiseVariant::Sega, false);
        tone_on(&mut audio);
        audio.write_fm_control(0, 0x02);
        frame_peak(&mut audio);
        assert!(frame_peak(&mut audio) > 500);
    }

    #[test]
    fn test_reset_clears_mix() {
        let mut audio = SmsAudio::new(TimingMode::Pal, 48_000, NoiseVariant::Sega, true);
        audio.write_fm_control(0, 0x03);
        audio.reset();
        assert_eq!(audio.read_fm_control(), 0);
        assert_eq!(audio.samples_avail(), 0);
        assert_eq!(audio.sample_rate(), 48_000);
    }
}
