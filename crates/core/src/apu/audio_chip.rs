//! Audio chip trait for pluggable sound generators.
//!
//! Chips are clocked lazily: the host reports register writes with the CPU
//! cycle they happen at (relative to the start of the current frame), and
//! the chip synthesizes everything up to that point into a
//! [`StereoBuffer`](super::StereoBuffer) before applying the write.

use super::StereoBuffer;

pub trait AudioChip {
    /// Write `val` to register/port `addr` at `time` cycles into the frame.
    fn write_register(&mut self, time: u32, addr: u16, val: u8, out: &mut StereoBuffer);

    /// Read from a register on the audio chip (if supported)
    fn read_register(&self, addr: u16) -> u8 {
        let _ = addr;
        0xFF
    }

    /// Synthesize output up to `time` cycles into the frame.
    fn run_until(&mut self, time: u32, out: &mut StereoBuffer);

    /// Close a frame of `frame_cycles` cycles; later times restart at zero.
    fn end_frame(&mut self, frame_cycles: u32, out: &mut StereoBuffer) {
        self.run_until(frame_cycles, out);
        self.rebase(frame_cycles);
    }

    /// Shift internal time stamps back by `frame_cycles`.
    fn rebase(&mut self, frame_cycles: u32);

    /// Silence or restore the chip's output at `time`.
    fn set_enabled(&mut self, time: u32, enabled: bool, out: &mut StereoBuffer);

    /// Reset the chip to power-on state
    fn reset(&mut self);
}
