//! Clock and frame timing for the two television standards.

use serde::{Deserialize, Serialize};

/// CPU cycles per scanline on the Sega 8-bit consoles (342 pixel clocks).
pub const CYCLES_PER_LINE: u32 = 228;

/// Console region timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 3.579545 MHz Z80 clock, 262 lines
    #[default]
    Ntsc,
    /// PAL (Europe, Brazil) - 3.546893 MHz Z80 clock, 313 lines
    Pal,
}

impl TimingMode {
    /// Z80 (and PSG input) clock frequency in Hz
    pub fn cpu_clock_hz(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 3_579_545,
            TimingMode::Pal => 3_546_893,
        }
    }

    /// Scanlines per frame, blanking included
    pub fn lines_per_frame(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 262,
            TimingMode::Pal => 313,
        }
    }

    /// CPU cycles in one complete frame
    pub fn cycles_per_frame(&self) -> u32 {
        self.lines_per_frame() * CYCLES_PER_LINE
    }

    /// Frame rate in Hz (59.92 NTSC, 49.70 PAL)
    pub fn frame_rate_hz(&self) -> f64 {
        self.cpu_clock_hz() as f64 / self.cycles_per_frame() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rates() {
        assert!((TimingMode::Ntsc.frame_rate_hz() - 59.92).abs() < 0.01);
        assert!((TimingMode::Pal.frame_rate_hz() - 49.70).abs() < 0.01);
        assert_eq!(TimingMode::Ntsc.cycles_per_frame(), 59_736);
        assert_eq!(TimingMode::Pal.cycles_per_frame(), 71_364);
    }
}
