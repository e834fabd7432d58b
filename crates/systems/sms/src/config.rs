//! Emulator configuration.
//!
//! Plain serde structs so hosts can keep them in JSON settings files; every
//! field has a default so partial documents load.

use emu_core::apu::TimingMode;
use emu_core::types::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::cartridge::{ConsoleType, MapperType, Zone};

/// Cartridge metadata overrides; `Unknown`/`None` leaves a field to detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForcedConfig {
    pub system: ConsoleType,
    pub zone: Zone,
    pub mapper: MapperType,
    pub timing: Option<TimingMode>,
}

/// Border added around the active display (Master System and SG-1000 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Overscan {
    #[default]
    Disabled,
    /// Extend to the full field height: 240 lines NTSC, 288 PAL
    TopBottom,
    /// Top/bottom plus 14 pixels each side (284 wide)
    Full284,
    /// Top/bottom plus 32 pixels each side (320 wide)
    Full320,
}

impl Overscan {
    pub fn side_border(&self) -> u32 {
        match self {
            Overscan::Disabled | Overscan::TopBottom => 0,
            Overscan::Full284 => 14,
            Overscan::Full320 => 32,
        }
    }

    pub fn full_height(&self, timing: TimingMode) -> Option<u32> {
        match self {
            Overscan::Disabled => None,
            _ => Some(match timing {
                TimingMode::Ntsc => 240,
                TimingMode::Pal => 288,
            }),
        }
    }
}

/// Policy for the leftmost 8 pixels of the Master System picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeftBar {
    #[default]
    Never,
    /// Hide when the game masks column 0 itself
    Auto,
    Always,
}

/// Which fields of a 3-D glasses game are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlassesMode {
    #[default]
    Both,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub forced: ForcedConfig,
    pub overscan: Overscan,
    pub left_bar: LeftBar,
    /// Fit the YM2413 to Japanese Master Systems and to export games that
    /// use it
    pub fm_enabled: bool,
    pub glasses: GlassesMode,
    /// Let opposite directions be held together
    pub allow_up_down: bool,
    pub pixel_format: PixelFormat,
    /// Run the boot ROM (when one is loaded) before the cartridge
    pub bios_enabled: bool,
    pub sample_rate: u32,
    /// Fail on opcodes with no defined behaviour instead of skipping them
    pub strict_opcodes: bool,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            forced: ForcedConfig::default(),
            overscan: Overscan::Disabled,
            left_bar: LeftBar::Never,
            fm_enabled: true,
            glasses: GlassesMode::Both,
            allow_up_down: false,
            pixel_format: PixelFormat::Rgba8888,
            bios_enabled: false,
            sample_rate: 44_100,
            strict_opcodes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: SmsConfig =
            serde_json::from_str(r#"{"overscan":"Full284","forced":{"zone":"ExportPal"}}"#).unwrap();
        assert_eq!(cfg.overscan, Overscan::Full284);
        assert_eq!(cfg.forced.zone, Zone::ExportPal);
        assert_eq!(cfg.forced.mapper, MapperType::Unknown);
        assert_eq!(cfg.sample_rate, 44_100);
        assert!(cfg.fm_enabled);
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = SmsConfig {
            left_bar: LeftBar::Auto,
            glasses: GlassesMode::Right,
            pixel_format: PixelFormat::Rgb565,
            ..SmsConfig::default()
        };
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<SmsConfig>(&text).unwrap(), cfg);
    }

    #[test]
    fn test_overscan_geometry() {
        assert_eq!(Overscan::Full320.side_border(), 32);
        assert_eq!(Overscan::TopBottom.full_height(TimingMode::Pal), Some(288));
        assert_eq!(Overscan::Disabled.full_height(TimingMode::Ntsc), None);
    }
}
