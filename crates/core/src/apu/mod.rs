//! Core APU (Audio Processing Unit) components.
//!
//! Sound chips used by the Sega 8-bit consoles, built around a shared
//! band-limited output path.
//!
//! ## Components
//!
//! - **BlipBuffer / StereoBuffer**: band-limited step synthesis and resampling
//! - **SN76489 PSG**: three square channels and a noise channel
//! - **YM2413 (OPLL)**: 9-channel two-operator FM synthesizer
//! - **AudioChip trait**: common interface for pluggable audio chips
//!
//! ## Timing Support
//!
//! Chips are clocked by CPU cycles; [`TimingMode`] carries the NTSC and PAL
//! clock rates and frame lengths.

pub mod audio_chip;
pub mod blip;
pub mod sn76489;
pub mod timing;
pub mod ym2413;

pub use audio_chip::AudioChip;
pub use blip::{BlipBuffer, Routing, StereoBuffer};
pub use sn76489::{NoiseVariant, Sn76489Psg};
pub use timing::{TimingMode, CYCLES_PER_LINE};
pub use ym2413::Ym2413;
