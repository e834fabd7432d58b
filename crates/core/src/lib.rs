//! Core emulator primitives and traits.

pub mod apu;
pub mod cpu_z80;
pub mod logging;
pub mod ppu;
pub mod types {
    use serde::{Deserialize, Serialize};

    /// A rendered picture in `0x00RRGGBB` pixels.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }

        /// Copy into `dst` as packed rows of `format` pixels.
        /// Returns the number of bytes written, or `None` if `dst` is too small.
        pub fn write_to(&self, format: PixelFormat, dst: &mut [u8]) -> Option<usize> {
            let bpp = format.bytes_per_pixel();
            let needed = self.pixels.len() * bpp;
            if dst.len() < needed {
                return None;
            }
            for (rgb, out) in self.pixels.iter().zip(dst.chunks_exact_mut(bpp)) {
                format.write_pixel(*rgb, out);
            }
            Some(needed)
        }
    }

    /// Host surface pixel layouts, named in memory byte order for the
    /// 24/32-bit formats and as little-endian words for the 16-bit ones.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum PixelFormat {
        Rgb888,
        #[default]
        Rgba8888,
        Bgra8888,
        Rgb565,
        Bgr565,
        Rgb555,
    }

    impl PixelFormat {
        pub fn bytes_per_pixel(&self) -> usize {
            match self {
                PixelFormat::Rgb888 => 3,
                PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
                PixelFormat::Rgb565 | PixelFormat::Bgr565 | PixelFormat::Rgb555 => 2,
            }
        }

        /// Encode one `0x00RRGGBB` colour into `out`.
        #[inline]
        pub fn write_pixel(&self, rgb: u32, out: &mut [u8]) {
            let r = (rgb >> 16) as u8;
            let g = (rgb >> 8) as u8;
            let b = rgb as u8;
            match self {
                PixelFormat::Rgb888 => out[..3].copy_from_slice(&[r, g, b]),
                PixelFormat::Rgba8888 => out[..4].copy_from_slice(&[r, g, b, 0xFF]),
                PixelFormat::Bgra8888 => out[..4].copy_from_slice(&[b, g, r, 0xFF]),
                PixelFormat::Rgb565 => {
                    let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                    out[..2].copy_from_slice(&v.to_le_bytes());
                }
                PixelFormat::Bgr565 => {
                    let v = ((b as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (r as u16 >> 3);
                    out[..2].copy_from_slice(&v.to_le_bytes());
                }
                PixelFormat::Rgb555 => {
                    let v = ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3);
                    out[..2].copy_from_slice(&v.to_le_bytes());
                }
            }
        }
    }

    pub type AudioSample = i16;
}

use serde_json::Value;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    type Error;

    fn reset(&mut self);
    fn step(&mut self) -> Result<u32, Self::Error>;
}

/// A slot a host can put media into, such as a cartridge or boot ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Key passed back to [`System::mount`]
    pub id: String,
    pub name: String,
    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,
    /// The machine does nothing useful while this slot is empty
    pub required: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Power cycle.
    fn reset(&mut self);

    /// Emulate one video frame. The picture is written to `video` and the
    /// interleaved stereo samples to `audio` when given; returns the number
    /// of `i16` values written to `audio`.
    fn run_frame(
        &mut self,
        video: Option<&mut [u8]>,
        audio: Option<&mut [types::AudioSample]>,
    ) -> Result<usize, Self::Error>;

    /// Bytes a binary save state currently needs.
    /// Save states never include ROM/cartridge data.
    fn save_state_size(&self) -> Result<usize, Self::Error>;

    /// Write a binary save state into `buf`; returns the bytes written.
    fn save_state(&self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Restore a binary save state. On error the system is left unchanged.
    fn load_state(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// JSON snapshot of registers for debugging.
    fn debug_state(&self) -> Value;

    fn supports_save_states(&self) -> bool {
        false
    }

    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Insert media; an unknown `mount_point_id` is an error.
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    fn is_mounted(&self, mount_point_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::types::{Frame, PixelFormat};
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    #[test]
    fn pixel_formats() {
        let mut out = [0u8; 4];
        PixelFormat::Rgba8888.write_pixel(0x123456, &mut out);
        assert_eq!(out, [0x12, 0x34, 0x56, 0xFF]);
        PixelFormat::Bgra8888.write_pixel(0x123456, &mut out);
        assert_eq!(out, [0x56, 0x34, 0x12, 0xFF]);
        PixelFormat::Rgb565.write_pixel(0xFF0000, &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 0xF800);
        PixelFormat::Bgr565.write_pixel(0xFF0000, &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 0x001F);
        PixelFormat::Rgb555.write_pixel(0x00FF00, &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 0x03E0);
        assert_eq!(PixelFormat::Rgb888.bytes_per_pixel(), 3);
    }

    #[test]
    fn frame_write_checks_size() {
        let mut f = Frame::new(2, 1);
        f.pixels = vec![0xFFFFFF, 0x000000];
        let mut small = [0u8; 5];
        assert_eq!(f.write_to(PixelFormat::Rgb888, &mut small), None);
        let mut buf = [0u8; 6];
        assert_eq!(f.write_to(PixelFormat::Rgb888, &mut buf), Some(6));
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0, 0, 0]);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock")]
    struct MockError;

    struct MockSystem {
        frames: u8,
        mounted: bool,
    }

    impl System for MockSystem {
        type Error = MockError;

        fn reset(&mut self) {
            self.frames = 0;
        }

        fn run_frame(
            &mut self,
            _video: Option<&mut [u8]>,
            audio: Option<&mut [i16]>,
        ) -> Result<usize, Self::Error> {
            self.frames += 1;
            Ok(audio.map(|a| a.len().min(4)).unwrap_or(0))
        }

        fn save_state_size(&self) -> Result<usize, Self::Error> {
            Ok(1)
        }

        fn save_state(&self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let slot = buf.first_mut().ok_or(MockError)?;
            *slot = self.frames;
            Ok(1)
        }

        fn load_state(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
            self.frames = *buf.first().ok_or(MockError)?;
            Ok(())
        }

        fn debug_state(&self) -> Value {
            serde_json::json!({ "frames": self.frames })
        }

        fn mount_points(&self) -> Vec<MountPointInfo> {
            vec![MountPointInfo {
                id: "Cartridge".to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: vec!["sms".to_string(), "gg".to_string()],
                required: true,
            }]
        }

        fn mount(&mut self, mount_point_id: &str, _data: &[u8]) -> Result<(), Self::Error> {
            if mount_point_id != "Cartridge" {
                return Err(MockError);
            }
            self.mounted = true;
            Ok(())
        }

        fn unmount(&mut self, _mount_point_id: &str) -> Result<(), Self::Error> {
            self.mounted = false;
            Ok(())
        }

        fn is_mounted(&self, _mount_point_id: &str) -> bool {
            self.mounted
        }
    }

    #[test]
    fn mock_system_state_roundtrip() {
        let mut sys = MockSystem { frames: 0, mounted: false };
        sys.run_frame(None, None).unwrap();
        sys.run_frame(None, None).unwrap();
        let mut buf = vec![0u8; sys.save_state_size().unwrap()];
        sys.save_state(&mut buf).unwrap();
        let mut other = MockSystem { frames: 0, mounted: false };
        other.load_state(&buf).unwrap();
        assert_eq!(other.debug_state()["frames"], 2);
        assert!(other.load_state(&[]).is_err());
        assert!(!other.supports_save_states());
    }

    #[test]
    fn test_system_mount_operations() {
        let mut sys = MockSystem { frames: 0, mounted: false };
        assert_eq!(sys.mount_points()[0].id, "Cartridge");
        assert!(sys.mount_points()[0].required);
        assert!(!sys.is_mounted("Cartridge"));
        assert!(sys.mount("Floppy", &[1]).is_err());
        assert!(sys.mount("Cartridge", &[1, 2, 3]).is_ok());
        assert!(sys.is_mounted("Cartridge"));
        assert!(sys.unmount("Cartridge").is_ok());
        assert!(!sys.is_mounted("Cartridge"));
    }
}
