use emu_core::cpu_z80::CpuError;
use thiserror::Error;

/// SMS emulator errors
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("ROM image too small ({0} bytes)")]
    RomTooSmall(usize),
    #[error("no supported mapper for a {0}-byte image")]
    UnsupportedMapper(usize),
    #[error("no cartridge loaded")]
    NoCartridge,
    #[error("invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error("save state truncated ({0} bytes)")]
    StateTooSmall(usize),
    #[error("not a save state")]
    StateMagic,
    #[error("unsupported save state version {0}")]
    StateVersion(u32),
    #[error("save state belongs to ROM {found:08X}, loaded ROM is {expected:08X}")]
    StateChecksum { expected: u32, found: u32 },
    #[error("corrupt save state: {0}")]
    StateDecode(String),
    #[error("save state encoding failed: {0}")]
    StateEncode(String),
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    #[error("invalid cheat code: {0}")]
    InvalidCheat(String),
    #[error("cartridge RAM is {expected} bytes, got {got}")]
    RamSizeMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
