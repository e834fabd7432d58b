//! Binary save states.
//!
//! Layout: `SMSQ` magic, u32 LE format version, u32 LE ROM checksum, then
//! the component states encoded with bincode (legacy fixed-int layout).
//! The ROM image itself is never stored.

use emu_core::cpu_z80::Z80Registers;
use serde::{Deserialize, Serialize};

use crate::audio::SmsAudio;
use crate::error::SmsError;
use crate::input::Input;
use crate::mappers::Mapper;
use crate::vdp::Vdp;

pub const STATE_MAGIC: &[u8; 4] = b"SMSQ";
pub const STATE_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

/// Borrowed view of the machine, serialized field for field like [`State`].
#[derive(Serialize)]
pub(crate) struct StateRef<'a> {
    pub cpu: Z80Registers,
    pub memory: MemoryRef<'a>,
    pub vdp: &'a Vdp,
    pub audio: &'a SmsAudio,
    pub input: &'a Input,
    pub frame_count: u64,
    pub frame_cycle: u32,
}

#[derive(Serialize)]
pub(crate) struct MemoryRef<'a> {
    pub ram: &'a [u8],
    pub mapper: &'a Mapper,
    pub bios_mapped: bool,
    pub memory_control: u8,
}

#[derive(Deserialize)]
pub(crate) struct State {
    pub cpu: Z80Registers,
    pub memory: MemoryState,
    pub vdp: Vdp,
    pub audio: SmsAudio,
    pub input: Input,
    pub frame_count: u64,
    pub frame_cycle: u32,
}

#[derive(Deserialize)]
pub(crate) struct MemoryState {
    pub ram: Vec<u8>,
    pub mapper: Mapper,
    pub bios_mapped: bool,
    pub memory_control: u8,
}

pub(crate) fn encode(crc32: u32, state: &StateRef) -> Result<Vec<u8>, SmsError> {
    let payload = bincode::serde::encode_to_vec(state, bincode::config::legacy())
        .map_err(|e| SmsError::StateEncode(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(STATE_MAGIC);
    out.extend_from_slice(&STATE_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Validate the header against the loaded ROM and decode the payload.
pub(crate) fn decode(buf: &[u8], crc32: u32) -> Result<State, SmsError> {
    if buf.len() < HEADER_LEN {
        return Err(SmsError::StateTooSmall(buf.len()));
    }
    if &buf[0..4] != STATE_MAGIC {
        return Err(SmsError::StateMagic);
    }
    let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    let version = word(4);
    if version != STATE_VERSION {
        return Err(SmsError::StateVersion(version));
    }
    let found = word(8);
    if found != crc32 {
        return Err(SmsError::StateChecksum {
            expected: crc32,
            found,
        });
    }
    let (state, _) = bincode::serde::decode_from_slice::<State, _>(&buf[HEADER_LEN..], bincode::config::legacy())
        .map_err(|e| SmsError::StateDecode(e.to_string()))?;
    Ok(state)
}
