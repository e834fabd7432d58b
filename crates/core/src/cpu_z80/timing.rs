//! T-state costs for every Z80 opcode group.
//!
//! Values are the "not taken" costs; conditional instructions add their
//! taken penalty at execution time (see the `*_TAKEN` constants).

#[rustfmt::skip]
pub(super) const CYCLES_MAIN: [u8; 256] = [
//  0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
    4, 10,  7,  6,  4,  4,  7,  4,  4, 11,  7,  6,  4,  4,  7,  4, // 0x00
    8, 10,  7,  6,  4,  4,  7,  4, 12, 11,  7,  6,  4,  4,  7,  4, // 0x10
    7, 10, 16,  6,  4,  4,  7,  4,  7, 11, 16,  6,  4,  4,  7,  4, // 0x20
    7, 10, 13,  6, 11, 11, 10,  4,  7, 11, 13,  6,  4,  4,  7,  4, // 0x30
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0x40
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0x50
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0x60
    7,  7,  7,  7,  7,  7,  4,  7,  4,  4,  4,  4,  4,  4,  7,  4, // 0x70
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0x80
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0x90
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0xA0
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 0xB0
    5, 10, 10, 10, 10, 11,  7, 11,  5, 10, 10,  0, 10, 17,  7, 11, // 0xC0
    5, 10, 10, 11, 10, 11,  7, 11,  5,  4, 10, 11, 10,  0,  7, 11, // 0xD0
    5, 10, 10, 19, 10, 11,  7, 11,  5,  4, 10,  4, 10,  0,  7, 11, // 0xE0
    5, 10, 10,  4, 10, 11,  7, 11,  5,  6, 10,  4, 10,  0,  7, 11, // 0xF0
];

/// Extra cost of a taken `JR cc` / `DJNZ`.
pub(super) const JR_TAKEN: u32 = 5;
/// Extra cost of a taken `CALL cc`.
pub(super) const CALL_TAKEN: u32 = 7;
/// Extra cost of a taken `RET cc`.
pub(super) const RET_TAKEN: u32 = 6;
/// Extra cost of a repeating block instruction (`LDIR` etc.) that loops.
pub(super) const BLOCK_REPEAT: u32 = 5;

/// Opcodes whose meaning changes under a DD/FD prefix (HL becomes IX/IY).
pub(super) const fn uses_index(op: u8) -> bool {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    match x {
        0 => matches!(
            op,
            0x09 | 0x19 | 0x29 | 0x39 | 0x21 | 0x22 | 0x23 | 0x24 | 0x25 | 0x26 | 0x2A | 0x2B
                | 0x2C | 0x2D | 0x2E | 0x34 | 0x35 | 0x36
        ),
        1 => op != 0x76 && (y == 4 || y == 5 || y == 6 || z == 4 || z == 5 || z == 6),
        2 => z == 4 || z == 5 || z == 6,
        _ => matches!(op, 0xE1 | 0xE3 | 0xE5 | 0xE9 | 0xF9),
    }
}

/// Whether the indexed form of `op` addresses memory through `(IX+d)`.
pub(super) const fn uses_displacement(op: u8) -> bool {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    match x {
        0 => matches!(op, 0x34 | 0x35 | 0x36),
        1 => op != 0x76 && (y == 6 || z == 6),
        2 => z == 6,
        _ => false,
    }
}

const fn build_index_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut op = 0;
    while op < 256 {
        let base = CYCLES_MAIN[op];
        table[op] = if op == 0x36 {
            base + 9
        } else if uses_displacement(op as u8) {
            base + 12
        } else {
            base + 4
        };
        op += 1;
    }
    table
}

/// DD/FD-prefixed costs, prefix fetch included.
pub(super) const CYCLES_INDEX: [u8; 256] = build_index_table();

const fn build_cb_table() -> [u8; 256] {
    let mut table = [8u8; 256];
    let mut op = 0;
    while op < 256 {
        if op & 7 == 6 {
            table[op] = if op >= 0x40 && op < 0x80 { 12 } else { 15 };
        }
        op += 1;
    }
    table
}

/// CB-prefixed costs, prefix fetch included.
pub(super) const CYCLES_CB: [u8; 256] = build_cb_table();

/// DDCB/FDCB costs: every form takes 23 T-states except BIT, which takes 20.
pub(super) const fn cycles_index_cb(op: u8) -> u32 {
    if op >= 0x40 && op < 0x80 {
        20
    } else {
        23
    }
}

const fn build_ed_table() -> [u8; 256] {
    let mut table = [8u8; 256];
    let mut op = 0x40;
    while op < 0x80 {
        table[op] = match op & 7 {
            0 | 1 => 12,
            2 => 15,
            3 => 20,
            4 | 6 => 8,
            5 => 14,
            _ => match op {
                0x47 | 0x4F | 0x57 | 0x5F => 9,
                0x67 | 0x6F => 18,
                _ => 8,
            },
        };
        op += 1;
    }
    let mut op = 0xA0;
    while op < 0xC0 {
        if op & 7 < 4 {
            table[op] = 16;
        }
        op += 1;
    }
    table
}

/// ED-prefixed costs, prefix fetch included; unassigned opcodes cost 8.
pub(super) const CYCLES_ED: [u8; 256] = build_ed_table();

/// ED opcodes with a defined (documented or aliased) behaviour.
pub(super) const fn ed_is_assigned(op: u8) -> bool {
    (op >= 0x40 && op < 0x80) || (op >= 0xA0 && op < 0xC0 && op & 7 < 4)
}

/// ED opcodes that only mirror another instruction.
pub(super) const fn ed_is_undocumented(op: u8) -> bool {
    matches!(
        op,
        0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C // NEG
            | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D // RETN
            | 0x4E | 0x66 | 0x6E | 0x76 | 0x7E // IM
            | 0x70 | 0x71 | 0x77 | 0x7F
    )
}
