//! Flag computation for the Z80 arithmetic, logic and shift groups.
//!
//! Bits 3 and 5 of F (X/Y) are not documented by Zilog but software does
//! observe them, so every operation copies them the way the silicon does.

use super::{CpuZ80, MemoryZ80};

pub const FLAG_C: u8 = 0x01;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_X: u8 = 0x08;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_Y: u8 = 0x20;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_S: u8 = 0x80;

const FLAGS_XY: u8 = FLAG_X | FLAG_Y;

const fn build_sz53p() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        let mut f = v & (FLAG_S | FLAG_Y | FLAG_X);
        if v == 0 {
            f |= FLAG_Z;
        }
        if v.count_ones() % 2 == 0 {
            f |= FLAG_PV;
        }
        table[i] = f;
        i += 1;
    }
    table
}

/// S, Z, X, Y and parity for every byte value.
pub(super) static SZ53P: [u8; 256] = build_sz53p();

#[inline]
pub(super) fn sz53(v: u8) -> u8 {
    SZ53P[v as usize] & !FLAG_PV
}

#[inline]
pub(super) fn parity(v: u8) -> u8 {
    SZ53P[v as usize] & FLAG_PV
}

impl<M: MemoryZ80> CpuZ80<M> {
    pub(super) fn add8(&mut self, v: u8, carry: bool) {
        let a = self.a;
        let sum = a as u16 + v as u16 + carry as u16;
        let r = sum as u8;
        let mut f = sz53(r) | ((a ^ v ^ r) & FLAG_H);
        if sum > 0xFF {
            f |= FLAG_C;
        }
        if (a ^ !v) & (a ^ r) & 0x80 != 0 {
            f |= FLAG_PV;
        }
        self.a = r;
        self.f = f;
    }

    fn sub_flags(&mut self, v: u8, carry: bool) -> u8 {
        let a = self.a;
        let diff = a as i16 - v as i16 - carry as i16;
        let r = diff as u8;
        let mut f = FLAG_N | sz53(r) | ((a ^ v ^ r) & FLAG_H);
        if diff < 0 {
            f |= FLAG_C;
        }
        if (a ^ v) & (a ^ r) & 0x80 != 0 {
            f |= FLAG_PV;
        }
        self.f = f;
        r
    }

    pub(super) fn sub8(&mut self, v: u8, carry: bool) {
        self.a = self.sub_flags(v, carry);
    }

    /// CP takes X/Y from the operand, not the result.
    pub(super) fn cp8(&mut self, v: u8) {
        self.sub_flags(v, false);
        self.f = (self.f & !FLAGS_XY) | (v & FLAGS_XY);
    }

    pub(super) fn and8(&mut self, v: u8) {
        self.a &= v;
        self.f = SZ53P[self.a as usize] | FLAG_H;
    }

    pub(super) fn xor8(&mut self, v: u8) {
        self.a ^= v;
        self.f = SZ53P[self.a as usize];
    }

    pub(super) fn or8(&mut self, v: u8) {
        self.a |= v;
        self.f = SZ53P[self.a as usize];
    }

    /// Dispatch for the ALU group (`y` field of 0x80-0xBF / 0xC6-0xFE).
    pub(super) fn alu(&mut self, op: u8, v: u8) {
        let carry = self.f & FLAG_C != 0;
        match op & 7 {
            0 => self.add8(v, false),
            1 => self.add8(v, carry),
            2 => self.sub8(v, false),
            3 => self.sub8(v, carry),
            4 => self.and8(v),
            5 => self.xor8(v),
            6 => self.or8(v),
            _ => self.cp8(v),
        }
    }

    pub(super) fn inc8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        let mut f = (self.f & FLAG_C) | sz53(r);
        if v == 0x7F {
            f |= FLAG_PV;
        }
        if v & 0x0F == 0x0F {
            f |= FLAG_H;
        }
        self.f = f;
        r
    }

    pub(super) fn dec8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        let mut f = (self.f & FLAG_C) | FLAG_N | sz53(r);
        if v == 0x80 {
            f |= FLAG_PV;
        }
        if v & 0x0F == 0 {
            f |= FLAG_H;
        }
        self.f = f;
        r
    }

    /// ADD HL/IX/IY,rr: S, Z and P/V are preserved.
    pub(super) fn add16(&mut self, a: u16, b: u16) -> u16 {
        let sum = a as u32 + b as u32;
        let r = sum as u16;
        let mut f = self.f & (FLAG_S | FLAG_Z | FLAG_PV);
        f |= (((a ^ b ^ r) >> 8) as u8) & FLAG_H;
        f |= ((r >> 8) as u8) & FLAGS_XY;
        if sum > 0xFFFF {
            f |= FLAG_C;
        }
        self.f = f;
        self.wz = a.wrapping_add(1);
        r
    }

    pub(super) fn adc16(&mut self, v: u16) {
        let hl = self.hl();
        let sum = hl as u32 + v as u32 + (self.f & FLAG_C) as u32;
        let r = sum as u16;
        let mut f = ((r >> 8) as u8) & (FLAG_S | FLAGS_XY);
        f |= (((hl ^ v ^ r) >> 8) as u8) & FLAG_H;
        if r == 0 {
            f |= FLAG_Z;
        }
        if sum > 0xFFFF {
            f |= FLAG_C;
        }
        if (hl ^ !v) & (hl ^ r) & 0x8000 != 0 {
            f |= FLAG_PV;
        }
        self.f = f;
        self.wz = hl.wrapping_add(1);
        self.set_hl(r);
    }

    pub(super) fn sbc16(&mut self, v: u16) {
        let hl = self.hl();
        let diff = hl as i32 - v as i32 - (self.f & FLAG_C) as i32;
        let r = diff as u16;
        let mut f = FLAG_N | (((r >> 8) as u8) & (FLAG_S | FLAGS_XY));
        f |= (((hl ^ v ^ r) >> 8) as u8) & FLAG_H;
        if r == 0 {
            f |= FLAG_Z;
        }
        if diff < 0 {
            f |= FLAG_C;
        }
        if (hl ^ v) & (hl ^ r) & 0x8000 != 0 {
            f |= FLAG_PV;
        }
        self.f = f;
        self.wz = hl.wrapping_add(1);
        self.set_hl(r);
    }

    pub(super) fn daa(&mut self) {
        let a = self.a;
        let mut correction = 0u8;
        let mut carry = self.f & FLAG_C != 0;
        if self.f & FLAG_H != 0 || a & 0x0F > 9 {
            correction |= 0x06;
        }
        if carry || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let subtract = self.f & FLAG_N != 0;
        let (r, half) = if subtract {
            (a.wrapping_sub(correction), self.f & FLAG_H != 0 && a & 0x0F < 6)
        } else {
            (a.wrapping_add(correction), a & 0x0F > 9)
        };
        let mut f = SZ53P[r as usize] | (self.f & FLAG_N);
        if half {
            f |= FLAG_H;
        }
        if carry {
            f |= FLAG_C;
        }
        self.a = r;
        self.f = f;
    }

    /// RLCA/RRCA/RLA/RRA: only C, H, N and X/Y change.
    pub(super) fn rotate_a(&mut self, y: u8) {
        let a = self.a;
        let carry_in = self.f & FLAG_C;
        let (r, carry_out) = match y {
            0 => (a.rotate_left(1), a >> 7),
            1 => (a.rotate_right(1), a & 1),
            2 => ((a << 1) | carry_in, a >> 7),
            _ => ((a >> 1) | (carry_in << 7), a & 1),
        };
        self.a = r;
        self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | (r & FLAGS_XY) | carry_out;
    }

    /// CB rotate/shift group selected by `y`; SLL (y = 6) is undocumented.
    pub(super) fn shift(&mut self, y: u8, v: u8) -> u8 {
        let carry_in = self.f & FLAG_C;
        let (r, carry_out) = match y {
            0 => (v.rotate_left(1), v >> 7),
            1 => (v.rotate_right(1), v & 1),
            2 => ((v << 1) | carry_in, v >> 7),
            3 => ((v >> 1) | (carry_in << 7), v & 1),
            4 => (v << 1, v >> 7),
            5 => ((v >> 1) | (v & 0x80), v & 1),
            6 => ((v << 1) | 1, v >> 7),
            _ => (v >> 1, v & 1),
        };
        self.f = SZ53P[r as usize] | carry_out;
        r
    }

    /// BIT n: X/Y come from `xy`, which depends on the addressing form.
    pub(super) fn bit(&mut self, n: u8, v: u8, xy: u8) {
        let set = v & (1 << n);
        let mut f = (self.f & FLAG_C) | FLAG_H | (xy & FLAGS_XY);
        if set == 0 {
            f |= FLAG_Z | FLAG_PV;
        } else if n == 7 {
            f |= FLAG_S;
        }
        self.f = f;
    }

    pub(super) fn cpl(&mut self) {
        self.a = !self.a;
        self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C))
            | FLAG_H
            | FLAG_N
            | (self.a & FLAGS_XY);
    }

    pub(super) fn scf(&mut self) {
        self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | FLAG_C | (self.a & FLAGS_XY);
    }

    pub(super) fn ccf(&mut self) {
        let flipped = if self.f & FLAG_C != 0 { FLAG_H } else { FLAG_C };
        self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | flipped | (self.a & FLAGS_XY);
    }

    /// Flags after `IN r,(C)`.
    pub(super) fn in_flags(&mut self, v: u8) {
        self.f = (self.f & FLAG_C) | SZ53P[v as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_table() {
        assert_eq!(parity(0x00), FLAG_PV);
        assert_eq!(parity(0x01), 0);
        assert_eq!(parity(0x03), FLAG_PV);
        assert_eq!(SZ53P[0x00] & FLAG_Z, FLAG_Z);
        assert_eq!(SZ53P[0x80] & FLAG_S, FLAG_S);
        assert_eq!(SZ53P[0x28] & FLAGS_XY, FLAGS_XY);
    }
}
