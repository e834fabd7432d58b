//! Opcode decoding.
//!
//! Opcodes are split into the x/y/z/p/q fields Zilog's encoding is built on
//! (`x = op >> 6`, `y = (op >> 3) & 7`, `z = op & 7`, `p = y >> 1`,
//! `q = y & 1`); cycle costs come from the tables in `timing`.

use super::alu::{parity, sz53, FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Y, FLAG_Z};
use super::timing::{
    cycles_index_cb, ed_is_assigned, ed_is_undocumented, uses_index, BLOCK_REPEAT, CALL_TAKEN,
    CYCLES_CB, CYCLES_ED, CYCLES_INDEX, CYCLES_MAIN, JR_TAKEN, RET_TAKEN,
};
use super::{CpuError, CpuZ80, Index, MemoryZ80};
use crate::logging::{log, LogCategory, LogLevel};

impl<M: MemoryZ80> CpuZ80<M> {
    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => self.f & FLAG_Z == 0,
            1 => self.f & FLAG_Z != 0,
            2 => self.f & FLAG_C == 0,
            3 => self.f & FLAG_C != 0,
            4 => self.f & FLAG_PV == 0,
            5 => self.f & FLAG_PV != 0,
            6 => self.f & FLAG_S == 0,
            _ => self.f & FLAG_S != 0,
        }
    }

    /// 8-bit register by encoding (B, C, D, E, H, L, -, A). Under a DD/FD
    /// prefix H and L become the halves of the index register.
    fn reg(&self, r: u8, idx: Index) -> u8 {
        match r {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => match idx {
                Index::HL => self.h,
                Index::IX => (self.ix >> 8) as u8,
                Index::IY => (self.iy >> 8) as u8,
            },
            5 => match idx {
                Index::HL => self.l,
                Index::IX => self.ix as u8,
                Index::IY => self.iy as u8,
            },
            _ => self.a,
        }
    }

    fn set_reg(&mut self, r: u8, idx: Index, v: u8) {
        match r {
            0 => self.b = v,
            1 => self.c = v,
            2 => self.d = v,
            3 => self.e = v,
            4 => match idx {
                Index::HL => self.h = v,
                Index::IX => self.ix = (self.ix & 0x00FF) | ((v as u16) << 8),
                Index::IY => self.iy = (self.iy & 0x00FF) | ((v as u16) << 8),
            },
            5 => match idx {
                Index::HL => self.l = v,
                Index::IX => self.ix = (self.ix & 0xFF00) | v as u16,
                Index::IY => self.iy = (self.iy & 0xFF00) | v as u16,
            },
            _ => self.a = v,
        }
    }

    /// Register pair for the `rp` table (BC, DE, HL/IX/IY, SP).
    fn rp(&self, p: u8, idx: Index) -> u16 {
        match p {
            0 => self.bc(),
            1 => self.de(),
            2 => self.index_reg(idx),
            _ => self.sp,
        }
    }

    fn set_rp(&mut self, p: u8, idx: Index, v: u16) {
        match p {
            0 => self.set_bc(v),
            1 => self.set_de(v),
            2 => self.set_index_reg(idx, v),
            _ => self.sp = v,
        }
    }

    /// Register pair for the `rp2` table (BC, DE, HL/IX/IY, AF).
    fn rp2(&self, p: u8, idx: Index) -> u16 {
        if p == 3 {
            self.af()
        } else {
            self.rp(p, idx)
        }
    }

    fn set_rp2(&mut self, p: u8, idx: Index, v: u16) {
        if p == 3 {
            self.set_af(v)
        } else {
            self.set_rp(p, idx, v)
        }
    }

    /// Effective address of the `(HL)` operand; fetches the displacement
    /// for `(IX+d)` / `(IY+d)`.
    fn operand_addr(&mut self, idx: Index) -> u16 {
        match idx {
            Index::HL => self.hl(),
            _ => {
                let d = self.read_pc() as i8;
                let addr = self.index_reg(idx).wrapping_add(d as u16);
                self.wz = addr;
                addr
            }
        }
    }

    fn jr(&mut self) {
        let d = self.read_pc() as i8;
        self.pc = self.pc.wrapping_add(d as u16);
        self.wz = self.pc;
    }

    /// Execute an already-fetched unprefixed opcode (or the DD/FD form when
    /// `idx` names an index register).
    pub(super) fn execute_main(&mut self, op: u8, idx: Index) -> Result<u32, CpuError> {
        let mut cycles = if idx == Index::HL {
            CYCLES_MAIN[op as usize] as u32
        } else {
            CYCLES_INDEX[op as usize] as u32
        };
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => match z {
                0 => match y {
                    0 => {}
                    1 => {
                        std::mem::swap(&mut self.a, &mut self.a_prime);
                        std::mem::swap(&mut self.f, &mut self.f_prime);
                    }
                    2 => {
                        self.b = self.b.wrapping_sub(1);
                        if self.b != 0 {
                            self.jr();
                            cycles += JR_TAKEN;
                        } else {
                            self.pc = self.pc.wrapping_add(1);
                        }
                    }
                    3 => self.jr(),
                    _ => {
                        if self.condition(y - 4) {
                            self.jr();
                            cycles += JR_TAKEN;
                        } else {
                            self.pc = self.pc.wrapping_add(1);
                        }
                    }
                },
                1 => {
                    if q == 0 {
                        let nn = self.read_pc_u16();
                        self.set_rp(p, idx, nn);
                    } else {
                        let target = self.index_reg(idx);
                        let r = self.add16(target, self.rp(p, idx));
                        self.set_index_reg(idx, r);
                    }
                }
                2 => match (q, p) {
                    (0, 0) => {
                        let addr = self.bc();
                        self.memory.write(addr, self.a);
                        self.wz = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0xFF);
                    }
                    (0, 1) => {
                        let addr = self.de();
                        self.memory.write(addr, self.a);
                        self.wz = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0xFF);
                    }
                    (0, 2) => {
                        let addr = self.read_pc_u16();
                        self.write_u16(addr, self.index_reg(idx));
                        self.wz = addr.wrapping_add(1);
                    }
                    (0, _) => {
                        let addr = self.read_pc_u16();
                        self.memory.write(addr, self.a);
                        self.wz = ((self.a as u16) << 8) | (addr.wrapping_add(1) & 0xFF);
                    }
                    (_, 0) => {
                        let addr = self.bc();
                        self.a = self.memory.read(addr);
                        self.wz = addr.wrapping_add(1);
                    }
                    (_, 1) => {
                        let addr = self.de();
                        self.a = self.memory.read(addr);
                        self.wz = addr.wrapping_add(1);
                    }
                    (_, 2) => {
                        let addr = self.read_pc_u16();
                        let v = self.read_u16(addr);
                        self.set_index_reg(idx, v);
                        self.wz = addr.wrapping_add(1);
                    }
                    _ => {
                        let addr = self.read_pc_u16();
                        self.a = self.memory.read(addr);
                        self.wz = addr.wrapping_add(1);
                    }
                },
                3 => {
                    let v = self.rp(p, idx);
                    let v = if q == 0 {
                        v.wrapping_add(1)
                    } else {
                        v.wrapping_sub(1)
                    };
                    self.set_rp(p, idx, v);
                }
                4 | 5 => {
                    if y == 6 {
                        let addr = self.operand_addr(idx);
                        let v = self.memory.read(addr);
                        let r = if z == 4 { self.inc8(v) } else { self.dec8(v) };
                        self.memory.write(addr, r);
                    } else {
                        let v = self.reg(y, idx);
                        let r = if z == 4 { self.inc8(v) } else { self.dec8(v) };
                        self.set_reg(y, idx, r);
                    }
                }
                6 => {
                    if y == 6 {
                        let addr = self.operand_addr(idx);
                        let n = self.read_pc();
                        self.memory.write(addr, n);
                    } else {
                        let n = self.read_pc();
                        self.set_reg(y, idx, n);
                    }
                }
                _ => match y {
                    0..=3 => self.rotate_a(y),
                    4 => self.daa(),
                    5 => self.cpl(),
                    6 => self.scf(),
                    _ => self.ccf(),
                },
            },
            1 => {
                if op == 0x76 {
                    self.halted = true;
                    log(LogCategory::CPU, LogLevel::Trace, || {
                        format!("Z80: HALT at PC={:04X}", self.pc.wrapping_sub(1))
                    });
                } else if y == 6 {
                    let addr = self.operand_addr(idx);
                    let v = self.reg(z, Index::HL);
                    self.memory.write(addr, v);
                } else if z == 6 {
                    let addr = self.operand_addr(idx);
                    let v = self.memory.read(addr);
                    self.set_reg(y, Index::HL, v);
                } else {
                    let v = self.reg(z, idx);
                    self.set_reg(y, idx, v);
                }
            }
            2 => {
                let v = if z == 6 {
                    let addr = self.operand_addr(idx);
                    self.memory.read(addr)
                } else {
                    self.reg(z, idx)
                };
                self.alu(y, v);
            }
            _ => match z {
                0 => {
                    if self.condition(y) {
                        self.pc = self.pop();
                        self.wz = self.pc;
                        cycles += RET_TAKEN;
                    }
                }
                1 => {
                    if q == 0 {
                        let v = self.pop();
                        self.set_rp2(p, idx, v);
                    } else {
                        match p {
                            0 => {
                                self.pc = self.pop();
                                self.wz = self.pc;
                            }
                            1 => self.exx(),
                            2 => self.pc = self.index_reg(idx),
                            _ => self.sp = self.index_reg(idx),
                        }
                    }
                }
                2 => {
                    let nn = self.read_pc_u16();
                    self.wz = nn;
                    if self.condition(y) {
                        self.pc = nn;
                    }
                }
                3 => match y {
                    0 => {
                        self.pc = self.read_pc_u16();
                        self.wz = self.pc;
                    }
                    1 => {
                        return Ok(match idx {
                            Index::HL => self.execute_cb(),
                            _ => self.execute_index_cb(idx),
                        })
                    }
                    2 => {
                        let n = self.read_pc();
                        let port = ((self.a as u16) << 8) | n as u16;
                        self.memory.io_write(port, self.a);
                        self.wz = ((self.a as u16) << 8) | (n.wrapping_add(1) as u16);
                    }
                    3 => {
                        let n = self.read_pc();
                        let port = ((self.a as u16) << 8) | n as u16;
                        self.wz = port.wrapping_add(1);
                        self.a = self.memory.io_read(port);
                    }
                    4 => {
                        let v = self.read_u16(self.sp);
                        self.write_u16(self.sp, self.index_reg(idx));
                        self.set_index_reg(idx, v);
                        self.wz = v;
                    }
                    5 => {
                        let de = self.de();
                        self.set_de(self.hl());
                        self.set_hl(de);
                    }
                    6 => {
                        self.iff1 = false;
                        self.iff2 = false;
                    }
                    _ => {
                        self.iff1 = true;
                        self.iff2 = true;
                        self.ei_pending = true;
                    }
                },
                4 => {
                    let nn = self.read_pc_u16();
                    self.wz = nn;
                    if self.condition(y) {
                        self.push(self.pc);
                        self.pc = nn;
                        cycles += CALL_TAKEN;
                    }
                }
                5 => {
                    if q == 0 {
                        self.push(self.rp2(p, idx));
                    } else {
                        match p {
                            0 => {
                                let nn = self.read_pc_u16();
                                self.push(self.pc);
                                self.pc = nn;
                                self.wz = nn;
                            }
                            1 => return self.execute_index(Index::IX),
                            2 => return self.execute_ed(),
                            _ => return self.execute_index(Index::IY),
                        }
                    }
                }
                6 => {
                    let n = self.read_pc();
                    self.alu(y, n);
                }
                _ => {
                    self.push(self.pc);
                    self.pc = (y as u16) * 8;
                    self.wz = self.pc;
                }
            },
        }
        Ok(cycles)
    }

    fn exx(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_prime);
        std::mem::swap(&mut self.c, &mut self.c_prime);
        std::mem::swap(&mut self.d, &mut self.d_prime);
        std::mem::swap(&mut self.e, &mut self.e_prime);
        std::mem::swap(&mut self.h, &mut self.h_prime);
        std::mem::swap(&mut self.l, &mut self.l_prime);
    }

    /// DD/FD prefix. A prefix followed by another prefix acts as a 4 T-state
    /// no-op; the following prefix is decoded by the next step.
    fn execute_index(&mut self, idx: Index) -> Result<u32, CpuError> {
        let prefix = if idx == Index::IX { 0xDD } else { 0xFD };
        let pc = self.pc.wrapping_sub(1);
        let op = self.memory.read(self.pc);
        if matches!(op, 0xDD | 0xFD) {
            self.flag_undocumented(prefix, op, pc);
            return Ok(4);
        }
        if op == 0xED {
            self.flag_undocumented(prefix, op, pc);
            self.fetch_opcode();
            return self.execute_ed().map(|cycles| cycles + 4);
        }
        self.fetch_opcode();
        if op != 0xCB && (!uses_index(op) || is_index_half_access(op)) {
            self.flag_undocumented(prefix, op, pc);
        }
        let idx = if uses_index(op) || op == 0xCB {
            idx
        } else {
            Index::HL
        };
        let cycles = self.execute_main(op, idx)?;
        Ok(if idx == Index::HL { cycles + 4 } else { cycles })
    }

    /// CB prefix: rotates, shifts and bit operations on r or (HL).
    fn execute_cb(&mut self) -> u32 {
        let op = self.fetch_opcode();
        let cycles = CYCLES_CB[op as usize] as u32;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;

        if x == 0 && y == 6 {
            self.flag_undocumented(0xCB, op, self.pc.wrapping_sub(2));
        }

        if z == 6 {
            let addr = self.hl();
            let v = self.memory.read(addr);
            match x {
                0 => {
                    let r = self.shift(y, v);
                    self.memory.write(addr, r);
                }
                1 => {
                    let xy = (self.wz >> 8) as u8;
                    self.bit(y, v, xy);
                }
                2 => self.memory.write(addr, v & !(1 << y)),
                _ => self.memory.write(addr, v | (1 << y)),
            }
        } else {
            let v = self.reg(z, Index::HL);
            match x {
                0 => {
                    let r = self.shift(y, v);
                    self.set_reg(z, Index::HL, r);
                }
                1 => self.bit(y, v, v),
                2 => self.set_reg(z, Index::HL, v & !(1 << y)),
                _ => self.set_reg(z, Index::HL, v | (1 << y)),
            }
        }
        cycles
    }

    /// DDCB/FDCB: `prefix CB d op`. The displacement precedes the opcode,
    /// and the final opcode byte is not an M1 fetch (no R increment).
    fn execute_index_cb(&mut self, idx: Index) -> u32 {
        let addr = self.operand_addr(idx);
        let op = self.read_pc();
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;

        if z != 6 || (x == 0 && y == 6) {
            let prefix = if idx == Index::IX { 0xDD } else { 0xFD };
            self.flag_undocumented(prefix, op, self.pc.wrapping_sub(4));
        }

        let v = self.memory.read(addr);
        let result = match x {
            0 => Some(self.shift(y, v)),
            1 => {
                self.bit(y, v, (addr >> 8) as u8);
                None
            }
            2 => Some(v & !(1 << y)),
            _ => Some(v | (1 << y)),
        };
        if let Some(r) = result {
            self.memory.write(addr, r);
            // Undocumented: the result is also copied into a register.
            if z != 6 {
                self.set_reg(z, Index::HL, r);
            }
        }
        cycles_index_cb(op)
    }

    /// ED prefix: extended instructions.
    pub(super) fn execute_ed(&mut self) -> Result<u32, CpuError> {
        let start = self.pc.wrapping_sub(1);
        let op = self.fetch_opcode();
        let mut cycles = CYCLES_ED[op as usize] as u32;

        if !ed_is_assigned(op) {
            if self.strict_opcodes {
                return Err(CpuError::UnimplementedOpcode {
                    prefix: 0xED,
                    opcode: op,
                    pc: start,
                });
            }
            self.audit.unassigned += 1;
            self.audit.last = Some((0xED, op, start));
            log(LogCategory::Stubs, LogLevel::Warn, || {
                format!("Z80: unassigned opcode ED {:02X} at {:04X}, executed as NOP", op, start)
            });
            return Ok(cycles);
        }
        if ed_is_undocumented(op) {
            self.flag_undocumented(0xED, op, start);
        }

        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        if op >= 0xA0 {
            cycles += self.block_op(op);
            return Ok(cycles);
        }

        match z {
            0 => {
                let port = self.bc();
                let v = self.memory.io_read(port);
                self.wz = port.wrapping_add(1);
                self.in_flags(v);
                if y != 6 {
                    self.set_reg(y, Index::HL, v);
                }
            }
            1 => {
                let port = self.bc();
                let v = if y == 6 { 0 } else { self.reg(y, Index::HL) };
                self.memory.io_write(port, v);
                self.wz = port.wrapping_add(1);
            }
            2 => {
                let v = self.rp(p, Index::HL);
                if q == 0 {
                    self.sbc16(v);
                } else {
                    self.adc16(v);
                }
            }
            3 => {
                let addr = self.read_pc_u16();
                if q == 0 {
                    self.write_u16(addr, self.rp(p, Index::HL));
                } else {
                    let v = self.read_u16(addr);
                    self.set_rp(p, Index::HL, v);
                }
                self.wz = addr.wrapping_add(1);
            }
            4 => {
                let a = self.a;
                self.a = 0;
                self.sub8(a, false);
            }
            5 => {
                // RETN and RETI both restore IFF1 from IFF2.
                self.iff1 = self.iff2;
                self.pc = self.pop();
                self.wz = self.pc;
            }
            6 => {
                self.im = match y & 3 {
                    0 | 1 => 0,
                    2 => 1,
                    _ => 2,
                };
            }
            _ => match y {
                0 => self.i = self.a,
                1 => self.r = self.a,
                2 | 3 => {
                    let v = if y == 2 { self.i } else { self.r };
                    self.a = v;
                    self.f = (self.f & FLAG_C) | sz53(v);
                    if self.iff2 {
                        self.f |= FLAG_PV;
                    }
                }
                4 => {
                    // RRD
                    let addr = self.hl();
                    let m = self.memory.read(addr);
                    self.memory.write(addr, (self.a << 4) | (m >> 4));
                    self.a = (self.a & 0xF0) | (m & 0x0F);
                    self.f = (self.f & FLAG_C) | sz53(self.a) | parity(self.a);
                    self.wz = addr.wrapping_add(1);
                }
                5 => {
                    // RLD
                    let addr = self.hl();
                    let m = self.memory.read(addr);
                    self.memory.write(addr, (m << 4) | (self.a & 0x0F));
                    self.a = (self.a & 0xF0) | (m >> 4);
                    self.f = (self.f & FLAG_C) | sz53(self.a) | parity(self.a);
                    self.wz = addr.wrapping_add(1);
                }
                _ => {}
            },
        }
        Ok(cycles)
    }

    /// LDI/CPI/INI/OUTI and their decrementing and repeating forms.
    /// Returns the extra cycles of a repeating iteration.
    fn block_op(&mut self, op: u8) -> u32 {
        let decrement = op & 0x08 != 0;
        let repeat = op & 0x10 != 0;
        let step = |v: u16| {
            if decrement {
                v.wrapping_sub(1)
            } else {
                v.wrapping_add(1)
            }
        };
        let hl = self.hl();

        let again = match op & 3 {
            0 => {
                let v = self.memory.read(hl);
                let de = self.de();
                self.memory.write(de, v);
                self.set_hl(step(hl));
                self.set_de(step(de));
                let bc = self.bc().wrapping_sub(1);
                self.set_bc(bc);
                let n = self.a.wrapping_add(v);
                let mut f = self.f & (FLAG_S | FLAG_Z | FLAG_C);
                f |= n & FLAG_X;
                if n & 0x02 != 0 {
                    f |= FLAG_Y;
                }
                if bc != 0 {
                    f |= FLAG_PV;
                }
                self.f = f;
                bc != 0
            }
            1 => {
                let v = self.memory.read(hl);
                let r = self.a.wrapping_sub(v);
                self.set_hl(step(hl));
                self.wz = step(self.wz);
                let bc = self.bc().wrapping_sub(1);
                self.set_bc(bc);
                let half = (self.a ^ v ^ r) & FLAG_H;
                let mut f = (self.f & FLAG_C) | FLAG_N | half | (sz53(r) & !(FLAG_X | FLAG_Y));
                let n = r.wrapping_sub((half != 0) as u8);
                f |= n & FLAG_X;
                if n & 0x02 != 0 {
                    f |= FLAG_Y;
                }
                if bc != 0 {
                    f |= FLAG_PV;
                }
                self.f = f;
                bc != 0 && r != 0
            }
            2 => {
                let port = self.bc();
                let v = self.memory.io_read(port);
                self.memory.write(hl, v);
                self.wz = step(port);
                self.b = self.b.wrapping_sub(1);
                self.set_hl(step(hl));
                let c = if decrement {
                    self.c.wrapping_sub(1)
                } else {
                    self.c.wrapping_add(1)
                };
                self.io_block_flags(v, c as u16 + v as u16);
                self.b != 0
            }
            _ => {
                let v = self.memory.read(hl);
                self.b = self.b.wrapping_sub(1);
                let port = self.bc();
                self.memory.io_write(port, v);
                self.wz = step(port);
                self.set_hl(step(hl));
                self.io_block_flags(v, self.l as u16 + v as u16);
                self.b != 0
            }
        };

        if repeat && again {
            self.pc = self.pc.wrapping_sub(2);
            self.wz = self.pc.wrapping_add(1);
            BLOCK_REPEAT
        } else {
            0
        }
    }

    fn io_block_flags(&mut self, v: u8, k: u16) {
        let mut f = sz53(self.b);
        if v & 0x80 != 0 {
            f |= FLAG_N;
        }
        if k > 0xFF {
            f |= FLAG_H | FLAG_C;
        }
        f |= parity((k as u8 & 7) ^ self.b);
        self.f = f;
    }
}

/// Indexed opcodes that touch IXH/IXL/IYH/IYL rather than `(IX+d)` or the
/// whole register: undocumented.
fn is_index_half_access(op: u8) -> bool {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    match x {
        0 => matches!(op, 0x24 | 0x25 | 0x26 | 0x2C | 0x2D | 0x2E),
        1 => y != 6 && z != 6 && (y == 4 || y == 5 || z == 4 || z == 5),
        2 => z == 4 || z == 5,
        _ => false,
    }
}
