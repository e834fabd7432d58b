//! Zilog Z80 CPU core implementation
//!
//! A complete instruction-level Z80: all documented opcodes, the
//! undocumented ones games rely on (IXH/IXL access, SLL, DDCB register
//! copies, ED mirrors), the X/Y flag bits, interrupt modes 0/1/2, NMI and the
//! one-instruction `EI` shadow. `step` returns the T-states consumed.

mod alu;
mod execute;
mod timing;


use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};

pub use alu::{FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Y, FLAG_Z};

/// Memory interface trait for the Z80 CPU
pub trait MemoryZ80 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Read from I/O port. The full 16-bit address is on the bus; most
    /// devices only decode the low byte.
    fn io_read(&mut self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to I/O port
    fn io_write(&mut self, port: u16, val: u8) {
        let _ = (port, val);
    }

    /// Byte placed on the data bus during an interrupt acknowledge.
    /// Nothing drives the bus on Sega hardware, so it floats to 0xFF.
    fn interrupt_vector(&mut self) -> u8 {
        0xFF
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("unimplemented opcode {prefix:02X} {opcode:02X} at {pc:04X}")]
    UnimplementedOpcode { prefix: u8, opcode: u8, pc: u16 },
}

/// Register file selected by a DD/FD prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    HL,
    IX,
    IY,
}

/// Running totals of opcodes that only alias another instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeAudit {
    /// Undocumented opcodes executed through the instruction they mirror
    pub undocumented: u64,
    /// Unassigned opcodes executed as no-ops (lenient mode only)
    pub unassigned: u64,
    /// Prefix, opcode and PC of the most recent flagged instruction
    pub last: Option<(u8, u8, u16)>,
}

/// Serializable snapshot of everything that influences execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Z80Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_prime: u16,
    pub bc_prime: u16,
    pub de_prime: u16,
    pub hl_prime: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub wz: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
    pub irq_line: bool,
    pub nmi_pending: bool,
    pub ei_pending: bool,
    pub cycles: u64,
}

/// Zilog Z80 CPU state
#[derive(Debug)]
pub struct CpuZ80<M: MemoryZ80> {
    /// Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    /// Alternate register set
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,

    pub ix: u16,
    pub iy: u16,

    /// Interrupt vector base
    pub i: u8,
    /// Memory refresh counter; bit 7 only changes through `LD R,A`
    pub r: u8,

    pub sp: u16,
    pub pc: u16,

    /// Internal MEMPTR register, visible through the X/Y bits of `BIT n,(HL)`
    pub wz: u16,

    pub iff1: bool,
    pub iff2: bool,
    /// Interrupt mode (0, 1, or 2)
    pub im: u8,

    pub halted: bool,
    pub cycles: u64,

    irq_line: bool,
    nmi_pending: bool,
    ei_pending: bool,
    strict_opcodes: bool,
    audit: OpcodeAudit,

    /// Memory interface
    pub memory: M,
}

impl<M: MemoryZ80> CpuZ80<M> {
    /// Create a new Z80 in its power-on state
    pub fn new(memory: M) -> Self {
        let mut cpu = Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_prime: 0,
            f_prime: 0,
            b_prime: 0,
            c_prime: 0,
            d_prime: 0,
            e_prime: 0,
            h_prime: 0,
            l_prime: 0,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            sp: 0,
            pc: 0,
            wz: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            cycles: 0,
            irq_line: false,
            nmi_pending: false,
            ei_pending: false,
            strict_opcodes: false,
            audit: OpcodeAudit::default(),
            memory,
        };
        cpu.reset();
        cpu
    }

    /// Reset to the hardware-defined state. Only AF, SP and the control
    /// registers are defined by the silicon; the rest is zeroed so runs are
    /// reproducible.
    pub fn reset(&mut self) {
        self.a = 0xFF;
        self.f = 0xFF;
        self.set_bc(0);
        self.set_de(0);
        self.set_hl(0);
        self.a_prime = 0;
        self.f_prime = 0;
        self.b_prime = 0;
        self.c_prime = 0;
        self.d_prime = 0;
        self.e_prime = 0;
        self.h_prime = 0;
        self.l_prime = 0;
        self.ix = 0xFFFF;
        self.iy = 0xFFFF;
        self.sp = 0xFFFF;
        self.pc = 0;
        self.wz = 0;
        self.i = 0;
        self.r = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.halted = false;
        self.cycles = 0;
        self.irq_line = false;
        self.nmi_pending = false;
        self.ei_pending = false;
    }

    /// Make unassigned opcodes fatal instead of executing them as no-ops.
    pub fn set_strict_opcodes(&mut self, strict: bool) {
        self.strict_opcodes = strict;
    }

    pub fn audit(&self) -> &OpcodeAudit {
        &self.audit
    }

    /// Level of the maskable interrupt line (active while `true`).
    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    /// Latch a falling edge on /NMI; serviced before the next instruction.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Execute one instruction (or an interrupt acknowledge) and return the
    /// T-states consumed.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        let cycles = if self.nmi_pending {
            self.nmi_pending = false;
            self.service_nmi()
        } else if self.irq_line && self.iff1 && !self.ei_pending {
            self.service_irq()?
        } else {
            self.ei_pending = false;
            if self.halted {
                self.inc_r();
                4
            } else {
                let start = self.pc;
                let opcode = self.fetch_opcode();
                match self.execute_main(opcode, Index::HL) {
                    Ok(cycles) => cycles,
                    Err(err) => {
                        self.pc = start;
                        return Err(err);
                    }
                }
            }
        };
        self.cycles += cycles as u64;
        Ok(cycles)
    }

    fn service_nmi(&mut self) -> u32 {
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("Z80: NMI at PC={:04X}", self.pc)
        });
        self.halted = false;
        self.iff1 = false;
        self.inc_r();
        self.push(self.pc);
        self.pc = 0x0066;
        self.wz = self.pc;
        11
    }

    fn service_irq(&mut self) -> Result<u32, CpuError> {
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("Z80: IRQ (IM {}) at PC={:04X}", self.im, self.pc)
        });
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        self.inc_r();
        let data = self.memory.interrupt_vector();
        let cycles = match self.im {
            0 => 2 + self.execute_main(data, Index::HL)?,
            1 => {
                self.push(self.pc);
                self.pc = 0x0038;
                self.wz = self.pc;
                13
            }
            _ => {
                self.push(self.pc);
                let vector = ((self.i as u16) << 8) | data as u16;
                self.pc = self.read_u16(vector);
                self.wz = self.pc;
                19
            }
        };
        Ok(cycles)
    }

    /// Copy of the register file for save states.
    pub fn registers(&self) -> Z80Registers {
        Z80Registers {
            af: self.af(),
            bc: self.bc(),
            de: self.de(),
            hl: self.hl(),
            af_prime: u16::from_be_bytes([self.a_prime, self.f_prime]),
            bc_prime: u16::from_be_bytes([self.b_prime, self.c_prime]),
            de_prime: u16::from_be_bytes([self.d_prime, self.e_prime]),
            hl_prime: u16::from_be_bytes([self.h_prime, self.l_prime]),
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            wz: self.wz,
            i: self.i,
            r: self.r,
            iff1: self.iff1,
            iff2: self.iff2,
            im: self.im,
            halted: self.halted,
            irq_line: self.irq_line,
            nmi_pending: self.nmi_pending,
            ei_pending: self.ei_pending,
            cycles: self.cycles,
        }
    }

    pub fn set_registers(&mut self, regs: &Z80Registers) {
        self.set_af(regs.af);
        self.set_bc(regs.bc);
        self.set_de(regs.de);
        self.set_hl(regs.hl);
        [self.a_prime, self.f_prime] = regs.af_prime.to_be_bytes();
        [self.b_prime, self.c_prime] = regs.bc_prime.to_be_bytes();
        [self.d_prime, self.e_prime] = regs.de_prime.to_be_bytes();
        [self.h_prime, self.l_prime] = regs.hl_prime.to_be_bytes();
        self.ix = regs.ix;
        self.iy = regs.iy;
        self.sp = regs.sp;
        self.pc = regs.pc;
        self.wz = regs.wz;
        self.i = regs.i;
        self.r = regs.r;
        self.iff1 = regs.iff1;
        self.iff2 = regs.iff2;
        self.im = regs.im;
        self.halted = regs.halted;
        self.irq_line = regs.irq_line;
        self.nmi_pending = regs.nmi_pending;
        self.ei_pending = regs.ei_pending;
        self.cycles = regs.cycles;
    }

    // Register pairs

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_af(&mut self, v: u16) {
        [self.a, self.f] = v.to_be_bytes();
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn set_bc(&mut self, v: u16) {
        [self.b, self.c] = v.to_be_bytes();
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn set_de(&mut self, v: u16) {
        [self.d, self.e] = v.to_be_bytes();
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_hl(&mut self, v: u16) {
        [self.h, self.l] = v.to_be_bytes();
    }

    fn index_reg(&self, idx: Index) -> u16 {
        match idx {
            Index::HL => self.hl(),
            Index::IX => self.ix,
            Index::IY => self.iy,
        }
    }

    fn set_index_reg(&mut self, idx: Index, v: u16) {
        match idx {
            Index::HL => self.set_hl(v),
            Index::IX => self.ix = v,
            Index::IY => self.iy = v,
        }
    }

    // Memory helpers

    fn inc_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    /// M1 cycle: opcode fetch with refresh.
    fn fetch_opcode(&mut self) -> u8 {
        self.inc_r();
        self.read_pc()
    }

    fn read_pc(&mut self) -> u8 {
        let v = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    fn read_pc_u16(&mut self) -> u16 {
        let lo = self.read_pc();
        let hi = self.read_pc();
        u16::from_le_bytes([lo, hi])
    }

    fn read_u16(&self, addr: u16) -> u16 {
        let lo = self.memory.read(addr);
        let hi = self.memory.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn write_u16(&mut self, addr: u16, v: u16) {
        let [lo, hi] = v.to_le_bytes();
        self.memory.write(addr, lo);
        self.memory.write(addr.wrapping_add(1), hi);
    }

    fn push(&mut self, v: u16) {
        let [lo, hi] = v.to_le_bytes();
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, hi);
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let v = self.read_u16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        v
    }

    fn flag_undocumented(&mut self, prefix: u8, opcode: u8, pc: u16) {
        self.audit.undocumented += 1;
        self.audit.last = Some((prefix, opcode, pc));
        log(LogCategory::Stubs, LogLevel::Debug, || {
            format!("Z80: undocumented opcode {:02X} {:02X} at {:04X}", prefix, opcode, pc)
        });
    }
}

/// A CPU-like component that can be stepped
impl<M: MemoryZ80> crate::Cpu for CpuZ80<M> {
    type Error = CpuError;

    fn reset(&mut self) {
        CpuZ80::reset(self);
    }

    fn step(&mut self) -> Result<u32, CpuError> {
        CpuZ80::step(self)
    }
}
