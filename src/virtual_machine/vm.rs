//! Core virtual machine implementation.
//!
//! The VM owns a fixed 64 KiB arena and a 32-register file and executes the
//! RV64IM subset with a synchronous fetch-decode-execute loop. Environment
//! calls are dispatched to host-registered handlers; syscall code `0` is
//! reserved for orderly exit. A fatal condition (unknown instruction bits,
//! out-of-range memory access, unregistered syscall) reports through the
//! panic callback, forces exit code -1 and halts the loop.

use crate::virtual_machine::decoder::Instruction;
use crate::virtual_machine::errors::VmError;
use crate::virtual_machine::isa::{Opcode, alu, alu32, branch, load, op_imm, op_imm32, store, system};
use crate::virtual_machine::memory::{LOAD_OFFSET, MEM_SIZE, Memory};
use crate::virtual_machine::registers::{REG_A0, REG_A7, REG_SP, Registers};
use std::collections::HashMap;
use std::rc::Rc;

/// Syscall code reserved for orderly exit, handled by the VM itself.
pub const EXIT_SYSCALL: u64 = 0;

/// Host handler for an environment call. The handler may read and write
/// registers and memory through the VM handle and may call [`Vm::stop`];
/// its return value is stored into `a0`.
pub type SyscallFn = Rc<dyn Fn(&mut Vm) -> u64>;

type ExitFn = Box<dyn Fn(u64)>;
type PanicFn = Box<dyn Fn(&str)>;

/// RV64IM virtual machine.
///
/// Each instance owns its memory and registers for its whole lifetime;
/// multiple instances are fully independent. Execution is single-threaded
/// and synchronous: one instruction is an atomic step from the host's
/// perspective, and handlers run inline on the executing thread.
pub struct Vm {
    /// Byte-addressable arena holding code, data, heap and stack.
    memory: Memory,
    /// General-purpose register file.
    registers: Registers,
    /// Program counter; a multiple of 4 at every instruction boundary.
    pc: u64,
    /// True while the fetch-execute loop must continue.
    running: bool,
    /// Program-supplied exit status, or -1 after a fault.
    exit_code: i64,
    /// Host-registered environment call handlers, keyed by syscall code.
    syscalls: HashMap<u64, SyscallFn>,
    /// Invoked once with the exit status when the exit syscall fires.
    exit_callback: Option<ExitFn>,
    /// Invoked once per fault with a human-readable diagnostic.
    panic_callback: Option<PanicFn>,
}

impl Vm {
    /// Creates a VM in its initial state: zeroed arena and registers, PC at
    /// the load offset, exit code 0, not running, empty syscall table.
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            registers: Registers::new(),
            pc: LOAD_OFFSET,
            running: false,
            exit_code: 0,
            syscalls: HashMap::new(),
            exit_callback: None,
            panic_callback: None,
        }
    }

    /// Registers a callback invoked with the exit status just before the
    /// exit syscall halts the loop.
    pub fn set_exit_callback(&mut self, callback: impl Fn(u64) + 'static) {
        self.exit_callback = Some(Box::new(callback));
    }

    /// Registers a callback invoked with a diagnostic message whenever the
    /// executor faults. The VM halts with exit code -1 either way.
    pub fn set_panic_callback(&mut self, callback: impl Fn(&str) + 'static) {
        self.panic_callback = Some(Box::new(callback));
    }

    /// Copies a program image into memory at the load offset.
    ///
    /// Returns `false` when `data` is empty or too large for the arena. On
    /// success the stack pointer is set to the top of memory (the first
    /// push pre-decrements).
    pub fn load_from_bytes(&mut self, data: &[u8]) -> bool {
        let offset = LOAD_OFFSET as usize;
        if data.is_empty() || data.len() > MEM_SIZE - offset {
            return false;
        }
        self.memory.fill(offset, data);
        self.registers.set(REG_SP, MEM_SIZE as u64);
        true
    }

    /// Installs a handler for the given syscall code. Code `0` is reserved
    /// and never consulted in the table.
    pub fn set_system_call(&mut self, code: u64, handler: impl Fn(&mut Vm) -> u64 + 'static) {
        self.syscalls.insert(code, Rc::new(handler));
    }

    /// Looks up a registered syscall handler.
    pub fn get_system_call(&self, code: u64) -> Option<&SyscallFn> {
        self.syscalls.get(&code)
    }

    /// Value of argument register `a{index}` (syscall calling convention).
    pub fn get_pointer_param(&self, index: u64) -> u64 {
        self.registers.get(REG_A0 + index as usize)
    }

    /// Reads a NUL-terminated string from memory at `pointer`.
    ///
    /// Returns the literal `"(null)"` for a zero pointer. The read stops at
    /// the first zero byte or at the end of the arena, whichever comes
    /// first; bytes are decoded as UTF-8 with lossy replacement.
    pub fn get_string_pointer(&self, pointer: u64) -> String {
        if pointer == 0 {
            return "(null)".to_string();
        }
        let bytes = self.memory.as_slice();
        let start = pointer.min(bytes.len() as u64) as usize;
        let end = bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(bytes.len(), |nul| start + nul);
        String::from_utf8_lossy(&bytes[start..end]).into_owned()
    }

    /// Runs the fetch-decode-execute loop until the program exits, a
    /// handler calls [`Vm::stop`], or the executor faults.
    pub fn run(&mut self) {
        self.running = true;
        while self.running {
            if let Err(err) = self.step() {
                self.trap(&err.to_string());
            }
        }
    }

    /// Halts the loop after the current instruction.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Exit status: the program-supplied value, or -1 after a fault.
    pub fn get_exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Fault path: report through the panic callback, then halt with exit
    /// code -1. The loop never resumes past a fault in the same `run`.
    fn trap(&mut self, message: &str) {
        if let Some(callback) = &self.panic_callback {
            callback(message);
        }
        self.stop();
        self.exit_code = -1;
    }

    /// Executes one instruction: fetch at PC, decode, apply semantics,
    /// advance. Control-transfer instructions set PC themselves; everything
    /// else falls through to the +4 increment.
    fn step(&mut self) -> Result<(), VmError> {
        let word = self.memory.read32(self.pc)?;
        let inst = Instruction::decode(word)?;

        match inst.opcode {
            Opcode::Load => self.op_load(&inst)?,
            Opcode::Store => self.op_store(&inst)?,
            Opcode::OpImm => self.op_alu_imm(&inst)?,
            Opcode::OpImm32 => self.op_alu_imm32(&inst)?,
            Opcode::Op => self.op_alu(&inst)?,
            Opcode::Op32 => self.op_alu32(&inst)?,
            Opcode::Lui => self.op_lui(&inst),
            Opcode::Auipc => self.op_auipc(&inst),
            Opcode::MiscMem => {} // FENCE: nothing to order on an in-order machine
            Opcode::System => self.op_system(&inst)?,
            Opcode::Jal => return Ok(self.op_jal(&inst)),
            Opcode::Jalr => return Ok(self.op_jalr(&inst)),
            Opcode::Branch => return self.op_branch(&inst),
        }

        self.pc = self.pc.wrapping_add(4);
        Ok(())
    }

    fn op_load(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let addr = self
            .registers
            .get(inst.rs1())
            .wrapping_add(inst.imm_i() as u64);

        let value = match inst.funct3() {
            load::LB => self.memory.read8(addr)? as i8 as i64 as u64,
            load::LH => self.memory.read16(addr)? as i16 as i64 as u64,
            load::LW => self.memory.read32(addr)? as i32 as i64 as u64,
            load::LD => self.memory.read64(addr)?,
            load::LBU => self.memory.read8(addr)? as u64,
            load::LHU => self.memory.read16(addr)? as u64,
            load::LWU => self.memory.read32(addr)? as u64,
            funct3 => return Err(VmError::InvalidLoadWidth { funct3 }),
        };

        self.registers.set(inst.rd(), value);
        Ok(())
    }

    fn op_store(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let addr = self
            .registers
            .get(inst.rs1())
            .wrapping_add(inst.imm_s() as u64);
        let value = self.registers.get(inst.rs2());

        match inst.funct3() {
            store::SB => self.memory.write8(addr, value as u8),
            store::SH => self.memory.write16(addr, value as u16),
            store::SW => self.memory.write32(addr, value as u32),
            store::SD => self.memory.write64(addr, value),
            funct3 => Err(VmError::InvalidStoreWidth { funct3 }),
        }
    }

    fn op_alu_imm(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let a = self.registers.get(inst.rs1());
        let imm = inst.imm_i();

        let value = match inst.funct3() {
            op_imm::ADDI => a.wrapping_add(imm as u64),
            op_imm::SLLI => a << inst.shamt(),
            op_imm::SLTI => ((a as i64) < imm) as u64,
            op_imm::SLTIU => (a < imm as u64) as u64,
            op_imm::XORI => a ^ imm as u64,
            op_imm::SRLI => match inst.funct6() {
                op_imm::F6_LOGICAL => a >> inst.shamt(),
                op_imm::F6_ARITH => ((a as i64) >> inst.shamt()) as u64,
                funct6 => return Err(VmError::InvalidImmShift { funct6 }),
            },
            op_imm::ORI => a | imm as u64,
            op_imm::ANDI => a & imm as u64,
            _ => unreachable!("funct3 is three bits"),
        };

        self.registers.set(inst.rd(), value);
        Ok(())
    }

    /// Word-width immediate arithmetic: operate on the low 32 bits, then
    /// sign-extend the 32-bit result to 64.
    fn op_alu_imm32(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let a = self.registers.get(inst.rs1()) as i32;
        let shamt = inst.shamt_w();

        let value = match (inst.funct3(), inst.funct7()) {
            (op_imm32::ADDIW, _) => a.wrapping_add(inst.imm_i() as i32) as i64,
            (op_imm32::SLLIW, 0) => (((a as u32) << shamt) as i32) as i64,
            (op_imm32::SRLIW, op_imm32::F7_LOGICAL) => (((a as u32) >> shamt) as i32) as i64,
            (op_imm32::SRLIW, op_imm32::F7_ARITH) => (a >> shamt) as i64,
            (funct3, funct7) => return Err(VmError::InvalidImmOp32 { funct3, funct7 }),
        };

        self.registers.set(inst.rd(), value as u64);
        Ok(())
    }

    fn op_alu(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let a = self.registers.get(inst.rs1());
        let b = self.registers.get(inst.rs2());

        let value = match (inst.funct7() << 3) | inst.funct3() {
            alu::ADD => a.wrapping_add(b),
            alu::SUB => a.wrapping_sub(b),
            alu::SLL => a << (b & 0x3F),
            alu::SLT => ((a as i64) < b as i64) as u64,
            alu::SLTU => (a < b) as u64,
            alu::XOR => a ^ b,
            alu::SRL => a >> (b & 0x3F),
            alu::SRA => ((a as i64) >> (b & 0x3F)) as u64,
            alu::OR => a | b,
            alu::AND => a & b,
            alu::MUL => a.wrapping_mul(b),
            alu::MULH => (((a as i64 as i128) * (b as i64 as i128)) >> 64) as u64,
            alu::MULHSU => (((a as i64 as i128) * (b as i128)) >> 64) as u64,
            alu::MULHU => (((a as u128) * (b as u128)) >> 64) as u64,
            alu::DIV => {
                let (a, b) = (a as i64, b as i64);
                // x / 0 yields all-ones; INT64_MIN / -1 wraps to INT64_MIN.
                if b == 0 { -1i64 as u64 } else { a.wrapping_div(b) as u64 }
            }
            alu::DIVU => {
                if b == 0 { u64::MAX } else { a / b }
            }
            alu::REM => {
                let (a, b) = (a as i64, b as i64);
                // x % 0 yields x; INT64_MIN % -1 yields 0.
                if b == 0 { a as u64 } else { a.wrapping_rem(b) as u64 }
            }
            alu::REMU => {
                if b == 0 { a } else { a % b }
            }
            key => return Err(VmError::InvalidAluOp { key }),
        };

        self.registers.set(inst.rd(), value);
        Ok(())
    }

    /// Word-width register arithmetic: operands are the low 32 bits of the
    /// sources, the 32-bit result is sign-extended to 64. Shift amounts are
    /// masked to 5 bits.
    fn op_alu32(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let a = self.registers.get(inst.rs1()) as i32;
        let b = self.registers.get(inst.rs2()) as i32;
        let shamt = (b as u32) & 0x1F;

        let value = match (inst.funct7() << 3) | inst.funct3() {
            alu32::ADDW => a.wrapping_add(b) as i64,
            alu32::SUBW => a.wrapping_sub(b) as i64,
            alu32::SLLW => (((a as u32) << shamt) as i32) as i64,
            alu32::SRLW => (((a as u32) >> shamt) as i32) as i64,
            alu32::SRAW => (a >> shamt) as i64,
            alu32::MULW => a.wrapping_mul(b) as i64,
            alu32::DIVW => {
                if b == 0 { -1i64 } else { a.wrapping_div(b) as i64 }
            }
            alu32::DIVUW => {
                let (a, b) = (a as u32, b as u32);
                if b == 0 { -1i64 } else { ((a / b) as i32) as i64 }
            }
            alu32::REMW => {
                if b == 0 { a as i64 } else { a.wrapping_rem(b) as i64 }
            }
            alu32::REMUW => {
                let (a, b) = (a as u32, b as u32);
                if b == 0 { (a as i32) as i64 } else { ((a % b) as i32) as i64 }
            }
            key => return Err(VmError::InvalidAluOp32 { key }),
        };

        self.registers.set(inst.rd(), value as u64);
        Ok(())
    }

    fn op_lui(&mut self, inst: &Instruction) {
        self.registers.set(inst.rd(), inst.imm_u() as u64);
    }

    fn op_auipc(&mut self, inst: &Instruction) {
        self.registers
            .set(inst.rd(), self.pc.wrapping_add(inst.imm_u() as u64));
    }

    fn op_jal(&mut self, inst: &Instruction) {
        self.registers.set(inst.rd(), self.pc.wrapping_add(4));
        self.pc = self.pc.wrapping_add(inst.imm_j() as u64);
    }

    fn op_jalr(&mut self, inst: &Instruction) {
        // Target is computed before the link write: rd may alias rs1.
        let target = self
            .registers
            .get(inst.rs1())
            .wrapping_add(inst.imm_i() as u64)
            & !1;
        let link = self.pc.wrapping_add(4);
        self.pc = target;
        self.registers.set(inst.rd(), link);
    }

    fn op_branch(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let a = self.registers.get(inst.rs1());
        let b = self.registers.get(inst.rs2());

        let taken = match inst.funct3() {
            branch::BEQ => a == b,
            branch::BNE => a != b,
            branch::BLT => (a as i64) < b as i64,
            branch::BGE => (a as i64) >= b as i64,
            branch::BLTU => a < b,
            branch::BGEU => a >= b,
            funct3 => return Err(VmError::InvalidBranch { funct3 }),
        };

        self.pc = if taken {
            self.pc.wrapping_add(inst.imm_b() as u64)
        } else {
            self.pc.wrapping_add(4)
        };
        Ok(())
    }

    fn op_system(&mut self, inst: &Instruction) -> Result<(), VmError> {
        match inst.funct12() {
            system::ECALL => {
                let code = self.registers.get(REG_A7);
                let result = self.handle_syscall(code)?;
                self.registers.set(REG_A0, result);
                Ok(())
            }
            system::EBREAK => {
                self.exit_code = -1;
                self.running = false;
                Ok(())
            }
            funct12 => Err(VmError::InvalidSystem { funct12 }),
        }
    }

    /// Dispatches an environment call. Code `0` is the built-in exit: it
    /// records the status from `a0`, notifies the exit callback and halts.
    /// Other codes run their registered handler; an unregistered code is a
    /// fault.
    fn handle_syscall(&mut self, code: u64) -> Result<u64, VmError> {
        if code == EXIT_SYSCALL {
            let status = self.get_pointer_param(0);
            self.exit_code = status as i64;
            if let Some(callback) = &self.exit_callback {
                callback(status);
            }
            self.running = false;
            Ok(status)
        } else if let Some(handler) = self.syscalls.get(&code).cloned() {
            Ok(handler(self))
        } else {
            Err(VmError::InvalidSyscall { code })
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
