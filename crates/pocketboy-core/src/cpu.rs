use crate::decode_cache::DecodeCache;
use crate::diagnostics::ThrottledLogger;
use crate::error::{EmuError, Result};
use crate::instruction::{
    AluOp, AluSource, CbOp, Condition, DecodedInstruction, Indirect, Instruction, Operand,
    RotateA, ShiftOp, decode,
};
use crate::interrupts::Interrupt;
use crate::mmu::Mmu;
use crate::registers::{Reg8, Reg16, Registers};

// T-cycles, four per machine cycle.
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;
const HALTED_CYCLES: u32 = 4;

/// Interrupt master enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImeState {
    Disabled,
    /// `EI` ran; IME turns on at the end of tick `at_tick`.
    PendingEnable { at_tick: u64 },
    Enabled,
}

/// Where execution continues after an instruction.
enum Flow {
    Next,
    Jump(u16),
}

pub struct Cpu {
    pub regs: Registers,
    pub ime: ImeState,
    /// Completed ticks since power-on. Each instruction, halted wait or
    /// interrupt dispatch is one tick.
    pub ticks: u64,
    pub halted: bool,
    cache: DecodeCache,
}

impl Cpu {
    /// Post-boot state, for running a cartridge without a boot ROM.
    pub fn new() -> Self {
        Self::with_registers(Registers::post_boot())
    }

    /// Zeroed registers with PC at 0, for executing a boot ROM.
    pub fn new_power_on() -> Self {
        Self::with_registers(Registers::new())
    }

    fn with_registers(regs: Registers) -> Self {
        Self {
            regs,
            ime: ImeState::Disabled,
            ticks: 0,
            halted: false,
            cache: DecodeCache::new(),
        }
    }

    pub fn ime_enabled(&self) -> bool {
        self.ime == ImeState::Enabled
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!("{} IME:{:?} TICK:{}", self.regs, self.ime, self.ticks)
    }

    /// Run one tick and return the T-cycles it took.
    pub fn step(&mut self, mmu: &mut Mmu, log: &mut ThrottledLogger) -> Result<u32> {
        let cycles = self.tick(mmu, log)?;
        if let ImeState::PendingEnable { at_tick } = self.ime
            && at_tick == self.ticks
        {
            self.ime = ImeState::Enabled;
        }
        self.ticks += 1;
        Ok(cycles)
    }

    fn tick(&mut self, mmu: &mut Mmu, log: &mut ThrottledLogger) -> Result<u32> {
        let pending = mmu.pending_interrupts();
        if self.ime == ImeState::Enabled
            && let Some(interrupt) = Interrupt::highest_priority(pending)
        {
            self.dispatch_interrupt(mmu, interrupt);
            return Ok(INTERRUPT_DISPATCH_CYCLES);
        }

        if self.halted {
            if pending == 0 {
                return Ok(HALTED_CYCLES);
            }
            self.halted = false;
        }

        let pc = self.regs.pc;
        let decoded = self.fetch(mmu, pc)?;
        if decoded.length == 0 {
            // A zero-length descriptor gives no way to advance PC.
            let opcode = match decoded.instruction {
                Instruction::NotImplemented { opcode } => opcode,
                _ => mmu.read(pc)?,
            };
            return Err(EmuError::UnimplementedOpcode {
                address: pc,
                opcode,
            });
        }

        #[cfg(feature = "cpu-trace")]
        log::trace!("{decoded} | {}", self.regs);

        let (flow, cycles) = self.execute(&decoded, mmu, log)?;
        self.regs.pc = match flow {
            Flow::Next => pc.wrapping_add(decoded.length),
            Flow::Jump(target) => target,
        };
        Ok(cycles)
    }

    fn fetch(&mut self, mmu: &Mmu, pc: u16) -> Result<DecodedInstruction> {
        match self.cache.lookup(mmu, pc) {
            Some(entry) => {
                entry.executions += 1;
                Ok(*entry)
            }
            None => decode(pc, mmu),
        }
    }

    fn dispatch_interrupt(&mut self, mmu: &mut Mmu, interrupt: Interrupt) {
        self.ime = ImeState::Disabled;
        self.halted = false;
        mmu.clear_interrupt(interrupt);
        let pc = self.regs.pc;
        self.push(mmu, pc);
        self.regs.pc = interrupt.vector();
    }

    /// SP is decremented before each byte; high byte first.
    fn push(&mut self, mmu: &mut Mmu, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_stack(self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_stack(self.regs.sp, value as u8);
    }

    fn pop(&mut self, mmu: &Mmu) -> Result<u16> {
        let value = mmu.read16(self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        Ok(value)
    }

    fn read_operand(&self, mmu: &Mmu, operand: Operand) -> Result<u8> {
        match operand {
            Operand::Reg(reg) => Ok(self.regs.get(reg)),
            Operand::HlIndirect => mmu.read(self.regs.get16(Reg16::HL)),
        }
    }

    fn write_operand(&mut self, mmu: &mut Mmu, operand: Operand, value: u8) {
        match operand {
            Operand::Reg(reg) => self.regs.set(reg, value),
            Operand::HlIndirect => mmu.write(self.regs.get16(Reg16::HL), value),
        }
    }

    /// Address for the `(BC)`/`(DE)`/`(HL+)`/`(HL-)` family, applying the HL
    /// post-increment or post-decrement.
    fn indirect_address(&mut self, indirect: Indirect) -> u16 {
        match indirect {
            Indirect::Bc => self.regs.get16(Reg16::BC),
            Indirect::De => self.regs.get16(Reg16::DE),
            Indirect::HlIncrement => {
                let hl = self.regs.get16(Reg16::HL);
                self.regs.set16(Reg16::HL, hl.wrapping_add(1));
                hl
            }
            Indirect::HlDecrement => {
                let hl = self.regs.get16(Reg16::HL);
                self.regs.set16(Reg16::HL, hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn condition_met(&self, condition: Option<Condition>) -> bool {
        match condition {
            None => true,
            Some(Condition::NotZero) => !self.regs.zero_flag(),
            Some(Condition::Zero) => self.regs.zero_flag(),
            Some(Condition::NotCarry) => !self.regs.carry_flag(),
            Some(Condition::Carry) => self.regs.carry_flag(),
        }
    }

    fn execute(
        &mut self,
        decoded: &DecodedInstruction,
        mmu: &mut Mmu,
        log: &mut ThrottledLogger,
    ) -> Result<(Flow, u32)> {
        let next_pc = decoded.address.wrapping_add(decoded.length);
        let result = match decoded.instruction {
            Instruction::Nop => (Flow::Next, 4),
            Instruction::Stop => {
                log.warn(format_args!(
                    "STOP at {:#06x} treated as NOP",
                    decoded.address
                ));
                (Flow::Next, 4)
            }
            Instruction::Halt => {
                self.halted = true;
                (Flow::Next, 4)
            }
            Instruction::Di => {
                self.ime = ImeState::Disabled;
                (Flow::Next, 4)
            }
            Instruction::Ei => {
                if self.ime == ImeState::Disabled {
                    self.ime = ImeState::PendingEnable {
                        at_tick: self.ticks + 1,
                    };
                }
                (Flow::Next, 4)
            }
            Instruction::LdR16Imm { dst, value } => {
                self.regs.set16(dst, value);
                (Flow::Next, 12)
            }
            Instruction::LdIndirectA { dst } => {
                let addr = self.indirect_address(dst);
                mmu.write(addr, self.regs.get(Reg8::A));
                (Flow::Next, 8)
            }
            Instruction::LdAIndirect { src } => {
                let addr = self.indirect_address(src);
                let val = mmu.read(addr)?;
                self.regs.set(Reg8::A, val);
                (Flow::Next, 8)
            }
            Instruction::LdImm16Sp { address } => {
                let sp = self.regs.sp;
                mmu.write(address, sp as u8);
                mmu.write(address.wrapping_add(1), (sp >> 8) as u8);
                (Flow::Next, 20)
            }
            Instruction::IncR16(reg) => {
                let val = self.regs.get16(reg).wrapping_add(1);
                self.regs.set16(reg, val);
                (Flow::Next, 8)
            }
            Instruction::DecR16(reg) => {
                let val = self.regs.get16(reg).wrapping_sub(1);
                self.regs.set16(reg, val);
                (Flow::Next, 8)
            }
            Instruction::AddHl(reg) => {
                let hl = self.regs.get16(Reg16::HL);
                let val = self.regs.get16(reg);
                self.regs.set_subtract_flag(false);
                self.regs.set_half_carry_flag_add16(hl, val);
                self.regs.set_carry_flag_add16(hl, val);
                self.regs.set16(Reg16::HL, hl.wrapping_add(val));
                (Flow::Next, 8)
            }
            Instruction::Inc(op) => {
                let val = self.read_operand(mmu, op)?;
                let res = val.wrapping_add(1);
                self.regs.set_zero_flag_from(res);
                self.regs.set_subtract_flag(false);
                self.regs.set_half_carry_flag_add(val, 1);
                self.write_operand(mmu, op, res);
                (Flow::Next, if op.is_indirect() { 12 } else { 4 })
            }
            Instruction::Dec(op) => {
                let val = self.read_operand(mmu, op)?;
                let res = val.wrapping_sub(1);
                self.regs.set_zero_flag_from(res);
                self.regs.set_subtract_flag(true);
                self.regs.set_half_carry_flag_sub(val, 1);
                self.write_operand(mmu, op, res);
                (Flow::Next, if op.is_indirect() { 12 } else { 4 })
            }
            Instruction::LdImm8 { dst, value } => {
                self.write_operand(mmu, dst, value);
                (Flow::Next, if dst.is_indirect() { 12 } else { 8 })
            }
            Instruction::Ld { dst, src } => {
                let val = self.read_operand(mmu, src)?;
                self.write_operand(mmu, dst, val);
                let indirect = dst.is_indirect() || src.is_indirect();
                (Flow::Next, if indirect { 8 } else { 4 })
            }
            Instruction::RotateA(rot) => {
                self.rotate_a(rot);
                (Flow::Next, 4)
            }
            Instruction::Daa => {
                self.daa();
                (Flow::Next, 4)
            }
            Instruction::Cpl => {
                let a = self.regs.get(Reg8::A);
                self.regs.set(Reg8::A, !a);
                self.regs.set_subtract_flag(true);
                self.regs.set_half_carry_flag(true);
                (Flow::Next, 4)
            }
            Instruction::Scf => {
                self.regs.set_subtract_flag(false);
                self.regs.set_half_carry_flag(false);
                self.regs.set_carry_flag(true);
                (Flow::Next, 4)
            }
            Instruction::Ccf => {
                let carry = self.regs.carry_flag();
                self.regs.set_subtract_flag(false);
                self.regs.set_half_carry_flag(false);
                self.regs.set_carry_flag(!carry);
                (Flow::Next, 4)
            }
            Instruction::Jr { condition, offset } => {
                if self.condition_met(condition) {
                    (Flow::Jump(next_pc.wrapping_add(offset as i16 as u16)), 12)
                } else {
                    (Flow::Next, 8)
                }
            }
            Instruction::Jp { condition, target } => {
                if self.condition_met(condition) {
                    (Flow::Jump(target), 16)
                } else {
                    (Flow::Next, 12)
                }
            }
            Instruction::JpHl => (Flow::Jump(self.regs.get16(Reg16::HL)), 4),
            Instruction::Call { condition, target } => {
                if self.condition_met(condition) {
                    self.push(mmu, next_pc);
                    (Flow::Jump(target), 24)
                } else {
                    (Flow::Next, 12)
                }
            }
            Instruction::Ret { condition: None } => (Flow::Jump(self.pop(mmu)?), 16),
            Instruction::Ret { condition } => {
                if self.condition_met(condition) {
                    (Flow::Jump(self.pop(mmu)?), 20)
                } else {
                    (Flow::Next, 8)
                }
            }
            Instruction::Reti => {
                let target = self.pop(mmu)?;
                self.ime = ImeState::Enabled;
                (Flow::Jump(target), 16)
            }
            Instruction::Rst(vector) => {
                self.push(mmu, next_pc);
                (Flow::Jump(vector), 16)
            }
            Instruction::Push(reg) => {
                let val = self.regs.get16(reg);
                self.push(mmu, val);
                (Flow::Next, 16)
            }
            Instruction::Pop(reg) => {
                let val = self.pop(mmu)?;
                self.regs.set16(reg, val);
                (Flow::Next, 12)
            }
            Instruction::Alu { op, src } => {
                let (val, cycles) = match src {
                    AluSource::Operand(operand) => (
                        self.read_operand(mmu, operand)?,
                        if operand.is_indirect() { 8 } else { 4 },
                    ),
                    AluSource::Immediate(val) => (val, 8),
                };
                self.alu(op, val);
                (Flow::Next, cycles)
            }
            Instruction::LdhImmA { offset } => {
                mmu.write(0xFF00 | offset as u16, self.regs.get(Reg8::A));
                (Flow::Next, 12)
            }
            Instruction::LdhAImm { offset } => {
                let val = mmu.read(0xFF00 | offset as u16)?;
                self.regs.set(Reg8::A, val);
                (Flow::Next, 12)
            }
            Instruction::LdhCA => {
                let addr = 0xFF00 | self.regs.get(Reg8::C) as u16;
                mmu.write(addr, self.regs.get(Reg8::A));
                (Flow::Next, 8)
            }
            Instruction::LdhAC => {
                let addr = 0xFF00 | self.regs.get(Reg8::C) as u16;
                let val = mmu.read(addr)?;
                self.regs.set(Reg8::A, val);
                (Flow::Next, 8)
            }
            Instruction::LdImm16A { address } => {
                mmu.write(address, self.regs.get(Reg8::A));
                (Flow::Next, 16)
            }
            Instruction::LdAImm16 { address } => {
                let val = mmu.read(address)?;
                self.regs.set(Reg8::A, val);
                (Flow::Next, 16)
            }
            Instruction::AddSp(offset) => {
                self.regs.sp = self.sp_plus_offset(offset);
                (Flow::Next, 16)
            }
            Instruction::LdHlSpOffset(offset) => {
                let val = self.sp_plus_offset(offset);
                self.regs.set16(Reg16::HL, val);
                (Flow::Next, 12)
            }
            Instruction::LdSpHl => {
                self.regs.sp = self.regs.get16(Reg16::HL);
                (Flow::Next, 8)
            }
            Instruction::Cb { op, target } => {
                let val = self.read_operand(mmu, target)?;
                match op {
                    CbOp::Shift(shift) => {
                        let res = self.shift(shift, val);
                        self.write_operand(mmu, target, res);
                    }
                    CbOp::Bit(bit) => {
                        self.regs.set_zero_flag(val & (1 << bit) == 0);
                        self.regs.set_subtract_flag(false);
                        self.regs.set_half_carry_flag(true);
                    }
                    CbOp::Res(bit) => self.write_operand(mmu, target, val & !(1 << bit)),
                    CbOp::Set(bit) => self.write_operand(mmu, target, val | (1 << bit)),
                }
                let cycles = match (op, target.is_indirect()) {
                    (_, false) => 8,
                    // BIT (HL) only reads from memory.
                    (CbOp::Bit(_), true) => 12,
                    (_, true) => 16,
                };
                (Flow::Next, cycles)
            }
            Instruction::NotImplemented { opcode } => {
                return Err(EmuError::UnimplementedOpcode {
                    address: decoded.address,
                    opcode,
                });
            }
        };
        Ok(result)
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.regs.get(Reg8::A);
        let carry = self.regs.carry_flag() as u8;
        let res = match op {
            AluOp::Add => {
                self.regs.set_half_carry_flag_add(a, val);
                self.regs.set_carry_flag_add(a, val);
                a.wrapping_add(val)
            }
            AluOp::Adc => {
                self.regs
                    .set_half_carry_flag((a & 0x0F) + (val & 0x0F) + carry > 0x0F);
                self.regs
                    .set_carry_flag(a as u16 + val as u16 + carry as u16 > 0xFF);
                a.wrapping_add(val).wrapping_add(carry)
            }
            AluOp::Sub | AluOp::Cp => {
                self.regs.set_half_carry_flag_sub(a, val);
                self.regs.set_carry_flag_sub(a, val);
                a.wrapping_sub(val)
            }
            AluOp::Sbc => {
                self.regs
                    .set_half_carry_flag((a & 0x0F) < (val & 0x0F) + carry);
                self.regs
                    .set_carry_flag((a as u16) < val as u16 + carry as u16);
                a.wrapping_sub(val).wrapping_sub(carry)
            }
            AluOp::And => {
                self.regs.set_half_carry_flag(true);
                self.regs.set_carry_flag(false);
                a & val
            }
            AluOp::Xor => {
                self.regs.set_half_carry_flag(false);
                self.regs.set_carry_flag(false);
                a ^ val
            }
            AluOp::Or => {
                self.regs.set_half_carry_flag(false);
                self.regs.set_carry_flag(false);
                a | val
            }
        };
        self.regs.set_zero_flag_from(res);
        self.regs
            .set_subtract_flag(matches!(op, AluOp::Sub | AluOp::Sbc | AluOp::Cp));
        if op != AluOp::Cp {
            self.regs.set(Reg8::A, res);
        }
    }

    fn rotate_a(&mut self, rot: RotateA) {
        let a = self.regs.get(Reg8::A);
        let res = match rot {
            RotateA::Rlca => {
                self.regs.set_carry_flag(a & 0x80 != 0);
                a.rotate_left(1)
            }
            RotateA::Rrca => {
                self.regs.set_carry_flag(a & 0x01 != 0);
                a.rotate_right(1)
            }
            RotateA::Rla => self.regs.rotate_left_through_carry(a),
            RotateA::Rra => self.regs.rotate_right_through_carry(a),
        };
        self.regs.set_zero_flag(false);
        self.regs.set_subtract_flag(false);
        self.regs.set_half_carry_flag(false);
        self.regs.set(Reg8::A, res);
    }

    fn shift(&mut self, op: ShiftOp, val: u8) -> u8 {
        let res = match op {
            ShiftOp::Rlc => {
                self.regs.set_carry_flag(val & 0x80 != 0);
                val.rotate_left(1)
            }
            ShiftOp::Rrc => {
                self.regs.set_carry_flag(val & 0x01 != 0);
                val.rotate_right(1)
            }
            ShiftOp::Rl => self.regs.rotate_left_through_carry(val),
            ShiftOp::Rr => self.regs.rotate_right_through_carry(val),
            ShiftOp::Sla => {
                self.regs.set_carry_flag(val & 0x80 != 0);
                val << 1
            }
            ShiftOp::Sra => {
                self.regs.set_carry_flag(val & 0x01 != 0);
                (val >> 1) | (val & 0x80)
            }
            ShiftOp::Swap => {
                self.regs.set_carry_flag(false);
                val.rotate_left(4)
            }
            ShiftOp::Srl => {
                self.regs.set_carry_flag(val & 0x01 != 0);
                val >> 1
            }
        };
        self.regs.set_zero_flag_from(res);
        self.regs.set_subtract_flag(false);
        self.regs.set_half_carry_flag(false);
        res
    }

    fn daa(&mut self) {
        let a = self.regs.get(Reg8::A);
        let subtract = self.regs.subtract_flag();
        let mut correction = 0u8;
        let mut carry = false;
        if self.regs.half_carry_flag() || (!subtract && (a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if self.regs.carry_flag() || (!subtract && a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        let res = if subtract {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        self.regs.set(Reg8::A, res);
        self.regs.set_zero_flag_from(res);
        self.regs.set_half_carry_flag(false);
        self.regs.set_carry_flag(carry);
    }

    /// Shared by `ADD SP,e` and `LD HL,SP+e`: Z and N clear, H and C from the
    /// unsigned low-byte addition.
    fn sp_plus_offset(&mut self, offset: i8) -> u16 {
        let sp = self.regs.sp;
        let val = offset as u8;
        self.regs.set_zero_flag(false);
        self.regs.set_subtract_flag(false);
        self.regs.set_half_carry_flag_add(sp as u8, val);
        self.regs.set_carry_flag_add(sp as u8, val);
        sp.wrapping_add(offset as i16 as u16)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
