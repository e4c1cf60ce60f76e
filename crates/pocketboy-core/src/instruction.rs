//! Opcode decoder.
//!
//! The primary table is split along the usual `xx yyy zzz` fields of the
//! opcode byte, so families that differ only in the register they target
//! share one arm. `0xCB` switches to the secondary table.

use std::fmt;

use crate::bits::{get_bits, twos_complement};
use crate::error::Result;
use crate::registers::{Reg8, Reg16};

/// Anything the decoder can pull instruction bytes from.
pub trait ByteSource {
    fn byte_at(&self, address: u16) -> Result<u8>;
}

/// An 8-bit operand: a register or the byte at `(HL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg8),
    HlIndirect,
}

impl Operand {
    /// Decode the 3-bit register field; code 6 is `(HL)`.
    pub fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => Operand::Reg(Reg8::B),
            1 => Operand::Reg(Reg8::C),
            2 => Operand::Reg(Reg8::D),
            3 => Operand::Reg(Reg8::E),
            4 => Operand::Reg(Reg8::H),
            5 => Operand::Reg(Reg8::L),
            6 => Operand::HlIndirect,
            _ => Operand::Reg(Reg8::A),
        }
    }

    pub fn is_indirect(self) -> bool {
        matches!(self, Operand::HlIndirect)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::HlIndirect => f.write_str("(HL)"),
        }
    }
}

/// Memory operand of the `LD (rr),A` / `LD A,(rr)` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    Bc,
    De,
    HlIncrement,
    HlDecrement,
}

impl fmt::Display for Indirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Indirect::Bc => "(BC)",
            Indirect::De => "(DE)",
            Indirect::HlIncrement => "(HL+)",
            Indirect::HlDecrement => "(HL-)",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::NotZero => "NZ",
            Condition::Zero => "Z",
            Condition::NotCarry => "NC",
            Condition::Carry => "C",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD A,",
            AluOp::Adc => "ADC A,",
            AluOp::Sub => "SUB",
            AluOp::Sbc => "SBC A,",
            AluOp::And => "AND",
            AluOp::Xor => "XOR",
            AluOp::Or => "OR",
            AluOp::Cp => "CP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluSource {
    Operand(Operand),
    Immediate(u8),
}

/// Accumulator-only rotates (`0x07`, `0x0F`, `0x17`, `0x1F`). Unlike their
/// `0xCB` counterparts these always clear Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateA {
    Rlca,
    Rrca,
    Rla,
    Rra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl ShiftOp {
    fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => ShiftOp::Rlc,
            1 => ShiftOp::Rrc,
            2 => ShiftOp::Rl,
            3 => ShiftOp::Rr,
            4 => ShiftOp::Sla,
            5 => ShiftOp::Sra,
            6 => ShiftOp::Swap,
            _ => ShiftOp::Srl,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Rlc => "RLC",
            ShiftOp::Rrc => "RRC",
            ShiftOp::Rl => "RL",
            ShiftOp::Rr => "RR",
            ShiftOp::Sla => "SLA",
            ShiftOp::Sra => "SRA",
            ShiftOp::Swap => "SWAP",
            ShiftOp::Srl => "SRL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbOp {
    Shift(ShiftOp),
    Bit(u8),
    Res(u8),
    Set(u8),
}

/// One variant per instruction family, carrying only what execution needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    LdR16Imm { dst: Reg16, value: u16 },
    LdIndirectA { dst: Indirect },
    LdAIndirect { src: Indirect },
    LdImm16Sp { address: u16 },
    IncR16(Reg16),
    DecR16(Reg16),
    AddHl(Reg16),
    Inc(Operand),
    Dec(Operand),
    LdImm8 { dst: Operand, value: u8 },
    Ld { dst: Operand, src: Operand },
    RotateA(RotateA),
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr { condition: Option<Condition>, offset: i8 },
    Jp { condition: Option<Condition>, target: u16 },
    JpHl,
    Call { condition: Option<Condition>, target: u16 },
    Ret { condition: Option<Condition> },
    Reti,
    Rst(u16),
    Push(Reg16),
    Pop(Reg16),
    Alu { op: AluOp, src: AluSource },
    LdhImmA { offset: u8 },
    LdhAImm { offset: u8 },
    LdhCA,
    LdhAC,
    LdImm16A { address: u16 },
    LdAImm16 { address: u16 },
    AddSp(i8),
    LdHlSpOffset(i8),
    LdSpHl,
    Cb { op: CbOp, target: Operand },
    /// Opcode with no hardware meaning. Decodes with length 0.
    NotImplemented { opcode: u8 },
}

/// An instruction bound to the address it was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u16,
    /// Byte length, 1 to 3. Zero only for [`Instruction::NotImplemented`].
    pub length: u16,
    pub instruction: Instruction,
    /// How often this descriptor has run. Only meaningful for cached entries.
    pub executions: u64,
}

const R16: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP];
const R16_STACK: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::AF];
const CONDITIONS: [Condition; 4] = [
    Condition::NotZero,
    Condition::Zero,
    Condition::NotCarry,
    Condition::Carry,
];

/// Decode the instruction at `address`.
///
/// Unknown opcodes are not an error here; they come back as
/// [`Instruction::NotImplemented`]. The only failure is an unreadable byte.
pub fn decode<S: ByteSource + ?Sized>(address: u16, source: &S) -> Result<DecodedInstruction> {
    let opcode = source.byte_at(address)?;
    let imm8 = || source.byte_at(address.wrapping_add(1));
    let imm16 = || -> Result<u16> {
        let lo = source.byte_at(address.wrapping_add(1))? as u16;
        let hi = source.byte_at(address.wrapping_add(2))? as u16;
        Ok((hi << 8) | lo)
    };

    let x = get_bits(opcode, 6, 7);
    let y = get_bits(opcode, 3, 5);
    let z = get_bits(opcode, 0, 2);
    let p = (y >> 1) as usize;
    let q = y & 1;

    let (length, instruction) = match (x, z) {
        (0, 0) => match y {
            0 => (1, Instruction::Nop),
            1 => (3, Instruction::LdImm16Sp { address: imm16()? }),
            2 => (2, Instruction::Stop),
            3 => (
                2,
                Instruction::Jr {
                    condition: None,
                    offset: twos_complement(imm8()?),
                },
            ),
            _ => (
                2,
                Instruction::Jr {
                    condition: Some(CONDITIONS[(y - 4) as usize]),
                    offset: twos_complement(imm8()?),
                },
            ),
        },
        (0, 1) if q == 0 => (
            3,
            Instruction::LdR16Imm {
                dst: R16[p],
                value: imm16()?,
            },
        ),
        (0, 1) => (1, Instruction::AddHl(R16[p])),
        (0, 2) => {
            let indirect = match p {
                0 => Indirect::Bc,
                1 => Indirect::De,
                2 => Indirect::HlIncrement,
                _ => Indirect::HlDecrement,
            };
            if q == 0 {
                (1, Instruction::LdIndirectA { dst: indirect })
            } else {
                (1, Instruction::LdAIndirect { src: indirect })
            }
        }
        (0, 3) if q == 0 => (1, Instruction::IncR16(R16[p])),
        (0, 3) => (1, Instruction::DecR16(R16[p])),
        (0, 4) => (1, Instruction::Inc(Operand::from_code(y))),
        (0, 5) => (1, Instruction::Dec(Operand::from_code(y))),
        (0, 6) => (
            2,
            Instruction::LdImm8 {
                dst: Operand::from_code(y),
                value: imm8()?,
            },
        ),
        (0, _) => (
            1,
            match y {
                0 => Instruction::RotateA(RotateA::Rlca),
                1 => Instruction::RotateA(RotateA::Rrca),
                2 => Instruction::RotateA(RotateA::Rla),
                3 => Instruction::RotateA(RotateA::Rra),
                4 => Instruction::Daa,
                5 => Instruction::Cpl,
                6 => Instruction::Scf,
                _ => Instruction::Ccf,
            },
        ),
        // LD (HL),(HL) is where HALT lives.
        (1, 6) if y == 6 => (1, Instruction::Halt),
        (1, _) => (
            1,
            Instruction::Ld {
                dst: Operand::from_code(y),
                src: Operand::from_code(z),
            },
        ),
        (2, _) => (
            1,
            Instruction::Alu {
                op: AluOp::from_code(y),
                src: AluSource::Operand(Operand::from_code(z)),
            },
        ),
        (_, 0) => match y {
            0..=3 => (
                1,
                Instruction::Ret {
                    condition: Some(CONDITIONS[y as usize]),
                },
            ),
            4 => (2, Instruction::LdhImmA { offset: imm8()? }),
            5 => (2, Instruction::AddSp(twos_complement(imm8()?))),
            6 => (2, Instruction::LdhAImm { offset: imm8()? }),
            _ => (2, Instruction::LdHlSpOffset(twos_complement(imm8()?))),
        },
        (_, 1) if q == 0 => (1, Instruction::Pop(R16_STACK[p])),
        (_, 1) => (
            1,
            match p {
                0 => Instruction::Ret { condition: None },
                1 => Instruction::Reti,
                2 => Instruction::JpHl,
                _ => Instruction::LdSpHl,
            },
        ),
        (_, 2) => match y {
            0..=3 => (
                3,
                Instruction::Jp {
                    condition: Some(CONDITIONS[y as usize]),
                    target: imm16()?,
                },
            ),
            4 => (1, Instruction::LdhCA),
            5 => (3, Instruction::LdImm16A { address: imm16()? }),
            6 => (1, Instruction::LdhAC),
            _ => (3, Instruction::LdAImm16 { address: imm16()? }),
        },
        (_, 3) => match y {
            0 => (
                3,
                Instruction::Jp {
                    condition: None,
                    target: imm16()?,
                },
            ),
            1 => (2, decode_cb(imm8()?)),
            6 => (1, Instruction::Di),
            7 => (1, Instruction::Ei),
            _ => (0, Instruction::NotImplemented { opcode }),
        },
        (_, 4) if y <= 3 => (
            3,
            Instruction::Call {
                condition: Some(CONDITIONS[y as usize]),
                target: imm16()?,
            },
        ),
        (_, 4) => (0, Instruction::NotImplemented { opcode }),
        (_, 5) if q == 0 => (1, Instruction::Push(R16_STACK[p])),
        (_, 5) if p == 0 => (
            3,
            Instruction::Call {
                condition: None,
                target: imm16()?,
            },
        ),
        (_, 5) => (0, Instruction::NotImplemented { opcode }),
        (_, 6) => (
            2,
            Instruction::Alu {
                op: AluOp::from_code(y),
                src: AluSource::Immediate(imm8()?),
            },
        ),
        (_, _) => (1, Instruction::Rst(y as u16 * 8)),
    };

    Ok(DecodedInstruction {
        address,
        length,
        instruction,
        executions: 0,
    })
}

fn decode_cb(opcode: u8) -> Instruction {
    let y = get_bits(opcode, 3, 5);
    let target = Operand::from_code(opcode);
    let op = match get_bits(opcode, 6, 7) {
        0 => CbOp::Shift(ShiftOp::from_code(y)),
        1 => CbOp::Bit(y),
        2 => CbOp::Res(y),
        _ => CbOp::Set(y),
    };
    Instruction::Cb { op, target }
}

fn fmt_condition(condition: Option<Condition>) -> String {
    condition.map(|c| format!("{c}, ")).unwrap_or_default()
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Nop => f.write_str("NOP"),
            Instruction::Stop => f.write_str("STOP"),
            Instruction::Halt => f.write_str("HALT"),
            Instruction::Di => f.write_str("DI"),
            Instruction::Ei => f.write_str("EI"),
            Instruction::LdR16Imm { dst, value } => write!(f, "LD {dst}, ${value:04X}"),
            Instruction::LdIndirectA { dst } => write!(f, "LD {dst}, A"),
            Instruction::LdAIndirect { src } => write!(f, "LD A, {src}"),
            Instruction::LdImm16Sp { address } => write!(f, "LD (${address:04X}), SP"),
            Instruction::IncR16(reg) => write!(f, "INC {reg}"),
            Instruction::DecR16(reg) => write!(f, "DEC {reg}"),
            Instruction::AddHl(reg) => write!(f, "ADD HL, {reg}"),
            Instruction::Inc(op) => write!(f, "INC {op}"),
            Instruction::Dec(op) => write!(f, "DEC {op}"),
            Instruction::LdImm8 { dst, value } => write!(f, "LD {dst}, ${value:02X}"),
            Instruction::Ld { dst, src } => write!(f, "LD {dst}, {src}"),
            Instruction::RotateA(rot) => f.write_str(match rot {
                RotateA::Rlca => "RLCA",
                RotateA::Rrca => "RRCA",
                RotateA::Rla => "RLA",
                RotateA::Rra => "RRA",
            }),
            Instruction::Daa => f.write_str("DAA"),
            Instruction::Cpl => f.write_str("CPL"),
            Instruction::Scf => f.write_str("SCF"),
            Instruction::Ccf => f.write_str("CCF"),
            Instruction::Jr { condition, offset } => {
                write!(f, "JR {}${:02X}", fmt_condition(condition), offset as u8)
            }
            Instruction::Jp { condition, target } => {
                write!(f, "JP {}${target:04X}", fmt_condition(condition))
            }
            Instruction::JpHl => f.write_str("JP HL"),
            Instruction::Call { condition, target } => {
                write!(f, "CALL {}${target:04X}", fmt_condition(condition))
            }
            Instruction::Ret { condition: None } => f.write_str("RET"),
            Instruction::Ret {
                condition: Some(c),
            } => write!(f, "RET {c}"),
            Instruction::Reti => f.write_str("RETI"),
            Instruction::Rst(vector) => write!(f, "RST ${vector:02X}"),
            Instruction::Push(reg) => write!(f, "PUSH {reg}"),
            Instruction::Pop(reg) => write!(f, "POP {reg}"),
            Instruction::Alu { op, src } => match src {
                AluSource::Operand(operand) => write!(f, "{} {operand}", op.mnemonic()),
                AluSource::Immediate(value) => write!(f, "{} ${value:02X}", op.mnemonic()),
            },
            Instruction::LdhImmA { offset } => write!(f, "LDH ($FF{offset:02X}), A"),
            Instruction::LdhAImm { offset } => write!(f, "LDH A, ($FF{offset:02X})"),
            Instruction::LdhCA => f.write_str("LD ($FF00+C), A"),
            Instruction::LdhAC => f.write_str("LD A, ($FF00+C)"),
            Instruction::LdImm16A { address } => write!(f, "LD (${address:04X}), A"),
            Instruction::LdAImm16 { address } => write!(f, "LD A, (${address:04X})"),
            Instruction::AddSp(offset) => write!(f, "ADD SP, {offset}"),
            Instruction::LdHlSpOffset(offset) => write!(f, "LD HL, SP{offset:+}"),
            Instruction::LdSpHl => f.write_str("LD SP, HL"),
            Instruction::Cb { op, target } => match op {
                CbOp::Shift(shift) => write!(f, "{} {target}", shift.mnemonic()),
                CbOp::Bit(bit) => write!(f, "BIT {bit}, {target}"),
                CbOp::Res(bit) => write!(f, "RES {bit}, {target}"),
                CbOp::Set(bit) => write!(f, "SET {bit}, {target}"),
            },
            Instruction::NotImplemented { opcode } => write!(f, "DB ${opcode:02X}"),
        }
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}: {}", self.address, self.instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmuError;

    impl ByteSource for [u8] {
        fn byte_at(&self, address: u16) -> Result<u8> {
            self.get(address as usize)
                .copied()
                .ok_or(EmuError::OutOfRangeAddress {
                    address: address as u32,
                })
        }
    }

    fn decode_bytes(bytes: &[u8]) -> DecodedInstruction {
        decode(0, bytes).unwrap()
    }

    #[test]
    fn same_opcode_differs_only_by_address() {
        let bytes = [0x21, 0x20, 0x21, 0x21, 0x20, 0x21];
        let a = decode(0, &bytes[..]).unwrap();
        let b = decode(3, &bytes[..]).unwrap();
        assert_eq!(a.instruction, b.instruction);
        assert_eq!(a.length, b.length);
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn register_pair_family_shares_decoding() {
        for (opcode, reg) in [
            (0x01, Reg16::BC),
            (0x11, Reg16::DE),
            (0x21, Reg16::HL),
            (0x31, Reg16::SP),
        ] {
            let d = decode_bytes(&[opcode, 0x34, 0x12]);
            assert_eq!(d.length, 3);
            assert_eq!(
                d.instruction,
                Instruction::LdR16Imm {
                    dst: reg,
                    value: 0x1234
                }
            );
        }
    }

    #[test]
    fn illegal_opcodes_decode_to_zero_length() {
        for opcode in [
            0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
        ] {
            let d = decode_bytes(&[opcode, 0, 0]);
            assert_eq!(d.length, 0, "opcode {opcode:02X}");
            assert_eq!(d.instruction, Instruction::NotImplemented { opcode });
        }
    }

    #[test]
    fn every_other_opcode_has_a_length() {
        let illegal = [
            0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
        ];
        for opcode in 0..=u8::MAX {
            if illegal.contains(&opcode) {
                continue;
            }
            let d = decode_bytes(&[opcode, 0, 0]);
            assert!((1..=3).contains(&d.length), "opcode {opcode:02X}");
        }
    }

    #[test]
    fn cb_prefix_uses_secondary_table() {
        let d = decode_bytes(&[0xCB, 0x7C]);
        assert_eq!(d.length, 2);
        assert_eq!(
            d.instruction,
            Instruction::Cb {
                op: CbOp::Bit(7),
                target: Operand::Reg(Reg8::H)
            }
        );
        let d = decode_bytes(&[0xCB, 0x16]);
        assert_eq!(
            d.instruction,
            Instruction::Cb {
                op: CbOp::Shift(ShiftOp::Rl),
                target: Operand::HlIndirect
            }
        );
    }

    #[test]
    fn halt_sits_in_the_load_block() {
        assert_eq!(decode_bytes(&[0x76]).instruction, Instruction::Halt);
        assert_eq!(
            decode_bytes(&[0x77]).instruction,
            Instruction::Ld {
                dst: Operand::HlIndirect,
                src: Operand::Reg(Reg8::A)
            }
        );
    }

    #[test]
    fn disassembles_loads() {
        let text = |bytes: &[u8]| decode_bytes(bytes).instruction.to_string();
        assert_eq!(text(&[0x21, 0x20, 0x21]), "LD HL, $2120");
        assert_eq!(text(&[0x16, 0x34]), "LD D, $34");
        assert_eq!(text(&[0x36, 0x34]), "LD (HL), $34");
        assert_eq!(text(&[0x62]), "LD H, D");
        assert_eq!(text(&[0x7E]), "LD A, (HL)");
        assert_eq!(text(&[0x22]), "LD (HL+), A");
        assert_eq!(text(&[0x02]), "LD (BC), A");
        assert_eq!(text(&[0xC5]), "PUSH BC");
        assert_eq!(text(&[0xF1]), "POP AF");
        assert_eq!(text(&[0x20, 0xFB]), "JR NZ, $FB");
        assert_eq!(text(&[0xCB, 0x7C]), "BIT 7, H");
        assert_eq!(text(&[0xD3]), "DB $D3");
    }

    #[test]
    fn truncated_operand_is_an_error() {
        assert!(matches!(
            decode(0, &[0xC3, 0x00][..]),
            Err(EmuError::OutOfRangeAddress { address: 2 })
        ));
    }
}
