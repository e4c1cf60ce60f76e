use std::io;

use thiserror::Error;

use crate::registers::Reg8;

#[derive(Error, Debug)]
pub enum EmuError {
    /// The decoder produced a zero-length placeholder for this byte.
    #[error("unimplemented opcode {opcode:#04x} at {address:#06x}")]
    UnimplementedOpcode { address: u16, opcode: u8 },

    #[error("value {value:#x} does not fit in register {register}")]
    InvalidRegisterValue { register: Reg8, value: u32 },

    #[error("value {value:#x} written to {address:#06x} does not fit in a byte")]
    InvalidAddressWrite { address: u16, value: u32 },

    /// Either outside the 16-bit bus or resolved to a bank/offset with no
    /// backing byte.
    #[error("address {address:#06x} has no backing memory")]
    OutOfRangeAddress { address: u32 },

    #[error("unsupported cartridge mapper {0:#04x}")]
    UnsupportedMapper(u8),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EmuError>;
