use std::fmt;

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

const DMG_BOOT_A: u8 = 0x01;
const DMG_BOOT_F: u8 = 0xB0;
const DMG_BOOT_B: u8 = 0x00;
const DMG_BOOT_C: u8 = 0x13;
const DMG_BOOT_D: u8 = 0x00;
const DMG_BOOT_E: u8 = 0xD8;
const DMG_BOOT_H: u8 = 0x01;
const DMG_BOOT_L: u8 = 0x4D;

/// 8-bit registers, in register-file index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    F = 6,
    A = 7,
}

impl Reg8 {
    pub const ALL: [Reg8; 8] = [
        Reg8::B,
        Reg8::C,
        Reg8::D,
        Reg8::E,
        Reg8::H,
        Reg8::L,
        Reg8::F,
        Reg8::A,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::F => "F",
            Reg8::A => "A",
        }
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 16-bit views. `SP` is independent; the rest pair adjacent 8-bit registers,
/// high byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
    AF,
}

impl Reg16 {
    pub fn name(self) -> &'static str {
        match self {
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::AF => "AF",
        }
    }

    fn pair(self) -> Option<(Reg8, Reg8)> {
        match self {
            Reg16::BC => Some((Reg8::B, Reg8::C)),
            Reg16::DE => Some((Reg8::D, Reg8::E)),
            Reg16::HL => Some((Reg8::H, Reg8::L)),
            Reg16::AF => Some((Reg8::A, Reg8::F)),
            Reg16::SP => None,
        }
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registers {
    regs: [u8; 8],
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    /// All registers zeroed, as seen by a boot overlay at power-on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register state the DMG boot ROM leaves behind.
    pub fn post_boot() -> Self {
        let mut regs = Self::new();
        regs.set(Reg8::A, DMG_BOOT_A);
        regs.set(Reg8::F, DMG_BOOT_F);
        regs.set(Reg8::B, DMG_BOOT_B);
        regs.set(Reg8::C, DMG_BOOT_C);
        regs.set(Reg8::D, DMG_BOOT_D);
        regs.set(Reg8::E, DMG_BOOT_E);
        regs.set(Reg8::H, DMG_BOOT_H);
        regs.set(Reg8::L, DMG_BOOT_L);
        regs.sp = BOOT_SP;
        regs.pc = BOOT_PC;
        regs
    }

    pub fn get(&self, reg: Reg8) -> u8 {
        self.regs[reg.index()]
    }

    /// The low nibble of F does not exist in hardware and always reads 0.
    pub fn set(&mut self, reg: Reg8, value: u8) {
        self.regs[reg.index()] = if reg == Reg8::F { value & 0xF0 } else { value };
    }

    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg.pair() {
            Some((hi, lo)) => ((self.get(hi) as u16) << 8) | self.get(lo) as u16,
            None => self.sp,
        }
    }

    pub fn set16(&mut self, reg: Reg16, value: u16) {
        match reg.pair() {
            Some((hi, lo)) => {
                self.set(hi, (value >> 8) as u8);
                self.set(lo, value as u8);
            }
            None => self.sp = value,
        }
    }

    pub fn f(&self) -> u8 {
        self.get(Reg8::F)
    }

    fn flag(&self, mask: u8) -> bool {
        self.f() & mask != 0
    }

    fn set_flag(&mut self, mask: u8, on: bool) {
        let f = self.f();
        self.set(Reg8::F, if on { f | mask } else { f & !mask });
    }

    pub fn zero_flag(&self) -> bool {
        self.flag(FLAG_Z)
    }

    pub fn subtract_flag(&self) -> bool {
        self.flag(FLAG_N)
    }

    pub fn half_carry_flag(&self) -> bool {
        self.flag(FLAG_H)
    }

    pub fn carry_flag(&self) -> bool {
        self.flag(FLAG_C)
    }

    pub fn set_zero_flag(&mut self, on: bool) {
        self.set_flag(FLAG_Z, on);
    }

    pub fn set_subtract_flag(&mut self, on: bool) {
        self.set_flag(FLAG_N, on);
    }

    pub fn set_half_carry_flag(&mut self, on: bool) {
        self.set_flag(FLAG_H, on);
    }

    pub fn set_carry_flag(&mut self, on: bool) {
        self.set_flag(FLAG_C, on);
    }

    /// Z from an 8-bit result.
    pub fn set_zero_flag_from(&mut self, result: u8) {
        self.set_zero_flag(result == 0);
    }

    pub fn set_half_carry_flag_add(&mut self, a: u8, b: u8) {
        self.set_half_carry_flag((a & 0x0F) + (b & 0x0F) >= 0x10);
    }

    pub fn set_half_carry_flag_sub(&mut self, a: u8, b: u8) {
        self.set_half_carry_flag(((a & 0x0F) as i16 - (b & 0x0F) as i16) < 0);
    }

    pub fn set_half_carry_flag_add16(&mut self, a: u16, b: u16) {
        self.set_half_carry_flag((a & 0x0FFF) + (b & 0x0FFF) >= 0x1000);
    }

    pub fn set_carry_flag_add(&mut self, a: u8, b: u8) {
        self.set_carry_flag(a as u16 + b as u16 >= 0x100);
    }

    pub fn set_carry_flag_sub(&mut self, a: u8, b: u8) {
        self.set_carry_flag((a as i16 - b as i16) < 0);
    }

    pub fn set_carry_flag_add16(&mut self, a: u16, b: u16) {
        self.set_carry_flag(a as u32 + b as u32 >= 0x1_0000);
    }

    /// Rotate left through carry: the old carry enters bit 0 and bit 7
    /// becomes the new carry. Only C is touched.
    pub fn rotate_left_through_carry(&mut self, value: u8) -> u8 {
        let carry_in = self.carry_flag() as u8;
        self.set_carry_flag(value & 0x80 != 0);
        (value << 1) | carry_in
    }

    /// Mirror of [`Registers::rotate_left_through_carry`].
    pub fn rotate_right_through_carry(&mut self, value: u8) -> u8 {
        let carry_in = self.carry_flag() as u8;
        self.set_carry_flag(value & 0x01 != 0);
        (value >> 1) | (carry_in << 7)
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X}",
            self.get16(Reg16::AF),
            self.get16(Reg16::BC),
            self.get16(Reg16::DE),
            self.get16(Reg16::HL),
            self.pc,
            self.sp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn af_pair_masks_flag_nibble() {
        let mut regs = Registers::new();
        regs.set16(Reg16::AF, 0x12FF);
        assert_eq!(regs.get(Reg8::A), 0x12);
        assert_eq!(regs.f(), 0xF0);
        assert_eq!(regs.get16(Reg16::AF), 0x12F0);
    }

    #[test]
    fn pairs_are_high_byte_first() {
        let mut regs = Registers::new();
        regs.set16(Reg16::HL, 0x2120);
        assert_eq!(regs.get(Reg8::H), 0x21);
        assert_eq!(regs.get(Reg8::L), 0x20);
        regs.set16(Reg16::SP, 0xC0DE);
        assert_eq!(regs.sp, 0xC0DE);
    }

    #[test]
    fn post_boot_matches_dmg() {
        let regs = Registers::post_boot();
        assert_eq!(regs.get16(Reg16::AF), 0x01B0);
        assert_eq!(regs.get16(Reg16::BC), 0x0013);
        assert_eq!(regs.get16(Reg16::DE), 0x00D8);
        assert_eq!(regs.get16(Reg16::HL), 0x014D);
        assert_eq!(regs.sp, 0xFFFE);
        assert_eq!(regs.pc, 0x0100);
    }

    #[test]
    fn index_order_and_flag_mask() {
        let mut regs = Registers::new();
        for (i, reg) in Reg8::ALL.into_iter().enumerate() {
            assert_eq!(reg.index(), i);
            regs.set(reg, 0xFF);
        }
        assert_eq!(regs.get(Reg8::F), 0xF0);
        assert_eq!(regs.get(Reg8::B), 0xFF);
    }
}
