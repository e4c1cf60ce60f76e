// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

/// Interrupt sources in dispatch priority order. The discriminant is the bit
/// position in IF/IE.
///
/// `LcdStat` is the single STAT line shared by the LY=LYC coincidence and
/// the OAM/HBlank/VBlank mode sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank = 0,
    LcdStat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub const PRIORITY: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => INTERRUPT_VBLANK,
            Interrupt::LcdStat => INTERRUPT_STAT,
            Interrupt::Timer => INTERRUPT_TIMER,
            Interrupt::Serial => INTERRUPT_SERIAL,
            Interrupt::Joypad => INTERRUPT_JOYPAD,
        }
    }

    /// Highest-priority source set in `pending` (an `IF & IE` value).
    pub fn highest_priority(pending: u8) -> Option<Interrupt> {
        Self::PRIORITY
            .into_iter()
            .find(|interrupt| pending & interrupt.mask() != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_bit_wins() {
        assert_eq!(Interrupt::highest_priority(0), None);
        assert_eq!(
            Interrupt::highest_priority(0b1_0110),
            Some(Interrupt::LcdStat)
        );
        assert_eq!(Interrupt::highest_priority(0b1_0000), Some(Interrupt::Joypad));
        assert_eq!(Interrupt::highest_priority(0xFF), Some(Interrupt::VBlank));
    }

    #[test]
    fn vectors_are_eight_bytes_apart() {
        for (i, interrupt) in Interrupt::PRIORITY.into_iter().enumerate() {
            assert_eq!(interrupt.vector(), 0x40 + 8 * i as u16);
        }
    }
}
