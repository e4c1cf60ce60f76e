use crate::interrupts::Interrupt;

pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;

const TAC_ENABLE: u8 = 0x04;

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    last_signal: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            DIV => (self.div >> 8) as u8,
            TIMA => self.tima,
            TMA => self.tma,
            TAC => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        match addr {
            // Any value resets the divider.
            DIV => self.reset_div(if_reg),
            TIMA => self.tima = val,
            TMA => self.tma = val,
            TAC => {
                let prev = Self::signal_with(self.div, self.tac);
                self.tac = val & 0x07;
                let new = Self::signal_with(self.div, self.tac);
                if prev && !new {
                    self.increment(if_reg);
                }
                self.last_signal = new;
            }
            _ => {}
        }
    }

    /// Advance the timer by `cycles` CPU cycles and update IF when TIMA
    /// overflows.
    pub fn advance(&mut self, cycles: u32, if_reg: &mut u8) {
        for _ in 0..cycles {
            let prev = self.last_signal;
            self.div = self.div.wrapping_add(1);
            let new = self.signal();
            if prev && !new {
                self.increment(if_reg);
            }
            self.last_signal = new;
        }
    }

    /// Reset the internal divider counter. A high selected bit dropping to 0
    /// counts as a TIMA edge.
    pub fn reset_div(&mut self, if_reg: &mut u8) {
        let prev = Self::signal_with(self.div, self.tac);
        self.div = 0;
        let new = Self::signal_with(self.div, self.tac);
        if prev && !new {
            self.increment(if_reg);
        }
        self.last_signal = new;
    }

    fn increment(&mut self, if_reg: &mut u8) {
        if self.tima == 0xFF {
            self.tima = self.tma;
            *if_reg |= Interrupt::Timer.mask();
        } else {
            self.tima = self.tima.wrapping_add(1);
        }
    }

    /// Divider bit whose falling edge clocks TIMA: 4096, 262144, 65536 and
    /// 16384 Hz for rates 00..11.
    fn timer_bit_with(div: u16, tac: u8) -> u8 {
        match tac & 0x03 {
            0x00 => ((div >> 9) & 1) as u8,
            0x01 => ((div >> 3) & 1) as u8,
            0x02 => ((div >> 5) & 1) as u8,
            _ => ((div >> 7) & 1) as u8,
        }
    }

    fn signal(&self) -> bool {
        Self::signal_with(self.div, self.tac)
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        tac & TAC_ENABLE != 0 && Self::timer_bit_with(div, tac) != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
