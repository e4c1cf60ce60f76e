/// Joypad buttons. Directions and actions each occupy the low nibble of
/// JOYP when their group is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    fn is_direction(self) -> bool {
        matches!(
            self,
            Button::Right | Button::Left | Button::Up | Button::Down
        )
    }

    fn mask(self) -> u8 {
        match self {
            Button::Right | Button::A => 0x01,
            Button::Left | Button::B => 0x02,
            Button::Up | Button::Select => 0x04,
            Button::Down | Button::Start => 0x08,
        }
    }
}

// JOYP select lines, active low.
const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_ACTIONS: u8 = 0x20;

#[derive(Debug, Clone)]
pub struct Input {
    select: u8,
    /// Pressed direction buttons, active high.
    directions: u8,
    /// Pressed action buttons, active high.
    actions: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            select: SELECT_DIRECTIONS | SELECT_ACTIONS,
            directions: 0,
            actions: 0,
        }
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let group = if button.is_direction() {
            &mut self.directions
        } else {
            &mut self.actions
        };
        if pressed {
            *group |= button.mask();
        } else {
            *group &= !button.mask();
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        let group = if button.is_direction() {
            self.directions
        } else {
            self.actions
        };
        group & button.mask() != 0
    }

    /// Only the two select bits are writable.
    pub fn write(&mut self, value: u8) {
        self.select = value & (SELECT_DIRECTIONS | SELECT_ACTIONS);
    }

    /// Bits 6-7 always read 1; the low nibble is the inverted state of the
    /// selected group(s), or 0xF with nothing selected.
    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & SELECT_DIRECTIONS == 0 {
            low &= !self.directions;
        }
        if self.select & SELECT_ACTIONS == 0 {
            low &= !self.actions;
        }
        0xC0 | self.select | (low & 0x0F)
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
