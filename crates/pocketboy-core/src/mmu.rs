use log::debug;

use crate::{
    cartridge::{Cartridge, MbcType},
    error::{EmuError, Result},
    input::Input,
    instruction::ByteSource,
    interrupts::Interrupt,
    observer::{MemoryEvent, MemoryObserver},
    timer::Timer,
};

/// Size of one switchable ROM bank.
pub const BANK_SIZE: usize = 0x4000;
/// Everything from here up is the flat RAM/VRAM/OAM/I-O image.
pub const RAM_START: u16 = 0x8000;

const BOOT_ROM_END: u16 = 0x0100;
const CART_RAM_START: u16 = 0xA000;
const CART_RAM_BANK_SIZE: usize = 0x2000;
const CART_RAM_BANKS: usize = 4;
const ECHO_START: u16 = 0xE000;
const ECHO_END: u16 = 0xFDFF;
const OAM_START: u16 = 0xFE00;
const OAM_SIZE: u16 = 0xA0;

// I/O registers handled here rather than in the flat image.
pub const JOYP: u16 = 0xFF00;
pub const IF: u16 = 0xFF0F;
pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const LY: u16 = 0xFF44;
pub const DMA: u16 = 0xFF46;
pub const BOOT_DISABLE: u16 = 0xFF50;
pub const IE: u16 = 0xFFFF;

/// Which backing store an address lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Boot,
    Rom(usize),
    CartRam(usize),
    Ram,
}

/// A resolved address: backing region plus offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub region: Region,
    pub offset: usize,
}

pub struct Mmu {
    cart: Cartridge,
    boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    /// 0x8000-0xFFFF. IF, IE, JOYP and the timer registers live elsewhere.
    ram: Vec<u8>,
    cart_ram: Vec<u8>,
    /// MBC1 BANK1 register, 5 bits, never 0.
    rom_bank_low: u8,
    /// MBC1 BANK2 register, 2 bits.
    bank_high: u8,
    banking_mode: u8,
    if_reg: u8,
    ie_reg: u8,
    pub timer: Timer,
    pub input: Input,
    observer: Option<Box<dyn MemoryObserver>>,
}

impl Mmu {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            cart,
            boot_rom: None,
            boot_mapped: false,
            ram: vec![0; 0x1_0000 - RAM_START as usize],
            cart_ram: vec![0; CART_RAM_BANKS * CART_RAM_BANK_SIZE],
            rom_bank_low: 1,
            bank_high: 0,
            banking_mode: 0,
            if_reg: 0,
            ie_reg: 0,
            timer: Timer::new(),
            input: Input::new(),
            observer: None,
        }
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    /// I/O state the DMG boot ROM leaves behind, for runs that skip it.
    pub fn apply_post_boot_state(&mut self) {
        self.boot_mapped = false;
        self.if_reg = Interrupt::VBlank.mask();
        self.timer.div = 0xABCC;
        self.set_io_register(LCDC, 0x91);
        self.set_io_register(STAT, 0x85);
        self.set_io_register(0xFF47, 0xFC);
        self.set_io_register(0xFF48, 0xFF);
        self.set_io_register(0xFF49, 0xFF);
    }

    /// Power-cycle everything except the cartridge, boot ROM and observer.
    pub fn reset(&mut self) {
        self.boot_mapped = self.boot_rom.is_some();
        self.ram.fill(0);
        self.cart_ram.fill(0);
        self.rom_bank_low = 1;
        self.bank_high = 0;
        self.banking_mode = 0;
        self.if_reg = 0;
        self.ie_reg = 0;
        self.timer = Timer::new();
        self.input = Input::new();
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cart
    }

    /// The boot overlay, while it is still mapped.
    pub fn boot_rom(&self) -> Option<&[u8]> {
        if self.boot_mapped {
            self.boot_rom.as_deref()
        } else {
            None
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn MemoryObserver>) {
        self.observer = Some(observer);
    }

    fn notify(&mut self, event: MemoryEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.notify(event);
        }
    }

    /// Bank currently visible at 0x4000-0x7FFF.
    pub fn active_rom_bank(&self) -> usize {
        let mut bank = self.rom_bank_low as usize;
        if self.banking_mode == 0 {
            bank |= (self.bank_high as usize) << 5;
        }
        bank & self.cart.rom_bank_mask()
    }

    /// Bank currently visible at 0xA000-0xBFFF.
    pub fn active_ram_bank(&self) -> usize {
        if self.banking_mode == 1 {
            self.bank_high as usize
        } else {
            0
        }
    }

    pub fn resolve(&self, address: u16) -> Location {
        match address {
            0x0000..BOOT_ROM_END if self.boot_mapped => Location {
                region: Region::Boot,
                offset: address as usize,
            },
            0x0000..0x4000 => Location {
                region: Region::Rom(0),
                offset: address as usize,
            },
            0x4000..RAM_START => Location {
                region: Region::Rom(self.active_rom_bank()),
                offset: address as usize - BANK_SIZE,
            },
            CART_RAM_START..0xC000 => Location {
                region: Region::CartRam(self.active_ram_bank()),
                offset: (address - CART_RAM_START) as usize,
            },
            ECHO_START..=ECHO_END => Location {
                region: Region::Ram,
                offset: (address - 0x2000 - RAM_START) as usize,
            },
            _ => Location {
                region: Region::Ram,
                offset: (address - RAM_START) as usize,
            },
        }
    }

    pub fn read(&self, address: u16) -> Result<u8> {
        match address {
            JOYP => Ok(self.input.read()),
            0xFF04..=0xFF07 => Ok(self.timer.read(address)),
            IF => Ok(self.if_reg | 0xE0),
            IE => Ok(self.ie_reg),
            _ => self.read_location(address),
        }
    }

    fn read_location(&self, address: u16) -> Result<u8> {
        let location = self.resolve(address);
        let byte = match location.region {
            Region::Boot => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(location.offset).copied()),
            Region::Rom(bank) => self
                .cart
                .bank(bank)
                .and_then(|b| b.get(location.offset).copied()),
            Region::CartRam(bank) => self
                .cart_ram
                .get(bank * CART_RAM_BANK_SIZE + location.offset)
                .copied(),
            Region::Ram => self.ram.get(location.offset).copied(),
        };
        byte.ok_or(EmuError::OutOfRangeAddress {
            address: address as u32,
        })
    }

    pub fn read16(&self, address: u16) -> Result<u16> {
        let lo = self.read(address)? as u16;
        let hi = self.read(address.wrapping_add(1))? as u16;
        Ok((hi << 8) | lo)
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..RAM_START => self.write_bank_control(address, value),
            0x8000..=0x97FF => {
                self.store(address, value);
                self.notify(MemoryEvent::TileDataWritten(address));
            }
            0x9800..=0x9FFF => {
                self.store(address, value);
                self.notify(MemoryEvent::TileMapWritten(address));
            }
            CART_RAM_START..0xC000 => {
                let offset = self.active_ram_bank() * CART_RAM_BANK_SIZE
                    + (address - CART_RAM_START) as usize;
                self.cart_ram[offset] = value;
            }
            ECHO_START..=ECHO_END => self.store(address - 0x2000, value),
            JOYP => self.input.write(value),
            0xFF04..=0xFF07 => self.timer.write(address, value, &mut self.if_reg),
            IF => self.if_reg = value & 0x1F,
            STAT => {
                // Mode and coincidence bits belong to the PPU.
                let old = self.io_register(STAT);
                self.store(STAT, (value & 0x78) | (old & 0x07));
            }
            // LY is driven by the scanline clock; program writes are dropped.
            LY => {}
            DMA => {
                self.store(DMA, value);
                self.dma_transfer(value);
            }
            BOOT_DISABLE => {
                self.store(BOOT_DISABLE, value);
                if self.boot_mapped {
                    debug!("boot ROM unmapped");
                }
                self.boot_mapped = false;
            }
            IE => self.ie_reg = value,
            _ => self.store(address, value),
        }

        if (0xFF00..=0xFF7F).contains(&address) {
            self.notify(MemoryEvent::IoRegisterWritten { address, value });
            if address == LCDC {
                self.notify(MemoryEvent::AllTilesInvalidated);
            }
        }
    }

    /// Stack writes go through here so observers can follow pushes.
    pub fn write_stack(&mut self, address: u16, value: u8) {
        self.write(address, value);
        self.notify(MemoryEvent::StackWritten(address));
    }

    fn write_bank_control(&mut self, address: u16, value: u8) {
        if self.cart.mbc != MbcType::Mbc1 {
            return;
        }
        let before = self.active_rom_bank();
        match address {
            // RAM enable. External RAM is always accessible here.
            0x0000..=0x1FFF => return,
            0x2000..=0x3FFF => {
                self.rom_bank_low = value & 0x1F;
                if self.rom_bank_low == 0 {
                    self.rom_bank_low = 1;
                }
            }
            0x4000..=0x5FFF => self.bank_high = value & 0x03,
            _ => self.banking_mode = value & 0x01,
        }
        let after = self.active_rom_bank();
        if after != before {
            self.notify(MemoryEvent::BankSwitched(after));
        }
    }

    /// OAM DMA, performed instantly: 0xA0 bytes from `value * 0x100`.
    fn dma_transfer(&mut self, value: u8) {
        let source = (value as u16) << 8;
        for i in 0..OAM_SIZE {
            // Unbacked source bytes read as open bus.
            let byte = self.read(source.wrapping_add(i)).unwrap_or(0xFF);
            self.store(OAM_START + i, byte);
        }
    }

    fn store(&mut self, address: u16, value: u8) {
        self.ram[(address - RAM_START) as usize] = value;
    }

    /// Raw byte from the flat image at or above 0x8000, bypassing read side
    /// effects. Used by the renderer for VRAM, OAM and LCD registers.
    ///
    /// `address` must be at least 0x8000; ROM goes through [`Mmu::read`].
    pub fn io_register(&self, address: u16) -> u8 {
        self.ram[Self::flat_index(address)]
    }

    /// Raw store that skips write side effects, for hardware-driven
    /// registers such as LY and STAT. Same address rule as `io_register`.
    pub fn set_io_register(&mut self, address: u16, value: u8) {
        self.ram[Self::flat_index(address)] = value;
    }

    fn flat_index(address: u16) -> usize {
        debug_assert!(
            address >= RAM_START,
            "{address:#06x} is below the flat memory image"
        );
        address.wrapping_sub(RAM_START) as usize & 0x7FFF
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.if_reg |= interrupt.mask();
    }

    pub fn clear_interrupt(&mut self, interrupt: Interrupt) {
        self.if_reg &= !interrupt.mask();
    }

    pub fn interrupt_requested(&self, interrupt: Interrupt) -> bool {
        self.if_reg & interrupt.mask() != 0
    }

    pub fn interrupt_enabled(&self, interrupt: Interrupt) -> bool {
        self.ie_reg & interrupt.mask() != 0
    }

    /// `IF & IE`, limited to the five real sources.
    pub fn pending_interrupts(&self) -> u8 {
        self.if_reg & self.ie_reg & 0x1F
    }

    pub fn advance_timer(&mut self, cycles: u32) {
        self.timer.advance(cycles, &mut self.if_reg);
    }
}

impl ByteSource for Mmu {
    fn byte_at(&self, address: u16) -> Result<u8> {
        self.read(address)
    }
}
