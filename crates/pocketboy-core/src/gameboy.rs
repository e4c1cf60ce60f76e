use std::time::Duration;

use crate::{
    cartridge::Cartridge,
    cpu::Cpu,
    diagnostics::{LogSink, PcTrace, ThrottledLogger},
    error::{EmuError, Result},
    input::Button,
    instruction::decode,
    mmu::{LCDC, Mmu},
    observer::MemoryObserver,
    ppu::{Framebuffer, Ppu, cycles_to_duration},
    registers::Reg8,
};

/// Everything one emulated machine owns. Every operation takes this by
/// mutable reference; nothing is global.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub ppu: Ppu,
    pub framebuffer: Framebuffer,
    pub log: ThrottledLogger,
    pub pc_trace: PcTrace,
    /// Total T-cycles since power-on, the emulated clock.
    cycles: u64,
}

impl GameBoy {
    /// Start `cart` in the state the boot ROM would leave behind.
    pub fn new(cart: Cartridge) -> Self {
        let mut mmu = Mmu::new(cart);
        mmu.apply_post_boot_state();
        Self::assemble(Cpu::new(), mmu)
    }

    /// Power on with `boot_rom` mapped over 0x0000-0x00FF and PC at 0.
    pub fn with_boot_rom(cart: Cartridge, boot_rom: Vec<u8>) -> Self {
        let mut mmu = Mmu::new(cart);
        mmu.load_boot_rom(boot_rom);
        Self::assemble(Cpu::new_power_on(), mmu)
    }

    /// Run a boot ROM against a synthesized header-only cartridge.
    pub fn without_cartridge(boot_rom: Vec<u8>) -> Self {
        Self::with_boot_rom(Cartridge::blank(), boot_rom)
    }

    fn assemble(cpu: Cpu, mmu: Mmu) -> Self {
        Self {
            cpu,
            mmu,
            ppu: Ppu::new(),
            framebuffer: Framebuffer::new(),
            log: ThrottledLogger::default(),
            pc_trace: PcTrace::new(),
            cycles: 0,
        }
    }

    /// Run one CPU tick, then let the timer and the scanline clock catch up.
    pub fn step(&mut self) -> Result<u32> {
        self.pc_trace.record(self.cpu.regs.pc);
        let cycles = self.cpu.step(&mut self.mmu, &mut self.log)?;
        self.mmu.advance_timer(cycles);
        self.cycles += cycles as u64;
        let now = self.elapsed();
        self.ppu.handle_scanline(&mut self.mmu, now);
        Ok(cycles)
    }

    /// Emulated time since power-on.
    pub fn elapsed(&self) -> Duration {
        cycles_to_duration(self.cycles)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn lcd_enabled(&self) -> bool {
        self.mmu.io_register(LCDC) & 0x80 != 0
    }

    /// Redraw the framebuffer from current video memory.
    pub fn render(&mut self) -> Result<()> {
        self.ppu
            .render_frame(&self.mmu, &mut self.framebuffer, &mut self.log)
    }

    /// Power-cycle, keeping the cartridge, boot ROM, observer and logger.
    pub fn reset(&mut self) {
        self.mmu.reset();
        if self.mmu.boot_mapped {
            self.cpu = Cpu::new_power_on();
        } else {
            self.mmu.apply_post_boot_state();
            self.cpu = Cpu::new();
        }
        self.ppu.reset();
        self.framebuffer.clear();
        self.pc_trace.clear();
        self.cycles = 0;
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.mmu.input.set_button(button, pressed);
    }

    pub fn set_log_sink(&mut self, sink: Box<dyn LogSink>) {
        self.log.set_sink(sink);
    }

    pub fn set_observer(&mut self, observer: Box<dyn MemoryObserver>) {
        self.mmu.set_observer(observer);
    }

    /// Debugger write into a register. `value` is unchecked input.
    pub fn poke_register(&mut self, register: Reg8, value: u32) -> Result<()> {
        let byte =
            u8::try_from(value).map_err(|_| EmuError::InvalidRegisterValue { register, value })?;
        self.cpu.regs.set(register, byte);
        Ok(())
    }

    /// Debugger write into memory, with the same side effects as a CPU store.
    pub fn poke_memory(&mut self, address: u32, value: u32) -> Result<()> {
        let address =
            u16::try_from(address).map_err(|_| EmuError::OutOfRangeAddress { address })?;
        let byte =
            u8::try_from(value).map_err(|_| EmuError::InvalidAddressWrite { address, value })?;
        self.mmu.write(address, byte);
        Ok(())
    }

    /// Disassembly of the instruction at `address` as currently mapped.
    pub fn disassemble(&self, address: u16) -> Result<String> {
        Ok(decode(address, &self.mmu)?.to_string())
    }
}
