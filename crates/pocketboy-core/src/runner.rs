use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{error, info};
use thiserror::Error;

use crate::error::Result;
use crate::gameboy::GameBoy;
use crate::mmu::Region;
use crate::ppu::cycles_to_duration;

/// One frame: 154 scanlines of 456 cycles.
pub const FRAME_CYCLES: u64 = 70_224;

/// PC to stop at, optionally qualified by the ROM bank mapped there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub pc: u16,
    pub bank: Option<usize>,
}

impl Breakpoint {
    pub fn new(pc: u16) -> Self {
        Self { pc, bank: None }
    }

    pub fn in_bank(bank: usize, pc: u16) -> Self {
        Self {
            pc,
            bank: Some(bank),
        }
    }

    pub fn matches(&self, gb: &GameBoy) -> bool {
        let pc = gb.cpu.regs.pc;
        if pc != self.pc {
            return false;
        }
        match self.bank {
            None => true,
            Some(bank) => gb.mmu.resolve(pc).region == Region::Rom(bank),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid breakpoint `{0}`, expected `ADDR` or `BANK:ADDR` in hex")]
pub struct ParseBreakpointError(String);

fn parse_hex(text: &str) -> Option<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

impl FromStr for Breakpoint {
    type Err = ParseBreakpointError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseBreakpointError(s.to_string());
        match s.split_once(':') {
            Some((bank, pc)) => {
                let bank = parse_hex(bank).ok_or_else(err)? as usize;
                let pc = parse_hex(pc).and_then(|v| u16::try_from(v).ok());
                Ok(Self::in_bank(bank, pc.ok_or_else(err)?))
            }
            None => {
                let pc = parse_hex(s).and_then(|v| u16::try_from(v).ok());
                Ok(Self::new(pc.ok_or_else(err)?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Emulated time each burst may consume.
    pub budget: Duration,
    pub breakpoint: Option<Breakpoint>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            budget: cycles_to_duration(FRAME_CYCLES),
            breakpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Budget used up; the scheduler should call again after `resume_after`.
    Continue { resume_after: Duration },
    Paused,
    BreakpointHit(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstOutcome {
    pub ticks: u64,
    pub cycles: u64,
    pub rendered: bool,
    pub state: RunState,
}

/// Cooperative run loop. Each call to [`Runner::run_burst`] runs one bounded
/// slice of emulation and returns; the caller decides when to resume.
pub struct Runner {
    config: RunConfig,
    paused: bool,
    /// Lets the first tick after a resume leave the breakpoint address.
    skip_breakpoint: bool,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            paused: false,
            skip_breakpoint: false,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.skip_breakpoint = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_breakpoint(&mut self, breakpoint: Option<Breakpoint>) {
        self.config.breakpoint = breakpoint;
    }

    /// Execute ticks until the budget is spent or a breakpoint is reached,
    /// then render once if the LCD is on.
    ///
    /// Errors pause the runner and are returned as-is.
    pub fn run_burst(&mut self, gb: &mut GameBoy) -> Result<BurstOutcome> {
        let started = Instant::now();
        let mut outcome = BurstOutcome {
            ticks: 0,
            cycles: 0,
            rendered: false,
            state: RunState::Paused,
        };
        if self.paused {
            return Ok(outcome);
        }

        let mut hit = None;
        while cycles_to_duration(outcome.cycles) < self.config.budget {
            if let Some(bp) = self.config.breakpoint
                && !self.skip_breakpoint
                && bp.matches(gb)
            {
                info!("breakpoint hit at {:#06x}", bp.pc);
                hit = Some(bp.pc);
                self.paused = true;
                break;
            }
            self.skip_breakpoint = false;
            let cycles = self.guard(gb.step())?;
            outcome.ticks += 1;
            outcome.cycles += cycles as u64;
        }

        if gb.lcd_enabled() {
            self.guard(gb.render())?;
            outcome.rendered = true;
        }

        outcome.state = match hit {
            Some(pc) => RunState::BreakpointHit(pc),
            None => RunState::Continue {
                resume_after: self.config.budget.saturating_sub(started.elapsed()),
            },
        };
        Ok(outcome)
    }

    /// Single tick regardless of pause state or breakpoints.
    pub fn step_instruction(&mut self, gb: &mut GameBoy) -> Result<u32> {
        self.skip_breakpoint = false;
        self.guard(gb.step())
    }

    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("emulation stopped: {e}");
            self.paused = true;
        }
        result
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}
