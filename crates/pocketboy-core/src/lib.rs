//! DMG-class handheld emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/MMU/PPU/timer).
//! Frontends drive the core through the [`gameboy`] context object and the
//! cooperative [`runner`] loop.

/// Bit extraction and signed-byte helpers.
pub mod bits;

/// Cartridge image parsing and ROM bank split.
pub mod cartridge;

/// LR35902 CPU core.
pub mod cpu;

/// Lazily built per-region instruction tables.
pub mod decode_cache;

/// Injected logging, call-site throttling and the PC trace.
pub mod diagnostics;

/// Tagged failures surfaced to the run loop.
pub mod error;

/// Context object that wires the CPU, MMU, PPU and framebuffer together.
pub mod gameboy;

/// Joypad register and button state.
pub mod input;

/// Instruction decoder and disassembly.
pub mod instruction;

/// Interrupt sources, vectors and priority.
pub mod interrupts;

/// Memory map, bank switching and I/O side effects.
pub mod mmu;

/// Change notifications for presentation layers.
pub mod observer;

/// Scanline clock and tile/sprite renderer.
pub mod ppu;

/// Register file and flag arithmetic.
pub mod registers;

/// Budgeted run loop with breakpoints.
pub mod runner;

/// Divider/timer unit.
pub mod timer;

pub use error::{EmuError, Result};
