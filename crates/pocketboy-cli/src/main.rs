use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use pocketboy_core::{
    bits::hex16,
    cartridge::Cartridge,
    gameboy::GameBoy,
    ppu::{FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH},
    runner::{Breakpoint, RunConfig, RunState, Runner},
};

mod config;

const DEFAULT_TRACE_PATH: &str = "pc-trace.txt";

#[derive(Parser)]
#[command(version, about = "Headless DMG emulator")]
struct Args {
    /// Path to ROM file
    rom: Option<PathBuf>,

    /// Boot ROM mapped over 0x0000-0x00FF until the program disables it
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Run the boot ROM against a blank cartridge
    #[arg(long, requires = "bootrom", conflicts_with = "rom")]
    no_cartridge: bool,

    /// Config file to use instead of the per-user default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many bursts (one frame of emulated time each by default)
    #[arg(long)]
    bursts: Option<u64>,

    /// Pause at this PC, as `ADDR` or `BANK:ADDR` in hex
    #[arg(long)]
    breakpoint: Option<Breakpoint>,

    /// Record executed PCs and write them here on exit
    #[arg(long)]
    trace_pc: Option<PathBuf>,

    /// Write the final framebuffer as a PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&config_path);

    let boot_rom = match args.bootrom.as_ref().or(cfg.boot_rom_path.as_ref()) {
        Some(path) => Some(
            std::fs::read(path)
                .map_err(|e| format!("Failed to load boot ROM {}: {e}", path.display()))?,
        ),
        None => None,
    };

    let mut gb = if args.no_cartridge {
        let boot_rom = boot_rom.ok_or("--no-cartridge needs a boot ROM")?;
        GameBoy::without_cartridge(boot_rom)
    } else {
        let rom_path = args.rom.as_ref().ok_or("No ROM supplied")?;
        let cart = Cartridge::from_file(rom_path)?;
        match boot_rom {
            Some(boot_rom) => GameBoy::with_boot_rom(cart, boot_rom),
            None => GameBoy::new(cart),
        }
    };
    gb.ppu.palette = cfg.palette();

    let trace_path = args
        .trace_pc
        .clone()
        .or_else(|| cfg.trace_pc.then(|| PathBuf::from(DEFAULT_TRACE_PATH)));
    gb.pc_trace.set_enabled(trace_path.is_some());

    let breakpoint = match (args.breakpoint, cfg.breakpoint.as_deref()) {
        (Some(bp), _) => Some(bp),
        (None, Some(text)) => Some(text.parse::<Breakpoint>()?),
        (None, None) => None,
    };
    let mut run_config = RunConfig {
        breakpoint,
        ..RunConfig::default()
    };
    if let Some(ms) = cfg.budget_ms {
        run_config.budget = Duration::from_millis(ms);
    }

    info!("Starting emulator: {}", gb.mmu.cartridge().title);
    let mut runner = Runner::new(run_config);
    let result = run_bursts(&mut runner, &mut gb, args.bursts);

    // Outputs are written even when the run stopped on an error.
    if let Some(path) = trace_path {
        let file = File::create(&path)?;
        gb.pc_trace.write_to(BufWriter::new(file))?;
        info!("Wrote {} PCs to {}", gb.pc_trace.len(), path.display());
    }
    if let Some(path) = args.screenshot.as_deref() {
        write_screenshot(&gb, path)?;
    }

    result
}

fn run_bursts(
    runner: &mut Runner,
    gb: &mut GameBoy,
    limit: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let mut bursts = 0u64;
    while limit.is_none_or(|max| bursts < max) {
        let outcome = runner.run_burst(gb)?;
        bursts += 1;
        match outcome.state {
            RunState::Continue { resume_after } => std::thread::sleep(resume_after),
            RunState::BreakpointHit(pc) => {
                let text = gb
                    .disassemble(pc)
                    .unwrap_or_else(|e| format!("<{e}>"));
                info!("Breakpoint at {}: {text}", hex16(pc));
                info!("{}", gb.cpu.debug_state());
                break;
            }
            RunState::Paused => {
                warn!("Runner paused");
                break;
            }
        }
    }
    info!(
        "Stopped after {bursts} bursts, {} cycles, PC={}",
        gb.cycles(),
        hex16(gb.cpu.regs.pc)
    );
    Ok(())
}

fn write_screenshot(gb: &GameBoy, path: &Path) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        FRAMEBUFFER_WIDTH as u32,
        FRAMEBUFFER_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(gb.framebuffer.as_bytes())?;
    info!("Saved screenshot to {}", path.display());
    Ok(())
}
