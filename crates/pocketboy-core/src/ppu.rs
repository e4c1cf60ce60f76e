use std::time::Duration;

use crate::diagnostics::ThrottledLogger;
use crate::error::Result;
use crate::interrupts::Interrupt;
use crate::mmu::{LCDC, LY, Mmu, STAT};

pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LYC: u16 = 0xFF45;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;

pub const CPU_CLOCK_HZ: u64 = 4_194_304;
pub const CYCLES_PER_SCANLINE: u64 = 456;
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const FRAMEBUFFER_WIDTH: usize = 256;
pub const FRAMEBUFFER_HEIGHT: usize = 256;

const LINES_PER_FRAME: u8 = 154;
const VBLANK_LINE: u8 = 144;
const TOTAL_SPRITES: u16 = 40;
const OAM_START: u16 = 0xFE00;
const TILE_BYTES: u16 = 16;

// LCDC bits
const LCDC_BG_ENABLE: u8 = 0x01;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_OBJ_TALL: u8 = 0x04;
const LCDC_BG_MAP_HIGH: u8 = 0x08;
const LCDC_TILE_DATA_UNSIGNED: u8 = 0x10;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_ENABLE: u8 = 0x80;

// Sprite attribute flags
const OBJ_BEHIND_BG: u8 = 0x80;
const OBJ_FLIP_Y: u8 = 0x40;
const OBJ_FLIP_X: u8 = 0x20;
const OBJ_PALETTE1: u8 = 0x10;

const STAT_COINCIDENCE: u8 = 0x04;
const STAT_MODE_MASK: u8 = 0x03;
const MODE_HBLANK: u8 = 0;
const MODE_VBLANK: u8 = 1;

/// Emulated time for `cycles` CPU cycles.
pub fn cycles_to_duration(cycles: u64) -> Duration {
    let nanos = cycles as u128 * 1_000_000_000 / CPU_CLOCK_HZ as u128;
    Duration::from_nanos(nanos as u64)
}

/// RGBA values for the four DMG shades plus the border colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub shades: [[u8; 4]; 4],
    pub border: [u8; 4],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            shades: [
                [255, 255, 255, 255],
                [170, 170, 170, 255],
                [85, 85, 85, 255],
                [0, 0, 0, 255],
            ],
            border: [255, 0, 0, 255],
        }
    }
}

/// 256x256 RGBA buffer. The visible display is the top-left 160x144.
#[derive(Clone)]
pub struct Framebuffer {
    pixels: Vec<[u8; 4]>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            pixels: vec![[0; 4]; FRAMEBUFFER_WIDTH * FRAMEBUFFER_HEIGHT],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        self.pixels[y * FRAMEBUFFER_WIDTH + x]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        self.pixels[y * FRAMEBUFFER_WIDTH + x] = rgba;
    }

    /// Row-major RGBA bytes, four per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_flattened()
    }

    pub fn clear(&mut self) {
        self.pixels.fill([0; 4]);
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Ppu {
    /// Emulated time at which scanline counting (re)started.
    origin: Duration,
    /// Scanlines elapsed since `origin`.
    lines: u64,
    pub palette: Palette,
    /// 2-bit colour index to shade index, from BGP.
    bg_lut: [u8; 4],
    /// Same for OBP0 and OBP1.
    obj_luts: [[u8; 4]; 2],
    /// Background colour index per framebuffer pixel, for sprite priority.
    bg_indices: Vec<u8>,
}

impl Ppu {
    pub fn new() -> Self {
        Self::with_palette(Palette::default())
    }

    pub fn with_palette(palette: Palette) -> Self {
        Self {
            origin: Duration::ZERO,
            lines: 0,
            palette,
            bg_lut: [0, 1, 2, 3],
            obj_luts: [[0, 1, 2, 3]; 2],
            bg_indices: vec![0; FRAMEBUFFER_WIDTH * FRAMEBUFFER_HEIGHT],
        }
    }

    pub fn reset(&mut self) {
        self.origin = Duration::ZERO;
        self.lines = 0;
    }

    fn next_deadline(&self) -> Duration {
        self.origin + cycles_to_duration((self.lines + 1) * CYCLES_PER_SCANLINE)
    }

    /// Advance LY for every scanline whose deadline `now` has passed.
    ///
    /// Reaching line 144 requests VBlank. Landing on LYC requests the STAT
    /// interrupt. While the LCD is off LY stays at 0 and counting restarts
    /// from `now` once it is switched back on.
    pub fn handle_scanline(&mut self, mmu: &mut Mmu, now: Duration) {
        if mmu.io_register(LCDC) & LCDC_ENABLE == 0 {
            self.origin = now;
            self.lines = 0;
            mmu.set_io_register(LY, 0);
            self.update_stat(mmu, 0);
            return;
        }

        while now >= self.next_deadline() {
            self.lines += 1;
            let ly = mmu.io_register(LY).wrapping_add(1) % LINES_PER_FRAME;
            mmu.set_io_register(LY, ly);
            if ly == VBLANK_LINE {
                mmu.request_interrupt(Interrupt::VBlank);
            }
            if ly == mmu.io_register(LYC) {
                mmu.request_interrupt(Interrupt::LcdStat);
            }
            self.update_stat(mmu, ly);
        }
    }

    fn update_stat(&self, mmu: &mut Mmu, ly: u8) {
        let mut stat = mmu.io_register(STAT) & !(STAT_COINCIDENCE | STAT_MODE_MASK);
        if ly == mmu.io_register(LYC) {
            stat |= STAT_COINCIDENCE;
        }
        stat |= if ly >= VBLANK_LINE {
            MODE_VBLANK
        } else {
            MODE_HBLANK
        };
        mmu.set_io_register(STAT, stat);
    }

    /// Rebuild the colour lookup tables from BGP, OBP0 and OBP1.
    pub fn refresh_palettes(&mut self, mmu: &Mmu) {
        self.bg_lut = Self::palette_lut(mmu.io_register(BGP));
        self.obj_luts = [
            Self::palette_lut(mmu.io_register(OBP0)),
            Self::palette_lut(mmu.io_register(OBP1)),
        ];
    }

    fn palette_lut(reg: u8) -> [u8; 4] {
        [0, 1, 2, 3].map(|i| (reg >> (i * 2)) & 0x03)
    }

    /// Decode the 16-byte tile at `tile_start` into 2-bit colour indices,
    /// `[row][col]`. Each row is a low bit-plane byte followed by a high
    /// bit-plane byte, MSB leftmost.
    fn tile_indices(mmu: &Mmu, tile_start: u16) -> Result<[[u8; 8]; 8]> {
        let mut tile = [[0u8; 8]; 8];
        for (row, line) in tile.iter_mut().enumerate() {
            let addr = tile_start.wrapping_add(row as u16 * 2);
            let lo = mmu.read(addr)?;
            let hi = mmu.read(addr.wrapping_add(1))?;
            for (col, px) in line.iter_mut().enumerate() {
                let bit = 7 - col;
                *px = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
            }
        }
        Ok(tile)
    }

    /// Draw one background tile with its top-left corner at (`x`, `y`),
    /// wrapping around the 256x256 buffer.
    pub fn render_tile(
        &mut self,
        mmu: &Mmu,
        fb: &mut Framebuffer,
        tile_start: u16,
        x: u8,
        y: u8,
    ) -> Result<()> {
        let tile = Self::tile_indices(mmu, tile_start)?;
        for (row, line) in tile.iter().enumerate() {
            let py = y.wrapping_add(row as u8) as usize;
            for (col, &index) in line.iter().enumerate() {
                let px = x.wrapping_add(col as u8) as usize;
                let shade = self.bg_lut[index as usize];
                fb.set_pixel(px, py, self.palette.shades[shade as usize]);
                self.bg_indices[py * FRAMEBUFFER_WIDTH + px] = index;
            }
        }
        Ok(())
    }

    /// Address of background tile `index` under the current LCDC addressing
    /// mode: unsigned from 0x8000, or signed around 0x9000.
    fn bg_tile_address(lcdc: u8, index: u8) -> u16 {
        if lcdc & LCDC_TILE_DATA_UNSIGNED != 0 {
            0x8000 + index as u16 * TILE_BYTES
        } else {
            0x9000u16.wrapping_add_signed(index as i8 as i16 * TILE_BYTES as i16)
        }
    }

    /// Redraw the whole frame from VRAM, OAM and the LCD registers.
    pub fn render_frame(
        &mut self,
        mmu: &Mmu,
        fb: &mut Framebuffer,
        log: &mut ThrottledLogger,
    ) -> Result<()> {
        self.refresh_palettes(mmu);
        let lcdc = mmu.io_register(LCDC);

        if lcdc & LCDC_BG_ENABLE != 0 {
            self.render_background(mmu, fb, lcdc)?;
        } else {
            let blank = self.palette.shades[self.bg_lut[0] as usize];
            for y in 0..FRAMEBUFFER_HEIGHT {
                for x in 0..FRAMEBUFFER_WIDTH {
                    fb.set_pixel(x, y, blank);
                }
            }
            self.bg_indices.fill(0);
        }

        if lcdc & LCDC_WINDOW_ENABLE != 0 {
            log.warn_once(
                "window",
                format_args!("window layer is not supported, skipping"),
            );
        }

        if lcdc & LCDC_OBJ_ENABLE != 0 {
            if lcdc & LCDC_OBJ_TALL != 0 {
                log.warn_once(
                    "tall-sprites",
                    format_args!("8x16 sprites are not supported, skipping"),
                );
            } else {
                self.render_sprites(mmu, fb)?;
            }
        }

        self.draw_border(fb);
        Ok(())
    }

    /// The 32x32 tile map, shifted by SCY/SCX so the viewport lands at the
    /// buffer origin.
    fn render_background(&mut self, mmu: &Mmu, fb: &mut Framebuffer, lcdc: u8) -> Result<()> {
        let map_base: u16 = if lcdc & LCDC_BG_MAP_HIGH != 0 {
            0x9C00
        } else {
            0x9800
        };
        let scx = mmu.io_register(SCX);
        let scy = mmu.io_register(SCY);
        for row in 0..32u16 {
            for col in 0..32u16 {
                let index = mmu.io_register(map_base + row * 32 + col);
                let tile_start = Self::bg_tile_address(lcdc, index);
                let x = ((col * 8) as u8).wrapping_sub(scx);
                let y = ((row * 8) as u8).wrapping_sub(scy);
                self.render_tile(mmu, fb, tile_start, x, y)?;
            }
        }
        Ok(())
    }

    fn render_sprites(&self, mmu: &Mmu, fb: &mut Framebuffer) -> Result<()> {
        // Highest index first so lower OAM entries end up on top.
        for i in (0..TOTAL_SPRITES).rev() {
            let entry = OAM_START + i * 4;
            let sy = mmu.io_register(entry) as i16 - 16;
            let sx = mmu.io_register(entry + 1) as i16 - 8;
            let tile_index = mmu.io_register(entry + 2);
            let flags = mmu.io_register(entry + 3);

            if sx <= -8 || sy <= -8 || sx >= SCREEN_WIDTH as i16 || sy >= SCREEN_HEIGHT as i16 {
                continue;
            }

            let tile = Self::tile_indices(mmu, 0x8000 + tile_index as u16 * TILE_BYTES)?;
            let lut = &self.obj_luts[usize::from(flags & OBJ_PALETTE1 != 0)];
            for row in 0..8 {
                let py = sy + row as i16;
                if !(0..SCREEN_HEIGHT as i16).contains(&py) {
                    continue;
                }
                let src_row = if flags & OBJ_FLIP_Y != 0 { 7 - row } else { row };
                for col in 0..8 {
                    let px = sx + col as i16;
                    if !(0..SCREEN_WIDTH as i16).contains(&px) {
                        continue;
                    }
                    let src_col = if flags & OBJ_FLIP_X != 0 { 7 - col } else { col };
                    let index = tile[src_row][src_col];
                    if index == 0 {
                        continue;
                    }
                    let (px, py) = (px as usize, py as usize);
                    if flags & OBJ_BEHIND_BG != 0
                        && self.bg_indices[py * FRAMEBUFFER_WIDTH + px] != 0
                    {
                        continue;
                    }
                    let shade = lut[index as usize];
                    fb.set_pixel(px, py, self.palette.shades[shade as usize]);
                }
            }
        }
        Ok(())
    }

    /// One-pixel frame just outside the visible area.
    fn draw_border(&self, fb: &mut Framebuffer) {
        for y in 0..=SCREEN_HEIGHT {
            fb.set_pixel(SCREEN_WIDTH, y, self.palette.border);
        }
        for x in 0..=SCREEN_WIDTH {
            fb.set_pixel(x, SCREEN_HEIGHT, self.palette.border);
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}
