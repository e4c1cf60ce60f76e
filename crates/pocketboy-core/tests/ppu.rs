use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use pocketboy_core::{
    cartridge::Cartridge,
    diagnostics::{Level, LogSink, ThrottledLogger},
    interrupts::Interrupt,
    mmu::Mmu,
    ppu::{CYCLES_PER_SCANLINE, Framebuffer, Palette, Ppu, cycles_to_duration},
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const LIGHT: [u8; 4] = [170, 170, 170, 255];
const DARK: [u8; 4] = [85, 85, 85, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
const BORDER: [u8; 4] = [255, 0, 0, 255];

fn mmu_with_rom(prefix: &[u8]) -> Mmu {
    let mut rom = vec![0u8; 0x8000];
    rom[..prefix.len()].copy_from_slice(prefix);
    Mmu::new(Cartridge::from_bytes(rom).unwrap())
}

fn line(n: u64) -> std::time::Duration {
    cycles_to_duration(n * CYCLES_PER_SCANLINE)
}

struct Capture(Rc<RefCell<Vec<String>>>);

impl LogSink for Capture {
    fn log(&self, _level: Level, _target: &'static str, args: fmt::Arguments) {
        self.0.borrow_mut().push(args.to_string());
    }
}

#[test]
fn render_tile_decodes_bit_planes() {
    #[rustfmt::skip]
    let tiles = [
        0x5f, 0x3f, 0x3f, 0x5f, // tile 1 row 1 & 2
        0xff, 0xff, 0xff, 0xff, // tile 1 row 3 & 4
        0xff, 0xff, 0xff, 0xff, // tile 1 row 5 & 6
        0xff, 0xff, 0xff, 0xff, // tile 1 row 7 & 8
        0x5f, 0x3f, 0x3f, 0x5f, // tile 2 row 1 & 2
        0xff, 0xff, 0xff, 0xff, // tile 2 row 3 & 4
        0xff, 0xff, 0xff, 0xff, // tile 2 row 5 & 6
        0xff, 0xff, 0xff, 0xff, // tile 2 row 7 & 8
        0xf0, 0x0f, 0x00, 0x00, // tile 3 row 1 & 2
        0x00, 0x00, 0x00, 0x00, // tile 3 row 3 & 4
        0x00, 0x00, 0x00, 0x00, // tile 3 row 5 & 6
        0x00, 0x00, 0x00, 0x00, // tile 3 row 7 & 8
        0x00, 0x00, 0x00, 0x00, // tile 4 row 1 & 2
        0x00, 0x00, 0x00, 0x00, // tile 4 row 3 & 4
        0x00, 0x00, 0x00, 0x00, // tile 4 row 5 & 6
        0x00, 0x00, 0xaa, 0xcc, // tile 4 row 7 & 8
    ];
    let mut mmu = mmu_with_rom(&tiles);
    mmu.set_io_register(0xFF47, 0xE4);
    let mut ppu = Ppu::new();
    ppu.refresh_palettes(&mmu);
    let mut fb = Framebuffer::new();

    ppu.render_tile(&mmu, &mut fb, 0, 0, 0).unwrap();
    ppu.render_tile(&mmu, &mut fb, 16, 0, 8).unwrap();
    ppu.render_tile(&mmu, &mut fb, 32, 8, 0).unwrap();
    ppu.render_tile(&mmu, &mut fb, 48, 8, 8).unwrap();

    // 16x16 block, row-major.
    let mut expected = [[BLACK; 16]; 16];
    for top in [0, 8] {
        expected[top][1] = LIGHT;
        expected[top][2] = DARK;
        expected[top][0] = WHITE;
        expected[top + 1][0] = WHITE;
        expected[top + 1][1] = DARK;
        expected[top + 1][2] = LIGHT;
    }
    for y in 0..8 {
        for x in 8..16 {
            expected[y][x] = WHITE;
            expected[y + 8][x] = WHITE;
        }
    }
    for x in 8..12 {
        expected[0][x] = LIGHT;
    }
    for x in 12..16 {
        expected[0][x] = DARK;
    }
    for (x, colour) in (8..16).zip([BLACK, DARK, LIGHT, WHITE].into_iter().cycle()) {
        expected[15][x] = colour;
    }

    for (y, row) in expected.iter().enumerate() {
        for (x, colour) in row.iter().enumerate() {
            assert_eq!(fb.pixel(x, y), *colour, "pixel ({x}, {y})");
        }
    }
    // Nothing spills past the four tiles.
    assert_eq!(fb.pixel(16, 0), [0, 0, 0, 0]);
    assert_eq!(fb.pixel(0, 16), [0, 0, 0, 0]);
}

#[test]
fn render_tile_goes_through_bgp() {
    let mut mmu = mmu_with_rom(&[0x00; 16]);
    mmu.set_io_register(0xFF47, 0x1B); // 0->3, 1->2, 2->1, 3->0
    let mut ppu = Ppu::new();
    ppu.refresh_palettes(&mmu);
    let mut fb = Framebuffer::new();
    ppu.render_tile(&mmu, &mut fb, 0, 250, 250).unwrap();
    // Wraps around the 256x256 buffer.
    assert_eq!(fb.pixel(250, 250), BLACK);
    assert_eq!(fb.pixel(1, 1), BLACK);
    assert_eq!(fb.pixel(2, 2), [0, 0, 0, 0]);
}

#[test]
fn scanline_counter_and_interrupts() {
    let mut mmu = mmu_with_rom(&[]);
    mmu.set_io_register(0xFF40, 0x80);
    mmu.set_io_register(0xFF45, 2);
    let mut ppu = Ppu::new();

    ppu.handle_scanline(&mut mmu, cycles_to_duration(CYCLES_PER_SCANLINE - 1));
    assert_eq!(mmu.read(0xFF44).unwrap(), 0);

    ppu.handle_scanline(&mut mmu, line(1));
    assert_eq!(mmu.read(0xFF44).unwrap(), 1);
    assert!(!mmu.interrupt_requested(Interrupt::LcdStat));

    ppu.handle_scanline(&mut mmu, line(2));
    assert_eq!(mmu.read(0xFF44).unwrap(), 2);
    assert!(mmu.interrupt_requested(Interrupt::LcdStat));
    assert_eq!(mmu.read(0xFF41).unwrap() & 0x04, 0x04);

    ppu.handle_scanline(&mut mmu, line(143));
    assert!(!mmu.interrupt_requested(Interrupt::VBlank));
    assert_eq!(mmu.read(0xFF41).unwrap() & 0x07, 0x00);

    ppu.handle_scanline(&mut mmu, line(144));
    assert_eq!(mmu.read(0xFF44).unwrap(), 144);
    assert!(mmu.interrupt_requested(Interrupt::VBlank));
    assert_eq!(mmu.read(0xFF41).unwrap() & 0x03, 0x01);

    ppu.handle_scanline(&mut mmu, line(153));
    assert_eq!(mmu.read(0xFF44).unwrap(), 153);
    ppu.handle_scanline(&mut mmu, line(154));
    assert_eq!(mmu.read(0xFF44).unwrap(), 0);
}

#[test]
fn several_lines_in_one_call() {
    let mut mmu = mmu_with_rom(&[]);
    mmu.set_io_register(0xFF40, 0x80);
    let mut ppu = Ppu::new();
    ppu.handle_scanline(&mut mmu, line(10));
    assert_eq!(mmu.read(0xFF44).unwrap(), 10);
}

#[test]
fn lcd_off_holds_ly_at_zero() {
    let mut mmu = mmu_with_rom(&[]);
    mmu.set_io_register(0xFF40, 0x80);
    let mut ppu = Ppu::new();
    ppu.handle_scanline(&mut mmu, line(5));
    assert_eq!(mmu.read(0xFF44).unwrap(), 5);

    mmu.write(0xFF40, 0x00);
    ppu.handle_scanline(&mut mmu, line(20));
    assert_eq!(mmu.read(0xFF44).unwrap(), 0);

    // Counting restarts from the moment the LCD comes back.
    mmu.write(0xFF40, 0x80);
    ppu.handle_scanline(&mut mmu, line(20));
    assert_eq!(mmu.read(0xFF44).unwrap(), 0);
    ppu.handle_scanline(&mut mmu, line(23));
    assert_eq!(mmu.read(0xFF44).unwrap(), 3);
}

/// LCDC on, BG on, unsigned tile data; tile 1 solid colour 3, tile 0 blank.
fn video_mmu(lcdc: u8) -> Mmu {
    let mut mmu = mmu_with_rom(&[]);
    mmu.write(0xFF40, lcdc);
    mmu.write(0xFF47, 0xE4);
    mmu.write(0xFF48, 0xE4);
    mmu.write(0xFF49, 0x1B);
    for i in 0..16 {
        mmu.write(0x8010 + i, 0xFF);
    }
    mmu.write(0x9800, 0x01);
    mmu
}

fn render(mmu: &Mmu) -> Framebuffer {
    let mut ppu = Ppu::new();
    let mut fb = Framebuffer::new();
    let mut log = ThrottledLogger::default();
    ppu.render_frame(mmu, &mut fb, &mut log).unwrap();
    fb
}

#[test]
fn background_map_and_border() {
    let fb = render(&video_mmu(0x91));
    assert_eq!(fb.pixel(0, 0), BLACK);
    assert_eq!(fb.pixel(7, 7), BLACK);
    assert_eq!(fb.pixel(8, 0), WHITE);
    assert_eq!(fb.pixel(0, 8), WHITE);
    assert_eq!(fb.pixel(200, 200), WHITE);

    assert_eq!(fb.pixel(160, 0), BORDER);
    assert_eq!(fb.pixel(160, 144), BORDER);
    assert_eq!(fb.pixel(0, 144), BORDER);
    assert_eq!(fb.pixel(159, 143), WHITE);
    assert_eq!(fb.pixel(161, 0), WHITE);
}

#[test]
fn scroll_wraps_background() {
    let mut mmu = video_mmu(0x91);
    mmu.write(0xFF43, 4); // SCX
    mmu.write(0xFF42, 2); // SCY
    let fb = render(&mmu);
    assert_eq!(fb.pixel(0, 0), BLACK);
    assert_eq!(fb.pixel(3, 5), BLACK);
    assert_eq!(fb.pixel(4, 0), WHITE);
    assert_eq!(fb.pixel(0, 6), WHITE);
    assert_eq!(fb.pixel(252, 254), BLACK);
}

#[test]
fn signed_tile_addressing() {
    let mut mmu = video_mmu(0x81);
    // Tile 0 now lives at 0x9000, tile 0x81 at 0x8810.
    for i in 0..16 {
        mmu.write(0x9000 + i, 0xFF);
    }
    mmu.write(0x9800, 0x81);
    for i in 0..16 {
        mmu.write(0x8810 + i, if i % 2 == 0 { 0xFF } else { 0x00 });
    }
    let fb = render(&mmu);
    assert_eq!(fb.pixel(0, 0), LIGHT);
    assert_eq!(fb.pixel(8, 0), BLACK);
}

#[test]
fn background_disabled_is_colour_zero() {
    let fb = render(&video_mmu(0x90));
    assert_eq!(fb.pixel(0, 0), WHITE);
    assert_eq!(fb.pixel(160, 0), BORDER);
}

fn put_sprite(mmu: &mut Mmu, index: u16, y: u8, x: u8, tile: u8, flags: u8) {
    let base = 0xFE00 + index * 4;
    mmu.write(base, y);
    mmu.write(base + 1, x);
    mmu.write(base + 2, tile);
    mmu.write(base + 3, flags);
}

/// Tile 2: only the top-left pixel is set, colour 1.
fn put_dot_tile(mmu: &mut Mmu) {
    mmu.write(0x8020, 0x80);
}

#[test]
fn sprites_draw_over_background() {
    let mut mmu = video_mmu(0x93);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16 + 20, 8 + 30, 2, 0x00);
    let fb = render(&mmu);
    assert_eq!(fb.pixel(30, 20), LIGHT);
    // Colour 0 is transparent.
    assert_eq!(fb.pixel(31, 20), WHITE);
}

#[test]
fn sprite_flips_and_palette() {
    let mut mmu = video_mmu(0x93);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16 + 20, 8 + 30, 2, 0x20 | 0x40 | 0x10);
    let fb = render(&mmu);
    assert_eq!(fb.pixel(30, 20), WHITE);
    // OBP1 maps colour 1 to shade 2.
    assert_eq!(fb.pixel(37, 27), DARK);
}

#[test]
fn sprite_behind_nonzero_background() {
    let mut mmu = video_mmu(0x93);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16, 8, 2, 0x80); // over black tile
    put_sprite(&mut mmu, 1, 16, 8 + 8, 2, 0x80); // over white tile
    let fb = render(&mmu);
    assert_eq!(fb.pixel(0, 0), BLACK);
    assert_eq!(fb.pixel(8, 0), LIGHT);
}

#[test]
fn lower_oam_index_wins() {
    let mut mmu = video_mmu(0x93);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16 + 20, 8 + 30, 2, 0x10);
    put_sprite(&mut mmu, 5, 16 + 20, 8 + 30, 2, 0x00);
    let fb = render(&mmu);
    assert_eq!(fb.pixel(30, 20), DARK);
}

#[test]
fn sprites_hidden_when_disabled() {
    let mut mmu = video_mmu(0x91);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16 + 20, 8 + 30, 2, 0x00);
    let fb = render(&mmu);
    assert_eq!(fb.pixel(30, 20), WHITE);
}

#[test]
fn unsupported_features_warn_once_and_are_skipped() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let mut log = ThrottledLogger::new(Box::new(Capture(lines.clone())));
    let mut mmu = video_mmu(0x91 | 0x20 | 0x04 | 0x02);
    put_dot_tile(&mut mmu);
    put_sprite(&mut mmu, 0, 16 + 20, 8 + 30, 2, 0x00);

    let mut ppu = Ppu::new();
    let mut fb = Framebuffer::new();
    ppu.render_frame(&mmu, &mut fb, &mut log).unwrap();
    ppu.render_frame(&mmu, &mut fb, &mut log).unwrap();

    assert_eq!(lines.borrow().len(), 2);
    assert_eq!(fb.pixel(30, 20), WHITE);
}

#[test]
fn custom_palette() {
    let mmu = video_mmu(0x91);
    let mut palette = Palette::default();
    palette.shades[3] = [8, 24, 32, 255];
    palette.border = [0, 0, 255, 255];
    let mut ppu = Ppu::with_palette(palette);
    let mut fb = Framebuffer::new();
    ppu.render_frame(&mmu, &mut fb, &mut ThrottledLogger::default())
        .unwrap();
    assert_eq!(fb.pixel(0, 0), [8, 24, 32, 255]);
    assert_eq!(fb.pixel(160, 10), [0, 0, 255, 255]);
}
