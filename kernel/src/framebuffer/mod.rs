//! Linear Framebuffer
//!
//! Pixel-level access to the VESA framebuffer handed over by stage 2.
//! Provides the drawing primitives behind the graphics syscalls and
//! the framebuffer console. All operations are no-ops until `init`
//! runs with a usable mode description.

use core::sync::atomic::{AtomicU64, Ordering};
use noto_sans_mono_bitmap::{get_raster, get_raster_width, FontWeight, RasterHeight};

use crate::boot::FramebufferDescription;

/// Glyph height used for text rendering
const FONT_RASTER: RasterHeight = RasterHeight::Size16;

/// Rendered glyph cell height in pixels
pub const FONT_HEIGHT: usize = 16;

/// Rendered glyph cell width in pixels
pub const FONT_WIDTH: usize = get_raster_width(FontWeight::Regular, FONT_RASTER);

static FB_ADDR: AtomicU64 = AtomicU64::new(0);
static FB_WIDTH: AtomicU64 = AtomicU64::new(0);
static FB_HEIGHT: AtomicU64 = AtomicU64::new(0);
static FB_PITCH: AtomicU64 = AtomicU64::new(0);
static FB_BPP: AtomicU64 = AtomicU64::new(0);

/// Adopt the framebuffer described by the stage-2 handoff block.
pub fn init(desc: &FramebufferDescription) {
    let addr = desc.framebuffer_addr;
    let width = desc.width;
    let height = desc.height;
    let pitch = desc.pitch;
    let bpp = desc.bpp;

    if addr == 0 || width == 0 || height == 0 || (bpp != 32 && bpp != 24) {
        return;
    }

    FB_ADDR.store(addr as u64, Ordering::SeqCst);
    FB_WIDTH.store(width as u64, Ordering::SeqCst);
    FB_HEIGHT.store(height as u64, Ordering::SeqCst);
    FB_PITCH.store(pitch as u64, Ordering::SeqCst);
    FB_BPP.store(bpp as u64, Ordering::SeqCst);
}

/// True once a linear framebuffer has been adopted.
pub fn is_available() -> bool {
    FB_ADDR.load(Ordering::SeqCst) != 0
}

/// Screen width in pixels (0 without a framebuffer).
pub fn width() -> u32 {
    FB_WIDTH.load(Ordering::SeqCst) as u32
}

/// Screen height in pixels (0 without a framebuffer).
pub fn height() -> u32 {
    FB_HEIGHT.load(Ordering::SeqCst) as u32
}

/// Physical framebuffer address (0 without a framebuffer).
pub fn address() -> u64 {
    FB_ADDR.load(Ordering::SeqCst)
}

fn pixel_ptr(x: u32, y: u32) -> Option<(*mut u8, u64)> {
    let addr = FB_ADDR.load(Ordering::SeqCst);
    if addr == 0 || x >= width() || y >= height() {
        return None;
    }
    let pitch = FB_PITCH.load(Ordering::SeqCst);
    let bytes = FB_BPP.load(Ordering::SeqCst) / 8;
    let offset = y as u64 * pitch + x as u64 * bytes;
    Some(((addr + offset) as *mut u8, bytes))
}

/// Write one pixel in 0x00RRGGBB form.
pub fn put_pixel(x: u32, y: u32, color: u32) {
    if let Some((p, bytes)) = pixel_ptr(x, y) {
        unsafe {
            if bytes == 4 {
                (p as *mut u32).write_volatile(color);
            } else {
                p.write_volatile((color & 0xFF) as u8);
                p.add(1).write_volatile(((color >> 8) & 0xFF) as u8);
                p.add(2).write_volatile(((color >> 16) & 0xFF) as u8);
            }
        }
    }
}

/// Read back one pixel, 0 outside the screen.
pub fn get_pixel(x: u32, y: u32) -> u32 {
    match pixel_ptr(x, y) {
        Some((p, bytes)) => unsafe {
            if bytes == 4 {
                (p as *const u32).read_volatile() & 0x00FF_FFFF
            } else {
                (p.read_volatile() as u32)
                    | ((p.add(1).read_volatile() as u32) << 8)
                    | ((p.add(2).read_volatile() as u32) << 16)
            }
        },
        None => 0,
    }
}

/// Fill the whole screen with one colour.
pub fn clear(color: u32) {
    let (w, h) = (width(), height());
    for y in 0..h {
        for x in 0..w {
            put_pixel(x, y, color);
        }
    }
}

/// Bresenham line.
pub fn draw_line(x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        if x >= 0 && y >= 0 {
            put_pixel(x as u32, y as u32, color);
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Rectangle outline.
pub fn draw_rect(x: i32, y: i32, w: i32, h: i32, color: u32) {
    if w <= 0 || h <= 0 {
        return;
    }
    draw_line(x, y, x + w - 1, y, color);
    draw_line(x, y + h - 1, x + w - 1, y + h - 1, color);
    draw_line(x, y, x, y + h - 1, color);
    draw_line(x + w - 1, y, x + w - 1, y + h - 1, color);
}

/// Filled rectangle.
pub fn fill_rect(x: i32, y: i32, w: i32, h: i32, color: u32) {
    for yy in y.max(0)..(y + h).max(0) {
        for xx in x.max(0)..(x + w).max(0) {
            put_pixel(xx as u32, yy as u32, color);
        }
    }
}

fn blend(fg: u32, bg: u32, intensity: u8) -> u32 {
    let mix = |shift: u32| {
        let f = (fg >> shift) & 0xFF;
        let b = (bg >> shift) & 0xFF;
        ((f * intensity as u32 + b * (255 - intensity as u32)) / 255) & 0xFF
    };
    (mix(16) << 16) | (mix(8) << 8) | mix(0)
}

/// Render one character at a pixel position.
pub fn draw_char(x: u32, y: u32, c: char, fg: u32, bg: u32) {
    let raster = get_raster(c, FontWeight::Regular, FONT_RASTER)
        .or_else(|| get_raster('?', FontWeight::Regular, FONT_RASTER));
    let raster = match raster {
        Some(r) => r,
        None => return,
    };

    for (dy, row) in raster.raster().iter().enumerate() {
        for (dx, intensity) in row.iter().enumerate() {
            put_pixel(x + dx as u32, y + dy as u32, blend(fg, bg, *intensity));
        }
    }
}

/// Render a string at a pixel position.
pub fn draw_string(x: u32, y: u32, s: &str, fg: u32, bg: u32) {
    let mut cx = x;
    for c in s.chars() {
        draw_char(cx, y, c, fg, bg);
        cx += FONT_WIDTH as u32;
    }
}

/// Scroll the screen contents up by `lines` pixel rows.
pub fn scroll_up(lines: u32, fill: u32) {
    let addr = FB_ADDR.load(Ordering::SeqCst);
    if addr == 0 || lines == 0 {
        return;
    }
    let pitch = FB_PITCH.load(Ordering::SeqCst) as usize;
    let h = height();
    if lines >= h {
        clear(fill);
        return;
    }

    unsafe {
        let base = addr as *mut u8;
        core::ptr::copy(
            base.add(lines as usize * pitch),
            base,
            (h - lines) as usize * pitch,
        );
    }
    for y in (h - lines)..h {
        for x in 0..width() {
            put_pixel(x, y, fill);
        }
    }
}
