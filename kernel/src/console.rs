//! Kernel Console
//!
//! Text output on the framebuffer with a serial mirror. This is the
//! surface behind the print/write syscalls and the shell prompt;
//! without a framebuffer everything still lands on the serial port.

use spin::Mutex;

use crate::framebuffer::{self, FONT_HEIGHT, FONT_WIDTH};

/// 0x00RRGGBB colour helpers
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

pub const COLOR_BLACK: u32 = rgb(0, 0, 0);
pub const COLOR_WHITE: u32 = rgb(255, 255, 255);
pub const COLOR_GRAY: u32 = rgb(128, 128, 128);
pub const COLOR_RED: u32 = rgb(255, 102, 102);
pub const COLOR_GREEN: u32 = rgb(102, 255, 102);
pub const COLOR_CYAN: u32 = rgb(102, 255, 255);
pub const COLOR_YELLOW: u32 = rgb(255, 255, 102);

struct Cursor {
    col: u32,
    row: u32,
}

static CURSOR: Mutex<Cursor> = Mutex::new(Cursor { col: 0, row: 0 });

/// Default background
const BG: u32 = COLOR_BLACK;

fn columns() -> u32 {
    (framebuffer::width() / FONT_WIDTH as u32).max(1)
}

fn rows() -> u32 {
    (framebuffer::height() / FONT_HEIGHT as u32).max(1)
}

/// Move to the next line, scrolling when the screen is full.
pub fn newline() {
    crate::serial_print!("\n");
    if !framebuffer::is_available() {
        return;
    }

    let mut cursor = CURSOR.lock();
    cursor.col = 0;
    if cursor.row + 1 >= rows() {
        framebuffer::scroll_up(FONT_HEIGHT as u32, BG);
    } else {
        cursor.row += 1;
    }
}

/// Write a single character at the cursor.
pub fn putchar(c: char, color: u32) {
    if c == '\n' {
        newline();
        return;
    }

    crate::serial_print!("{}", c);
    if !framebuffer::is_available() {
        return;
    }

    {
        let mut cursor = CURSOR.lock();
        if cursor.col >= columns() {
            drop(cursor);
            newline();
            cursor = CURSOR.lock();
        }
        framebuffer::draw_char(
            cursor.col * FONT_WIDTH as u32,
            cursor.row * FONT_HEIGHT as u32,
            c,
            color,
            BG,
        );
        cursor.col += 1;
    }
}

/// Write a string at the cursor.
pub fn print(s: &str, color: u32) {
    for c in s.chars() {
        putchar(c, color);
    }
}

/// Write raw bytes (lossy) at the cursor.
pub fn write_bytes(bytes: &[u8], color: u32) {
    for &b in bytes {
        putchar(b as char, color);
    }
}

/// Clear the screen and home the cursor.
pub fn clear() {
    if framebuffer::is_available() {
        framebuffer::clear(BG);
    }
    let mut cursor = CURSOR.lock();
    cursor.col = 0;
    cursor.row = 0;
}

/// Console dimensions in character cells (80x25 without a framebuffer,
/// matching the VGA text mode the loader falls back to).
pub fn dimensions() -> (u32, u32) {
    if framebuffer::is_available() {
        (columns(), rows())
    } else {
        (80, 25)
    }
}
