//! System Call Gate
//!
//! Interrupt-triggered dispatcher behind vector 0x80 with two dispatch
//! tables: the native NBOS table (64 slots) and a Linux-compatible
//! table (512 slots, see [`linux`]). A process-wide flag selects which
//! table an incoming syscall goes through; the shell flips it with
//! `set_linux_mode`.
//!
//! Register convention (System V AMD64 adapted for interrupt entry):
//! number in RAX, arguments in RDI, RSI, RDX, R10, R8, R9, result in
//! RAX.

pub mod linux;

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use spin::RwLock;

use crate::interrupts::InterruptFrame;

/// Size of the native dispatch table
pub const NATIVE_MAX: usize = 64;

/// Native syscall numbers
pub mod nr {
    pub const EXIT: u64 = 0;
    pub const PRINT: u64 = 1;
    pub const GETKEY: u64 = 2;
    pub const KBHIT: u64 = 3;
    pub const MALLOC: u64 = 4;
    pub const FREE: u64 = 5;
    pub const SLEEP: u64 = 6;
    pub const GETPID: u64 = 7;
    pub const READ: u64 = 8;
    pub const WRITE: u64 = 9;
    pub const PUTPIXEL: u64 = 10;
    pub const GETPIXEL: u64 = 11;
    pub const CLEAR: u64 = 12;
    pub const GETWIDTH: u64 = 13;
    pub const GETHEIGHT: u64 = 14;
    pub const DRAWLINE: u64 = 15;
    pub const DRAWRECT: u64 = 16;
    pub const FILLRECT: u64 = 17;
    pub const DRAWTEXT: u64 = 18;
    pub const GETFB: u64 = 19;
    pub const MEMINFO: u64 = 40;
    pub const REALLOC: u64 = 41;
    pub const CALLOC: u64 = 42;
}

/// Native handler signature: six register arguments, one result
pub type SyscallHandler = fn(u64, u64, u64, u64, u64, u64) -> u64;

static NATIVE_TABLE: RwLock<[Option<SyscallHandler>; NATIVE_MAX]> =
    RwLock::new([None; NATIVE_MAX]);

/// Linux personality flag; flipped only by `set_linux_mode`
static LINUX_MODE: AtomicBool = AtomicBool::new(false);

// Single-process program state, read by the shell after `execute`
static PROGRAM_RUNNING: AtomicBool = AtomicBool::new(false);
static EXIT_CODE: AtomicI32 = AtomicI32::new(0);

/// Install a native handler.
pub fn register(num: u64, handler: SyscallHandler) {
    if (num as usize) < NATIVE_MAX {
        NATIVE_TABLE.write()[num as usize] = Some(handler);
    }
}

/// Populate the native table.
pub fn init() {
    register(nr::EXIT, sys_exit);
    register(nr::PRINT, sys_print);
    register(nr::GETKEY, sys_getkey);
    register(nr::KBHIT, sys_kbhit);
    register(nr::MALLOC, sys_malloc);
    register(nr::FREE, sys_free);
    register(nr::SLEEP, sys_sleep);
    register(nr::GETPID, sys_getpid);
    register(nr::READ, sys_read);
    register(nr::WRITE, sys_write);

    register(nr::PUTPIXEL, sys_putpixel);
    register(nr::GETPIXEL, sys_getpixel);
    register(nr::CLEAR, sys_clear);
    register(nr::GETWIDTH, sys_getwidth);
    register(nr::GETHEIGHT, sys_getheight);
    register(nr::DRAWLINE, sys_drawline);
    register(nr::DRAWRECT, sys_drawrect);
    register(nr::FILLRECT, sys_fillrect);
    register(nr::DRAWTEXT, sys_drawtext);
    register(nr::GETFB, sys_getfb);

    register(nr::MEMINFO, sys_meminfo);
    register(nr::REALLOC, sys_realloc);
    register(nr::CALLOC, sys_calloc);

    log!("[OK] Syscall gate on vector {:#x}", crate::interrupts::SYSCALL_VECTOR);
}

/// Switch between the native and Linux personalities.
pub fn set_linux_mode(enable: bool) {
    if enable {
        linux::init();
    }
    LINUX_MODE.store(enable, Ordering::SeqCst);
    log!("[syscall] Linux mode {}", if enable { "on" } else { "off" });
}

pub fn linux_mode() -> bool {
    LINUX_MODE.load(Ordering::SeqCst)
}

/// Entry from the interrupt dispatcher for vector 0x80.
pub fn handle_interrupt(frame: &mut InterruptFrame) {
    let num = frame.rax;

    if linux_mode() {
        frame.rax = linux::dispatch(
            num, frame.rdi, frame.rsi, frame.rdx, frame.r10, frame.r8, frame.r9,
        ) as u64;
        return;
    }

    frame.rax = dispatch_native(
        num, frame.rdi, frame.rsi, frame.rdx, frame.r10, frame.r8, frame.r9,
    );
}

/// Native table dispatch; unknown numbers return -1.
pub fn dispatch_native(num: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64) -> u64 {
    let handler = if (num as usize) < NATIVE_MAX {
        NATIVE_TABLE.read()[num as usize]
    } else {
        None
    };

    match handler {
        Some(handler) => handler(a1, a2, a3, a4, a5, a6),
        None => u64::MAX,
    }
}

// ============================================================================
// Program state (shell interface)
// ============================================================================

pub fn set_program_running(running: bool) {
    PROGRAM_RUNNING.store(running, Ordering::SeqCst);
}

pub fn is_program_running() -> bool {
    PROGRAM_RUNNING.load(Ordering::SeqCst)
}

pub fn exit_code() -> i32 {
    EXIT_CODE.load(Ordering::SeqCst)
}

pub(crate) fn mark_exit(code: i32) {
    EXIT_CODE.store(code, Ordering::SeqCst);
    PROGRAM_RUNNING.store(false, Ordering::SeqCst);
}

/// Read a NUL-terminated string out of a syscall pointer argument.
fn read_cstring(ptr: u64, max: usize) -> Option<alloc::string::String> {
    if ptr == 0 {
        return None;
    }
    let mut s = alloc::string::String::new();
    for i in 0..max {
        let b = unsafe { *((ptr + i as u64) as *const u8) };
        if b == 0 {
            break;
        }
        s.push(b as char);
    }
    Some(s)
}

// ============================================================================
// Process control and console
// ============================================================================

fn sys_exit(code: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    mark_exit(code as i32);
    crate::console::print("\n[Program exited with code ", crate::console::COLOR_GRAY);
    let mut buf = itoa(code);
    buf.push_str("]\n");
    crate::console::print(&buf, crate::console::COLOR_GRAY);
    0
}

fn sys_print(str_ptr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    if let Some(s) = read_cstring(str_ptr, 4096) {
        crate::console::print(&s, crate::console::COLOR_WHITE);
    }
    0
}

fn sys_getkey(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::keyboard::wait_key() as u64
}

fn sys_kbhit(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::keyboard::has_key() as u64
}

fn sys_sleep(ms: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    // Busy-wait; the PIT is left at its power-on rate
    let mut count = ms.saturating_mul(100_000);
    while count > 0 {
        core::hint::spin_loop();
        count -= 1;
    }
    0
}

fn sys_getpid(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    1 // single process
}

fn sys_read(buf_ptr: u64, count: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    if buf_ptr == 0 || count == 0 {
        return 0;
    }
    let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr as *mut u8, count as usize) };
    let mut n = 0;
    while n < buf.len() {
        let c = crate::keyboard::wait_key();
        buf[n] = c;
        n += 1;
        crate::console::putchar(c as char, crate::console::COLOR_WHITE);
        if c == b'\n' {
            break;
        }
    }
    n as u64
}

fn sys_write(buf_ptr: u64, count: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    if buf_ptr == 0 {
        return 0;
    }
    let buf = unsafe { core::slice::from_raw_parts(buf_ptr as *const u8, count as usize) };
    crate::console::write_bytes(buf, crate::console::COLOR_WHITE);
    count
}

// ============================================================================
// Memory
// ============================================================================

fn sys_malloc(size: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::memory::heap::kmalloc(size as usize) as u64
}

fn sys_free(ptr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::memory::heap::kfree(ptr as *mut u8);
    0
}

fn sys_realloc(ptr: u64, new_size: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::memory::heap::krealloc(ptr as *mut u8, new_size as usize) as u64
}

fn sys_calloc(count: u64, size: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::memory::heap::kcalloc(count as usize, size as usize) as u64
}

fn sys_meminfo(info_ptr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    let stats = crate::memory::heap::statistics();
    if info_ptr != 0 {
        unsafe {
            let info = info_ptr as *mut u64;
            info.write(stats.total_size);
            info.add(1).write(stats.used_size);
            info.add(2).write(stats.free_size);
            info.add(3).write(stats.num_allocations);
        }
    }
    stats.free_size
}

// ============================================================================
// Graphics
// ============================================================================

fn sys_putpixel(x: u64, y: u64, color: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::framebuffer::put_pixel(x as u32, y as u32, color as u32);
    0
}

fn sys_getpixel(x: u64, y: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::framebuffer::get_pixel(x as u32, y as u32) as u64
}

fn sys_clear(color: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::framebuffer::clear(color as u32);
    0
}

fn sys_getwidth(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    if crate::framebuffer::is_available() {
        crate::framebuffer::width() as u64
    } else {
        80 // text mode columns
    }
}

fn sys_getheight(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    if crate::framebuffer::is_available() {
        crate::framebuffer::height() as u64
    } else {
        25 // text mode rows
    }
}

fn sys_drawline(x0: u64, y0: u64, x1: u64, y1: u64, color: u64, _a6: u64) -> u64 {
    crate::framebuffer::draw_line(x0 as i32, y0 as i32, x1 as i32, y1 as i32, color as u32);
    0
}

fn sys_drawrect(x: u64, y: u64, w: u64, h: u64, color: u64, _a6: u64) -> u64 {
    crate::framebuffer::draw_rect(x as i32, y as i32, w as i32, h as i32, color as u32);
    0
}

fn sys_fillrect(x: u64, y: u64, w: u64, h: u64, color: u64, _a6: u64) -> u64 {
    crate::framebuffer::fill_rect(x as i32, y as i32, w as i32, h as i32, color as u32);
    0
}

fn sys_drawtext(x: u64, y: u64, str_ptr: u64, colors: u64, _a5: u64, _a6: u64) -> u64 {
    if let Some(s) = read_cstring(str_ptr, 4096) {
        let fg = (colors >> 32) as u32;
        let bg = (colors & 0xFFFF_FFFF) as u32;
        crate::framebuffer::draw_string(x as u32, y as u32, &s, fg, bg);
    }
    0
}

fn sys_getfb(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> u64 {
    crate::framebuffer::address()
}

fn itoa(mut n: u64) -> alloc::string::String {
    let mut s = alloc::string::String::new();
    if n == 0 {
        s.push('0');
        return s;
    }
    let mut digits = [0u8; 20];
    let mut i = 0;
    while n > 0 {
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        i += 1;
    }
    while i > 0 {
        i -= 1;
        s.push(digits[i] as char);
    }
    s
}
