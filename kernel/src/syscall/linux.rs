//! Linux Syscall Compatibility Layer
//!
//! A dispatch table shaped after the Linux x86_64 syscall numbering.
//! Source-compatible for a curated set of simple syscalls; everything
//! else logs and returns -ENOSYS. Keeps its own 16-entry file
//! descriptor table with 0/1/2 pre-bound to the console.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::{Mutex, RwLock};

use crate::vfs::{self, OpenFile, OpenFlags};

/// Linux x86_64 syscall numbers (implemented subset)
pub mod nr {
    pub const READ: u64 = 0;
    pub const WRITE: u64 = 1;
    pub const OPEN: u64 = 2;
    pub const CLOSE: u64 = 3;
    pub const FSTAT: u64 = 5;
    pub const MMAP: u64 = 9;
    pub const MUNMAP: u64 = 11;
    pub const BRK: u64 = 12;
    pub const IOCTL: u64 = 16;
    pub const NANOSLEEP: u64 = 35;
    pub const GETPID: u64 = 39;
    pub const EXIT: u64 = 60;
    pub const UNAME: u64 = 63;
    pub const GETCWD: u64 = 79;
    pub const SYSINFO: u64 = 99;
    pub const GETUID: u64 = 102;
    pub const GETGID: u64 = 104;
    pub const GETEUID: u64 = 107;
    pub const GETEGID: u64 = 108;
    pub const GETPPID: u64 = 110;
    pub const ARCH_PRCTL: u64 = 158;
    pub const CLOCK_GETTIME: u64 = 228;
    pub const EXIT_GROUP: u64 = 231;
    pub const GETRANDOM: u64 = 318;
}

/// Error codes (Linux-compatible, negative values)
pub mod errno {
    pub const EPERM: i64 = -1;
    pub const ENOENT: i64 = -2;
    pub const EIO: i64 = -5;
    pub const EBADF: i64 = -9;
    pub const EAGAIN: i64 = -11;
    pub const ENOMEM: i64 = -12;
    pub const EFAULT: i64 = -14;
    pub const EEXIST: i64 = -17;
    pub const ENOTDIR: i64 = -20;
    pub const EISDIR: i64 = -21;
    pub const EINVAL: i64 = -22;
    pub const EMFILE: i64 = -24;
    pub const ENOTTY: i64 = -25;
    pub const ENOSPC: i64 = -28;
    pub const EROFS: i64 = -30;
    pub const ERANGE: i64 = -34;
    pub const ENOSYS: i64 = -38;
}

/// Size of the Linux dispatch table
pub const LINUX_MAX: usize = 512;

/// Handler signature: six arguments, signed result
type Handler = fn(u64, u64, u64, u64, u64, u64) -> i64;

static TABLE: RwLock<[Option<Handler>; LINUX_MAX]> = RwLock::new([None; LINUX_MAX]);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

// ============================================================================
// File descriptor table
// ============================================================================

/// Number of file descriptor slots
pub const MAX_FDS: usize = 16;

enum FdEntry {
    Closed,
    Console,
    File(Arc<OpenFile>),
}

const FD_CLOSED: FdEntry = FdEntry::Closed;
static FD_TABLE: Mutex<[FdEntry; MAX_FDS]> = Mutex::new([FD_CLOSED; MAX_FDS]);

fn init_fd_table() {
    let mut table = FD_TABLE.lock();
    table[0] = FdEntry::Console; // stdin
    table[1] = FdEntry::Console; // stdout
    table[2] = FdEntry::Console; // stderr
    for slot in table.iter_mut().skip(3) {
        *slot = FdEntry::Closed;
    }
}

fn alloc_fd(file: Arc<OpenFile>) -> Option<usize> {
    let mut table = FD_TABLE.lock();
    for (fd, slot) in table.iter_mut().enumerate().skip(3) {
        if matches!(slot, FdEntry::Closed) {
            *slot = FdEntry::File(file);
            return Some(fd);
        }
    }
    None
}

fn fd_file(fd: usize) -> Option<Arc<OpenFile>> {
    let table = FD_TABLE.lock();
    match table.get(fd) {
        Some(FdEntry::File(file)) => Some(file.clone()),
        _ => None,
    }
}

fn fd_is_console(fd: usize) -> bool {
    matches!(FD_TABLE.lock().get(fd), Some(FdEntry::Console))
}

fn fd_in_use(fd: usize) -> bool {
    !matches!(FD_TABLE.lock().get(fd), None | Some(FdEntry::Closed))
}

// ============================================================================
// Program break
// ============================================================================

/// Initial program break (8 MiB)
const PROGRAM_BREAK_START: u64 = 0x80_0000;
/// The break may not leave the window below 16 MiB
const PROGRAM_BREAK_MAX: u64 = 0x100_0000;

static PROGRAM_BREAK: AtomicU64 = AtomicU64::new(PROGRAM_BREAK_START);

// ============================================================================
// Initialization and dispatch
// ============================================================================

fn register(num: u64, handler: Handler) {
    if (num as usize) < LINUX_MAX {
        TABLE.write()[num as usize] = Some(handler);
    }
}

/// Populate the Linux table and the fd table. Idempotent; invoked on
/// every switch into Linux mode.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    init_fd_table();

    register(nr::READ, sys_read);
    register(nr::WRITE, sys_write);
    register(nr::OPEN, sys_open);
    register(nr::CLOSE, sys_close);
    register(nr::FSTAT, sys_fstat);
    register(nr::MMAP, sys_mmap);
    register(nr::MUNMAP, sys_munmap);
    register(nr::BRK, sys_brk);
    register(nr::IOCTL, sys_ioctl);
    register(nr::NANOSLEEP, sys_nanosleep);
    register(nr::GETPID, sys_getpid);
    register(nr::EXIT, sys_exit);
    register(nr::UNAME, sys_uname);
    register(nr::GETCWD, sys_getcwd);
    register(nr::SYSINFO, sys_sysinfo);
    register(nr::GETUID, sys_getuid);
    register(nr::GETGID, sys_getuid);
    register(nr::GETEUID, sys_getuid);
    register(nr::GETEGID, sys_getuid);
    register(nr::GETPPID, sys_getppid);
    register(nr::ARCH_PRCTL, sys_arch_prctl);
    register(nr::CLOCK_GETTIME, sys_clock_gettime);
    register(nr::EXIT_GROUP, sys_exit);
    register(nr::GETRANDOM, sys_getrandom);

    log!("[syscall] Linux-compatible table initialized");
}

/// Dispatch one Linux syscall.
pub fn dispatch(num: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64) -> i64 {
    let handler = if (num as usize) < LINUX_MAX {
        TABLE.read()[num as usize]
    } else {
        None
    };

    match handler {
        Some(handler) => handler(a1, a2, a3, a4, a5, a6),
        None => {
            log_warn!("[syscall] unimplemented Linux syscall {}", num);
            errno::ENOSYS
        }
    }
}

// ============================================================================
// File I/O
// ============================================================================

fn sys_read(fd: u64, buf_ptr: u64, count: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let fd = fd as usize;
    if buf_ptr == 0 {
        return errno::EFAULT;
    }
    if !fd_in_use(fd) {
        return errno::EBADF;
    }

    let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr as *mut u8, count as usize) };

    if fd_is_console(fd) {
        // Line-oriented keyboard read with echo
        let mut n = 0;
        while n < buf.len() {
            let c = crate::keyboard::wait_key();
            if c == 8 {
                if n > 0 {
                    n -= 1;
                    crate::console::putchar('\u{8}', crate::console::COLOR_WHITE);
                }
                continue;
            }
            buf[n] = c;
            n += 1;
            crate::console::putchar(c as char, crate::console::COLOR_WHITE);
            if c == b'\n' {
                break;
            }
        }
        return n as i64;
    }

    match fd_file(fd) {
        Some(file) => match vfs::read(&file, buf) {
            Ok(n) => n as i64,
            Err(_) => errno::EIO,
        },
        None => errno::EBADF,
    }
}

fn sys_write(fd: u64, buf_ptr: u64, count: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let fd = fd as usize;
    if buf_ptr == 0 {
        return errno::EFAULT;
    }
    if !fd_in_use(fd) {
        return errno::EBADF;
    }

    let buf = unsafe { core::slice::from_raw_parts(buf_ptr as *const u8, count as usize) };

    if fd_is_console(fd) {
        let color = if fd == 2 {
            crate::console::COLOR_RED
        } else {
            crate::console::COLOR_WHITE
        };
        crate::console::write_bytes(buf, color);
        return count as i64;
    }

    match fd_file(fd) {
        Some(file) => match vfs::write(&file, buf) {
            Ok(n) => n as i64,
            Err(_) => errno::EIO,
        },
        None => errno::EBADF,
    }
}

fn sys_open(path_ptr: u64, flags: u64, _mode: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let path = match super::read_cstring(path_ptr, 256) {
        Some(p) => p,
        None => return errno::EFAULT,
    };

    let file = match vfs::open(&path, OpenFlags(flags as u32)) {
        Ok(file) => file,
        Err(_) => return errno::ENOENT,
    };

    match alloc_fd(file) {
        Some(fd) => fd as i64,
        None => errno::EMFILE,
    }
}

fn sys_close(fd: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let fd = fd as usize;
    if !fd_in_use(fd) {
        return errno::EBADF;
    }
    // stdin/stdout/stderr stay open
    if fd <= 2 {
        return 0;
    }

    let mut table = FD_TABLE.lock();
    if let FdEntry::File(file) = core::mem::replace(&mut table[fd], FdEntry::Closed) {
        drop(table);
        let _ = vfs::close(&file);
    }
    0
}

/// `struct stat` layout for Linux x86_64
#[repr(C)]
#[derive(Clone, Copy)]
struct LinuxStat {
    st_dev: u64,
    st_ino: u64,
    st_nlink: u64,
    st_mode: u32,
    st_uid: u32,
    st_gid: u32,
    _pad0: u32,
    st_rdev: u64,
    st_size: i64,
    st_blksize: i64,
    st_blocks: i64,
    st_atime: u64,
    st_atime_nsec: u64,
    st_mtime: u64,
    st_mtime_nsec: u64,
    st_ctime: u64,
    st_ctime_nsec: u64,
    _reserved: [i64; 3],
}

fn sys_fstat(fd: u64, statbuf: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let fd = fd as usize;
    if statbuf == 0 {
        return errno::EFAULT;
    }
    if !fd_in_use(fd) {
        return errno::EBADF;
    }

    let mut st: LinuxStat = unsafe { core::mem::zeroed() };

    if fd_is_console(fd) {
        st.st_mode = 0o020666; // character device
        st.st_blksize = 1024;
    } else if let Some(file) = fd_file(fd) {
        match vfs::fstat(&file) {
            Ok(s) => {
                st.st_ino = s.ino;
                st.st_mode = s.mode;
                st.st_uid = s.uid;
                st.st_gid = s.gid;
                st.st_rdev = s.rdev as u64;
                st.st_size = s.size as i64;
                st.st_blksize = 4096;
                st.st_blocks = (s.size as i64 + 511) / 512;
                st.st_nlink = 1;
                st.st_atime = s.atime;
                st.st_mtime = s.mtime;
                st.st_ctime = s.ctime;
            }
            Err(_) => return errno::EIO,
        }
    }

    unsafe { (statbuf as *mut LinuxStat).write_unaligned(st) };
    0
}

// ============================================================================
// Memory management
// ============================================================================

const MAP_ANONYMOUS: u64 = 0x20;
const MAP_FAILED: i64 = -1;

fn sys_mmap(_addr: u64, length: u64, _prot: u64, flags: u64, fd: u64, _offset: u64) -> i64 {
    // File-backed mappings cannot be satisfied and degrade to failure
    if flags & MAP_ANONYMOUS == 0 && (fd as i64) >= 0 {
        return MAP_FAILED;
    }

    let ptr = crate::memory::heap::kmalloc(length as usize);
    if ptr.is_null() {
        return MAP_FAILED;
    }
    unsafe { core::ptr::write_bytes(ptr, 0, length as usize) };
    ptr as i64
}

fn sys_munmap(addr: u64, _length: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    crate::memory::heap::kfree(addr as *mut u8);
    0
}

fn sys_brk(addr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    let current = PROGRAM_BREAK.load(Ordering::SeqCst);

    if addr == 0 {
        return current as i64;
    }
    if addr >= current && addr < PROGRAM_BREAK_MAX {
        PROGRAM_BREAK.store(addr, Ordering::SeqCst);
        return addr as i64;
    }

    // Shrinking or out-of-window requests report the current break
    current as i64
}

// ============================================================================
// Terminal, time, identity
// ============================================================================

/// TIOCGWINSZ request code
const TIOCGWINSZ: u64 = 0x5413;

#[repr(C)]
struct WinSize {
    ws_row: u16,
    ws_col: u16,
    ws_xpixel: u16,
    ws_ypixel: u16,
}

fn sys_ioctl(fd: u64, request: u64, arg: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if !fd_in_use(fd as usize) {
        return errno::EBADF;
    }

    if request == TIOCGWINSZ {
        if arg == 0 {
            return errno::EFAULT;
        }
        let (cols, rows) = crate::console::dimensions();
        let ws = WinSize {
            ws_row: rows as u16,
            ws_col: cols as u16,
            ws_xpixel: crate::framebuffer::width() as u16,
            ws_ypixel: crate::framebuffer::height() as u16,
        };
        unsafe { (arg as *mut WinSize).write_unaligned(ws) };
        return 0;
    }

    errno::ENOTTY
}

#[repr(C)]
struct Timespec {
    tv_sec: i64,
    tv_nsec: i64,
}

fn sys_nanosleep(req_ptr: u64, _rem_ptr: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if req_ptr == 0 {
        return errno::EFAULT;
    }
    let req = unsafe { (req_ptr as *const Timespec).read_unaligned() };
    if req.tv_sec < 0 || req.tv_nsec < 0 {
        return errno::EINVAL;
    }

    let ms = req.tv_sec as u64 * 1000 + req.tv_nsec as u64 / 1_000_000;
    let mut count = ms.saturating_mul(100_000);
    while count > 0 {
        core::hint::spin_loop();
        count -= 1;
    }
    0
}

fn sys_getpid(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    1
}

fn sys_getppid(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    0
}

fn sys_getuid(_a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    0 // root
}

fn sys_exit(status: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    super::mark_exit(status as i32);
    crate::console::print("\n[Process exited with status ", crate::console::COLOR_GRAY);
    crate::console::print(&super::itoa(status), crate::console::COLOR_GRAY);
    crate::console::print("]\n", crate::console::COLOR_GRAY);
    0
}

/// `struct utsname`: six fixed 65-byte fields
#[repr(C)]
struct Utsname {
    sysname: [u8; 65],
    nodename: [u8; 65],
    release: [u8; 65],
    version: [u8; 65],
    machine: [u8; 65],
    domainname: [u8; 65],
}

fn copy_field(dst: &mut [u8; 65], src: &str) {
    let n = src.len().min(64);
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
    dst[n] = 0;
}

fn sys_uname(buf_ptr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if buf_ptr == 0 {
        return errno::EFAULT;
    }

    let mut uts: Utsname = unsafe { core::mem::zeroed() };
    copy_field(&mut uts.sysname, "NBOS");
    copy_field(&mut uts.nodename, "nbos");
    copy_field(&mut uts.release, "1.0.0");
    copy_field(&mut uts.version, "#1 NBOS 1.0.0");
    copy_field(&mut uts.machine, "x86_64");
    copy_field(&mut uts.domainname, "(none)");

    unsafe { (buf_ptr as *mut Utsname).write_unaligned(uts) };
    0
}

fn sys_getcwd(buf_ptr: u64, size: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if buf_ptr == 0 {
        return errno::EFAULT;
    }
    if size < 2 {
        return errno::ERANGE;
    }
    unsafe {
        let buf = buf_ptr as *mut u8;
        buf.write(b'/');
        buf.add(1).write(0);
    }
    buf_ptr as i64
}

/// `struct sysinfo` (subset; later fields stay zero)
#[repr(C)]
struct SysInfo {
    uptime: i64,
    loads: [u64; 3],
    totalram: u64,
    freeram: u64,
    sharedram: u64,
    bufferram: u64,
    totalswap: u64,
    freeswap: u64,
    procs: u16,
    _pad: [u8; 6],
    totalhigh: u64,
    freehigh: u64,
    mem_unit: u32,
}

fn sys_sysinfo(info_ptr: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if info_ptr == 0 {
        return errno::EFAULT;
    }

    let stats = crate::memory::heap::statistics();
    let mut info: SysInfo = unsafe { core::mem::zeroed() };
    info.uptime = (crate::logger::get_ticks() / 18) as i64;
    info.totalram = stats.total_size;
    info.freeram = stats.free_size;
    info.procs = 1;
    info.mem_unit = 1;

    unsafe { (info_ptr as *mut SysInfo).write_unaligned(info) };
    0
}

// ============================================================================
// arch_prctl, clocks, randomness
// ============================================================================

const ARCH_SET_GS: u64 = 0x1001;
const ARCH_SET_FS: u64 = 0x1002;
const ARCH_GET_FS: u64 = 0x1003;
const ARCH_GET_GS: u64 = 0x1004;

fn sys_arch_prctl(code: u64, addr: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    #[cfg(target_arch = "x86_64")]
    {
        use x86_64::registers::model_specific::{FsBase, GsBase};
        use x86_64::VirtAddr;

        match code {
            ARCH_SET_FS => {
                FsBase::write(VirtAddr::new(addr));
                return 0;
            }
            ARCH_SET_GS => {
                GsBase::write(VirtAddr::new(addr));
                return 0;
            }
            // Reads trust the caller-supplied pointer
            ARCH_GET_FS => {
                unsafe { (addr as *mut u64).write(FsBase::read().as_u64()) };
                return 0;
            }
            ARCH_GET_GS => {
                unsafe { (addr as *mut u64).write(GsBase::read().as_u64()) };
                return 0;
            }
            _ => {}
        }
    }
    let _ = (code, addr);
    errno::EINVAL
}

fn sys_clock_gettime(_clockid: u64, tp_ptr: u64, _a3: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if tp_ptr == 0 {
        return errno::EFAULT;
    }

    // Approximate from the PIT tick counter (~18.2 Hz)
    let ticks = crate::logger::get_ticks();
    let tp = Timespec {
        tv_sec: (ticks / 18) as i64,
        tv_nsec: ((ticks % 18) * 55_000_000) as i64,
    };
    unsafe { (tp_ptr as *mut Timespec).write_unaligned(tp) };
    0
}

/// Linear-congruential generator state. Deterministic seed; this is
/// not a cryptographic source.
static RNG_STATE: AtomicU64 = AtomicU64::new(12_345_678_901_234_567);

fn sys_getrandom(buf_ptr: u64, buflen: u64, _flags: u64, _a4: u64, _a5: u64, _a6: u64) -> i64 {
    if buf_ptr == 0 {
        return errno::EFAULT;
    }

    let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr as *mut u8, buflen as usize) };
    for b in buf.iter_mut() {
        let next = RNG_STATE
            .load(Ordering::Relaxed)
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        RNG_STATE.store(next, Ordering::Relaxed);
        *b = (next >> 33) as u8;
    }
    buflen as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    // The fd table, break cursor and RNG are process-wide; serialize
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn unimplemented_numbers_return_enosys() {
        let _guard = TEST_LOCK.lock();
        init();
        assert_eq!(dispatch(7, 0, 0, 0, 0, 0, 0), errno::ENOSYS);
        assert_eq!(dispatch(1000, 0, 0, 0, 0, 0, 0), errno::ENOSYS);
    }

    #[test]
    fn identity_syscalls() {
        let _guard = TEST_LOCK.lock();
        init();
        assert_eq!(dispatch(nr::GETPID, 0, 0, 0, 0, 0, 0), 1);
        assert_eq!(dispatch(nr::GETPPID, 0, 0, 0, 0, 0, 0), 0);
        assert_eq!(dispatch(nr::GETUID, 0, 0, 0, 0, 0, 0), 0);
        assert_eq!(dispatch(nr::GETEGID, 0, 0, 0, 0, 0, 0), 0);
    }

    #[test]
    fn console_write_returns_byte_count() {
        let _guard = TEST_LOCK.lock();
        init();
        let msg = b"hi\n";
        assert_eq!(
            dispatch(nr::WRITE, 1, msg.as_ptr() as u64, 3, 0, 0, 0),
            3
        );
        // Bad descriptors are rejected
        assert_eq!(
            dispatch(nr::WRITE, 9, msg.as_ptr() as u64, 3, 0, 0, 0),
            errno::EBADF
        );
        assert_eq!(dispatch(nr::WRITE, 1, 0, 3, 0, 0, 0), errno::EFAULT);
    }

    #[test]
    fn brk_window() {
        let _guard = TEST_LOCK.lock();
        init();

        let current = dispatch(nr::BRK, 0, 0, 0, 0, 0, 0) as u64;
        assert!(current >= PROGRAM_BREAK_START);

        let grown = dispatch(nr::BRK, current + 0x1000, 0, 0, 0, 0, 0) as u64;
        assert_eq!(grown, current + 0x1000);

        // Requests outside the 16 MiB window leave the break alone
        let outside = dispatch(nr::BRK, PROGRAM_BREAK_MAX + 1, 0, 0, 0, 0, 0) as u64;
        assert_eq!(outside, grown);

        // Shrinking is also refused
        let shrink = dispatch(nr::BRK, PROGRAM_BREAK_START, 0, 0, 0, 0, 0) as u64;
        assert_eq!(shrink, grown);
    }

    #[test]
    fn uname_and_getcwd_fill_buffers() {
        let _guard = TEST_LOCK.lock();
        init();

        let mut uts = [0u8; core::mem::size_of::<Utsname>()];
        assert_eq!(dispatch(nr::UNAME, uts.as_mut_ptr() as u64, 0, 0, 0, 0, 0), 0);
        assert_eq!(&uts[..4], b"NBOS");

        let mut cwd = [0u8; 8];
        let ret = dispatch(nr::GETCWD, cwd.as_mut_ptr() as u64, 8, 0, 0, 0, 0);
        assert_eq!(ret as u64, cwd.as_ptr() as u64);
        assert_eq!(&cwd[..2], b"/\0");

        assert_eq!(dispatch(nr::GETCWD, cwd.as_mut_ptr() as u64, 1, 0, 0, 0, 0), errno::ERANGE);
    }

    #[test]
    fn fstat_console_reports_chardev() {
        let _guard = TEST_LOCK.lock();
        init();

        let mut st = [0u8; core::mem::size_of::<LinuxStat>()];
        assert_eq!(dispatch(nr::FSTAT, 1, st.as_mut_ptr() as u64, 0, 0, 0, 0), 0);
        let parsed = unsafe { (st.as_ptr() as *const LinuxStat).read_unaligned() };
        assert_eq!(parsed.st_mode, 0o020666);
        assert_eq!(parsed.st_blksize, 1024);

        assert_eq!(dispatch(nr::FSTAT, 11, st.as_mut_ptr() as u64, 0, 0, 0, 0), errno::EBADF);
    }

    #[test]
    fn getrandom_fills_and_advances() {
        let _guard = TEST_LOCK.lock();
        init();

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        assert_eq!(dispatch(nr::GETRANDOM, a.as_mut_ptr() as u64, 16, 0, 0, 0, 0), 16);
        assert_eq!(dispatch(nr::GETRANDOM, b.as_mut_ptr() as u64, 16, 0, 0, 0, 0), 16);
        assert_ne!(a, [0u8; 16]);
        assert_ne!(a, b);
    }

    #[test]
    fn close_preserves_standard_descriptors() {
        let _guard = TEST_LOCK.lock();
        init();

        assert_eq!(dispatch(nr::CLOSE, 1, 0, 0, 0, 0, 0), 0);
        assert!(fd_is_console(1));
        assert_eq!(dispatch(nr::CLOSE, 7, 0, 0, 0, 0, 0), errno::EBADF);
    }

    #[test]
    fn anonymous_mmap_requires_the_flag() {
        let _guard = TEST_LOCK.lock();
        init();

        // File-backed request degrades to the failure sentinel
        assert_eq!(dispatch(nr::MMAP, 0, 4096, 3, 0x2, 4, 0), MAP_FAILED);
    }
}
