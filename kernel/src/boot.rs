//! Boot handoff from the stage-2 BIOS loader
//!
//! Stage 2 loads the kernel at 1 MiB, leaves a framebuffer description
//! at physical 0x8000 and jumps to the kernel entry with
//! EAX = 0x2BADB002 (Multiboot magic) and EBX pointing at a possibly
//! zero Multiboot info block.

use spin::Mutex;

/// Multiboot bootloader magic left in EAX by stage 2
pub const MULTIBOOT_MAGIC: u32 = 0x2BAD_B002;

/// Physical address of the stage-2 framebuffer description
const FRAMEBUFFER_INFO_ADDR: u64 = 0x8000;

/// Framebuffer description written by stage 2 at 0x8000.
///
/// Field offsets are fixed by the bootloader contract: width at 0,
/// height at 4, pitch at 8, bpp at 12, colour-channel mask/position
/// bytes at 13-18, then the memory model byte and the framebuffer
/// physical address at the back.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct FramebufferDescription {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u8,
    pub red_mask_size: u8,
    pub red_field_pos: u8,
    pub green_mask_size: u8,
    pub green_field_pos: u8,
    pub blue_mask_size: u8,
    pub blue_field_pos: u8,
    pub memory_model: u8,
    pub framebuffer_addr: u32,
}

/// Boot information captured at entry
#[derive(Clone, Copy, Debug)]
struct BootInfo {
    multiboot_magic: u32,
    multiboot_info: u32,
    framebuffer: Option<FramebufferDescription>,
}

static BOOT_INFO: Mutex<BootInfo> = Mutex::new(BootInfo {
    multiboot_magic: 0,
    multiboot_info: 0,
    framebuffer: None,
});

/// Capture the register handoff and the stage-2 framebuffer description.
pub fn init(magic: u32, mboot: u32) {
    let mut info = BOOT_INFO.lock();
    info.multiboot_magic = magic;
    info.multiboot_info = mboot;

    if magic != MULTIBOOT_MAGIC {
        serial_println!("[BOOT] non-Multiboot caller (EAX={:#010x})", magic);
    }

    let fb = unsafe {
        core::ptr::read_unaligned(FRAMEBUFFER_INFO_ADDR as *const FramebufferDescription)
    };

    // A zeroed or garbage block means stage 2 stayed in text mode
    let width = fb.width;
    let height = fb.height;
    let bpp = fb.bpp;
    let addr = fb.framebuffer_addr;
    if addr != 0 && width > 0 && width <= 8192 && height > 0 && height <= 8192 {
        info.framebuffer = Some(fb);
        serial_println!(
            "[BOOT] framebuffer {}x{} bpp={} at {:#x}",
            width,
            height,
            bpp,
            addr
        );
    } else {
        serial_println!("[BOOT] no usable framebuffer description");
    }
}

/// Framebuffer description captured at boot, if stage 2 provided one.
pub fn framebuffer_info() -> Option<FramebufferDescription> {
    BOOT_INFO.lock().framebuffer
}

/// True when the loader identified itself with the Multiboot magic.
pub fn booted_via_multiboot() -> bool {
    BOOT_INFO.lock().multiboot_magic == MULTIBOOT_MAGIC
}

/// Physical address of the Multiboot info block, zero when absent.
pub fn multiboot_info_addr() -> u32 {
    BOOT_INFO.lock().multiboot_info
}
