//! Interrupt Handlers
//!
//! Default handlers for CPU exceptions and the timer tick.

use super::idt::InterruptFrame;

/// Human-readable CPU exception names, indexed by vector
const EXCEPTION_NAMES: [&str; 32] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point",
    "Virtualization",
    "Control Protection",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection",
    "VMM Communication",
    "Security Exception",
    "Reserved",
];

pub fn exception_name(vector: u64) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Terminal path for exceptions nothing claimed: report and halt.
/// The CPU state is assumed unrecoverable.
pub fn unhandled_exception(frame: &InterruptFrame) -> ! {
    log_error!(
        "Unhandled exception {} ({}) err={:#x} rip={:#x}",
        frame.vector,
        exception_name(frame.vector),
        frame.error_code,
        frame.rip
    );

    loop {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::asm!("cli; hlt");
        }
        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}

/// Timer IRQ: advance the kernel tick counter.
pub fn timer_interrupt(_frame: &mut InterruptFrame) {
    crate::logger::tick();
}
