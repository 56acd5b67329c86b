//! Interrupt Handling Subsystem
//!
//! Installs the IDT, remaps the PIC and routes every trap through a
//! single dispatcher. High-level handlers live in a parallel 256-slot
//! table so the IDT itself never changes after boot; module code
//! registers handlers against the table, not the hardware.

mod handlers;
pub mod idt;
pub mod pic;

pub use idt::InterruptFrame;

use lazy_static::lazy_static;
use spin::RwLock;

/// Software interrupt vector for the syscall gate
pub const SYSCALL_VECTOR: usize = 0x80;

/// First hardware IRQ vector after remapping
pub const IRQ_BASE: usize = pic::PIC1_OFFSET as usize;

/// High-level handler signature
pub type HandlerFn = fn(&mut InterruptFrame);

/// Parallel dispatch table, one slot per vector
static HANDLERS: RwLock<[Option<HandlerFn>; 256]> = RwLock::new([None; 256]);

lazy_static! {
    /// The boot IDT; its address must stay stable for the lifetime of
    /// the kernel once loaded.
    static ref IDT: idt::Idt = idt::Idt::new();
}

/// Initialize interrupt handling: load the IDT, remap the PIC,
/// install the timer handler and enable interrupts.
pub fn init() {
    #[cfg(target_arch = "x86_64")]
    {
        IDT.load();

        unsafe {
            pic::PICS.lock().initialize();
        }

        register_handler(IRQ_BASE, handlers::timer_interrupt);

        x86_64::instructions::interrupts::enable();
    }

    log_debug!("IDT loaded, PIC remapped to 32-47, interrupts enabled");
}

/// Install a high-level handler for `vector`.
///
/// This updates the dispatch table only; the IDT entry installed at
/// boot keeps pointing at the common stub.
pub fn register_handler(vector: usize, handler: HandlerFn) {
    if vector >= 256 {
        return;
    }
    without_interrupts(|| {
        HANDLERS.write()[vector] = Some(handler);
    });
}

/// Common dispatcher, called from the assembly stubs with the saved
/// register frame.
pub extern "C" fn dispatch_interrupt(frame: &mut InterruptFrame) {
    let vector = frame.vector as usize;

    if vector == SYSCALL_VECTOR {
        crate::syscall::handle_interrupt(frame);
        return;
    }

    if (IRQ_BASE..IRQ_BASE + 16).contains(&vector) {
        // Acknowledge before running the handler so the PIC can queue
        // the next interrupt; slave first for vectors >= 40.
        pic::end_of_interrupt(vector as u8);

        let handler = HANDLERS.read()[vector];
        if let Some(handler) = handler {
            handler(frame);
        }
        return;
    }

    let handler = HANDLERS.read()[vector];
    match handler {
        Some(handler) => handler(frame),
        None if vector < 32 => handlers::unhandled_exception(frame),
        None => {}
    }
}

/// Disable interrupts and run a closure.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(all(target_arch = "x86_64", not(test)))]
    {
        x86_64::instructions::interrupts::without_interrupts(f)
    }
    #[cfg(any(not(target_arch = "x86_64"), test))]
    {
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(vector: u64) -> InterruptFrame {
        InterruptFrame {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            vector,
            error_code: 0,
            rip: 0,
            cs: 0x08,
            rflags: 0x202,
            rsp: 0,
            ss: 0x10,
        }
    }

    fn counting_handler(frame: &mut InterruptFrame) {
        frame.rax = frame.rax.wrapping_add(1);
    }

    #[test]
    fn registered_handler_receives_frame() {
        register_handler(200, counting_handler);
        let mut f = frame(200);
        dispatch_interrupt(&mut f);
        dispatch_interrupt(&mut f);
        assert_eq!(f.rax, 2);
    }

    #[test]
    fn out_of_range_registration_is_ignored() {
        // Must not panic or touch the table
        register_handler(512, counting_handler);
        register_handler(usize::MAX, counting_handler);
    }

    #[test]
    fn unregistered_high_vector_is_a_no_op() {
        let mut f = frame(210);
        dispatch_interrupt(&mut f);
        assert_eq!(f.rax, 0);
    }
}
