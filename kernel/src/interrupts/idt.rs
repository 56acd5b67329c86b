//! Interrupt Descriptor Table
//!
//! Raw 256-entry IDT with 16-byte gate descriptors. Every installed
//! vector routes through a register-saving assembly stub into the
//! common dispatcher in [`super`], which consults the parallel handler
//! table. The IDT itself is never mutated after boot.

use core::arch::naked_asm;

/// Kernel code segment selector from the boot GDT
pub const KERNEL_CS: u16 = 0x08;

/// 64-bit interrupt gate, DPL=0, present
pub const GATE_INTERRUPT: u8 = 0x8E;

/// Saved register state handed to interrupt handlers.
///
/// Field order mirrors the push sequence of the common stub: general
/// purpose registers, the vector and (possibly synthesized) error
/// code, then the CPU-pushed interrupt frame.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// One 16-byte IDT gate descriptor
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    pub const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    /// Install a handler: kernel code selector, 64-bit interrupt gate.
    pub fn set_handler(&mut self, addr: u64) {
        self.offset_low = (addr & 0xFFFF) as u16;
        self.offset_mid = ((addr >> 16) & 0xFFFF) as u16;
        self.offset_high = ((addr >> 32) & 0xFFFF_FFFF) as u32;
        self.selector = KERNEL_CS;
        self.ist = 0;
        self.type_attr = GATE_INTERRUPT;
    }

    pub fn is_present(&self) -> bool {
        self.type_attr & 0x80 != 0
    }

    pub fn handler_addr(&self) -> u64 {
        (self.offset_low as u64)
            | ((self.offset_mid as u64) << 16)
            | ((self.offset_high as u64) << 32)
    }
}

/// The full descriptor table
#[repr(C, align(16))]
pub struct Idt {
    entries: [IdtEntry; 256],
}

impl Idt {
    /// Build the boot IDT: CPU exceptions 0-31, hardware IRQs 32-47
    /// and the syscall vector. Remaining entries stay non-present.
    pub fn new() -> Self {
        let mut idt = Self {
            entries: [IdtEntry::missing(); 256],
        };

        for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
            idt.entries[vector].set_handler(*stub as usize as u64);
        }
        for (i, stub) in IRQ_STUBS.iter().enumerate() {
            idt.entries[32 + i].set_handler(*stub as usize as u64);
        }
        idt.entries[super::SYSCALL_VECTOR].set_handler(isr128 as usize as u64);

        idt
    }

    pub fn entry(&self, vector: usize) -> &IdtEntry {
        &self.entries[vector]
    }

    /// Load the table into the CPU descriptor register.
    #[cfg(target_arch = "x86_64")]
    pub fn load(&'static self) {
        use x86_64::structures::DescriptorTablePointer;
        use x86_64::VirtAddr;

        let ptr = DescriptorTablePointer {
            limit: (core::mem::size_of::<Idt>() - 1) as u16,
            base: VirtAddr::new(self as *const _ as u64),
        };
        unsafe { x86_64::instructions::tables::lidt(&ptr) };
    }
}

// ============================================================================
// Assembly stubs
// ============================================================================

/// Common stub: saves the register file, calls the dispatcher with the
/// frame, restores and returns. Expects the vector and an error code
/// (real or synthesized zero) already on the stack.
#[unsafe(naked)]
unsafe extern "C" fn interrupt_common() {
    naked_asm!(
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "call {dispatch}",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "add rsp, 16",      // vector + error code
        "iretq",
        dispatch = sym super::dispatch_interrupt,
    );
}

/// Stub for vectors where the CPU pushes no error code.
macro_rules! interrupt_stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push 0",
                concat!("push ", stringify!($vector)),
                "jmp {common}",
                common = sym interrupt_common,
            );
        }
    };
}

/// Stub for exceptions where the CPU pushes an error code.
macro_rules! interrupt_stub_err {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                concat!("push ", stringify!($vector)),
                "jmp {common}",
                common = sym interrupt_common,
            );
        }
    };
}

// CPU exceptions 0-31. Vectors 8, 10-14, 17 and 21 carry an error code.
interrupt_stub!(isr0, 0);
interrupt_stub!(isr1, 1);
interrupt_stub!(isr2, 2);
interrupt_stub!(isr3, 3);
interrupt_stub!(isr4, 4);
interrupt_stub!(isr5, 5);
interrupt_stub!(isr6, 6);
interrupt_stub!(isr7, 7);
interrupt_stub_err!(isr8, 8);
interrupt_stub!(isr9, 9);
interrupt_stub_err!(isr10, 10);
interrupt_stub_err!(isr11, 11);
interrupt_stub_err!(isr12, 12);
interrupt_stub_err!(isr13, 13);
interrupt_stub_err!(isr14, 14);
interrupt_stub!(isr15, 15);
interrupt_stub!(isr16, 16);
interrupt_stub_err!(isr17, 17);
interrupt_stub!(isr18, 18);
interrupt_stub!(isr19, 19);
interrupt_stub!(isr20, 20);
interrupt_stub_err!(isr21, 21);
interrupt_stub!(isr22, 22);
interrupt_stub!(isr23, 23);
interrupt_stub!(isr24, 24);
interrupt_stub!(isr25, 25);
interrupt_stub!(isr26, 26);
interrupt_stub!(isr27, 27);
interrupt_stub!(isr28, 28);
interrupt_stub!(isr29, 29);
interrupt_stub!(isr30, 30);
interrupt_stub!(isr31, 31);

// Hardware IRQs, remapped to vectors 32-47
interrupt_stub!(irq0, 32);
interrupt_stub!(irq1, 33);
interrupt_stub!(irq2, 34);
interrupt_stub!(irq3, 35);
interrupt_stub!(irq4, 36);
interrupt_stub!(irq5, 37);
interrupt_stub!(irq6, 38);
interrupt_stub!(irq7, 39);
interrupt_stub!(irq8, 40);
interrupt_stub!(irq9, 41);
interrupt_stub!(irq10, 42);
interrupt_stub!(irq11, 43);
interrupt_stub!(irq12, 44);
interrupt_stub!(irq13, 45);
interrupt_stub!(irq14, 46);
interrupt_stub!(irq15, 47);

// Software interrupt gate for syscalls
interrupt_stub!(isr128, 128);

static EXCEPTION_STUBS: [unsafe extern "C" fn(); 32] = [
    isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13,
    isr14, isr15, isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25, isr26,
    isr27, isr28, isr29, isr30, isr31,
];

static IRQ_STUBS: [unsafe extern "C" fn(); 16] = [
    irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13,
    irq14, irq15,
];
