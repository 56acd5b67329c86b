//! Programmable Interrupt Controller (8259 PIC)
//!
//! Remaps the legacy PIC pair so hardware IRQs land on vectors 32-47,
//! clear of the CPU exception range.

#[cfg(target_arch = "x86_64")]
use spin::Mutex;
#[cfg(target_arch = "x86_64")]
use x86_64::instructions::port::Port;

/// PIC1 command port
const PIC1_COMMAND: u16 = 0x20;
/// PIC1 data port
const PIC1_DATA: u16 = 0x21;
/// PIC2 command port
const PIC2_COMMAND: u16 = 0xA0;
/// PIC2 data port
const PIC2_DATA: u16 = 0xA1;

/// End of interrupt command
const PIC_EOI: u8 = 0x20;

/// Master PIC vector offset
pub const PIC1_OFFSET: u8 = 32;
/// Slave PIC vector offset
pub const PIC2_OFFSET: u8 = PIC1_OFFSET + 8;

/// Chained PIC controller
#[cfg(target_arch = "x86_64")]
pub struct ChainedPics {
    master: Pic,
    slave: Pic,
}

#[cfg(target_arch = "x86_64")]
impl ChainedPics {
    pub const fn new() -> Self {
        Self {
            master: Pic::new(PIC1_COMMAND, PIC1_DATA),
            slave: Pic::new(PIC2_COMMAND, PIC2_DATA),
        }
    }

    /// Remap and unmask the PIC pair.
    pub unsafe fn initialize(&mut self) {
        // ICW1: start initialization sequence in cascade mode
        self.master.command.write(0x11);
        self.slave.command.write(0x11);

        // ICW2: vector offsets
        self.master.data.write(PIC1_OFFSET);
        self.slave.data.write(PIC2_OFFSET);

        // ICW3: cascading
        self.master.data.write(4); // slave at IRQ2
        self.slave.data.write(2); // cascade identity

        // ICW4: 8086 mode
        self.master.data.write(0x01);
        self.slave.data.write(0x01);

        // Unmask timer (IRQ0), keyboard (IRQ1) and the cascade line
        self.master.data.write(0b1111_1000);
        self.slave.data.write(0b1111_1111);
    }

    /// Acknowledge an interrupt. The slave is notified first for
    /// vectors it owns (>= 40), then the master in every case.
    pub unsafe fn notify_end_of_interrupt(&mut self, vector: u8) {
        if vector >= PIC2_OFFSET {
            self.slave.command.write(PIC_EOI);
        }
        self.master.command.write(PIC_EOI);
    }
}

/// Single PIC controller
#[cfg(target_arch = "x86_64")]
struct Pic {
    command: Port<u8>,
    data: Port<u8>,
}

#[cfg(target_arch = "x86_64")]
impl Pic {
    const fn new(command_port: u16, data_port: u16) -> Self {
        Self {
            command: Port::new(command_port),
            data: Port::new(data_port),
        }
    }
}

/// Global PIC instance
#[cfg(target_arch = "x86_64")]
pub static PICS: Mutex<ChainedPics> = Mutex::new(ChainedPics::new());

/// Send EOI for `vector` to the PIC pair.
pub fn end_of_interrupt(vector: u8) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = vector;
}
