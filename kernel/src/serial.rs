//! Serial port driver for debug output
//!
//! Provides serial communication via UART 16550 for early boot debugging
//! and kernel logging.

#[cfg(not(test))]
use core::fmt;
#[cfg(not(test))]
use lazy_static::lazy_static;
#[cfg(not(test))]
use spin::Mutex;
#[cfg(not(test))]
use uart_16550::SerialPort;

/// Standard COM1 port address
#[cfg(not(test))]
const SERIAL_IO_PORT: u16 = 0x3F8;

#[cfg(not(test))]
lazy_static! {
    /// Global serial port instance protected by spinlock
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(SERIAL_IO_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

/// Initialize serial port
pub fn init() {
    // Lazily initialized on first use; force it here
    #[cfg(not(test))]
    let _ = SERIAL1.lock();
}

/// Print to serial port (internal use)
#[cfg(not(test))]
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    use x86_64::instructions::interrupts;

    // Disable interrupts to prevent deadlock
    interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}

/// Under the host test harness the serial port does not exist;
/// diagnostics go to stdout instead.
#[cfg(test)]
#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    print!("{}", args);
}

/// Print to serial port
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Print to serial port with newline
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*
    ));
}
