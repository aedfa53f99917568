//! Console output.  Whichever UART is installed with [`init`] carries both
//! `print!` output and records emitted through the `log` facade.

use core::fmt;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

const fn ctrl(b: u8) -> u8 {
    b - b'@'
}

const BACKSPACE: u8 = ctrl(b'H');

pub trait Uart: Send {
    fn putb(&mut self, b: u8);
}

static CONS: Mutex<Option<&'static mut dyn Uart>> = Mutex::new(None);
static LOGGER: Console = Console;

/// Console is the `log` backend.  Output is dropped until a UART has been
/// installed.
pub struct Console;

impl Log for Console {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            print(format_args!("{:<5} {}: {}\n", record.level(), record.target(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Install `uart` as the console and route `log` records at or above `level`
/// to it.  Fails if some other logger got there first.
pub fn init(uart: &'static mut dyn Uart, level: LevelFilter) -> Result<(), SetLoggerError> {
    *CONS.lock() = Some(uart);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Writes straight to a UART, translating newlines on the way.
struct UartWriter<'a>(&'a mut dyn Uart);

impl fmt::Write for UartWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            putb(self.0, b);
        }
        Ok(())
    }
}

/// The lock is held for the whole of `args`, so lines from different CPUs
/// don't interleave.
pub fn print(args: fmt::Arguments) {
    use fmt::Write;
    let mut cons = CONS.lock();
    if let Some(uart) = cons.as_deref_mut() {
        // UartWriter never fails.
        let _ = UartWriter(uart).write_fmt(args);
    }
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! print {
    ($($args:tt)*) => {{
        $crate::devcons::print(format_args!($($args)*))
    }};
}

fn putb(uart: &mut dyn Uart, b: u8) {
    if b == b'\n' {
        uart.putb(b'\r');
    } else if b == BACKSPACE {
        uart.putb(b);
        uart.putb(b' ');
    }
    uart.putb(b);
}
