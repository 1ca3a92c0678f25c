//! Console I/O collaborator and the `log` backend built on top of it.
//!
//! The syscall layer needs a byte-oriented console for `write`/`read` on file
//! descriptors 0 and 1 (`putbuf`/`input_getc`). The same sink backs a
//! [`log::Log`] implementation, replacing the teacher crate's ad hoc
//! `pl011_println!` macro with the standard `log` facade (see `DESIGN.md`).

extern crate alloc;

use core::fmt::Write as _;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Narrow console collaborator: the kernel only needs to write bytes out and
/// read bytes in, one at a time. Real hardware backs this with a UART or VGA
/// buffer; host builds back it with a buffer for test assertions.
pub trait Console: Send + Sync {
    /// Write `buf` to the console, returning the number of bytes written.
    fn putbuf(&self, buf: &[u8]) -> usize;

    /// Read a single byte from the console, blocking until one is available.
    fn input_getc(&self) -> u8;
}

/// A console that discards writes and yields no input; the default for
/// bare-metal builds before a real console driver is installed, and for unit
/// tests that do not care about console content.
pub struct NullConsole;

impl Console for NullConsole {
    fn putbuf(&self, buf: &[u8]) -> usize {
        buf.len()
    }

    fn input_getc(&self) -> u8 {
        0
    }
}

/// An in-memory console for host-side tests: writes accumulate into a
/// buffer, and reads drain a pre-seeded input buffer.
#[cfg(any(test, feature = "std-shim"))]
pub struct BufferConsole {
    out: Mutex<alloc::vec::Vec<u8>>,
    input: Mutex<alloc::vec::Vec<u8>>,
}

#[cfg(any(test, feature = "std-shim"))]
impl BufferConsole {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(alloc::vec::Vec::new()),
            input: Mutex::new(alloc::vec::Vec::new()),
        }
    }

    /// Seed bytes to be returned, in order, by subsequent `input_getc` calls.
    pub fn feed_input(&self, bytes: &[u8]) {
        self.input.lock().extend_from_slice(bytes);
    }

    /// Snapshot everything written so far, as a `String` (lossy on non-UTF8).
    pub fn written(&self) -> alloc::string::String {
        alloc::string::String::from_utf8_lossy(&self.out.lock()).into_owned()
    }
}

#[cfg(any(test, feature = "std-shim"))]
impl Default for BufferConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "std-shim"))]
impl Console for BufferConsole {
    fn putbuf(&self, buf: &[u8]) -> usize {
        self.out.lock().extend_from_slice(buf);
        buf.len()
    }

    fn input_getc(&self) -> u8 {
        let mut input = self.input.lock();
        if input.is_empty() {
            0
        } else {
            input.remove(0)
        }
    }
}

/// Adapter that lets a [`Console`] receive `core::fmt::Write` output, used
/// internally by [`KernelLogger`] to format log records without heap churn
/// beyond what `core::fmt` itself needs.
struct ConsoleWriter<'a>(&'a dyn Console);

impl core::fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.putbuf(s.as_bytes());
        Ok(())
    }
}

/// A [`log::Log`] implementation that formats records as
/// `LEVEL target: message\n` and writes them to the installed console.
///
/// Scheduler transitions, donation events, MLFQS recomputation, and process
/// lifecycle events are logged through this at `trace`/`debug` level, the
/// same call sites the teacher crate marked with bare `pl011_println!`
/// prints, now leveled.
pub struct KernelLogger {
    console: &'static dyn Console,
    level: LevelFilter,
}

impl KernelLogger {
    pub const fn new(console: &'static dyn Console, level: LevelFilter) -> Self {
        Self { console, level }
    }

    /// Install this logger as the global `log` backend. Must be called at
    /// most once; intended to run during kernel bring-up.
    pub fn install(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut writer = ConsoleWriter(self.console);
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = write!(writer, "[{level}] {}: ", record.target());
        let _ = core::fmt::write(&mut writer, *record.args());
        let _ = writer.write_str("\n");
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_roundtrips_input_and_output() {
        let console = BufferConsole::new();
        console.feed_input(b"ab");
        assert_eq!(console.input_getc(), b'a');
        assert_eq!(console.input_getc(), b'b');
        assert_eq!(console.input_getc(), 0);

        console.putbuf(b"hello");
        assert_eq!(console.written(), "hello");
    }

    #[test]
    fn null_console_reports_full_write_and_no_input() {
        let console = NullConsole;
        assert_eq!(console.putbuf(b"xyz"), 3);
        assert_eq!(console.input_getc(), 0);
    }
}
