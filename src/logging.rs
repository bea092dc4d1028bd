//! Minimal colourized logger, adapted from the host hypervisor's own
//! `logging` module.
//!
//! The host hypervisor writes directly to a platform UART; this core has no
//! platform of its own (the UART, like the rest of the "outer VMM lifecycle",
//! is an external collaborator), so the sink is injected by whoever embeds
//! the crate. Call [`init`] once with anything that implements
//! [`core::fmt::Write`] before touching the vGIC.

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Something the logger can write formatted lines to.
pub trait LogSink: Send {
    fn write_line(&mut self, line: fmt::Arguments<'_>);
}

struct SinkWriter<'a>(&'a mut dyn LogSink);

impl Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_line(format_args!("{s}"));
        Ok(())
    }
}

static SINK: Mutex<Option<alloc::boxed::Box<dyn LogSink>>> = Mutex::new(None);

macro_rules! with_color {
    ($color_code:expr, $($arg:tt)*) => {{
        format_args!("\u{1B}[{}m{}\u{1B}[m", $color_code as u8, format_args!($($arg)*))
    }};
}

#[repr(u8)]
#[allow(dead_code)]
enum ColorCode {
    Red = 31,
    Green = 32,
    Yellow = 33,
    White = 37,
    BrightRed = 91,
    BrightGreen = 92,
    BrightYellow = 93,
    BrightCyan = 96,
    BrightBlack = 90,
}

/// Install the global logger, directing its output at `sink`.
///
/// `level` follows the usual `log` convention; pass `LevelFilter::Off` to
/// silence the vGIC entirely (e.g. in a unit test that asserts on FIFO
/// overflow and doesn't want the `error!` noise).
pub fn init(sink: alloc::boxed::Box<dyn LogSink>, level: LevelFilter) {
    *SINK.lock() = Some(sink);
    static LOGGER: VgicLogger = VgicLogger;
    // Re-initializing across multiple tests in the same process is harmless;
    // `set_logger` only errors if a *different* logger is already installed.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

struct VgicLogger;

impl Log for VgicLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut guard = SINK.lock();
        let Some(sink) = guard.as_deref_mut() else {
            return;
        };

        let level = record.level();
        let level_color = match level {
            Level::Error => ColorCode::BrightRed,
            Level::Warn => ColorCode::BrightYellow,
            Level::Info => ColorCode::BrightGreen,
            Level::Debug => ColorCode::BrightCyan,
            Level::Trace => ColorCode::BrightBlack,
        };
        let args_color = match level {
            Level::Error => ColorCode::Red,
            Level::Warn => ColorCode::Yellow,
            Level::Info => ColorCode::Green,
            Level::Debug => ColorCode::BrightCyan,
            Level::Trace => ColorCode::BrightBlack,
        };
        let mut writer = SinkWriter(sink);
        let _ = writer.write_fmt(format_args!(
            "{} {} {}\n",
            with_color!(level_color, "{:<5}", level),
            with_color!(ColorCode::White, "({})", record.target()),
            with_color!(args_color, "{}", record.args()),
        ));
    }

    fn flush(&self) {}
}
