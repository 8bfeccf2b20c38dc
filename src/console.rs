//! `log` backend writing to the boot UART.

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record};
use static_cell::StaticCell;
use thiserror::Error;

use crate::drivers::uart::{ConsoleSink, pl011::Pl011};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Console already initialised")]
    AlreadyInitialised,
    #[error("Another logger is already installed")]
    LoggerInstalled,
}

/// Compile-time log level, read from `RUST_LOG` like env-logger would at
/// runtime.
pub fn max_level_from_env() -> LevelFilter {
    match option_env!("RUST_LOG") {
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

struct SinkWriter<'a, S: ConsoleSink>(&'a S);

impl<S: ConsoleSink> Write for SinkWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

pub struct Console<S> {
    sink: S,
    level: LevelFilter,
}

impl<S: ConsoleSink> Console<S> {
    pub const fn new(sink: S, level: LevelFilter) -> Self {
        Self { sink, level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl<S: ConsoleSink + Send> log::Log for Console<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Nowhere to report a failed console write.
        let _ = writeln!(
            SinkWriter(&self.sink),
            "[{} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static CONSOLE: StaticCell<Console<Pl011>> = StaticCell::new();

/// Installs `uart` as the global logger.
pub fn init(uart: Pl011) -> Result<(), ConsoleError> {
    let console: &'static Console<Pl011> = CONSOLE
        .try_init(Console::new(uart, max_level_from_env()))
        .ok_or(ConsoleError::AlreadyInitialised)?;

    log::set_logger(console).map_err(|_| ConsoleError::LoggerInstalled)?;
    log::set_max_level(console.level());

    Ok(())
}
