//! `log` backend that writes to a console, typically a serial port.

use alloc::boxed::Box;
use core::fmt::Write;

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum LoggerError {
    #[error("logger already initialized")]
    AlreadyInitialized,
}

static LOGGER: OnceCell<ConsoleLogger> = OnceCell::uninit();

pub struct ConsoleLogger {
    sink: Mutex<Box<dyn Write + Send>>,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(sink: Box<dyn Write + Send>, level: LevelFilter) -> Self {
        Self {
            sink: Mutex::new(sink),
            level,
        }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sink = self.sink.lock();
        // Nowhere to report a failing console.
        let _ = write!(
            sink,
            "[{level:<5} {target}] {message}\r\n",
            level = record.level(),
            target = record.target(),
            message = record.args(),
        );
    }

    fn flush(&self) {}
}

/// Install the console logger. Can only be done once.
pub fn init(sink: Box<dyn Write + Send>, level: LevelFilter) -> Result<(), LoggerError> {
    LOGGER
        .try_init_once(|| ConsoleLogger::new(sink, level))
        .map_err(|_| LoggerError::AlreadyInitialized)?;
    let logger = LOGGER.get().ok_or(LoggerError::AlreadyInitialized)?;
    log::set_logger(logger).map_err(|_| LoggerError::AlreadyInitialized)?;
    log::set_max_level(level);
    Ok(())
}
