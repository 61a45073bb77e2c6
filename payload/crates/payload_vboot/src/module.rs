use core::convert::Infallible;

use payload_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum ModuleError {
    #[error("reading module image: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot allocate {0} bytes for the module")]
    OutOfMemory(usize),
    #[error("error decompressing module")]
    Decompress,
    #[error("bad ELF magic value in module")]
    BadMagic,
    #[error("only loading of 32 bit modules is supported, found ELF class {0}")]
    UnsupportedClass(u8),
    #[error("module entry failed")]
    Entry,
}

/// A firmware image that can be started, such as an RW firmware slot.
pub trait FirmwareModule {
    /// Load and enter the module. Only returns if that failed, so all
    /// cleanup must be done before calling it.
    fn start(&mut self) -> Result<Infallible, ModuleError>;
}

impl<M: FirmwareModule + ?Sized> FirmwareModule for &mut M {
    fn start(&mut self) -> Result<Infallible, ModuleError> {
        (**self).start()
    }
}
