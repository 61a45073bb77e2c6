use payload_storage::StorageError;
use thiserror::Error;

use crate::{FlagError, HandoffError, ModuleError, PlatformError, Stage};

pub type VbootResult<T> = Result<T, VbootError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum VbootError {
    #[error("stage {attempted:?} requested while the sequencer is at {current:?}")]
    OutOfOrder { current: Stage, attempted: Stage },
    #[error("platform flags: {0}")]
    Flags(#[from] FlagError),
    #[error("verification block storage: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot allocate {0} bytes")]
    OutOfMemory(usize),
    #[error("platform: {0}")]
    Platform(#[from] PlatformError),
    #[error("firmware module: {0}")]
    Module(#[from] ModuleError),
    #[error("engine loaded a kernel from unknown disk {0}")]
    UnknownDisk(usize),
    #[error("kernel hand-off: {0}")]
    Handoff(#[from] HandoffError),
}
