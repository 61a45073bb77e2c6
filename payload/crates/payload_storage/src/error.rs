use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum StorageError {
    #[error("out of bounds access of {len} bytes at {offset:#x} (size {size:#x})")]
    OutOfBounds { offset: u32, len: usize, size: u32 },
    #[error("operation not supported by this device")]
    Unsupported,
    #[error("access of {len:#x} bytes at {offset:#x} is not aligned to the erase size {erase_size:#x}")]
    Misaligned { offset: u32, len: u32, erase_size: u32 },
    #[error("write at {offset:#x} would set bits that are not erased")]
    NotErased { offset: u32 },
    #[error("storage device is already in use")]
    Busy,
    #[error("device error")]
    Device,
}
