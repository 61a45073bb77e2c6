use payload_storage::StorageError;
use thiserror::Error;

pub type DcDirResult<T> = Result<T, DcDirError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum DcDirError {
    #[error("anchor signature mismatch")]
    AnchorSignature,
    #[error("incompatible version {0}")]
    Version(u8),
    #[error("anchor offset mismatch, expected {expected:#x}, found {found:#x}")]
    AnchorOffset { expected: u32, found: u32 },
    #[error("directory signature mismatch")]
    DirectorySignature,
    #[error("malformed directory header")]
    MalformedHeader,
    #[error("directory body truncated at byte {at:#x}")]
    Truncated { at: usize },
    #[error("pointer record of variant {variant} is only {len} bytes")]
    RecordTooShort { variant: u8, len: usize },
    #[error("unrecognized pointer type {0}")]
    UnknownVariant(u8),
    #[error("region is not a directory")]
    NotDirectory,
    #[error("region is a directory")]
    IsDirectory,
    #[error("entry not found")]
    NotFound,
    #[error("invalid entry name")]
    InvalidName,
    #[error("cannot allocate {0} bytes of scratch memory")]
    OutOfMemory(usize),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
