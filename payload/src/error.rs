use payload_dcdir::DcDirError;
use payload_vboot::VbootError;
use thiserror::Error;

use crate::BoardError;

pub type PayloadResult<T> = Result<T, PayloadError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum PayloadError {
    #[error("board setup: {0}")]
    Board(#[from] BoardError),
    #[error("firmware layout: {0}")]
    Layout(#[from] DcDirError),
    #[error("verified boot: {0}")]
    Vboot(#[from] VbootError),
}
