use log::{error, info};
use thiserror::Error;

use crate::{Flag, FlagSource};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum EcError {
    #[error("EC software sync not supported")]
    SoftSyncUnsupported,
}

/// Embedded controller operations the engine needs for software sync.
pub trait EcSync {
    /// Whether the EC can be trusted to report the boot mode.
    fn trusted(&mut self) -> bool;

    fn running_rw(&mut self) -> Result<bool, EcError>;

    fn jump_to_rw(&mut self) -> Result<(), EcError>;

    fn disable_jump(&mut self) -> Result<(), EcError>;

    fn update_rw(&mut self, image: &[u8]) -> Result<(), EcError>;

    fn protect_rw(&mut self) -> Result<(), EcError>;
}

/// Boards without an embedded controller.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoEc;

impl NoEc {
    fn unsupported<T>() -> Result<T, EcError> {
        error!("EC software sync not supported.");
        Err(EcError::SoftSyncUnsupported)
    }
}

impl EcSync for NoEc {
    fn trusted(&mut self) -> bool {
        info!("The EC which doesn't exist isn't untrusted.");
        true
    }

    fn running_rw(&mut self) -> Result<bool, EcError> {
        Self::unsupported()
    }

    fn jump_to_rw(&mut self) -> Result<(), EcError> {
        Self::unsupported()
    }

    fn disable_jump(&mut self) -> Result<(), EcError> {
        Self::unsupported()
    }

    fn update_rw(&mut self, _image: &[u8]) -> Result<(), EcError> {
        Self::unsupported()
    }

    fn protect_rw(&mut self) -> Result<(), EcError> {
        Self::unsupported()
    }
}

/// An EC without software sync whose mode is reported by a flag. It is
/// only trusted while it runs its read-only image.
pub struct FlagEc<F> {
    flags: F,
}

impl<F: FlagSource> FlagEc<F> {
    pub fn new(flags: F) -> Self {
        Self { flags }
    }
}

impl<F: FlagSource> EcSync for FlagEc<F> {
    fn trusted(&mut self) -> bool {
        match self.flags.get(Flag::EcInRw) {
            Ok(in_rw) => !in_rw,
            Err(e) => {
                error!("Cannot tell whether the EC runs RW: {e}");
                false
            }
        }
    }

    fn running_rw(&mut self) -> Result<bool, EcError> {
        self.flags
            .get(Flag::EcInRw)
            .map_err(|_| EcError::SoftSyncUnsupported)
    }

    fn jump_to_rw(&mut self) -> Result<(), EcError> {
        NoEc::unsupported()
    }

    fn disable_jump(&mut self) -> Result<(), EcError> {
        NoEc::unsupported()
    }

    fn update_rw(&mut self, _image: &[u8]) -> Result<(), EcError> {
        NoEc::unsupported()
    }

    fn protect_rw(&mut self) -> Result<(), EcError> {
        NoEc::unsupported()
    }
}
