use core::convert::Infallible;

use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum PlatformError {
    #[error("cold reboot failed")]
    ColdReboot,
    #[error("power off failed")]
    PowerOff,
    #[error("EC reboot to RO failed")]
    EcReboot,
    #[error("wiping unused memory failed")]
    MemoryWipe,
}

/// Boot milestones recorded by [`Platform::timestamp`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Timestamp {
    RoVbInit,
    RoVbSelectFirmware,
    RoVbSelectAndLoadKernel,
}

/// Board level primitives the stages escalate to.
pub trait Platform {
    /// Reset the whole system. Only returns if the reset failed.
    fn cold_reboot(&mut self) -> Result<Infallible, PlatformError>;

    /// Turn the system off. Only returns if that failed.
    fn power_off(&mut self) -> Result<Infallible, PlatformError>;

    /// Ask the embedded controller to restart into its read-only image.
    fn reboot_ec_to_ro(&mut self) -> Result<(), PlatformError>;

    /// Clear all memory the firmware does not use.
    fn memory_wipe_unused(&mut self) -> Result<(), PlatformError>;

    /// Bring up input devices ahead of an interactive screen.
    fn keyboard_prepare(&mut self);

    fn timestamp(&mut self, stamp: Timestamp) {
        let _ = stamp;
    }
}

impl<P: Platform + ?Sized> Platform for &mut P {
    fn cold_reboot(&mut self) -> Result<Infallible, PlatformError> {
        (**self).cold_reboot()
    }

    fn power_off(&mut self) -> Result<Infallible, PlatformError> {
        (**self).power_off()
    }

    fn reboot_ec_to_ro(&mut self) -> Result<(), PlatformError> {
        (**self).reboot_ec_to_ro()
    }

    fn memory_wipe_unused(&mut self) -> Result<(), PlatformError> {
        (**self).memory_wipe_unused()
    }

    fn keyboard_prepare(&mut self) {
        (**self).keyboard_prepare()
    }

    fn timestamp(&mut self, stamp: Timestamp) {
        (**self).timestamp(stamp)
    }
}
