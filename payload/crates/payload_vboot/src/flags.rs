use alloc::boxed::Box;

use log::{error, info};
use thiserror::Error;

use crate::{InitFlags, VbootConfig};

/// Boolean platform signals.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Flag {
    DeveloperMode,
    Recovery,
    WriteProtect,
    LidOpen,
    Power,
    OptionRomsLoaded,
    EcInRw,
}

impl Flag {
    pub const COUNT: usize = 7;

    pub const ALL: [Flag; Self::COUNT] = [
        Flag::DeveloperMode,
        Flag::Recovery,
        Flag::WriteProtect,
        Flag::LidOpen,
        Flag::Power,
        Flag::OptionRomsLoaded,
        Flag::EcInRw,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum FlagError {
    #[error("flag {0:?} is not wired up on this board")]
    Unwired(Flag),
    #[error("reading flag {0:?} failed")]
    Query(Flag),
    #[error("flag {0:?} was already wired up")]
    AlreadyInstalled(Flag),
}

/// Something that can answer flag queries.
pub trait FlagSource {
    fn get(&mut self, flag: Flag) -> Result<bool, FlagError>;
}

impl<T: FlagSource + ?Sized> FlagSource for &mut T {
    fn get(&mut self, flag: Flag) -> Result<bool, FlagError> {
        (**self).get(flag)
    }
}

impl<T: FlagSource + ?Sized> FlagSource for Box<T> {
    fn get(&mut self, flag: Flag) -> Result<bool, FlagError> {
        (**self).get(flag)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("GPIO read failed")]
pub struct GpioError;

/// A single input line.
pub trait Gpio {
    fn read(&mut self) -> Result<bool, GpioError>;
}

/// A line tied to a constant level.
#[derive(Debug, Copy, Clone)]
pub struct FixedGpio(pub bool);

impl Gpio for FixedGpio {
    fn read(&mut self) -> Result<bool, GpioError> {
        Ok(self.0)
    }
}

struct Wiring {
    gpio: Box<dyn Gpio>,
    active_low: bool,
}

/// Flags backed by GPIOs, each installed exactly once during board setup.
#[derive(Default)]
pub struct GpioFlags {
    wiring: [Option<Wiring>; Flag::COUNT],
}

impl GpioFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &mut self,
        flag: Flag,
        gpio: Box<dyn Gpio>,
        active_low: bool,
    ) -> Result<(), FlagError> {
        let slot = &mut self.wiring[flag.index()];
        if slot.is_some() {
            error!("Flag {flag:?} wired up twice.");
            return Err(FlagError::AlreadyInstalled(flag));
        }
        *slot = Some(Wiring { gpio, active_low });
        Ok(())
    }

    pub fn is_installed(&self, flag: Flag) -> bool {
        self.wiring[flag.index()].is_some()
    }
}

impl FlagSource for GpioFlags {
    fn get(&mut self, flag: Flag) -> Result<bool, FlagError> {
        let wiring = self.wiring[flag.index()].as_mut().ok_or_else(|| {
            error!("Don't know how to read flag {flag:?}.");
            FlagError::Unwired(flag)
        })?;
        let level = wiring.gpio.read().map_err(|_| FlagError::Query(flag))?;
        Ok(level != wiring.active_low)
    }
}

/// One consistent snapshot of the flags the init stage needs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PlatformFlags {
    pub developer_mode: bool,
    pub recovery: bool,
    pub write_protect: bool,
    pub lid_open: bool,
    pub option_roms_loaded: bool,
}

impl PlatformFlags {
    /// Query every flag once. The option ROM flag is only read when
    /// option ROMs matter.
    ///
    /// All queries are made even if one fails so the log shows the whole
    /// picture, then the first failure is returned.
    pub fn gather<F: FlagSource + ?Sized>(
        source: &mut F,
        config: &VbootConfig,
    ) -> Result<Self, FlagError> {
        let dev = source.get(Flag::DeveloperMode);
        let rec = source.get(Flag::Recovery);
        let wp = source.get(Flag::WriteProtect);
        let lid = source.get(Flag::LidOpen);
        let oprom = if config.oprom_matters {
            source.get(Flag::OptionRomsLoaded)
        } else {
            Ok(false)
        };

        info!("dev {dev:?}, rec {rec:?}, wp {wp:?}, lid {lid:?}, oprom {oprom:?}");

        Ok(Self {
            developer_mode: dev?,
            recovery: rec?,
            write_protect: wp?,
            lid_open: lid?,
            option_roms_loaded: oprom?,
        })
    }

    /// The engine's input flags for this snapshot.
    pub fn init_flags(&self, config: &VbootConfig) -> InitFlags {
        let mut flags = InitFlags::RO_NORMAL_SUPPORT;
        // With the lid closed the OS may shut down before it can report a
        // successful boot.
        flags.set(InitFlags::NOFAIL_BOOT, !self.lid_open);
        flags.set(InitFlags::DEV_SWITCH_ON, self.developer_mode);
        flags.set(InitFlags::REC_BUTTON_PRESSED, self.recovery);
        flags.set(InitFlags::WP_ENABLED, self.write_protect);
        flags.set(InitFlags::OPROM_LOADED, self.option_roms_loaded);
        flags.set(InitFlags::OPROM_MATTERS, config.oprom_matters);
        flags.set(InitFlags::VIRTUAL_DEV_SWITCH, config.virtual_dev_switch);
        flags.set(InitFlags::EC_SOFTWARE_SYNC, config.ec_software_sync);
        flags.set(InitFlags::VIRTUAL_REC_SWITCH, !config.physical_rec_switch);
        flags
    }
}
