//! Entry point of the read-only firmware.

use alloc::rc::Rc;
use core::convert::Infallible;

use log::error;
use payload_vboot::{KernelLauncher, Platform, RwSlot, Vboot, VbootConfig, VbootEngine};

use crate::{Board, DcModule, FirmwareLayout, LayoutNames, ModuleLoader, PayloadResult, window};

pub const DEFAULT_MAX_MODULE_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Copy, Clone)]
pub struct ReadOnlyConfig<'a> {
    /// Offset of the flash directory anchor.
    pub anchor_offset: u32,
    pub names: LayoutNames<'a>,
    pub vboot: VbootConfig,
    pub max_module_size: usize,
}

impl ReadOnlyConfig<'static> {
    pub fn new(anchor_offset: u32) -> Self {
        Self {
            anchor_offset,
            names: LayoutNames::default(),
            vboot: VbootConfig::from_features(),
            max_module_size: DEFAULT_MAX_MODULE_SIZE,
        }
    }
}

/// Run all verified boot stages. Only returns if booting failed.
pub fn run_readonly<E, P, L>(
    board: Board,
    engine: E,
    platform: P,
    loader: Rc<dyn ModuleLoader>,
    launcher: &mut L,
    config: &ReadOnlyConfig<'_>,
) -> PayloadResult<Infallible>
where
    E: VbootEngine,
    P: Platform,
    L: KernelLauncher + ?Sized,
{
    let (flags, mut rest) = board.into_flags();
    let mut vboot = Vboot::new(engine, platform, flags, config.vboot);

    vboot.init()?;

    let layout = FirmwareLayout::from_dcdir(&rest.flash, config.anchor_offset, &config.names)?;
    let mut vblock_a = window(&rest.flash, layout.vblock_a);
    let mut vblock_b = window(&rest.flash, layout.vblock_b);
    let mut module_a = DcModule::new(
        window(&rest.flash, layout.fw_main_a),
        loader.clone(),
        config.max_module_size,
    );
    let mut module_b = DcModule::new(
        window(&rest.flash, layout.fw_main_b),
        loader,
        config.max_module_size,
    );
    vboot.select_firmware(
        RwSlot {
            vblock: &mut vblock_a,
            module: &mut module_a,
        },
        RwSlot {
            vblock: &mut vblock_b,
            module: &mut module_b,
        },
    )?;

    Ok(vboot.select_and_load_kernel(&mut rest, launcher)?)
}

/// [`run_readonly`], halting if anything goes wrong.
pub fn readonly_main<E, P, L>(
    board: Board,
    engine: E,
    platform: P,
    loader: Rc<dyn ModuleLoader>,
    launcher: &mut L,
    config: &ReadOnlyConfig<'_>,
) -> !
where
    E: VbootEngine,
    P: Platform,
    L: KernelLauncher + ?Sized,
{
    match run_readonly(board, engine, platform, loader, launcher, config) {
        Ok(never) => match never {},
        Err(e) => {
            error!("Read-only firmware failed: {e}");
            halt()
        }
    }
}

/// Stop here for good.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
