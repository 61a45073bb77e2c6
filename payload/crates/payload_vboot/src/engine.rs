use bitflags::bitflags;
use thiserror::Error;

use crate::VbootCallbacks;

bitflags! {
    /// Input flags of the engine's init entry point.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct InitFlags: u32 {
        const DEV_SWITCH_ON = 0x0000_0001;
        const REC_BUTTON_PRESSED = 0x0000_0002;
        const WP_ENABLED = 0x0000_0004;
        const S3_RESUME = 0x0000_0008;
        const PREVIOUS_BOOT_FAIL = 0x0000_0010;
        const RO_NORMAL_SUPPORT = 0x0000_0020;
        const OPROM_LOADED = 0x0000_0040;
        const OPROM_MATTERS = 0x0000_0080;
        const VIRTUAL_DEV_SWITCH = 0x0000_0100;
        const EC_SOFTWARE_SYNC = 0x0000_0200;
        const EC_SLOW_UPDATE = 0x0000_0400;
        const VIRTUAL_REC_SWITCH = 0x0000_0800;
        const SW_WP_ENABLED = 0x0000_1000;
        const BEFORE_OPROM_LOAD = 0x0000_2000;
        const NOFAIL_BOOT = 0x0000_4000;
    }

    /// Output flags of the engine's init entry point.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct InitOutFlags: u32 {
        const ENABLE_RECOVERY = 0x0000_0001;
        const CLEAR_RAM = 0x0000_0002;
        const ENABLE_DISPLAY = 0x0000_0004;
        const ENABLE_USB_STORAGE = 0x0000_0008;
        const S3_DEBUG_BOOT = 0x0000_0010;
        const ENABLE_OPROM = 0x0000_0020;
        const ENABLE_ALTERNATE_OS = 0x0000_0040;
        const ENABLE_DEVELOPER = 0x0000_0080;
    }
}

/// Firmware chosen by the engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FirmwareSelection {
    Recovery,
    A,
    B,
    /// Keep running the read-only firmware.
    ReadOnly,
}

/// What the engine reports about a kernel it has verified and loaded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelLoadInfo {
    /// Address of the inline bootloader, assuming the kernel buffer starts
    /// at the legacy load address.
    pub bootloader_address: u64,
    pub bootloader_size: u32,
    /// Zero-based partition the kernel came from.
    pub partition_number: u32,
    pub partition_guid: [u8; 16],
    /// Index of the disk the kernel came from, as passed to
    /// [`VbootCallbacks::disk`].
    pub disk_index: usize,
}

/// Non-success results of an engine call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum EngineError {
    #[error("EC reboot to RO required")]
    EcRebootToRoRequired,
    #[error("shutdown requested")]
    ShutdownRequested,
    #[error("engine error {0:#x}")]
    Failure(u32),
}

/// The external verified boot engine.
///
/// It owns all NVRAM-backed decision state and performs the cryptographic
/// checks. The stage sequencer only passes inputs in and acts on results.
pub trait VbootEngine {
    fn init(&mut self, flags: InitFlags) -> Result<InitOutFlags, EngineError>;

    fn select_firmware(
        &mut self,
        vblock_a: &[u8],
        vblock_b: &[u8],
    ) -> Result<FirmwareSelection, EngineError>;

    /// Select a kernel and load it into `kernel_buffer`. Keyboard, EC and
    /// disk access go through `callbacks`.
    fn select_and_load_kernel(
        &mut self,
        kernel_buffer: &mut [u8],
        callbacks: &mut dyn VbootCallbacks,
    ) -> Result<KernelLoadInfo, EngineError>;
}

impl<E: VbootEngine + ?Sized> VbootEngine for &mut E {
    fn init(&mut self, flags: InitFlags) -> Result<InitOutFlags, EngineError> {
        (**self).init(flags)
    }

    fn select_firmware(
        &mut self,
        vblock_a: &[u8],
        vblock_b: &[u8],
    ) -> Result<FirmwareSelection, EngineError> {
        (**self).select_firmware(vblock_a, vblock_b)
    }

    fn select_and_load_kernel(
        &mut self,
        kernel_buffer: &mut [u8],
        callbacks: &mut dyn VbootCallbacks,
    ) -> Result<KernelLoadInfo, EngineError> {
        (**self).select_and_load_kernel(kernel_buffer, callbacks)
    }
}
