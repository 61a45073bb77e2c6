use alloc::vec::Vec;
use core::convert::Infallible;
use core::ptr::NonNull;

use log::{error, info};
use thiserror::Error;

use crate::{
    CommandLineError, CommandLineParams, KernelLoadInfo, KernelPlacement, VbootConfig,
    VbootError, VbootResult, substitute,
};

pub const CMD_LINE_SIZE: usize = 4096;
pub const CROS_PARAM_SIZE: usize = 4096;

pub type HandoffResult<T> = Result<T, HandoffError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum HandoffError {
    #[error("bootloader address {0:#x} is below the legacy load address")]
    BootloaderBelowLoadAddress(u64),
    #[error("bootloader at offset {loader:#x} leaves no room for parameters and command line")]
    NoRoomBeforeLoader { loader: u64 },
    #[error("bootloader at offset {loader:#x} is outside the {len:#x} byte kernel buffer")]
    LoaderOutsideBuffer { loader: u64, len: usize },
    #[error("command line: {0}")]
    CommandLine(#[from] CommandLineError),
    #[error("publishing boot data failed")]
    BootData,
    #[error("kernel entry failed")]
    Boot,
}

/// Placement of the hand-off structures, as offsets into the kernel
/// buffer.
///
/// ```text
///  kernel buffer
/// +---------...---+----------+-----------+------------...
/// | kernel        | cmd line | params    | bootloader
/// +---------...---+----------+-----------+------------...
///                 ^ cmd_line ^ params    ^ loader
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HandoffLayout {
    pub loader: usize,
    pub params: usize,
    pub cmd_line: usize,
}

impl HandoffLayout {
    /// Locate the structures in a buffer of `buffer_len` bytes from the
    /// bootloader address reported by the engine.
    pub fn compute(
        bootloader_address: u64,
        legacy_load_address: u64,
        buffer_len: usize,
    ) -> HandoffResult<Self> {
        let loader = bootloader_address
            .checked_sub(legacy_load_address)
            .ok_or(HandoffError::BootloaderBelowLoadAddress(bootloader_address))?;
        let outside = HandoffError::LoaderOutsideBuffer {
            loader,
            len: buffer_len,
        };
        let loader_offset = usize::try_from(loader).map_err(|_| outside)?;
        if loader_offset > buffer_len {
            return Err(outside);
        }

        let params = loader_offset
            .checked_sub(CROS_PARAM_SIZE)
            .ok_or(HandoffError::NoRoomBeforeLoader { loader })?;
        let cmd_line = params
            .checked_sub(CMD_LINE_SIZE)
            .ok_or(HandoffError::NoRoomBeforeLoader { loader })?;

        Ok(Self {
            loader: loader_offset,
            params,
            cmd_line,
        })
    }
}

/// Memory the engine loads the kernel into.
pub struct KernelBuffer {
    placement: Placement,
}

enum Placement {
    Hosted(Vec<u8>),
    Fixed { start: NonNull<u8>, len: usize },
}

impl KernelBuffer {
    pub fn allocate(config: &VbootConfig) -> VbootResult<Self> {
        let len = config.kernel_size();
        let placement = match config.kernel_placement() {
            KernelPlacement::Hosted => {
                let mut buf = Vec::new();
                buf.try_reserve_exact(len)
                    .map_err(|_| VbootError::OutOfMemory(len))?;
                buf.resize(len, 0);
                Placement::Hosted(buf)
            }
            KernelPlacement::Fixed { address } => {
                let start =
                    NonNull::new(address as *mut u8).ok_or(VbootError::OutOfMemory(len))?;
                Placement::Fixed { start, len }
            }
        };
        Ok(Self { placement })
    }

    /// Address of the first byte.
    pub fn base_address(&self) -> usize {
        match &self.placement {
            Placement::Hosted(buf) => buf.as_ptr() as usize,
            Placement::Fixed { start, .. } => start.as_ptr() as usize,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.placement {
            Placement::Hosted(buf) => buf.as_mut_slice(),
            // SAFETY: a fixed placement can only be configured through
            // `VbootConfig::with_fixed_kernel`, whose caller guarantees the
            // range is writable and exclusively ours.
            Placement::Fixed { start, len } => unsafe {
                core::slice::from_raw_parts_mut(start.as_ptr(), *len)
            },
        }
    }
}

/// Everything the kernel entry needs.
pub struct BootImage<'a> {
    pub kernel: &'a mut [u8],
    /// Substituted command line including its NUL terminator.
    pub command_line: &'a [u8],
    pub layout: HandoffLayout,
    /// Address of `kernel[0]`.
    pub base: usize,
}

impl BootImage<'_> {
    pub fn loader_address(&self) -> usize {
        self.base.wrapping_add(self.layout.loader)
    }

    pub fn params_address(&self) -> usize {
        self.base.wrapping_add(self.layout.params)
    }
}

/// Board specific last steps of the kernel hand-off.
pub trait KernelLauncher {
    /// Make firmware state available to the OS.
    fn publish_boot_data(&mut self, info: &KernelLoadInfo) -> HandoffResult<()>;

    /// Jump into the kernel. Only returns if that failed.
    fn boot(&mut self, image: BootImage<'_>) -> HandoffResult<Infallible>;
}

/// Prepare the command line for a loaded kernel and enter it.
///
/// `external_gpt` is the boot disk's [`crate::BlockDevice::external_gpt`].
pub fn hand_off<L: KernelLauncher + ?Sized>(
    kernel: &mut KernelBuffer,
    info: &KernelLoadInfo,
    legacy_load_address: u64,
    external_gpt: bool,
    launcher: &mut L,
) -> HandoffResult<Infallible> {
    let base = kernel.base_address();
    let buf = kernel.as_mut_slice();
    let layout = HandoffLayout::compute(info.bootloader_address, legacy_load_address, buf.len())
        .inspect_err(|e| error!("Cannot place boot structures: {e}"))?;

    let template = &buf[layout.cmd_line..layout.params];
    let mut cmd_line = [0u8; CMD_LINE_SIZE * 2];
    let params = CommandLineParams {
        devnum: 0,
        partnum: info.partition_number + 1,
        guid: &info.partition_guid,
        external_gpt,
    };
    let len = substitute(template, &params, &mut cmd_line)?;

    launcher.publish_boot_data(info)?;

    info!(
        "Booting kernel at {base:#x}, loader at {:#x}.",
        base.wrapping_add(layout.loader)
    );
    launcher.boot(BootImage {
        kernel: buf,
        command_line: &cmd_line[..=len],
        layout,
        base,
    })
}
