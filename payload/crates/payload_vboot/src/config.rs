/// Kernels were historically linked to run at 1 MiB. The engine reports
/// the bootloader address as if the kernel buffer started there.
pub const LEGACY_KERNEL_LOAD_ADDRESS: u64 = 0x10_0000;

pub const DEFAULT_KERNEL_SIZE: usize = 16 * 1024 * 1024;

/// Where the kernel is loaded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KernelPlacement {
    /// A heap buffer of the configured size.
    Hosted,
    /// A fixed physical address, reserved for the kernel by the board.
    Fixed { address: usize },
}

/// Build-time policy of the verified boot stages.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VbootConfig {
    pub oprom_matters: bool,
    pub virtual_dev_switch: bool,
    pub ec_software_sync: bool,
    pub physical_rec_switch: bool,
    pub(crate) kernel_placement: KernelPlacement,
    pub(crate) kernel_size: usize,
    pub(crate) legacy_load_address: u64,
}

impl VbootConfig {
    /// The configuration selected by the crate's Cargo features, with a
    /// hosted kernel buffer.
    pub fn from_features() -> Self {
        Self {
            oprom_matters: cfg!(feature = "oprom-matters"),
            virtual_dev_switch: cfg!(feature = "virtual-dev-switch"),
            ec_software_sync: cfg!(feature = "ec-software-sync"),
            physical_rec_switch: cfg!(feature = "physical-rec-switch"),
            kernel_placement: KernelPlacement::Hosted,
            kernel_size: DEFAULT_KERNEL_SIZE,
            legacy_load_address: LEGACY_KERNEL_LOAD_ADDRESS,
        }
    }

    /// Load the kernel into a heap buffer of `size` bytes.
    pub fn with_hosted_kernel(mut self, size: usize) -> Self {
        self.kernel_placement = KernelPlacement::Hosted;
        self.kernel_size = size;
        self
    }

    /// Load the kernel in place at `address`.
    ///
    /// # Safety
    /// `address..address + size` must be writable memory that nothing
    /// else uses for the rest of the boot.
    pub unsafe fn with_fixed_kernel(mut self, address: usize, size: usize) -> Self {
        self.kernel_placement = KernelPlacement::Fixed { address };
        self.kernel_size = size;
        self
    }

    pub fn kernel_placement(&self) -> KernelPlacement {
        self.kernel_placement
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn legacy_load_address(&self) -> u64 {
        self.legacy_load_address
    }
}

impl Default for VbootConfig {
    fn default() -> Self {
        Self::from_features()
    }
}
