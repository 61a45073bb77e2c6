//! Recording test doubles for the engine and the board.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use payload_storage::{FlashStorage, RamFlash, StorageOps};

use crate::{
    BlockDevice, BootImage, EcError, EcSync, EngineError, FirmwareModule, FirmwareSelection, Flag,
    FlagError, FlagSource, HandoffError, HandoffResult, InitFlags, InitOutFlags, KernelLauncher,
    KernelLoadInfo, KeyFlags, ModuleError, Platform, PlatformError, Timestamp, VbootCallbacks,
    VbootEngine,
};

/// What the engine saw of the board while loading a kernel.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SeenCallbacks {
    pub ec_trusted: bool,
    pub key: (u32, KeyFlags),
    pub fixed_disks: Vec<usize>,
    pub removable_disks: Vec<usize>,
}

pub struct MockEngine {
    pub init: Result<InitOutFlags, EngineError>,
    pub selection: Result<FirmwareSelection, EngineError>,
    pub kernel: Result<KernelLoadInfo, EngineError>,

    pub init_calls: usize,
    pub init_flags: Option<InitFlags>,
    pub select_firmware_calls: usize,
    pub vblock_a: Vec<u8>,
    pub vblock_b: Vec<u8>,
    pub kernel_calls: usize,
    pub kernel_buffer_len: usize,
    pub seen: Option<SeenCallbacks>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            init: Ok(InitOutFlags::empty()),
            selection: Ok(FirmwareSelection::ReadOnly),
            kernel: Err(EngineError::Failure(1)),
            init_calls: 0,
            init_flags: None,
            select_firmware_calls: 0,
            vblock_a: Vec::new(),
            vblock_b: Vec::new(),
            kernel_calls: 0,
            kernel_buffer_len: 0,
            seen: None,
        }
    }
}

impl VbootEngine for MockEngine {
    fn init(&mut self, flags: InitFlags) -> Result<InitOutFlags, EngineError> {
        self.init_calls += 1;
        self.init_flags = Some(flags);
        self.init
    }

    fn select_firmware(
        &mut self,
        vblock_a: &[u8],
        vblock_b: &[u8],
    ) -> Result<FirmwareSelection, EngineError> {
        self.select_firmware_calls += 1;
        self.vblock_a = vblock_a.to_vec();
        self.vblock_b = vblock_b.to_vec();
        self.selection
    }

    /// Checks EC trust, polls the keyboard once and enumerates the disks,
    /// like an engine deciding which screen to show.
    fn select_and_load_kernel(
        &mut self,
        kernel_buffer: &mut [u8],
        callbacks: &mut dyn VbootCallbacks,
    ) -> Result<KernelLoadInfo, EngineError> {
        self.kernel_calls += 1;
        self.kernel_buffer_len = kernel_buffer.len();
        self.seen = Some(SeenCallbacks {
            ec_trusted: callbacks.ec().trusted(),
            key: callbacks.read_key(),
            fixed_disks: callbacks.disk_indices(false),
            removable_disks: callbacks.disk_indices(true),
        });
        self.kernel
    }
}

/// Reboot and power off always "fail", since a real success would not
/// return.
#[derive(Default)]
pub struct MockPlatform {
    pub cold_reboots: usize,
    pub power_offs: usize,
    pub ec_reboots: usize,
    pub memory_wipes: usize,
    pub keyboard_prepares: usize,
    pub timestamps: Vec<Timestamp>,
    pub fail_memory_wipe: bool,
}

impl Platform for MockPlatform {
    fn cold_reboot(&mut self) -> Result<Infallible, PlatformError> {
        self.cold_reboots += 1;
        Err(PlatformError::ColdReboot)
    }

    fn power_off(&mut self) -> Result<Infallible, PlatformError> {
        self.power_offs += 1;
        Err(PlatformError::PowerOff)
    }

    fn reboot_ec_to_ro(&mut self) -> Result<(), PlatformError> {
        self.ec_reboots += 1;
        Ok(())
    }

    fn memory_wipe_unused(&mut self) -> Result<(), PlatformError> {
        if self.fail_memory_wipe {
            return Err(PlatformError::MemoryWipe);
        }
        self.memory_wipes += 1;
        Ok(())
    }

    fn keyboard_prepare(&mut self) {
        self.keyboard_prepares += 1;
    }

    fn timestamp(&mut self, stamp: Timestamp) {
        self.timestamps.push(stamp);
    }
}

/// Flags default to `false`.
pub struct MockFlags {
    values: [Option<bool>; Flag::COUNT],
    queries: [usize; Flag::COUNT],
}

impl Default for MockFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFlags {
    pub fn new() -> Self {
        Self {
            values: [Some(false); Flag::COUNT],
            queries: [0; Flag::COUNT],
        }
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        self.values[flag as usize] = Some(value);
    }

    /// Make queries of `flag` fail.
    pub fn fail(&mut self, flag: Flag) {
        self.values[flag as usize] = None;
    }

    pub fn queries(&self, flag: Flag) -> usize {
        self.queries[flag as usize]
    }
}

impl FlagSource for MockFlags {
    fn get(&mut self, flag: Flag) -> Result<bool, FlagError> {
        self.queries[flag as usize] += 1;
        self.values[flag as usize].ok_or(FlagError::Query(flag))
    }
}

#[derive(Default)]
pub struct MockModule {
    pub starts: usize,
}

impl FirmwareModule for MockModule {
    fn start(&mut self) -> Result<Infallible, ModuleError> {
        self.starts += 1;
        Err(ModuleError::Entry)
    }
}

/// Records what it would boot, then reports a failed kernel entry.
#[derive(Default)]
pub struct MockLauncher {
    pub fail_publish: bool,
    pub published: usize,
    pub boots: usize,
    pub command_line: Option<Vec<u8>>,
    pub kernel_base: Option<usize>,
    pub loader_address: Option<usize>,
    pub params_address: Option<usize>,
}

impl KernelLauncher for MockLauncher {
    fn publish_boot_data(&mut self, _info: &KernelLoadInfo) -> HandoffResult<()> {
        if self.fail_publish {
            return Err(HandoffError::BootData);
        }
        self.published += 1;
        Ok(())
    }

    fn boot(&mut self, image: BootImage<'_>) -> HandoffResult<Infallible> {
        self.boots += 1;
        self.command_line = Some(image.command_line.to_vec());
        self.kernel_base = Some(image.base);
        self.loader_address = Some(image.loader_address());
        self.params_address = Some(image.params_address());
        Err(HandoffError::Boot)
    }
}

/// Counts trust checks. Software sync is not supported.
#[derive(Default)]
pub struct MockEc {
    pub untrusted: bool,
    pub trust_checks: usize,
}

impl EcSync for MockEc {
    fn trusted(&mut self) -> bool {
        self.trust_checks += 1;
        !self.untrusted
    }

    fn running_rw(&mut self) -> Result<bool, EcError> {
        Ok(false)
    }

    fn jump_to_rw(&mut self) -> Result<(), EcError> {
        Err(EcError::SoftSyncUnsupported)
    }

    fn disable_jump(&mut self) -> Result<(), EcError> {
        Err(EcError::SoftSyncUnsupported)
    }

    fn update_rw(&mut self, _image: &[u8]) -> Result<(), EcError> {
        Err(EcError::SoftSyncUnsupported)
    }

    fn protect_rw(&mut self) -> Result<(), EcError> {
        Err(EcError::SoftSyncUnsupported)
    }
}

pub struct MockDisk {
    pub name: &'static str,
    pub removable: bool,
    pub external_gpt: bool,
    pub storage: FlashStorage<RamFlash>,
}

impl MockDisk {
    pub fn new(name: &'static str, removable: bool) -> Self {
        Self {
            name,
            removable,
            external_gpt: false,
            storage: FlashStorage::new(RamFlash::from_image(vec![0; 16], 16)),
        }
    }
}

impl BlockDevice for MockDisk {
    fn name(&self) -> &str {
        self.name
    }

    fn removable(&self) -> bool {
        self.removable
    }

    fn external_gpt(&self) -> bool {
        self.external_gpt
    }

    fn storage(&mut self) -> &mut dyn StorageOps {
        &mut self.storage
    }
}

/// A board with one fixed disk unless told otherwise.
pub struct MockCallbacks {
    pub ec: MockEc,
    pub keys: VecDeque<(u32, KeyFlags)>,
    pub disks: Vec<MockDisk>,
}

impl Default for MockCallbacks {
    fn default() -> Self {
        Self {
            ec: MockEc::default(),
            keys: VecDeque::new(),
            disks: vec![MockDisk::new("mmc0", false)],
        }
    }
}

impl VbootCallbacks for MockCallbacks {
    fn ec(&mut self) -> &mut dyn EcSync {
        &mut self.ec
    }

    fn read_key(&mut self) -> (u32, KeyFlags) {
        self.keys.pop_front().unwrap_or((0, KeyFlags::empty()))
    }

    fn disk_count(&self) -> usize {
        self.disks.len()
    }

    fn disk(&mut self, index: usize) -> Option<&mut dyn BlockDevice> {
        self.disks
            .get_mut(index)
            .map(|disk| disk as &mut dyn BlockDevice)
    }
}
