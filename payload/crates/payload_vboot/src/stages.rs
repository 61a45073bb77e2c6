use alloc::vec::Vec;
use core::convert::Infallible;

use log::{error, info, warn};
use payload_storage::StorageOps;

use crate::{
    EngineError, FirmwareModule, FirmwareSelection, FlagSource, InitOutFlags, KernelBuffer,
    KernelLauncher, Platform, PlatformFlags, Timestamp, VbootCallbacks, VbootConfig, VbootEngine,
    VbootError, VbootResult, hand_off,
};

/// Position of the sequencer. Stages only run in this order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    Init,
    SelectFirmware,
    SelectAndLoadKernel,
    /// Control went to a kernel or module, or is about to.
    Done,
}

/// One RW firmware slot: its verification block and the firmware body
/// to start if the engine selects it.
pub struct RwSlot<'a> {
    pub vblock: &'a mut dyn StorageOps,
    pub module: &'a mut dyn FirmwareModule,
}

/// The verified boot stage sequencer.
pub struct Vboot<E, P, F> {
    engine: E,
    platform: P,
    flags: F,
    config: VbootConfig,
    stage: Stage,
}

impl<E, P, F> Vboot<E, P, F>
where
    E: VbootEngine,
    P: Platform,
    F: FlagSource,
{
    pub fn new(engine: E, platform: P, flags: F, config: VbootConfig) -> Self {
        Self {
            engine,
            platform,
            flags,
            config,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &VbootConfig {
        &self.config
    }

    fn enter(&self, attempted: Stage) -> VbootResult<()> {
        if self.stage != attempted {
            error!("Stage {attempted:?} requested at {:?}.", self.stage);
            return Err(VbootError::OutOfOrder {
                current: self.stage,
                attempted,
            });
        }
        Ok(())
    }

    /// Reset the system. Returning at all means the reset failed.
    fn cold_reboot(&mut self) -> VbootError {
        info!("Rebooting.");
        match self.platform.cold_reboot() {
            Ok(never) => match never {},
            Err(e) => {
                error!("Cold reboot failed: {e}");
                e.into()
            }
        }
    }

    fn power_off(&mut self) -> VbootError {
        info!("Powering off.");
        match self.platform.power_off() {
            Ok(never) => match never {},
            Err(e) => {
                error!("Power off failed: {e}");
                e.into()
            }
        }
    }

    /// Gather the platform flags and initialize the engine.
    ///
    /// The engine is not called unless every flag could be read.
    pub fn init(&mut self) -> VbootResult<InitOutFlags> {
        self.enter(Stage::Init)?;
        self.platform.timestamp(Timestamp::RoVbInit);

        let flags = PlatformFlags::gather(&mut self.flags, &self.config).inspect_err(|e| {
            error!("Reading platform flags failed: {e}");
        })?;
        let in_flags = flags.init_flags(&self.config);

        let out_flags = match self.engine.init(in_flags) {
            Ok(out_flags) => out_flags,
            Err(e) => {
                error!("VbInit returned {e}!");
                return Err(self.cold_reboot());
            }
        };

        if out_flags.contains(InitOutFlags::CLEAR_RAM) {
            self.platform.memory_wipe_unused().inspect_err(|e| {
                error!("Wiping unused memory failed: {e}");
            })?;
        }

        // Get the keyboard going before a screen needs it.
        if out_flags.intersects(InitOutFlags::ENABLE_DEVELOPER | InitOutFlags::ENABLE_RECOVERY) {
            self.platform.keyboard_prepare();
        }

        self.stage = Stage::SelectFirmware;
        Ok(out_flags)
    }

    /// Let the engine choose between the RW firmware slots and start the
    /// chosen one.
    ///
    /// Returns the selection only when no RW firmware is to be started.
    pub fn select_firmware<'a>(
        &mut self,
        a: RwSlot<'a>,
        b: RwSlot<'a>,
    ) -> VbootResult<FirmwareSelection> {
        self.enter(Stage::SelectFirmware)?;
        self.platform.timestamp(Timestamp::RoVbSelectFirmware);

        let size_a = a.vblock.size()?;
        let size_b = b.vblock.size()?;

        let result = {
            let vblock_a = read_vblock(a.vblock, size_a)?;
            let vblock_b = read_vblock(b.vblock, size_b)?;
            self.engine.select_firmware(&vblock_a, &vblock_b)
        };

        let selection = match result {
            Ok(selection) => selection,
            Err(e) => {
                error!("VbSelectFirmware returned {e}!");
                return Err(self.cold_reboot());
            }
        };

        self.stage = Stage::SelectAndLoadKernel;
        let module = match selection {
            FirmwareSelection::A => a.module,
            FirmwareSelection::B => b.module,
            FirmwareSelection::Recovery | FirmwareSelection::ReadOnly => {
                info!("Staying in read-only firmware ({selection:?}).");
                return Ok(selection);
            }
        };

        info!("Starting RW firmware {selection:?}.");
        self.stage = Stage::Done;
        match module.start() {
            Ok(never) => match never {},
            Err(e) => {
                error!("Starting RW firmware failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Have the engine load a kernel and boot it.
    ///
    /// The engine reaches the board's EC, console and disks through
    /// `callbacks`.
    pub fn select_and_load_kernel<L: KernelLauncher + ?Sized>(
        &mut self,
        callbacks: &mut dyn VbootCallbacks,
        launcher: &mut L,
    ) -> VbootResult<Infallible> {
        self.enter(Stage::SelectAndLoadKernel)?;
        self.platform.timestamp(Timestamp::RoVbSelectAndLoadKernel);

        let mut kernel = KernelBuffer::allocate(&self.config)?;
        let result = self
            .engine
            .select_and_load_kernel(kernel.as_mut_slice(), callbacks);
        let info = match result {
            Ok(info) => info,
            Err(EngineError::EcRebootToRoRequired) => {
                info!("Rebooting the EC to RO.");
                if let Err(e) = self.platform.reboot_ec_to_ro() {
                    warn!("EC reboot to RO failed: {e}");
                }
                return Err(self.power_off());
            }
            Err(EngineError::ShutdownRequested) => {
                return Err(self.power_off());
            }
            Err(e) => {
                error!("VbSelectAndLoadKernel returned {e}!");
                return Err(self.cold_reboot());
            }
        };

        let Some(disk) = callbacks.disk(info.disk_index) else {
            error!("Kernel came from unknown disk {}.", info.disk_index);
            return Err(VbootError::UnknownDisk(info.disk_index));
        };
        info!("Loaded kernel from {}.", disk.name());
        let external_gpt = disk.external_gpt();

        self.stage = Stage::Done;
        let legacy = self.config.legacy_load_address();
        Ok(hand_off(&mut kernel, &info, legacy, external_gpt, launcher)?)
    }
}

/// Read a whole verification block into a buffer of exactly its size.
fn read_vblock(storage: &mut dyn StorageOps, size: u32) -> VbootResult<Vec<u8>> {
    let len = size as usize;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| VbootError::OutOfMemory(len))?;
    buf.resize(len, 0);
    storage.read(&mut buf, 0)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use payload_storage::{FlashStorage, RamFlash, StorageError};

    use super::*;
    use crate::testing::{
        MockCallbacks, MockDisk, MockEngine, MockFlags, MockLauncher, MockModule, MockPlatform,
        SeenCallbacks,
    };
    use crate::{
        CROS_PARAM_SIZE, Flag, FlagError, HandoffError, InitFlags, KernelLoadInfo, KeyFlags,
        LEGACY_KERNEL_LOAD_ADDRESS, ModuleError, PlatformError,
    };

    type TestVboot = Vboot<MockEngine, MockPlatform, MockFlags>;

    const KERNEL_SIZE: usize = 0x10000;

    fn config() -> VbootConfig {
        VbootConfig {
            oprom_matters: false,
            virtual_dev_switch: false,
            ec_software_sync: false,
            physical_rec_switch: true,
            ..VbootConfig::from_features()
        }
        .with_hosted_kernel(KERNEL_SIZE)
    }

    fn sequencer(engine: MockEngine) -> TestVboot {
        let mut flags = MockFlags::new();
        flags.set(Flag::LidOpen, true);
        Vboot::new(engine, MockPlatform::default(), flags, config())
    }

    fn vblock(fill: u8, len: usize) -> FlashStorage<RamFlash> {
        FlashStorage::new(RamFlash::from_image(vec![fill; len], 0x100))
    }

    fn kernel_info() -> KernelLoadInfo {
        KernelLoadInfo {
            bootloader_address: LEGACY_KERNEL_LOAD_ADDRESS + 0x8000,
            bootloader_size: 0x100,
            partition_number: 0,
            partition_guid: [0; 16],
            disk_index: 0,
        }
    }

    /// Run the stages up to kernel selection, staying in RO firmware.
    fn through_select_firmware(engine: MockEngine) -> TestVboot {
        let mut vboot = sequencer(MockEngine {
            selection: Ok(FirmwareSelection::ReadOnly),
            ..engine
        });
        vboot.init().unwrap();
        let (mut va, mut vb) = (vblock(0xA, 4), vblock(0xB, 4));
        let (mut ma, mut mb) = (MockModule::default(), MockModule::default());
        vboot
            .select_firmware(
                RwSlot {
                    vblock: &mut va,
                    module: &mut ma,
                },
                RwSlot {
                    vblock: &mut vb,
                    module: &mut mb,
                },
            )
            .unwrap();
        vboot
    }

    #[test]
    fn test_init_passes_flags() {
        let mut vboot = sequencer(MockEngine::default());
        assert_eq!(vboot.init(), Ok(InitOutFlags::empty()));
        assert_eq!(vboot.engine().init_flags, Some(InitFlags::RO_NORMAL_SUPPORT));
        assert_eq!(vboot.stage(), Stage::SelectFirmware);
        assert_eq!(vboot.platform().timestamps, vec![Timestamp::RoVbInit]);
    }

    #[test]
    fn test_init_failure_cold_reboots_once() {
        let mut vboot = sequencer(MockEngine {
            init: Err(EngineError::Failure(1)),
            ..MockEngine::default()
        });
        assert_eq!(
            vboot.init(),
            Err(VbootError::Platform(PlatformError::ColdReboot))
        );
        assert_eq!(vboot.platform().cold_reboots, 1);

        let (mut va, mut vb) = (vblock(0, 4), vblock(0, 4));
        let (mut ma, mut mb) = (MockModule::default(), MockModule::default());
        let result = vboot.select_firmware(
            RwSlot {
                vblock: &mut va,
                module: &mut ma,
            },
            RwSlot {
                vblock: &mut vb,
                module: &mut mb,
            },
        );
        assert!(matches!(result, Err(VbootError::OutOfOrder { .. })));
        assert_eq!(vboot.engine().select_firmware_calls, 0);
        assert_eq!(vboot.platform().cold_reboots, 1);
    }

    #[test]
    fn test_flag_failure_skips_engine() {
        for flag in [
            Flag::DeveloperMode,
            Flag::Recovery,
            Flag::WriteProtect,
            Flag::LidOpen,
        ] {
            let mut vboot = sequencer(MockEngine::default());
            vboot.flags.fail(flag);
            assert_eq!(
                vboot.init(),
                Err(VbootError::Flags(FlagError::Query(flag)))
            );
            assert_eq!(vboot.engine().init_calls, 0);
            assert_eq!(vboot.platform().cold_reboots, 0);
            assert_eq!(vboot.stage(), Stage::Init);
        }
    }

    #[test]
    fn test_oprom_flag_failure_skips_engine() {
        let mut flags = MockFlags::new();
        flags.fail(Flag::OptionRomsLoaded);
        let config = VbootConfig {
            oprom_matters: true,
            ..config()
        };
        let mut vboot = Vboot::new(MockEngine::default(), MockPlatform::default(), flags, config);
        assert_eq!(
            vboot.init(),
            Err(VbootError::Flags(FlagError::Query(Flag::OptionRomsLoaded)))
        );
        assert_eq!(vboot.engine().init_calls, 0);
        assert_eq!(vboot.stage(), Stage::Init);
    }

    #[test]
    fn test_init_out_flags() {
        let mut vboot = sequencer(MockEngine {
            init: Ok(InitOutFlags::CLEAR_RAM | InitOutFlags::ENABLE_DEVELOPER),
            ..MockEngine::default()
        });
        vboot.init().unwrap();
        assert_eq!(vboot.platform().memory_wipes, 1);
        assert_eq!(vboot.platform().keyboard_prepares, 1);

        let mut vboot = sequencer(MockEngine {
            init: Ok(InitOutFlags::ENABLE_RECOVERY),
            ..MockEngine::default()
        });
        vboot.init().unwrap();
        assert_eq!(vboot.platform().memory_wipes, 0);
        assert_eq!(vboot.platform().keyboard_prepares, 1);
    }

    #[test]
    fn test_memory_wipe_failure_fails_init() {
        let mut vboot = sequencer(MockEngine {
            init: Ok(InitOutFlags::CLEAR_RAM),
            ..MockEngine::default()
        });
        vboot.platform.fail_memory_wipe = true;
        assert_eq!(
            vboot.init(),
            Err(VbootError::Platform(PlatformError::MemoryWipe))
        );
        assert_eq!(vboot.stage(), Stage::Init);
    }

    #[test]
    fn test_select_firmware_starts_selected_slot() {
        let mut vboot = sequencer(MockEngine {
            selection: Ok(FirmwareSelection::B),
            ..MockEngine::default()
        });
        vboot.init().unwrap();

        let (mut va, mut vb) = (vblock(0xAA, 16), vblock(0xBB, 8));
        let (mut ma, mut mb) = (MockModule::default(), MockModule::default());
        let result = vboot.select_firmware(
            RwSlot {
                vblock: &mut va,
                module: &mut ma,
            },
            RwSlot {
                vblock: &mut vb,
                module: &mut mb,
            },
        );

        assert_eq!(result, Err(VbootError::Module(ModuleError::Entry)));
        assert_eq!(ma.starts, 0);
        assert_eq!(mb.starts, 1);
        assert_eq!(vboot.engine().vblock_a, vec![0xAA; 16]);
        assert_eq!(vboot.engine().vblock_b, vec![0xBB; 8]);
        assert_eq!(vboot.stage(), Stage::Done);
    }

    #[test]
    fn test_select_firmware_read_only() {
        let vboot = through_select_firmware(MockEngine::default());
        assert_eq!(vboot.stage(), Stage::SelectAndLoadKernel);
        assert_eq!(vboot.engine().select_firmware_calls, 1);
    }

    #[test]
    fn test_select_firmware_failure_cold_reboots() {
        let mut vboot = sequencer(MockEngine {
            selection: Err(EngineError::Failure(7)),
            ..MockEngine::default()
        });
        vboot.init().unwrap();
        let (mut va, mut vb) = (vblock(0, 4), vblock(0, 4));
        let (mut ma, mut mb) = (MockModule::default(), MockModule::default());
        let result = vboot.select_firmware(
            RwSlot {
                vblock: &mut va,
                module: &mut ma,
            },
            RwSlot {
                vblock: &mut vb,
                module: &mut mb,
            },
        );
        assert_eq!(
            result,
            Err(VbootError::Platform(PlatformError::ColdReboot))
        );
        assert_eq!(vboot.platform().cold_reboots, 1);
        assert_eq!(ma.starts + mb.starts, 0);
    }

    #[test]
    fn test_select_firmware_size_failure_reads_nothing() {
        struct NoSize;
        impl StorageOps for NoSize {
            fn read(&mut self, _dst: &mut [u8], _offset: u32) -> Result<(), StorageError> {
                panic!("read before both sizes are known");
            }
        }

        let mut vboot = sequencer(MockEngine::default());
        vboot.init().unwrap();
        let mut va = vblock(0, 4);
        let mut vb = NoSize;
        let (mut ma, mut mb) = (MockModule::default(), MockModule::default());
        let result = vboot.select_firmware(
            RwSlot {
                vblock: &mut va,
                module: &mut ma,
            },
            RwSlot {
                vblock: &mut vb,
                module: &mut mb,
            },
        );
        assert_eq!(result, Err(VbootError::Storage(StorageError::Unsupported)));
        assert_eq!(vboot.engine().select_firmware_calls, 0);
    }

    #[test]
    fn test_kernel_shutdown_powers_off() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Err(EngineError::ShutdownRequested),
            ..MockEngine::default()
        });
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::Platform(PlatformError::PowerOff))
        );
        assert_eq!(vboot.platform().power_offs, 1);
        assert_eq!(vboot.platform().cold_reboots, 0);
        assert_eq!(launcher.boots, 0);
    }

    #[test]
    fn test_kernel_ec_reboot_then_power_off() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Err(EngineError::EcRebootToRoRequired),
            ..MockEngine::default()
        });
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::Platform(PlatformError::PowerOff))
        );
        assert_eq!(vboot.platform().ec_reboots, 1);
        assert_eq!(vboot.platform().power_offs, 1);
        assert_eq!(vboot.platform().cold_reboots, 0);
    }

    #[test]
    fn test_kernel_failure_cold_reboots() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Err(EngineError::Failure(0x10000)),
            ..MockEngine::default()
        });
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::Platform(PlatformError::ColdReboot))
        );
        assert_eq!(vboot.platform().cold_reboots, 1);
        assert_eq!(vboot.platform().power_offs, 0);
    }

    #[test]
    fn test_kernel_success_boots() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Ok(kernel_info()),
            ..MockEngine::default()
        });
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::Handoff(HandoffError::Boot))
        );
        assert_eq!(vboot.engine().kernel_buffer_len, KERNEL_SIZE);
        assert_eq!(launcher.published, 1);
        assert_eq!(launcher.boots, 1);
        let offset = launcher.loader_address.unwrap() - launcher.kernel_base.unwrap();
        assert_eq!(offset, 0x8000);
        assert_eq!(
            launcher.params_address.unwrap() - launcher.kernel_base.unwrap(),
            0x8000 - CROS_PARAM_SIZE
        );
        assert_eq!(vboot.stage(), Stage::Done);
    }

    #[test]
    fn test_kernel_stage_requires_firmware_stage() {
        let mut vboot = sequencer(MockEngine::default());
        vboot.init().unwrap();
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::OutOfOrder {
                current: Stage::SelectFirmware,
                attempted: Stage::SelectAndLoadKernel
            })
        );
        assert_eq!(vboot.engine().kernel_calls, 0);
    }

    #[test]
    fn test_kernel_stage_reaches_board_callbacks() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Err(EngineError::ShutdownRequested),
            ..MockEngine::default()
        });
        let mut callbacks = MockCallbacks::default();
        callbacks.ec.untrusted = true;
        callbacks.keys.push_back((0x0D, KeyFlags::TRUSTED_KEYBOARD));
        callbacks.disks.push(MockDisk::new("usb0", true));
        callbacks.disks.push(MockDisk::new("sata0", false));

        let mut launcher = MockLauncher::default();
        vboot
            .select_and_load_kernel(&mut callbacks, &mut launcher)
            .unwrap_err();

        assert_eq!(
            vboot.engine().seen,
            Some(SeenCallbacks {
                ec_trusted: false,
                key: (0x0D, KeyFlags::TRUSTED_KEYBOARD),
                fixed_disks: vec![0, 2],
                removable_disks: vec![1],
            })
        );
        assert_eq!(callbacks.ec.trust_checks, 1);
        assert!(callbacks.keys.is_empty());
    }

    #[test]
    fn test_kernel_external_gpt_reaches_command_line() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Ok(KernelLoadInfo {
                disk_index: 1,
                ..kernel_info()
            }),
            ..MockEngine::default()
        });
        let mut callbacks = MockCallbacks::default();
        callbacks.disks.push(MockDisk {
            external_gpt: true,
            ..MockDisk::new("nand0", false)
        });

        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut callbacks, &mut launcher),
            Err(VbootError::Handoff(HandoffError::Boot))
        );
        // The zeroed kernel buffer holds an empty template.
        assert_eq!(launcher.command_line.as_deref(), Some(&b" gpt\0"[..]));
    }

    #[test]
    fn test_kernel_from_unknown_disk_is_not_booted() {
        let mut vboot = through_select_firmware(MockEngine {
            kernel: Ok(KernelLoadInfo {
                disk_index: 3,
                ..kernel_info()
            }),
            ..MockEngine::default()
        });
        let mut launcher = MockLauncher::default();
        assert_eq!(
            vboot.select_and_load_kernel(&mut MockCallbacks::default(), &mut launcher),
            Err(VbootError::UnknownDisk(3))
        );
        assert_eq!(launcher.boots, 0);
        assert_eq!(vboot.platform().cold_reboots, 0);
    }
}
