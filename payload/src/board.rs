//! The board context: every device the payload talks to, wired up once.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use log::error;
use payload_storage::StorageOps;
use payload_vboot::{
    BlockDevice, Clock, Console, EcSync, FlagSource, KeyFlags, NoEc, VbootCallbacks,
    read_key_with_flags,
};
use thiserror::Error;

/// Firmware flash, shared by every window onto it.
pub type SharedFlash = Rc<RefCell<dyn StorageOps>>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Slot {
    Flash,
    Flags,
    Ec,
    Input,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum BoardError {
    #[error("{0:?} was already set up")]
    AlreadySet(Slot),
    #[error("{0:?} was never set up")]
    Missing(Slot),
}

/// The console keys are read from, and the clock that times escape
/// sequences.
pub struct Input {
    pub console: Box<dyn Console>,
    pub clock: Box<dyn Clock>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, which: Slot) -> Result<(), BoardError> {
    if slot.is_some() {
        error!("{which:?} set up twice.");
        return Err(BoardError::AlreadySet(which));
    }
    *slot = Some(value);
    Ok(())
}

/// Collects the board's devices during setup.
#[derive(Default)]
pub struct BoardBuilder {
    flash: Option<SharedFlash>,
    flags: Option<Box<dyn FlagSource>>,
    ec: Option<Box<dyn EcSync>>,
    input: Option<Input>,
    block_devices: Vec<Box<dyn BlockDevice>>,
}

impl BoardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flash<S: StorageOps + 'static>(&mut self, flash: S) -> Result<&mut Self, BoardError> {
        let flash: SharedFlash = Rc::new(RefCell::new(flash));
        set_once(&mut self.flash, flash, Slot::Flash)?;
        Ok(self)
    }

    pub fn flags<F: FlagSource + 'static>(&mut self, flags: F) -> Result<&mut Self, BoardError> {
        set_once(&mut self.flags, Box::new(flags), Slot::Flags)?;
        Ok(self)
    }

    pub fn ec<E: EcSync + 'static>(&mut self, ec: E) -> Result<&mut Self, BoardError> {
        set_once(&mut self.ec, Box::new(ec), Slot::Ec)?;
        Ok(self)
    }

    pub fn input<C, T>(&mut self, console: C, clock: T) -> Result<&mut Self, BoardError>
    where
        C: Console + 'static,
        T: Clock + 'static,
    {
        let input = Input {
            console: Box::new(console),
            clock: Box::new(clock),
        };
        set_once(&mut self.input, input, Slot::Input)?;
        Ok(self)
    }

    /// Devices are kept in the order they were added.
    pub fn block_device<D: BlockDevice + 'static>(&mut self, device: D) -> &mut Self {
        self.block_devices.push(Box::new(device));
        self
    }

    /// Finish setup. Flash and flags are required; a board without an EC
    /// gets [`NoEc`], one without input never reports a key.
    pub fn build(self) -> Result<Board, BoardError> {
        Ok(Board {
            flash: self.flash.ok_or(BoardError::Missing(Slot::Flash))?,
            flags: self.flags.ok_or(BoardError::Missing(Slot::Flags))?,
            ec: self.ec.unwrap_or_else(|| Box::new(NoEc)),
            input: self.input,
            block_devices: self.block_devices,
        })
    }
}

pub struct Board {
    flash: SharedFlash,
    flags: Box<dyn FlagSource>,
    ec: Box<dyn EcSync>,
    input: Option<Input>,
    block_devices: Vec<Box<dyn BlockDevice>>,
}

impl Board {
    pub fn flash(&self) -> SharedFlash {
        self.flash.clone()
    }

    /// Hand the flag source to the stage sequencer.
    pub fn into_flags(self) -> (Box<dyn FlagSource>, BoardRest) {
        (
            self.flags,
            BoardRest {
                flash: self.flash,
                ec: self.ec,
                input: self.input,
                block_devices: self.block_devices,
            },
        )
    }
}

/// What is left of a [`Board`] once the sequencer owns the flags. The
/// engine reaches it through [`VbootCallbacks`].
pub struct BoardRest {
    pub flash: SharedFlash,
    pub ec: Box<dyn EcSync>,
    pub input: Option<Input>,
    pub block_devices: Vec<Box<dyn BlockDevice>>,
}

impl VbootCallbacks for BoardRest {
    fn ec(&mut self) -> &mut dyn EcSync {
        self.ec.as_mut()
    }

    fn read_key(&mut self) -> (u32, KeyFlags) {
        match &mut self.input {
            Some(input) => read_key_with_flags(input.console.as_mut(), input.clock.as_mut()),
            None => (0, KeyFlags::empty()),
        }
    }

    fn disk_count(&self) -> usize {
        self.block_devices.len()
    }

    fn disk(&mut self, index: usize) -> Option<&mut dyn BlockDevice> {
        self.block_devices
            .get_mut(index)
            .map(|d| d.as_mut() as &mut dyn BlockDevice)
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::VecDeque;
    use alloc::vec;

    use payload_storage::{FlashStorage, RamFlash};
    use payload_vboot::testing::{MockDisk, MockEc, MockFlags};
    use payload_vboot::{InputType, KEY_UP};

    use super::*;

    struct ScriptedConsole {
        pending: VecDeque<u32>,
        input_type: InputType,
    }

    impl Console for ScriptedConsole {
        fn has_key(&mut self) -> bool {
            !self.pending.is_empty()
        }

        fn get_char(&mut self) -> u32 {
            self.pending.pop_front().unwrap_or(0)
        }

        fn last_input_type(&self) -> InputType {
            self.input_type
        }
    }

    fn console(keys: &[u32], input_type: InputType) -> ScriptedConsole {
        ScriptedConsole {
            pending: keys.iter().copied().collect(),
            input_type,
        }
    }

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn now_us(&mut self) -> u64 {
            0
        }
    }

    fn flash() -> FlashStorage<RamFlash> {
        FlashStorage::new(RamFlash::new(64, 16))
    }

    fn builder() -> BoardBuilder {
        let mut builder = BoardBuilder::new();
        builder.flash(flash()).unwrap().flags(MockFlags::new()).unwrap();
        builder
    }

    #[test]
    fn test_build_requires_flash_and_flags() {
        assert!(matches!(
            BoardBuilder::new().build(),
            Err(BoardError::Missing(Slot::Flash))
        ));

        let mut builder = BoardBuilder::new();
        builder.flash(flash()).unwrap();
        assert!(matches!(
            builder.build(),
            Err(BoardError::Missing(Slot::Flags))
        ));
    }

    #[test]
    fn test_slots_are_set_once() {
        let mut builder = BoardBuilder::new();
        builder.flash(flash()).unwrap();
        assert!(matches!(
            builder.flash(flash()),
            Err(BoardError::AlreadySet(Slot::Flash))
        ));
        builder.flags(MockFlags::new()).unwrap();
        assert!(matches!(
            builder.flags(MockFlags::new()),
            Err(BoardError::AlreadySet(Slot::Flags))
        ));
        builder.ec(NoEc).unwrap();
        assert!(matches!(
            builder.ec(NoEc),
            Err(BoardError::AlreadySet(Slot::Ec))
        ));
        let serial = || console(&[], InputType::Serial);
        builder.input(serial(), FrozenClock).unwrap();
        assert!(matches!(
            builder.input(serial(), FrozenClock),
            Err(BoardError::AlreadySet(Slot::Input))
        ));
    }

    #[test]
    fn test_rest_serves_disks_in_order() {
        let mut builder = builder();
        builder
            .block_device(MockDisk::new("mmc0", false))
            .block_device(MockDisk::new("usb0", true))
            .block_device(MockDisk::new("sata0", false));
        let board = builder.build().unwrap();
        assert_eq!(board.flash().borrow_mut().size(), Ok(64));

        let (mut flags, mut rest) = board.into_flags();
        assert_eq!(flags.get(payload_vboot::Flag::Recovery), Ok(false));

        assert_eq!(rest.disk_count(), 3);
        assert_eq!(rest.disk(1).map(|d| d.name() == "usb0"), Some(true));
        assert!(rest.disk(3).is_none());
        assert_eq!(rest.disk_indices(false), vec![0, 2]);
        assert_eq!(rest.disk_indices(true), vec![1]);
    }

    #[test]
    fn test_rest_without_ec_or_input() {
        let (_, mut rest) = builder().build().unwrap().into_flags();
        assert!(rest.ec().trusted());
        assert_eq!(rest.read_key(), (0, KeyFlags::empty()));
        assert_eq!(rest.disk_count(), 0);
    }

    #[test]
    fn test_rest_reads_keys_and_asks_the_ec() {
        let mut builder = builder();
        builder
            .ec(MockEc {
                untrusted: true,
                ..MockEc::default()
            })
            .unwrap()
            .input(
                console(&[0x1B, '[' as u32, 'A' as u32], InputType::Usb),
                FrozenClock,
            )
            .unwrap();
        let (_, mut rest) = builder.build().unwrap().into_flags();

        assert!(!rest.ec().trusted());
        assert_eq!(rest.read_key(), (KEY_UP, KeyFlags::empty()));
        assert_eq!(rest.read_key(), (0, KeyFlags::empty()));
    }
}
