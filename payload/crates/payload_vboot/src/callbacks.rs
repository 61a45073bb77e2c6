use alloc::vec::Vec;

use payload_storage::StorageOps;

use crate::{EcSync, KeyFlags};

/// A disk the engine may load a kernel from.
pub trait BlockDevice {
    fn name(&self) -> &str;

    fn removable(&self) -> bool;

    /// The partition table lives outside the device itself, as on raw NAND.
    fn external_gpt(&self) -> bool {
        false
    }

    fn storage(&mut self) -> &mut dyn StorageOps;
}

/// Board services the engine calls back into while it selects and loads a
/// kernel.
pub trait VbootCallbacks {
    /// The embedded controller, for trust checks and software sync.
    fn ec(&mut self) -> &mut dyn EcSync;

    /// One translated key, see [`crate::read_key_with_flags`]. A board
    /// without a console reports no key.
    fn read_key(&mut self) -> (u32, KeyFlags);

    fn disk_count(&self) -> usize;

    fn disk(&mut self, index: usize) -> Option<&mut dyn BlockDevice>;

    /// Indices of the disks that are, or are not, removable.
    fn disk_indices(&mut self, removable: bool) -> Vec<usize> {
        (0..self.disk_count())
            .filter(|&index| {
                self.disk(index)
                    .is_some_and(|disk| disk.removable() == removable)
            })
            .collect()
    }
}
