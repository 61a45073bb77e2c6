use alloc::vec;
use alloc::vec::Vec;

use log::error;

use crate::{FlashOps, StorageError, StorageResult, check_erase_alignment, checked_range};

const ERASED: u8 = 0xFF;

/// NOR flash simulated in RAM.
///
/// Erasing sets bytes to `0xFF`; writes can only clear bits.
#[derive(Debug, Clone)]
pub struct RamFlash {
    data: Vec<u8>,
    erase_size: u32,
}

impl RamFlash {
    /// A fully erased device of `size` bytes.
    pub fn new(size: u32, erase_size: u32) -> Self {
        Self {
            data: vec![ERASED; size as usize],
            erase_size,
        }
    }

    /// A device preloaded with an existing image.
    pub fn from_image(data: Vec<u8>, erase_size: u32) -> Self {
        Self { data, erase_size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl FlashOps for RamFlash {
    fn read(&mut self, offset: u32, len: u32) -> StorageResult<&[u8]> {
        let range = checked_range(offset, len as usize, self.size()).inspect_err(|_| {
            error!("Out of bounds flash access.");
        })?;
        Ok(&self.data[range])
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        let range = checked_range(offset, src.len(), self.size())?;
        let dst = &mut self.data[range];
        if let Some(pos) = dst.iter().zip(src).position(|(old, new)| old & new != *new) {
            return Err(StorageError::NotErased {
                offset: offset + pos as u32,
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    fn erase_size(&self) -> u32 {
        self.erase_size
    }

    fn erase(&mut self, offset: u32, len: u32) -> StorageResult<()> {
        check_erase_alignment(offset, len, self.erase_size)?;
        let range = checked_range(offset, len as usize, self.size())?;
        self.data[range].fill(ERASED);
        Ok(())
    }

    fn size(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }
}
