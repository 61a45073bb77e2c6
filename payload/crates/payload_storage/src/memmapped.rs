use log::error;

use crate::{FlashOps, StorageResult, checked_range};

/// Read-only flash that is mapped into the address space.
#[derive(Debug, Copy, Clone)]
pub struct MemMappedFlash<'a> {
    data: &'a [u8],
}

impl<'a> MemMappedFlash<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl MemMappedFlash<'static> {
    /// Create a flash device over a physical mapping.
    ///
    /// # Safety
    /// `base..base + size` must be mapped, readable and never written for
    /// the rest of the program.
    pub unsafe fn from_raw(base: *const u8, size: u32) -> Self {
        // SAFETY: the caller guarantees the mapping is valid and immutable.
        let data = unsafe { core::slice::from_raw_parts(base, size as usize) };
        Self { data }
    }
}

impl FlashOps for MemMappedFlash<'_> {
    fn read(&mut self, offset: u32, len: u32) -> StorageResult<&[u8]> {
        let range = checked_range(offset, len as usize, self.size()).inspect_err(|_| {
            error!("Out of bounds flash access.");
        })?;
        Ok(&self.data[range])
    }

    fn erase_size(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn test_read_inside_mapping() {
        let backing = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let mut flash = MemMappedFlash::new(&backing);
        assert_eq!(flash.read(2, 3).unwrap(), &[2, 3, 4]);
        assert_eq!(flash.size(), 8);
    }

    #[test]
    fn test_read_past_end() {
        let backing = [0u8; 8];
        let mut flash = MemMappedFlash::new(&backing);
        assert!(matches!(
            flash.read(6, 4),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_write_and_erase_unsupported() {
        let backing = [0u8; 8];
        let mut flash = MemMappedFlash::new(&backing);
        assert_eq!(flash.write(&[1], 0), Err(StorageError::Unsupported));
        assert_eq!(flash.erase(0, 8), Err(StorageError::Unsupported));
    }
}
