use log::error;

use crate::{StorageError, StorageOps, StorageResult};

/// Raw flash access.
///
/// Unlike [`StorageOps`], reads hand out a view into the device's own
/// buffer (a mapping or a cache), and erases work on whole erase blocks.
pub trait FlashOps {
    fn read(&mut self, offset: u32, len: u32) -> StorageResult<&[u8]>;

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        let _ = (src, offset);
        Err(StorageError::Unsupported)
    }

    /// Size of one erase block. Zero if the device cannot erase.
    fn erase_size(&self) -> u32;

    /// Erase `len` bytes at `offset`. Both must be multiples of
    /// [`erase_size`](FlashOps::erase_size).
    fn erase(&mut self, offset: u32, len: u32) -> StorageResult<()> {
        let _ = (offset, len);
        Err(StorageError::Unsupported)
    }

    fn size(&self) -> u32;
}

/// Check that an erase request covers whole erase blocks.
pub fn check_erase_alignment(offset: u32, len: u32, erase_size: u32) -> StorageResult<()> {
    if erase_size == 0 {
        return Err(StorageError::Unsupported);
    }
    if offset % erase_size != 0 || len % erase_size != 0 {
        error!("Erase of {len:#x} bytes at {offset:#x} is not erase block aligned.");
        return Err(StorageError::Misaligned {
            offset,
            len,
            erase_size,
        });
    }
    Ok(())
}

/// Exposes a [`FlashOps`] device as plain storage.
#[derive(Debug)]
pub struct FlashStorage<F> {
    flash: F,
}

impl<F: FlashOps> FlashStorage<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: FlashOps> StorageOps for FlashStorage<F> {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        let len = u32::try_from(dst.len()).map_err(|_| StorageError::OutOfBounds {
            offset,
            len: dst.len(),
            size: self.flash.size(),
        })?;
        let data = self.flash.read(offset, len)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        self.flash.write(src, offset)
    }

    fn size(&mut self) -> StorageResult<u32> {
        Ok(self.flash.size())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::RamFlash;

    #[test]
    fn test_erase_alignment() {
        assert_eq!(check_erase_alignment(0x1000, 0x2000, 0x1000), Ok(()));
        assert_eq!(
            check_erase_alignment(0x800, 0x1000, 0x1000),
            Err(StorageError::Misaligned {
                offset: 0x800,
                len: 0x1000,
                erase_size: 0x1000
            })
        );
        assert_eq!(
            check_erase_alignment(0, 0x10, 0),
            Err(StorageError::Unsupported)
        );
    }

    #[test]
    fn test_flash_storage_read_write() {
        let mut storage = FlashStorage::new(RamFlash::new(32, 16));
        storage.write(&[0xAA, 0x55], 3).unwrap();

        let mut buf = [0u8; 4];
        storage.read(&mut buf, 2).unwrap();
        assert_eq!(buf, [0xFF, 0xAA, 0x55, 0xFF]);
        assert_eq!(storage.size(), Ok(32));
    }

    #[test]
    fn test_flash_storage_out_of_bounds() {
        let mut storage = FlashStorage::new(RamFlash::from_image(vec![0; 8], 8));
        let mut buf = [0u8; 4];
        assert!(matches!(
            storage.read(&mut buf, 6),
            Err(StorageError::OutOfBounds { offset: 6, .. })
        ));
    }
}
