use log::error;

use crate::{StorageError, StorageOps, StorageResult, checked_range};

/// A byte range of another storage device, addressed from zero.
///
/// Used to hand a single region (a verification block, a firmware body)
/// to code that should not see the rest of the device.
#[derive(Debug, Clone)]
pub struct StorageWindow<S> {
    device: S,
    offset: u32,
    size: u32,
}

impl<S: StorageOps> StorageWindow<S> {
    pub fn new(device: S, offset: u32, size: u32) -> Self {
        Self {
            device,
            offset,
            size,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn device_mut(&mut self) -> &mut S {
        &mut self.device
    }

    fn translate(&self, offset: u32, len: usize) -> StorageResult<u32> {
        checked_range(offset, len, self.size).inspect_err(|_| {
            error!(
                "Access of {len:#x} bytes at {offset:#x} outside window of {:#x} bytes.",
                self.size
            );
        })?;
        self.offset
            .checked_add(offset)
            .ok_or(StorageError::OutOfBounds {
                offset,
                len,
                size: self.size,
            })
    }
}

impl<S: StorageOps> StorageOps for StorageWindow<S> {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        let absolute = self.translate(offset, dst.len())?;
        self.device.read(dst, absolute)
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        let absolute = self.translate(offset, src.len())?;
        self.device.write(src, absolute)
    }

    fn size(&mut self) -> StorageResult<u32> {
        Ok(self.size)
    }
}
