#![no_std]
extern crate alloc;

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::ops::Range;

pub use error::*;
pub use flash::*;
pub use memmapped::*;
pub use ram::*;
pub use window::*;

mod error;
mod flash;
mod memmapped;
mod ram;
mod window;

/// Byte-addressable access to a backing medium such as memory-mapped
/// flash, SPI flash or an SD card.
///
/// Offsets and lengths are raw bytes of the medium. Callers do not
/// guarantee any alignment; drivers that need it must handle it.
pub trait StorageOps {
    /// Fill `dst` with the bytes starting at `offset`.
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()>;

    /// Write `src` starting at `offset`.
    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        let _ = (src, offset);
        Err(StorageError::Unsupported)
    }

    /// Total size of the medium in bytes.
    fn size(&mut self) -> StorageResult<u32> {
        Err(StorageError::Unsupported)
    }
}

impl<S: StorageOps + ?Sized> StorageOps for &mut S {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        (**self).read(dst, offset)
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        (**self).write(src, offset)
    }

    fn size(&mut self) -> StorageResult<u32> {
        (**self).size()
    }
}

impl<S: StorageOps + ?Sized> StorageOps for Box<S> {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        (**self).read(dst, offset)
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        (**self).write(src, offset)
    }

    fn size(&mut self) -> StorageResult<u32> {
        (**self).size()
    }
}

/// A storage device shared between several windows. There is a single
/// thread of control, so a borrow conflict means a window was used from
/// inside another window's read.
impl<S: StorageOps + ?Sized> StorageOps for Rc<RefCell<S>> {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        self.try_borrow_mut()
            .map_err(|_| StorageError::Busy)?
            .read(dst, offset)
    }

    fn write(&mut self, src: &[u8], offset: u32) -> StorageResult<()> {
        self.try_borrow_mut()
            .map_err(|_| StorageError::Busy)?
            .write(src, offset)
    }

    fn size(&mut self) -> StorageResult<u32> {
        self.try_borrow_mut().map_err(|_| StorageError::Busy)?.size()
    }
}

/// Validate that `len` bytes at `offset` fit into a medium of `size`
/// bytes and return the corresponding index range.
pub fn checked_range(offset: u32, len: usize, size: u32) -> StorageResult<Range<usize>> {
    let start = offset as usize;
    match start.checked_add(len) {
        Some(end) if end <= size as usize => Ok(start..end),
        _ => Err(StorageError::OutOfBounds { offset, len, size }),
    }
}
