//! The payload heap.
//!
//! Directory scratch buffers, verification blocks and hosted kernel
//! buffers all come from here. The board's entry code hands over the free
//! RAM between the end of the loaded payload image and the bottom of its
//! stack, normally taken from linker symbols, before the first allocation.

use linked_list_allocator::LockedHeap;
use log::info;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Give `[heap_start, heap_start + heap_size)` to the allocator.
///
/// # Safety
/// The range must be RAM that nothing else uses for as long as the payload
/// runs: not the payload image, its stack, or a fixed kernel buffer. Call
/// this once, before anything allocates.
pub unsafe fn init(heap_start: usize, heap_size: usize) {
    // SAFETY: the caller gives up the range for good.
    unsafe { ALLOCATOR.lock().init(heap_start as *mut u8, heap_size) };
    info!("Heap at {heap_start:#x}, {heap_size:#x} bytes.");
}
