//! Backing memory for the arena
//!
//! A pool asks its provider for one region when it is created and hands the
//! same region back exactly once when it is torn down.

use core::alloc::Layout;
use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::error;

use crate::{AllocError, AllocResult, PAGE_SIZE};

/// Source of the single region a pool manages
pub trait RegionProvider {
    /// Obtain a zero-filled, page-aligned region of `size` bytes
    ///
    /// Either the whole region is returned or nothing is.
    fn acquire(&mut self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Give a region back
    ///
    /// # Safety
    ///
    /// `base` and `size` must come from one earlier `acquire` on this provider,
    /// and the region must not be used afterwards.
    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) -> AllocResult;
}

/// Anonymous private memory mappings
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapProvider;

#[cfg(unix)]
impl RegionProvider for MmapProvider {
    fn acquire(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            error!("mmap of {:#x} bytes failed", size);
            return Err(AllocError::RegionUnavailable);
        }
        NonNull::new(ptr as *mut u8).ok_or(AllocError::RegionUnavailable)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) -> AllocResult {
        if unsafe { libc::munmap(base.as_ptr().cast(), size) } == -1 {
            error!("munmap of {:#x} bytes at {:p} failed", size, base);
            return Err(AllocError::RegionRelease);
        }
        Ok(())
    }
}

/// Regions carved from the global allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapProvider;

impl HeapProvider {
    fn layout(size: usize) -> AllocResult<Layout> {
        Layout::from_size_align(size, PAGE_SIZE).map_err(|_| AllocError::InvalidParam)
    }
}

impl RegionProvider for HeapProvider {
    fn acquire(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let layout = Self::layout(size)?;
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| {
            error!("heap allocation of {:#x} bytes failed", size);
            AllocError::RegionUnavailable
        })
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) -> AllocResult {
        let layout = Self::layout(size).map_err(|_| AllocError::RegionRelease)?;
        unsafe { alloc::alloc::dealloc(base.as_ptr(), layout) };
        Ok(())
    }
}

/// Provider used by [`crate::BuddyPool::new`]
#[cfg(unix)]
pub type DefaultProvider = MmapProvider;

/// Provider used by [`crate::BuddyPool::new`]
#[cfg(not(unix))]
pub type DefaultProvider = HeapProvider;
