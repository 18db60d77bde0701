//! Offset-indexed view of the managed region
//!
//! Every block header lives at the first byte of its block. The arena is the
//! one place where an offset becomes a pointer; everything above it deals in
//! offsets from the region base.

use core::ptr::NonNull;

use super::buddy_block::{BlockHeader, HEADER_SIZE, PAYLOAD_ALIGN, SMALLEST_K};
use crate::is_aligned;

/// The region of `2^kval_m` bytes a pool manages
pub struct Arena {
    base: NonNull<u8>,
    kval_m: usize,
}

impl Arena {
    /// Wrap a region of `2^kval_m` bytes starting at `base`
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `2^kval_m` bytes, aligned to
    /// [`PAYLOAD_ALIGN`], zero-initialized or otherwise initialized, and not
    /// accessed through any other path while the arena is alive except via
    /// payload pointers it hands out.
    pub unsafe fn from_raw(base: NonNull<u8>, kval_m: usize) -> Self {
        debug_assert!(is_aligned(base.as_ptr() as usize, PAYLOAD_ALIGN));
        Self { base, kval_m }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn kval_m(&self) -> usize {
        self.kval_m
    }

    /// Size of the region in bytes
    pub fn size(&self) -> usize {
        1 << self.kval_m
    }

    /// Whether a header at `offset` lies entirely inside the region
    pub fn contains(&self, offset: usize) -> bool {
        offset
            .checked_add(HEADER_SIZE)
            .is_some_and(|end| end <= self.size())
    }

    /// Read the header at `offset`
    pub(crate) fn header(&self, offset: usize) -> BlockHeader {
        let ptr = self.header_ptr(offset);
        // SAFETY: `header_ptr` checked bounds and alignment; every bit pattern is a
        // valid `BlockHeader`.
        unsafe { ptr.read() }
    }

    /// Get a mutable reference to the header at `offset`
    pub(crate) fn header_mut(&mut self, offset: usize) -> &mut BlockHeader {
        let ptr = self.header_ptr(offset);
        // SAFETY: as in `header`; `&mut self` keeps the reference unique.
        unsafe { &mut *ptr }
    }

    /// Overwrite the header at `offset`
    pub(crate) fn write_header(&mut self, offset: usize, header: BlockHeader) {
        *self.header_mut(offset) = header;
    }

    /// Address handed to the caller for the block at `offset`
    pub fn payload(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset + HEADER_SIZE < self.size());
        // SAFETY: the payload starts inside the region, which never wraps.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset + HEADER_SIZE)) }
    }

    /// Offset of the block owning `payload`, if the address can be one of ours
    ///
    /// Blocks start on `2^SMALLEST_K` boundaries, so any other payload address
    /// yields `None`.
    pub fn offset_of_payload(&self, payload: NonNull<u8>) -> Option<usize> {
        let addr = payload.as_ptr() as usize;
        let base = self.base.as_ptr() as usize;
        if addr < base + HEADER_SIZE || addr >= base + self.size() {
            return None;
        }
        let offset = addr - base - HEADER_SIZE;
        is_aligned(offset, 1 << SMALLEST_K).then_some(offset)
    }

    fn header_ptr(&self, offset: usize) -> *mut BlockHeader {
        assert!(
            self.contains(offset),
            "header offset {:#x} outside arena of {:#x} bytes",
            offset,
            self.size()
        );
        assert!(
            is_aligned(offset, PAYLOAD_ALIGN),
            "header offset {:#x} misaligned",
            offset
        );
        // SAFETY: bounds and alignment checked above.
        unsafe { self.base.as_ptr().add(offset) as *mut BlockHeader }
    }
}
