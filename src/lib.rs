//! Fixed-arena binary buddy allocator
//!
//! This crate manages one contiguous region of `2^k` bytes with the classic
//! binary buddy algorithm:
//! - Requests are rounded up to a power-of-two block (header included)
//! - Larger free blocks are split in halves until the request fits
//! - Freed blocks coalesce with their buddy whenever the buddy is free
//! - One sentinel-headed circular free list per size class
//!
//! The backing region comes from a [`RegionProvider`] (anonymous `mmap` on
//! unix by default) and is returned to it exactly once on teardown.

#![no_std]

extern crate alloc;

use core::alloc::Layout;
use core::ptr::NonNull;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Page size used to align regions handed out by the providers
pub const PAGE_SIZE: usize = 0x1000;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid `size` or alignment, absent pool, or rejected capacity.
    InvalidParam,
    /// No enough memory to allocate.
    NoMemory,
    /// The pointer does not refer to a reserved block of this pool.
    NotAllocated,
    /// The region provider could not supply the arena.
    RegionUnavailable,
    /// The region provider could not take the arena back.
    RegionRelease,
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Byte-granularity allocator.
pub trait ByteAllocator {
    /// Allocate memory with the given size (in bytes) and alignment.
    fn alloc(&mut self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Deallocate memory at the given position, size, and alignment.
    fn dealloc(&mut self, pos: NonNull<u8>, layout: Layout);

    /// Returns total memory size in bytes.
    fn total_bytes(&self) -> usize;

    /// Returns allocated memory size in bytes.
    fn used_bytes(&self) -> usize;

    /// Returns available memory size in bytes.
    fn available_bytes(&self) -> usize;
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::PoolStats;
pub use buddy::{
    btok, buddy_offset, pow2_exponent, BlockHeader, BlockStatus, BuddyBlock, BuddyPool, FreeList,
    Link, DEFAULT_K, HEADER_SIZE, MAX_K, MIN_K, PAYLOAD_ALIGN, SMALLEST_K,
};

pub mod config;
pub use config::{OversizePolicy, PoolConfig};

pub mod region;
#[cfg(unix)]
pub use region::MmapProvider;
pub use region::{DefaultProvider, HeapProvider, RegionProvider};

pub mod global_allocator;
pub use global_allocator::LockedBuddyPool;
