//! Buddy pool module
//!
//! This module provides the binary buddy system:
//! - Block headers stored in the arena, linked by offset
//! - Circular free lists with one sentinel per size class
//! - Split on allocation, coalesce on free

pub mod arena;
pub mod buddy_block;
pub mod buddy_pool;
pub mod free_list;
#[cfg(feature = "tracking")]
pub mod stats;

pub use arena::Arena;
pub use buddy_block::{
    btok, buddy_offset, pow2_exponent, BlockHeader, BlockStatus, BuddyBlock, Link, DEFAULT_K,
    HEADER_SIZE, MAX_K, MIN_K, PAYLOAD_ALIGN, SMALLEST_K,
};
pub use buddy_pool::BuddyPool;
pub use free_list::{FreeList, FreeListIter};
#[cfg(feature = "tracking")]
pub use stats::{MemoryStatsReporter, PoolStats};
