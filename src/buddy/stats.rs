//! Statistics and debugging for the buddy pool
//!
//! Provides a per-class snapshot of free memory and failure reporting.

use super::buddy_block::MAX_K;

/// Buddy pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_bytes: usize,
    pub free_bytes: usize,
    pub reserved_bytes: usize,
    pub free_blocks_by_kval: [usize; MAX_K],
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolStats {
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            free_bytes: 0,
            reserved_bytes: 0,
            free_blocks_by_kval: [0; MAX_K],
        }
    }

    /// Number of free blocks across all classes
    pub fn free_blocks(&self) -> usize {
        self.free_blocks_by_kval.iter().sum()
    }

    /// Largest class with a free block, if any
    pub fn largest_free_kval(&self) -> Option<usize> {
        self.free_blocks_by_kval.iter().rposition(|&count| count > 0)
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(stats: &PoolStats, request_bytes: usize, request_kval: usize) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        error!(
            "Request: {} bytes (class {}, {} bytes with header)",
            request_bytes,
            request_kval,
            1usize.checked_shl(request_kval as u32).unwrap_or(0)
        );
        error!("  Total: {} KB", stats.total_bytes / 1024);
        error!("  Free: {} KB", stats.free_bytes / 1024);
        error!("  Reserved: {} KB", stats.reserved_bytes / 1024);
        error!("  Free blocks by class:");

        for kval in (0..MAX_K).rev() {
            let count = stats.free_blocks_by_kval[kval];
            if count > 0 {
                error!(
                    "    Class {}: {} blocks ({} bytes each)",
                    kval,
                    count,
                    1usize << kval
                );
            }
        }
        error!("========================================");
    }
}
