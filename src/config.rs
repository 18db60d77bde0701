//! Pool configuration
//!
//! Size limits are compile-time constants in [`crate::buddy`]; the only runtime
//! knobs are the requested capacity and what to do when it is too large.

#[cfg(feature = "log")]
use log::warn;

use crate::buddy::{pow2_exponent, DEFAULT_K, MAX_K, MIN_K};
use crate::{AllocError, AllocResult};

/// What to do with a requested capacity above `2^(MAX_K - 1)` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Silently shrink the arena to `2^(MAX_K - 1)` bytes
    #[default]
    Clamp,
    /// Fail with [`AllocError::InvalidParam`]
    Reject,
}

/// Parameters for creating a [`crate::BuddyPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolConfig {
    /// Requested arena size in bytes; zero selects `2^DEFAULT_K`
    pub requested_bytes: usize,
    pub oversize: OversizePolicy,
}

impl PoolConfig {
    pub const fn new(requested_bytes: usize) -> Self {
        Self {
            requested_bytes,
            oversize: OversizePolicy::Clamp,
        }
    }

    pub const fn with_oversize(mut self, oversize: OversizePolicy) -> Self {
        self.oversize = oversize;
        self
    }

    /// Exponent of the arena this configuration describes
    ///
    /// The smallest `k` with `2^k >= requested_bytes`, raised to [`MIN_K`] and
    /// limited to `MAX_K - 1` according to [`OversizePolicy`].
    pub fn resolve_kval(&self) -> AllocResult<usize> {
        if self.requested_bytes == 0 {
            return Ok(DEFAULT_K);
        }

        let kval = pow2_exponent(self.requested_bytes);
        if kval < MIN_K {
            return Ok(MIN_K);
        }
        if kval >= MAX_K {
            return match self.oversize {
                OversizePolicy::Clamp => {
                    warn!(
                        "buddy pool: requested {:#x} bytes (class {}), clamping to class {}",
                        self.requested_bytes,
                        kval,
                        MAX_K - 1
                    );
                    Ok(MAX_K - 1)
                }
                OversizePolicy::Reject => Err(AllocError::InvalidParam),
            };
        }
        Ok(kval)
    }
}
