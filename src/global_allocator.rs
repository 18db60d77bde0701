//! Spin-locked buddy pool
//!
//! [`BuddyPool`] does no locking of its own. This wrapper holds the lock for
//! the whole of every operation, which makes a pool usable from several
//! threads and as a `#[global_allocator]`.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;

use kspin::SpinNoIrq;

#[cfg(feature = "log")]
use log::{error, warn};

use crate::buddy::{BuddyPool, PAYLOAD_ALIGN};
use crate::config::PoolConfig;
use crate::region::{DefaultProvider, RegionProvider};
use crate::{AllocError, AllocResult};

/// A buddy pool behind a spin lock, absent until [`init`](Self::init)
pub struct LockedBuddyPool<P: RegionProvider = DefaultProvider> {
    inner: SpinNoIrq<Option<BuddyPool<P>>>,
}

impl<P: RegionProvider> LockedBuddyPool<P> {
    pub const fn new() -> Self {
        Self {
            inner: SpinNoIrq::new(None),
        }
    }

    /// Create the pool; fails if one already exists
    pub fn init(&self, provider: P, config: PoolConfig) -> AllocResult {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            error!("locked pool: already initialized");
            return Err(AllocError::InvalidParam);
        }
        *inner = Some(BuddyPool::with_provider(provider, config)?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Allocate from the pool; an absent pool is [`AllocError::InvalidParam`]
    pub fn malloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        match self.inner.lock().as_mut() {
            Some(pool) => pool.malloc(size),
            None => {
                warn!("locked pool: allocation before initialization");
                Err(AllocError::InvalidParam)
            }
        }
    }

    /// Return memory to the pool; ignored when the pool is absent
    pub fn free(&self, ptr: *mut u8) {
        if let Some(pool) = self.inner.lock().as_mut() {
            pool.free(ptr);
        }
    }

    /// Tear the pool down, leaving the wrapper ready for another `init`
    pub fn destroy(&self) -> AllocResult {
        let pool = self.inner.lock().take().ok_or(AllocError::InvalidParam)?;
        pool.try_destroy()
    }

    /// Run `f` with exclusive access to the pool, if present
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut BuddyPool<P>) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }
}

impl<P: RegionProvider> Default for LockedBuddyPool<P> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<P: RegionProvider + Send> GlobalAlloc for LockedBuddyPool<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGN {
            warn!("locked pool: unsupported alignment for layout {:?}", layout);
            return core::ptr::null_mut();
        }
        match self.malloc(layout.size().max(1)) {
            Ok(ptr) => ptr.as_ptr(),
            Err(_) => core::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.free(ptr);
    }
}
