//! Binary buddy pool over a single arena
//!
//! Splits free blocks on allocation and coalesces buddies on free, keeping one
//! circular free list per size class.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::config::PoolConfig;
use crate::region::{DefaultProvider, RegionProvider};
use crate::{is_aligned, AllocError, AllocResult, ByteAllocator};

#[cfg(feature = "log")]
use log::{debug, error, info, warn};

use super::{
    arena::Arena,
    buddy_block::{
        btok, buddy_offset, BlockHeader, BlockStatus, BuddyBlock, MAX_K, PAYLOAD_ALIGN, SMALLEST_K,
    },
    free_list::{FreeList, FreeListIter},
};

#[cfg(feature = "tracking")]
use super::stats::{MemoryStatsReporter, PoolStats};

/// A buddy pool managing one arena of `2^k_max` bytes
///
/// The pool exclusively owns its region from creation until [`destroy`]
/// (or drop). It performs no locking; wrap it in
/// [`crate::LockedBuddyPool`] to share it between threads.
///
/// [`destroy`]: BuddyPool::destroy
pub struct BuddyPool<P: RegionProvider = DefaultProvider> {
    provider: P,
    arena: Arena,
    /// Free lists for each size class
    free_lists: [FreeList; MAX_K],
    reserved_bytes: usize,
    released: bool,
}

// SAFETY: the pool is the only owner of its region; payload pointers are loans
// whose use is governed by the caller, not by the thread that owns the pool.
unsafe impl<P: RegionProvider + Send> Send for BuddyPool<P> {}

impl BuddyPool<DefaultProvider> {
    /// Create a pool of at least `bytes` bytes (zero selects `2^DEFAULT_K`)
    ///
    /// # Panics
    ///
    /// Panics if the region cannot be acquired.
    pub fn new(bytes: usize) -> Self {
        match Self::try_new(bytes) {
            Ok(pool) => pool,
            Err(err) => {
                error!("buddy pool: cannot acquire arena for {:#x} bytes: {:?}", bytes, err);
                panic!("buddy pool: arena acquisition failed: {:?}", err);
            }
        }
    }

    /// Create a pool of at least `bytes` bytes, reporting acquisition failure
    pub fn try_new(bytes: usize) -> AllocResult<Self> {
        Self::with_provider(DefaultProvider::default(), PoolConfig::new(bytes))
    }
}

impl<P: RegionProvider> BuddyPool<P> {
    /// Create a pool whose arena comes from `provider`
    pub fn with_provider(mut provider: P, config: PoolConfig) -> AllocResult<Self> {
        let kval_m = config.resolve_kval()?;
        let base = provider.acquire(1 << kval_m)?;
        if !is_aligned(base.as_ptr() as usize, PAYLOAD_ALIGN) {
            error!("buddy pool: provider returned misaligned region {:p}", base);
            // SAFETY: the region was just acquired from this provider and is unused.
            if let Err(err) = unsafe { provider.release(base, 1 << kval_m) } {
                error!("buddy pool: releasing misaligned region failed: {:?}", err);
            }
            return Err(AllocError::RegionUnavailable);
        }

        // SAFETY: the provider hands out zero-filled memory owned solely by us.
        let arena = unsafe { Arena::from_raw(base, kval_m) };
        let mut pool = Self {
            provider,
            arena,
            free_lists: core::array::from_fn(FreeList::new),
            reserved_bytes: 0,
            released: false,
        };

        pool.arena
            .write_header(0, BlockHeader::new(BlockStatus::Available, kval_m));
        pool.free_lists[kval_m].push_front(&mut pool.arena, 0);

        debug!(
            "buddy pool: arena [{:p}, +{:#x}) class {}",
            base,
            pool.size(),
            kval_m
        );
        Ok(pool)
    }

    /// Exponent of the whole arena
    pub fn k_max(&self) -> usize {
        self.arena.kval_m()
    }

    /// First byte of the arena
    pub fn base(&self) -> NonNull<u8> {
        self.arena.base()
    }

    /// Arena size in bytes
    pub fn size(&self) -> usize {
        self.arena.size()
    }

    /// Allocate a block whose payload holds at least `size` bytes
    ///
    /// The returned address is aligned to [`PAYLOAD_ALIGN`]. On
    /// [`AllocError::NoMemory`] the pool is left untouched.
    pub fn malloc(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 {
            warn!("buddy pool: zero-sized allocation");
            return Err(AllocError::InvalidParam);
        }

        let kval = btok(size).max(SMALLEST_K);
        let Some(found) = (kval..=self.k_max()).find(|&k| !self.free_lists[k].is_empty()) else {
            debug!(
                "buddy pool: allocation failure: {} bytes (class {}), arena class {}",
                size,
                kval,
                self.k_max()
            );
            #[cfg(feature = "tracking")]
            MemoryStatsReporter::print_alloc_failure_stats(&self.get_stats(), size, kval);
            return Err(AllocError::NoMemory);
        };

        let offset = self.free_lists[found]
            .pop_front(&mut self.arena)
            .ok_or(AllocError::NoMemory)?;

        // Split down to the requested class, returning upper halves
        let mut order = found;
        while order > kval {
            order -= 1;
            let buddy = offset + (1 << order);
            self.arena
                .write_header(buddy, BlockHeader::new(BlockStatus::Available, order));
            self.free_lists[order].push_back(&mut self.arena, buddy);
        }

        let header = self.arena.header_mut(offset);
        header.set_kval(kval);
        header.set_status(BlockStatus::Reserved);
        self.reserved_bytes += 1 << kval;

        Ok(self.arena.payload(offset))
    }

    /// Return the block behind `ptr` to the pool, merging it with free buddies
    ///
    /// A null pointer is ignored. Pointers outside the arena, misaligned for
    /// their recorded class, or not currently reserved (double free) are logged
    /// and ignored. Anything else not obtained from [`malloc`](Self::malloc) on
    /// this pool corrupts it.
    pub fn free(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let mut offset = match self.reserved_offset(ptr) {
            Ok(offset) => offset,
            Err(_) => {
                warn!("buddy pool: ignoring free of {:p}: not a reserved block", ptr);
                return;
            }
        };

        let mut kval = self.arena.header(offset).kval();
        self.reserved_bytes -= 1 << kval;
        self.arena.header_mut(offset).set_status(BlockStatus::Available);

        // The whole arena has no buddy
        while kval < self.k_max() {
            let buddy = buddy_offset(offset, kval);
            if !self.arena.contains(buddy) {
                break;
            }
            let header = self.arena.header(buddy);
            if header.status() != Some(BlockStatus::Available) || header.kval() != kval {
                break;
            }

            self.free_lists[kval].remove(&mut self.arena, buddy);
            offset = offset.min(buddy);
            kval += 1;
            self.arena.header_mut(offset).set_kval(kval);
        }

        self.free_lists[kval].push_front(&mut self.arena, offset);

        if kval == self.k_max() && offset == 0 {
            self.reset_free_lists();
        }
    }

    /// Release the arena, panicking if the provider refuses it back
    pub fn destroy(self) {
        if let Err(err) = self.try_destroy() {
            panic!("buddy pool: arena release failed: {:?}", err);
        }
    }

    /// Release the arena, reporting provider failure
    pub fn try_destroy(mut self) -> AllocResult {
        self.release()
    }

    /// Buddy of `block`, or `None` for the whole-arena block
    pub fn buddy_of(&self, block: BuddyBlock) -> Option<BuddyBlock> {
        if block.kval >= self.k_max() {
            return None;
        }
        Some(block.buddy())
    }

    /// Header of the block whose payload starts at `ptr`
    ///
    /// `None` unless `ptr` sits at a payload address some block could have.
    pub fn header_of(&self, ptr: NonNull<u8>) -> Option<BlockHeader> {
        self.arena
            .offset_of_payload(ptr)
            .map(|offset| self.arena.header(offset))
    }

    /// Block reserved behind `ptr`
    pub fn block_of(&self, ptr: NonNull<u8>) -> AllocResult<BuddyBlock> {
        let offset = self.reserved_offset(ptr)?;
        Ok(BuddyBlock::new(self.arena.header(offset).kval(), offset))
    }

    /// Sentinels of every size class `0..=k_max`
    pub fn free_lists(&self) -> &[FreeList] {
        &self.free_lists[..=self.k_max()]
    }

    /// Sentinel of size class `kval`
    pub fn free_list(&self, kval: usize) -> Option<&FreeList> {
        self.free_lists().get(kval)
    }

    /// Get free blocks of a specific class as an iterator
    ///
    /// Classes above `k_max` have no blocks.
    pub fn free_blocks(&self, kval: usize) -> FreeListIter<'_> {
        match self.free_list(kval) {
            Some(list) => list.iter(&self.arena),
            None => FreeListIter::empty(&self.arena),
        }
    }

    /// Whether the pool is in its freshly initialized state
    pub fn is_full(&self) -> bool {
        let top = &self.free_lists[self.k_max()];
        self.free_lists[..self.k_max()]
            .iter()
            .enumerate()
            .all(|(kval, list)| *list == FreeList::new(kval))
            && top.len() == 1
            && top.first() == top.last()
            && self.free_blocks(self.k_max()).next() == Some(BuddyBlock::new(self.k_max(), 0))
    }

    /// Sum of the sizes of all reserved blocks
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    /// Get statistics for this pool
    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> PoolStats {
        let mut stats = PoolStats::new();
        stats.total_bytes = self.size();
        stats.reserved_bytes = self.reserved_bytes;

        for (kval, list) in self.free_lists().iter().enumerate() {
            stats.free_blocks_by_kval[kval] = list.len();
            stats.free_bytes += list.len() << kval;
        }
        stats
    }

    /// Print the arena layout and free block distribution
    pub fn print_pool_info(&self) {
        info!("========== Buddy Pool Info ==========");
        info!(
            "Arena: [{:p}, +{:#x}) class {}",
            self.base(),
            self.size(),
            self.k_max()
        );
        info!("Reserved bytes: {:#x}", self.reserved_bytes);
        info!("Free blocks distribution:");
        for (kval, list) in self.free_lists().iter().enumerate() {
            if !list.is_empty() {
                info!(
                    "    Class {}: {} blocks (size {} bytes each)",
                    kval,
                    list.len(),
                    1usize << kval
                );
            }
        }
        info!("=====================================");
    }

    fn reserved_offset(&self, ptr: NonNull<u8>) -> AllocResult<usize> {
        let offset = self
            .arena
            .offset_of_payload(ptr)
            .ok_or(AllocError::NotAllocated)?;
        let header = self.arena.header(offset);
        let kval = header.kval();
        if header.status() != Some(BlockStatus::Reserved)
            || kval < SMALLEST_K
            || kval > self.k_max()
            || !is_aligned(offset, 1 << kval)
        {
            return Err(AllocError::NotAllocated);
        }
        Ok(offset)
    }

    fn reset_free_lists(&mut self) {
        debug!("buddy pool: arena fully coalesced");
        let k_max = self.k_max();
        for (kval, list) in self.free_lists[..k_max].iter_mut().enumerate() {
            *list = FreeList::new(kval);
        }
    }

    fn release(&mut self) -> AllocResult {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let (base, size) = (self.base(), self.size());
        for (kval, list) in self.free_lists.iter_mut().enumerate() {
            *list = FreeList::new(kval);
        }
        self.reserved_bytes = 0;
        // SAFETY: the region came from this provider in `with_provider` and the
        // `released` flag guarantees it is handed back only once.
        unsafe { self.provider.release(base, size) }
    }
}

impl<P: RegionProvider> Drop for BuddyPool<P> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!("buddy pool: arena release failed on drop: {:?}", err);
        }
    }
}

impl<P: RegionProvider> ByteAllocator for BuddyPool<P> {
    fn alloc(&mut self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.align() > PAYLOAD_ALIGN {
            return Err(AllocError::InvalidParam);
        }
        self.malloc(layout.size())
    }

    fn dealloc(&mut self, pos: NonNull<u8>, _layout: Layout) {
        self.free(pos.as_ptr());
    }

    fn total_bytes(&self) -> usize {
        self.size()
    }

    fn used_bytes(&self) -> usize {
        self.reserved_bytes
    }

    fn available_bytes(&self) -> usize {
        self.size() - self.reserved_bytes
    }
}
