//! Integration tests for the buddy pool
//!
//! Exercises the public API end to end on real arenas: initialization shape,
//! split/coalesce round trips, exhaustion and the misuse paths.

#![no_std]

extern crate alloc;
extern crate buddy_pool;

use alloc::vec::Vec;
use buddy_pool::{
    btok, buddy_offset, AllocError, BlockStatus, BuddyBlock, BuddyPool, FreeList, HeapProvider,
    OversizePolicy, PoolConfig, RegionProvider, DEFAULT_K, HEADER_SIZE, MIN_K, SMALLEST_K,
};
use core::ptr::NonNull;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Check the pool to ensure it is full.
fn check_pool_full<P: RegionProvider>(pool: &BuddyPool<P>) {
    let k_max = pool.k_max();
    // A full pool has every class below k_max empty
    for (kval, list) in pool.free_lists()[..k_max].iter().enumerate() {
        assert_eq!(*list, FreeList::new(kval));
        assert_eq!(list.status(), BlockStatus::Unused);
    }
    // The top class holds the base block and nothing else
    let top: Vec<_> = pool.free_blocks(k_max).collect();
    assert_eq!(top, [BuddyBlock::new(k_max, 0)]);
    assert!(pool.is_full());
}

/// Check the pool to ensure nothing is free.
fn check_pool_empty<P: RegionProvider>(pool: &BuddyPool<P>) {
    for (kval, list) in pool.free_lists().iter().enumerate() {
        assert_eq!(*list, FreeList::new(kval));
    }
}

fn snapshot<P: RegionProvider>(pool: &BuddyPool<P>) -> Vec<FreeList> {
    pool.free_lists().to_vec()
}

#[test]
fn test_init_each_size() {
    for kval in MIN_K..=DEFAULT_K {
        let pool = BuddyPool::new(1 << kval);
        assert_eq!(pool.k_max(), kval);
        assert_eq!(pool.size(), 1 << kval);
        check_pool_full(&pool);
        pool.destroy();
    }
}

#[test]
fn test_init_default_and_small() {
    let pool = BuddyPool::new(0);
    assert_eq!(pool.k_max(), DEFAULT_K);
    check_pool_full(&pool);
    pool.destroy();

    let pool = BuddyPool::new(1);
    assert_eq!(pool.k_max(), MIN_K);
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_malloc_one_byte() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    let fresh = snapshot(&pool);

    let mem = pool.malloc(1).unwrap();
    let header = pool.header_of(mem).unwrap();
    assert_eq!(header.kval(), SMALLEST_K.max(btok(1)));
    assert_eq!(header.status(), Some(BlockStatus::Reserved));

    pool.free(mem.as_ptr());
    check_pool_full(&pool);
    assert_eq!(snapshot(&pool), fresh);
    pool.destroy();
}

#[test]
fn test_malloc_one_large() {
    let bytes = 1 << MIN_K;
    let mut pool = BuddyPool::new(bytes);

    // Ask for exactly the whole arena
    let mem = pool.malloc(bytes - HEADER_SIZE).unwrap();
    let header = pool.header_of(mem).unwrap();
    assert_eq!(header.kval(), MIN_K);
    assert_eq!(header.status(), Some(BlockStatus::Reserved));
    assert_eq!(mem.as_ptr() as usize, pool.base().as_ptr() as usize + HEADER_SIZE);
    check_pool_empty(&pool);

    // A full pool refuses everything and stays as it was
    let before = snapshot(&pool);
    assert_eq!(pool.malloc(5), Err(AllocError::NoMemory));
    assert_eq!(pool.malloc(1), Err(AllocError::NoMemory));
    assert_eq!(snapshot(&pool), before);

    pool.free(mem.as_ptr());
    check_pool_full(&pool);

    // And the whole arena can be taken again once freed
    let again = pool.malloc(bytes - HEADER_SIZE).unwrap();
    assert_eq!(again, mem);
    pool.free(again.as_ptr());
    pool.destroy();
}

#[test]
fn test_malloc_multiple_blocks_any_order() {
    const ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut pool = BuddyPool::new(1 << DEFAULT_K);
    let fresh = snapshot(&pool);

    for order in ORDERS {
        let blocks = [
            pool.malloc(32).unwrap(),
            pool.malloc(128).unwrap(),
            pool.malloc(512).unwrap(),
        ];
        assert!(!pool.is_full());
        assert!(pool.free_list(DEFAULT_K).unwrap().is_empty());

        for index in order {
            pool.free(blocks[index].as_ptr());
        }
        check_pool_full(&pool);
        assert_eq!(snapshot(&pool), fresh);
    }
    pool.destroy();
}

#[test]
fn test_malloc_zero_size() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    assert_eq!(pool.malloc(0), Err(AllocError::InvalidParam));
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_malloc_larger_than_pool() {
    let pool_size = 1 << MIN_K;
    let mut pool = BuddyPool::new(pool_size);
    assert_eq!(pool.malloc(pool_size + 1), Err(AllocError::NoMemory));
    assert_eq!(pool.malloc(pool_size - HEADER_SIZE + 1), Err(AllocError::NoMemory));
    assert_eq!(pool.malloc(usize::MAX), Err(AllocError::NoMemory));
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_malloc_power_and_non_power_of_two() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    for size in [128, 150, 1000, 1 << 12] {
        let mem = pool.malloc(size).unwrap();
        let block = pool.block_of(mem).unwrap();
        assert_eq!(block.kval, btok(size));
        assert!(block.capacity() >= size);
        pool.free(mem.as_ptr());
        check_pool_full(&pool);
    }
    pool.destroy();
}

#[test]
fn test_exhaust_pool() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    let block_size = (1 << SMALLEST_K) - HEADER_SIZE;
    let num_blocks = 1 << (MIN_K - SMALLEST_K);

    let mut blocks = Vec::with_capacity(num_blocks);
    for _ in 0..num_blocks {
        blocks.push(pool.malloc(block_size).unwrap());
    }
    check_pool_empty(&pool);

    let before = snapshot(&pool);
    assert_eq!(pool.malloc(block_size), Err(AllocError::NoMemory));
    assert_eq!(snapshot(&pool), before);

    // Freeing every other block leaves nothing to coalesce
    for mem in blocks.iter().step_by(2) {
        pool.free(mem.as_ptr());
    }
    assert_eq!(
        pool.free_list(SMALLEST_K).unwrap().len(),
        num_blocks / 2
    );
    assert_eq!(pool.malloc(block_size + 1), Err(AllocError::NoMemory));

    for mem in blocks.iter().skip(1).step_by(2) {
        pool.free(mem.as_ptr());
    }
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_random_alloc_free_round_trip() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    let fresh = snapshot(&pool);
    let mut rng = ChaCha8Rng::seed_from_u64(987);

    for _round in 0..4 {
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
        for i in 0..200 {
            let size = rng.gen_range(1..=4000);
            let Ok(mem) = pool.malloc(size) else {
                continue;
            };
            let fill = i as u8;
            unsafe { mem.as_ptr().write_bytes(fill, size) };
            live.push((mem, size, fill));
        }

        // No two live payloads overlap
        let mut spans: Vec<_> = live
            .iter()
            .map(|(mem, size, _)| (mem.as_ptr() as usize, *size))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }

        // Free in a shuffled order, checking contents survived
        live.shuffle(&mut rng);
        for (mem, size, fill) in live {
            let bytes = unsafe { core::slice::from_raw_parts(mem.as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == fill));
            pool.free(mem.as_ptr());
        }
        check_pool_full(&pool);
        assert_eq!(snapshot(&pool), fresh);
    }
    pool.destroy();
}

#[test]
fn test_buddy_calc_blocks() {
    let pool = BuddyPool::new(1 << DEFAULT_K);
    let size = pool.size();

    // First, middle and last blocks of a few classes
    for (kval, offset) in [(2, 0), (3, size / 2), (4, size - 16), (10, 1 << 20)] {
        let block = BuddyBlock::new(kval, offset);
        let buddy = pool.buddy_of(block).unwrap();
        assert_eq!(buddy.offset, offset ^ (1 << kval));
        assert_eq!(buddy.offset, buddy_offset(offset, kval));
        assert_eq!(pool.buddy_of(buddy), Some(block));
    }
    assert_eq!(pool.buddy_of(BuddyBlock::new(DEFAULT_K, 0)), None);
    pool.destroy();
}

#[test]
fn test_free_null_pointer() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    check_pool_full(&pool);
    pool.free(core::ptr::null_mut());
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_free_invalid_pointer() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    let mut invalid_block = 0u64;

    pool.free(&mut invalid_block as *mut u64 as *mut u8);
    pool.free(pool.base().as_ptr());
    check_pool_full(&pool);

    // Inside the arena but not the start of a reserved payload
    let mem = pool.malloc(1000).unwrap();
    let before = snapshot(&pool);
    pool.free(unsafe { mem.as_ptr().add(8) });
    assert_eq!(snapshot(&pool), before);
    assert_eq!(
        pool.block_of(NonNull::new(unsafe { mem.as_ptr().add(8) }).unwrap()),
        Err(AllocError::NotAllocated)
    );

    pool.free(mem.as_ptr());
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_double_free_is_ignored() {
    let mut pool = BuddyPool::new(1 << MIN_K);
    let a = pool.malloc(64).unwrap();
    let b = pool.malloc(64).unwrap();

    pool.free(a.as_ptr());
    let before = snapshot(&pool);
    pool.free(a.as_ptr());
    assert_eq!(snapshot(&pool), before);

    pool.free(b.as_ptr());
    check_pool_full(&pool);
    pool.destroy();
}

#[test]
fn test_heap_provider_pool() {
    let mut pool = BuddyPool::with_provider(HeapProvider, PoolConfig::new(1 << MIN_K)).unwrap();
    let mem = pool.malloc(4096).unwrap();
    assert_eq!(pool.block_of(mem).unwrap().kval, 13);
    pool.free(mem.as_ptr());
    check_pool_full(&pool);
    assert_eq!(pool.try_destroy(), Ok(()));
}

#[test]
fn test_oversize_reject_policy() {
    let config = PoolConfig::new(usize::MAX).with_oversize(OversizePolicy::Reject);
    let result = BuddyPool::with_provider(HeapProvider, config);
    assert_eq!(result.err(), Some(AllocError::InvalidParam));
}

/// Provider that never has memory
struct FailingProvider;

impl RegionProvider for FailingProvider {
    fn acquire(&mut self, _size: usize) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError::RegionUnavailable)
    }

    unsafe fn release(&mut self, _base: NonNull<u8>, _size: usize) -> Result<(), AllocError> {
        panic!("nothing was acquired");
    }
}

#[test]
fn test_region_unavailable() {
    let result = BuddyPool::with_provider(FailingProvider, PoolConfig::new(1 << MIN_K));
    assert_eq!(result.err(), Some(AllocError::RegionUnavailable));
}

/// Provider that refuses to take its region back
struct StickyProvider;

impl RegionProvider for StickyProvider {
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        HeapProvider.acquire(size)
    }

    unsafe fn release(&mut self, _base: NonNull<u8>, _size: usize) -> Result<(), AllocError> {
        Err(AllocError::RegionRelease)
    }
}

#[test]
fn test_release_failure_reported() {
    let pool = BuddyPool::with_provider(StickyProvider, PoolConfig::new(1 << MIN_K)).unwrap();
    assert_eq!(pool.try_destroy(), Err(AllocError::RegionRelease));
}
