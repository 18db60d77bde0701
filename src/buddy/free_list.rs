//! Circular free lists threaded through the arena
//!
//! Each size class owns one sentinel. Member blocks link to each other by
//! arena offset through the `next`/`prev` fields of their headers; a link of
//! [`Link::Head`] points back at the sentinel, so an empty list is a sentinel
//! whose `next` and `prev` both refer to itself.

#[cfg(feature = "log")]
use log::error;

use super::arena::Arena;
use super::buddy_block::{BlockStatus, BuddyBlock, Link};

/// Sentinel of one size class's free list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    kval: usize,
    tag: BlockStatus,
    next: Link,
    prev: Link,
    len: usize,
}

impl FreeList {
    /// Create an empty list for size class `kval`
    pub const fn new(kval: usize) -> Self {
        Self {
            kval,
            tag: BlockStatus::Unused,
            next: Link::Head,
            prev: Link::Head,
            len: 0,
        }
    }

    pub const fn kval(&self) -> usize {
        self.kval
    }

    /// Sentinel tag, always [`BlockStatus::Unused`]
    pub const fn status(&self) -> BlockStatus {
        self.tag
    }

    /// First block, or [`Link::Head`] when empty
    pub const fn first(&self) -> Link {
        self.next
    }

    /// Last block, or [`Link::Head`] when empty
    pub const fn last(&self) -> Link {
        self.prev
    }

    /// Check if the list is empty
    pub const fn is_empty(&self) -> bool {
        matches!(self.next, Link::Head)
    }

    /// Get the length of the list
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Insert the block at `offset` right after the sentinel
    pub fn push_front(&mut self, arena: &mut Arena, offset: usize) {
        let first = self.next;
        {
            let header = arena.header_mut(offset);
            header.set_next(first);
            header.set_prev(Link::Head);
        }
        self.set_prev_of(arena, first, Link::Block(offset));
        self.next = Link::Block(offset);
        self.len += 1;
    }

    /// Insert the block at `offset` right before the sentinel
    pub fn push_back(&mut self, arena: &mut Arena, offset: usize) {
        let last = self.prev;
        {
            let header = arena.header_mut(offset);
            header.set_next(Link::Head);
            header.set_prev(last);
        }
        self.set_next_of(arena, last, Link::Block(offset));
        self.prev = Link::Block(offset);
        self.len += 1;
    }

    /// Unlink the block at `offset`, which must be a member of this list
    pub fn remove(&mut self, arena: &mut Arena, offset: usize) {
        if self.len == 0 {
            error!("kval {}: remove {:#x} from an empty free list", self.kval, offset);
            return;
        }

        let header = arena.header(offset);
        let (next, prev) = (header.next(), header.prev());
        self.set_next_of(arena, prev, next);
        self.set_prev_of(arena, next, prev);

        let header = arena.header_mut(offset);
        header.set_next(Link::Head);
        header.set_prev(Link::Head);
        self.len -= 1;
    }

    /// Unlink and return the first block
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<usize> {
        match self.next {
            Link::Head => None,
            Link::Block(offset) => {
                self.remove(arena, offset);
                Some(offset)
            }
        }
    }

    /// Get iterator over the blocks, front to back
    pub fn iter<'a>(&'a self, arena: &'a Arena) -> FreeListIter<'a> {
        FreeListIter {
            arena,
            current: self.next,
            remaining: self.len,
        }
    }

    fn set_next_of(&mut self, arena: &mut Arena, at: Link, next: Link) {
        match at {
            Link::Head => self.next = next,
            Link::Block(offset) => arena.header_mut(offset).set_next(next),
        }
    }

    fn set_prev_of(&mut self, arena: &mut Arena, at: Link, prev: Link) {
        match at {
            Link::Head => self.prev = prev,
            Link::Block(offset) => arena.header_mut(offset).set_prev(prev),
        }
    }
}

/// Iterator for FreeList
pub struct FreeListIter<'a> {
    arena: &'a Arena,
    current: Link,
    remaining: usize,
}

impl<'a> FreeListIter<'a> {
    /// Iterator over no blocks
    pub(crate) fn empty(arena: &'a Arena) -> Self {
        Self {
            arena,
            current: Link::Head,
            remaining: 0,
        }
    }
}

impl Iterator for FreeListIter<'_> {
    type Item = BuddyBlock;

    fn next(&mut self) -> Option<Self::Item> {
        // `remaining` bounds the walk even if a header was corrupted into a cycle
        if self.remaining == 0 {
            return None;
        }
        match self.current {
            Link::Head => None,
            Link::Block(offset) => {
                let header = self.arena.header(offset);
                self.current = header.next();
                self.remaining -= 1;
                Some(BuddyBlock::new(header.kval(), offset))
            }
        }
    }
}
