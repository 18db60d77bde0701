//! Buddy block metadata
//!
//! Size-class constants, the in-arena block header and the arithmetic that
//! ties a block's offset to its buddy.

use core::mem;

/// Arena exponent used when a pool is created with a requested size of zero
pub const DEFAULT_K: usize = 30;

/// Smallest arena exponent a pool is created with (1 MiB)
pub const MIN_K: usize = 20;

/// One past the largest arena exponent; the biggest arena is `2^(MAX_K - 1)` bytes
pub const MAX_K: usize = 48;

/// Smallest block exponent handed out by `malloc`; must fit a header plus payload
pub const SMALLEST_K: usize = 6;

/// Bytes taken by the header at the front of every block
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Alignment guaranteed for every payload address
pub const PAYLOAD_ALIGN: usize = mem::align_of::<BlockHeader>();

/// Raw link value standing for "the sentinel of this list"
const LIST_HEAD: usize = usize::MAX;

const _: () = assert!(HEADER_SIZE < 1 << SMALLEST_K);
const _: () = assert!(HEADER_SIZE % PAYLOAD_ALIGN == 0);

/// Status tag stored in every header
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Handed out to a caller
    Reserved = 0,
    /// Sitting in a free list
    Available = 1,
    /// List sentinel, never a real block
    Unused = 3,
}

impl BlockStatus {
    /// Decode a raw tag; anything else is not a header we wrote
    pub const fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(Self::Reserved),
            1 => Some(Self::Available),
            3 => Some(Self::Unused),
            _ => None,
        }
    }
}

/// Position within a free list: another block's offset, or the list sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Head,
    Block(usize),
}

impl Link {
    const fn from_raw(raw: usize) -> Self {
        if raw == LIST_HEAD {
            Self::Head
        } else {
            Self::Block(raw)
        }
    }

    const fn to_raw(self) -> usize {
        match self {
            Self::Head => LIST_HEAD,
            Self::Block(offset) => offset,
        }
    }
}

/// Header written at the first byte of every block in the arena
///
/// Fields are plain integers so that any bit pattern read from the arena is a
/// valid value; [`BlockHeader::status`] decodes the tag.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    tag: u16,
    kval: u16,
    next: usize,
    prev: usize,
}

impl BlockHeader {
    pub const fn new(status: BlockStatus, kval: usize) -> Self {
        Self {
            tag: status as u16,
            kval: kval as u16,
            next: LIST_HEAD,
            prev: LIST_HEAD,
        }
    }

    pub const fn status(&self) -> Option<BlockStatus> {
        BlockStatus::from_tag(self.tag)
    }

    pub fn set_status(&mut self, status: BlockStatus) {
        self.tag = status as u16;
    }

    pub const fn kval(&self) -> usize {
        self.kval as usize
    }

    pub fn set_kval(&mut self, kval: usize) {
        debug_assert!(kval < MAX_K);
        self.kval = kval as u16;
    }

    pub const fn next(&self) -> Link {
        Link::from_raw(self.next)
    }

    pub fn set_next(&mut self, link: Link) {
        self.next = link.to_raw();
    }

    pub const fn prev(&self) -> Link {
        Link::from_raw(self.prev)
    }

    pub fn set_prev(&mut self, link: Link) {
        self.prev = link.to_raw();
    }
}

/// A block as seen from outside the arena: offset from the arena base and size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyBlock {
    pub kval: usize,
    pub offset: usize,
}

impl BuddyBlock {
    /// Create a new buddy block
    pub const fn new(kval: usize, offset: usize) -> Self {
        Self { kval, offset }
    }

    /// Size of the block in bytes
    pub const fn size(&self) -> usize {
        1 << self.kval
    }

    /// Bytes available to the caller once the header is accounted for
    pub const fn capacity(&self) -> usize {
        self.size() - HEADER_SIZE
    }

    /// The other half of the `kval + 1` block this one was split from
    pub const fn buddy(&self) -> Self {
        Self {
            kval: self.kval,
            offset: buddy_offset(self.offset, self.kval),
        }
    }
}

/// Offset of the buddy of the block at `offset` with class `kval`
///
/// Blocks are aligned to their own size, so the two halves of a parent differ
/// only in bit `kval`.
#[inline]
pub const fn buddy_offset(offset: usize, kval: usize) -> usize {
    offset ^ (1 << kval)
}

/// Smallest `k` such that `2^k >= bytes`
///
/// Returns `usize::BITS` when no `usize` power of two is large enough.
pub const fn pow2_exponent(bytes: usize) -> usize {
    let mut kval = 0;
    let mut size: usize = 1;
    while size < bytes {
        size = match size.checked_mul(2) {
            Some(size) => size,
            None => return usize::BITS as usize,
        };
        kval += 1;
    }
    kval
}

/// Size class needed to serve a payload of `bytes`, header included
///
/// `bytes` must be non-zero. A request too large for any `usize` block maps to
/// a class no arena can satisfy.
pub const fn btok(bytes: usize) -> usize {
    debug_assert!(bytes > 0);
    match bytes.checked_add(HEADER_SIZE) {
        Some(total) => pow2_exponent(total),
        None => usize::BITS as usize,
    }
}
