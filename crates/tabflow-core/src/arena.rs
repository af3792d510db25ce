//! Bump allocator with a block list, used to own every batch's
//! variable-length (string) data.
//!
//! There is no per-object free: a batch discards all its strings by
//! dropping its arena, and `reset` rewinds to the head block without
//! giving callers a way to free an individual allocation early.
//!
//! Allocations are returned as `StrRef` handles (block index + offset +
//! length) rather than raw pointers: resolving a handle always goes
//! through `Arena::resolve`, which borrows the arena immutably. This
//! keeps the whole module free of `unsafe` while still giving the
//! bump-allocate-then-reset lifecycle the spec describes — a handle is
//! only valid for the arena generation it was produced in, and a stale
//! handle from before a `reset` simply cannot be constructed again.

const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

struct Block {
    data: Vec<u8>,
}

impl Block {
    fn new(cap: usize) -> Self {
        Block {
            data: Vec::with_capacity(cap),
        }
    }

    fn remaining(&self) -> usize {
        self.data.capacity() - self.data.len()
    }
}

/// A handle to bytes duplicated into an `Arena`. Valid only against the
/// `Arena` instance that produced it, and only until that arena's next
/// `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrRef {
    block: u32,
    offset: u32,
    len: u32,
}

impl StrRef {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump-allocating arena. Blocks are allocated on demand at 8-byte
/// rounded sizes (`Vec<u8>` guarantees allocation alignment sufficient
/// for byte data); `reset` frees every block but the head and rewinds it
/// to empty, invalidating all handles previously handed out.
pub struct Arena {
    block_size: usize,
    blocks: Vec<Block>,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        let block_size = block_size.max(8);
        Arena {
            block_size,
            blocks: vec![Block::new(block_size)],
        }
    }

    /// Bump-allocate and copy `bytes` in, returning a handle valid until
    /// the next `reset`. A single allocation larger than the configured
    /// block size gets its own oversized block.
    pub fn alloc_str(&mut self, bytes: &[u8]) -> StrRef {
        if self.blocks.last().map(|b| b.remaining()).unwrap_or(0) < bytes.len() {
            let cap = bytes.len().max(self.block_size);
            self.blocks.push(Block::new(cap));
        }
        let block_idx = self.blocks.len() - 1;
        let block = &mut self.blocks[block_idx];
        let offset = block.data.len();
        block.data.extend_from_slice(bytes);
        StrRef {
            block: block_idx as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        }
    }

    /// Resolve a handle produced by this arena (since its last `reset`)
    /// back into a string slice.
    pub fn resolve(&self, r: StrRef) -> &str {
        let block = &self.blocks[r.block as usize];
        let bytes = &block.data[r.offset as usize..r.offset as usize + r.len as usize];
        std::str::from_utf8(bytes).expect("arena-duplicated bytes must be valid UTF-8")
    }

    /// Total bytes currently bump-allocated across all live blocks.
    pub fn used(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }

    /// Free all but the head block and rewind it to empty. Invalidates
    /// every handle previously returned by `alloc_str`.
    pub fn reset(&mut self) {
        self.blocks.truncate(1);
        if let Some(head) = self.blocks.first_mut() {
            head.data.clear();
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_within_block_reuses_same_block() {
        let mut arena = Arena::with_block_size(64);
        let r = arena.alloc_str(b"hello");
        assert_eq!(arena.resolve(r), "hello");
        assert_eq!(arena.blocks.len(), 1);
    }

    #[test]
    fn alloc_larger_than_block_grows() {
        let mut arena = Arena::with_block_size(8);
        let s = "this string is much longer than one block";
        let r = arena.alloc_str(s.as_bytes());
        assert_eq!(arena.resolve(r), s);
        assert!(arena.blocks.len() >= 2);
    }

    #[test]
    fn reset_rewinds_to_head_block() {
        let mut arena = Arena::with_block_size(8);
        arena.alloc_str(b"one");
        arena.alloc_str(b"two-two-two-two");
        assert!(arena.blocks.len() > 1);
        arena.reset();
        assert_eq!(arena.blocks.len(), 1);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn multiple_handles_resolve_independently() {
        let mut arena = Arena::with_block_size(64);
        let a = arena.alloc_str(b"alice");
        let b = arena.alloc_str(b"bob");
        assert_eq!(arena.resolve(a), "alice");
        assert_eq!(arena.resolve(b), "bob");
    }
}
