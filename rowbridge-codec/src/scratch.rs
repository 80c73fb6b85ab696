use bumpalo::Bump;

/// Scoped allocation pool for per-batch conversion work.
///
/// Detoasted and decompressed values are materialized here. The pool is
/// reset once per emitted batch, so a value's bytes stay valid only until the
/// batch that used them has been handed off.
#[derive(Default)]
pub struct ScratchPool {
    arena: Bump,
}

impl ScratchPool {
    pub fn new() -> Self {
        Self { arena: Bump::new() }
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            arena: Bump::with_capacity(bytes),
        }
    }

    /// Zero-filled buffer of `len` bytes.
    pub fn alloc_zeroed(&self, len: usize) -> &mut [u8] {
        self.arena.alloc_slice_fill_copy(len, 0u8)
    }

    pub fn copy(&self, bytes: &[u8]) -> &[u8] {
        self.arena.alloc_slice_copy(bytes)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    /// Release everything allocated since the last reset.
    pub fn reset(&mut self) {
        self.arena.reset();
    }
}

impl std::fmt::Debug for ScratchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchPool")
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}
