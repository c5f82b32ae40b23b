//! Reusable character regions.

use std::{
    fmt, mem,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::trace;

/// Hands out character regions and takes them back.
///
/// Implementations must be shareable between readers on different threads.
pub trait CharPool: Send + Sync + fmt::Debug {
    /// Returns a region of exactly `len` characters. Contents are unspecified.
    fn rent(&self, len: usize) -> Vec<char>;

    /// Takes back a region previously returned by [`CharPool::rent`].
    fn give_back(&self, region: Vec<char>);
}

/// Default pool: a mutex-guarded free list. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct SharedPool {
    free: Arc<Mutex<Vec<Vec<char>>>>,
}

impl SharedPool {
    /// Upper bound on idle regions kept for reuse.
    const MAX_IDLE: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of idle regions currently held.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl CharPool for SharedPool {
    fn rent(&self, len: usize) -> Vec<char> {
        let reused = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.iter()
                .position(|region| region.capacity() >= len)
                .map(|i| free.swap_remove(i))
        };
        let mut region = reused.unwrap_or_default();
        trace!(len, reused = region.capacity() >= len, "rent region");
        region.clear();
        region.resize(len, '\0');
        region
    }

    fn give_back(&self, region: Vec<char>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(capacity = region.capacity(), idle = free.len(), "return region");
        if free.len() < Self::MAX_IDLE {
            free.push(region);
        }
    }
}

/// A region rented from a [`CharPool`], returned exactly once when dropped.
pub(crate) struct PooledRegion {
    chars: Vec<char>,
    pool: Arc<dyn CharPool>,
}

impl PooledRegion {
    pub(crate) fn rent(pool: Arc<dyn CharPool>, len: usize) -> Self {
        let chars = pool.rent(len);
        Self { chars, pool }
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[char] {
        &self.chars
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [char] {
        &mut self.chars
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.chars.len()
    }
}

impl fmt::Debug for PooledRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledRegion")
            .field("len", &self.chars.len())
            .finish_non_exhaustive()
    }
}

impl Drop for PooledRegion {
    fn drop(&mut self) {
        self.pool.give_back(mem::take(&mut self.chars));
    }
}
