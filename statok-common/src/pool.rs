//! A simple free-list object pool.
//!
//! Digests, metric slots and scratch buffers are recycled between flush
//! cycles so that a steady event stream settles into an allocation-free
//! regime. Pools are safe to share between threads and are cheap enough to
//! keep in `static` items.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A concurrency-safe pool of reusable objects.
///
/// [`get`](Self::get) pops a previously released object or creates a fresh
/// one through the factory; [`put`](Self::put) returns an object to the
/// free list. The pool never shrinks. Callers are responsible for clearing
/// object state before or after release.
pub struct Pool<T> {
    items: Mutex<Vec<T>>,
    factory: fn() -> T,
}

impl<T> Pool<T> {
    /// Creates an empty pool producing objects with `factory`.
    pub const fn new(factory: fn() -> T) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            factory,
        }
    }

    /// Takes an object out of the pool, creating one if none is available.
    pub fn get(&self) -> T {
        let recycled = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        recycled.unwrap_or_else(self.factory)
    }

    /// Returns an object to the pool for later reuse.
    pub fn put(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    /// Returns the number of idle objects currently held by the pool.
    pub fn idle(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("idle", &self.idle()).finish()
    }
}
