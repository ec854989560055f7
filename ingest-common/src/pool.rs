//! Reusable object pools for buffers and parsing contexts.
//!
//! A [`Pool`] hands out objects through [`Pooled`] guards. When a guard goes out of scope, the
//! object is [reset](Reset::reset) and returned to the pool, so that its allocations can be reused
//! by the next request. This happens on every exit path, including early returns on errors.
//!
//! Pools have two tiers:
//!
//!  1. A bounded fast tier backed by a lock-free channel. Objects are taken from and returned to
//!     this tier first.
//!  2. An overflow tier behind a mutex, which absorbs objects that do not fit into the fast tier
//!     during bursts of concurrent requests.
//!
//! ```
//! use ingest_common::Pool;
//!
//! let pool = Pool::new("buffers", 4, Vec::<u8>::new);
//!
//! let mut buf = pool.get();
//! buf.extend_from_slice(b"hello");
//! drop(buf);
//!
//! assert!(pool.get().is_empty());
//! ```

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use crossbeam_channel::{Receiver, Sender};
use ingest_statsd::metric;
use parking_lot::Mutex;

use crate::statsd::PoolCounters;

/// An object that can be returned to a [`Pool`].
///
/// Resetting must leave the object indistinguishable from a freshly created one, while retaining
/// allocated capacity where possible.
pub trait Reset {
    /// Clears all contents of this object.
    fn reset(&mut self);
}

impl<T> Reset for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A two-tier pool of reusable objects.
///
/// Objects are created lazily with the pool's factory function when both tiers are empty. The pool
/// is `Send + Sync` if `T` is `Send`, and can be shared across request handlers.
pub struct Pool<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    overflow: Mutex<Vec<T>>,
    create: fn() -> T,
}

impl<T: Reset> Pool<T> {
    /// Creates a new pool with the given fast tier `capacity`.
    ///
    /// The `name` is used to tag internal metrics. A capacity of zero is raised to one.
    pub fn new(name: &'static str, capacity: usize, create: fn() -> T) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));

        Self {
            name,
            tx,
            rx,
            overflow: Mutex::new(Vec::new()),
            create,
        }
    }

    /// Returns the name of this pool.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Checks an object out of the pool.
    ///
    /// The object is empty. It is returned to the pool when the guard is dropped.
    pub fn get(&self) -> Pooled<'_, T> {
        let (value, tier) = match self.rx.try_recv() {
            Ok(value) => (value, "fast"),
            Err(_) => match self.overflow.lock().pop() {
                Some(value) => (value, "overflow"),
                None => ((self.create)(), "new"),
            },
        };

        metric!(
            counter(PoolCounters::Acquire) += 1,
            pool = self.name,
            tier = tier,
        );

        Pooled {
            pool: self,
            value: ManuallyDrop::new(value),
        }
    }

    /// Resets the object and puts it back into the first tier that has space.
    fn release(&self, mut value: T) {
        value.reset();

        if let Err(error) = self.tx.try_send(value) {
            self.overflow.lock().push(error.into_inner());
        }
    }

    /// Returns the number of idle objects held by this pool across both tiers.
    pub fn idle(&self) -> usize {
        self.rx.len() + self.overflow.lock().len()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("capacity", &self.tx.capacity())
            .finish_non_exhaustive()
    }
}

/// An object checked out of a [`Pool`].
///
/// Dereferences to the pooled object. Dropping the guard resets the object and returns it.
pub struct Pooled<'p, T: Reset> {
    pool: &'p Pool<T>,
    value: ManuallyDrop<T>,
}

impl<T: Reset> Pooled<'_, T> {
    /// Detaches the object from the pool.
    ///
    /// The object will not be returned to the pool.
    pub fn into_inner(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the value is taken exactly once.
        unsafe { ManuallyDrop::take(&mut this.value) }
    }
}

impl<T: Reset> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Reset> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T: Reset + fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: Reset> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `drop` runs at most once and the value is not accessed afterwards.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.pool.release(value);
    }
}
