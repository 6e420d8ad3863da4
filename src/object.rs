use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Weak},
};

use tokio::time::Instant;

use crate::{pool::PoolInner, Manager, Pool};

/// A live resource plus its bookkeeping.
pub(crate) struct Entry<T> {
    /// Actual pooled resource.
    pub(crate) resource: T,

    /// Number of completed checkouts.
    pub(crate) used_count: u64,

    /// When this entry was last released to the idle queue.
    pub(crate) used_latest: Instant,
}

impl<T> Entry<T> {
    pub(crate) fn new(resource: T) -> Self {
        Self {
            resource,
            used_count: 0,
            used_latest: Instant::now(),
        }
    }
}

/// Wrapper around the actual pooled resource which implements [`Deref`],
/// [`DerefMut`] and [`Drop`] traits.
///
/// Use this object just as if it was of type `T` and upon leaving a scope
/// the [`Drop::drop()`] will take care of returning it to the pool.
///
/// The return trip runs on a spawned task and therefore needs a tokio
/// runtime. Dropping an [`Object`] outside of one reclaims its slot but
/// skips [`Manager::free`]: the resource is dropped in place without
/// reaching its destructor. Drop checkouts inside the runtime, or use
/// [`Pool::run`], to keep the full destructor contract.
#[must_use]
pub struct Object<M: Manager> {
    /// The checked-out entry.
    entry: Option<Entry<M::Type>>,

    /// Pool to return the entry to.
    pool: Weak<PoolInner<M>>,
}

impl<M> fmt::Debug for Object<M>
where
    M: fmt::Debug + Manager,
    M::Type: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("resource", &self.entry.as_ref().map(|e| &e.resource))
            .finish()
    }
}

impl<M: Manager> Object<M> {
    pub(crate) fn new(entry: Entry<M::Type>, pool: &Arc<PoolInner<M>>) -> Self {
        Self {
            entry: Some(entry),
            pool: Arc::downgrade(pool),
        }
    }

    /// Takes this [`Object`] from its [`Pool`] permanently. This reduces
    /// the size of the [`Pool`] and wakes one queued acquirer, which may
    /// then allocate a replacement.
    #[must_use]
    pub fn take(mut this: Self) -> M::Type {
        let entry = this.entry.take().unwrap();
        if let Some(pool) = this.pool.upgrade() {
            pool.abandon_slot();
        }
        entry.resource
    }

    /// Number of checkouts this resource had completed before the current
    /// one.
    #[must_use]
    pub fn use_count(this: &Self) -> u64 {
        this.entry.as_ref().unwrap().used_count
    }

    /// Returns the [`Pool`] this [`Object`] belongs to.
    ///
    /// Since [`Object`]s only hold a [`Weak`] reference to the [`Pool`]
    /// they come from, this can fail and return [`None`] instead.
    pub fn pool(this: &Self) -> Option<Pool<M>> {
        this.pool.upgrade().map(|inner| Pool { inner })
    }

    pub(crate) fn into_entry(mut this: Self) -> (Entry<M::Type>, Weak<PoolInner<M>>) {
        let entry = this.entry.take().unwrap();
        let pool = std::mem::replace(&mut this.pool, Weak::new());
        (entry, pool)
    }
}

impl<M: Manager> Drop for Object<M> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release_detached(entry);
            }
        }
    }
}

impl<M: Manager> Deref for Object<M> {
    type Target = M::Type;
    fn deref(&self) -> &M::Type {
        &self.entry.as_ref().unwrap().resource
    }
}

impl<M: Manager> DerefMut for Object<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry.as_mut().unwrap().resource
    }
}

impl<M: Manager> AsRef<M::Type> for Object<M> {
    fn as_ref(&self) -> &M::Type {
        self
    }
}

impl<M: Manager> AsMut<M::Type> for Object<M> {
    fn as_mut(&mut self) -> &mut M::Type {
        self
    }
}
