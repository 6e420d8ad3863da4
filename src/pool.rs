use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::{
    alarm::{Alarm, AlarmHandle},
    object::Entry,
    waiters::WaiterQueue,
    Manager, Object, PoolBuilder, PoolConfig, PoolError, PoolMetrics, RunError, Status,
    TimeoutType,
};

/// Generic resource and connection pool.
///
/// This struct can be cloned and transferred across thread boundaries and
/// uses reference counting for its internal state.
pub struct Pool<M: Manager> {
    pub(crate) inner: Arc<PoolInner<M>>,
}

impl<M: Manager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("size", &state.cur_size)
            .field("idle", &state.idle.len())
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Manager> Pool<M> {
    /// Instantiates a builder for a new [`Pool`].
    ///
    /// This is the only way to create a [`Pool`] instance.
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    pub(crate) fn from_builder(builder: PoolBuilder<M>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager: builder.manager,
                config: builder.config,
                alarm: builder.alarm,
                metrics: PoolMetrics::default(),
                state: Mutex::new(PoolState {
                    cur_size: 0,
                    idle: VecDeque::new(),
                    waiters: WaiterQueue::new(),
                    alarm: None,
                }),
            }),
        }
    }

    /// Retrieves an [`Object`] from this [`Pool`] or waits for one to
    /// become available.
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub async fn get(&self) -> Result<Object<M>, PoolError<M::Error>> {
        self.acquire(self.inner.config.timeout, 0.0).await
    }

    /// Retrieves an [`Object`] from this [`Pool`] at the given priority.
    ///
    /// When the pool is full, waiters are served highest priority first
    /// and FIFO within equal priority. [`Pool::get()`] is equivalent to a
    /// priority of `0.0`.
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub async fn get_with_priority(
        &self,
        priority: f64,
    ) -> Result<Object<M>, PoolError<M::Error>> {
        self.acquire(self.inner.config.timeout, priority).await
    }

    /// Retrieves an [`Object`] from this [`Pool`] using a different
    /// `timeout` than the configured one.
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub async fn timeout_get(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Object<M>, PoolError<M::Error>> {
        self.acquire(timeout, 0.0).await
    }

    /// Acquires a resource, runs `f` on it exactly once and releases the
    /// resource before surfacing the result.
    ///
    /// The release runs on every exit path: a resource is health-checked
    /// and repooled (or destroyed) whether `f` succeeds or fails, and the
    /// RAII guard covers panics and cancellation.
    ///
    /// # Errors
    ///
    /// Acquisition failures surface as [`RunError::Pool`]; errors from `f`
    /// propagate verbatim as [`RunError::User`].
    pub async fn run<T, E, F>(&self, f: F) -> Result<T, RunError<M::Error, E>>
    where
        F: for<'c> FnOnce(&'c mut M::Type) -> BoxFuture<'c, Result<T, E>>,
    {
        self.run_prioritized(0.0, f).await
    }

    /// Like [`Pool::run()`], acquiring at the given priority.
    ///
    /// # Errors
    ///
    /// See [`Pool::run()`] for details.
    pub async fn run_prioritized<T, E, F>(
        &self,
        priority: f64,
        f: F,
    ) -> Result<T, RunError<M::Error, E>>
    where
        F: for<'c> FnOnce(&'c mut M::Type) -> BoxFuture<'c, Result<T, E>>,
    {
        let mut obj = self.acquire(self.inner.config.timeout, priority).await?;
        let result = f(&mut *obj).await;
        let (entry, pool) = Object::into_entry(obj);
        if let Some(inner) = pool.upgrade() {
            // The release runs on its own task so that dropping this
            // future mid-release cannot interrupt it.
            let _ = tokio::spawn(async move { inner.release(entry).await }).await;
        }
        result.map_err(RunError::User)
    }

    /// Returns the number of resources this [`Pool`] is currently
    /// accountable for, counting idle, lent out and mid-creation alike.
    ///
    /// The reading is advisory and may be stale by the time it is
    /// observed under concurrency.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.lock().cur_size
    }

    /// Retrieves [`Status`] of this [`Pool`].
    #[must_use]
    pub fn status(&self) -> Status {
        let state = self.inner.state.lock();
        Status {
            max_size: self.inner.config.max_size,
            size: state.cur_size,
            idle: state.idle.len(),
            waiting: state.waiters.len(),
        }
    }

    /// Retrieves the [`PoolMetrics`] of this [`Pool`].
    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.inner.metrics
    }

    /// Returns [`Manager`] of this [`Pool`].
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Gracefully shuts the pool down, destroying every resource.
    ///
    /// Idle resources are freed immediately; resources currently lent out
    /// are collected as their checkouts complete. Returns once the pool
    /// accounts for no resources at all, with any pending idle-expiry
    /// alarm cancelled. Draining again after convergence is a no-op.
    /// Checkouts must not be started concurrently with the completion of
    /// a drain.
    pub async fn drain(&self) {
        let inner = &self.inner;
        loop {
            let step = {
                let mut state = inner.state.lock();
                if state.cur_size == 0 {
                    if let Some(handle) = state.alarm.take() {
                        handle.unschedule();
                    }
                    // Cascade so that a concurrently waiting drain also
                    // gets to observe the empty pool.
                    PoolInner::<M>::wake_one_locked(&mut state);
                    DrainStep::Done
                } else if let Some(entry) = state.idle.pop_front() {
                    state.cur_size -= 1;
                    DrainStep::Free(entry)
                } else {
                    // Everything is lent out; wait like any other acquirer.
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(0.0, tx);
                    DrainStep::Wait(rx)
                }
            };

            match step {
                DrainStep::Done => return,
                DrainStep::Free(entry) => {
                    // Spawned so a cancelled drain cannot interrupt the
                    // destructor; awaited so convergence stays observable.
                    let task = {
                        let inner = Arc::clone(inner);
                        tokio::spawn(async move {
                            inner.manager.free(entry.resource).await;
                            inner.metrics.record_freed();
                        })
                    };
                    let _ = task.await;
                }
                DrainStep::Wait(rx) => {
                    let _ = rx.await;
                }
            }
        }
    }

    async fn acquire(
        &self,
        timeout: Option<Duration>,
        priority: f64,
    ) -> Result<Object<M>, PoolError<M::Error>> {
        let inner = &self.inner;
        let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
        let wait_start = Instant::now();

        loop {
            let step = {
                let mut state = inner.state.lock();
                if let Some(entry) = state.idle.pop_front() {
                    Step::Reuse(entry)
                } else if state.cur_size < inner.config.max_size {
                    state.cur_size += 1;
                    Step::Fill
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(priority, tx);
                    Step::Wait(rx)
                }
            };

            match step {
                Step::Reuse(entry) => {
                    let mut guard = EntryGuard::new(inner, entry);
                    let validated: Result<bool, PoolError<M::Error>> = apply_timeout(
                        TimeoutType::Validate,
                        deadline,
                        async { Ok(inner.manager.validate(guard.resource()).await) },
                    )
                    .await;
                    match validated {
                        Ok(true) => {
                            let entry = guard.into_entry();
                            inner.metrics.record_checkout(wait_start);
                            return Ok(Object::new(entry, inner));
                        }
                        Ok(false) => {
                            tracing::warn!(
                                "pooled resource failed validation, allocating a replacement"
                            );
                            inner.metrics.record_validate_failure();
                            inner.spawn_free(guard.into_entry().resource);
                            // The dropped entry already owed a slot.
                            return self.realloc(deadline, wait_start).await;
                        }
                        // The guard frees the entry and gives its slot up.
                        Err(err) => return Err(err),
                    }
                }
                Step::Fill => return self.realloc(deadline, wait_start).await,
                Step::Wait(rx) => {
                    let mut listener = WaitListener {
                        rx,
                        inner,
                        armed: true,
                    };
                    let waited: Result<(), PoolError<M::Error>> =
                        apply_timeout(TimeoutType::Wait, deadline, async {
                            // Err means the sender was dropped; treat it
                            // as a wake and re-check the state.
                            let _ = (&mut listener.rx).await;
                            Ok(())
                        })
                        .await;
                    match waited {
                        Ok(()) => listener.armed = false,
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Creates a resource for a slot the caller has already reserved.
    async fn realloc(
        &self,
        deadline: Option<Instant>,
        wait_start: Instant,
    ) -> Result<Object<M>, PoolError<M::Error>> {
        let inner = &self.inner;
        let mut slot = SlotGuard {
            inner,
            armed: true,
        };
        let created = apply_timeout(TimeoutType::Create, deadline, async {
            inner.manager.create().await.map_err(PoolError::Create)
        })
        .await;
        match created {
            Ok(resource) => {
                slot.armed = false;
                inner.metrics.record_created();
                inner.metrics.record_checkout(wait_start);
                Ok(Object::new(Entry::new(resource), inner))
            }
            // The guard gives the reserved slot up.
            Err(err) => Err(err),
        }
    }
}

enum Step<T> {
    Reuse(Entry<T>),
    Fill,
    Wait(oneshot::Receiver<()>),
}

enum DrainStep<T> {
    Done,
    Free(Entry<T>),
    Wait(oneshot::Receiver<()>),
}

pub(crate) struct PoolState<T> {
    /// Total resources the pool is accountable for: idle, lent out and
    /// mid-creation.
    cur_size: usize,
    idle: VecDeque<Entry<T>>,
    waiters: WaiterQueue<oneshot::Sender<()>>,
    alarm: Option<AlarmHandle>,
}

pub(crate) struct PoolInner<M: Manager> {
    manager: M,
    config: PoolConfig,
    alarm: Box<dyn Alarm>,
    metrics: PoolMetrics,
    state: Mutex<PoolState<M::Type>>,
}

impl<M: Manager> PoolInner<M> {
    /// Signals the highest-priority live waiter, skipping any that gave
    /// up waiting.
    fn wake_one_locked(state: &mut PoolState<M::Type>) {
        while let Some(tx) = state.waiters.pop() {
            if tx.send(()).is_ok() {
                break;
            }
        }
    }

    fn wake_one(&self) {
        let mut state = self.state.lock();
        Self::wake_one_locked(&mut state);
    }

    /// Gives up a slot the caller reserved or owed, waking one waiter.
    pub(crate) fn abandon_slot(&self) {
        let mut state = self.state.lock();
        state.cur_size -= 1;
        Self::wake_one_locked(&mut state);
    }

    /// Returns a checked-out entry to the pool: destroy it when limits
    /// say so, otherwise hand it to the health check and repool it.
    ///
    /// Callers drive this on a spawned task, never from a cancellable
    /// future: an interrupted release would strand the entry between the
    /// accounting and the destructor.
    pub(crate) async fn release(self: &Arc<Self>, mut entry: Entry<M::Type>) {
        let excess = {
            let mut state = self.state.lock();
            entry.used_count += 1;
            let excess = state.cur_size > self.config.max_idle_size
                || self
                    .config
                    .max_use_count
                    .is_some_and(|n| entry.used_count >= n);
            if excess {
                state.cur_size -= 1;
            }
            excess
        };

        if excess {
            self.manager.free(entry.resource).await;
            self.metrics.record_freed();
            self.wake_one();
        } else if self.manager.check(&mut entry.resource).await {
            let mut state = self.state.lock();
            entry.used_latest = Instant::now();
            state.idle.push_back(entry);
            self.dispose_expiring(&mut state);
            Self::wake_one_locked(&mut state);
        } else {
            tracing::warn!("resource failed its health check and will not be repooled");
            self.metrics.record_check_failure();
            {
                let mut state = self.state.lock();
                state.cur_size -= 1;
                Self::wake_one_locked(&mut state);
            }
            self.manager.free(entry.resource).await;
            self.metrics.record_freed();
        }
    }

    /// Release path for dropped [`Object`]s, which cannot await.
    pub(crate) fn release_detached(self: Arc<Self>, entry: Entry<M::Type>) {
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                drop(rt.spawn(async move { self.release(entry).await }));
            }
            Err(_) => {
                // No runtime to run the release path on; reconcile the
                // accounting and let the resource drop in place (see the
                // `Object` docs).
                let mut state = self.state.lock();
                state.cur_size -= 1;
                Self::wake_one_locked(&mut state);
            }
        }
    }

    /// Frees a resource the pool no longer accounts for.
    fn spawn_free(self: &Arc<Self>, resource: M::Type) {
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let inner = Arc::clone(self);
                drop(rt.spawn(async move {
                    inner.manager.free(resource).await;
                    inner.metrics.record_freed();
                }));
            }
            Err(_) => {
                // No runtime to run the destructor on; the resource is
                // dropped in place (see the `Object` docs).
                drop(resource);
            }
        }
    }

    /// Reconciles the idle-expiry alarm with the head of the idle queue.
    ///
    /// Expired heads are popped and freed; the alarm is scheduled for the
    /// first unexpired head when none is pending. An empty idle queue
    /// leaves any stale alarm alone, since firing it is a no-op.
    fn dispose_expiring(self: &Arc<Self>, state: &mut PoolState<M::Type>) {
        let Some(max_idle_age) = self.config.max_idle_age else {
            if let Some(handle) = state.alarm.take() {
                handle.unschedule();
            }
            return;
        };

        let now = Instant::now();
        loop {
            let expiry = match state.idle.front() {
                None => return,
                Some(head) => match head.used_latest.checked_add(max_idle_age) {
                    Some(expiry) => expiry,
                    None => {
                        tracing::warn!(
                            "idle expiry deadline exceeds the monotonic clock range, \
                             entry kept indefinitely"
                        );
                        return;
                    }
                },
            };

            if expiry <= now {
                if let Some(entry) = state.idle.pop_front() {
                    state.cur_size -= 1;
                    self.spawn_free(entry.resource);
                }
                continue;
            }

            if state.alarm.is_none() {
                let weak = Arc::downgrade(self);
                state.alarm = Some(self.alarm.schedule(
                    expiry,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            let mut state = inner.state.lock();
                            state.alarm = None;
                            inner.dispose_expiring(&mut state);
                        }
                    }),
                ));
            }
            return;
        }
    }
}

/// A queued acquirer. Dropping it mid-wait forwards any wake it may have
/// absorbed, so an abandoned wait never swallows a freed slot.
struct WaitListener<'a, M: Manager> {
    rx: oneshot::Receiver<()>,
    inner: &'a Arc<PoolInner<M>>,
    armed: bool,
}

impl<M: Manager> Drop for WaitListener<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.wake_one();
        }
    }
}

/// An entry held across a suspension point of the acquisition path. If
/// the acquiring future is dropped mid-await, the entry is freed and its
/// slot given up instead of vanishing from the accounting.
struct EntryGuard<'a, M: Manager> {
    inner: &'a Arc<PoolInner<M>>,
    entry: Option<Entry<M::Type>>,
}

impl<'a, M: Manager> EntryGuard<'a, M> {
    fn new(inner: &'a Arc<PoolInner<M>>, entry: Entry<M::Type>) -> Self {
        Self {
            inner,
            entry: Some(entry),
        }
    }

    fn resource(&mut self) -> &mut M::Type {
        &mut self.entry.as_mut().unwrap().resource
    }

    fn into_entry(mut self) -> Entry<M::Type> {
        self.entry.take().unwrap()
    }
}

impl<M: Manager> Drop for EntryGuard<'_, M> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.inner.spawn_free(entry.resource);
            self.inner.abandon_slot();
        }
    }
}

/// A reserved but not yet filled slot. Dropping the guard while still
/// armed gives the slot up, so a factory call abandoned mid-flight never
/// leaks the reservation.
struct SlotGuard<'a, M: Manager> {
    inner: &'a Arc<PoolInner<M>>,
    armed: bool,
}

impl<M: Manager> Drop for SlotGuard<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.abandon_slot();
        }
    }
}

async fn apply_timeout<O, E>(
    timeout_type: TimeoutType,
    deadline: Option<Instant>,
    future: impl Future<Output = Result<O, PoolError<E>>>,
) -> Result<O, PoolError<E>> {
    match deadline {
        None => future.await,
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| PoolError::Timeout(timeout_type))?,
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Default)]
    struct Counting {
        created: AtomicU64,
        freed: AtomicU64,
        validate_failures_left: AtomicI64,
        check_failures_left: AtomicI64,
    }

    #[async_trait]
    impl Manager for Counting {
        type Type = u64;
        type Error = Infallible;

        async fn create(&self) -> Result<u64, Infallible> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn free(&self, _resource: u64) {
            let _ = self.freed.fetch_add(1, Ordering::SeqCst);
        }

        async fn check(&self, _resource: &mut u64) -> bool {
            self.check_failures_left.fetch_sub(1, Ordering::SeqCst) <= 0
        }

        async fn validate(&self, _resource: &mut u64) -> bool {
            self.validate_failures_left.fetch_sub(1, Ordering::SeqCst) <= 0
        }
    }

    fn noop<T>(resource: &mut T) -> futures::future::BoxFuture<'_, Result<(), Infallible>> {
        let _ = resource;
        Box::pin(async { Ok(()) })
    }

    #[tokio::test]
    async fn reuses_released_resources() {
        let counting = Arc::new(Counting::default());
        let pool = Pool::builder(Arc::clone(&counting)).max_size(4).build().unwrap();

        pool.run(noop).await.unwrap();
        pool.run(noop).await.unwrap();

        assert_eq!(counting.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.metrics().checkouts(), 2);
    }

    #[tokio::test]
    async fn validation_failure_allocates_replacement() {
        let counting = Arc::new(Counting {
            validate_failures_left: AtomicI64::new(1),
            ..Counting::default()
        });
        let pool = Pool::builder(Arc::clone(&counting)).max_size(4).build().unwrap();

        pool.run(noop).await.unwrap();
        pool.run(noop).await.unwrap();

        assert_eq!(counting.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.metrics().validate_failures(), 1);

        // The invalidated resource is freed on a spawned task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counting.freed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn health_check_failure_shrinks_pool() {
        let counting = Arc::new(Counting {
            check_failures_left: AtomicI64::new(i64::MAX),
            ..Counting::default()
        });
        let pool = Pool::builder(Arc::clone(&counting)).max_size(4).build().unwrap();

        pool.run(noop).await.unwrap();

        assert_eq!(pool.size(), 0);
        assert_eq!(counting.freed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.metrics().check_failures(), 1);
    }

    #[tokio::test]
    async fn zero_idle_cap_destroys_every_release() {
        let counting = Arc::new(Counting::default());
        let pool = Pool::builder(Arc::clone(&counting))
            .max_size(4)
            .max_idle_size(0)
            .build()
            .unwrap();

        for _ in 0..3 {
            pool.run(noop).await.unwrap();
        }

        assert_eq!(counting.created.load(Ordering::SeqCst), 3);
        assert_eq!(counting.freed.load(Ordering::SeqCst), 3);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn single_slot_serializes_users() {
        let counting = Arc::new(Counting::default());
        let pool = Pool::builder(Arc::clone(&counting)).max_size(1).build().unwrap();
        let in_use = Arc::new(AtomicU64::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let in_use = Arc::clone(&in_use);
            tasks.push(tokio::spawn(async move {
                pool.run(move |resource: &mut u64| {
                    let _ = resource;
                    Box::pin(async move {
                        assert_eq!(in_use.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        assert_eq!(in_use.fetch_sub(1, Ordering::SeqCst), 1);
                        Ok::<_, Infallible>(())
                    })
                })
                .await
                .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counting.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn take_detaches_resource_from_pool() {
        let counting = Arc::new(Counting::default());
        let pool = Pool::builder(Arc::clone(&counting)).max_size(2).build().unwrap();

        let obj = pool.get().await.unwrap();
        let resource = Object::take(obj);
        assert_eq!(resource, 0);
        assert_eq!(pool.size(), 0);

        let obj = pool.get().await.unwrap();
        assert_eq!(*obj, 1);
        drop(obj);
    }

    #[tokio::test]
    async fn status_reports_queued_waiters() {
        let counting = Arc::new(Counting::default());
        let pool = Pool::builder(Arc::clone(&counting)).max_size(1).build().unwrap();

        let held = pool.get().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { drop(pool.get().await.unwrap()) })
        };

        while pool.status().waiting == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let status = pool.status();
        assert_eq!(status.size, 1);
        assert_eq!(status.idle, 0);
        assert_eq!(status.max_size, 1);

        drop(held);
        waiter.await.unwrap();
    }
}
