//! Pluggable timer behind the pool's idle-age expiry.
//!
//! The pool keeps at most one alarm in flight. Runtimes without timers can
//! supply [`NoopAlarm`], which degrades idle expiry to opportunistic:
//! expired entries are then only collected when a release re-examines the
//! idle queue.

use std::fmt;

use tokio::time::Instant;

/// Callback invoked once when a scheduled alarm fires.
pub type AlarmCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules a single pending callback at a monotonic instant.
pub trait Alarm: Send + Sync + fmt::Debug {
    /// Schedules `callback` to run once at or after `deadline`, on a task
    /// context tied to the runtime the pool lives on.
    ///
    /// The callback must not be invoked from inside `schedule` itself:
    /// the pool calls `schedule` while holding internal locks which the
    /// callback reacquires.
    fn schedule(&self, deadline: Instant, callback: AlarmCallback) -> AlarmHandle;
}

/// Cancellation handle for a scheduled alarm.
///
/// Dropping the handle cancels the alarm, so an alarm pending when its pool
/// is dropped is cancelled automatically. Cancellation does not interrupt a
/// callback that has already started, but guarantees no further observable
/// effect afterwards.
pub struct AlarmHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl AlarmHandle {
    /// Creates a handle which runs `cancel` when unscheduled or dropped.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a handle with nothing to cancel.
    #[must_use]
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    /// Cancels the alarm.
    pub fn unschedule(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for AlarmHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for AlarmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// The default [`Alarm`]: a spawned task sleeping until the deadline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioAlarm;

impl Alarm for TokioAlarm {
    fn schedule(&self, deadline: Instant, callback: AlarmCallback) -> AlarmHandle {
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });
        AlarmHandle::new(move || task.abort())
    }
}

/// An [`Alarm`] that never fires, for runtimes lacking timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAlarm;

impl Alarm for NoopAlarm {
    fn schedule(&self, _deadline: Instant, _callback: AlarmCallback) -> AlarmHandle {
        AlarmHandle::inert()
    }
}
