use std::fmt;
use std::time::Duration;

use crate::alarm::{Alarm, TokioAlarm};
use crate::errors::BuildError;
use crate::{Manager, Pool, PoolConfig};

/// Builder for [`Pool`]s.
///
/// Instances of this are created by calling the [`Pool::builder()`] method.
#[must_use = "builder does nothing itself, use `.build()` to build it"]
pub struct PoolBuilder<M>
where
    M: Manager,
{
    pub(crate) manager: M,
    pub(crate) config: PoolConfig,
    pub(crate) alarm: Box<dyn Alarm>,
}

impl<M> fmt::Debug for PoolBuilder<M>
where
    M: fmt::Debug + Manager,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .field("alarm", &self.alarm)
            .finish()
    }
}

impl<M> PoolBuilder<M>
where
    M: Manager,
{
    pub(crate) fn new(manager: M) -> Self {
        Self {
            manager,
            config: PoolConfig::default(),
            alarm: Box::new(TokioAlarm),
        }
    }

    /// Builds the [`Pool`].
    ///
    /// # Errors
    ///
    /// See [`BuildError`] for details.
    pub fn build(self) -> Result<Pool<M>, BuildError> {
        self.config.validate()?;
        Ok(Pool::from_builder(self))
    }

    /// Sets a [`PoolConfig`] to build the [`Pool`] with.
    pub fn config(mut self, value: PoolConfig) -> Self {
        self.config = value;
        self
    }

    /// Sets the [`PoolConfig::max_size`].
    ///
    /// The idle cap follows the new bound unless
    /// [`max_idle_size`](Self::max_idle_size) was customized, in which
    /// case it is only lowered when it would exceed `value`.
    pub fn max_size(mut self, value: usize) -> Self {
        if self.config.max_idle_size == self.config.max_size {
            self.config.max_idle_size = value;
        } else {
            self.config.max_idle_size = self.config.max_idle_size.min(value);
        }
        self.config.max_size = value;
        self
    }

    /// Sets the [`PoolConfig::max_idle_size`].
    pub fn max_idle_size(mut self, value: usize) -> Self {
        self.config.max_idle_size = value;
        self
    }

    /// Sets the [`PoolConfig::max_use_count`].
    pub fn max_use_count(mut self, value: Option<u64>) -> Self {
        self.config.max_use_count = value;
        self
    }

    /// Sets the [`PoolConfig::max_idle_age`].
    pub fn max_idle_age(mut self, value: Option<Duration>) -> Self {
        self.config.max_idle_age = value;
        self
    }

    /// Sets the [`PoolConfig::timeout`].
    pub fn timeout(mut self, value: Option<Duration>) -> Self {
        self.config.timeout = value;
        self
    }

    /// Sets the [`Alarm`] adapter driving idle-age expiry.
    pub fn alarm(mut self, value: impl Alarm + 'static) -> Self {
        self.alarm = Box::new(value);
        self
    }
}
