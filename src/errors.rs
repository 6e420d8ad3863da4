use std::fmt;

use thiserror::Error;

/// Possible errors returned by [`PoolBuilder::build()`].
///
/// [`PoolBuilder::build()`]: super::PoolBuilder::build
#[derive(Clone, Copy, Debug, Error)]
pub enum BuildError {
    /// `max_size` was zero.
    #[error("max_size must be at least 1")]
    ZeroMaxSize,

    /// `max_idle_size` exceeded `max_size`.
    #[error("max_idle_size ({idle}) must not exceed max_size ({max})")]
    IdleExceedsMax {
        /// The rejected `max_idle_size`.
        idle: usize,
        /// The configured `max_size`.
        max: usize,
    },

    /// `max_use_count` was `Some(0)`.
    #[error("max_use_count must be at least 1 when set")]
    ZeroUseCount,
}

/// Possible steps causing the timeout in an error returned by
/// [`Pool::get()`].
///
/// [`Pool::get()`]: super::Pool::get
#[derive(Clone, Copy, Debug)]
pub enum TimeoutType {
    /// Timeout happened while waiting for a slot to become available.
    Wait,

    /// Timeout happened while creating a new resource.
    Create,

    /// Timeout happened while validating an idle resource.
    Validate,
}

/// Possible errors returned by [`Pool::get()`].
///
/// [`Pool::get()`]: super::Pool::get
#[derive(Debug)]
pub enum PoolError<E> {
    /// Timeout happened.
    Timeout(TimeoutType),

    /// The resource factory reported an error.
    Create(E),
}

impl<E> From<E> for PoolError<E> {
    fn from(e: E) -> Self {
        Self::Create(e)
    }
}

impl<E: fmt::Display> fmt::Display for PoolError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(tt) => match tt {
                TimeoutType::Wait => write!(
                    f,
                    "Timeout occurred while waiting for a slot to become available"
                ),
                TimeoutType::Create => {
                    write!(f, "Timeout occurred while creating a new resource")
                }
                TimeoutType::Validate => {
                    write!(f, "Timeout occurred while validating an idle resource")
                }
            },
            Self::Create(e) => write!(f, "Error occurred while creating a new resource: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PoolError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout(_) => None,
            Self::Create(e) => Some(e),
        }
    }
}

/// Possible errors returned by [`Pool::run()`].
///
/// [`Pool::run()`]: super::Pool::run
#[derive(Debug)]
pub enum RunError<E, U> {
    /// Acquisition failed before the caller's function was invoked.
    Pool(PoolError<E>),

    /// The caller's function returned an error, propagated verbatim.
    User(U),
}

impl<E, U> From<PoolError<E>> for RunError<E, U> {
    fn from(e: PoolError<E>) -> Self {
        Self::Pool(e)
    }
}

impl<E: fmt::Display, U: fmt::Display> fmt::Display for RunError<E, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool(e) => e.fmt(f),
            Self::User(e) => e.fmt(f),
        }
    }
}

impl<E, U> std::error::Error for RunError<E, U>
where
    E: std::error::Error + 'static,
    U: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pool(e) => Some(e),
            Self::User(e) => Some(e),
        }
    }
}
