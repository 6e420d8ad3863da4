use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::BuildError;

/// Environment variable overriding the default `max_size`.
pub(crate) const MAX_SIZE_ENV: &str = "CAQTI_POOL_MAX_SIZE";

const FALLBACK_MAX_SIZE: usize = 8;

/// [`Pool`] configuration.
///
/// [`Pool`]: super::Pool
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Maximum number of resources the pool is accountable for at any
    /// moment, counting idle, lent out and mid-creation alike.
    pub max_size: usize,

    /// Maximum number of resources kept around between checkouts. A
    /// release that would leave the pool above this bound destroys the
    /// returned resource instead of repooling it.
    pub max_idle_size: usize,

    /// Number of checkouts after which a resource is destroyed rather
    /// than repooled. `None` means unlimited reuse.
    pub max_use_count: Option<u64>,

    /// Age beyond which an idle resource is destroyed, measured from its
    /// last release. `None` disables idle expiry.
    pub max_idle_age: Option<Duration>,

    /// Timeout applied by [`Pool::get()`] to the wait, create and
    /// validate phases of an acquisition.
    ///
    /// [`Pool::get()`]: super::Pool::get
    pub timeout: Option<Duration>,
}

impl PoolConfig {
    /// Creates a new [`PoolConfig`] with the provided `max_size`, an
    /// equal idle cap, a reuse limit of 100 and no idle expiry.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            max_idle_size: max_size,
            max_use_count: Some(100),
            max_idle_age: None,
            timeout: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.max_size < 1 {
            return Err(BuildError::ZeroMaxSize);
        }
        if self.max_idle_size > self.max_size {
            return Err(BuildError::IdleExceedsMax {
                idle: self.max_idle_size,
                max: self.max_size,
            });
        }
        if self.max_use_count == Some(0) {
            return Err(BuildError::ZeroUseCount);
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Creates a new [`PoolConfig`] with `max_size` taken from the
    /// `CAQTI_POOL_MAX_SIZE` environment variable, falling back to 8.
    fn default() -> Self {
        Self::new(default_max_size())
    }
}

/// The environment is consulted once per process; later changes to the
/// variable are not observed.
fn default_max_size() -> usize {
    static DEFAULT: OnceLock<usize> = OnceLock::new();
    *DEFAULT.get_or_init(|| parse_max_size(std::env::var(MAX_SIZE_ENV).ok().as_deref()))
}

fn parse_max_size(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(FALLBACK_MAX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults() {
        let config = PoolConfig::new(12);
        assert_eq!(config.max_size, 12);
        assert_eq!(config.max_idle_size, 12);
        assert_eq!(config.max_use_count, Some(100));
        assert_eq!(config.max_idle_age, None);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn env_override_parsing() {
        assert_eq!(parse_max_size(None), 8);
        assert_eq!(parse_max_size(Some("3")), 3);
        assert_eq!(parse_max_size(Some(" 17 ")), 17);
        assert_eq!(parse_max_size(Some("0")), 8);
        assert_eq!(parse_max_size(Some("-2")), 8);
        assert_eq!(parse_max_size(Some("eight")), 8);
        assert_eq!(parse_max_size(Some("")), 8);
    }

    #[test]
    fn validation() {
        assert!(PoolConfig::new(1).validate().is_ok());
        assert!(PoolConfig::new(0).validate().is_err());

        let mut config = PoolConfig::new(4);
        config.max_idle_size = 5;
        assert!(config.validate().is_err());
        config.max_idle_size = 0;
        assert!(config.validate().is_ok());

        config.max_use_count = Some(0);
        assert!(config.validate().is_err());
        config.max_use_count = None;
        assert!(config.validate().is_ok());
    }
}
