#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]
#![warn(clippy::pedantic)]
#![warn(
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]
#![allow(
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::match_same_arms
)]

mod alarm;
mod builder;
mod config;
mod errors;
mod metrics;
mod object;
mod pool;
mod waiters;

pub use self::{
    alarm::{Alarm, AlarmCallback, AlarmHandle, NoopAlarm, TokioAlarm},
    builder::PoolBuilder,
    config::PoolConfig,
    errors::{BuildError, PoolError, RunError, TimeoutType},
    metrics::PoolMetrics,
    object::Object,
    pool::Pool,
};

use std::sync::Arc;

use async_trait::async_trait;

/// The current pool status.
#[derive(Clone, Copy, Debug)]
pub struct Status {
    /// The maximum size of the pool.
    pub max_size: usize,

    /// The number of resources the pool is currently accountable for,
    /// counting idle, lent out and mid-creation alike.
    pub size: usize,

    /// The number of released resources awaiting their next checkout.
    pub idle: usize,

    /// The number of acquirers currently queued for a resource.
    pub waiting: usize,
}

/// Manager responsible for creating, probing and destroying the resources
/// held by a [`Pool`].
///
/// The pool never holds its internal lock across any of these calls, and a
/// resource passed to any of them is exclusively owned for the duration of
/// the call.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// Type of resource that this [`Manager`] creates and destroys.
    type Type: Send + 'static;

    /// Error that this [`Manager`] can return when creating a resource.
    type Error: Send + 'static;

    /// Creates a new resource.
    async fn create(&self) -> Result<Self::Type, Self::Error>;

    /// Destroys a resource for good.
    ///
    /// Implementations absorb and log their own failures; the pool treats
    /// this call as infallible.
    async fn free(&self, resource: Self::Type);

    /// Post-use health probe, run before a released resource is repooled.
    ///
    /// Returning `false` destroys the resource instead of repooling it.
    async fn check(&self, resource: &mut Self::Type) -> bool {
        let _ = resource;
        true
    }

    /// Pre-checkout probe, run on an idle resource before lending it out.
    ///
    /// Returning `false` drops the resource and allocates a replacement.
    async fn validate(&self, resource: &mut Self::Type) -> bool {
        let _ = resource;
        true
    }
}

#[async_trait]
impl<M: Manager> Manager for Arc<M> {
    type Type = M::Type;
    type Error = M::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.as_ref().create().await
    }

    async fn free(&self, resource: Self::Type) {
        self.as_ref().free(resource).await;
    }

    async fn check(&self, resource: &mut Self::Type) -> bool {
        self.as_ref().check(resource).await
    }

    async fn validate(&self, resource: &mut Self::Type) -> bool {
        self.as_ref().validate(resource).await
    }
}
