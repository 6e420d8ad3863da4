use std::{convert::Infallible, time::Duration};

use async_trait::async_trait;

use caqti_pool::{PoolConfig, PoolError, TimeoutType};

type Pool = caqti_pool::Pool<Manager>;

struct Manager {}

#[async_trait]
impl caqti_pool::Manager for Manager {
    type Type = usize;
    type Error = Infallible;

    async fn create(&self) -> Result<usize, Infallible> {
        std::future::pending().await
    }

    async fn free(&self, _resource: usize) {}
}

#[tokio::test]
async fn test_create_timeout() {
    let mut cfg = PoolConfig::new(16);
    cfg.timeout = Some(Duration::from_millis(0));
    let pool = Pool::builder(Manager {}).config(cfg).build().unwrap();

    assert!(matches!(pool.get().await, Err(PoolError::Timeout(_))));
}

struct Ready;

#[async_trait]
impl caqti_pool::Manager for Ready {
    type Type = usize;
    type Error = Infallible;

    async fn create(&self) -> Result<usize, Infallible> {
        Ok(0)
    }

    async fn free(&self, _resource: usize) {}
}

#[tokio::test]
async fn test_wait_timeout_leaks_no_slot() {
    let pool = caqti_pool::Pool::builder(Ready).max_size(1).build().unwrap();

    let held = pool.get().await.unwrap();
    let waited = pool.timeout_get(Some(Duration::from_millis(50))).await;
    assert!(matches!(
        waited,
        Err(PoolError::Timeout(TimeoutType::Wait))
    ));

    // The timed-out waiter must not have consumed the slot.
    drop(held);
    let again = tokio::time::timeout(Duration::from_secs(2), pool.get())
        .await
        .expect("pool must recover after a wait timeout")
        .unwrap();
    drop(again);

    assert_eq!(pool.size(), 1);
}
