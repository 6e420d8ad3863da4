use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use caqti_pool::Object;

type Pool = caqti_pool::Pool<Arc<Tracked>>;

#[derive(Default)]
struct Tracked {
    created: AtomicU64,
    freed: AtomicU64,
}

#[async_trait]
impl caqti_pool::Manager for Tracked {
    type Type = u64;
    type Error = Infallible;

    async fn create(&self) -> Result<u64, Infallible> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn free(&self, _resource: u64) {
        let _ = self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_use_count_exhaustion() {
    let tracked = Arc::new(Tracked::default());
    let pool = Pool::builder(Arc::clone(&tracked))
        .max_size(2)
        .max_use_count(Some(3))
        .build()
        .unwrap();

    for _ in 0..7 {
        pool.run(|_: &mut u64| Box::pin(async { Ok::<_, Infallible>(()) }))
            .await
            .unwrap();
    }

    // Two resources retired after three uses each, a third used once.
    assert_eq!(tracked.created.load(Ordering::SeqCst), 3);
    assert_eq!(tracked.freed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.size(), 1);
}

#[tokio::test]
async fn test_single_use_resources() {
    let tracked = Arc::new(Tracked::default());
    let pool = Pool::builder(Arc::clone(&tracked))
        .max_size(2)
        .max_use_count(Some(1))
        .build()
        .unwrap();

    for _ in 0..5 {
        pool.run(|_: &mut u64| Box::pin(async { Ok::<_, Infallible>(()) }))
            .await
            .unwrap();
    }

    assert_eq!(tracked.created.load(Ordering::SeqCst), 5);
    assert_eq!(tracked.freed.load(Ordering::SeqCst), 5);
    assert_eq!(pool.size(), 0);
}

#[tokio::test]
async fn test_unlimited_reuse() {
    let tracked = Arc::new(Tracked::default());
    let pool = Pool::builder(Arc::clone(&tracked))
        .max_size(2)
        .max_use_count(None)
        .build()
        .unwrap();

    for _ in 0..250 {
        pool.run(|_: &mut u64| Box::pin(async { Ok::<_, Infallible>(()) }))
            .await
            .unwrap();
    }

    assert_eq!(tracked.created.load(Ordering::SeqCst), 1);
    assert_eq!(tracked.freed.load(Ordering::SeqCst), 0);
}

/// A checked-out resource always has spare uses left; the pool retires it
/// before the limit would be crossed.
#[tokio::test]
async fn test_use_count_below_limit_at_checkout() {
    let tracked = Arc::new(Tracked::default());
    let pool = Pool::builder(Arc::clone(&tracked))
        .max_size(1)
        .max_use_count(Some(3))
        .build()
        .unwrap();

    for _ in 0..9 {
        let obj = pool.get().await.unwrap();
        assert!(Object::use_count(&obj) < 3);
        drop(obj);

        // Wait for the spawned release to settle so the next checkout
        // sees a quiescent pool.
        tokio::time::timeout(Duration::from_secs(2), async {
            while pool.status().size != pool.status().idle {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    assert_eq!(tracked.created.load(Ordering::SeqCst), 3);
}
