//! Connection-pool lifecycle: reuse, the concurrent-dial race, LRU
//! eviction and removal.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MemoryProvider;
use zest::peer::{PeerPool, Seeder, SeederHandle};
use zest_primitives::{InfoHash, PeerAddr, PeerId, XorbHash};

const TIMEOUT: Duration = Duration::from_secs(5);

fn info_hash() -> InfoHash {
    InfoHash::from_xorb_hash(&XorbHash([0x33; 32]))
}

async fn spawn_seeder() -> (PeerAddr, SeederHandle) {
    let seeder = Seeder::bind(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(MemoryProvider::default()),
        PeerId::generate(),
        6881,
    )
    .await
    .unwrap();
    let addr = PeerAddr::try_from(seeder.local_addr().unwrap()).unwrap();
    (addr, seeder.spawn())
}

#[tokio::test]
async fn a_second_lookup_reuses_the_pooled_connection() {
    let (addr, handle) = spawn_seeder().await;
    let pool = PeerPool::new(8, PeerId::generate(), 6881, TIMEOUT);

    let first = pool.get_or_connect(addr, info_hash()).await.unwrap();
    let second = pool.get_or_connect(addr, info_hash()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(pool.len().await, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn concurrent_dials_to_one_address_converge_on_a_single_entry() {
    let (addr, handle) = spawn_seeder().await;
    let pool = Arc::new(PeerPool::new(8, PeerId::generate(), 6881, TIMEOUT));

    let (first, second) = tokio::join!(
        pool.get_or_connect(addr, info_hash()),
        pool.get_or_connect(addr, info_hash()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Both callers may have dialed; exactly one connection is pooled
    // and later lookups resolve to it.
    assert_eq!(pool.len().await, 1);
    let pooled = pool.get_or_connect(addr, info_hash()).await.unwrap();
    assert!(Arc::ptr_eq(&pooled, &first) || Arc::ptr_eq(&pooled, &second));

    handle.shutdown().await;
}

#[tokio::test]
async fn at_capacity_the_least_recently_used_connection_is_evicted() {
    let (first_addr, first_handle) = spawn_seeder().await;
    let (second_addr, second_handle) = spawn_seeder().await;
    let (third_addr, third_handle) = spawn_seeder().await;
    let pool = PeerPool::new(2, PeerId::generate(), 6881, TIMEOUT);

    pool.get_or_connect(first_addr, info_hash()).await.unwrap();
    pool.get_or_connect(second_addr, info_hash()).await.unwrap();
    // Refresh the first entry so the second becomes the oldest.
    pool.get_or_connect(first_addr, info_hash()).await.unwrap();

    pool.get_or_connect(third_addr, info_hash()).await.unwrap();

    assert_eq!(pool.len().await, 2);
    assert!(pool.contains(first_addr).await);
    assert!(!pool.contains(second_addr).await);
    assert!(pool.contains(third_addr).await);

    first_handle.shutdown().await;
    second_handle.shutdown().await;
    third_handle.shutdown().await;
}

#[tokio::test]
async fn remove_drops_the_entry_and_a_dead_address_fails_the_dial() {
    let (addr, handle) = spawn_seeder().await;
    let pool = PeerPool::new(8, PeerId::generate(), 6881, TIMEOUT);

    pool.get_or_connect(addr, info_hash()).await.unwrap();
    pool.remove(addr).await;
    assert!(pool.is_empty().await);

    // Tear the seeder down; the next dial has nothing to talk to.
    handle.shutdown().await;
    let result = pool.get_or_connect(addr, info_hash()).await;
    assert!(result.is_err());
    assert!(pool.is_empty().await);
}
