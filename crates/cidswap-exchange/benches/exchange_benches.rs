//! Criterion benchmarks for cidswap-exchange hot paths.
//!
//! Covers: provide bridge throughput, active-query claim/release, and
//! rebroadcast selection over a populated want-list.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cidswap_core::types::ContentId;
use cidswap_exchange::{ActiveQuerySet, ProvideQueueBridge, RebroadcastScheduler, WantList};

fn ids(n: u64) -> Vec<ContentId> {
    (0..n).map(|i| ContentId::of(&i.to_le_bytes())).collect()
}

fn bench_bridge_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let batch = ids(1_000);

    // Push a burst of 1000 ids through the bridge and drain them on the far side.
    c.bench_function("bridge_1000_ids", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, rx) = mpsc::channel(batch.len());
            let (bridge, mut out) = ProvideQueueBridge::new(rx);
            let task = tokio::spawn(bridge.run(CancellationToken::new()));
            for cid in &batch {
                tx.send(*cid).await.unwrap();
            }
            drop(tx);
            let mut n = 0;
            while let Some(cid) = out.recv().await {
                black_box(cid);
                n += 1;
            }
            task.await.unwrap();
            assert_eq!(n, batch.len());
        })
    });
}

fn bench_query_claim(c: &mut Criterion) {
    let set = ActiveQuerySet::new();
    let cid = ContentId::of(b"bench");

    c.bench_function("active_query_claim_release", |b| {
        b.iter(|| {
            let guard = set.try_acquire(black_box(cid));
            black_box(guard.is_some());
        })
    });
}

fn bench_rebroadcast_pick(c: &mut Criterion) {
    let wantlist = Arc::new(WantList::new());
    let root = CancellationToken::new();
    for cid in ids(1_000) {
        wantlist.add(cid, 0, &root);
    }
    let (tx, _rx) = mpsc::channel(1);
    let mut scheduler = RebroadcastScheduler::new(
        Arc::clone(&wantlist),
        tx,
        Duration::from_secs(60),
        Duration::from_secs(10),
        Some(1),
    );

    c.bench_function("rebroadcast_pick_1000_wants", |b| {
        b.iter(|| black_box(scheduler.pick()))
    });
}

criterion_group!(
    benches,
    bench_bridge_throughput,
    bench_query_claim,
    bench_rebroadcast_pick,
);
criterion_main!(benches);
