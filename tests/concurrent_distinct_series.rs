use param_column_store::block_store::InMemoryBlockStore;
use param_column_store::query::{GroupBy, OrderBy, ReshapeRequest, Select, VecConsumer};
use param_column_store::registry::ColumnStore;
use param_column_store::sample::{ParamId, Sample};
use std::sync::Arc;
use test_log::test;

/// N threads each appending to a distinct id
/// commit N * writes_per_thread samples total, all retrievable.
#[test]
fn distinct_series_writes_from_many_threads_are_all_retrievable() {
    const THREADS: u64 = 4;
    const WRITES_PER_THREAD: u64 = 2_000;

    let registry = Arc::new(ColumnStore::new(Arc::new(InMemoryBlockStore::new())));
    for t in 0..THREADS {
        registry.create_new_column(ParamId(t)).unwrap();
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let mut rescue = Vec::new();
                for ts in 0..WRITES_PER_THREAD {
                    registry.write(Sample::float(ParamId(t), ts, t as f64), &mut rescue, None);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut total = 0;
    for t in 0..THREADS {
        let mut consumer = VecConsumer::default();
        registry.query(
            &ReshapeRequest {
                select: Select {
                    ids: vec![ParamId(t)],
                    begin: 0,
                    end: WRITES_PER_THREAD,
                },
                order_by: OrderBy::Series,
                group_by: GroupBy::default(),
            },
            &mut consumer,
        );
        assert_eq!(consumer.rows.len(), WRITES_PER_THREAD as usize);
        total += consumer.rows.len() as u64;
    }

    assert_eq!(total, THREADS * WRITES_PER_THREAD);
}

/// After closing, uncommitted memory is zero and
/// reopening from the returned rescue points yields the full history.
#[test]
fn close_drains_uncommitted_memory_and_recovers_full_history() {
    const THREADS: u64 = 2;
    const WRITES_PER_THREAD: u64 = 100_000;

    let backing = Arc::new(InMemoryBlockStore::new());
    let registry = Arc::new(ColumnStore::new(backing.clone()));
    for t in 0..THREADS {
        registry.create_new_column(ParamId(t)).unwrap();
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let mut rescue = Vec::new();
                for ts in 0..WRITES_PER_THREAD {
                    registry.write(Sample::float(ParamId(t), ts, ts as f64), &mut rescue, None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let roots = registry.close();
    assert_eq!(registry.uncommitted_memory(), 0);

    let fresh = ColumnStore::new(backing);
    for (&id, addrs) in &roots {
        fresh.restore_column(id, addrs.clone()).unwrap();
    }

    let mut total = 0;
    for t in 0..THREADS {
        let mut consumer = VecConsumer::default();
        fresh.query(
            &ReshapeRequest {
                select: Select {
                    ids: vec![ParamId(t)],
                    begin: 0,
                    end: WRITES_PER_THREAD,
                },
                order_by: OrderBy::Series,
                group_by: GroupBy::default(),
            },
            &mut consumer,
        );
        total += consumer.rows.len() as u64;
    }

    assert_eq!(total, THREADS * WRITES_PER_THREAD);
}
