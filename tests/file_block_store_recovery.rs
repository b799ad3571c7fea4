use param_column_store::block_store::FileBlockStore;
use param_column_store::query::{GroupBy, OrderBy, ReshapeRequest, Select, VecConsumer};
use param_column_store::registry::ColumnStore;
use param_column_store::sample::{ParamId, Sample};
use std::sync::Arc;
use test_log::test;

/// Persisting `{id -> [addr]}` from `close()`
/// against the same block store is sufficient to reconstruct the full
/// history in a fresh registry, exercised against a real file-backed
/// store rather than the in-memory one.
#[test]
fn recovery_round_trips_through_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let block_path = dir.path().join("blocks.db");

    let roots = {
        let store = Arc::new(FileBlockStore::open(&block_path).unwrap());
        let registry = ColumnStore::new(store);
        registry.create_new_column(ParamId(1)).unwrap();

        let mut rescue = Vec::new();
        for ts in 0..500 {
            registry.write(Sample::float(ParamId(1), ts, ts as f64 * 0.5), &mut rescue, None);
        }

        registry.close()
    };

    // Reopen against the same on-disk file, a separate store handle.
    let store = Arc::new(FileBlockStore::open(&block_path).unwrap());
    let registry = ColumnStore::new(store);
    for (&id, addrs) in &roots {
        registry.restore_column(id, addrs.clone()).unwrap();
    }

    let mut consumer = VecConsumer::default();
    registry.query(
        &ReshapeRequest {
            select: Select {
                ids: vec![ParamId(1)],
                begin: 0,
                end: 500,
            },
            order_by: OrderBy::Series,
            group_by: GroupBy::default(),
        },
        &mut consumer,
    );

    assert_eq!(consumer.rows.len(), 500);
    assert_eq!(consumer.rows[0], (ParamId(1), 0, 0.0));
    assert_eq!(consumer.rows[499], (ParamId(1), 499, 249.5));
}
