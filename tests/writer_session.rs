use param_column_store::block_store::InMemoryBlockStore;
use param_column_store::query::{GroupBy, OrderBy, ReshapeRequest, Select, VecConsumer};
use param_column_store::registry::ColumnStore;
use param_column_store::sample::{ParamId, Sample};
use param_column_store::session::WriterSession;
use std::sync::Arc;
use test_log::test;

/// A writer session should behave identically to writing through the
/// registry directly, whether or not the series has already been
/// touched by this session (cache miss vs cache hit).
#[test]
fn session_write_matches_direct_registry_write() {
    let registry = ColumnStore::new(Arc::new(InMemoryBlockStore::new()));
    registry.create_new_column(ParamId(1)).unwrap();
    registry.create_new_column(ParamId(2)).unwrap();

    let mut session = WriterSession::new(&registry);
    let mut rescue = Vec::new();

    // First write per id goes through the registry (cache miss).
    session.write(Sample::float(ParamId(1), 1, 1.0), &mut rescue);
    session.write(Sample::float(ParamId(2), 1, 2.0), &mut rescue);

    // Second write per id should hit the session's private cache.
    session.write(Sample::float(ParamId(1), 2, 1.1), &mut rescue);
    session.write(Sample::float(ParamId(2), 2, 2.1), &mut rescue);

    let mut consumer = VecConsumer::default();
    session.query(
        &ReshapeRequest {
            select: Select {
                ids: vec![ParamId(1), ParamId(2)],
                begin: 0,
                end: 1000,
            },
            order_by: OrderBy::Series,
            group_by: GroupBy::default(),
        },
        &mut consumer,
    );

    assert_eq!(
        consumer.rows,
        vec![
            (ParamId(1), 1, 1.0),
            (ParamId(1), 2, 1.1),
            (ParamId(2), 1, 2.0),
            (ParamId(2), 2, 2.1),
        ]
    );
}
