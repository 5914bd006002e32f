use basalt::errors::DbError;
use basalt::schema::FieldType;
use basalt::transaction::TransactionId;
use basalt::tuple::Value;
use onyx_exec::{AggOp, Aggregate, Operator, SeqScan};

mod common;

fn sales_table(db: &common::TestDb) -> u32 {
    let table = db.create_table(
        "sales",
        &[(FieldType::Int, "region"), (FieldType::Int, "amount")],
    );
    db.seed_rows(
        table,
        [(1, 100), (1, 200), (2, 50), (2, 70), (2, 30), (3, 999)]
            .iter()
            .map(|&(r, a)| vec![Value::Int(r), Value::Int(a)])
            .collect(),
    );
    table
}

fn aggregate_over_scan(
    db: &common::TestDb,
    table: u32,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggOp,
) -> Vec<Vec<i32>> {
    let tid = TransactionId::new();
    let scan = SeqScan::new(db.pool.clone(), tid, table, "s").unwrap();
    let mut agg =
        Operator::Aggregate(Aggregate::new(Operator::SeqScan(scan), agg_field, group_field, op).unwrap());
    agg.open().unwrap();
    let mut rows = Vec::new();
    while let Some(tuple) = agg.next().unwrap() {
        rows.push(
            tuple
                .values()
                .iter()
                .map(|v| match v {
                    Value::Int(i) => *i,
                    Value::Text(_) => panic!("expected integer output"),
                })
                .collect::<Vec<i32>>(),
        );
    }
    agg.close();
    db.pool.transaction_complete(tid, true).unwrap();
    rows.sort_unstable();
    rows
}

#[test]
fn ungrouped_aggregates_over_a_scan() {
    let db = common::setup();
    let table = sales_table(&db);

    assert_eq!(aggregate_over_scan(&db, table, 1, None, AggOp::Count), vec![vec![6]]);
    assert_eq!(aggregate_over_scan(&db, table, 1, None, AggOp::Sum), vec![vec![1449]]);
    assert_eq!(aggregate_over_scan(&db, table, 1, None, AggOp::Min), vec![vec![30]]);
    assert_eq!(aggregate_over_scan(&db, table, 1, None, AggOp::Max), vec![vec![999]]);
    // 1449 / 6 truncates to 241.
    assert_eq!(aggregate_over_scan(&db, table, 1, None, AggOp::Avg), vec![vec![241]]);
}

#[test]
fn grouped_aggregates_over_a_scan() {
    let db = common::setup();
    let table = sales_table(&db);

    assert_eq!(
        aggregate_over_scan(&db, table, 1, Some(0), AggOp::Sum),
        vec![vec![1, 300], vec![2, 150], vec![3, 999]]
    );
    assert_eq!(
        aggregate_over_scan(&db, table, 1, Some(0), AggOp::Count),
        vec![vec![1, 2], vec![2, 3], vec![3, 1]]
    );
    assert_eq!(
        aggregate_over_scan(&db, table, 1, Some(0), AggOp::Avg),
        vec![vec![1, 150], vec![2, 50], vec![3, 999]]
    );
}

#[test]
fn counting_a_text_column_through_a_scan() {
    let db = common::setup();
    let table = db.create_table(
        "people",
        &[(FieldType::Text, "name"), (FieldType::Int, "age")],
    );
    db.seed_rows(
        table,
        ["ada", "grace", "edsger"]
            .iter()
            .map(|&n| vec![Value::text(n), Value::Int(0)])
            .collect(),
    );

    let tid = TransactionId::new();
    let scan = SeqScan::new(db.pool.clone(), tid, table, "p").unwrap();
    let mut agg = Operator::Aggregate(
        Aggregate::new(Operator::SeqScan(scan), 0, None, AggOp::Count).unwrap(),
    );
    agg.open().unwrap();
    let row = agg.next().unwrap().expect("one aggregate row");
    assert_eq!(row.value(0).unwrap(), &Value::Int(3));
    agg.close();
    db.pool.transaction_complete(tid, true).unwrap();
}

#[test]
fn text_columns_reject_everything_but_count() {
    let db = common::setup();
    let table = db.create_table(
        "people",
        &[(FieldType::Text, "name"), (FieldType::Int, "age")],
    );

    let tid = TransactionId::new();
    let scan = SeqScan::new(db.pool.clone(), tid, table, "p").unwrap();
    let err = Aggregate::new(Operator::SeqScan(scan), 0, None, AggOp::Min);
    assert!(matches!(err, Err(DbError::InvalidArgument(_))));
    db.pool.transaction_complete(tid, true).unwrap();
}

#[test]
fn aggregate_over_an_empty_table_yields_nothing() {
    let db = common::setup();
    let table = db.create_table("empty", &[(FieldType::Int, "v")]);

    let tid = TransactionId::new();
    let scan = SeqScan::new(db.pool.clone(), tid, table, "e").unwrap();
    let mut agg = Operator::Aggregate(
        Aggregate::new(Operator::SeqScan(scan), 0, Some(0), AggOp::Sum).unwrap(),
    );
    agg.open().unwrap();
    assert!(agg.next().unwrap().is_none());
    agg.close();
    db.pool.transaction_complete(tid, true).unwrap();
}
