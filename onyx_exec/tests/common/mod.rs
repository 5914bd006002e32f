#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use basalt::buffer_pool::BufferPool;
use basalt::catalog::Catalog;
use basalt::heap_file::HeapFile;
use basalt::schema::{FieldType, Schema};
use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, Value};
use basalt::wal::WalFile;
use onyx_exec::{Operator, SeqScan};
use tempfile::{tempdir, TempDir};

/// A scratch database in a temp directory: catalog, WAL and buffer pool
/// wired together the way an embedding application would.
pub struct TestDb {
    pub catalog: Arc<Catalog>,
    pub pool: Arc<BufferPool>,
    dir: TempDir,
}

pub fn setup() -> TestDb {
    setup_with(50, Duration::from_millis(500))
}

pub fn setup_with(capacity: usize, lock_timeout: Duration) -> TestDb {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::new());
    let log = Arc::new(WalFile::open(dir.path().join("onyx.wal")).unwrap());
    let pool = Arc::new(BufferPool::with_config(
        capacity,
        lock_timeout,
        catalog.clone(),
        log,
    ));
    TestDb { catalog, pool, dir }
}

impl TestDb {
    pub fn create_table(&self, name: &str, columns: &[(FieldType, &str)]) -> u32 {
        let schema = Arc::new(Schema::with_names(columns).unwrap());
        let file = Arc::new(
            HeapFile::open(self.dir.path().join(format!("{name}.dat")), schema).unwrap(),
        );
        let table_id = file.id();
        self.catalog.add_table(file, name);
        table_id
    }

    /// Builds a tuple against the table's schema.
    pub fn tuple(&self, table_id: u32, values: Vec<Value>) -> Tuple {
        Tuple::new(self.catalog.schema(table_id).unwrap(), values).unwrap()
    }

    /// Inserts the rows in one transaction and commits it.
    pub fn seed_rows(&self, table_id: u32, rows: Vec<Vec<Value>>) {
        let tid = TransactionId::new();
        for values in rows {
            let mut tuple = self.tuple(table_id, values);
            self.pool.insert_tuple(tid, table_id, &mut tuple).unwrap();
        }
        self.pool.transaction_complete(tid, true).unwrap();
    }

    /// Scans one integer column under a fresh committed transaction and
    /// returns it sorted.
    pub fn scan_int_column(&self, table_id: u32, column: usize) -> Vec<i32> {
        let tid = TransactionId::new();
        let mut scan = Operator::SeqScan(
            SeqScan::new(self.pool.clone(), tid, table_id, "s").unwrap(),
        );
        scan.open().unwrap();
        let mut out = Vec::new();
        while let Some(tuple) = scan.next().unwrap() {
            let Value::Int(v) = *tuple.value(column).unwrap() else {
                panic!("expected an integer column");
            };
            out.push(v);
        }
        scan.close();
        self.pool.transaction_complete(tid, true).unwrap();
        out.sort_unstable();
        out
    }
}
