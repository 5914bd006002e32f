use std::sync::Arc;

use basalt::buffer_pool::BufferPool;
use basalt::errors::DbError;
use basalt::heap_file::HeapFileIter;
use basalt::schema::{FieldDef, Schema};
use basalt::transaction::TransactionId;
use basalt::tuple::Tuple;

use super::not_open;

/// Sequential scan over one table, in on-disk order.
///
/// Output field names are prefixed with the table alias
/// (`alias.fieldname`), which keeps columns distinguishable once scans of
/// the same table are combined.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: u32,
    alias: String,
    schema: Arc<Schema>,
    iter: Option<HeapFileIter>,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> Result<Self, DbError> {
        let table_schema = pool.catalog().schema(table_id)?;
        let fields = table_schema
            .fields()
            .map(|f| {
                FieldDef::new(
                    f.field_type,
                    f.name.as_deref().map(|name| format!("{alias}.{name}")),
                )
            })
            .collect();
        let schema = Arc::new(Schema::new(fields)?);
        Ok(Self {
            pool,
            tid,
            table_id,
            alias: alias.to_string(),
            schema,
            iter: None,
        })
    }

    pub fn table_name(&self) -> Result<String, DbError> {
        self.pool.catalog().table_name(self.table_id)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        let file = self.pool.catalog().file(self.table_id)?;
        self.iter = Some(file.iterator(self.pool.clone(), self.tid));
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        let iter = self.iter.as_mut().ok_or_else(not_open)?;
        Ok(iter.next()?.map(|t| t.with_schema(self.schema.clone())))
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        let iter = self.iter.as_mut().ok_or_else(not_open)?;
        iter.rewind();
        Ok(())
    }

    pub fn close(&mut self) {
        self.iter = None;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
