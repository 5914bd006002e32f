use std::sync::Arc;

use basalt::buffer_pool::BufferPool;
use basalt::errors::DbError;
use basalt::schema::{FieldType, Schema};
use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, Value};

use super::{not_open, Operator};

fn count_schema() -> Arc<Schema> {
    Arc::new(
        Schema::with_names(&[(FieldType::Int, "count")]).expect("static schema is non-empty"),
    )
}

/// Inserts every tuple its child produces into one table, yielding a single
/// one-field tuple with the insert count.
pub struct Insert {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<Operator>,
    table_id: u32,
    schema: Arc<Schema>,
    opened: bool,
    done: bool,
}

impl Insert {
    /// Fails when the child's schema does not match the target table's.
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        child: Operator,
        table_id: u32,
    ) -> Result<Self, DbError> {
        let table_schema = pool.catalog().schema(table_id)?;
        if **child.schema() != *table_schema {
            return Err(DbError::Storage(
                "child schema does not match the table being inserted into".to_string(),
            ));
        }
        Ok(Self {
            pool,
            tid,
            child: Box::new(child),
            table_id,
            schema: count_schema(),
            opened: false,
            done: false,
        })
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        self.child.open()?;
        self.opened = true;
        self.done = false;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.opened {
            return Err(not_open());
        }
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(mut tuple) = self.child.next()? {
            // A tuple pulled out of another scan still carries its old
            // location; the insert assigns a fresh one.
            tuple.set_record_id(None);
            self.pool.insert_tuple(self.tid, self.table_id, &mut tuple)?;
            count += 1;
        }
        Ok(Some(Tuple::new(
            self.schema.clone(),
            vec![Value::Int(count)],
        )?))
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if !self.opened {
            return Err(not_open());
        }
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    pub fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// Deletes every tuple its child produces from the table each one lives in,
/// yielding a single one-field tuple with the delete count.
pub struct Delete {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<Operator>,
    schema: Arc<Schema>,
    opened: bool,
    done: bool,
}

impl Delete {
    pub fn new(pool: Arc<BufferPool>, tid: TransactionId, child: Operator) -> Self {
        Self {
            pool,
            tid,
            child: Box::new(child),
            schema: count_schema(),
            opened: false,
            done: false,
        }
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        self.child.open()?;
        self.opened = true;
        self.done = false;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.opened {
            return Err(not_open());
        }
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        Ok(Some(Tuple::new(
            self.schema.clone(),
            vec![Value::Int(count)],
        )?))
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if !self.opened {
            return Err(not_open());
        }
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    pub fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
