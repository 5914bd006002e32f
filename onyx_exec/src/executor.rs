//! The operator tree and its pull contract.
//!
//! Every operator supports `open`, `next`, `rewind`, `close` and `schema`.
//! `next` yields one tuple at a time and `Ok(None)` at end of stream; a
//! closed (or never opened) operator must be opened before it is pulled.
//! The tree is a closed set of tagged variants rather than a trait-object
//! hierarchy, so plans are plain data and dispatch is a match.

use std::sync::Arc;

use basalt::errors::DbError;
use basalt::schema::Schema;
use basalt::tuple::Tuple;

mod dml;
mod filter;
mod scan;

pub use crate::aggregate_executor::Aggregate;
pub use dml::{Delete, Insert};
pub use filter::Filter;
pub use scan::SeqScan;

pub(crate) fn not_open() -> DbError {
    DbError::Storage("operator is not open".to_string())
}

/// One node of an operator tree.
pub enum Operator {
    SeqScan(SeqScan),
    Filter(Filter),
    Insert(Insert),
    Delete(Delete),
    Aggregate(Aggregate),
    Tuples(Tuples),
}

impl Operator {
    pub fn open(&mut self) -> Result<(), DbError> {
        match self {
            Operator::SeqScan(op) => op.open(),
            Operator::Filter(op) => op.open(),
            Operator::Insert(op) => op.open(),
            Operator::Delete(op) => op.open(),
            Operator::Aggregate(op) => op.open(),
            Operator::Tuples(op) => op.open(),
        }
    }

    /// Pulls the next tuple; `Ok(None)` signals end of stream.
    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        match self {
            Operator::SeqScan(op) => op.next(),
            Operator::Filter(op) => op.next(),
            Operator::Insert(op) => op.next(),
            Operator::Delete(op) => op.next(),
            Operator::Aggregate(op) => op.next(),
            Operator::Tuples(op) => op.next(),
        }
    }

    /// Restarts the stream from the beginning.
    pub fn rewind(&mut self) -> Result<(), DbError> {
        match self {
            Operator::SeqScan(op) => op.rewind(),
            Operator::Filter(op) => op.rewind(),
            Operator::Insert(op) => op.rewind(),
            Operator::Delete(op) => op.rewind(),
            Operator::Aggregate(op) => op.rewind(),
            Operator::Tuples(op) => op.rewind(),
        }
    }

    pub fn close(&mut self) {
        match self {
            Operator::SeqScan(op) => op.close(),
            Operator::Filter(op) => op.close(),
            Operator::Insert(op) => op.close(),
            Operator::Delete(op) => op.close(),
            Operator::Aggregate(op) => op.close(),
            Operator::Tuples(op) => op.close(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        match self {
            Operator::SeqScan(op) => op.schema(),
            Operator::Filter(op) => op.schema(),
            Operator::Insert(op) => op.schema(),
            Operator::Delete(op) => op.schema(),
            Operator::Aggregate(op) => op.schema(),
            Operator::Tuples(op) => op.schema(),
        }
    }
}

/// An in-memory tuple source: the leaf for VALUES-style plans and the
/// natural child for operator tests.
pub struct Tuples {
    schema: Arc<Schema>,
    rows: Vec<Tuple>,
    pos: usize,
    opened: bool,
}

impl Tuples {
    pub fn new(schema: Arc<Schema>, rows: Vec<Tuple>) -> Result<Self, DbError> {
        for (i, row) in rows.iter().enumerate() {
            if **row.schema() != *schema {
                return Err(DbError::InvalidArgument(format!(
                    "row {i} does not match the declared schema"
                )));
            }
        }
        Ok(Self {
            schema,
            rows,
            pos: 0,
            opened: false,
        })
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        self.pos = 0;
        self.opened = true;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.opened {
            return Err(not_open());
        }
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let tuple = self.rows[self.pos].clone();
        self.pos += 1;
        Ok(Some(tuple))
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if !self.opened {
            return Err(not_open());
        }
        self.pos = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        self.opened = false;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
