//! The aggregation operator.
//!
//! Aggregates one column of the child stream, optionally grouped by another
//! column. Grouping is hash-based and fully materialized on `open`; groups
//! exist only for key values actually observed, so an aggregate over an
//! empty stream yields no rows.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use basalt::errors::DbError;
use basalt::schema::{FieldDef, FieldType, Schema};
use basalt::tuple::{Tuple, Value};

use crate::executor::{not_open, Operator};

/// The supported aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggOp::Min => "MIN",
            AggOp::Max => "MAX",
            AggOp::Sum => "SUM",
            AggOp::Avg => "AVG",
            AggOp::Count => "COUNT",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupState {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl GroupState {
    fn merge(&mut self, value: Option<i32>) {
        self.count += 1;
        if let Some(v) = value {
            self.sum += v as i64;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn result(&self, op: AggOp) -> i32 {
        match op {
            AggOp::Count => self.count as i32,
            AggOp::Sum => self.sum as i32,
            // Integer truncation; a group always has at least one row.
            AggOp::Avg => (self.sum / self.count) as i32,
            AggOp::Min => self.min.unwrap_or(0),
            AggOp::Max => self.max.unwrap_or(0),
        }
    }
}

/// Computes one aggregate over the child stream, grouped by an optional
/// column. Integer columns admit every operator; text columns admit only
/// `COUNT`. The aggregate output column is always an integer.
pub struct Aggregate {
    child: Box<Operator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggOp,
    schema: Arc<Schema>,
    results: Option<std::vec::IntoIter<Tuple>>,
}

impl Aggregate {
    pub fn new(
        child: Operator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggOp,
    ) -> Result<Self, DbError> {
        let child_schema = child.schema();
        let agg_type = child_schema.field_type(agg_field)?;
        if agg_type == FieldType::Text && op != AggOp::Count {
            return Err(DbError::InvalidArgument(format!(
                "text fields support only COUNT, not {op}"
            )));
        }

        let agg_name = format!(
            "{op}({})",
            child_schema.field_name(agg_field)?.unwrap_or("?")
        );
        let mut fields = Vec::new();
        if let Some(g) = group_field {
            fields.push(FieldDef::new(
                child_schema.field_type(g)?,
                child_schema.field_name(g)?.map(str::to_string),
            ));
        }
        fields.push(FieldDef::new(FieldType::Int, Some(agg_name)));
        let schema = Arc::new(Schema::new(fields)?);

        Ok(Self {
            child: Box::new(child),
            agg_field,
            group_field,
            op,
            schema,
            results: None,
        })
    }

    pub fn op(&self) -> AggOp {
        self.op
    }

    /// Drains the child and materializes the per-group results.
    pub fn open(&mut self) -> Result<(), DbError> {
        self.child.open()?;

        let mut groups: HashMap<Option<Value>, GroupState> = HashMap::new();
        while let Some(tuple) = self.child.next()? {
            let key = match self.group_field {
                Some(g) => Some(tuple.value(g)?.clone()),
                None => None,
            };
            let value = match tuple.value(self.agg_field)? {
                Value::Int(v) => Some(*v),
                // Constructor guarantees text only reaches COUNT, which
                // ignores the value.
                Value::Text(_) => None,
            };
            groups.entry(key).or_default().merge(value);
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, state) in groups {
            let mut values = Vec::with_capacity(2);
            if let Some(key) = key {
                values.push(key);
            }
            values.push(Value::Int(state.result(self.op)));
            rows.push(Tuple::new(self.schema.clone(), values)?);
        }
        self.results = Some(rows.into_iter());
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        let results = self.results.as_mut().ok_or_else(not_open)?;
        Ok(results.next())
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if self.results.is_none() {
            return Err(not_open());
        }
        self.close();
        self.open()
    }

    pub fn close(&mut self) {
        self.child.close();
        self.results = None;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
