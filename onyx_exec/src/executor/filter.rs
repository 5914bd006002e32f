use std::sync::Arc;

use basalt::errors::DbError;
use basalt::schema::Schema;
use basalt::tuple::Tuple;

use super::{not_open, Operator};
use crate::predicate::Predicate;

/// Relational select: forwards the child's tuples that satisfy a predicate.
pub struct Filter {
    predicate: Predicate,
    child: Box<Operator>,
    opened: bool,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Operator) -> Self {
        Self {
            predicate,
            child: Box::new(child),
            opened: false,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.opened {
            return Err(not_open());
        }
        while let Some(tuple) = self.child.next()? {
            if self.predicate.eval(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if !self.opened {
            return Err(not_open());
        }
        self.child.rewind()
    }

    pub fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Tuples;
    use crate::predicate::CmpOp;
    use basalt::schema::FieldType;
    use basalt::tuple::Value;

    fn rows(values: &[i32]) -> Operator {
        let schema = Arc::new(Schema::of_types(&[FieldType::Int]).unwrap());
        let rows = values
            .iter()
            .map(|&v| Tuple::new(schema.clone(), vec![Value::Int(v)]).unwrap())
            .collect();
        Operator::Tuples(Tuples::new(schema, rows).unwrap())
    }

    fn drain(op: &mut Filter) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(t) = op.next().unwrap() {
            let Value::Int(v) = *t.value(0).unwrap() else {
                panic!("expected int");
            };
            out.push(v);
        }
        out
    }

    #[test]
    fn forwards_only_matching_tuples() {
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::Gt, Value::Int(2)),
            rows(&[1, 2, 3, 4]),
        );
        filter.open().unwrap();
        assert_eq!(drain(&mut filter), vec![3, 4]);
    }

    #[test]
    fn no_matches_is_an_empty_stream() {
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::Eq, Value::Int(99)),
            rows(&[1, 2, 3]),
        );
        filter.open().unwrap();
        assert!(filter.next().unwrap().is_none());
    }

    #[test]
    fn rewind_replays_the_matches() {
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::LtEq, Value::Int(2)),
            rows(&[1, 2, 3]),
        );
        filter.open().unwrap();
        assert_eq!(drain(&mut filter), vec![1, 2]);
        filter.rewind().unwrap();
        assert_eq!(drain(&mut filter), vec![1, 2]);
    }
}
