//! Field-versus-constant comparison predicates, as used by [`Filter`].
//!
//! [`Filter`]: crate::executor::Filter

use basalt::errors::DbError;
use basalt::tuple::{Tuple, Value};

/// Comparison operators a predicate can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Substring containment for text; plain equality for integers.
    Like,
}

/// Compares a designated field of each tuple against a constant.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CmpOp,
    operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CmpOp, operand: Value) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    pub fn operand(&self) -> &Value {
        &self.operand
    }

    /// Does the tuple satisfy this predicate?
    pub fn eval(&self, tuple: &Tuple) -> Result<bool, DbError> {
        compare(tuple.value(self.field)?, self.op, &self.operand)
    }
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool, DbError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(match op {
            CmpOp::Eq | CmpOp::Like => a == b,
            CmpOp::NotEq => a != b,
            CmpOp::Lt => a < b,
            CmpOp::LtEq => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::GtEq => a >= b,
        }),
        (Value::Text(a), Value::Text(b)) => Ok(match op {
            CmpOp::Eq => a == b,
            CmpOp::NotEq => a != b,
            CmpOp::Lt => a < b,
            CmpOp::LtEq => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::GtEq => a >= b,
            CmpOp::Like => a.contains(b.as_str()),
        }),
        _ => Err(DbError::InvalidArgument(format!(
            "cannot compare {:?} with {:?}",
            lhs.field_type(),
            rhs.field_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt::schema::{FieldType, Schema};
    use std::sync::Arc;

    fn row(a: i32, s: &str) -> Tuple {
        let schema = Arc::new(Schema::of_types(&[FieldType::Int, FieldType::Text]).unwrap());
        Tuple::new(schema, vec![Value::Int(a), Value::text(s)]).unwrap()
    }

    #[test]
    fn integer_comparisons() {
        let t = row(5, "x");
        assert!(Predicate::new(0, CmpOp::Eq, Value::Int(5)).eval(&t).unwrap());
        assert!(Predicate::new(0, CmpOp::NotEq, Value::Int(4)).eval(&t).unwrap());
        assert!(Predicate::new(0, CmpOp::Lt, Value::Int(6)).eval(&t).unwrap());
        assert!(Predicate::new(0, CmpOp::GtEq, Value::Int(5)).eval(&t).unwrap());
        assert!(!Predicate::new(0, CmpOp::Gt, Value::Int(5)).eval(&t).unwrap());
        // LIKE degenerates to equality for integers.
        assert!(Predicate::new(0, CmpOp::Like, Value::Int(5)).eval(&t).unwrap());
    }

    #[test]
    fn text_comparisons_and_like() {
        let t = row(1, "database");
        assert!(Predicate::new(1, CmpOp::Like, Value::text("base")).eval(&t).unwrap());
        assert!(!Predicate::new(1, CmpOp::Like, Value::text("bass")).eval(&t).unwrap());
        assert!(Predicate::new(1, CmpOp::Lt, Value::text("z")).eval(&t).unwrap());
        assert!(Predicate::new(1, CmpOp::Eq, Value::text("database")).eval(&t).unwrap());
    }

    #[test]
    fn mismatched_types_are_an_error() {
        let t = row(1, "x");
        let err = Predicate::new(0, CmpOp::Eq, Value::text("1")).eval(&t);
        assert!(matches!(err, Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn out_of_range_field_is_an_error() {
        let t = row(1, "x");
        let err = Predicate::new(9, CmpOp::Eq, Value::Int(1)).eval(&t);
        assert!(matches!(err, Err(DbError::NoSuchElement(_))));
    }
}
