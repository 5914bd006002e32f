//! # Onyx execution layer
//! Pull-based relational operators over the Basalt storage engine. A query
//! is a tree of operators; pulling the root drives page fetches, locking and
//! mutation through the buffer pool of the transaction the tree runs under.

/// The aggregation operator.
pub mod aggregate_executor;
/// The operator tree and its pull contract.
pub mod executor;
/// Field-versus-constant comparison predicates.
pub mod predicate;

pub use aggregate_executor::{AggOp, Aggregate};
pub use executor::{Delete, Filter, Insert, Operator, SeqScan, Tuples};
pub use predicate::{CmpOp, Predicate};
