pub mod aggregate;
pub mod clause;
pub mod evaluator;
pub mod literal;
pub mod value;

pub use aggregate::AggregateExpression;
pub use clause::{Clause, CmpOp, Operand};
pub use evaluator::{evaluate, EvalContext};
pub use value::Value;
