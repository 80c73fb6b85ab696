//! Pushed-down scan predicates.
//!
//! An [`Expr`] arrives from the analytical engine with its constants in the
//! columnar value domain. It is consumed two ways:
//!
//! - [`sql::translate`] renders it as a SQL fragment for a sub-query the row
//!   store executes itself;
//! - [`eval::compile`] binds it to the row-store column types and produces a
//!   [`ValueFilter`] that tests raw datums during a streaming scan.
//!
//! Neither path fails with an error: a shape that cannot be expressed comes
//! back as [`Translation::Unsupported`] and the engine re-applies the filter
//! on the scan output.

pub mod eval;
pub mod expr;
pub mod like;
pub mod literal;
pub mod predicate;
pub mod sql;

pub use eval::{RowValues, ValueFilter, compile};
pub use expr::{CompareOp, Expr, Filter, Operator, PatternKind, PatternTarget};
pub use literal::Literal;
pub use predicate::{Predicate, PredicateValue};
pub use sql::translate;

/// Outcome of lowering a predicate (sub)tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation<T> {
    Pushed(T),
    /// Nothing to apply; the filter was optional and is left to the engine.
    Dropped,
    /// No equivalent form; the caller must recheck downstream.
    Unsupported(String),
}

impl<T> Translation<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Translation<U> {
        match self {
            Translation::Pushed(v) => Translation::Pushed(f(v)),
            Translation::Dropped => Translation::Dropped,
            Translation::Unsupported(r) => Translation::Unsupported(r),
        }
    }

    pub fn pushed(self) -> Option<T> {
        match self {
            Translation::Pushed(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Translation::Unsupported(_))
    }
}
