//! Physical Operator Runtime
//!
//! The Volcano `open`/`next`/`close` pull-based execution model, plus a
//! columnar `next(chunk)` variant for a handful of operators
//! ([`vectorized`]). [`PhysicalOperator`] is the one trait every
//! concrete operator in [`operators`] implements; the physical plan
//! generator ([`generate_physical_plan`]) is what turns a
//! [`crate::logical::LogicalPlan`] into a tree of them.

pub mod operators;
pub mod vectorized;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::logical::LogicalPlan;
use crate::storage::Trx;
use crate::tuple::Tuple;
use std::fmt;

/// `CREATED -> OPENED -> (READING)* -> DRAINED -> CLOSED`. Every operator
/// in this tree is driven through exactly this lifecycle; `close` must
/// release child resources even when the last `next()` returned an
/// error, and re-open after close is only meaningful for subqueries and
/// the inner side of a nested-loop join.
pub trait PhysicalOperator: fmt::Debug {
    fn open(&mut self, trx: &dyn Trx) -> Result<()>;
    /// `Ok(())` when a new current tuple is available, `Err` wrapping
    /// [`crate::error::Error::RecordEof`] when drained; any other error
    /// is fatal for the statement. `trx` is threaded through every call,
    /// not just `open`, because a correlated subquery nested under a
    /// predicate re-opens its own operator tree on every outer row.
    fn next(&mut self, trx: &dyn Trx) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn current_tuple(&self) -> Result<Tuple>;

    /// Wires the outer row into this (sub)tree so correlated expressions
    /// can resolve `OuterField` references. A no-op for operators with no
    /// correlated descendants.
    fn set_parent_tuple(&mut self, _parent: Option<Tuple>) {}
}

/// Lowers a logical plan into its physical counterpart. `IndexScan` is
/// chosen over `TableScan` whenever the logical `TableGet`'s pushed-down
/// predicate list contains an equality conjunct on an indexed column;
/// every other logical node has exactly one physical shape. `catalog` is
/// threaded through so that nested subquery expressions - still
/// `Unbound(SelectStmt)` at this point - can be lowered (logical, then
/// physical) right here rather than in a separate recursive pass.
pub fn generate_physical_plan(plan: LogicalPlan, catalog: &Catalog) -> Result<Box<dyn PhysicalOperator>> {
    operators::lower(plan, catalog)
}
