//! Tuple & Chunk Abstraction
//!
//! Row- and column-oriented views over the values an operator pipeline
//! passes between stages.
//!
//! ```text
//!   TableScan --(Tuple)--> Predicate --(Tuple)--> Project --(Tuple)--> caller
//!       |
//!       +--(Chunk)--> TableScanVec --(Chunk)--> ProjectVec --(Chunk)--> caller
//! ```
//!
//! [`Tuple`] is a small closed set of representations rather than a
//! trait object: a `RowTuple` views a scanned record, a `ValueListTuple`
//! holds a fully materialized row (an `INSERT` literal, say), a
//! `CompositeTuple` concatenates the two sides of a join, an
//! `ExpressionTuple` is the result of evaluating a projection list, and
//! a `SplicedTuple` is a cheaply-clonable view into column-major storage
//! used while sorting. A closed enum means every operator can match
//! exhaustively instead of downcasting a trait object, at the cost of
//! the enum knowing about all five shapes up front - the same tradeoff
//! the tagged `Expression` tree makes (see [`crate::expr`]).

pub mod chunk;

use crate::error::{Error, Result};
use crate::storage::{Field, Record, Table};
use crate::value::Value;
use std::rc::Rc;

pub use chunk::{Chunk, Column, ColumnData};

/// Identifies a desired cell by table + field name, the way a bound
/// `FieldExpr` names the cell it wants out of whatever tuple it is
/// evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleCellSpec {
    pub table_name: Option<String>,
    pub field_name: String,
}

impl TupleCellSpec {
    pub fn new(table_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        TupleCellSpec { table_name: Some(table_name.into()), field_name: field_name.into() }
    }

    pub fn unqualified(field_name: impl Into<String>) -> Self {
        TupleCellSpec { table_name: None, field_name: field_name.into() }
    }

    fn matches(&self, table_name: &str, field_name: &str) -> bool {
        if let Some(t) = &self.table_name {
            if t != table_name {
                return false;
            }
        }
        self.field_name == field_name
    }
}

/// A view over a scanned record: decoded column values paired with the
/// field metadata that named them.
#[derive(Debug, Clone)]
pub struct RowTuple {
    pub values: Vec<Value>,
    pub fields: Vec<Field>,
    pub record: Record,
}

impl RowTuple {
    pub fn new(table_name: &str, table: &dyn Table, record: Record) -> Self {
        let meta = table.table_meta();
        let values = crate::storage::decode_record(meta, &record, table);
        let fields = meta
            .fields
            .iter()
            .filter(|f| !f.system)
            .map(|f| Field::new(table_name, f.clone()))
            .collect();
        RowTuple { values, fields, record }
    }
}

/// A fully materialized row with optional per-cell naming (used for
/// `INSERT ... VALUES` literals and as the bridge between the binder's
/// constant-folded expressions and the operator pipeline).
#[derive(Debug, Clone)]
pub struct ValueListTuple {
    pub values: Vec<Value>,
    pub specs: Vec<Option<TupleCellSpec>>,
}

impl ValueListTuple {
    pub fn new(values: Vec<Value>) -> Self {
        let specs = vec![None; values.len()];
        ValueListTuple { values, specs }
    }

    pub fn named(values: Vec<Value>, specs: Vec<Option<TupleCellSpec>>) -> Self {
        assert_eq!(values.len(), specs.len());
        ValueListTuple { values, specs }
    }
}

/// Concatenation of a left and right tuple, as produced by a join: cell
/// `i` comes from the left side while `i < left.cell_num()`, otherwise
/// from the right side at `i - left.cell_num()`.
#[derive(Debug, Clone)]
pub struct CompositeTuple {
    pub left: Box<Tuple>,
    pub right: Box<Tuple>,
}

/// The result of evaluating a named list of expressions against some
/// input tuple - what a `Project` operator hands downstream.
#[derive(Debug, Clone)]
pub struct ExpressionTuple {
    pub values: Vec<Value>,
    pub names: Vec<String>,
}

/// A cheap view into column-major storage: many `SplicedTuple`s can
/// share the same `Rc<Vec<Vec<Value>>>` while differing only in which
/// row they point at, which is what lets `OrderBy` reorder a batch by
/// permuting row indices instead of cloning whole rows.
#[derive(Debug, Clone)]
pub struct SplicedTuple {
    pub columns: Rc<Vec<Vec<Value>>>,
    pub row: usize,
}

/// The abstract cursor every physical operator passes downstream.
#[derive(Debug, Clone)]
pub enum Tuple {
    Row(RowTuple),
    ValueList(ValueListTuple),
    Composite(CompositeTuple),
    Expression(ExpressionTuple),
    Spliced(SplicedTuple),
    /// The empty tuple: used where an expression must be evaluated
    /// outside of any row context (e.g. a non-correlated subquery fed to
    /// `UpdatePhysicalOperator::find_target_columns`).
    Empty,
}

impl Tuple {
    pub fn cell_num(&self) -> usize {
        match self {
            Tuple::Row(t) => t.values.len(),
            Tuple::ValueList(t) => t.values.len(),
            Tuple::Composite(t) => t.left.cell_num() + t.right.cell_num(),
            Tuple::Expression(t) => t.values.len(),
            Tuple::Spliced(t) => t.columns.len(),
            Tuple::Empty => 0,
        }
    }

    pub fn cell_at(&self, index: usize) -> Result<Value> {
        match self {
            Tuple::Row(t) => t.values.get(index).cloned().ok_or(Error::RecordInvalidKey),
            Tuple::ValueList(t) => t.values.get(index).cloned().ok_or(Error::RecordInvalidKey),
            Tuple::Composite(t) => {
                let left_n = t.left.cell_num();
                if index < left_n {
                    t.left.cell_at(index)
                } else {
                    t.right.cell_at(index - left_n)
                }
            }
            Tuple::Expression(t) => t.values.get(index).cloned().ok_or(Error::RecordInvalidKey),
            Tuple::Spliced(t) => t
                .columns
                .get(index)
                .and_then(|col| col.get(t.row))
                .cloned()
                .ok_or(Error::RecordInvalidKey),
            Tuple::Empty => Err(Error::RecordInvalidKey),
        }
    }

    /// Public entry point for callers outside this module that need a
    /// cell's originating column (`OrderBy` preserving column names
    /// through a sort, for instance) without reaching for `find_cell`'s
    /// linear search.
    pub fn spec_at_pub(&self, index: usize) -> Option<TupleCellSpec> {
        self.spec_at(index)
    }

    fn spec_at(&self, index: usize) -> Option<TupleCellSpec> {
        match self {
            Tuple::Row(t) => t
                .fields
                .get(index)
                .map(|f| TupleCellSpec::new(f.table_name.clone(), f.field_name().to_string())),
            Tuple::ValueList(t) => t.specs.get(index).cloned().flatten(),
            Tuple::Composite(t) => {
                let left_n = t.left.cell_num();
                if index < left_n {
                    t.left.spec_at(index)
                } else {
                    t.right.spec_at(index - left_n)
                }
            }
            Tuple::Expression(t) => t.names.get(index).map(|n| TupleCellSpec::unqualified(n.clone())),
            Tuple::Spliced(_) => None,
            Tuple::Empty => None,
        }
    }

    /// Finds the value of the cell named by `spec`, optionally using and
    /// updating `cached_index` so repeat lookups (the common case: a
    /// `FieldExpr` evaluated once per row of a long scan) skip the
    /// linear search after the first hit.
    pub fn find_cell(&self, spec: &TupleCellSpec, cached_index: &mut Option<usize>) -> Result<Value> {
        if let Some(idx) = cached_index {
            if self.spec_at(*idx).as_ref().is_some_and(|found| Self::spec_matches(spec, found)) {
                return self.cell_at(*idx);
            }
        }
        for i in 0..self.cell_num() {
            if let Some(found) = self.spec_at(i) {
                if Self::spec_matches(spec, &found) {
                    *cached_index = Some(i);
                    return self.cell_at(i);
                }
            }
        }
        Err(Error::SchemaFieldMissing(spec.field_name.clone()))
    }

    /// `spec` (what the caller wants) matches `candidate` (a concrete
    /// cell name from `spec_at`) when the field names agree and, if
    /// `spec` names a table, the candidate's table agrees too -
    /// unqualified lookups (`spec.table_name == None`) match any table.
    fn spec_matches(spec: &TupleCellSpec, candidate: &TupleCellSpec) -> bool {
        if spec.field_name != candidate.field_name {
            return false;
        }
        match (&spec.table_name, &candidate.table_name) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrType;

    #[test]
    fn composite_tuple_concatenates_cells() {
        let left = Tuple::ValueList(ValueListTuple::new(vec![Value::Int(1), Value::Int(2)]));
        let right = Tuple::ValueList(ValueListTuple::new(vec![Value::Int(3)]));
        let composite = Tuple::Composite(CompositeTuple { left: Box::new(left), right: Box::new(right) });
        assert_eq!(composite.cell_num(), 3);
        assert_eq!(composite.cell_at(2).unwrap(), Value::Int(3));
    }

    #[test]
    fn find_cell_caches_index() {
        let specs = vec![Some(TupleCellSpec::unqualified("a")), Some(TupleCellSpec::unqualified("b"))];
        let tuple = Tuple::ValueList(ValueListTuple::named(vec![Value::Int(1), Value::Int(2)], specs));
        let mut cache = None;
        assert_eq!(tuple.find_cell(&TupleCellSpec::unqualified("b"), &mut cache).unwrap(), Value::Int(2));
        assert_eq!(cache, Some(1));
        assert_eq!(tuple.find_cell(&TupleCellSpec::unqualified("b"), &mut cache).unwrap(), Value::Int(2));
    }

    #[test]
    fn row_tuple_from_record() {
        let table = crate::storage::memory::MemoryTable::new("t", vec![("a", AttrType::Int, 4)]);
        let record = Record::new(crate::storage::RowId { page_num: 0, slot_num: 0 }, vec![7, 0, 0, 0, 0]);
        let tuple = RowTuple::new("t", &table, record);
        assert_eq!(tuple.values, vec![Value::Int(7)]);
    }
}
