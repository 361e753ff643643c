//! Columnar batch used by the vectorized operator pipeline.
//!
//! A [`Chunk`] is the columnar counterpart of [`super::Tuple`]: instead of
//! handing operators one row at a time, `TableScanVec`/`ProjectVec`/
//! `GroupByVec` fill and drain a reusable batch of up to `capacity` rows.
//! Each [`Column`] is either `Normal` (one value per row) or `Constant`
//! (a single value that logically broadcasts across every row) so that
//! binary kernels can specialize on the (constant, constant) cross
//! product instead of branching per row.

use crate::error::{Error, Result};
use crate::value::{AttrType, Value};

/// Default number of rows a freshly constructed chunk can hold before a
/// caller must drain and reset it.
pub const DEFAULT_CHUNK_CAPACITY: usize = 1024;

/// A single column of a [`Chunk`].
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// One value per logical row.
    Normal(Vec<Value>),
    /// A single value broadcast across every row of the owning chunk.
    /// Used for literal expressions (`Value` nodes) and single-table
    /// grouping keys so the evaluator doesn't materialize a full column
    /// of identical values.
    Constant(Value),
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: AttrType,
    pub data: ColumnData,
}

impl Column {
    pub fn normal(name: impl Into<String>, kind: AttrType, capacity: usize) -> Self {
        Column { name: name.into(), kind, data: ColumnData::Normal(Vec::with_capacity(capacity)) }
    }

    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        let kind = value.attr_type();
        Column { name: name.into(), kind, data: ColumnData::Constant(value) }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, ColumnData::Constant(_))
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Normal(v) => v.len(),
            ColumnData::Constant(_) => usize::MAX, // broadcasts to whatever the chunk's row count is
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.data, ColumnData::Normal(v) if v.is_empty())
    }

    /// The value at logical row `i`: the stored value for a `Normal`
    /// column, or the broadcast value for a `Constant` one.
    pub fn get(&self, i: usize) -> Result<&Value> {
        match &self.data {
            ColumnData::Normal(v) => v.get(i).ok_or(Error::RecordInvalidKey),
            ColumnData::Constant(v) => Ok(v),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        match &mut self.data {
            ColumnData::Normal(v) => {
                v.push(value);
                Ok(())
            }
            ColumnData::Constant(_) => {
                Err(Error::internal("cannot push onto a CONSTANT column"))
            }
        }
    }

    pub fn clear(&mut self) {
        if let ColumnData::Normal(v) = &mut self.data {
            v.clear();
        }
    }
}

/// A columnar batch: parallel [`Column`]s sharing one logical row count.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub columns: Vec<Column>,
    pub capacity: usize,
    /// The logical row count of the chunk. `Normal` columns must hold
    /// exactly this many values; `Constant` columns ignore it.
    pub count: usize,
}

impl Chunk {
    pub fn new(capacity: usize) -> Self {
        Chunk { columns: Vec::new(), capacity, count: 0 }
    }

    pub fn with_columns(columns: Vec<Column>, capacity: usize) -> Self {
        let count = columns
            .iter()
            .filter_map(|c| match &c.data {
                ColumnData::Normal(v) => Some(v.len()),
                ColumnData::Constant(_) => None,
            })
            .max()
            .unwrap_or(0);
        Chunk { columns, capacity, count }
    }

    pub fn column_num(&self) -> usize {
        self.columns.len()
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    pub fn row(&self, i: usize) -> Result<Vec<Value>> {
        self.columns.iter().map(|c| c.get(i).cloned()).collect()
    }

    pub fn reset(&mut self) {
        for c in &mut self.columns {
            c.clear();
        }
        self.count = 0;
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Specializes a binary kernel over the (constant, constant) cross
/// product of two columns, avoiding a per-row branch on column kind in
/// the common all-normal case. `f` receives the left and right value at
/// row `i` and returns the combined value.
pub fn zip_columns(
    left: &Column,
    right: &Column,
    row_count: usize,
    mut f: impl FnMut(&Value, &Value) -> Result<Value>,
) -> Result<Vec<Value>> {
    match (&left.data, &right.data) {
        (ColumnData::Constant(l), ColumnData::Constant(r)) => {
            let v = f(l, r)?;
            Ok(vec![v; row_count])
        }
        (ColumnData::Constant(l), ColumnData::Normal(rs)) => {
            rs.iter().map(|r| f(l, r)).collect()
        }
        (ColumnData::Normal(ls), ColumnData::Constant(r)) => {
            ls.iter().map(|l| f(l, r)).collect()
        }
        (ColumnData::Normal(ls), ColumnData::Normal(rs)) => {
            ls.iter().zip(rs.iter()).map(|(l, r)| f(l, r)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_column_broadcasts() {
        let col = Column::constant("c", Value::Int(7));
        assert_eq!(col.get(0).unwrap(), &Value::Int(7));
        assert_eq!(col.get(999).unwrap(), &Value::Int(7));
    }

    #[test]
    fn zip_columns_constant_constant() {
        let l = Column::constant("a", Value::Int(2));
        let r = Column::constant("b", Value::Int(3));
        let out = zip_columns(&l, &r, 4, |a, b| {
            Ok(Value::Int(a.as_numeric().unwrap() as i32 + b.as_numeric().unwrap() as i32))
        })
        .unwrap();
        assert_eq!(out, vec![Value::Int(5); 4]);
    }

    #[test]
    fn zip_columns_normal_normal() {
        let mut l = Column::normal("a", AttrType::Int, 2);
        l.push(Value::Int(1)).unwrap();
        l.push(Value::Int(2)).unwrap();
        let mut r = Column::normal("b", AttrType::Int, 2);
        r.push(Value::Int(10)).unwrap();
        r.push(Value::Int(20)).unwrap();
        let out = zip_columns(&l, &r, 2, |a, b| {
            Ok(Value::Int(a.as_numeric().unwrap() as i32 + b.as_numeric().unwrap() as i32))
        })
        .unwrap();
        assert_eq!(out, vec![Value::Int(11), Value::Int(22)]);
    }

    #[test]
    fn chunk_reset_clears_normal_columns_only() {
        let mut chunk = Chunk::new(4);
        let mut normal = Column::normal("a", AttrType::Int, 4);
        normal.push(Value::Int(1)).unwrap();
        chunk.columns.push(normal);
        chunk.columns.push(Column::constant("b", Value::Int(9)));
        chunk.count = 1;
        chunk.reset();
        assert_eq!(chunk.count, 0);
        assert!(chunk.columns[0].is_empty());
        assert_eq!(chunk.columns[1].get(0).unwrap(), &Value::Int(9));
    }
}
