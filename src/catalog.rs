//! Database catalog: the table namespace the binder resolves `FROM`
//! clauses and field references against.
//!
//! Grounded on the storage collaborator contract of `crate::storage`
//! (`Table`, `Index`) - the catalog is nothing more than a name lookup
//! in front of those trait objects, the same role `Db`/`db.cpp` plays in
//! the engine this design is modeled on: it owns no query semantics of
//! its own.

use crate::error::{Error, Result};
use crate::storage::Table;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A table shared between the catalog and every operator that scans,
/// inserts into, or mutates it during one statement's execution.
/// `Rc<RefCell<_>>` rather than `&mut` because several operators (a
/// correlated subquery's scan and the outer statement's scan, say) can
/// each need their own borrow across non-overlapping `next()` calls.
pub type SharedTable = Rc<RefCell<dyn Table>>;

/// Maps table names to the live tables a statement's binder and
/// operators resolve against. One `Catalog` per open database.
#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, SharedTable>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog { tables: HashMap::new() }
    }

    pub fn create_table(&mut self, name: impl Into<String>, table: SharedTable) -> Result<()> {
        let name = name.into();
        if self.tables.contains_key(&name) {
            return Err(Error::invalid_argument(format!("table already exists: {name}")));
        }
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name).map(|_| ()).ok_or_else(|| Error::SchemaTableNotExist(name.to_string()))
    }

    pub fn find_table(&self, name: &str) -> Option<SharedTable> {
        self.tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryTable;
    use crate::value::AttrType;

    fn table(name: &str) -> SharedTable {
        Rc::new(RefCell::new(MemoryTable::new(name, vec![("a", AttrType::Int, 4)])))
    }

    #[test]
    fn create_and_find_table() {
        let mut catalog = Catalog::new();
        catalog.create_table("t", table("t")).unwrap();
        assert!(catalog.find_table("t").is_some());
        assert!(catalog.find_table("missing").is_none());
    }

    #[test]
    fn create_duplicate_table_fails() {
        let mut catalog = Catalog::new();
        catalog.create_table("t", table("t")).unwrap();
        assert!(catalog.create_table("t", table("t")).is_err());
    }

    #[test]
    fn drop_unknown_table_fails() {
        let mut catalog = Catalog::new();
        assert!(catalog.drop_table("ghost").is_err());
    }
}
