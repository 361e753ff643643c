//! DDL dispatch: `CREATE`/`DROP TABLE`/`INDEX` against the catalog.
//!
//! The statement binder and logical planner both treat these as shapes
//! to resolve, not to execute - the planner refuses outright (see
//! `crate::logical::generate_logical_plan`) because DDL has no query
//! plan. [`crate::execute_statement`] calls straight into this module
//! instead of building one.
//!
//! The only concrete [`crate::storage::Table`] this crate ships is the
//! in-memory stand-in (`crate::storage::memory::MemoryTable`); a real
//! engine would hand `CREATE TABLE` to its own record-file handler
//! instead.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::statement::{CreateIndexStmt, CreateTableStmt};
use crate::storage::memory::MemoryTable;
use std::cell::RefCell;
use std::rc::Rc;

pub fn create_table(catalog: &mut Catalog, stmt: &CreateTableStmt) -> Result<()> {
    let fields: Vec<(&str, crate::value::AttrType, usize)> =
        stmt.columns.iter().map(|(name, kind, length, _nullable)| (name.as_str(), *kind, *length)).collect();
    let table = MemoryTable::new(stmt.table.clone(), fields);
    catalog.create_table(stmt.table.clone(), Rc::new(RefCell::new(table)))
}

pub fn drop_table(catalog: &mut Catalog, table_name: &str) -> Result<()> {
    catalog.drop_table(table_name)
}

pub fn create_index(catalog: &Catalog, stmt: &CreateIndexStmt) -> Result<()> {
    let table = catalog
        .find_table(&stmt.table)
        .ok_or_else(|| Error::SchemaTableNotExist(stmt.table.clone()))?;
    table.borrow_mut().create_index(&stmt.index_name, &stmt.field, stmt.unique)
}

pub fn drop_index(catalog: &Catalog, table_name: &str, index_name: &str) -> Result<()> {
    let table = catalog.find_table(table_name).ok_or_else(|| Error::SchemaTableNotExist(table_name.to_string()))?;
    table.borrow_mut().drop_index(index_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrType;

    #[test]
    fn create_table_registers_in_catalog() {
        let mut catalog = Catalog::new();
        let stmt = CreateTableStmt {
            table: "t".to_string(),
            columns: vec![("a".to_string(), AttrType::Int, 4, true)],
        };
        create_table(&mut catalog, &stmt).unwrap();
        assert!(catalog.find_table("t").is_some());
    }

    #[test]
    fn create_index_on_missing_table_fails() {
        let catalog = Catalog::new();
        let stmt = CreateIndexStmt {
            index_name: "idx_a".to_string(),
            table: "ghost".to_string(),
            field: "a".to_string(),
            unique: false,
        };
        assert!(create_index(&catalog, &stmt).is_err());
    }

    #[test]
    fn create_and_drop_index_round_trip() {
        let mut catalog = Catalog::new();
        let create = CreateTableStmt {
            table: "t".to_string(),
            columns: vec![("a".to_string(), AttrType::Int, 4, true)],
        };
        create_table(&mut catalog, &create).unwrap();
        let stmt = CreateIndexStmt {
            index_name: "idx_a".to_string(),
            table: "t".to_string(),
            field: "a".to_string(),
            unique: false,
        };
        create_index(&catalog, &stmt).unwrap();
        drop_index(&catalog, "t", "idx_a").unwrap();
        assert!(drop_index(&catalog, "t", "idx_a").is_err());
    }
}
