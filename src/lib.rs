//! # teachql-core
//!
//! The query execution core of a teaching-grade relational database
//! engine: a value/type system, an expression tree, a columnar tuple
//! batch abstraction, a statement binder, a logical plan generator, a
//! physical plan generator, and the physical operator runtime that
//! drives it all - both a row-at-a-time Volcano pipeline and a
//! chunk-at-a-time vectorized one. Everything below the [`storage`]
//! module's traits (buffer pool, B+-tree index, record-file handler,
//! write-ahead log, MVCC) is out of scope; a small in-memory stand-in
//! (`storage::memory`) is included only so the pipeline can be exercised
//! without a real storage engine behind it.
//!
//! ## Pipeline
//!
//! ```text
//! StatementSql (parsed, out of scope)
//!     ↓ [statement::binder::bind_statement]
//! Statement                              - names resolved, types checked
//!     ↓ [logical::generate_logical_plan]  (DDL dispatched via `ddl` instead)
//! LogicalPlan                            - FROM trees reduced to left-deep joins
//!     ↓ [physical::generate_physical_plan]
//! Box<dyn PhysicalOperator>              - open/next/close, pulled to completion
//! ```
//!
//! [`execute_statement`] drives the whole pipeline for one parsed
//! statement and hands back a [`QueryResult`].

pub mod ast;
pub mod catalog;
pub mod config;
pub mod ddl;
pub mod error;
pub mod expr;
pub mod logical;
pub mod physical;
pub mod statement;
pub mod storage;
pub mod tuple;
pub mod value;

pub use catalog::{Catalog, SharedTable};
pub use config::Config;
pub use error::{Error, Result};
pub use statement::Statement;
pub use value::{AttrType, Value};

use ast::StatementSql;
use physical::PhysicalOperator;
use storage::Trx;
use tuple::Tuple;

/// What a driven statement hands back: for `SELECT`/`CALC`/`EXPLAIN`,
/// the projected rows; for `INSERT`/`UPDATE`/`DELETE`/DDL, an empty row
/// set (the affected-row count is available from the statement's own
/// operator state today, not surfaced here).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    fn empty() -> Self {
        QueryResult { rows: Vec::new() }
    }
}

/// Binds, plans and runs one parsed statement to completion.
///
/// DDL (`CREATE`/`DROP TABLE`/`INDEX`) is still bound - so malformed DDL
/// is rejected the same way as any other statement - but then dispatched
/// straight to [`ddl`] against the catalog rather than lowered into a
/// logical/physical plan, matching the non-goal recorded on
/// [`logical::generate_logical_plan`].
pub fn execute_statement(ast: StatementSql, catalog: &mut Catalog, trx: &mut dyn Trx) -> Result<QueryResult> {
    let stmt = statement::binder::bind_statement(ast, catalog)?;
    match &stmt {
        Statement::CreateTable(node) => {
            ddl::create_table(catalog, node)?;
            Ok(QueryResult::empty())
        }
        Statement::DropTable(name) => {
            ddl::drop_table(catalog, name)?;
            Ok(QueryResult::empty())
        }
        Statement::CreateIndex(node) => {
            ddl::create_index(catalog, node)?;
            Ok(QueryResult::empty())
        }
        Statement::DropIndex { table, index_name } => {
            ddl::drop_index(catalog, table, index_name)?;
            Ok(QueryResult::empty())
        }
        _ => run_bound_statement(stmt, catalog, trx),
    }
}

fn run_bound_statement(stmt: Statement, catalog: &Catalog, trx: &mut dyn Trx) -> Result<QueryResult> {
    let plan = logical::generate_logical_plan(&stmt, catalog)?;
    let mut op = physical::generate_physical_plan(plan, catalog)?;
    trx.start_if_need()?;
    let rows = drive_to_completion(op.as_mut(), trx);
    op.close()?;
    let rows = rows?;
    Ok(QueryResult { rows })
}

/// Pulls `op` via `open`/`next`/`current_tuple` until it signals
/// `RecordEof`, collecting every yielded tuple's cells as plain
/// `Value`s. A genuine (non-eof) error is returned without the caller
/// needing to special-case the sentinel itself.
fn drive_to_completion(op: &mut dyn PhysicalOperator, trx: &dyn Trx) -> Result<Vec<Vec<Value>>> {
    op.open(trx)?;
    let mut rows = Vec::new();
    loop {
        match op.next(trx) {
            Ok(()) => rows.push(tuple_values(&op.current_tuple()?)?),
            Err(e) if e.is_eof() => return Ok(rows),
            Err(e) => return Err(e),
        }
    }
}

fn tuple_values(tuple: &Tuple) -> Result<Vec<Value>> {
    (0..tuple.cell_num()).map(|i| tuple.cell_at(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{CreateTableSqlNode, ExprSql, FromGroupSql, InsertSqlNode, OrderByUnitSql, RelationRefSql, SelectSqlNode};
    use storage::memory::NullTrx;

    fn col(name: &str, kind: AttrType) -> (String, AttrType, usize, bool) {
        (name.to_string(), kind, 4, true)
    }

    fn field(table: &str, name: &str) -> ExprSql {
        ExprSql::Field(Some(table.to_string()), name.to_string())
    }

    #[test]
    fn create_insert_select_round_trip() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();

        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode {
                table: "t".to_string(),
                columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![
                    vec![Value::Int(1), Value::Int(2)],
                    vec![Value::Int(3), Value::Int(4)],
                ],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let result = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(field("t", "a"), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: None,
                group_by: Vec::new(),
                having: None,
                order_by: vec![OrderByUnitSql { expr: field("t", "a"), asc: false }],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(result.rows, vec![vec![Value::Int(3)], vec![Value::Int(1)]]);
    }

    /// scenario 2: `SELECT COUNT(*) FROM t WHERE a > 1` on rows
    /// `(1, x), (2, y), (3, z)` yields a single row `[2]`.
    #[test]
    fn count_star_with_filter_counts_matching_rows() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode {
                table: "t".to_string(),
                columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![
                    vec![Value::Int(1), Value::Int(10)],
                    vec![Value::Int(2), Value::Int(20)],
                    vec![Value::Int(3), Value::Int(30)],
                ],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let result = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(ExprSql::FuncCall("count".to_string(), vec![ExprSql::Star(None)]), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: Some(ExprSql::Comparison(
                    ast::CompOpSql::Gt,
                    Box::new(field("t", "a")),
                    Some(Box::new(ExprSql::Value(Value::Int(1)))),
                )),
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
    }

    /// scenario 3: `SELECT a, SUM(b) FROM t GROUP BY a ORDER BY a` on
    /// rows `(1,3),(1,4),(3,4)` yields `[(1,7),(3,4)]`.
    #[test]
    fn group_by_sum_orders_groups_by_key() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode {
                table: "t".to_string(),
                columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![
                    vec![Value::Int(1), Value::Int(3)],
                    vec![Value::Int(1), Value::Int(4)],
                    vec![Value::Int(3), Value::Int(4)],
                ],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let result = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(field("t", "a"), None), (ExprSql::FuncCall("sum".to_string(), vec![field("t", "b")]), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: None,
                group_by: vec![field("t", "a")],
                having: None,
                order_by: vec![OrderByUnitSql { expr: field("t", "a"), asc: true }],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(result.rows, vec![vec![Value::Int(1), Value::Int(7)], vec![Value::Int(3), Value::Int(4)]]);
    }

    /// scenario 4: `SELECT a FROM t WHERE a IN (SELECT a FROM t WHERE b
    /// > 3)` on rows `(1,3),(3,4)` yields `[3]`.
    #[test]
    fn in_subquery_filters_against_correlated_less_rows() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode {
                table: "t".to_string(),
                columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![vec![Value::Int(1), Value::Int(3)], vec![Value::Int(3), Value::Int(4)]],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let inner = SelectSqlNode {
            projections: vec![(field("t", "a"), None)],
            from: vec![FromGroupSql { base: RelationRefSql { name: "t".to_string(), alias: None }, joins: Vec::new() }],
            filter: Some(ExprSql::Comparison(
                ast::CompOpSql::Gt,
                Box::new(field("t", "b")),
                Some(Box::new(ExprSql::Value(Value::Int(3)))),
            )),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
        };

        let result = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(field("t", "a"), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: Some(ExprSql::Comparison(ast::CompOpSql::In, Box::new(field("t", "a")), Some(Box::new(ExprSql::Subquery(Box::new(inner)))))),
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(result.rows, vec![vec![Value::Int(3)]]);
    }

    /// scenario 5: `UPDATE t SET b = (SELECT MAX(b) FROM t) WHERE a = 1`
    /// on rows `(1,2),(3,4)` updates row 1's `b` to the table-wide max,
    /// leaving the table `(1,4),(3,4)`.
    #[test]
    fn update_with_scalar_subquery_assignment_applies_max() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode {
                table: "t".to_string(),
                columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![vec![Value::Int(1), Value::Int(2)], vec![Value::Int(3), Value::Int(4)]],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let max_b = SelectSqlNode {
            projections: vec![(ExprSql::FuncCall("max".to_string(), vec![field("t", "b")]), None)],
            from: vec![FromGroupSql { base: RelationRefSql { name: "t".to_string(), alias: None }, joins: Vec::new() }],
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
        };

        execute_statement(
            StatementSql::Update(ast::UpdateSqlNode {
                table: "t".to_string(),
                assignments: vec![("b".to_string(), ExprSql::Subquery(Box::new(max_b)))],
                filter: Some(ExprSql::Comparison(
                    ast::CompOpSql::Eq,
                    Box::new(field("t", "a")),
                    Some(Box::new(ExprSql::Value(Value::Int(1)))),
                )),
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let after = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(field("t", "a"), None), (field("t", "b"), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: None,
                group_by: Vec::new(),
                having: None,
                order_by: vec![OrderByUnitSql { expr: field("t", "a"), asc: true }],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(after.rows, vec![vec![Value::Int(1), Value::Int(4)], vec![Value::Int(3), Value::Int(4)]]);
    }

    /// scenario 5 (failure path): a scalar-subquery assignment whose
    /// subquery yields two rows is a hard error and updates nothing.
    #[test]
    fn update_with_non_scalar_subquery_assignment_fails_and_updates_nothing() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode { table: "t".to_string(), columns: vec![col("a", AttrType::Int), col("b", AttrType::Int)] }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(
            StatementSql::Insert(InsertSqlNode {
                table: "t".to_string(),
                rows: vec![vec![Value::Int(1), Value::Int(2)], vec![Value::Int(3), Value::Int(4)]],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        let every_b = SelectSqlNode {
            projections: vec![(field("t", "b"), None)],
            from: vec![FromGroupSql { base: RelationRefSql { name: "t".to_string(), alias: None }, joins: Vec::new() }],
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
        };

        let err = execute_statement(
            StatementSql::Update(ast::UpdateSqlNode {
                table: "t".to_string(),
                assignments: vec![("b".to_string(), ExprSql::Subquery(Box::new(every_b)))],
                filter: None,
            }),
            &mut catalog,
            &mut trx,
        );
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let after = execute_statement(
            StatementSql::Select(SelectSqlNode {
                projections: vec![(field("t", "a"), None), (field("t", "b"), None)],
                from: vec![FromGroupSql {
                    base: RelationRefSql { name: "t".to_string(), alias: None },
                    joins: Vec::new(),
                }],
                filter: None,
                group_by: Vec::new(),
                having: None,
                order_by: vec![OrderByUnitSql { expr: field("t", "a"), asc: true }],
            }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(after.rows, vec![vec![Value::Int(1), Value::Int(2)], vec![Value::Int(3), Value::Int(4)]]);
    }

    /// scenario 6: `CALC DATE_FORMAT('2024-03-01', '%Y-%m-%D')` formats
    /// the day with its English ordinal suffix.
    #[test]
    fn calc_date_format_renders_ordinal_day() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        let date = value::Date::from_ymd(2024, 3, 1).unwrap();
        let result = execute_statement(
            StatementSql::Calc(vec![ExprSql::FuncCall(
                "date_format".to_string(),
                vec![ExprSql::Value(Value::Date(date)), ExprSql::Value(Value::Chars("%Y-%m-%D".to_string()))],
            )]),
            &mut catalog,
            &mut trx,
        )
        .unwrap();

        assert_eq!(result.rows, vec![vec![Value::Chars("2024-03-1st".to_string())]]);
    }

    #[test]
    fn drop_table_then_select_fails() {
        let mut catalog = Catalog::new();
        let mut trx = NullTrx::default();
        execute_statement(
            StatementSql::CreateTable(CreateTableSqlNode { table: "t".to_string(), columns: vec![col("a", AttrType::Int)] }),
            &mut catalog,
            &mut trx,
        )
        .unwrap();
        execute_statement(StatementSql::DropTable("t".to_string()), &mut catalog, &mut trx).unwrap();
        assert!(catalog.find_table("t").is_none());
    }
}
