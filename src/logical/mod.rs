//! Logical Plan Generator
//!
//! Rewrites a bound [`crate::statement::Statement`] into a tree of
//! logical operators, independent of how each node will eventually be
//! executed (that's the physical plan generator's job). `SELECT`'s FROM
//! tree is reduced left-deep: sibling relations inside one join group
//! become a chain of `Join` nodes, and separate groups are combined by
//! further joins. DDL (`CREATE`/`DROP TABLE`/`INDEX`) has no logical
//! shape - it is dispatched directly against the catalog, outside this
//! pipeline entirely (see `crate::execute_statement`).

use crate::catalog::{Catalog, SharedTable};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::statement::{OrderByUnit, RelationRef, Statement};
use crate::storage::ReadWriteMode;
use crate::value::Value;

#[derive(Debug)]
pub enum LogicalPlan {
    /// A single, implicit empty row - the source for expressions with no
    /// `FROM` clause (`SELECT 1+1`, `CALC ...`).
    SingleRow,
    TableGet {
        table: SharedTable,
        alias: String,
        predicates: Vec<Expr>,
        read_write: ReadWriteMode,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Option<Expr>,
    },
    Predicate {
        child: Box<LogicalPlan>,
        expr: Expr,
    },
    OrderBy {
        child: Box<LogicalPlan>,
        units: Vec<OrderByUnit>,
    },
    GroupBy {
        child: Box<LogicalPlan>,
        group_exprs: Vec<Expr>,
        aggregate_exprs: Vec<Expr>,
        passthrough_field_exprs: Vec<Expr>,
    },
    Projection {
        child: Box<LogicalPlan>,
        exprs: Vec<(Expr, String)>,
    },
    Insert {
        table: SharedTable,
        rows: Vec<Vec<Value>>,
    },
    Delete {
        child: Box<LogicalPlan>,
        table: SharedTable,
    },
    Update {
        child: Box<LogicalPlan>,
        table: SharedTable,
        assignments: Vec<(String, Expr)>,
    },
    Explain {
        child: Box<LogicalPlan>,
    },
    Calc {
        exprs: Vec<Expr>,
    },
}

pub fn generate_logical_plan(stmt: &Statement, catalog: &Catalog) -> Result<LogicalPlan> {
    match stmt {
        Statement::Select(s) => generate_select(s, catalog, ReadWriteMode::ReadOnly),
        Statement::Insert(s) => {
            let table = find_table(catalog, &s.table)?;
            Ok(LogicalPlan::Insert { table, rows: s.rows.clone() })
        }
        Statement::Update(s) => {
            let table = find_table(catalog, &s.table)?;
            let mut child = LogicalPlan::TableGet {
                table: table.clone(),
                alias: s.alias.clone(),
                predicates: Vec::new(),
                read_write: ReadWriteMode::ReadWrite,
            };
            if let Some(filter) = &s.filter {
                child = LogicalPlan::Predicate { child: Box::new(child), expr: filter.deep_copy() };
            }
            Ok(LogicalPlan::Update { child: Box::new(child), table, assignments: s.assignments.clone() })
        }
        Statement::Delete(s) => {
            let table = find_table(catalog, &s.table)?;
            let mut child = LogicalPlan::TableGet {
                table: table.clone(),
                alias: s.alias.clone(),
                predicates: Vec::new(),
                read_write: ReadWriteMode::ReadWrite,
            };
            if let Some(filter) = &s.filter {
                child = LogicalPlan::Predicate { child: Box::new(child), expr: filter.deep_copy() };
            }
            Ok(LogicalPlan::Delete { child: Box::new(child), table })
        }
        Statement::Explain(inner) => {
            Ok(LogicalPlan::Explain { child: Box::new(generate_logical_plan(inner, catalog)?) })
        }
        Statement::Calc(exprs) => Ok(LogicalPlan::Calc { exprs: exprs.iter().map(Expr::deep_copy).collect() }),
        Statement::CreateTable(_)
        | Statement::DropTable(_)
        | Statement::CreateIndex(_)
        | Statement::DropIndex { .. } => {
            Err(Error::internal("DDL statements are dispatched directly, not through the logical planner"))
        }
    }
}

fn find_table(catalog: &Catalog, name: &str) -> Result<SharedTable> {
    catalog.find_table(name).ok_or_else(|| Error::SchemaTableNotExist(name.to_string()))
}

fn make_table_get(rel: &RelationRef, catalog: &Catalog, rw: ReadWriteMode) -> Result<LogicalPlan> {
    let table = find_table(catalog, &rel.table_name)?;
    Ok(LogicalPlan::TableGet { table, alias: rel.alias.clone(), predicates: Vec::new(), read_write: rw })
}

fn generate_select(
    s: &crate::statement::SelectStmt,
    catalog: &Catalog,
    rw: ReadWriteMode,
) -> Result<LogicalPlan> {
    let mut plan = if s.from.is_empty() {
        LogicalPlan::SingleRow
    } else {
        let mut combined: Option<LogicalPlan> = None;
        for group in &s.from {
            let mut group_plan = make_table_get(&group.base, catalog, rw)?;
            for (rel, on) in &group.joins {
                let right = make_table_get(rel, catalog, rw)?;
                group_plan = LogicalPlan::Join {
                    left: Box::new(group_plan),
                    right: Box::new(right),
                    on: Some(on.deep_copy()),
                };
            }
            combined = Some(match combined {
                None => group_plan,
                Some(prev) => LogicalPlan::Join { left: Box::new(prev), right: Box::new(group_plan), on: None },
            });
        }
        combined.ok_or_else(|| Error::internal("non-empty FROM produced no relation"))?
    };

    if let Some(filter) = &s.filter {
        plan = LogicalPlan::Predicate { child: Box::new(plan), expr: filter.deep_copy() };
    }

    if let Some(group_by) = &s.group_by {
        // Streaming GroupBy requires its input pre-sorted on the group
        // keys; this OrderBy is a correctness requirement, not an
        // optimization, so it is always inserted when there's a key to
        // sort on.
        if !group_by.group_exprs.is_empty() {
            let units = group_by.group_exprs.iter().map(|e| OrderByUnit { expr: e.deep_copy(), asc: true }).collect();
            plan = LogicalPlan::OrderBy { child: Box::new(plan), units };
        }
        plan = LogicalPlan::GroupBy {
            child: Box::new(plan),
            group_exprs: group_by.group_exprs.iter().map(Expr::deep_copy).collect(),
            aggregate_exprs: group_by.aggregate_exprs.iter().map(Expr::deep_copy).collect(),
            passthrough_field_exprs: group_by.passthrough_field_exprs.iter().map(Expr::deep_copy).collect(),
        };
        if let Some(having) = &s.having {
            plan = LogicalPlan::Predicate { child: Box::new(plan), expr: having.deep_copy() };
        }
    }

    if !s.order_by.is_empty() {
        plan = LogicalPlan::OrderBy {
            child: Box::new(plan),
            units: s.order_by.iter().map(|u| OrderByUnit { expr: u.expr.deep_copy(), asc: u.asc }).collect(),
        };
    }

    plan = LogicalPlan::Projection {
        child: Box::new(plan),
        exprs: s.projections.iter().map(|(e, n)| (e.deep_copy(), n.clone())).collect(),
    };

    Ok(plan)
}
