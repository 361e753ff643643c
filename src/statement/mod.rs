//! Statement Binder
//!
//! Turns a parsed [`crate::ast::StatementSql`] into a [`Statement`]: every
//! name resolved against the catalog, every expression typed, every
//! aggregate/subquery validated. This is the first stage that actually
//! understands schemas - the parser (out of scope here) only produces
//! shape.

pub mod binder;

use crate::expr::Expr;
use crate::value::{AttrType, Value};

/// One relation in a FROM clause, after name resolution: `table_name` is
/// the name as it exists in the catalog; `alias` is what the rest of the
/// statement (and outer scopes, for correlated subqueries) refers to it
/// as - equal to `table_name` when the SQL carried no `AS`.
#[derive(Debug, Clone)]
pub struct RelationRef {
    pub table_name: String,
    pub alias: String,
}

/// A base relation plus the joins chained onto it: `base JOIN j1 ON c1
/// JOIN j2 ON c2`. Siblings inside one group become a left-deep chain of
/// `Join` logical nodes; separate groups are combined by further joins.
#[derive(Debug, Clone)]
pub struct FromGroupStmt {
    pub base: RelationRef,
    pub joins: Vec<(RelationRef, Expr)>,
}

#[derive(Debug, Clone)]
pub struct OrderByUnit {
    pub expr: Expr,
    pub asc: bool,
}

/// `{group_exprs, aggregate_exprs, passthrough_field_exprs}` per the
/// binder's GROUP BY/HAVING step: the aggregates appearing anywhere in
/// projections/HAVING, the grouping key expressions, and the
/// non-aggregated field expressions that must each textually match some
/// entry in `group_exprs`.
#[derive(Debug, Clone)]
pub struct GroupByStmt {
    pub group_exprs: Vec<Expr>,
    pub aggregate_exprs: Vec<Expr>,
    pub passthrough_field_exprs: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct SelectStmt {
    pub from: Vec<FromGroupStmt>,
    /// `(expression, output_name)` - the output name is either the
    /// user's alias or the expression's own display name.
    pub projections: Vec<(Expr, String)>,
    pub filter: Option<Expr>,
    pub group_by: Option<GroupByStmt>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByUnit>,
}

#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: String,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: String,
    pub alias: String,
    pub assignments: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub table: String,
    pub alias: String,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<(String, AttrType, usize, bool)>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub index_name: String,
    pub table: String,
    pub field: String,
    pub unique: bool,
}

/// Tagged union over every statement kind the binder can produce.
#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Explain(Box<Statement>),
    Calc(Vec<Expr>),
    CreateTable(CreateTableStmt),
    DropTable(String),
    CreateIndex(CreateIndexStmt),
    DropIndex { table: String, index_name: String },
}
