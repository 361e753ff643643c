//! Parsed-statement contract.
//!
//! The SQL lexer/parser lives outside this crate (see §1 of the design:
//! it is a named external collaborator, not a module this crate owns).
//! What *is* owned here is the shape of what the parser hands the
//! binder: a typed AST free of any name resolution, type information, or
//! aggregate/subquery validation. The binder (`crate::statement::binder`)
//! is the first stage that actually understands schemas.
//!
//! Test fixtures in this crate build these nodes by hand, standing in
//! for what a real parser would have produced from SQL text.

use crate::value::{AttrType, Value};

/// An expression as written by the user, before any binding.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprSql {
    /// `*` or `t.*`.
    Star(Option<String>),
    /// `t.col` or bare `col`.
    Field(Option<String>, String),
    /// A literal.
    Value(Value),
    /// `CAST(expr AS kind)`.
    Cast(Box<ExprSql>, AttrType),
    Comparison(CompOpSql, Box<ExprSql>, Option<Box<ExprSql>>),
    Conjunction(ConjOpSql, Vec<ExprSql>),
    Arithmetic(ArithOpSql, Box<ExprSql>, Option<Box<ExprSql>>),
    /// `name(expr)`, e.g. `sum(a)` - the binder decides whether `name`
    /// is a known aggregate or a `SysFunc`.
    FuncCall(String, Vec<ExprSql>),
    /// A parenthesized scalar/row subquery, e.g. the RHS of `=` or `IN`.
    Subquery(Box<SelectSqlNode>),
    /// `(e1, e2, ...)` as the RHS of `IN`.
    List(Vec<ExprSql>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOpSql {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Exists,
    NotExists,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjOpSql {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOpSql {
    Add,
    Sub,
    Mul,
    Div,
    Negate,
}

/// One relation in the FROM clause plus the joins chained onto it:
/// `base JOIN j1 ON c1 JOIN j2 ON c2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FromGroupSql {
    pub base: RelationRefSql,
    pub joins: Vec<(RelationRefSql, ExprSql)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationRefSql {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByUnitSql {
    pub expr: ExprSql,
    pub asc: bool,
}

/// `SELECT proj FROM from_groups WHERE where GROUP BY .. HAVING .. ORDER BY ..`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectSqlNode {
    pub projections: Vec<(ExprSql, Option<String>)>,
    pub from: Vec<FromGroupSql>,
    pub filter: Option<ExprSql>,
    pub group_by: Vec<ExprSql>,
    pub having: Option<ExprSql>,
    pub order_by: Vec<OrderByUnitSql>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertSqlNode {
    pub table: String,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSqlNode {
    pub table: String,
    pub assignments: Vec<(String, ExprSql)>,
    pub filter: Option<ExprSql>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSqlNode {
    pub table: String,
    pub filter: Option<ExprSql>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableSqlNode {
    pub table: String,
    pub columns: Vec<(String, AttrType, usize, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexSqlNode {
    pub index_name: String,
    pub table: String,
    pub field: String,
    pub unique: bool,
}

/// The parser's top-level output: one parsed statement, not yet bound.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementSql {
    Select(SelectSqlNode),
    Insert(InsertSqlNode),
    Update(UpdateSqlNode),
    Delete(DeleteSqlNode),
    Explain(Box<StatementSql>),
    Calc(Vec<ExprSql>),
    CreateTable(CreateTableSqlNode),
    DropTable(String),
    CreateIndex(CreateIndexSqlNode),
    DropIndex { table: String, index_name: String },
}
