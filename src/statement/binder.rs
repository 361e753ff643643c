//! The binder proper: §4.3 of the name-resolution procedure, split out
//! from `crate::statement`'s data types so the tagged-union shapes stay
//! readable on their own.

use super::{
    CreateIndexStmt, CreateTableStmt, DeleteStmt, FromGroupStmt, GroupByStmt, InsertStmt,
    OrderByUnit, RelationRef, SelectStmt, Statement, UpdateStmt,
};
use crate::ast::{
    ArithOpSql, CompOpSql, ConjOpSql, CreateIndexSqlNode, CreateTableSqlNode, DeleteSqlNode,
    ExprSql, FromGroupSql, InsertSqlNode, SelectSqlNode, StatementSql, UpdateSqlNode,
};
use crate::catalog::{Catalog, SharedTable};
use crate::error::{Error, Result};
use crate::expr::{
    AggFunc, ArithOp, ArithmeticExpr, CastExpr, CompOp, ComparisonExpr, ConjOp, ConjunctionExpr,
    Expr, ExprHeader, ExprListExpr, FieldExpr, OuterFieldExpr, SubQueryExpr, SubQueryPlan,
    SysFuncExpr, SysFuncKind, ValueExpr,
};
use crate::storage::Field;
use std::cell::RefCell;
use std::rc::Rc;

/// The alias -> table map a FROM clause builds up, plus an optional link
/// to the enclosing statement's scope for correlated subqueries.
pub struct Scope<'a> {
    tables: Vec<(String, SharedTable)>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn root() -> Self {
        Scope { tables: Vec::new(), parent: None }
    }

    fn child(parent: &'a Scope<'a>) -> Self {
        Scope { tables: Vec::new(), parent: Some(parent) }
    }

    fn register(&mut self, alias: &str, table: SharedTable) -> Result<()> {
        if self.tables.iter().any(|(a, _)| a == alias) {
            return Err(Error::invalid_argument(format!("duplicate table alias in FROM: {alias}")));
        }
        self.tables.push((alias.to_string(), table));
        Ok(())
    }

    fn find_alias(&self, alias: &str) -> Option<&SharedTable> {
        self.tables.iter().find(|(a, _)| a == alias).map(|(_, t)| t)
    }

    fn default_table(&self) -> Option<(&str, &SharedTable)> {
        if self.tables.len() == 1 {
            Some((self.tables[0].0.as_str(), &self.tables[0].1))
        } else {
            None
        }
    }

    /// Every `(alias, table)` pair whose table has a column named `name`.
    fn candidates(&self, name: &str) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, t)| t.borrow().table_meta().field_by_name(name).is_some())
            .map(|(a, _)| a.as_str())
            .collect()
    }
}

pub fn bind_statement(ast: StatementSql, catalog: &Catalog) -> Result<Statement> {
    match ast {
        StatementSql::Select(node) => {
            let root = Scope::root();
            Ok(Statement::Select(bind_select(&node, catalog, &root)?))
        }
        StatementSql::Insert(node) => bind_insert(node, catalog),
        StatementSql::Update(node) => bind_update(node, catalog),
        StatementSql::Delete(node) => bind_delete(node, catalog),
        StatementSql::Explain(inner) => Ok(Statement::Explain(Box::new(bind_statement(*inner, catalog)?))),
        StatementSql::Calc(exprs) => {
            let root = Scope::root();
            let bound = exprs.iter().map(|e| bind_expr(e, &root, catalog, &mut false)).collect::<Result<_>>()?;
            Ok(Statement::Calc(bound))
        }
        StatementSql::CreateTable(node) => bind_create_table(node),
        StatementSql::DropTable(name) => Ok(Statement::DropTable(name)),
        StatementSql::CreateIndex(node) => bind_create_index(node),
        StatementSql::DropIndex { table, index_name } => Ok(Statement::DropIndex { table, index_name }),
    }
}

pub fn bind_select(node: &SelectSqlNode, catalog: &Catalog, parent: &Scope) -> Result<SelectStmt> {
    let mut scope = Scope::child(parent);
    let from = bind_from(&node.from, catalog, &mut scope)?;

    if node.projections.iter().any(|(e, alias)| matches!(e, ExprSql::Star(_)) && alias.is_some()) {
        return Err(Error::invalid_argument("SELECT * cannot carry an alias"));
    }
    if scope.tables.is_empty() && node.projections.iter().any(|(e, _)| matches!(e, ExprSql::Star(_))) {
        return Err(Error::invalid_argument("SELECT * requires at least one table in FROM"));
    }

    let projections = expand_projections(&node.projections, &scope, catalog)?;

    let filter = node.filter.as_ref().map(|e| bind_expr(e, &scope, catalog, &mut false)).transpose()?;

    let (group_by, having) = bind_group_by_having(&node.group_by, node.having.as_ref(), &projections, &scope, catalog)?;

    let order_by = node
        .order_by
        .iter()
        .map(|u| Ok(OrderByUnit { expr: bind_expr(&u.expr, &scope, catalog, &mut false)?, asc: u.asc }))
        .collect::<Result<Vec<_>>>()?;

    Ok(SelectStmt { from, projections, filter, group_by, having, order_by })
}

fn bind_from(groups: &[FromGroupSql], catalog: &Catalog, scope: &mut Scope) -> Result<Vec<FromGroupStmt>> {
    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        let base = resolve_relation(&group.base, catalog, scope)?;
        let mut joins = Vec::with_capacity(group.joins.len());
        for (rel, on) in &group.joins {
            let rel = resolve_relation(rel, catalog, scope)?;
            let on_expr = bind_expr(on, scope, catalog, &mut false)?;
            joins.push((rel, on_expr));
        }
        out.push(FromGroupStmt { base, joins });
    }
    Ok(out)
}

fn resolve_relation(rel: &crate::ast::RelationRefSql, catalog: &Catalog, scope: &mut Scope) -> Result<RelationRef> {
    let table = catalog.find_table(&rel.name).ok_or_else(|| Error::SchemaTableNotExist(rel.name.clone()))?;
    let alias = rel.alias.clone().unwrap_or_else(|| rel.name.clone());
    scope.register(&alias, table)?;
    Ok(RelationRef { table_name: rel.name.clone(), alias })
}

fn expand_projections(
    raw: &[(ExprSql, Option<String>)],
    scope: &Scope,
    catalog: &Catalog,
) -> Result<Vec<(Expr, String)>> {
    let mut out = Vec::new();
    for (expr, alias) in raw {
        match expr {
            ExprSql::Star(None) => {
                for (table_alias, table) in &scope.tables {
                    push_all_fields(&mut out, table_alias, table);
                }
            }
            ExprSql::Star(Some(t)) => {
                let table = scope.find_alias(t).ok_or_else(|| Error::SchemaFieldMissing(t.clone()))?;
                push_all_fields(&mut out, t, table);
            }
            _ => {
                let mut has_agg = false;
                let bound = bind_expr(expr, scope, catalog, &mut has_agg)?;
                check_project_expr(&bound)?;
                let name = alias.clone().unwrap_or_else(|| bound.name().to_string());
                out.push((bound, name));
            }
        }
    }
    Ok(out)
}

fn push_all_fields(out: &mut Vec<(Expr, String)>, table_alias: &str, table: &SharedTable) {
    let meta = table.borrow().table_meta().clone();
    for field in meta.fields.iter().filter(|f| f.visible && !f.system) {
        let f = Field::new(table_alias, field.clone());
        let name = f.field_name().to_string();
        out.push((Expr::Field(FieldExpr::new(f)), name));
    }
}

/// Rule (a): a subquery may not appear anywhere in a projection
/// expression.
fn check_project_expr(expr: &Expr) -> Result<()> {
    let mut has_subquery = false;
    expr.traverse_check(&mut |e| {
        if matches!(e, Expr::SubQuery(_)) {
            has_subquery = true;
        }
        Ok(())
    })?;
    if has_subquery {
        return Err(Error::invalid_argument("subqueries are not allowed in the projection list"));
    }
    Ok(())
}

fn bind_group_by_having(
    group_by_sql: &[ExprSql],
    having_sql: Option<&ExprSql>,
    projections: &[(Expr, String)],
    scope: &Scope,
    catalog: &Catalog,
) -> Result<(Option<GroupByStmt>, Option<Expr>)> {
    let group_exprs = group_by_sql.iter().map(|e| bind_expr(e, scope, catalog, &mut false)).collect::<Result<Vec<_>>>()?;
    let having = having_sql.map(|e| bind_expr(e, scope, catalog, &mut false)).transpose()?;

    let mut aggregate_exprs = Vec::new();
    for (expr, _) in projections {
        collect_aggregates(expr, &mut aggregate_exprs);
    }
    if let Some(h) = &having {
        collect_aggregates(h, &mut aggregate_exprs);
    }

    let mut passthrough = Vec::new();
    for (expr, _) in projections {
        collect_fields_outside_aggregates(expr, &mut passthrough);
    }

    if group_exprs.is_empty() && aggregate_exprs.is_empty() {
        return Ok((None, having));
    }

    if group_exprs.is_empty() {
        if !passthrough.is_empty() {
            return Err(Error::invalid_argument(
                "a non-aggregated column cannot appear in a SELECT with aggregates and no GROUP BY",
            ));
        }
    } else {
        for field in &passthrough {
            let matches = group_exprs.iter().any(|g| g.name() == field.name());
            if !matches {
                return Err(Error::invalid_argument(format!(
                    "column '{}' must appear in the GROUP BY list",
                    field.name()
                )));
            }
        }
    }

    Ok((Some(GroupByStmt { group_exprs, aggregate_exprs, passthrough_field_exprs: passthrough }), having))
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Aggregate(_) => {
            if !out.iter().any(|e| e.name() == expr.name()) {
                out.push(expr.clone());
            }
        }
        Expr::Cast(e) => collect_aggregates(&e.child, out),
        Expr::Comparison(e) => {
            collect_aggregates(&e.left, out);
            if let Some(r) = &e.right {
                collect_aggregates(r, out);
            }
        }
        Expr::Conjunction(e) => e.children.iter().for_each(|c| collect_aggregates(c, out)),
        Expr::Arithmetic(e) => {
            collect_aggregates(&e.left, out);
            if let Some(r) = &e.right {
                collect_aggregates(r, out);
            }
        }
        Expr::SysFunc(e) => e.args.iter().for_each(|a| collect_aggregates(a, out)),
        _ => {}
    }
}

/// Field expressions that appear *outside* of any `Aggregate` subtree -
/// these are the ones the GROUP BY legality check constrains.
fn collect_fields_outside_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Field(_) => out.push(expr.clone()),
        Expr::Aggregate(_) => {}
        Expr::Cast(e) => collect_fields_outside_aggregates(&e.child, out),
        Expr::Comparison(e) => {
            collect_fields_outside_aggregates(&e.left, out);
            if let Some(r) = &e.right {
                collect_fields_outside_aggregates(r, out);
            }
        }
        Expr::Conjunction(e) => e.children.iter().for_each(|c| collect_fields_outside_aggregates(c, out)),
        Expr::Arithmetic(e) => {
            collect_fields_outside_aggregates(&e.left, out);
            if let Some(r) = &e.right {
                collect_fields_outside_aggregates(r, out);
            }
        }
        Expr::SysFunc(e) => e.args.iter().for_each(|a| collect_fields_outside_aggregates(a, out)),
        _ => {}
    }
}

fn bind_insert(node: InsertSqlNode, catalog: &Catalog) -> Result<Statement> {
    catalog.find_table(&node.table).ok_or_else(|| Error::SchemaTableNotExist(node.table.clone()))?;
    Ok(Statement::Insert(InsertStmt { table: node.table, rows: node.rows }))
}

fn bind_update(node: UpdateSqlNode, catalog: &Catalog) -> Result<Statement> {
    let table = catalog.find_table(&node.table).ok_or_else(|| Error::SchemaTableNotExist(node.table.clone()))?;
    let mut scope = Scope::root();
    scope.register(&node.table, table)?;
    let assignments = node
        .assignments
        .into_iter()
        .map(|(col, e)| Ok((col, bind_expr(&e, &scope, catalog, &mut false)?)))
        .collect::<Result<Vec<_>>>()?;
    let filter = node.filter.as_ref().map(|e| bind_expr(e, &scope, catalog, &mut false)).transpose()?;
    Ok(Statement::Update(UpdateStmt { table: node.table.clone(), alias: node.table, assignments, filter }))
}

fn bind_delete(node: DeleteSqlNode, catalog: &Catalog) -> Result<Statement> {
    let table = catalog.find_table(&node.table).ok_or_else(|| Error::SchemaTableNotExist(node.table.clone()))?;
    let mut scope = Scope::root();
    scope.register(&node.table, table)?;
    let filter = node.filter.as_ref().map(|e| bind_expr(e, &scope, catalog, &mut false)).transpose()?;
    Ok(Statement::Delete(DeleteStmt { table: node.table.clone(), alias: node.table, filter }))
}

fn bind_create_table(node: CreateTableSqlNode) -> Result<Statement> {
    Ok(Statement::CreateTable(CreateTableStmt { table: node.table, columns: node.columns }))
}

fn bind_create_index(node: CreateIndexSqlNode) -> Result<Statement> {
    Ok(Statement::CreateIndex(CreateIndexStmt {
        index_name: node.index_name,
        table: node.table,
        field: node.field,
        unique: node.unique,
    }))
}

fn bind_expr(e: &ExprSql, scope: &Scope, catalog: &Catalog, has_agg: &mut bool) -> Result<Expr> {
    match e {
        ExprSql::Star(_) => Err(Error::invalid_argument("'*' is only valid as a bare projection")),
        ExprSql::Field(table, name) => resolve_field(table.as_deref(), name, scope),
        ExprSql::Value(v) => Ok(Expr::Value(ValueExpr { header: ExprHeader::new(v.to_string()), value: v.clone() })),
        ExprSql::Cast(child, kind) => {
            let bound = bind_expr(child, scope, catalog, has_agg)?;
            let name = format!("CAST({} AS {kind})", bound.name());
            Ok(Expr::Cast(CastExpr { header: ExprHeader::new(name), child: Box::new(bound), target: *kind }))
        }
        ExprSql::Comparison(op, l, r) => bind_comparison(*op, l, r.as_deref(), scope, catalog, has_agg),
        ExprSql::Conjunction(op, children) => {
            let bound = children.iter().map(|c| bind_expr(c, scope, catalog, has_agg)).collect::<Result<Vec<_>>>()?;
            let conj_op = match op {
                ConjOpSql::And => ConjOp::And,
                ConjOpSql::Or => ConjOp::Or,
            };
            let name = bound.iter().map(Expr::name).collect::<Vec<_>>().join(if conj_op == ConjOp::And { " and " } else { " or " });
            Ok(Expr::Conjunction(ConjunctionExpr { header: ExprHeader::new(name), op: conj_op, children: bound }))
        }
        ExprSql::Arithmetic(op, l, r) => {
            let left = bind_expr(l, scope, catalog, has_agg)?;
            let right = r.as_ref().map(|r| bind_expr(r, scope, catalog, has_agg)).transpose()?;
            let arith_op = match op {
                ArithOpSql::Add => ArithOp::Add,
                ArithOpSql::Sub => ArithOp::Sub,
                ArithOpSql::Mul => ArithOp::Mul,
                ArithOpSql::Div => ArithOp::Div,
                ArithOpSql::Negate => ArithOp::Negate,
            };
            let name = match &right {
                Some(r) => format!("{}{:?}{}", left.name(), arith_op, r.name()),
                None => format!("-{}", left.name()),
            };
            Ok(Expr::Arithmetic(ArithmeticExpr {
                header: ExprHeader::new(name),
                op: arith_op,
                left: Box::new(left),
                right: right.map(Box::new),
            }))
        }
        ExprSql::FuncCall(name, args) => bind_func_call(name, args, scope, catalog, has_agg),
        ExprSql::Subquery(select) => {
            let inner = bind_select(select, catalog, scope)?;
            let header = ExprHeader::new("(subquery)");
            let sq = SubQueryExpr { header, plan: RefCell::new(SubQueryPlan::Unbound(Box::new(inner))) };
            Ok(Expr::SubQuery(Rc::new(sq)))
        }
        ExprSql::List(items) => {
            let bound = items.iter().map(|i| bind_expr(i, scope, catalog, has_agg)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::ExprList(ExprListExpr::new(bound)))
        }
    }
}

fn bind_comparison(
    op: CompOpSql,
    l: &ExprSql,
    r: Option<&ExprSql>,
    scope: &Scope,
    catalog: &Catalog,
    has_agg: &mut bool,
) -> Result<Expr> {
    let comp_op = match op {
        CompOpSql::Eq => CompOp::Eq,
        CompOpSql::Ne => CompOp::Ne,
        CompOpSql::Lt => CompOp::Lt,
        CompOpSql::Le => CompOp::Le,
        CompOpSql::Gt => CompOp::Gt,
        CompOpSql::Ge => CompOp::Ge,
        CompOpSql::In => CompOp::In,
        CompOpSql::NotIn => CompOp::NotIn,
        CompOpSql::Exists => CompOp::Exists,
        CompOpSql::NotExists => CompOp::NotExists,
        CompOpSql::IsNull => CompOp::IsNull,
        CompOpSql::IsNotNull => CompOp::IsNotNull,
    };
    let left = Box::new(bind_expr(l, scope, catalog, has_agg)?);
    let right = r.map(|r| bind_expr(r, scope, catalog, has_agg)).transpose()?.map(Box::new);
    let name = format!("{}{:?}{}", left.name(), comp_op, right.as_ref().map(|r| r.name()).unwrap_or(""));
    Ok(Expr::Comparison(ComparisonExpr { header: ExprHeader::new(name), op: comp_op, left, right }))
}

fn bind_func_call(name: &str, args: &[ExprSql], scope: &Scope, catalog: &Catalog, has_agg: &mut bool) -> Result<Expr> {
    let lower = name.to_ascii_lowercase();
    let display = format!("{name}({})", args.iter().map(|_| "?").collect::<Vec<_>>().join(", "));
    match lower.as_str() {
        "sum" | "avg" | "min" | "max" | "count" => {
            *has_agg = true;
            let func = match lower.as_str() {
                "sum" => AggFunc::Sum,
                "avg" => AggFunc::Avg,
                "min" => AggFunc::Min,
                "max" => AggFunc::Max,
                _ => AggFunc::Count,
            };
            let child = if lower == "count" && args.len() == 1 && matches!(args[0], ExprSql::Star(None)) {
                None
            } else {
                if args.len() != 1 {
                    return Err(Error::invalid_argument(format!("{name} expects exactly one argument")));
                }
                Some(Box::new(bind_expr(&args[0], scope, catalog, has_agg)?))
            };
            Ok(Expr::Aggregate(crate::expr::AggregateExpr { header: ExprHeader::new(display), func, child }))
        }
        "length" => {
            if args.len() != 1 {
                return Err(Error::invalid_argument("LENGTH expects exactly one argument"));
            }
            let bound = args.iter().map(|a| bind_expr(a, scope, catalog, has_agg)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::SysFunc(SysFuncExpr { header: ExprHeader::new(display), kind: SysFuncKind::Length, args: bound }))
        }
        "round" => {
            if args.is_empty() || args.len() > 2 {
                return Err(Error::invalid_argument("ROUND expects one or two arguments"));
            }
            let bound = args.iter().map(|a| bind_expr(a, scope, catalog, has_agg)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::SysFunc(SysFuncExpr { header: ExprHeader::new(display), kind: SysFuncKind::Round, args: bound }))
        }
        "date_format" => {
            if args.len() != 2 {
                return Err(Error::invalid_argument("DATE_FORMAT expects exactly two arguments"));
            }
            let bound = args.iter().map(|a| bind_expr(a, scope, catalog, has_agg)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::SysFunc(SysFuncExpr { header: ExprHeader::new(display), kind: SysFuncKind::DateFormat, args: bound }))
        }
        _ => Err(Error::Unimplemented(format!("unknown function: {name}"))),
    }
}

/// Resolves a (possibly table-qualified) field reference against the
/// current scope, falling back to the parent scope - rewritten as an
/// `OuterField` - for a correlated subquery. Ambiguous or unknown
/// references are a hard `SCHEMA_FIELD_MISSING`; the binder never
/// guesses intent.
fn resolve_field(table: Option<&str>, name: &str, scope: &Scope) -> Result<Expr> {
    if let Some(t) = table {
        if let Some(tbl) = scope.find_alias(t) {
            let meta = tbl.borrow().table_meta().clone();
            let (_, field_meta) = meta.field_by_name(name).ok_or_else(|| Error::SchemaFieldMissing(name.to_string()))?;
            return Ok(Expr::Field(FieldExpr::new(Field::new(t, field_meta.clone()))));
        }
        if let Some(parent) = scope.parent {
            return resolve_outer_field(Some(t), name, parent);
        }
        return Err(Error::SchemaFieldMissing(format!("{t}.{name}")));
    }

    if let Some((alias, tbl)) = scope.default_table() {
        let meta = tbl.borrow().table_meta().clone();
        if let Some((_, field_meta)) = meta.field_by_name(name) {
            return Ok(Expr::Field(FieldExpr::new(Field::new(alias, field_meta.clone()))));
        }
    } else {
        let candidates = scope.candidates(name);
        match candidates.len() {
            0 => {}
            1 => {
                let alias = candidates[0].to_string();
                let tbl = scope.find_alias(&alias).unwrap();
                let meta = tbl.borrow().table_meta().clone();
                let (_, field_meta) = meta.field_by_name(name).unwrap();
                return Ok(Expr::Field(FieldExpr::new(Field::new(alias, field_meta.clone()))));
            }
            _ => return Err(Error::SchemaFieldMissing(format!("ambiguous column reference: {name}"))),
        }
    }

    if let Some(parent) = scope.parent {
        return resolve_outer_field(None, name, parent);
    }
    Err(Error::SchemaFieldMissing(name.to_string()))
}

fn resolve_outer_field(table: Option<&str>, name: &str, scope: &Scope) -> Result<Expr> {
    match resolve_field(table, name, scope)? {
        Expr::Field(f) => Ok(Expr::OuterField(OuterFieldExpr::new(f.field))),
        Expr::OuterField(f) => Ok(Expr::OuterField(OuterFieldExpr::new(f.field))),
        _ => unreachable!("resolve_field only ever returns Field/OuterField"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FromGroupSql, OrderByUnitSql, RelationRefSql};
    use crate::storage::memory::MemoryTable;
    use crate::value::{AttrType, Value};
    use std::cell::RefCell;

    fn catalog_with(tables: &[(&str, &[(&str, AttrType)])]) -> Catalog {
        let mut catalog = Catalog::new();
        for (name, cols) in tables {
            let fields: Vec<(&str, AttrType, usize)> = cols.iter().map(|(n, k)| (*n, *k, 4)).collect();
            catalog.create_table(*name, Rc::new(RefCell::new(MemoryTable::new(*name, fields)))).unwrap();
        }
        catalog
    }

    fn from(table: &str, alias: Option<&str>) -> Vec<FromGroupSql> {
        vec![FromGroupSql { base: RelationRefSql { name: table.to_string(), alias: alias.map(String::from) }, joins: Vec::new() }]
    }

    fn field(table: Option<&str>, name: &str) -> ExprSql {
        ExprSql::Field(table.map(String::from), name.to_string())
    }

    fn bare_select(projections: Vec<(ExprSql, Option<String>)>, from: Vec<FromGroupSql>) -> SelectSqlNode {
        SelectSqlNode { projections, from, filter: None, group_by: Vec::new(), having: None, order_by: Vec::new() }
    }

    #[test]
    fn unknown_table_in_from_is_rejected() {
        let catalog = catalog_with(&[]);
        let node = bare_select(vec![(field(None, "a"), None)], from("ghost", None));
        let err = bind_select(&node, &catalog, &Scope::root());
        assert!(matches!(err, Err(Error::SchemaTableNotExist(_))));
    }

    #[test]
    fn duplicate_alias_in_from_is_rejected() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int)])]);
        let mut groups = from("t", None);
        groups[0].joins.push((RelationRefSql { name: "t".to_string(), alias: None }, field(Some("t"), "a")));
        let node = bare_select(vec![(field(None, "a"), None)], groups);
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn select_star_without_any_table_is_rejected() {
        let catalog = catalog_with(&[]);
        let node = bare_select(vec![(ExprSql::Star(None), None)], Vec::new());
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn select_star_with_alias_is_rejected() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int)])]);
        let node = bare_select(vec![(ExprSql::Star(None), Some("x".to_string()))], from("t", None));
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn select_star_expands_every_visible_column() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int), ("b", AttrType::Int)])]);
        let node = bare_select(vec![(ExprSql::Star(None), None)], from("t", None));
        let stmt = bind_select(&node, &catalog, &Scope::root()).unwrap();
        assert_eq!(stmt.projections.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn ambiguous_unqualified_field_across_two_tables_is_rejected() {
        let catalog = catalog_with(&[("l", &[("id", AttrType::Int)]), ("r", &[("id", AttrType::Int)])]);
        let mut groups = from("l", None);
        groups[0].joins.push((RelationRefSql { name: "r".to_string(), alias: None }, field(Some("l"), "id")));
        let node = bare_select(vec![(field(None, "id"), None)], groups);
        let err = bind_select(&node, &catalog, &Scope::root());
        assert!(matches!(err, Err(Error::SchemaFieldMissing(_))));
    }

    #[test]
    fn unqualified_field_resolves_against_the_lone_from_table() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int)])]);
        let node = bare_select(vec![(field(None, "a"), None)], from("t", None));
        let stmt = bind_select(&node, &catalog, &Scope::root()).unwrap();
        assert_eq!(stmt.projections.len(), 1);
    }

    #[test]
    fn subquery_in_projection_is_rejected() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int)])]);
        let inner = bare_select(vec![(field(None, "a"), None)], from("t", None));
        let node = bare_select(vec![(ExprSql::Subquery(Box::new(inner)), None)], from("t", None));
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn non_aggregated_projection_without_group_by_is_rejected() {
        // SELECT a, SUM(b) FROM t with no GROUP BY: `a` is neither
        // aggregated nor grouped.
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int), ("b", AttrType::Int)])]);
        let node = bare_select(
            vec![(field(None, "a"), None), (ExprSql::FuncCall("sum".to_string(), vec![field(None, "b")]), None)],
            from("t", None),
        );
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn projection_field_must_appear_in_group_by_list() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int), ("b", AttrType::Int), ("c", AttrType::Int)])]);
        let mut node = bare_select(
            vec![(field(None, "a"), None), (ExprSql::FuncCall("sum".to_string(), vec![field(None, "b")]), None)],
            from("t", None),
        );
        node.group_by = vec![field(None, "c")];
        assert!(bind_select(&node, &catalog, &Scope::root()).is_err());
    }

    #[test]
    fn scenario_3_group_by_binds_group_and_aggregate_exprs() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int), ("b", AttrType::Int)])]);
        let mut node = bare_select(
            vec![(field(None, "a"), None), (ExprSql::FuncCall("sum".to_string(), vec![field(None, "b")]), None)],
            from("t", None),
        );
        node.group_by = vec![field(None, "a")];
        node.order_by = vec![OrderByUnitSql { expr: field(None, "a"), asc: true }];
        let stmt = bind_select(&node, &catalog, &Scope::root()).unwrap();
        let group_by = stmt.group_by.expect("aggregates present -> group_by is Some");
        assert_eq!(group_by.group_exprs.len(), 1);
        assert_eq!(group_by.aggregate_exprs.len(), 1);
    }

    #[test]
    fn correlated_subquery_field_rewrites_to_outer_field() {
        let catalog = catalog_with(&[("t", &[("a", AttrType::Int)])]);
        let mut scope = Scope::root();
        let outer_table = catalog.find_table("t").unwrap();
        scope.register("t", outer_table).unwrap();
        let inner = bare_select(vec![(field(Some("t"), "a"), None)], Vec::new());
        let bound = bind_select(&inner, &catalog, &scope).unwrap();
        assert!(matches!(bound.projections[0].0, Expr::OuterField(_)));
    }

    #[test]
    fn insert_into_unknown_table_is_rejected() {
        let catalog = catalog_with(&[]);
        let node = crate::ast::InsertSqlNode { table: "ghost".to_string(), rows: vec![vec![Value::Int(1)]] };
        assert!(bind_insert(node, &catalog).is_err());
    }
}
