//! Concrete Volcano operators plus the logical -> physical lowering pass.
//!
//! `lower` recursively rewrites a [`LogicalPlan`] into a tree of
//! [`PhysicalOperator`]s. It is also where nested subquery expressions -
//! still `Unbound(SelectStmt)` at this point - get their own logical
//! plan generated and lowered, collapsing into one pass what the
//! logical and physical stages would otherwise do as two separate
//! recursive walks.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::expr::{AggFunc, CompOp, Expr, SubQueryExpr, SubQueryPlan};
use crate::logical::LogicalPlan;
use crate::physical::PhysicalOperator;
use crate::statement::{OrderByUnit, SelectStmt, Statement};
use crate::storage::{Index, ReadWriteMode, Record, RecordFileScanner, RowId, Table, Trx};
use crate::tuple::{CompositeTuple, ExpressionTuple, RowTuple, Tuple};
use crate::value::Value;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::rc::Rc;

type SharedTable = crate::catalog::SharedTable;

pub fn lower(plan: LogicalPlan, catalog: &Catalog) -> Result<Box<dyn PhysicalOperator>> {
    match plan {
        LogicalPlan::SingleRow => Ok(Box::new(SingleRowScan::new())),
        LogicalPlan::TableGet { table, alias, predicates: _, read_write: _ } => {
            Ok(Box::new(TableScan::new(table, alias)))
        }
        LogicalPlan::Join { left, right, on } => {
            if let Some(e) = &on {
                compile_subqueries_in_expr(e, catalog)?;
            }
            let left_op = lower(*left, catalog)?;
            let right_op = lower(*right, catalog)?;
            Ok(Box::new(NestedLoopJoin::new(left_op, right_op, on)))
        }
        LogicalPlan::Predicate { child, expr } => {
            if let LogicalPlan::TableGet { table, alias, predicates, .. } = &*child {
                if predicates.is_empty() {
                    if let Some(op) = try_index_pushdown(table, alias, &expr)? {
                        return Ok(op);
                    }
                }
            }
            compile_subqueries_in_expr(&expr, catalog)?;
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(Predicate::new(child_op, expr)))
        }
        LogicalPlan::OrderBy { child, units } => {
            for u in &units {
                compile_subqueries_in_expr(&u.expr, catalog)?;
            }
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(OrderBy::new(child_op, units)))
        }
        LogicalPlan::GroupBy { child, group_exprs, aggregate_exprs, passthrough_field_exprs: _ } => {
            for e in group_exprs.iter().chain(aggregate_exprs.iter()) {
                compile_subqueries_in_expr(e, catalog)?;
            }
            let child_op = lower(*child, catalog)?;
            if group_exprs.is_empty() {
                Ok(Box::new(Aggregate::new(child_op, aggregate_exprs)))
            } else {
                Ok(Box::new(GroupBy::new(child_op, group_exprs, aggregate_exprs)))
            }
        }
        LogicalPlan::Projection { child, exprs } => {
            for (e, _) in &exprs {
                compile_subqueries_in_expr(e, catalog)?;
            }
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(Project::new(child_op, exprs)))
        }
        LogicalPlan::Insert { table, rows } => Ok(Box::new(Insert::new(table, rows))),
        LogicalPlan::Delete { child, table } => {
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(Delete::new(child_op, table)))
        }
        LogicalPlan::Update { child, table, assignments } => {
            for (_, e) in &assignments {
                compile_subqueries_in_expr(e, catalog)?;
            }
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(Update::new(child_op, table, assignments)))
        }
        LogicalPlan::Explain { child } => {
            let child_op = lower(*child, catalog)?;
            Ok(Box::new(Explain::new(child_op)))
        }
        LogicalPlan::Calc { exprs } => {
            for e in &exprs {
                compile_subqueries_in_expr(e, catalog)?;
            }
            let named: Vec<(Expr, String)> = exprs.into_iter().map(|e| (e.name().to_string(), e)).map(|(n, e)| (e, n)).collect();
            Ok(Box::new(Project::new(Box::new(SingleRowScan::new()), named)))
        }
    }
}

fn compile_subqueries_in_expr(expr: &Expr, catalog: &Catalog) -> Result<()> {
    expr.traverse_check(&mut |e| {
        if let Expr::SubQuery(sq) = e {
            compile_subquery(sq, catalog)?;
        }
        Ok(())
    })
}

fn compile_subquery(sq: &Rc<SubQueryExpr>, catalog: &Catalog) -> Result<()> {
    let select: Box<SelectStmt> = {
        let plan = sq.plan.borrow();
        match &*plan {
            SubQueryPlan::Unbound(s) => s.clone(),
            SubQueryPlan::Compiled(_) => return Ok(()),
        }
    };
    let logical = crate::logical::generate_logical_plan(&Statement::Select(*select), catalog)?;
    let op = lower(logical, catalog)?;
    *sq.plan.borrow_mut() = SubQueryPlan::Compiled(op);
    Ok(())
}

/// Equality pushdown: `TableGet` immediately under a `Predicate` whose
/// expression is `field = literal` on an indexed column becomes a point
/// `IndexScan`, skipping both the `TableScan` and the `Predicate` that
/// would otherwise re-check every row.
fn try_index_pushdown(table: &SharedTable, alias: &str, expr: &Expr) -> Result<Option<Box<dyn PhysicalOperator>>> {
    let Expr::Comparison(c) = expr else { return Ok(None) };
    if c.op != CompOp::Eq {
        return Ok(None);
    }
    let Some(right) = &c.right else { return Ok(None) };
    let (field, value) = match (c.left.as_ref(), right.as_ref()) {
        (Expr::Field(f), Expr::Value(v)) => (f, v),
        (Expr::Value(v), Expr::Field(f)) => (f, v),
        _ => return Ok(None),
    };
    if field.field.table_name != *alias {
        return Ok(None);
    }
    let index_name = {
        let t = table.borrow();
        match t.find_index_by_field(field.field.field_name()) {
            Some(idx) => idx.name().to_string(),
            None => return Ok(None),
        }
    };
    Ok(Some(Box::new(IndexScan::new(
        table.clone(),
        alias.to_string(),
        index_name,
        Some(value.value.clone()),
        Some(value.value.clone()),
        true,
        true,
    ))))
}

/// Scans every visible record of a table in whatever order its backing
/// scanner produces them.
#[derive(Debug)]
pub struct TableScan {
    table: SharedTable,
    alias: String,
    scanner: Option<Box<dyn RecordFileScanner>>,
    current: Option<Record>,
}

impl TableScan {
    pub fn new(table: SharedTable, alias: String) -> Self {
        TableScan { table, alias, scanner: None, current: None }
    }
}

impl PhysicalOperator for TableScan {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        let mut scanner = self.table.borrow().get_record_scanner(ReadWriteMode::ReadOnly)?;
        scanner.open(trx)?;
        self.scanner = Some(scanner);
        Ok(())
    }

    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        let scanner = self.scanner.as_mut().ok_or_else(|| Error::internal("TableScan used before open()"))?;
        self.current = Some(scanner.next()?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(s) = &mut self.scanner {
            s.close()?;
        }
        self.scanner = None;
        Ok(())
    }

    fn current_tuple(&self) -> Result<Tuple> {
        let record = self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))?;
        let table = self.table.borrow();
        Ok(Tuple::Row(RowTuple::new(&self.alias, &*table, record)))
    }
}

/// Point/range lookup against a single-field index, re-fetching each
/// matching row by id. Cursor starts at 0 and is bounds-checked before
/// every increment - the deliberate fix for the off-by-one an index
/// open loop is prone to.
#[derive(Debug)]
pub struct IndexScan {
    table: SharedTable,
    alias: String,
    index_name: String,
    lo: Option<Value>,
    hi: Option<Value>,
    lo_inclusive: bool,
    hi_inclusive: bool,
    rids: Vec<RowId>,
    cursor: usize,
    current: Option<Record>,
}

impl IndexScan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: SharedTable,
        alias: String,
        index_name: String,
        lo: Option<Value>,
        hi: Option<Value>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> Self {
        IndexScan { table, alias, index_name, lo, hi, lo_inclusive, hi_inclusive, rids: Vec::new(), cursor: 0, current: None }
    }
}

impl PhysicalOperator for IndexScan {
    fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
        let table = self.table.borrow();
        self.rids =
            table.index_scan(&self.index_name, self.lo.as_ref(), self.hi.as_ref(), self.lo_inclusive, self.hi_inclusive)?;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        if self.cursor >= self.rids.len() {
            return Err(Error::RecordEof);
        }
        let rid = self.rids[self.cursor];
        self.cursor += 1;
        self.current = Some(self.table.borrow().get_record(rid)?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rids.clear();
        self.cursor = 0;
        Ok(())
    }

    fn current_tuple(&self) -> Result<Tuple> {
        let record = self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))?;
        let table = self.table.borrow();
        Ok(Tuple::Row(RowTuple::new(&self.alias, &*table, record)))
    }
}

/// The implicit single empty row a `FROM`-less `SELECT`/`CALC` scans.
#[derive(Debug)]
pub struct SingleRowScan {
    emitted: bool,
}

impl SingleRowScan {
    pub fn new() -> Self {
        SingleRowScan { emitted: false }
    }
}

impl Default for SingleRowScan {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalOperator for SingleRowScan {
    fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
        self.emitted = false;
        Ok(())
    }
    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        if self.emitted {
            return Err(Error::RecordEof);
        }
        self.emitted = true;
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
    fn current_tuple(&self) -> Result<Tuple> {
        Ok(Tuple::Empty)
    }
}

/// Filters a child's rows by a boolean expression; `NULL`/non-boolean
/// results reject the row (standard three-valued `WHERE` semantics).
#[derive(Debug)]
pub struct Predicate {
    child: Box<dyn PhysicalOperator>,
    expr: Expr,
    parent_tuple: Option<Tuple>,
}

impl Predicate {
    pub fn new(child: Box<dyn PhysicalOperator>, expr: Expr) -> Self {
        Predicate { child, expr, parent_tuple: None }
    }
}

impl PhysicalOperator for Predicate {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        loop {
            self.child.next(trx)?;
            let tuple = self.child.current_tuple()?;
            let v = self.expr.get_value(&tuple, self.parent_tuple.as_ref(), trx)?;
            if v.as_bool().unwrap_or(false) {
                return Ok(());
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        self.child.current_tuple()
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

/// Naive nested-loop join: for every left row, the right subtree is
/// closed and reopened from scratch. Correct for any join condition
/// (or none, for a cross join); not the join a real optimizer would
/// pick for anything but the smallest inputs.
#[derive(Debug)]
pub struct NestedLoopJoin {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    on: Option<Expr>,
    left_tuple: Option<Tuple>,
    right_open: bool,
    parent_tuple: Option<Tuple>,
    current: Option<Tuple>,
}

impl NestedLoopJoin {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>, on: Option<Expr>) -> Self {
        NestedLoopJoin { left, right, on, left_tuple: None, right_open: false, parent_tuple: None, current: None }
    }
}

impl PhysicalOperator for NestedLoopJoin {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.left.open(trx)?;
        self.left_tuple = None;
        self.right_open = false;
        Ok(())
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        loop {
            if self.left_tuple.is_none() {
                if self.right_open {
                    self.right.close()?;
                    self.right_open = false;
                }
                self.left.next(trx)?;
                self.left_tuple = Some(self.left.current_tuple()?);
            }
            if !self.right_open {
                self.right.open(trx)?;
                self.right_open = true;
            }
            match self.right.next(trx) {
                Ok(()) => {
                    let right_tuple = self.right.current_tuple()?;
                    let left_tuple = self.left_tuple.clone().expect("left tuple set above");
                    let combined =
                        Tuple::Composite(CompositeTuple { left: Box::new(left_tuple), right: Box::new(right_tuple) });
                    let keep = match &self.on {
                        Some(e) => e.get_value(&combined, self.parent_tuple.as_ref(), trx)?.as_bool().unwrap_or(false),
                        None => true,
                    };
                    if keep {
                        self.current = Some(combined);
                        return Ok(());
                    }
                }
                Err(e) if e.is_eof() => {
                    self.left_tuple = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.right_open {
            self.right.close()?;
        }
        self.left.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.left.set_parent_tuple(parent.clone());
        self.right.set_parent_tuple(parent);
    }
}

/// Per-aggregate running state. `update` sees every input value
/// (already NULL-checked against the aggregate's own rules);
/// `finish` produces the aggregate's final `Value`.
pub(super) trait Accumulator: fmt::Debug {
    fn update(&mut self, v: &Value);
    fn finish(&self) -> Value;
}

#[derive(Debug, Default)]
struct SumAcc {
    sum: f64,
    any: bool,
}
impl Accumulator for SumAcc {
    fn update(&mut self, v: &Value) {
        if !v.is_null() {
            if let Some(n) = v.as_numeric() {
                self.sum += n;
                self.any = true;
            }
        }
    }
    fn finish(&self) -> Value {
        if self.any { Value::Double(self.sum) } else { Value::Null }
    }
}

#[derive(Debug, Default)]
struct AvgAcc {
    sum: f64,
    count: i64,
}
impl Accumulator for AvgAcc {
    fn update(&mut self, v: &Value) {
        if !v.is_null() {
            if let Some(n) = v.as_numeric() {
                self.sum += n;
                self.count += 1;
            }
        }
    }
    fn finish(&self) -> Value {
        if self.count == 0 { Value::Null } else { Value::Double(self.sum / self.count as f64) }
    }
}

#[derive(Debug, Default)]
struct MinMaxAcc {
    best: Option<Value>,
    want_max: bool,
}
impl Accumulator for MinMaxAcc {
    fn update(&mut self, v: &Value) {
        if v.is_null() {
            return;
        }
        self.best = Some(match &self.best {
            None => v.clone(),
            Some(cur) => {
                let ord = cur.compare(v).unwrap_or(CmpOrdering::Equal);
                let take_new = if self.want_max { ord == CmpOrdering::Less } else { ord == CmpOrdering::Greater };
                if take_new { v.clone() } else { cur.clone() }
            }
        });
    }
    fn finish(&self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Default)]
struct CountAcc {
    count: i64,
    star: bool,
}
impl Accumulator for CountAcc {
    fn update(&mut self, v: &Value) {
        if self.star || !v.is_null() {
            self.count += 1;
        }
    }
    fn finish(&self) -> Value {
        Value::Int(self.count as i32)
    }
}

pub(super) fn make_accumulator(func: AggFunc, has_child: bool) -> Box<dyn Accumulator> {
    match func {
        AggFunc::Sum => Box::new(SumAcc::default()),
        AggFunc::Avg => Box::new(AvgAcc::default()),
        AggFunc::Min => Box::new(MinMaxAcc { best: None, want_max: false }),
        AggFunc::Max => Box::new(MinMaxAcc { best: None, want_max: true }),
        AggFunc::Count => Box::new(CountAcc { count: 0, star: !has_child }),
    }
}

pub(super) fn make_accumulators(aggregate_exprs: &[Expr]) -> Result<Vec<Box<dyn Accumulator>>> {
    aggregate_exprs
        .iter()
        .map(|e| match e {
            Expr::Aggregate(a) => Ok(make_accumulator(a.func, a.child.is_some())),
            _ => Err(Error::internal("aggregate list entry is not an Aggregate expression")),
        })
        .collect()
}

pub(super) fn feed_row(
    aggregate_exprs: &[Expr],
    accs: &mut [Box<dyn Accumulator>],
    tuple: &Tuple,
    parent: Option<&Tuple>,
    trx: &dyn Trx,
) -> Result<()> {
    for (e, acc) in aggregate_exprs.iter().zip(accs.iter_mut()) {
        let Expr::Aggregate(a) = e else { continue };
        let v = match &a.child {
            Some(child) => child.get_value(tuple, parent, trx)?,
            None => Value::Boolean(true),
        };
        acc.update(&v);
    }
    Ok(())
}

/// Aggregates the whole input into a single output row (no `GROUP BY`).
#[derive(Debug)]
pub struct Aggregate {
    child: Box<dyn PhysicalOperator>,
    aggregate_exprs: Vec<Expr>,
    parent_tuple: Option<Tuple>,
    done: bool,
    current: Option<Tuple>,
}

impl Aggregate {
    pub fn new(child: Box<dyn PhysicalOperator>, aggregate_exprs: Vec<Expr>) -> Self {
        Aggregate { child, aggregate_exprs, parent_tuple: None, done: false, current: None }
    }
}

impl PhysicalOperator for Aggregate {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)?;
        self.done = false;
        Ok(())
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        if self.done {
            return Err(Error::RecordEof);
        }
        let mut accs = make_accumulators(&self.aggregate_exprs)?;
        loop {
            match self.child.next(trx) {
                Ok(()) => {
                    let tuple = self.child.current_tuple()?;
                    feed_row(&self.aggregate_exprs, &mut accs, &tuple, self.parent_tuple.as_ref(), trx)?;
                }
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            }
        }
        let names = self.aggregate_exprs.iter().map(|e| e.name().to_string()).collect();
        let values = accs.iter().map(|a| a.finish()).collect();
        self.current = Some(Tuple::Expression(ExpressionTuple { values, names }));
        self.done = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

/// Streaming group-by over a child pre-sorted on `group_exprs`: each
/// `next()` consumes one full group (detected by comparing group keys
/// row to row) and emits one aggregated output row. A one-row lookahead
/// buffer (`pending`) is how a group's end is detected without putting
/// a row back onto the child.
#[derive(Debug)]
pub struct GroupBy {
    child: Box<dyn PhysicalOperator>,
    group_exprs: Vec<Expr>,
    aggregate_exprs: Vec<Expr>,
    parent_tuple: Option<Tuple>,
    pending: Option<(Vec<Value>, Tuple)>,
    current: Option<Tuple>,
}

impl GroupBy {
    pub fn new(child: Box<dyn PhysicalOperator>, group_exprs: Vec<Expr>, aggregate_exprs: Vec<Expr>) -> Self {
        GroupBy { child, group_exprs, aggregate_exprs, parent_tuple: None, pending: None, current: None }
    }

    fn eval_key(&self, tuple: &Tuple, trx: &dyn Trx) -> Result<Vec<Value>> {
        self.group_exprs.iter().map(|e| e.get_value(tuple, self.parent_tuple.as_ref(), trx)).collect()
    }

    fn pull_first(&mut self, trx: &dyn Trx) -> Result<()> {
        match self.child.next(trx) {
            Ok(()) => {
                let tuple = self.child.current_tuple()?;
                let key = self.eval_key(&tuple, trx)?;
                self.pending = Some((key, tuple));
            }
            Err(e) if e.is_eof() => self.pending = None,
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl PhysicalOperator for GroupBy {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)?;
        self.pending = None;
        self.pull_first(trx)
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        let (key, first_row) = self.pending.take().ok_or(Error::RecordEof)?;
        let mut accs = make_accumulators(&self.aggregate_exprs)?;
        feed_row(&self.aggregate_exprs, &mut accs, &first_row, self.parent_tuple.as_ref(), trx)?;
        loop {
            match self.child.next(trx) {
                Ok(()) => {
                    let tuple = self.child.current_tuple()?;
                    let row_key = self.eval_key(&tuple, trx)?;
                    if row_key == key {
                        feed_row(&self.aggregate_exprs, &mut accs, &tuple, self.parent_tuple.as_ref(), trx)?;
                    } else {
                        self.pending = Some((row_key, tuple));
                        break;
                    }
                }
                Err(e) if e.is_eof() => {
                    self.pending = None;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        let mut names = Vec::with_capacity(self.group_exprs.len() + self.aggregate_exprs.len());
        let mut values = Vec::with_capacity(names.capacity());
        for (ge, v) in self.group_exprs.iter().zip(key) {
            names.push(ge.name().to_string());
            values.push(v);
        }
        for (acc, ae) in accs.iter().zip(&self.aggregate_exprs) {
            names.push(ae.name().to_string());
            values.push(acc.finish());
        }
        self.current = Some(Tuple::Expression(ExpressionTuple { values, names }));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

/// Materializes the child's entire output, sorts it stably by
/// `units`, and replays it as `SplicedTuple`s sharing one column-major
/// buffer. `NULL`s sort last for `ASC`, first for `DESC` - the common
/// SQL convention ("NULLs are the biggest unknown").
#[derive(Debug)]
pub struct OrderBy {
    child: Box<dyn PhysicalOperator>,
    units: Vec<OrderByUnit>,
    parent_tuple: Option<Tuple>,
    rows: Option<Rc<Vec<Vec<Value>>>>,
    order: Vec<usize>,
    cursor: usize,
    column_names: Vec<Option<String>>,
}

impl OrderBy {
    pub fn new(child: Box<dyn PhysicalOperator>, units: Vec<OrderByUnit>) -> Self {
        OrderBy { child, units, parent_tuple: None, rows: None, order: Vec::new(), cursor: 0, column_names: Vec::new() }
    }
}

impl PhysicalOperator for OrderBy {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)?;
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut sort_keys: Vec<Vec<Value>> = Vec::new();
        self.column_names.clear();
        let mut first = true;
        loop {
            match self.child.next(trx) {
                Ok(()) => {
                    let tuple = self.child.current_tuple()?;
                    if first {
                        first = false;
                        self.column_names = (0..tuple.cell_num())
                            .map(|i| tuple.spec_at_pub(i).map(|s| s.field_name))
                            .collect();
                    }
                    let row: Vec<Value> = (0..tuple.cell_num()).map(|i| tuple.cell_at(i)).collect::<Result<_>>()?;
                    let key: Vec<Value> =
                        self.units.iter().map(|u| u.expr.get_value(&tuple, self.parent_tuple.as_ref(), trx)).collect::<Result<_>>()?;
                    rows.push(row);
                    sort_keys.push(key);
                }
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            }
        }
        self.child.close()?;
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            for (i, unit) in self.units.iter().enumerate() {
                let ord = compare_nullable(&sort_keys[a][i], &sort_keys[b][i], unit.asc);
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            CmpOrdering::Equal
        });
        self.rows = Some(Rc::new(rows));
        self.order = order;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        if self.cursor >= self.order.len() {
            return Err(Error::RecordEof);
        }
        self.cursor += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rows = None;
        self.order.clear();
        self.cursor = 0;
        Ok(())
    }

    fn current_tuple(&self) -> Result<Tuple> {
        let rows = self.rows.clone().ok_or_else(|| Error::internal("current_tuple called before open()"))?;
        let row = *self.order.get(self.cursor.wrapping_sub(1)).ok_or_else(|| Error::internal("current_tuple called before next()"))?;
        Ok(Tuple::Spliced(crate::tuple::SplicedTuple { columns: rows, row }))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

fn compare_nullable(a: &Value, b: &Value, asc: bool) -> CmpOrdering {
    match (a.is_null(), b.is_null()) {
        (true, true) => CmpOrdering::Equal,
        (true, false) => if asc { CmpOrdering::Greater } else { CmpOrdering::Less },
        (false, true) => if asc { CmpOrdering::Less } else { CmpOrdering::Greater },
        (false, false) => {
            let ord = a.compare(b).unwrap_or(CmpOrdering::Equal);
            if asc { ord } else { ord.reverse() }
        }
    }
}

/// Evaluates a named expression list against every child row.
#[derive(Debug)]
pub struct Project {
    child: Box<dyn PhysicalOperator>,
    exprs: Vec<(Expr, String)>,
    parent_tuple: Option<Tuple>,
    current: Option<Tuple>,
}

impl Project {
    pub fn new(child: Box<dyn PhysicalOperator>, exprs: Vec<(Expr, String)>) -> Self {
        Project { child, exprs, parent_tuple: None, current: None }
    }
}

impl PhysicalOperator for Project {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.next(trx)?;
        let tuple = self.child.current_tuple()?;
        let mut values = Vec::with_capacity(self.exprs.len());
        let mut names = Vec::with_capacity(self.exprs.len());
        for (e, name) in &self.exprs {
            values.push(e.get_value(&tuple, self.parent_tuple.as_ref(), trx)?);
            names.push(name.clone());
        }
        self.current = Some(Tuple::Expression(ExpressionTuple { values, names }));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        self.current.clone().ok_or_else(|| Error::internal("current_tuple called before next()"))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

/// Inserts literal rows (`INSERT ... VALUES`), rolling an `INSERT`
/// statement back to its pre-statement state if any row fails (e.g. a
/// unique index conflict), per the table's own rollback rules.
#[derive(Debug)]
pub struct Insert {
    table: SharedTable,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    inserted: Vec<RowId>,
    done: bool,
}

impl Insert {
    pub fn new(table: SharedTable, rows: Vec<Vec<Value>>) -> Self {
        Insert { table, rows, cursor: 0, inserted: Vec::new(), done: false }
    }
}

impl PhysicalOperator for Insert {
    fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
        self.cursor = 0;
        self.inserted.clear();
        self.done = false;
        Ok(())
    }

    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        if self.done {
            return Err(Error::RecordEof);
        }
        let mut table = self.table.borrow_mut();
        for row in &self.rows {
            match table.insert_record(row) {
                Ok(rid) => self.inserted.push(rid),
                Err(e) => {
                    for rid in self.inserted.drain(..) {
                        let _ = table.delete_record(rid);
                    }
                    return Err(e);
                }
            }
        }
        self.cursor = self.rows.len();
        self.done = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn current_tuple(&self) -> Result<Tuple> {
        Ok(Tuple::ValueList(crate::tuple::ValueListTuple::new(vec![Value::Int(self.cursor as i32)])))
    }
}

/// Deletes every row the child scan produces.
#[derive(Debug)]
pub struct Delete {
    child: Box<dyn PhysicalOperator>,
    table: SharedTable,
    count: i32,
    done: bool,
}

impl Delete {
    pub fn new(child: Box<dyn PhysicalOperator>, table: SharedTable) -> Self {
        Delete { child, table, count: 0, done: false }
    }
}

impl PhysicalOperator for Delete {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)?;
        self.count = 0;
        self.done = false;
        Ok(())
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        if self.done {
            return Err(Error::RecordEof);
        }
        loop {
            match self.child.next(trx) {
                Ok(()) => {
                    let tuple = self.child.current_tuple()?;
                    let rid = row_id_of(&tuple)?;
                    self.table.borrow_mut().delete_record(rid)?;
                    self.count += 1;
                }
                Err(e) if e.is_eof() => {
                    self.done = true;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        Ok(Tuple::ValueList(crate::tuple::ValueListTuple::new(vec![Value::Int(self.count)])))
    }
}

fn row_id_of(tuple: &Tuple) -> Result<RowId> {
    match tuple {
        Tuple::Row(t) => Ok(t.record.rid),
        _ => Err(Error::internal("Update/Delete child did not produce a row-backed tuple")),
    }
}

/// `UPDATE table SET col = expr, ... WHERE ...`. Per row: evaluate
/// every assignment against the *pre-update* row (so `SET a = a + 1`
/// reads the old `a`), patch the encoded columns and null bits, then
/// hand the old/new pair to the table. `RECORD_DUPLICATE_KEY` on an
/// unchanged row is treated as a no-op rather than an error - updating
/// a row to the value it already holds on a unique column is not a
/// conflict with itself.
#[derive(Debug)]
pub struct Update {
    child: Box<dyn PhysicalOperator>,
    table: SharedTable,
    assignments: Vec<(String, Expr)>,
    parent_tuple: Option<Tuple>,
    count: i32,
    done: bool,
    /// `(pre-image, post-image)` for every row successfully updated so
    /// far this statement, in application order - replayed in reverse
    /// if a later row in the same statement fails, so the statement is
    /// fully applied or fully rolled back rather than partially applied.
    applied: Vec<(Record, Record)>,
}

impl Update {
    pub fn new(child: Box<dyn PhysicalOperator>, table: SharedTable, assignments: Vec<(String, Expr)>) -> Self {
        Update { child, table, assignments, parent_tuple: None, count: 0, done: false, applied: Vec::new() }
    }

    /// Replays `applied` in reverse, restoring each row's pre-image. A
    /// rollback failure is logged rather than propagated - there is no
    /// better recovery available once the forward update itself failed.
    fn rollback_applied(&mut self) {
        let mut table = self.table.borrow_mut();
        for (old, new) in self.applied.drain(..).rev() {
            if let Err(e) = table.update_record(&new, &old) {
                tracing::warn!(error = %e, rid = ?old.rid, "failed to roll back row during UPDATE rollback");
            }
        }
    }
}

impl PhysicalOperator for Update {
    fn open(&mut self, trx: &dyn Trx) -> Result<()> {
        self.child.open(trx)?;
        self.count = 0;
        self.done = false;
        let table = self.table.borrow();
        let meta = table.table_meta();
        for (col, _) in &self.assignments {
            if meta.field_by_name(col).is_none() {
                return Err(Error::SchemaFieldMissing(col.clone()));
            }
        }
        Ok(())
    }

    fn next(&mut self, trx: &dyn Trx) -> Result<()> {
        if self.done {
            return Err(Error::RecordEof);
        }
        loop {
            match self.child.next(trx) {
                Ok(()) => {
                    let tuple = self.child.current_tuple()?;
                    let old = match &tuple {
                        Tuple::Row(t) => t.record.clone(),
                        _ => return Err(Error::internal("Update child did not produce a row-backed tuple")),
                    };
                    let mut values = match &tuple {
                        Tuple::Row(t) => t.values.clone(),
                        _ => unreachable!(),
                    };
                    let field_names: Vec<String> = {
                        let table = self.table.borrow();
                        table.table_meta().fields.iter().filter(|f| !f.system).map(|f| f.name.clone()).collect()
                    };
                    for (col, expr) in &self.assignments {
                        let idx = field_names
                            .iter()
                            .position(|n| n == col)
                            .ok_or_else(|| Error::SchemaFieldMissing(col.clone()))?;
                        values[idx] = expr.get_value(&tuple, self.parent_tuple.as_ref(), trx)?;
                    }
                    let new_data = {
                        let mut table = self.table.borrow_mut();
                        table.encode_for_update(&values)?
                    };
                    let new = Record::new(old.rid, new_data);
                    match self.table.borrow_mut().update_record(&old, &new) {
                        Ok(()) => {
                            self.count += 1;
                            self.applied.push((old, new));
                        }
                        Err(Error::RecordDuplicateKey) if old.data == new.data => {}
                        Err(e) => {
                            self.rollback_applied();
                            return Err(e);
                        }
                    }
                }
                Err(e) if e.is_eof() => {
                    self.done = true;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn current_tuple(&self) -> Result<Tuple> {
        Ok(Tuple::ValueList(crate::tuple::ValueListTuple::new(vec![Value::Int(self.count)])))
    }

    fn set_parent_tuple(&mut self, parent: Option<Tuple>) {
        self.parent_tuple = parent.clone();
        self.child.set_parent_tuple(parent);
    }
}

/// Drains the child without surfacing its rows, printing the physical
/// tree shape instead. `EXPLAIN`'s whole job is static, so the plan's
/// `Debug` rendering (captured at `open()` time) is the operator's one
/// output row.
#[derive(Debug)]
pub struct Explain {
    child: Box<dyn PhysicalOperator>,
    emitted: bool,
}

impl Explain {
    pub fn new(child: Box<dyn PhysicalOperator>) -> Self {
        Explain { child, emitted: false }
    }
}

impl PhysicalOperator for Explain {
    fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
        self.emitted = false;
        Ok(())
    }
    fn next(&mut self, _trx: &dyn Trx) -> Result<()> {
        if self.emitted {
            return Err(Error::RecordEof);
        }
        self.emitted = true;
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
    fn current_tuple(&self) -> Result<Tuple> {
        let plan = format!("{:#?}", self.child);
        Ok(Tuple::ValueList(crate::tuple::ValueListTuple::new(vec![Value::Chars(plan)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AggFunc, AggregateExpr, ComparisonExpr, ExprHeader, FieldExpr, ValueExpr};
    use crate::statement::OrderByUnit;
    use crate::storage::memory::{MemoryTable, NullTrx};
    use crate::value::AttrType;
    use std::cell::RefCell;

    fn table(name: &str, cols: Vec<(&str, AttrType, usize)>) -> SharedTable {
        Rc::new(RefCell::new(MemoryTable::new(name, cols)))
    }

    fn field(alias: &str, table: &SharedTable, name: &str) -> Expr {
        let meta = table.borrow().table_meta().clone();
        let (_, f) = meta.field_by_name(name).unwrap();
        Expr::Field(FieldExpr::new(crate::storage::Field::new(alias, f.clone())))
    }

    fn val(v: Value) -> Expr {
        Expr::Value(ValueExpr { header: ExprHeader::new(v.to_string()), value: v })
    }

    fn drain(op: &mut dyn PhysicalOperator, trx: &dyn Trx) -> Vec<Vec<Value>> {
        op.open(trx).unwrap();
        let mut out = Vec::new();
        loop {
            match op.next(trx) {
                Ok(()) => {
                    let t = op.current_tuple().unwrap();
                    out.push((0..t.cell_num()).map(|i| t.cell_at(i).unwrap()).collect());
                }
                Err(e) if e.is_eof() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        op.close().unwrap();
        out
    }

    #[test]
    fn nested_loop_join_applies_on_predicate() {
        let left = table("l", vec![("id", AttrType::Int, 4)]);
        let right = table("r", vec![("lid", AttrType::Int, 4), ("v", AttrType::Int, 4)]);
        for v in [1, 2] {
            left.borrow_mut().insert_record(&[Value::Int(v)]).unwrap();
        }
        right.borrow_mut().insert_record(&[Value::Int(1), Value::Int(100)]).unwrap();
        right.borrow_mut().insert_record(&[Value::Int(2), Value::Int(200)]).unwrap();
        right.borrow_mut().insert_record(&[Value::Int(9), Value::Int(900)]).unwrap();

        let on = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("l.id=r.lid"),
            op: CompOp::Eq,
            left: Box::new(field("l", &left, "id")),
            right: Some(Box::new(field("r", &right, "lid"))),
        });
        let mut join = NestedLoopJoin::new(
            Box::new(TableScan::new(left.clone(), "l".to_string())),
            Box::new(TableScan::new(right.clone(), "r".to_string())),
            Some(on),
        );
        let trx = NullTrx::default();
        let rows = drain(&mut join, &trx);
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(1), Value::Int(100)], vec![Value::Int(2), Value::Int(2), Value::Int(200)]]);
    }

    #[test]
    fn nested_loop_join_cross_join_without_on() {
        let left = table("l", vec![("a", AttrType::Int, 4)]);
        let right = table("r", vec![("b", AttrType::Int, 4)]);
        left.borrow_mut().insert_record(&[Value::Int(1)]).unwrap();
        left.borrow_mut().insert_record(&[Value::Int(2)]).unwrap();
        right.borrow_mut().insert_record(&[Value::Int(9)]).unwrap();
        let mut join = NestedLoopJoin::new(
            Box::new(TableScan::new(left, "l".to_string())),
            Box::new(TableScan::new(right, "r".to_string())),
            None,
        );
        let trx = NullTrx::default();
        let rows = drain(&mut join, &trx);
        assert_eq!(rows.len(), 2);
    }

    /// Scenario 3: `SELECT a, SUM(b) FROM t GROUP BY a` over rows
    /// `(1,2),(1,5),(3,4)` pre-sorted on `a` -> `[(1,7),(3,4)]`, one row
    /// per distinct key in first-appearance order.
    #[test]
    fn group_by_streaming_emits_one_row_per_group_in_order() {
        let t = table("t", vec![("a", AttrType::Int, 4), ("b", AttrType::Int, 4)]);
        for (a, b) in [(1, 2), (1, 5), (3, 4)] {
            t.borrow_mut().insert_record(&[Value::Int(a), Value::Int(b)]).unwrap();
        }
        let group_exprs = vec![field("t", &t, "a")];
        let aggregate_exprs = vec![Expr::Aggregate(AggregateExpr {
            header: ExprHeader::new("SUM(b)"),
            func: AggFunc::Sum,
            child: Some(Box::new(field("t", &t, "b"))),
        })];
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let sorted = Box::new(OrderBy::new(scan, vec![OrderByUnit { expr: field("t", &t, "a"), asc: true }]));
        let mut group_by = GroupBy::new(sorted, group_exprs, aggregate_exprs);
        let trx = NullTrx::default();
        let rows = drain(&mut group_by, &trx);
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Double(7.0)], vec![Value::Int(3), Value::Double(4.0)]]);
    }

    #[test]
    fn group_by_streaming_emits_single_group_for_uniform_key() {
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        for _ in 0..3 {
            t.borrow_mut().insert_record(&[Value::Int(5)]).unwrap();
        }
        let group_exprs = vec![field("t", &t, "a")];
        let aggregate_exprs = vec![Expr::Aggregate(AggregateExpr {
            header: ExprHeader::new("COUNT(*)"),
            func: AggFunc::Count,
            child: None,
        })];
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let mut group_by = GroupBy::new(scan, group_exprs, aggregate_exprs);
        let trx = NullTrx::default();
        let rows = drain(&mut group_by, &trx);
        assert_eq!(rows, vec![vec![Value::Int(5), Value::Int(3)]]);
    }

    #[test]
    fn aggregate_without_grouping_counts_filtered_rows() {
        // Scenario 2: SELECT COUNT(*) FROM t WHERE a > 1 -> [1].
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        t.borrow_mut().insert_record(&[Value::Int(1)]).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(3)]).unwrap();
        let pred = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("a>1"),
            op: CompOp::Gt,
            left: Box::new(field("t", &t, "a")),
            right: Some(Box::new(val(Value::Int(1)))),
        });
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let filtered = Box::new(Predicate::new(scan, pred));
        let aggregate_exprs = vec![Expr::Aggregate(AggregateExpr {
            header: ExprHeader::new("COUNT(*)"),
            func: AggFunc::Count,
            child: None,
        })];
        let mut agg = Aggregate::new(filtered, aggregate_exprs);
        let trx = NullTrx::default();
        let rows = drain(&mut agg, &trx);
        assert_eq!(rows, vec![vec![Value::Int(1)]]);
    }

    #[test]
    fn index_scan_point_lookup_matches_equality() {
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        t.borrow_mut().create_index("idx_a", "a", false).unwrap();
        for v in [1, 2, 3] {
            t.borrow_mut().insert_record(&[Value::Int(v)]).unwrap();
        }
        let mut scan =
            IndexScan::new(t.clone(), "t".to_string(), "idx_a".to_string(), Some(Value::Int(2)), Some(Value::Int(2)), true, true);
        let trx = NullTrx::default();
        let rows = drain(&mut scan, &trx);
        assert_eq!(rows, vec![vec![Value::Int(2)]]);
    }

    #[test]
    fn insert_rolls_back_every_row_on_unique_conflict() {
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        t.borrow_mut().create_index("idx_a", "a", true).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(1)]).unwrap();
        let mut insert = Insert::new(t.clone(), vec![vec![Value::Int(2)], vec![Value::Int(1)]]);
        let trx = NullTrx::default();
        insert.open(&trx).unwrap();
        let err = insert.next(&trx);
        assert!(err.is_err());
        // row (2) went in alongside the original (1); the conflicting
        // second row must leave no trace, and the operator's own
        // compensation removes its own earlier insert too.
        assert_eq!(t.borrow().scan_all().unwrap().len(), 1);
    }

    /// Scenario 5, forward direction: `UPDATE t SET b = 9 WHERE a = 1`
    /// over `(1,2),(3,4)` applies cleanly.
    #[test]
    fn update_applies_assignment_to_matching_rows() {
        let t = table("t", vec![("a", AttrType::Int, 4), ("b", AttrType::Int, 4)]);
        t.borrow_mut().insert_record(&[Value::Int(1), Value::Int(2)]).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(3), Value::Int(4)]).unwrap();
        let pred = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("a=1"),
            op: CompOp::Eq,
            left: Box::new(field("t", &t, "a")),
            right: Some(Box::new(val(Value::Int(1)))),
        });
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let filtered = Box::new(Predicate::new(scan, pred));
        let mut update = Update::new(filtered, t.clone(), vec![("b".to_string(), val(Value::Int(9)))]);
        let trx = NullTrx::default();
        update.open(&trx).unwrap();
        update.next(&trx).unwrap();
        let mut rows: Vec<Vec<Value>> = {
            let table_ref = t.borrow();
            table_ref.scan_all().unwrap().iter().map(|r| crate::storage::decode_record(table_ref.table_meta(), r, &*table_ref)).collect()
        };
        rows.sort_by_key(|r| match r[0] {
            Value::Int(i) => i,
            _ => 0,
        });
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(9)], vec![Value::Int(3), Value::Int(4)]]);
    }

    /// Update atomicity: a later row's failed `update_record` rolls the
    /// already-applied rows of the same statement back to their
    /// pre-statement state.
    #[test]
    fn update_rolls_back_already_applied_rows_on_later_failure() {
        let t = table("t", vec![("a", AttrType::Int, 4), ("b", AttrType::Int, 4)]);
        t.borrow_mut().create_index("idx_b", "b", true).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(1), Value::Int(10)]).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(2), Value::Int(20)]).unwrap();
        // Both rows get SET b = 5: the first genuinely changes (10 -> 5)
        // and succeeds, the second collides with the first row's *new*
        // value and must force a full rollback, restoring row one's `10`.
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let mut update = Update::new(scan, t.clone(), vec![("b".to_string(), val(Value::Int(5)))]);
        let trx = NullTrx::default();
        update.open(&trx).unwrap();
        let result = update.next(&trx);
        assert!(result.is_err());
        let mut rows: Vec<Vec<Value>> = {
            let table_ref = t.borrow();
            table_ref.scan_all().unwrap().iter().map(|r| crate::storage::decode_record(table_ref.table_meta(), r, &*table_ref)).collect()
        };
        rows.sort_by_key(|r| match r[0] {
            Value::Int(i) => i,
            _ => 0,
        });
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(10)], vec![Value::Int(2), Value::Int(20)]]);
    }

    #[test]
    fn order_by_sorts_descending_with_nulls_first() {
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        for v in [3, 1, 2] {
            t.borrow_mut().insert_record(&[Value::Int(v)]).unwrap();
        }
        t.borrow_mut().insert_record(&[Value::Null]).unwrap();
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let mut order_by = OrderBy::new(scan, vec![OrderByUnit { expr: field("t", &t, "a"), asc: false }]);
        let trx = NullTrx::default();
        let rows = drain(&mut order_by, &trx);
        assert_eq!(rows, vec![vec![Value::Null], vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]]);
    }

    #[test]
    fn delete_removes_matching_rows_only() {
        let t = table("t", vec![("a", AttrType::Int, 4)]);
        t.borrow_mut().insert_record(&[Value::Int(1)]).unwrap();
        t.borrow_mut().insert_record(&[Value::Int(2)]).unwrap();
        let pred = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("a=1"),
            op: CompOp::Eq,
            left: Box::new(field("t", &t, "a")),
            right: Some(Box::new(val(Value::Int(1)))),
        });
        let scan = Box::new(TableScan::new(t.clone(), "t".to_string()));
        let filtered = Box::new(Predicate::new(scan, pred));
        let mut delete = Delete::new(filtered, t.clone());
        let trx = NullTrx::default();
        delete.open(&trx).unwrap();
        delete.next(&trx).unwrap();
        assert_eq!(t.borrow().scan_all().unwrap().len(), 1);
    }
}
