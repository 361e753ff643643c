//! Expression Tree
//!
//! A polymorphic evaluator over [`crate::tuple::Tuple`]s. [`Expr`] is a
//! single tagged enum rather than a class hierarchy: shared fields
//! (display name, alias, the `pos` short-circuit hint) live on
//! [`ExprHeader`], which every variant embeds, and deep-copy/traversal are
//! table-driven on the tag instead of virtual dispatch.
//!
//! Two placeholder shapes the binder rewrites before anything downstream
//! ever sees them - `Star`/`UnboundField` and `UnboundAggregate` - never
//! appear as variants of this enum; they only exist transiently as
//! `crate::ast::ExprSql` nodes (see `crate::statement::binder`). A bound
//! `Expr` is always fully resolved.
//!
//! Correlated subqueries are the one place this tree steps outside a
//! single tuple: `get_value` takes both the row the expression is being
//! evaluated against (`tuple`) and, when that row sits inside a nested
//! subquery, the outer row it was correlated from (`parent`). An
//! `OuterField` node is the binder's rewrite of a field reference that
//! resolves to the parent scope rather than the current one.

use crate::error::{Error, Result};
use crate::physical::PhysicalOperator;
use crate::storage::{Field, Trx};
use crate::tuple::{Tuple, TupleCellSpec};
use crate::value::{AttrType, Value};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;

/// Fields every `Expr` variant carries regardless of shape: the name used
/// to label it in an output schema or look it up by `find_cell`, an
/// optional user-written alias, and a chunk-column hint.
#[derive(Debug, Clone)]
pub struct ExprHeader {
    pub name: String,
    pub alias: Option<String>,
    /// When `Some(i)`, the enclosing chunk already carries this
    /// expression's computed result at column `i`; vectorized evaluation
    /// consults this before recomputing.
    pub pos: Cell<Option<usize>>,
}

impl ExprHeader {
    pub fn new(name: impl Into<String>) -> Self {
        ExprHeader { name: name.into(), alias: None, pos: Cell::new(None) }
    }

    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
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
pub enum ConjOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysFuncKind {
    Length,
    Round,
    DateFormat,
}

#[derive(Debug, Clone)]
pub struct ValueExpr {
    pub header: ExprHeader,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct FieldExpr {
    pub header: ExprHeader,
    pub field: Field,
    cached_index: Cell<Option<usize>>,
}

impl FieldExpr {
    pub fn new(field: Field) -> Self {
        let name = field.field_name().to_string();
        FieldExpr { header: ExprHeader::new(name), field, cached_index: Cell::new(None) }
    }

    fn get_value(&self, tuple: &Tuple) -> Result<Value> {
        let spec = TupleCellSpec::new(self.field.table_name.clone(), self.field.field_name().to_string());
        let mut cached = self.cached_index.get();
        let value = tuple.find_cell(&spec, &mut cached)?;
        self.cached_index.set(cached);
        Ok(value)
    }
}

/// A field reference the binder resolved against the *parent* scope of a
/// correlated subquery rather than the current one.
#[derive(Debug, Clone)]
pub struct OuterFieldExpr {
    pub header: ExprHeader,
    pub field: Field,
    cached_index: Cell<Option<usize>>,
}

impl OuterFieldExpr {
    pub fn new(field: Field) -> Self {
        let name = field.field_name().to_string();
        OuterFieldExpr { header: ExprHeader::new(name), field, cached_index: Cell::new(None) }
    }

    fn get_value(&self, parent: Option<&Tuple>) -> Result<Value> {
        let parent = parent.ok_or_else(|| {
            Error::internal("outer field referenced with no parent tuple in scope")
        })?;
        let spec = TupleCellSpec::new(self.field.table_name.clone(), self.field.field_name().to_string());
        let mut cached = self.cached_index.get();
        let value = parent.find_cell(&spec, &mut cached)?;
        self.cached_index.set(cached);
        Ok(value)
    }
}

#[derive(Debug, Clone)]
pub struct CastExpr {
    pub header: ExprHeader,
    pub child: Box<Expr>,
    pub target: AttrType,
}

#[derive(Debug, Clone)]
pub struct ComparisonExpr {
    pub header: ExprHeader,
    pub op: CompOp,
    pub left: Box<Expr>,
    pub right: Option<Box<Expr>>,
}

impl ComparisonExpr {
    fn get_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        match self.op {
            CompOp::Eq | CompOp::Ne | CompOp::Lt | CompOp::Le | CompOp::Gt | CompOp::Ge => {
                let lv = self.left.get_value(tuple, parent, trx)?;
                let right = self.right.as_ref().ok_or_else(|| {
                    Error::internal("binary comparison missing right operand")
                })?;
                let rv = right.get_value(tuple, parent, trx)?;
                if lv.is_null() || rv.is_null() {
                    // Standard three-valued SQL logic: unknown propagates:
                    // IS [NOT] NULL are the dedicated tests for nullness.
                    return Ok(Value::Null);
                }
                let ord = lv.compare(&rv)?;
                let b = match self.op {
                    CompOp::Eq => ord == Ordering::Equal,
                    CompOp::Ne => ord != Ordering::Equal,
                    CompOp::Lt => ord == Ordering::Less,
                    CompOp::Le => ord != Ordering::Greater,
                    CompOp::Gt => ord == Ordering::Greater,
                    CompOp::Ge => ord != Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Boolean(b))
            }
            CompOp::IsNull => {
                let lv = self.left.get_value(tuple, parent, trx)?;
                Ok(Value::Boolean(lv.is_null()))
            }
            CompOp::IsNotNull => {
                let lv = self.left.get_value(tuple, parent, trx)?;
                Ok(Value::Boolean(!lv.is_null()))
            }
            CompOp::Exists | CompOp::NotExists => {
                let subquery = self.left.as_subquery()?;
                let exists = subquery.exists(tuple, trx)?;
                Ok(Value::Boolean(exists == (self.op == CompOp::Exists)))
            }
            CompOp::In | CompOp::NotIn => {
                let lv = self.left.get_value(tuple, parent, trx)?;
                if lv.is_null() {
                    // Both IN and NOT IN are false when the probe is NULL.
                    return Ok(Value::Boolean(false));
                }
                let right = self.right.as_ref().ok_or_else(|| {
                    Error::internal("IN/NOT IN missing right operand")
                })?;
                let rhs = right.iter_rhs_values(tuple, parent, trx)?;
                let mut matched = false;
                let mut any_null = false;
                for rv in &rhs {
                    if rv.is_null() {
                        any_null = true;
                        continue;
                    }
                    if lv.compare(rv)? == Ordering::Equal {
                        matched = true;
                        break;
                    }
                }
                Ok(Value::Boolean(match self.op {
                    CompOp::In => matched,
                    CompOp::NotIn => !matched && !any_null,
                    _ => unreachable!(),
                }))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConjunctionExpr {
    pub header: ExprHeader,
    pub op: ConjOp,
    pub children: Vec<Expr>,
}

impl ConjunctionExpr {
    fn get_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        for child in &self.children {
            let v = child.get_value(tuple, parent, trx)?;
            let b = v.as_bool().ok_or_else(|| {
                Error::invalid_argument("conjunction operand did not evaluate to BOOLEAN")
            })?;
            match self.op {
                ConjOp::And if !b => return Ok(Value::Boolean(false)),
                ConjOp::Or if b => return Ok(Value::Boolean(true)),
                _ => {}
            }
        }
        Ok(Value::Boolean(self.op == ConjOp::And))
    }
}

/// The sentinel returned by integer/float division by (near-)zero. Kept
/// as a conscious compatibility decision, not an oversight - see
/// `DESIGN.md`.
pub const INT_DIV_ZERO_SENTINEL: i32 = i32::MAX;
pub const FLOAT_DIV_ZERO_SENTINEL: f64 = f64::MAX;
const FLOAT_DIV_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ArithmeticExpr {
    pub header: ExprHeader,
    pub op: ArithOp,
    pub left: Box<Expr>,
    pub right: Option<Box<Expr>>,
}

impl ArithmeticExpr {
    fn get_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        let lv = self.left.get_value(tuple, parent, trx)?;
        if self.op == ArithOp::Negate {
            return Self::negate(&lv);
        }
        let right = self.right.as_ref().ok_or_else(|| {
            Error::internal("binary arithmetic missing right operand")
        })?;
        let rv = right.get_value(tuple, parent, trx)?;
        if lv.is_null() || rv.is_null() {
            return Ok(Value::Null);
        }
        let both_int = matches!(lv, Value::Int(_)) && matches!(rv, Value::Int(_));
        if both_int && self.op != ArithOp::Div {
            let (a, b) = (Self::as_i32(&lv)?, Self::as_i32(&rv)?);
            let r = match self.op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                _ => unreachable!(),
            };
            return Ok(Value::Int(r));
        }
        if both_int {
            let (a, b) = (Self::as_i32(&lv)?, Self::as_i32(&rv)?);
            if b == 0 {
                return Ok(Value::Int(INT_DIV_ZERO_SENTINEL));
            }
            return Ok(Value::Int(a.wrapping_div(b)));
        }
        let (a, b) = (
            lv.as_numeric().ok_or_else(|| Error::invalid_argument("non-numeric arithmetic operand"))?,
            rv.as_numeric().ok_or_else(|| Error::invalid_argument("non-numeric arithmetic operand"))?,
        );
        let r = match self.op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => {
                if b.abs() < FLOAT_DIV_EPSILON {
                    FLOAT_DIV_ZERO_SENTINEL
                } else {
                    a / b
                }
            }
            ArithOp::Negate => unreachable!(),
        };
        Ok(Value::Float(r as f32))
    }

    fn negate(v: &Value) -> Result<Value> {
        match v {
            Value::Int(a) => Ok(Value::Int(-a)),
            Value::Long(a) => Ok(Value::Long(-a)),
            Value::Float(a) => Ok(Value::Float(-a)),
            Value::Double(a) => Ok(Value::Double(-a)),
            Value::Null => Ok(Value::Null),
            _ => Err(Error::invalid_argument("cannot negate a non-numeric value")),
        }
    }

    fn as_i32(v: &Value) -> Result<i32> {
        match v {
            Value::Int(a) => Ok(*a),
            _ => Err(Error::internal("expected INT operand")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub header: ExprHeader,
    pub func: AggFunc,
    /// `None` only for `COUNT(*)`.
    pub child: Option<Box<Expr>>,
}

impl AggregateExpr {
    /// Aggregates never recompute from raw rows here - by the time an
    /// `Aggregate` expression is evaluated, a `GroupBy`/`Aggregate`
    /// physical operator has already materialized one value per
    /// aggregate into the tuple it emits, named after this expression.
    /// This just looks that value up.
    fn get_value(&self, tuple: &Tuple) -> Result<Value> {
        let spec = TupleCellSpec::unqualified(self.header.name.clone());
        let mut cache = None;
        tuple.find_cell(&spec, &mut cache)
    }
}

#[derive(Debug, Clone)]
pub struct SysFuncExpr {
    pub header: ExprHeader,
    pub kind: SysFuncKind,
    pub args: Vec<Expr>,
}

impl SysFuncExpr {
    fn get_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        match self.kind {
            SysFuncKind::Length => {
                let v = self.arg(0)?.get_value(tuple, parent, trx)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let s = match &v {
                    Value::Chars(s) | Value::Text(s) => s,
                    _ => return Err(Error::invalid_argument("LENGTH expects a CHARS/TEXT argument")),
                };
                Ok(Value::Int(s.len() as i32))
            }
            SysFuncKind::Round => {
                let v = self.arg(0)?.get_value(tuple, parent, trx)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let precision = match self.args.get(1) {
                    Some(e) => match e.get_value(tuple, parent, trx)? {
                        Value::Int(p) => p,
                        other => {
                            return Err(Error::invalid_argument(format!(
                                "ROUND precision must be INT, got {}",
                                other.attr_type()
                            )))
                        }
                    },
                    None => 0,
                };
                let x = v.as_numeric().ok_or_else(|| Error::invalid_argument("ROUND expects a numeric argument"))?;
                Ok(Value::Float(round_half_away_from_zero(x, precision) as f32))
            }
            SysFuncKind::DateFormat => {
                let v = self.arg(0)?.get_value(tuple, parent, trx)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let date = match &v {
                    Value::Date(d) => *d,
                    _ => return Err(Error::invalid_argument("DATE_FORMAT expects a DATE argument")),
                };
                let fmt = match self.arg(1)?.get_value(tuple, parent, trx)? {
                    Value::Chars(s) | Value::Text(s) => s,
                    _ => return Err(Error::invalid_argument("DATE_FORMAT expects a CHARS format string")),
                };
                Ok(Value::Chars(date.format(&fmt)))
            }
        }
    }

    fn arg(&self, i: usize) -> Result<&Expr> {
        self.args.get(i).ok_or_else(|| Error::invalid_argument(format!("{:?} missing argument {i}", self.kind)))
    }
}

/// Rounds `x` to `precision` fractional digits, ties away from zero. The
/// engine this is modeled on instead incremented the float's bit pattern
/// before formatting, which is not rounding at all; this replaces that
/// bug rather than reproducing it.
fn round_half_away_from_zero(x: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (x * factor).round() / factor
}

#[derive(Debug, Clone)]
pub struct ExprListExpr {
    pub header: ExprHeader,
    pub items: Vec<Expr>,
    cursor: Cell<usize>,
}

impl ExprListExpr {
    pub fn new(items: Vec<Expr>) -> Self {
        ExprListExpr { header: ExprHeader::new("?list"), items, cursor: Cell::new(0) }
    }

    pub fn reset(&self) {
        self.cursor.set(0);
    }

    /// Advances the cursor and evaluates the next item, or `RECORD_EOF`
    /// once exhausted - the resettable-iteration contract `IN`'s right
    /// operand needs.
    fn next_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        let i = self.cursor.get();
        let item = self.items.get(i).ok_or(Error::RecordEof)?;
        self.cursor.set(i + 1);
        item.get_value(tuple, parent, trx)
    }
}

/// Before or after physical lowering: a nested subquery's logical plan is
/// generated recursively by the logical plan generator, then compiled to
/// a physical operator before the enclosing statement ever runs.
#[derive(Debug)]
pub enum SubQueryPlan {
    Unbound(Box<crate::statement::SelectStmt>),
    Compiled(Box<dyn PhysicalOperator>),
}

#[derive(Debug)]
pub struct SubQueryExpr {
    pub header: ExprHeader,
    pub plan: RefCell<SubQueryPlan>,
}

impl SubQueryExpr {
    pub fn compiled(name: impl Into<String>, op: Box<dyn PhysicalOperator>) -> Self {
        SubQueryExpr { header: ExprHeader::new(name), plan: RefCell::new(SubQueryPlan::Compiled(op)) }
    }

    fn with_operator<T>(
        &self,
        tuple: &Tuple,
        trx: &dyn Trx,
        body: impl FnOnce(&mut dyn PhysicalOperator) -> Result<T>,
    ) -> Result<T> {
        let mut plan = self.plan.borrow_mut();
        match &mut *plan {
            SubQueryPlan::Compiled(op) => run_subquery_scoped(op.as_mut(), trx, Some(tuple.clone()), body),
            SubQueryPlan::Unbound(_) => {
                Err(Error::internal("subquery evaluated before physical compilation"))
            }
        }
    }

    pub fn exists(&self, tuple: &Tuple, trx: &dyn Trx) -> Result<bool> {
        self.with_operator(tuple, trx, |op| match op.next(trx) {
            Ok(()) => Ok(true),
            Err(e) if e.is_eof() => Ok(false),
            Err(e) => Err(e),
        })
    }

    /// Scalar-context evaluation (a bare `SubQuery` node, or the RHS of
    /// `=`/`<`/.../UPDATE's `SET`): EOF yields NULL, and a second
    /// available row is an error - a scalar subquery must produce at
    /// most one row.
    pub fn scalar(&self, tuple: &Tuple, trx: &dyn Trx) -> Result<Value> {
        self.with_operator(tuple, trx, |op| {
            let first = match op.next(trx) {
                Ok(()) => op.current_tuple()?.cell_at(0)?,
                Err(e) if e.is_eof() => return Ok(Value::Null),
                Err(e) => return Err(e),
            };
            match op.next(trx) {
                Ok(()) => Err(Error::invalid_argument("scalar subquery returned more than one row")),
                Err(e) if e.is_eof() => Ok(first),
                Err(e) => Err(e),
            }
        })
    }

    /// `IN (SELECT ...)` context: drains every row, taking the first
    /// cell of each.
    pub fn iter_values(&self, tuple: &Tuple, trx: &dyn Trx) -> Result<Vec<Value>> {
        self.with_operator(tuple, trx, |op| {
            let mut out = Vec::new();
            loop {
                match op.next(trx) {
                    Ok(()) => out.push(op.current_tuple()?.cell_at(0)?),
                    Err(e) if e.is_eof() => return Ok(out),
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

impl Clone for SubQueryExpr {
    fn clone(&self) -> Self {
        panic!("SubQueryExpr must be deep-copied via Expr::deep_copy, not Clone")
    }
}

/// Runs `body` against an opened, parent-tuple-wired operator, closing it
/// on every exit path - including when `body` or `open` itself errors -
/// per the guaranteed-release scoped-cleanup contract subqueries need.
fn run_subquery_scoped<T>(
    op: &mut dyn PhysicalOperator,
    trx: &dyn Trx,
    parent: Option<Tuple>,
    body: impl FnOnce(&mut dyn PhysicalOperator) -> Result<T>,
) -> Result<T> {
    op.set_parent_tuple(parent);
    op.open(trx)?;
    struct CloseGuard<'a>(&'a mut dyn PhysicalOperator);
    impl Drop for CloseGuard<'_> {
        fn drop(&mut self) {
            let _ = self.0.close();
        }
    }
    let guard = CloseGuard(op);
    body(guard.0)
}

/// A polymorphic expression-tree node. See the module documentation for
/// why this is a closed tagged union rather than a trait-object
/// hierarchy.
#[derive(Debug, Clone)]
pub enum Expr {
    Value(ValueExpr),
    Field(FieldExpr),
    OuterField(OuterFieldExpr),
    Cast(CastExpr),
    Comparison(ComparisonExpr),
    Conjunction(ConjunctionExpr),
    Arithmetic(ArithmeticExpr),
    Aggregate(AggregateExpr),
    SysFunc(SysFuncExpr),
    ExprList(ExprListExpr),
    SubQuery(std::rc::Rc<SubQueryExpr>),
}

impl Expr {
    pub fn header(&self) -> &ExprHeader {
        match self {
            Expr::Value(e) => &e.header,
            Expr::Field(e) => &e.header,
            Expr::OuterField(e) => &e.header,
            Expr::Cast(e) => &e.header,
            Expr::Comparison(e) => &e.header,
            Expr::Conjunction(e) => &e.header,
            Expr::Arithmetic(e) => &e.header,
            Expr::Aggregate(e) => &e.header,
            Expr::SysFunc(e) => &e.header,
            Expr::ExprList(e) => &e.header,
            Expr::SubQuery(e) => &e.header,
        }
    }

    pub fn name(&self) -> &str {
        self.header().display_name()
    }

    pub fn get_value(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Value> {
        if let Some(pos) = self.header().pos.get() {
            return tuple.cell_at(pos);
        }
        match self {
            Expr::Value(e) => Ok(e.value.clone()),
            Expr::Field(e) => e.get_value(tuple),
            Expr::OuterField(e) => e.get_value(parent),
            Expr::Cast(e) => e.child.get_value(tuple, parent, trx)?.cast_to(e.target),
            Expr::Comparison(e) => e.get_value(tuple, parent, trx),
            Expr::Conjunction(e) => e.get_value(tuple, parent, trx),
            Expr::Arithmetic(e) => e.get_value(tuple, parent, trx),
            Expr::Aggregate(e) => e.get_value(tuple),
            Expr::SysFunc(e) => e.get_value(tuple, parent, trx),
            Expr::SubQuery(e) => e.scalar(tuple, trx),
            Expr::ExprList(_) => Err(Error::Unimplemented(
                "ExprList has no single value outside of IN's right-hand iteration".into(),
            )),
        }
    }

    /// The right-hand side of `IN`/`NOT IN`: either a resettable literal
    /// list or a compiled subquery, both materialized eagerly.
    fn iter_rhs_values(&self, tuple: &Tuple, parent: Option<&Tuple>, trx: &dyn Trx) -> Result<Vec<Value>> {
        match self {
            Expr::ExprList(list) => {
                list.reset();
                let mut out = Vec::with_capacity(list.items.len());
                loop {
                    match list.next_value(tuple, parent, trx) {
                        Ok(v) => out.push(v),
                        Err(e) if e.is_eof() => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(out)
            }
            Expr::SubQuery(sq) => sq.iter_values(tuple, trx),
            _ => Err(Error::internal("IN/NOT IN right-hand side must be a list or subquery")),
        }
    }

    fn as_subquery(&self) -> Result<&SubQueryExpr> {
        match self {
            Expr::SubQuery(sq) => Ok(sq),
            _ => Err(Error::internal("EXISTS/NOT EXISTS operand must be a subquery")),
        }
    }

    pub fn value_type(&self) -> AttrType {
        match self {
            Expr::Value(e) => e.value.attr_type(),
            Expr::Field(e) => e.field.attr_type(),
            Expr::OuterField(e) => e.field.attr_type(),
            Expr::Cast(e) => e.target,
            Expr::Comparison(_) => AttrType::Boolean,
            Expr::Conjunction(_) => AttrType::Boolean,
            Expr::Arithmetic(e) => {
                let both_int = e.left.value_type() == AttrType::Int
                    && e.right.as_ref().is_none_or(|r| r.value_type() == AttrType::Int);
                if e.op == ArithOp::Negate {
                    e.left.value_type()
                } else if both_int {
                    AttrType::Int
                } else {
                    AttrType::Float
                }
            }
            Expr::Aggregate(e) => match e.func {
                AggFunc::Count => AttrType::Int,
                _ => e.child.as_ref().map(|c| c.value_type()).unwrap_or(AttrType::Double),
            },
            Expr::SysFunc(e) => match e.kind {
                SysFuncKind::Length => AttrType::Int,
                SysFuncKind::Round => AttrType::Float,
                SysFuncKind::DateFormat => AttrType::Chars,
            },
            Expr::ExprList(_) => AttrType::Undefined,
            Expr::SubQuery(_) => AttrType::Undefined,
        }
    }

    /// Produces an independent subtree. `SubQuery` nodes cannot be
    /// `Clone`d (their compiled operator owns scanner state), so a bound
    /// expression tree that might contain one is always copied through
    /// here rather than via `#[derive(Clone)]` on the enclosing owner.
    pub fn deep_copy(&self) -> Expr {
        match self {
            Expr::Value(e) => Expr::Value(e.clone()),
            Expr::Field(e) => Expr::Field(FieldExpr {
                header: e.header.clone(),
                field: e.field.clone(),
                cached_index: Cell::new(e.cached_index.get()),
            }),
            Expr::OuterField(e) => Expr::OuterField(OuterFieldExpr {
                header: e.header.clone(),
                field: e.field.clone(),
                cached_index: Cell::new(e.cached_index.get()),
            }),
            Expr::Cast(e) => Expr::Cast(CastExpr {
                header: e.header.clone(),
                child: Box::new(e.child.deep_copy()),
                target: e.target,
            }),
            Expr::Comparison(e) => Expr::Comparison(ComparisonExpr {
                header: e.header.clone(),
                op: e.op,
                left: Box::new(e.left.deep_copy()),
                right: e.right.as_ref().map(|r| Box::new(r.deep_copy())),
            }),
            Expr::Conjunction(e) => Expr::Conjunction(ConjunctionExpr {
                header: e.header.clone(),
                op: e.op,
                children: e.children.iter().map(Expr::deep_copy).collect(),
            }),
            Expr::Arithmetic(e) => Expr::Arithmetic(ArithmeticExpr {
                header: e.header.clone(),
                op: e.op,
                left: Box::new(e.left.deep_copy()),
                right: e.right.as_ref().map(|r| Box::new(r.deep_copy())),
            }),
            Expr::Aggregate(e) => Expr::Aggregate(AggregateExpr {
                header: e.header.clone(),
                func: e.func,
                child: e.child.as_ref().map(|c| Box::new(c.deep_copy())),
            }),
            Expr::SysFunc(e) => Expr::SysFunc(SysFuncExpr {
                header: e.header.clone(),
                kind: e.kind,
                args: e.args.iter().map(Expr::deep_copy).collect(),
            }),
            Expr::ExprList(e) => Expr::ExprList(ExprListExpr {
                header: e.header.clone(),
                items: e.items.iter().map(Expr::deep_copy).collect(),
                cursor: Cell::new(0),
            }),
            // A subquery's compiled operator cannot be meaningfully
            // deep-copied (it owns live scanner state); planners that
            // need an independent copy re-lower it from `SelectStmt`
            // instead of cloning this node.
            Expr::SubQuery(e) => Expr::SubQuery(e.clone()),
        }
    }

    /// Post-order traversal (children before node) under an optional
    /// predicate that may prune a subtree from being visited further.
    pub fn traverse(&self, filter: &mut dyn FnMut(&Expr) -> bool, visit: &mut dyn FnMut(&Expr)) {
        if !filter(self) {
            return;
        }
        for child in self.children() {
            child.traverse(filter, visit);
        }
        visit(self);
    }

    /// Like [`Self::traverse`] but short-circuits on the first visitor
    /// error instead of collecting results.
    pub fn traverse_check(&self, visit: &mut dyn FnMut(&Expr) -> Result<()>) -> Result<()> {
        for child in self.children() {
            child.traverse_check(visit)?;
        }
        visit(self)
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Value(_) | Expr::Field(_) | Expr::OuterField(_) => Vec::new(),
            Expr::Cast(e) => vec![e.child.as_ref()],
            Expr::Comparison(e) => {
                let mut v = vec![e.left.as_ref()];
                if let Some(r) = &e.right {
                    v.push(r.as_ref());
                }
                v
            }
            Expr::Conjunction(e) => e.children.iter().collect(),
            Expr::Arithmetic(e) => {
                let mut v = vec![e.left.as_ref()];
                if let Some(r) = &e.right {
                    v.push(r.as_ref());
                }
                v
            }
            Expr::Aggregate(e) => e.child.iter().map(|c| c.as_ref()).collect(),
            Expr::SysFunc(e) => e.args.iter().collect(),
            Expr::ExprList(e) => e.items.iter().collect(),
            Expr::SubQuery(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FieldMeta, memory::NullTrx};
    use crate::tuple::ValueListTuple;
    use crate::value::AttrType;

    fn field_expr(name: &str, idx_hint: Option<usize>) -> Expr {
        let meta = FieldMeta {
            name: name.into(),
            offset: 0,
            length: 4,
            kind: AttrType::Int,
            nullable: true,
            visible: true,
            system: false,
        };
        let e = FieldExpr::new(Field::new("t", meta));
        if let Some(i) = idx_hint {
            e.cached_index.set(Some(i));
        }
        Expr::Field(e)
    }

    fn row(values: Vec<Value>, names: Vec<&str>) -> Tuple {
        let specs = names.into_iter().map(|n| Some(TupleCellSpec::new("t", n))).collect();
        Tuple::ValueList(ValueListTuple::named(values, specs))
    }

    #[test]
    fn arithmetic_int_div_zero_yields_sentinel() {
        let expr = Expr::Arithmetic(ArithmeticExpr {
            header: ExprHeader::new("a/b"),
            op: ArithOp::Div,
            left: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("a"), value: Value::Int(5) })),
            right: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("b"), value: Value::Int(0) })).into(),
        });
        let tuple = Tuple::Empty;
        let trx = NullTrx::default();
        assert_eq!(expr.get_value(&tuple, None, &trx).unwrap(), Value::Int(INT_DIV_ZERO_SENTINEL));
    }

    #[test]
    fn arithmetic_int_add_stays_int() {
        let expr = Expr::Arithmetic(ArithmeticExpr {
            header: ExprHeader::new("a+b"),
            op: ArithOp::Add,
            left: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("a"), value: Value::Int(3) })),
            right: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("b"), value: Value::Int(4) })).into(),
        });
        assert_eq!(expr.value_type(), AttrType::Int);
        let trx = NullTrx::default();
        assert_eq!(expr.get_value(&Tuple::Empty, None, &trx).unwrap(), Value::Int(7));
    }

    #[test]
    fn comparison_null_propagates_unknown() {
        let cmp = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("a=b"),
            op: CompOp::Eq,
            left: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("a"), value: Value::Null })),
            right: Some(Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("b"), value: Value::Int(1) }))),
        });
        let trx = NullTrx::default();
        assert_eq!(cmp.get_value(&Tuple::Empty, None, &trx).unwrap(), Value::Null);
    }

    #[test]
    fn in_list_semantics() {
        let list = Expr::ExprList(ExprListExpr::new(vec![
            Expr::Value(ValueExpr { header: ExprHeader::new("1"), value: Value::Int(1) }),
            Expr::Value(ValueExpr { header: ExprHeader::new("null"), value: Value::Null }),
        ]));
        let in_expr = Expr::Comparison(ComparisonExpr {
            header: ExprHeader::new("x in (1,null)"),
            op: CompOp::NotIn,
            left: Box::new(Expr::Value(ValueExpr { header: ExprHeader::new("x"), value: Value::Int(2) })),
            right: Some(Box::new(list)),
        });
        let trx = NullTrx::default();
        // 2 NOT IN (1, NULL): no match, but list contains NULL -> false.
        assert_eq!(in_expr.get_value(&Tuple::Empty, None, &trx).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn field_expr_caches_index() {
        let expr = field_expr("a", None);
        let tuple = row(vec![Value::Int(1), Value::Int(2)], vec!["a", "b"]);
        let trx = NullTrx::default();
        assert_eq!(expr.get_value(&tuple, None, &trx).unwrap(), Value::Int(1));
        if let Expr::Field(f) = &expr {
            assert_eq!(f.cached_index.get(), Some(0));
        }
    }

    #[test]
    fn deep_copy_preserves_independent_cache() {
        let original = field_expr("a", Some(5));
        let copy = original.deep_copy();
        if let Expr::Field(f) = &copy {
            assert_eq!(f.cached_index.get(), Some(5));
        }
    }

    #[test]
    fn round_half_away_from_zero_fixes_legacy_bug() {
        assert_eq!(round_half_away_from_zero(2.345, 2), 2.35);
        assert_eq!(round_half_away_from_zero(-2.345, 2), -2.35);
        assert_eq!(round_half_away_from_zero(4.0, 0), 4.0);
    }

    #[test]
    fn date_format_scenario() {
        let date = crate::value::Date::from_ymd(2024, 3, 1).unwrap();
        assert_eq!(date.format("%Y-%m-%D"), "2024-03-1st");
    }
}
