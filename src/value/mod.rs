//! Value & Type System
//!
//! The bottom layer of the execution core: a tagged scalar [`Value`] and
//! its [`AttrType`] tag, shared by every layer above it.
//!
//! ```text
//!            +-----------+
//!   raw bytes|  Value    | <--- Expression::get_value / get_column
//!            +-----------+
//!                  ^
//!                  | compare() / cast_to() / arithmetic
//!                  |
//!            ComparisonExpr, ArithmeticExpr, CastExpr (see crate::expr)
//! ```
//!
//! `Value` never borrows: every variant owns its payload, so tuples and
//! chunks can hand out copies without fighting the borrow checker over
//! record bytes that may be rewritten mid-scan.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Tag for a [`Value`]'s kind. `Undefined` only ever appears on an
/// unbound expression before the binder has resolved it; no `Value`
/// instance carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Undefined,
    Int,
    Float,
    Double,
    Chars,
    Date,
    Boolean,
    Null,
    Long,
    Text,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Undefined => "undefined",
            AttrType::Int => "int",
            AttrType::Float => "float",
            AttrType::Double => "double",
            AttrType::Chars => "chars",
            AttrType::Date => "date",
            AttrType::Boolean => "boolean",
            AttrType::Null => "null",
            AttrType::Long => "long",
            AttrType::Text => "text",
        };
        f.write_str(name)
    }
}

const DATE_MIN: (i32, u32, u32) = (1970, 1, 1);
const DATE_MAX: (i32, u32, u32) = (2038, 2, 28);

/// A validated Y-M-D calendar date, restricted to the inclusive range
/// 1970-01-01..2038-02-28 (the range the storage layer's 4-byte date
/// encoding can round-trip without ambiguity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Date {
    year: i32,
    month: u32,
    day: u32,
}

impl Date {
    /// Constructs a validated date. Unlike the system this core is modeled
    /// on - which silently produced a `(0, 0, 0)` sentinel on invalid
    /// input and relied on the caller to notice - an invalid year/month/day
    /// is a hard `InvalidArgument` error.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        if !Self::is_valid(year, month, day) {
            return Err(Error::invalid_argument(format!(
                "invalid date {year:04}-{month:02}-{day:02}"
            )));
        }
        Ok(Date { year, month, day })
    }

    /// Range check plus full Gregorian calendar validity (month range,
    /// day-of-month including leap years), the latter delegated to
    /// `chrono` rather than hand-rolled.
    fn is_valid(year: i32, month: u32, day: u32) -> bool {
        if (year, month, day) < DATE_MIN || (year, month, day) > DATE_MAX {
            return false;
        }
        chrono::NaiveDate::from_ymd_opt(year, month, day).is_some()
    }

    pub fn is_leap_year(year: i32) -> bool {
        chrono::NaiveDate::from_ymd_opt(year, 2, 29).is_some()
    }

    pub fn days_in_month(year: i32, month: u32) -> u32 {
        let Some(first) = chrono::NaiveDate::from_ymd_opt(year, month, 1) else { return 0 };
        let next_month = first + chrono::Months::new(1);
        (next_month - first).num_days() as u32
    }

    pub fn year(&self) -> i32 {
        self.year
    }
    pub fn month(&self) -> u32 {
        self.month
    }
    pub fn day(&self) -> u32 {
        self.day
    }

    /// Formats the date per the `DATE_FORMAT(date, fmt)` SQL function's
    /// directive subset: `%Y` 4-digit year, `%y` 2-digit year, `%m`/`%c`
    /// zero-padded/bare month, `%d`/`%e` zero-padded/bare day, `%M` full
    /// month name, `%D` day with English ordinal suffix. A `%` before an
    /// unrecognized letter passes through as that letter only, dropping
    /// the `%`; a trailing `%` with nothing after it is dropped.
    pub fn format(&self, fmt_str: &str) -> String {
        const MONTH_NAMES: [&str; 12] = [
            "January", "February", "March", "April", "May", "June", "July", "August",
            "September", "October", "November", "December",
        ];
        let mut out = String::with_capacity(fmt_str.len());
        let mut chars = fmt_str.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('Y') => out.push_str(&format!("{:04}", self.year)),
                Some('y') => out.push_str(&format!("{:02}", self.year % 100)),
                Some('m') => out.push_str(&format!("{:02}", self.month)),
                Some('c') => out.push_str(&self.month.to_string()),
                Some('d') => out.push_str(&format!("{:02}", self.day)),
                Some('e') => out.push_str(&self.day.to_string()),
                Some('M') => out.push_str(MONTH_NAMES[(self.month - 1) as usize]),
                Some('D') => {
                    let suffix = match self.day {
                        1 | 21 | 31 => "st",
                        2 | 22 => "nd",
                        3 | 23 => "rd",
                        _ => "th",
                    };
                    out.push_str(&format!("{}{}", self.day, suffix));
                }
                Some(other) => out.push(other),
                None => {}
            }
        }
        out
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A tagged scalar. Every operator, expression and comparison in the
/// core ultimately produces or consumes one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Chars(String),
    Date(Date),
    Boolean(bool),
    Long(i64),
    /// Out-of-line large text. The core treats it like `Chars` for most
    /// purposes; only the storage collaborator interface cares that it is
    /// stored as an indirection rather than inline.
    Text(String),
    Null,
}

impl Value {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Int(_) => AttrType::Int,
            Value::Float(_) => AttrType::Float,
            Value::Double(_) => AttrType::Double,
            Value::Chars(_) => AttrType::Chars,
            Value::Date(_) => AttrType::Date,
            Value::Boolean(_) => AttrType::Boolean,
            Value::Long(_) => AttrType::Long,
            Value::Text(_) => AttrType::Text,
            Value::Null => AttrType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widens any numeric kind to `f64`; `None` for non-numeric kinds.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Three-way comparison against another value.
    ///
    /// Cross-kind comparison is defined only for `Int`/`Float`/`Double`/
    /// `Long` against one another (all widened to `f64`); every other pair
    /// of differing kinds is a [`Error::SchemaFieldTypeMismatch`]. `NULL`
    /// is handled by the caller (see [`crate::expr::ComparisonExpr`]), not
    /// here: a `Value::Null` reaching `compare` is always a caller bug.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use Value::*;
        match (self, other) {
            (Chars(a), Chars(b)) => Ok(a.cmp(b)),
            (Text(a), Text(b)) => Ok(a.cmp(b)),
            (Chars(a), Text(b)) | (Text(a), Chars(b)) => Ok(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
            (Date(a), Date(b)) => Ok(a.cmp(b)),
            (a, b) if a.as_numeric().is_some() && b.as_numeric().is_some() => {
                let (x, y) = (a.as_numeric().unwrap(), b.as_numeric().unwrap());
                x.partial_cmp(&y).ok_or_else(|| Error::internal("NaN is not comparable"))
            }
            _ => Err(Error::SchemaFieldTypeMismatch {
                expected: self.attr_type(),
                found: other.attr_type(),
            }),
        }
    }

    /// Casts to `target`. The system this is modeled on only supported
    /// casting into `BOOLEANS`; everything else was `RC::INTERNAL`. That
    /// restriction is preserved here deliberately, not as an oversight:
    /// `CastExpr` only ever appears in parsed `CAST(expr AS BOOLEAN)`
    /// nodes.
    pub fn cast_to(&self, target: AttrType) -> Result<Value> {
        if self.attr_type() == target {
            return Ok(self.clone());
        }
        match target {
            AttrType::Boolean => {
                let b = match self {
                    Value::Int(v) => *v != 0,
                    Value::Long(v) => *v != 0,
                    Value::Float(v) => *v != 0.0,
                    Value::Double(v) => *v != 0.0,
                    Value::Boolean(b) => *b,
                    Value::Null => false,
                    _ => {
                        return Err(Error::internal(format!(
                            "unsupported cast from {} to boolean",
                            self.attr_type()
                        )))
                    }
                };
                Ok(Value::Boolean(b))
            }
            _ => Err(Error::internal(format!(
                "unsupported cast from {} to {}",
                self.attr_type(),
                target
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", format_float(*v as f64)),
            Value::Double(v) => write!(f, "{}", format_float(*v)),
            Value::Chars(s) => write!(f, "{s}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Null => write!(f, "NULL"),
        }
    }
}

/// Trims a float to at most two fractional digits, dropping trailing
/// zeros (and a trailing dot), matching the teaching engine's console
/// output convention.
fn format_float(v: f64) -> String {
    let rounded = format!("{v:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_rejects_out_of_range() {
        assert!(Date::from_ymd(1969, 12, 31).is_err());
        assert!(Date::from_ymd(2038, 3, 1).is_err());
        assert!(Date::from_ymd(1970, 1, 1).is_ok());
        assert!(Date::from_ymd(2038, 2, 28).is_ok());
    }

    #[test]
    fn date_rejects_invalid_day_of_month() {
        assert!(Date::from_ymd(2023, 2, 29).is_err()); // not a leap year
        assert!(Date::from_ymd(2024, 2, 29).is_ok()); // leap year
        assert!(Date::from_ymd(2023, 4, 31).is_err()); // april has 30 days
    }

    #[test]
    fn date_format_directives() {
        let d = Date::from_ymd(2023, 3, 5).unwrap();
        assert_eq!(d.format("%Y-%m-%d"), "2023-03-05");
        assert_eq!(d.format("%c/%e/%y"), "3/5/23");
        assert_eq!(d.format("%M %D, %Y"), "March 5th, 2023");
    }

    #[test]
    fn compare_int_float_cross_kind() {
        let a = Value::Int(3);
        let b = Value::Float(3.0);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Equal);
    }

    #[test]
    fn compare_incompatible_kinds_errors() {
        let a = Value::Int(3);
        let b = Value::Chars("3".into());
        assert!(a.compare(&b).is_err());
    }

    #[test]
    fn cast_to_boolean() {
        assert_eq!(Value::Int(0).cast_to(AttrType::Boolean).unwrap(), Value::Boolean(false));
        assert_eq!(Value::Int(7).cast_to(AttrType::Boolean).unwrap(), Value::Boolean(true));
        assert!(Value::Chars("x".into()).cast_to(AttrType::Boolean).is_err());
    }

    #[test]
    fn display_trims_float_trailing_zeros() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Double(3.14159).to_string(), "3.14");
    }
}
