//! Leaf predicates for filter trees
//!
//! Each scalar field exposes a fixed set of filter keys: its path followed by an
//! operator suffix (`name`, `name_not`, `name_in`, `views_gt`, `title_contains_i`,
//! ...). The set is derived from the field's [`ColumnType`] once, when the list is
//! registered, and each key maps to an [`Operator`]. At query time
//! [`build_predicate`] turns an operator, a column reference and the filter value
//! into a SQL predicate with `$n` placeholders.

use serde_json::Value;

use crate::types::ColumnType;

/// Families of operators a column type can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCategory {
    /// `=` and `!=`
    Equality,
    /// Case-insensitive `=` and `!=`
    CaseInsensitive,
    /// `IN` and `NOT IN`
    Set,
    /// `<`, `<=`, `>`, `>=`
    Ordering,
    /// contains / starts with / ends with, with case-insensitive variants
    Pattern,
}

/// A filter operator, identified by its filter-key suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Not,
    EqI,
    NotI,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    ContainsI,
    NotContainsI,
    StartsWith,
    NotStartsWith,
    StartsWithI,
    NotStartsWithI,
    EndsWith,
    NotEndsWith,
    EndsWithI,
    NotEndsWithI,
}

impl Operator {
    /// Filter-key suffix appended to the field path
    pub fn suffix(self) -> &'static str {
        match self {
            Operator::Eq => "",
            Operator::Not => "_not",
            Operator::EqI => "_i",
            Operator::NotI => "_not_i",
            Operator::In => "_in",
            Operator::NotIn => "_not_in",
            Operator::Lt => "_lt",
            Operator::Lte => "_lte",
            Operator::Gt => "_gt",
            Operator::Gte => "_gte",
            Operator::Contains => "_contains",
            Operator::NotContains => "_not_contains",
            Operator::ContainsI => "_contains_i",
            Operator::NotContainsI => "_not_contains_i",
            Operator::StartsWith => "_starts_with",
            Operator::NotStartsWith => "_not_starts_with",
            Operator::StartsWithI => "_starts_with_i",
            Operator::NotStartsWithI => "_not_starts_with_i",
            Operator::EndsWith => "_ends_with",
            Operator::NotEndsWith => "_not_ends_with",
            Operator::EndsWithI => "_ends_with_i",
            Operator::NotEndsWithI => "_not_ends_with_i",
        }
    }

    /// Operators belonging to a category
    pub fn in_category(category: OperatorCategory) -> &'static [Operator] {
        use Operator::*;

        match category {
            OperatorCategory::Equality => &[Eq, Not],
            OperatorCategory::CaseInsensitive => &[EqI, NotI],
            OperatorCategory::Set => &[In, NotIn],
            OperatorCategory::Ordering => &[Lt, Lte, Gt, Gte],
            OperatorCategory::Pattern => &[
                Contains,
                NotContains,
                ContainsI,
                NotContainsI,
                StartsWith,
                NotStartsWith,
                StartsWithI,
                NotStartsWithI,
                EndsWith,
                NotEndsWith,
                EndsWithI,
                NotEndsWithI,
            ],
        }
    }
}

/// Every `(filter key, operator)` pair a field of the given type answers to
pub fn filter_keys(path: &str, column_type: &ColumnType) -> Vec<(String, Operator)> {
    column_type
        .operator_categories()
        .iter()
        .flat_map(|category| Operator::in_category(*category))
        .map(|op| (format!("{}{}", path, op.suffix()), *op))
        .collect()
}

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
}

/// Ordered parameter list shared by everything that contributes to one statement
#[derive(Debug, Default)]
pub struct SqlParams {
    values: Vec<SqlParam>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its `$n` placeholder
    pub fn push(&mut self, param: SqlParam) -> String {
        self.values.push(param);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<SqlParam> {
        self.values
    }
}

/// Build the SQL predicate for one leaf filter
///
/// `column` must already be a fully qualified, quoted column reference
/// (e.g. `"t0"."name"`). Values are always bound as text and cast to the
/// column's type.
pub fn build_predicate(
    op: Operator,
    column: &str,
    column_type: &ColumnType,
    value: &Value,
    params: &mut SqlParams,
) -> Result<String, String> {
    let cast = column_type.cast_type();

    match op {
        Operator::Eq | Operator::Not => {
            if value.is_null() {
                let null_check = if op == Operator::Eq { "IS NULL" } else { "IS NOT NULL" };
                return Ok(format!("{} {}", column, null_check));
            }
            let placeholder = push_scalar(column_type, value, params)?;
            Ok(if op == Operator::Eq {
                format!("{} = {}::{}", column, placeholder, cast)
            } else {
                format!(
                    "({} <> {}::{} OR {} IS NULL)",
                    column, placeholder, cast, column
                )
            })
        }
        Operator::EqI | Operator::NotI => {
            if value.is_null() {
                let null_check = if op == Operator::EqI { "IS NULL" } else { "IS NOT NULL" };
                return Ok(format!("{} {}", column, null_check));
            }
            let placeholder = push_scalar(column_type, value, params)?;
            Ok(if op == Operator::EqI {
                format!("LOWER({}) = LOWER({}::TEXT)", column, placeholder)
            } else {
                format!(
                    "(LOWER({}) <> LOWER({}::TEXT) OR {} IS NULL)",
                    column, placeholder, column
                )
            })
        }
        Operator::In | Operator::NotIn => {
            let candidates = value
                .as_array()
                .ok_or_else(|| format!("{:?} requires an array value", op))?;
            let includes_null = candidates.iter().any(Value::is_null);
            let mut non_null = Vec::new();
            for candidate in candidates.iter().filter(|v| !v.is_null()) {
                column_type.validate_value(candidate)?;
                non_null.push(value_to_text(column_type, candidate));
            }

            if non_null.is_empty() {
                return Ok(match (op, includes_null) {
                    (Operator::In, true) => format!("{} IS NULL", column),
                    (Operator::In, false) => "FALSE".to_string(),
                    (_, true) => format!("{} IS NOT NULL", column),
                    (_, false) => "TRUE".to_string(),
                });
            }

            let placeholder = params.push(SqlParam::TextArray(non_null));
            Ok(match (op, includes_null) {
                (Operator::In, false) => {
                    format!("{} = ANY({}::{}[])", column, placeholder, cast)
                }
                (Operator::In, true) => format!(
                    "({} = ANY({}::{}[]) OR {} IS NULL)",
                    column, placeholder, cast, column
                ),
                (_, false) => format!(
                    "({} <> ALL({}::{}[]) OR {} IS NULL)",
                    column, placeholder, cast, column
                ),
                (_, true) => format!(
                    "({} <> ALL({}::{}[]) AND {} IS NOT NULL)",
                    column, placeholder, cast, column
                ),
            })
        }
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            if value.is_null() {
                return Err(format!("{:?} operation with NULL value is not supported", op));
            }
            let sql_op = match op {
                Operator::Lt => "<",
                Operator::Lte => "<=",
                Operator::Gt => ">",
                _ => ">=",
            };
            let placeholder = push_scalar(column_type, value, params)?;
            Ok(format!("{} {} {}::{}", column, sql_op, placeholder, cast))
        }
        _ => build_pattern_predicate(op, column, value, params),
    }
}

fn build_pattern_predicate(
    op: Operator,
    column: &str,
    value: &Value,
    params: &mut SqlParams,
) -> Result<String, String> {
    let needle = value
        .as_str()
        .ok_or_else(|| format!("{:?} value must be a string", op))?;
    let escaped = escape_like(needle);

    let (pattern, case_insensitive, negated) = match op {
        Operator::Contains => (format!("%{}%", escaped), false, false),
        Operator::NotContains => (format!("%{}%", escaped), false, true),
        Operator::ContainsI => (format!("%{}%", escaped), true, false),
        Operator::NotContainsI => (format!("%{}%", escaped), true, true),
        Operator::StartsWith => (format!("{}%", escaped), false, false),
        Operator::NotStartsWith => (format!("{}%", escaped), false, true),
        Operator::StartsWithI => (format!("{}%", escaped), true, false),
        Operator::NotStartsWithI => (format!("{}%", escaped), true, true),
        Operator::EndsWith => (format!("%{}", escaped), false, false),
        Operator::NotEndsWith => (format!("%{}", escaped), false, true),
        Operator::EndsWithI => (format!("%{}", escaped), true, false),
        Operator::NotEndsWithI => (format!("%{}", escaped), true, true),
        other => return Err(format!("{:?} is not a pattern operator", other)),
    };

    let like = if case_insensitive { "ILIKE" } else { "LIKE" };
    let placeholder = params.push(SqlParam::Text(pattern));

    // Negated patterns also match NULL: a missing value cannot contain anything
    Ok(if negated {
        format!(
            "({} NOT {} {}::TEXT OR {} IS NULL)",
            column, like, placeholder, column
        )
    } else {
        format!("{} {} {}::TEXT", column, like, placeholder)
    })
}

fn push_scalar(
    column_type: &ColumnType,
    value: &Value,
    params: &mut SqlParams,
) -> Result<String, String> {
    column_type.validate_value(value)?;
    Ok(params.push(SqlParam::Text(value_to_text(column_type, value))))
}

/// Text form of a filter value, suitable for casting to the column type
fn value_to_text(column_type: &ColumnType, value: &Value) -> String {
    match (column_type, value) {
        (ColumnType::Json, _) => value.to_string(),
        (_, Value::String(s)) => s.clone(),
        (_, Value::Number(n)) => n.to_string(),
        (_, Value::Bool(b)) => b.to_string(),
        _ => value.to_string(),
    }
}

/// Escape `LIKE` wildcards so user input is matched literally
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
