//! Filter trees
//!
//! Callers pass filters as JSON objects keyed by filter keys:
//!
//! ```json
//! {
//!   "title_contains_i": "rust",
//!   "author": { "name": "Ada" },
//!   "tags_some": { "label_in": ["db", "sql"] },
//!   "OR": [{ "views_gt": 100 }, { "featured": true }]
//! }
//! ```
//!
//! [`parse`] resolves every key against the list's registered filter keys and
//! produces a typed [`Filter`] tree for the query compiler. Keys on the same
//! object are combined with AND.

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::list::{FilterKey, List, ListRegistry};
use crate::sql::condition::Operator;
use crate::types::ColumnType;

/// Quantifier applied to a to-many relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// At least one related item matches
    Some,
    /// No related item matches
    None,
    /// Every related item matches (vacuously true with no related items)
    Every,
}

impl Quantifier {
    pub fn suffix(self) -> &'static str {
        match self {
            Quantifier::Some => "_some",
            Quantifier::None => "_none",
            Quantifier::Every => "_every",
        }
    }
}

/// A parsed filter node
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Scalar comparison on a column of the current list
    Condition {
        column: String,
        column_type: ColumnType,
        op: Operator,
        value: Value,
    },
    /// Whether a to-one relationship is empty (`true`) or set (`false`)
    IsNull { field: String, value: bool },
    /// Nested filter on the item a to-one relationship points at
    ToOne { field: String, filter: Box<Filter> },
    /// Quantified filter over a to-many relationship
    ToMany {
        field: String,
        quantifier: Quantifier,
        filter: Box<Filter>,
    },
}

impl Filter {
    /// Filter that matches every item
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }
}

/// Parse a JSON filter against `list`
///
/// `null` is treated like an empty object and matches everything.
pub fn parse(registry: &ListRegistry, list: &List, value: &Value) -> Result<Filter> {
    match value {
        Value::Null => Ok(Filter::all()),
        Value::Object(map) => parse_object(registry, list, map),
        other => Err(StoreError::invalid_filter(format!(
            "Filter on '{}' must be an object, got {}",
            list.name, other
        ))),
    }
}

fn parse_object(registry: &ListRegistry, list: &List, map: &Map<String, Value>) -> Result<Filter> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        clauses.push(parse_entry(registry, list, key, value)?);
    }
    Ok(match clauses.len() {
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_entry(registry: &ListRegistry, list: &List, key: &str, value: &Value) -> Result<Filter> {
    if key == "AND" || key == "OR" {
        let items = value.as_array().ok_or_else(|| {
            StoreError::invalid_filter(format!("'{}' on '{}' requires an array", key, list.name))
        })?;
        let children = items
            .iter()
            .map(|item| parse(registry, list, item))
            .collect::<Result<Vec<_>>>()?;
        return Ok(if key == "AND" {
            Filter::And(children)
        } else {
            Filter::Or(children)
        });
    }

    let filter_key = list.filter_key(key).ok_or_else(|| {
        StoreError::invalid_filter(format!(
            "Unknown filter key '{}' on list '{}'",
            key, list.name
        ))
    })?;

    match filter_key {
        FilterKey::Condition {
            column,
            column_type,
            op,
        } => Ok(Filter::Condition {
            column: column.clone(),
            column_type: column_type.clone(),
            op: *op,
            value: value.clone(),
        }),
        FilterKey::IsNull { field } => {
            let is_null = value.as_bool().ok_or_else(|| {
                StoreError::invalid_filter(format!("'{}' requires a boolean", key))
            })?;
            Ok(Filter::IsNull {
                field: field.clone(),
                value: is_null,
            })
        }
        FilterKey::ToOne { field } => {
            // `author: null` is shorthand for `author_is_null: true`
            if value.is_null() {
                return Ok(Filter::IsNull {
                    field: field.clone(),
                    value: true,
                });
            }
            let (_, _, target) = registry.relationship_field(list, field)?;
            Ok(Filter::ToOne {
                field: field.clone(),
                filter: Box::new(parse_nested(registry, target, key, value)?),
            })
        }
        FilterKey::Quantified { field, quantifier } => {
            let (_, _, target) = registry.relationship_field(list, field)?;
            Ok(Filter::ToMany {
                field: field.clone(),
                quantifier: *quantifier,
                filter: Box::new(parse_nested(registry, target, key, value)?),
            })
        }
    }
}

fn parse_nested(registry: &ListRegistry, target: &List, key: &str, value: &Value) -> Result<Filter> {
    if !value.is_object() {
        return Err(StoreError::invalid_filter(format!(
            "'{}' requires an object filter on '{}'",
            key, target.name
        )));
    }
    parse(registry, target, value)
}
