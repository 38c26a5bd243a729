//! Items and query arguments

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stored item: its id plus field values keyed by path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    /// Field value as a string, `None` when missing, null or not a string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.fields.get(path).and_then(Value::as_str)
    }
}

/// Sorting and pagination of a query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryArgs {
    /// Maximum number of items to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<i64>,

    /// Number of items to skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,

    /// `<field>_ASC` or `<field>_DESC`
    #[serde(default, rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(mut self, first: i64) -> Self {
        self.first = Some(first);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }
}

/// Anchor of a scoped traversal: the items `field` of `list` item `id` points at
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anchor {
    pub list: String,
    pub field: String,
    pub id: String,
}

/// Query mode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryMeta {
    /// Return a count instead of items
    #[serde(default)]
    pub meta: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Anchor>,
}

impl QueryMeta {
    pub fn count() -> Self {
        Self {
            meta: true,
            from: None,
        }
    }

    /// Restrict the query to items related to an anchor item
    pub fn from(
        mut self,
        list: impl Into<String>,
        field: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.from = Some(Anchor {
            list: list.into(),
            field: field.into(),
            id: id.into(),
        });
        self
    }
}

/// Result of [`crate::RelationalStore::query`]
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum QueryResult {
    Items(Vec<Item>),
    Count { count: i64 },
}

impl QueryResult {
    pub fn into_items(self) -> Vec<Item> {
        match self {
            QueryResult::Items(items) => items,
            QueryResult::Count { .. } => Vec::new(),
        }
    }

    pub fn count(&self) -> i64 {
        match self {
            QueryResult::Items(items) => items.len() as i64,
            QueryResult::Count { count } => *count,
        }
    }
}

/// Apply `skip` and `first` to a raw row count
///
/// The count query ignores pagination, so the caller trims the total here.
/// Never negative.
pub fn adjust_count(raw: i64, skip: Option<i64>, first: Option<i64>) -> i64 {
    let remaining = (raw - skip.unwrap_or(0).max(0)).max(0);
    match first {
        Some(first) => remaining.min(first.max(0)),
        None => remaining,
    }
}
