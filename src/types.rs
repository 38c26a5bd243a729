//! Scalar column types for list fields
//!
//! A [`ColumnType`] knows its PostgreSQL storage type, the cast used when a
//! filter value is bound as text, which filter operator categories apply to
//! it, and how to validate incoming JSON values.

use serde::{Deserialize, Serialize};

use crate::sql::condition::OperatorCategory;

/// SQL type used for `id` and every foreign-key column
pub const ID_SQL_TYPE: &str = "VARCHAR(255)";

/// Column type definition with validation and SQL mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// Text field (unlimited length, maps to TEXT)
    String,

    /// Integer field (maps to BIGINT for 64-bit range)
    Integer,

    /// Decimal field with precision and scale (maps to NUMERIC)
    Decimal {
        #[serde(default = "default_precision")]
        precision: u8,
        #[serde(default = "default_scale")]
        scale: u8,
    },

    /// Boolean field (maps to BOOLEAN)
    Boolean,

    /// Timestamp field, always stored in UTC (maps to TIMESTAMP WITH TIME ZONE)
    Timestamp,

    /// JSON field, stored as binary JSON (maps to JSONB)
    Json,

    /// Select field with a fixed set of allowed values
    Enum { values: Vec<String> },
}

fn default_precision() -> u8 {
    19
}

fn default_scale() -> u8 {
    4
}

impl ColumnType {
    /// Create a Decimal type with specified precision and scale
    pub fn decimal(precision: u8, scale: u8) -> Self {
        ColumnType::Decimal { precision, scale }
    }

    /// Create an Enum type from its allowed values
    pub fn select<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnType::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Convert column type to PostgreSQL type string
    pub fn to_sql_type(&self, column_name: &str) -> String {
        match self {
            ColumnType::String => "TEXT".to_string(),
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Enum { values } => format!(
                "TEXT CHECK ({} IN ({}))",
                crate::sql::sanitize::quote_identifier(column_name),
                values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Type a text-bound parameter is cast to before it is compared with this column
    pub fn cast_type(&self) -> &'static str {
        match self {
            ColumnType::String | ColumnType::Enum { .. } => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Decimal { .. } => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Json => "JSONB",
        }
    }

    /// Filter operator categories offered by fields of this type
    pub fn operator_categories(&self) -> &'static [OperatorCategory] {
        use OperatorCategory::*;

        match self {
            ColumnType::String => &[Equality, CaseInsensitive, Set, Pattern],
            ColumnType::Integer | ColumnType::Decimal { .. } | ColumnType::Timestamp => {
                &[Equality, Set, Ordering]
            }
            ColumnType::Boolean | ColumnType::Json => &[Equality],
            ColumnType::Enum { .. } => &[Equality, Set],
        }
    }

    /// Validate that a JSON value is compatible with this column type
    pub fn validate_value(&self, value: &serde_json::Value) -> Result<(), String> {
        if value.is_null() {
            // Null is handled by nullable flag, not type validation
            return Ok(());
        }

        match (self, value) {
            (ColumnType::String, serde_json::Value::String(_)) => Ok(()),
            (ColumnType::Integer, serde_json::Value::Number(n)) if n.is_i64() => Ok(()),
            (ColumnType::Integer, serde_json::Value::String(s)) => s
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),
            (ColumnType::Decimal { .. }, serde_json::Value::Number(_)) => Ok(()),
            (ColumnType::Decimal { .. }, serde_json::Value::String(s)) => s
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to decimal", s)),
            (ColumnType::Boolean, serde_json::Value::Bool(_)) => Ok(()),
            (ColumnType::Timestamp, serde_json::Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|_| ())
                    .map_err(|e| format!("Invalid timestamp format: {}", e))
            }
            (ColumnType::Json, _) => Ok(()),
            (ColumnType::Enum { values }, serde_json::Value::String(s)) => {
                if values.contains(s) {
                    Ok(())
                } else {
                    Err(format!("Value '{}' not in enum values: {:?}", s, values))
                }
            }
            _ => Err(format!(
                "Type mismatch: expected {:?}, got {}",
                self, value
            )),
        }
    }
}

/// Default value of a column
#[derive(Debug, Clone)]
pub enum ColumnDefault {
    /// SQL expression used verbatim, e.g. `0`, `NOW()`, `'draft'`
    Static(String),
    /// Evaluated when the table is created
    Computed(fn() -> String),
}

impl ColumnDefault {
    /// SQL expression for the DEFAULT clause
    pub fn to_sql(&self) -> String {
        match self {
            ColumnDefault::Static(expr) => expr.clone(),
            ColumnDefault::Computed(f) => f(),
        }
    }
}
