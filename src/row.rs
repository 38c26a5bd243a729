//! Parameter binding and row decoding
//!
//! Scalar values are bound with their column's native type when written and
//! decoded back into JSON when read. Filter parameters are bound as text (or
//! text arrays) and cast in SQL.

use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Row};

use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::item::{adjust_count, Item, QueryArgs, QueryMeta, QueryResult};
use crate::list::{List, ListRegistry, ID_COLUMN};
use crate::sql::compiler::{CompiledQuery, Projection, QueryCompiler};
use crate::sql::condition::SqlParam;
use crate::types::ColumnType;

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Compile and execute a query on `conn`
pub(crate) async fn run_query(
    conn: &mut PgConnection,
    registry: &ListRegistry,
    list: &List,
    filter: &Filter,
    args: &QueryArgs,
    meta: &QueryMeta,
) -> Result<QueryResult> {
    let compiled = QueryCompiler::new(registry).compile(list, filter, args, meta)?;

    if meta.meta {
        let raw = fetch_count(conn, &compiled).await?;
        Ok(QueryResult::Count {
            count: adjust_count(raw, args.skip, args.first),
        })
    } else {
        Ok(QueryResult::Items(fetch_items(conn, &compiled).await?))
    }
}

pub(crate) async fn fetch_items(
    conn: &mut PgConnection,
    compiled: &CompiledQuery,
) -> Result<Vec<Item>> {
    trace_query!(compiled.sql, compiled.params.len());

    let mut query = sqlx::query(&compiled.sql);
    for param in &compiled.params {
        query = bind_param(query, param);
    }
    let rows = query.fetch_all(&mut *conn).await?;

    rows.iter()
        .map(|row| row_to_item(row, &compiled.projections))
        .collect()
}

pub(crate) async fn fetch_count(conn: &mut PgConnection, compiled: &CompiledQuery) -> Result<i64> {
    trace_query!(compiled.sql, compiled.params.len());

    let mut query = sqlx::query(&compiled.sql);
    for param in &compiled.params {
        query = bind_param(query, param);
    }
    let row = query.fetch_one(&mut *conn).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

pub(crate) fn bind_param<'q>(query: PgQuery<'q>, param: &'q SqlParam) -> PgQuery<'q> {
    match param {
        SqlParam::Text(value) => query.bind(value.as_str()),
        SqlParam::TextArray(values) => query.bind(values.clone()),
        SqlParam::Int(value) => query.bind(*value),
    }
}

fn row_to_item(row: &PgRow, projections: &[Projection]) -> Result<Item> {
    let mut id = String::new();
    let mut fields = Map::new();

    for projection in projections {
        match projection {
            Projection::Id => id = row.try_get(ID_COLUMN)?,
            Projection::Column { path, column_type } => {
                fields.insert(path.clone(), extract_column_value(row, path, column_type)?);
            }
            Projection::Reference { path } => {
                let value = row
                    .try_get::<Option<String>, _>(path.as_str())?
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                fields.insert(path.clone(), value);
            }
        }
    }

    Ok(Item { id, fields })
}

fn extract_column_value(row: &PgRow, column: &str, column_type: &ColumnType) -> Result<Value> {
    let value = match column_type {
        ColumnType::String | ColumnType::Enum { .. } => row
            .try_get::<Option<String>, _>(column)?
            .map(Value::String),
        ColumnType::Integer => row
            .try_get::<Option<i64>, _>(column)?
            .map(|v| Value::Number(serde_json::Number::from(v))),
        ColumnType::Decimal { .. } => {
            use rust_decimal::prelude::ToPrimitive;
            row.try_get::<Option<rust_decimal::Decimal>, _>(column)?
                .and_then(|d| d.to_f64())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        }
        ColumnType::Boolean => row.try_get::<Option<bool>, _>(column)?.map(Value::Bool),
        ColumnType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(column)?
            .map(|v| Value::String(v.to_rfc3339())),
        ColumnType::Json => row.try_get::<Option<Value>, _>(column)?,
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Bind a scalar field value with its column's native type
pub(crate) fn bind_value<'q>(
    query: PgQuery<'q>,
    column_type: &ColumnType,
    column_name: &str,
    value: &'q Value,
) -> Result<PgQuery<'q>> {
    Ok(match column_type {
        ColumnType::String | ColumnType::Enum { .. } => {
            if value.is_null() {
                query.bind(None::<String>)
            } else {
                query.bind(value.as_str().ok_or_else(|| {
                    StoreError::validation(format!("Field '{}' expected string", column_name))
                })?)
            }
        }
        ColumnType::Integer => {
            if value.is_null() {
                query.bind(None::<i64>)
            } else {
                let int_val = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
                    .ok_or_else(|| {
                        StoreError::validation(format!("Field '{}' expected integer", column_name))
                    })?;
                query.bind(int_val)
            }
        }
        ColumnType::Decimal { .. } => {
            if value.is_null() {
                query.bind(None::<f64>)
            } else {
                let dec_val = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
                    .ok_or_else(|| {
                        StoreError::validation(format!("Field '{}' expected decimal", column_name))
                    })?;
                query.bind(dec_val)
            }
        }
        ColumnType::Boolean => {
            if value.is_null() {
                query.bind(None::<bool>)
            } else {
                let bool_val = value.as_bool().ok_or_else(|| {
                    StoreError::validation(format!("Field '{}' expected boolean", column_name))
                })?;
                query.bind(bool_val)
            }
        }
        ColumnType::Timestamp => {
            if value.is_null() {
                query.bind(None::<chrono::DateTime<chrono::Utc>>)
            } else {
                let timestamp_str = value.as_str().ok_or_else(|| {
                    StoreError::validation(format!(
                        "Field '{}' expected timestamp string",
                        column_name
                    ))
                })?;
                let timestamp = chrono::DateTime::parse_from_rfc3339(timestamp_str)
                    .map_err(|e| {
                        StoreError::validation(format!(
                            "Field '{}' has invalid timestamp: {}",
                            column_name, e
                        ))
                    })?
                    .with_timezone(&chrono::Utc);
                query.bind(timestamp)
            }
        }
        ColumnType::Json => query.bind(value),
    })
}
