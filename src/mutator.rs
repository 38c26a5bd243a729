//! Relationship mutator
//!
//! Writes items and keeps the relationship graph consistent: FK columns on
//! either side of 1:1, 1:N and N:1 relationships, and junction rows for N:N.
//! Every function runs its statements in order on the given connection; the
//! store wraps each call in a transaction.

use std::collections::HashSet;

use serde_json::{Map, Value};
use sqlx::{PgConnection, Row};

use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::item::{Item, QueryArgs, QueryMeta};
use crate::list::{FieldAdapter, FieldKind, List, ListRegistry, RelationshipField, ID_COLUMN};
use crate::relationship::{Cardinality, FieldStorage, RelationshipStorage, Side};
use crate::row::{bind_value, run_query};
use crate::sql::condition::Operator;
use crate::sql::sanitize::quote_identifier;
use crate::types::ColumnType;

/// Submitted data split by where each field is stored
struct Partition<'d> {
    /// Fields backed by a column on the list's own table
    real: Vec<(&'d FieldAdapter, &'d Value)>,
    /// Relationship fields stored on another table or a junction table
    related: Vec<(&'d FieldAdapter, &'d RelationshipField, &'d Value)>,
}

fn partition<'d>(list: &'d List, data: &'d Map<String, Value>) -> Result<Partition<'d>> {
    let mut real = Vec::new();
    let mut related = Vec::new();

    for (key, value) in data {
        if key == ID_COLUMN {
            continue;
        }
        let field = list.field(key).ok_or_else(|| {
            StoreError::validation(format!("List '{}' has no field '{}'", list.name, key))
        })?;
        validate_field_value(field, value)?;

        match &field.kind {
            FieldKind::Relationship(rel) if !rel.storage.is_local() => {
                related.push((field, rel, value));
            }
            _ => real.push((field, value)),
        }
    }

    Ok(Partition { real, related })
}

fn validate_field_value(field: &FieldAdapter, value: &Value) -> Result<()> {
    if value.is_null() && !field.nullable {
        return Err(StoreError::validation(format!(
            "Field '{}' does not allow NULL values",
            field.path
        )));
    }

    match &field.kind {
        FieldKind::Scalar(column_type) => column_type.validate_value(value).map_err(|e| {
            StoreError::validation(format!("Invalid value for field '{}': {}", field.path, e))
        }),
        FieldKind::Relationship(rel) if rel.many => related_ids(field, value).map(|_| ()),
        FieldKind::Relationship(_) => related_id(field, value).map(|_| ()),
    }
}

/// Target of a to-one relationship value: an id string or null
fn related_id<'v>(field: &FieldAdapter, value: &'v Value) -> Result<Option<&'v str>> {
    match value {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id)),
        other => Err(StoreError::validation(format!(
            "Field '{}' expects an item id or null, got {}",
            field.path, other
        ))),
    }
}

/// Targets of a to-many relationship value: an array of id strings, null meaning none
fn related_ids<'v>(field: &FieldAdapter, value: &'v Value) -> Result<Vec<&'v str>> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(StoreError::validation(format!(
                "Field '{}' expects an array of item ids, got {}",
                field.path, other
            )));
        }
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = item.as_str().ok_or_else(|| {
            StoreError::validation(format!(
                "Field '{}' expects an array of item ids, got {}",
                field.path, item
            ))
        })?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

async fn execute(conn: &mut PgConnection, sql: &str, binds: &[&str]) -> Result<u64> {
    trace_query!(sql, binds.len());
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(*value);
    }
    Ok(query.execute(&mut *conn).await?.rows_affected())
}

async fn execute_with_ids(
    conn: &mut PgConnection,
    sql: &str,
    id: &str,
    targets: &[&str],
) -> Result<u64> {
    trace_query!(sql, 2);
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    let result = sqlx::query(sql)
        .bind(id)
        .bind(targets)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Clear the pointer of whichever item currently references `target` through
/// a 1:1 FK column, so at most one item references it
async fn release_one_to_one(
    conn: &mut PgConnection,
    list: &List,
    field: &FieldAdapter,
    value: &Value,
) -> Result<()> {
    let Some(rel) = field.relationship() else {
        return Ok(());
    };
    if rel.cardinality != Cardinality::OneToOne {
        return Ok(());
    }
    let FieldStorage::Local { column } = &rel.storage else {
        return Ok(());
    };
    let Some(target) = related_id(field, value)? else {
        return Ok(());
    };

    let sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = $1",
        quote_identifier(&list.table_name),
        quote_identifier(column),
        quote_identifier(column)
    );
    execute(conn, &sql, &[target]).await?;
    Ok(())
}

/// Bind a real field value: scalars with their column type, FK columns as text
fn bind_real<'q>(
    query: crate::row::PgQuery<'q>,
    field: &FieldAdapter,
    value: &'q Value,
) -> Result<crate::row::PgQuery<'q>> {
    match &field.kind {
        FieldKind::Scalar(column_type) => bind_value(query, column_type, &field.path, value),
        FieldKind::Relationship(_) => Ok(query.bind(related_id(field, value)?)),
    }
}

/// Point `targets` at item `id` through a relationship stored off this table
async fn add_related(
    conn: &mut PgConnection,
    id: &str,
    rel: &RelationshipField,
    targets: &[&str],
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }

    match &rel.storage {
        FieldStorage::Remote { table, column } => {
            let sql = format!(
                "UPDATE {} SET {} = $1 WHERE {} = ANY($2)",
                quote_identifier(table),
                quote_identifier(column),
                quote_identifier(ID_COLUMN)
            );
            execute_with_ids(conn, &sql, id, targets).await?;
        }
        FieldStorage::Junction { table, near, far } => {
            let sql = format!(
                "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::TEXT[])",
                quote_identifier(table),
                quote_identifier(near),
                quote_identifier(far)
            );
            execute_with_ids(conn, &sql, id, targets).await?;
        }
        FieldStorage::Local { .. } => {}
    }
    Ok(())
}

/// Detach `targets` from item `id`
async fn remove_related(
    conn: &mut PgConnection,
    id: &str,
    rel: &RelationshipField,
    targets: &[&str],
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }

    match &rel.storage {
        FieldStorage::Remote { table, column } => {
            let sql = format!(
                "UPDATE {} SET {} = NULL WHERE {} = $1 AND {} = ANY($2)",
                quote_identifier(table),
                quote_identifier(column),
                quote_identifier(column),
                quote_identifier(ID_COLUMN)
            );
            execute_with_ids(conn, &sql, id, targets).await?;
        }
        FieldStorage::Junction { table, near, far } => {
            let sql = format!(
                "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2)",
                quote_identifier(table),
                quote_identifier(near),
                quote_identifier(far)
            );
            execute_with_ids(conn, &sql, id, targets).await?;
        }
        FieldStorage::Local { .. } => {}
    }
    Ok(())
}

/// Ids currently related to item `id` through a relationship stored off this table
async fn current_related(
    conn: &mut PgConnection,
    id: &str,
    rel: &RelationshipField,
) -> Result<Vec<String>> {
    let sql = match &rel.storage {
        FieldStorage::Remote { table, column } => format!(
            "SELECT {} FROM {} WHERE {} = $1",
            quote_identifier(ID_COLUMN),
            quote_identifier(table),
            quote_identifier(column)
        ),
        FieldStorage::Junction { table, near, far } => format!(
            "SELECT {} FROM {} WHERE {} = $1",
            quote_identifier(far),
            quote_identifier(table),
            quote_identifier(near)
        ),
        FieldStorage::Local { .. } => return Ok(Vec::new()),
    };

    trace_query!(sql, 1);
    let rows = sqlx::query(&sql).bind(id).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>(0).map_err(StoreError::from))
        .collect()
}

/// Read one item back through the query compiler
pub(crate) async fn find_by_id(
    conn: &mut PgConnection,
    registry: &ListRegistry,
    list: &List,
    id: &str,
) -> Result<Option<Item>> {
    let filter = Filter::Condition {
        column: ID_COLUMN.to_string(),
        column_type: ColumnType::String,
        op: Operator::Eq,
        value: Value::String(id.to_string()),
    };
    let items = run_query(
        conn,
        registry,
        list,
        &filter,
        &QueryArgs::new().first(1),
        &QueryMeta::default(),
    )
    .await?
    .into_items();
    Ok(items.into_iter().next())
}

/// Create an item and its relationships
///
/// The returned item holds the stored row plus the submitted values of
/// relationship fields stored on other tables.
pub async fn create(
    conn: &mut PgConnection,
    registry: &ListRegistry,
    list: &List,
    data: &Value,
) -> Result<Item> {
    let data = data
        .as_object()
        .ok_or_else(|| StoreError::validation("Item data must be a JSON object"))?;
    let parts = partition(list, data)?;

    for field in list.real_fields() {
        if !field.nullable && field.default.is_none() && !data.contains_key(&field.path) {
            return Err(StoreError::validation(format!(
                "Required field '{}' is missing",
                field.path
            )));
        }
    }

    let id = match data.get(ID_COLUMN) {
        None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(other) => {
            return Err(StoreError::validation(format!(
                "Item id must be a non-empty string, got {}",
                other
            )));
        }
    };

    for (field, value) in &parts.real {
        release_one_to_one(conn, list, field, value).await?;
    }

    let mut column_names = vec![quote_identifier(ID_COLUMN)];
    let mut placeholders = vec!["$1".to_string()];
    for (i, (field, _)) in parts.real.iter().enumerate() {
        column_names.push(quote_identifier(&field.path));
        placeholders.push(format!("${}", i + 2));
    }

    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(&list.table_name),
        column_names.join(", "),
        placeholders.join(", ")
    );
    trace_query!(insert_sql, placeholders.len());

    let mut query = sqlx::query(&insert_sql).bind(&id);
    for (field, value) in &parts.real {
        query = bind_real(query, field, value)?;
    }
    query.execute(&mut *conn).await?;

    for (field, rel, value) in &parts.related {
        let targets = if rel.many {
            related_ids(field, value)?
        } else {
            related_id(field, value)?.into_iter().collect()
        };
        add_related(conn, &id, rel, &targets).await?;
    }

    let mut item = find_by_id(conn, registry, list, &id)
        .await?
        .ok_or_else(|| StoreError::item_not_found(&id))?;
    for (field, _, value) in &parts.related {
        item.fields
            .entry(field.path.clone())
            .or_insert_with(|| (*value).clone());
    }
    Ok(item)
}

/// Update an item and reconcile its relationships
///
/// Returns `None` when no item has the given id.
pub async fn update(
    conn: &mut PgConnection,
    registry: &ListRegistry,
    list: &List,
    id: &str,
    data: &Value,
) -> Result<Option<Item>> {
    let data = data
        .as_object()
        .ok_or_else(|| StoreError::validation("Item data must be a JSON object"))?;
    if let Some(new_id) = data.get(ID_COLUMN) {
        if new_id.as_str() != Some(id) {
            return Err(StoreError::validation("Item id cannot be changed"));
        }
    }
    let parts = partition(list, data)?;

    let exists_sql = format!(
        "SELECT 1 FROM {} WHERE {} = $1",
        quote_identifier(&list.table_name),
        quote_identifier(ID_COLUMN)
    );
    trace_query!(exists_sql, 1);
    if sqlx::query(&exists_sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .is_none()
    {
        return Ok(None);
    }

    for (field, value) in &parts.real {
        release_one_to_one(conn, list, field, value).await?;
    }

    if !parts.real.is_empty() {
        let set_clauses: Vec<String> = parts
            .real
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ${}", quote_identifier(&field.path), i + 2))
            .collect();
        let update_sql = format!(
            "UPDATE {} SET {} WHERE {} = $1",
            quote_identifier(&list.table_name),
            set_clauses.join(", "),
            quote_identifier(ID_COLUMN)
        );
        trace_query!(update_sql, set_clauses.len() + 1);

        let mut query = sqlx::query(&update_sql).bind(id);
        for (field, value) in &parts.real {
            query = bind_real(query, field, value)?;
        }
        query.execute(&mut *conn).await?;
    }

    for (field, rel, value) in &parts.related {
        if rel.many {
            let wanted = related_ids(field, value)?;
            let current = current_related(conn, id, rel).await?;

            let removals: Vec<&str> = current
                .iter()
                .map(String::as_str)
                .filter(|c| !wanted.contains(c))
                .collect();
            let additions: Vec<&str> = wanted
                .iter()
                .copied()
                .filter(|w| !current.iter().any(|c| c.as_str() == *w))
                .collect();

            remove_related(conn, id, rel, &removals).await?;
            add_related(conn, id, rel, &additions).await?;
        } else if let FieldStorage::Remote { table, column } = &rel.storage {
            // 1:1 stored on the other side: detach the current target, then attach the new one
            let clear_sql = format!(
                "UPDATE {} SET {} = NULL WHERE {} = $1",
                quote_identifier(table),
                quote_identifier(column),
                quote_identifier(column)
            );
            execute(conn, &clear_sql, &[id]).await?;
            if let Some(target) = related_id(field, value)? {
                add_related(conn, id, rel, &[target]).await?;
            }
        }
    }

    find_by_id(conn, registry, list, id).await
}

/// Delete an item after detaching everything that references it
///
/// Returns the number of deleted rows.
pub async fn delete(
    conn: &mut PgConnection,
    registry: &ListRegistry,
    list: &List,
    id: &str,
) -> Result<u64> {
    let mut statements = Vec::new();

    for rel in registry.relationships() {
        for side in [Side::Left, Side::Right] {
            if rel.end(side).list != list.name {
                continue;
            }
            let sql = match &rel.storage {
                // FK on the other side's table references this list
                RelationshipStorage::ForeignKey {
                    owner,
                    table,
                    column,
                } if *owner != side => format!(
                    "UPDATE {} SET {} = NULL WHERE {} = $1",
                    quote_identifier(table),
                    quote_identifier(column),
                    quote_identifier(column)
                ),
                RelationshipStorage::ForeignKey { .. } => continue,
                RelationshipStorage::Junction {
                    table,
                    left_column,
                    right_column,
                } => {
                    let column = match side {
                        Side::Left => left_column,
                        Side::Right => right_column,
                    };
                    format!(
                        "DELETE FROM {} WHERE {} = $1",
                        quote_identifier(table),
                        quote_identifier(column)
                    )
                }
            };
            if !statements.contains(&sql) {
                statements.push(sql);
            }
        }
    }

    for sql in &statements {
        execute(conn, sql, &[id]).await?;
    }

    let delete_sql = format!(
        "DELETE FROM {} WHERE {} = $1",
        quote_identifier(&list.table_name),
        quote_identifier(ID_COLUMN)
    );
    execute(conn, &delete_sql, &[id]).await
}
