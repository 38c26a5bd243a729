//! Query compiler
//!
//! Turns a parsed [`Filter`] plus [`QueryArgs`] and [`QueryMeta`] into one
//! parameterized SELECT statement.
//!
//! Aliasing: the queried table is `t0`. Every to-one relationship followed by
//! the filter is LEFT OUTER JOINed under `<parent alias>__<path>`, so repeated
//! and nested paths never collide. To-many quantifiers compile to uncorrelated
//! `IN` subqueries whose tables take fresh aliases (`t1`, `t2`, ...) from the
//! compiler's counter; to-one paths inside a subquery are joined relative to
//! the subquery alias.
//!
//! Quantifiers:
//! - `some`: `t0.id IN (ids of items with a related row matching the filter)`
//! - `none`: `t0.id NOT IN (same set)`
//! - `every`: `t0.id NOT IN (ids of items with a related row failing the filter)`,
//!   where a NULL predicate counts as failing. Items without related rows
//!   satisfy `every`.

use std::collections::HashSet;

use crate::error::{Result, StoreError};
use crate::filter::{Filter, Quantifier};
use crate::item::{Anchor, QueryArgs, QueryMeta};
use crate::list::{FieldKind, List, ListRegistry, RelationshipField, ID_COLUMN};
use crate::relationship::{Cardinality, FieldStorage};
use crate::sql::condition::{build_predicate, SqlParam, SqlParams};
use crate::sql::sanitize::{qualified, quote_identifier};
use crate::types::ColumnType;

/// Alias of the queried table
pub const BASE_ALIAS: &str = "t0";

/// One output column of a compiled query
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Id,
    Column { path: String, column_type: ColumnType },
    /// Id of a related item, read as text
    Reference { path: String },
}

impl Projection {
    /// Name of the column in the result row
    pub fn name(&self) -> &str {
        match self {
            Projection::Id => ID_COLUMN,
            Projection::Column { path, .. } | Projection::Reference { path } => path,
        }
    }
}

/// A compiled statement ready to be bound and executed
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    /// Output columns in select order; empty in count mode
    pub projections: Vec<Projection>,
}

/// Per-call compiler context holding the alias counter and bound parameters
pub struct QueryCompiler<'a> {
    registry: &'a ListRegistry,
    next_alias: usize,
    params: SqlParams,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(registry: &'a ListRegistry) -> Self {
        Self {
            registry,
            next_alias: 1,
            params: SqlParams::new(),
        }
    }

    /// Compile a query against `list`
    pub fn compile(
        mut self,
        list: &List,
        filter: &Filter,
        args: &QueryArgs,
        meta: &QueryMeta,
    ) -> Result<CompiledQuery> {
        let mut joins = Joins::default();
        let mut columns = Vec::new();
        let mut projections = Vec::new();

        if !meta.meta {
            columns.push(qualified(BASE_ALIAS, ID_COLUMN));
            projections.push(Projection::Id);

            for field in list.fields() {
                match &field.kind {
                    FieldKind::Scalar(column_type) => {
                        columns.push(qualified(BASE_ALIAS, &field.path));
                        projections.push(Projection::Column {
                            path: field.path.clone(),
                            column_type: column_type.clone(),
                        });
                    }
                    FieldKind::Relationship(rel) => match &rel.storage {
                        FieldStorage::Local { column } => {
                            columns.push(qualified(BASE_ALIAS, column));
                            projections.push(Projection::Reference {
                                path: field.path.clone(),
                            });
                        }
                        // 1:1 back-references are always resolvable from this side
                        FieldStorage::Remote { .. }
                            if rel.cardinality == Cardinality::OneToOne =>
                        {
                            let alias = self.to_one_join(list, BASE_ALIAS, &field.path, &mut joins)?;
                            columns.push(format!(
                                "{} AS {}",
                                qualified(&alias, ID_COLUMN),
                                quote_identifier(&field.path)
                            ));
                            projections.push(Projection::Reference {
                                path: field.path.clone(),
                            });
                        }
                        _ => {}
                    },
                }
            }
        }

        self.collect_joins(list, BASE_ALIAS, filter, &mut joins)?;

        let mut conditions = Vec::new();
        if let Some(anchor) = &meta.from {
            conditions.push(self.anchor_predicate(list, anchor)?);
        }
        let predicate = self.predicate(list, BASE_ALIAS, filter)?;
        if predicate != "TRUE" {
            conditions.push(predicate);
        }

        let select = if meta.meta {
            "COUNT(*)".to_string()
        } else {
            columns.join(", ")
        };
        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            select,
            quote_identifier(&list.table_name),
            quote_identifier(BASE_ALIAS)
        );
        for join in &joins.clauses {
            sql.push(' ');
            sql.push_str(join);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let first = args.first.map(|v| non_negative("first", v)).transpose()?;
        let skip = args.skip.map(|v| non_negative("skip", v)).transpose()?;

        if !meta.meta {
            if let Some(order_by) = &args.order_by {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order_clause(list, order_by)?);
            }
            if let Some(first) = first {
                let placeholder = self.params.push(SqlParam::Int(first));
                sql.push_str(&format!(" LIMIT {}", placeholder));
            }
            if let Some(skip) = skip {
                let placeholder = self.params.push(SqlParam::Int(skip));
                sql.push_str(&format!(" OFFSET {}", placeholder));
            }
        }

        Ok(CompiledQuery {
            sql,
            params: self.params.into_vec(),
            projections,
        })
    }

    fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Register the join for a to-one field and return its alias
    fn to_one_join(
        &self,
        list: &List,
        parent: &str,
        path: &str,
        joins: &mut Joins,
    ) -> Result<String> {
        let (_, rel, target) = self.registry.relationship_field(list, path)?;
        let alias = format!("{}__{}", parent, path);
        if joins.seen.contains(&alias) {
            return Ok(alias);
        }

        let on = match &rel.storage {
            FieldStorage::Local { column } => format!(
                "{} = {}",
                qualified(&alias, ID_COLUMN),
                qualified(parent, column)
            ),
            FieldStorage::Remote { column, .. } => format!(
                "{} = {}",
                qualified(&alias, column),
                qualified(parent, ID_COLUMN)
            ),
            FieldStorage::Junction { .. } => {
                return Err(StoreError::invalid_filter(format!(
                    "'{}.{}' is a to-many relationship",
                    list.name, path
                )));
            }
        };

        joins.seen.insert(alias.clone());
        joins.clauses.push(format!(
            "LEFT OUTER JOIN {} AS {} ON {}",
            quote_identifier(&target.table_name),
            quote_identifier(&alias),
            on
        ));
        Ok(alias)
    }

    /// Join every to-one relationship the filter follows
    fn collect_joins(
        &self,
        list: &List,
        alias: &str,
        filter: &Filter,
        joins: &mut Joins,
    ) -> Result<()> {
        match filter {
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    self.collect_joins(list, alias, child, joins)?;
                }
            }
            Filter::ToOne { field, filter } => {
                let (_, _, target) = self.registry.relationship_field(list, field)?;
                let child = self.to_one_join(list, alias, field, joins)?;
                self.collect_joins(target, &child, filter, joins)?;
            }
            Filter::IsNull { field, .. } => {
                let (_, rel, _) = self.registry.relationship_field(list, field)?;
                if !rel.storage.is_local() {
                    self.to_one_join(list, alias, field, joins)?;
                }
            }
            Filter::Condition { .. } | Filter::ToMany { .. } => {}
        }
        Ok(())
    }

    fn predicate(&mut self, list: &List, alias: &str, filter: &Filter) -> Result<String> {
        match filter {
            Filter::And(children) => self.combine(list, alias, children, " AND ", "TRUE"),
            Filter::Or(children) => self.combine(list, alias, children, " OR ", "FALSE"),
            Filter::Condition {
                column,
                column_type,
                op,
                value,
            } => build_predicate(
                *op,
                &qualified(alias, column),
                column_type,
                value,
                &mut self.params,
            )
            .map_err(|e| StoreError::invalid_filter(format!("{}.{}: {}", list.name, column, e))),
            Filter::IsNull { field, value } => {
                let (_, rel, _) = self.registry.relationship_field(list, field)?;
                let column = match &rel.storage {
                    FieldStorage::Local { column } => qualified(alias, column),
                    _ => qualified(&format!("{}__{}", alias, field), ID_COLUMN),
                };
                Ok(format!(
                    "{} {}",
                    column,
                    if *value { "IS NULL" } else { "IS NOT NULL" }
                ))
            }
            Filter::ToOne { field, filter } => {
                let (_, _, target) = self.registry.relationship_field(list, field)?;
                let child = format!("{}__{}", alias, field);
                let exists = format!("{} IS NOT NULL", qualified(&child, ID_COLUMN));
                let nested = self.predicate(target, &child, filter)?;
                Ok(if nested == "TRUE" {
                    exists
                } else {
                    format!("({} AND {})", exists, nested)
                })
            }
            Filter::ToMany {
                field,
                quantifier,
                filter,
            } => {
                let (_, rel, target) = self.registry.relationship_field(list, field)?;
                let negate = *quantifier == Quantifier::Every;
                let subquery = self.related_ids(list, field, rel, target, filter, negate)?;
                let membership = match quantifier {
                    Quantifier::Some => "IN",
                    Quantifier::None | Quantifier::Every => "NOT IN",
                };
                Ok(format!(
                    "{} {} ({})",
                    qualified(alias, ID_COLUMN),
                    membership,
                    subquery
                ))
            }
        }
    }

    fn combine(
        &mut self,
        list: &List,
        alias: &str,
        children: &[Filter],
        separator: &str,
        empty: &str,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(self.predicate(list, alias, child)?);
        }
        Ok(match parts.len() {
            0 => empty.to_string(),
            1 => parts.remove(0),
            _ => format!("({})", parts.join(separator)),
        })
    }

    /// Subquery selecting the ids of `list` items with a related row matching
    /// `filter` (or failing it when `negate` is set)
    fn related_ids(
        &mut self,
        list: &List,
        path: &str,
        rel: &RelationshipField,
        target: &List,
        filter: &Filter,
        negate: bool,
    ) -> Result<String> {
        match &rel.storage {
            FieldStorage::Remote { table, column } => {
                let alias = self.fresh_alias();
                let mut joins = Joins::default();
                self.collect_joins(target, &alias, filter, &mut joins)?;
                let predicate = self.predicate(target, &alias, filter)?;

                let mut conditions = vec![format!("{} IS NOT NULL", qualified(&alias, column))];
                if let Some(predicate) = quantified(predicate, negate) {
                    conditions.push(predicate);
                }
                Ok(format!(
                    "SELECT {} FROM {} AS {}{} WHERE {}",
                    qualified(&alias, column),
                    quote_identifier(table),
                    quote_identifier(&alias),
                    joins.render(),
                    conditions.join(" AND ")
                ))
            }
            FieldStorage::Junction { table, near, far } => {
                let junction = self.fresh_alias();
                let alias = self.fresh_alias();
                let mut joins = Joins::default();
                self.collect_joins(target, &alias, filter, &mut joins)?;
                let predicate = self.predicate(target, &alias, filter)?;

                let mut sql = format!(
                    "SELECT {} FROM {} AS {} INNER JOIN {} AS {} ON {} = {}{}",
                    qualified(&junction, near),
                    quote_identifier(table),
                    quote_identifier(&junction),
                    quote_identifier(&target.table_name),
                    quote_identifier(&alias),
                    qualified(&alias, ID_COLUMN),
                    qualified(&junction, far),
                    joins.render()
                );
                if let Some(predicate) = quantified(predicate, negate) {
                    sql.push_str(" WHERE ");
                    sql.push_str(&predicate);
                }
                Ok(sql)
            }
            FieldStorage::Local { .. } => Err(StoreError::invalid_filter(format!(
                "'{}.{}' is a to-one relationship and cannot be quantified",
                list.name, path
            ))),
        }
    }

    /// Restrict the query to the items an anchor item's field points at
    fn anchor_predicate(&mut self, list: &List, anchor: &Anchor) -> Result<String> {
        let anchor_list = self.registry.list(&anchor.list)?;
        let (_, rel, target) = self.registry.relationship_field(anchor_list, &anchor.field)?;
        if target.name != list.name {
            return Err(StoreError::invalid_filter(format!(
                "'{}.{}' points at '{}', not '{}'",
                anchor_list.name, anchor.field, target.name, list.name
            )));
        }

        let id = self.params.push(SqlParam::Text(anchor.id.clone()));
        Ok(match &rel.storage {
            FieldStorage::Junction { table, near, far } => format!(
                "{} IN (SELECT {} FROM {} WHERE {} = {})",
                qualified(BASE_ALIAS, ID_COLUMN),
                quote_identifier(far),
                quote_identifier(table),
                quote_identifier(near),
                id
            ),
            FieldStorage::Local { column } => format!(
                "{} IN (SELECT {} FROM {} WHERE {} = {})",
                qualified(BASE_ALIAS, ID_COLUMN),
                quote_identifier(column),
                quote_identifier(&anchor_list.table_name),
                quote_identifier(ID_COLUMN),
                id
            ),
            FieldStorage::Remote { column, .. } => {
                format!("{} = {}", qualified(BASE_ALIAS, column), id)
            }
        })
    }
}

#[derive(Default)]
struct Joins {
    seen: HashSet<String>,
    clauses: Vec<String>,
}

impl Joins {
    fn render(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| format!(" {}", clause))
            .collect()
    }
}

/// Predicate placed inside a quantifier subquery, `None` when it is always true
fn quantified(predicate: String, negate: bool) -> Option<String> {
    match (negate, predicate.as_str()) {
        (false, "TRUE") => None,
        (false, _) => Some(predicate),
        (true, _) => Some(format!("NOT COALESCE(({}), FALSE)", predicate)),
    }
}

/// `ORDER BY` expression for `<field>_<ASC|DESC>`
fn order_clause(list: &List, order_by: &str) -> Result<String> {
    let (path, direction) = order_by.rsplit_once('_').ok_or_else(|| {
        StoreError::invalid_filter(format!(
            "orderBy '{}' must look like <field>_ASC or <field>_DESC",
            order_by
        ))
    })?;

    let direction = if direction.eq_ignore_ascii_case("asc") {
        "ASC"
    } else if direction.eq_ignore_ascii_case("desc") {
        "DESC"
    } else {
        return Err(StoreError::invalid_filter(format!(
            "Invalid sort direction '{}' in orderBy '{}'",
            direction, order_by
        )));
    };

    let column = if path == ID_COLUMN {
        ID_COLUMN
    } else {
        list.field(path)
            .and_then(|field| field.sort_column())
            .ok_or_else(|| {
                StoreError::invalid_filter(format!(
                    "Cannot sort list '{}' by '{}'",
                    list.name, path
                ))
            })?
    };

    Ok(format!("{} {}", qualified(BASE_ALIAS, column), direction))
}

fn non_negative(name: &str, value: i64) -> Result<i64> {
    if value < 0 {
        return Err(StoreError::validation(format!(
            "'{}' cannot be negative, got {}",
            name, value
        )));
    }
    Ok(value)
}
