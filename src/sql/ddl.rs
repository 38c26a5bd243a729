//! DDL generation for list tables and relationship wiring
//!
//! List tables get an `id` primary key plus one column per real field. Foreign
//! keys and junction tables are added afterwards by relationship wiring, so
//! list tables can be created in any order.

use crate::list::{FieldAdapter, FieldKind, List, ListRegistry, ID_COLUMN};
use crate::relationship::{RelationshipDescriptor, RelationshipStorage};
use crate::sql::sanitize::quote_identifier;
use crate::types::ID_SQL_TYPE;

/// DDL generator for the tables of a registry
pub struct DdlGenerator<'a> {
    registry: &'a ListRegistry,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(registry: &'a ListRegistry) -> Self {
        Self { registry }
    }

    /// Generate CREATE TABLE for a list
    pub fn generate_create_table(&self, list: &List) -> String {
        let mut column_defs = vec![format!(
            "{} {} PRIMARY KEY DEFAULT gen_random_uuid()::text",
            quote_identifier(ID_COLUMN),
            ID_SQL_TYPE
        )];
        column_defs.extend(list.fields().iter().filter_map(Self::format_column_definition));

        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&list.table_name),
            column_defs.join(", ")
        )
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", quote_identifier(table_name))
    }

    /// DROP TABLE for every junction table and list table
    pub fn generate_drop_tables(&self) -> Vec<String> {
        let junctions = self
            .registry
            .relationships()
            .iter()
            .filter(|rel| matches!(rel.storage, RelationshipStorage::Junction { .. }))
            .map(|rel| self.generate_drop_table(rel.table_name()));
        let lists = self
            .registry
            .lists()
            .map(|list| self.generate_drop_table(&list.table_name));
        junctions.chain(lists).collect()
    }

    /// Generate CREATE INDEX on a single column
    pub fn generate_create_index(&self, table_name: &str, column: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            quote_identifier(&format!("{}_{}_idx", table_name, column)),
            quote_identifier(table_name),
            quote_identifier(column)
        )
    }

    /// Recreate the junction table backing an N:N relationship
    ///
    /// Both columns reference their list's `id` with `ON DELETE CASCADE` and are
    /// indexed separately. Pairs are not unique.
    pub fn generate_junction_table(&self, rel: &RelationshipDescriptor) -> Vec<String> {
        let RelationshipStorage::Junction {
            table,
            left_column,
            right_column,
        } = &rel.storage
        else {
            return Vec::new();
        };

        let reference = |column: &str, target_table: &str| {
            format!(
                "{} {} NOT NULL REFERENCES {}({}) ON DELETE CASCADE",
                quote_identifier(column),
                ID_SQL_TYPE,
                quote_identifier(target_table),
                quote_identifier(ID_COLUMN)
            )
        };

        vec![
            self.generate_drop_table(table),
            format!(
                "CREATE TABLE {} ({}, {})",
                quote_identifier(table),
                reference(left_column, &rel.left.table),
                reference(right_column, &rel.right.table)
            ),
            self.generate_create_index(table, left_column),
            self.generate_create_index(table, right_column),
        ]
    }

    /// Add the FK constraint and index for a 1:1, 1:N or N:1 relationship
    pub fn generate_foreign_key(&self, rel: &RelationshipDescriptor) -> Vec<String> {
        let RelationshipStorage::ForeignKey {
            owner,
            table,
            column,
        } = &rel.storage
        else {
            return Vec::new();
        };
        let referenced = &rel.end(owner.opposite()).table;
        let constraint = quote_identifier(&format!("{}_{}_fkey", table, column));

        vec![
            format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                quote_identifier(table),
                constraint
            ),
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE SET NULL",
                quote_identifier(table),
                constraint,
                quote_identifier(column),
                quote_identifier(referenced),
                quote_identifier(ID_COLUMN)
            ),
            self.generate_create_index(table, column),
        ]
    }

    /// Column definition of a real field; `None` for fields stored elsewhere
    pub fn format_column_definition(field: &FieldAdapter) -> Option<String> {
        let mut parts = match &field.kind {
            FieldKind::Scalar(column_type) => vec![
                quote_identifier(&field.path),
                column_type.to_sql_type(&field.path),
            ],
            FieldKind::Relationship(rel) if rel.storage.is_local() => {
                vec![quote_identifier(&field.path), ID_SQL_TYPE.to_string()]
            }
            FieldKind::Relationship(_) => return None,
        };

        if field.unique {
            parts.push("UNIQUE".to_string());
        }
        if !field.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &field.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        Some(parts.join(" "))
    }
}
