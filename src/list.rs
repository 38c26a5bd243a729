//! Lists, field adapters and the list registry
//!
//! Callers describe their data model with [`ListDefinition`]s. The
//! [`ListRegistry`] validates them, resolves every relationship into a
//! [`RelationshipDescriptor`] and builds the runtime [`List`]s, each with its
//! [`FieldAdapter`]s and the table of filter keys it accepts. The registry is
//! built once at startup and only read afterwards.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::filter::Quantifier;
use crate::relationship::{
    Cardinality, FieldStorage, RelationshipDescriptor, RelationshipEnd, Side,
};
use crate::sql::condition::{filter_keys, Operator, OperatorCategory};
use crate::sql::sanitize::validate_identifier;
use crate::types::{ColumnDefault, ColumnType};

/// Name of the primary key column on every list table
pub const ID_COLUMN: &str = "id";

// ============================================================================
// Definitions
// ============================================================================

/// Declaration of a list
#[derive(Debug, Clone)]
pub struct ListDefinition {
    /// List name used by callers and in `ref` declarations (e.g. `Post`)
    pub name: String,
    /// Database table holding the list's items
    pub table_name: String,
    pub fields: Vec<FieldDefinition>,
}

impl ListDefinition {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        fields: Vec<FieldDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            fields,
        }
    }
}

/// What a declared field holds
#[derive(Debug, Clone)]
pub enum FieldDefinitionKind {
    Scalar(ColumnType),
    /// `reference` is `"List"` or `"List.field"` for a two-sided relationship
    Relationship { reference: String, many: bool },
}

/// Declaration of one field of a list
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub path: String,
    pub kind: FieldDefinitionKind,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl FieldDefinition {
    /// A scalar field stored in a column of the given type
    pub fn new(path: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            path: path.into(),
            kind: FieldDefinitionKind::Scalar(column_type),
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// A to-one relationship to `reference` (`"User"` or `"User.posts"`)
    pub fn relationship(path: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldDefinitionKind::Relationship {
                reference: reference.into(),
                many: false,
            },
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// Turn a relationship field into a to-many field
    pub fn many(mut self) -> Self {
        if let FieldDefinitionKind::Relationship { many, .. } = &mut self.kind {
            *many = true;
        }
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Static SQL default expression
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Static(value.into()));
        self
    }

    /// Default computed when the table is created
    pub fn default_with(mut self, compute: fn() -> String) -> Self {
        self.default = Some(ColumnDefault::Computed(compute));
        self
    }
}

// ============================================================================
// Runtime lists
// ============================================================================

/// Relationship half of a field adapter
#[derive(Debug, Clone)]
pub struct RelationshipField {
    /// Name of the related list
    pub target: String,
    pub many: bool,
    pub cardinality: Cardinality,
    pub storage: FieldStorage,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ColumnType),
    Relationship(RelationshipField),
}

/// Runtime description of one field
#[derive(Debug, Clone)]
pub struct FieldAdapter {
    pub path: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl FieldAdapter {
    /// Whether the field is backed by a column on its own list's table
    pub fn is_real(&self) -> bool {
        match &self.kind {
            FieldKind::Scalar(_) => true,
            FieldKind::Relationship(rel) => rel.storage.is_local(),
        }
    }

    pub fn relationship(&self) -> Option<&RelationshipField> {
        match &self.kind {
            FieldKind::Relationship(rel) => Some(rel),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Column used when sorting by this field
    pub fn sort_column(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Scalar(ColumnType::Json) => None,
            FieldKind::Scalar(_) => Some(&self.path),
            FieldKind::Relationship(rel) => match &rel.storage {
                FieldStorage::Local { column } => Some(column),
                _ => None,
            },
        }
    }
}

/// What a filter key resolves to on a list
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKey {
    /// Scalar comparison on a column of this list
    Condition {
        column: String,
        column_type: ColumnType,
        op: Operator,
    },
    /// Nested filter on a to-one relationship
    ToOne { field: String },
    /// `<path>_is_null` on a to-one relationship
    IsNull { field: String },
    /// `<path>_some` / `_none` / `_every` on a to-many relationship
    Quantified { field: String, quantifier: Quantifier },
}

/// A registered list
#[derive(Debug, Clone)]
pub struct List {
    pub name: String,
    pub table_name: String,
    fields: Vec<FieldAdapter>,
    filter_keys: HashMap<String, FilterKey>,
}

impl List {
    pub fn fields(&self) -> &[FieldAdapter] {
        &self.fields
    }

    pub fn field(&self, path: &str) -> Option<&FieldAdapter> {
        self.fields.iter().find(|f| f.path == path)
    }

    pub fn filter_key(&self, key: &str) -> Option<&FilterKey> {
        self.filter_keys.get(key)
    }

    /// Fields backed by a column on this list's table, in declaration order
    pub fn real_fields(&self) -> impl Iterator<Item = &FieldAdapter> {
        self.fields.iter().filter(|f| f.is_real())
    }

    /// Relationship fields whose value lives on another table
    pub fn non_real_fields(&self) -> impl Iterator<Item = &FieldAdapter> {
        self.fields.iter().filter(|f| !f.is_real())
    }

    fn build(
        definition: &ListDefinition,
        relationship_fields: &HashMap<String, RelationshipField>,
    ) -> Result<Self> {
        let mut fields = Vec::with_capacity(definition.fields.len());
        for field in &definition.fields {
            let kind = match &field.kind {
                FieldDefinitionKind::Scalar(column_type) => FieldKind::Scalar(column_type.clone()),
                FieldDefinitionKind::Relationship { .. } => {
                    let rel = relationship_fields.get(&field.path).cloned().ok_or_else(|| {
                        StoreError::configuration(format!(
                            "Missing relationship descriptor for {}.{}",
                            definition.name, field.path
                        ))
                    })?;
                    FieldKind::Relationship(rel)
                }
            };
            fields.push(FieldAdapter {
                path: field.path.clone(),
                kind,
                nullable: field.nullable,
                unique: field.unique,
                default: field.default.clone(),
            });
        }

        let mut list = Self {
            name: definition.name.clone(),
            table_name: definition.table_name.clone(),
            fields,
            filter_keys: HashMap::new(),
        };
        list.register_filter_keys()?;
        Ok(list)
    }

    fn register_filter_keys(&mut self) -> Result<()> {
        let mut keys: Vec<(String, FilterKey)> = Vec::new();

        for category in [OperatorCategory::Equality, OperatorCategory::Set] {
            for op in Operator::in_category(category) {
                keys.push((
                    format!("{}{}", ID_COLUMN, op.suffix()),
                    FilterKey::Condition {
                        column: ID_COLUMN.to_string(),
                        column_type: ColumnType::String,
                        op: *op,
                    },
                ));
            }
        }

        for field in &self.fields {
            match &field.kind {
                FieldKind::Scalar(column_type) => {
                    for (key, op) in filter_keys(&field.path, column_type) {
                        keys.push((
                            key,
                            FilterKey::Condition {
                                column: field.path.clone(),
                                column_type: column_type.clone(),
                                op,
                            },
                        ));
                    }
                }
                FieldKind::Relationship(rel) if rel.many => {
                    for quantifier in [Quantifier::Some, Quantifier::None, Quantifier::Every] {
                        keys.push((
                            format!("{}{}", field.path, quantifier.suffix()),
                            FilterKey::Quantified {
                                field: field.path.clone(),
                                quantifier,
                            },
                        ));
                    }
                }
                FieldKind::Relationship(_) => {
                    keys.push((
                        field.path.clone(),
                        FilterKey::ToOne {
                            field: field.path.clone(),
                        },
                    ));
                    keys.push((
                        format!("{}_is_null", field.path),
                        FilterKey::IsNull {
                            field: field.path.clone(),
                        },
                    ));
                }
            }
        }

        for (key, target) in keys {
            if key == "AND" || key == "OR" {
                return Err(StoreError::configuration(format!(
                    "Filter key '{}' on list '{}' collides with a logical operator",
                    key, self.name
                )));
            }
            if self.filter_keys.insert(key.clone(), target).is_some() {
                return Err(StoreError::configuration(format!(
                    "Filter key '{}' is produced by more than one field of list '{}'",
                    key, self.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All registered lists and the relationships between them
#[derive(Debug, Clone)]
pub struct ListRegistry {
    lists: IndexMap<String, List>,
    relationships: Vec<RelationshipDescriptor>,
}

impl ListRegistry {
    /// Validate the definitions and resolve every relationship
    pub fn new(definitions: Vec<ListDefinition>) -> Result<Self> {
        let mut by_name: IndexMap<String, &ListDefinition> = IndexMap::new();
        let mut tables: HashMap<&str, &str> = HashMap::new();

        for definition in &definitions {
            validate_identifier(&definition.table_name, &[])
                .map_err(StoreError::configuration)?;
            if by_name.insert(definition.name.clone(), definition).is_some() {
                return Err(StoreError::configuration(format!(
                    "List '{}' is registered twice",
                    definition.name
                )));
            }
            if let Some(other) = tables.insert(&definition.table_name, &definition.name) {
                return Err(StoreError::configuration(format!(
                    "Lists '{}' and '{}' share table '{}'",
                    other, definition.name, definition.table_name
                )));
            }

            let mut paths = std::collections::HashSet::new();
            for field in &definition.fields {
                validate_identifier(&field.path, &[ID_COLUMN]).map_err(|e| {
                    StoreError::configuration(format!("{}.{}: {}", definition.name, field.path, e))
                })?;
                // `__` separates join aliases
                if field.path.contains("__") {
                    return Err(StoreError::configuration(format!(
                        "{}.{}: field paths cannot contain '__'",
                        definition.name, field.path
                    )));
                }
                if !paths.insert(field.path.as_str()) {
                    return Err(StoreError::configuration(format!(
                        "Field '{}' is declared twice on list '{}'",
                        field.path, definition.name
                    )));
                }
            }
        }

        let relationships = resolve_relationships(&by_name)?;

        // (list, path) -> relationship field
        let mut relationship_fields: HashMap<String, HashMap<String, RelationshipField>> =
            HashMap::new();
        for rel in &relationships {
            for side in [Side::Left, Side::Right] {
                let end = rel.end(side);
                let Some(path) = &end.field else { continue };
                let many = declared_many(&by_name, &end.list, path);
                relationship_fields
                    .entry(end.list.clone())
                    .or_default()
                    .insert(
                        path.clone(),
                        RelationshipField {
                            target: rel.end(side.opposite()).list.clone(),
                            many,
                            cardinality: rel.cardinality,
                            storage: rel.storage_for(side),
                        },
                    );
            }
        }

        let empty = HashMap::new();
        let mut lists = IndexMap::new();
        for definition in &definitions {
            let fields = relationship_fields.get(&definition.name).unwrap_or(&empty);
            lists.insert(definition.name.clone(), List::build(definition, fields)?);
        }

        Ok(Self {
            lists,
            relationships,
        })
    }

    /// Look up a list by name
    pub fn list(&self, name: &str) -> Result<&List> {
        self.lists
            .get(name)
            .ok_or_else(|| StoreError::list_not_found(name))
    }

    /// Lists in registration order
    pub fn lists(&self) -> impl Iterator<Item = &List> {
        self.lists.values()
    }

    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    /// Relationship field and the list it points at
    pub fn relationship_field<'a>(
        &'a self,
        list: &'a List,
        path: &str,
    ) -> Result<(&'a FieldAdapter, &'a RelationshipField, &'a List)> {
        let field = list.field(path).ok_or_else(|| {
            StoreError::configuration(format!("List '{}' has no field '{}'", list.name, path))
        })?;
        let rel = field.relationship().ok_or_else(|| {
            StoreError::configuration(format!(
                "Field '{}.{}' is not a relationship",
                list.name, path
            ))
        })?;
        let target = self.list(&rel.target)?;
        Ok((field, rel, target))
    }
}

fn declared_many(by_name: &IndexMap<String, &ListDefinition>, list: &str, path: &str) -> bool {
    by_name
        .get(list)
        .and_then(|d| d.fields.iter().find(|f| f.path == path))
        .map(|f| matches!(f.kind, FieldDefinitionKind::Relationship { many: true, .. }))
        .unwrap_or(false)
}

/// Split `"List.field"` into its parts
fn parse_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('.') {
        Some((list, field)) => (list, Some(field)),
        None => (reference, None),
    }
}

fn resolve_relationships(
    by_name: &IndexMap<String, &ListDefinition>,
) -> Result<Vec<RelationshipDescriptor>> {
    let mut relationships = Vec::new();

    for definition in by_name.values() {
        for field in &definition.fields {
            let FieldDefinitionKind::Relationship { reference, many } = &field.kind else {
                continue;
            };
            let (target_name, target_path) = parse_reference(reference);
            let target = by_name.get(target_name).ok_or_else(|| {
                StoreError::configuration(format!(
                    "{}.{} references unknown list '{}'",
                    definition.name, field.path, target_name
                ))
            })?;

            let this_end = RelationshipEnd {
                list: definition.name.clone(),
                table: definition.table_name.clone(),
                field: Some(field.path.clone()),
            };

            let Some(target_path) = target_path else {
                let other_end = RelationshipEnd {
                    list: target.name.clone(),
                    table: target.table_name.clone(),
                    field: None,
                };
                relationships.push(
                    RelationshipDescriptor::new(this_end, *many, other_end, None)
                        .map_err(StoreError::configuration)?,
                );
                continue;
            };

            let back = target
                .fields
                .iter()
                .find(|f| f.path == target_path)
                .ok_or_else(|| {
                    StoreError::configuration(format!(
                        "{}.{} references unknown field '{}.{}'",
                        definition.name, field.path, target_name, target_path
                    ))
                })?;
            let FieldDefinitionKind::Relationship {
                reference: back_reference,
                many: back_many,
            } = &back.kind
            else {
                return Err(StoreError::configuration(format!(
                    "{}.{} references '{}.{}', which is not a relationship",
                    definition.name, field.path, target_name, target_path
                )));
            };

            let expected = format!("{}.{}", definition.name, field.path);
            if *back_reference != expected {
                return Err(StoreError::configuration(format!(
                    "{}.{} references '{}.{}', which points at '{}' instead of '{}'",
                    definition.name, field.path, target_name, target_path, back_reference, expected
                )));
            }

            let this_key = expected;
            let other_key = format!("{}.{}", target_name, target_path);
            if this_key == other_key {
                return Err(StoreError::configuration(format!(
                    "{} cannot reference itself",
                    this_key
                )));
            }
            // Each pair is registered once, from the side that sorts first
            if this_key > other_key {
                continue;
            }

            let other_end = RelationshipEnd {
                list: target.name.clone(),
                table: target.table_name.clone(),
                field: Some(target_path.to_string()),
            };
            relationships.push(
                RelationshipDescriptor::new(this_end, *many, other_end, Some(*back_many))
                    .map_err(StoreError::configuration)?,
            );
        }
    }

    Ok(relationships)
}
