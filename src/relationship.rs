//! Relationship descriptors
//!
//! A relationship is declared by a field on one list (`ref: "User"`) or by a
//! pair of fields pointing at each other (`ref: "User.posts"` and
//! `ref: "Post.author"`). Each edge is resolved once into a
//! [`RelationshipDescriptor`] that fixes its cardinality and where it is
//! stored:
//!
//! | Cardinality | Storage                                        |
//! |-------------|------------------------------------------------|
//! | 1:1         | FK column on the right side's table            |
//! | 1:N         | FK column on the right (many) side's table     |
//! | N:1         | FK column on the left side's table             |
//! | N:N         | junction table with one FK column per side     |

use std::fmt;

/// Declared multiplicity of a relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Resolve the cardinality from the `many` flags of the two sides
    ///
    /// `right_many` is `None` for one-sided relationships.
    pub fn resolve(left_many: bool, right_many: Option<bool>) -> Self {
        match (left_many, right_many) {
            (true, None) => Cardinality::ManyToMany,
            (false, None) => Cardinality::ManyToOne,
            (true, Some(true)) => Cardinality::ManyToMany,
            (true, Some(false)) => Cardinality::OneToMany,
            (false, Some(true)) => Cardinality::ManyToOne,
            (false, Some(false)) => Cardinality::OneToOne,
        }
    }

    /// Side whose table holds the FK column, `None` for junction-backed edges
    pub fn fk_side(self) -> Option<Side> {
        match self {
            Cardinality::OneToOne | Cardinality::OneToMany => Some(Side::Right),
            Cardinality::ManyToOne => Some(Side::Left),
            Cardinality::ManyToMany => None,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::ManyToMany => "N:N",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// One participant of a relationship
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipEnd {
    pub list: String,
    pub table: String,
    /// Field path on this list; `None` for the passive side of a one-sided relationship
    pub field: Option<String>,
}

/// Where a relationship's data lives
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipStorage {
    ForeignKey {
        /// Side whose table holds `column`
        owner: Side,
        table: String,
        column: String,
    },
    Junction {
        table: String,
        left_column: String,
        right_column: String,
    },
}

/// Static metadata for one relationship edge
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDescriptor {
    pub left: RelationshipEnd,
    pub right: RelationshipEnd,
    pub cardinality: Cardinality,
    pub storage: RelationshipStorage,
}

impl RelationshipDescriptor {
    /// Build a descriptor from its two ends and their `many` flags
    ///
    /// `left.field` must be set. `right_many` is `None` when the right side
    /// declares no field.
    pub fn new(
        left: RelationshipEnd,
        left_many: bool,
        right: RelationshipEnd,
        right_many: Option<bool>,
    ) -> Result<Self, String> {
        let left_field = left
            .field
            .clone()
            .ok_or_else(|| format!("Relationship on list '{}' has no left field", left.list))?;
        let cardinality = Cardinality::resolve(left_many, right_many);

        let storage = match cardinality.fk_side() {
            Some(Side::Left) => RelationshipStorage::ForeignKey {
                owner: Side::Left,
                table: left.table.clone(),
                column: left_field.clone(),
            },
            Some(Side::Right) => {
                let right_field = right.field.clone().ok_or_else(|| {
                    format!(
                        "{} relationship {}.{} needs a field on '{}'",
                        cardinality, left.list, left_field, right.list
                    )
                })?;
                RelationshipStorage::ForeignKey {
                    owner: Side::Right,
                    table: right.table.clone(),
                    column: right_field,
                }
            }
            None => {
                let table = match &right.field {
                    Some(right_field) => format!(
                        "{}_{}_{}_{}",
                        left.table, left_field, right.table, right_field
                    ),
                    None => format!("{}_{}_many", left.table, left_field),
                };
                RelationshipStorage::Junction {
                    table,
                    left_column: format!("{}_left_id", left.table),
                    right_column: format!("{}_right_id", right.table),
                }
            }
        };

        Ok(Self {
            left,
            right,
            cardinality,
            storage,
        })
    }

    pub fn end(&self, side: Side) -> &RelationshipEnd {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Name of the table backing this relationship
    pub fn table_name(&self) -> &str {
        match &self.storage {
            RelationshipStorage::ForeignKey { table, .. } => table,
            RelationshipStorage::Junction { table, .. } => table,
        }
    }

    /// Where a field on the given side reads and writes its value
    pub fn storage_for(&self, side: Side) -> FieldStorage {
        match &self.storage {
            RelationshipStorage::ForeignKey { owner, table, column } => {
                if *owner == side {
                    FieldStorage::Local {
                        column: column.clone(),
                    }
                } else {
                    FieldStorage::Remote {
                        table: table.clone(),
                        column: column.clone(),
                    }
                }
            }
            RelationshipStorage::Junction {
                table,
                left_column,
                right_column,
            } => {
                let (near, far) = match side {
                    Side::Left => (left_column, right_column),
                    Side::Right => (right_column, left_column),
                };
                FieldStorage::Junction {
                    table: table.clone(),
                    near: near.clone(),
                    far: far.clone(),
                }
            }
        }
    }
}

/// Storage of a relationship seen from one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStorage {
    /// FK column on the field's own table; the field is a real column
    Local { column: String },
    /// FK column on the related list's table pointing back at this list
    Remote { table: String, column: String },
    /// Junction table; `near` references this list, `far` the related one
    Junction {
        table: String,
        near: String,
        far: String,
    },
}

impl FieldStorage {
    pub fn is_local(&self) -> bool {
        matches!(self, FieldStorage::Local { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(list: &str, table: &str, field: Option<&str>) -> RelationshipEnd {
        RelationshipEnd {
            list: list.to_string(),
            table: table.to_string(),
            field: field.map(str::to_string),
        }
    }

    #[test]
    fn test_cardinality_resolution() {
        assert_eq!(Cardinality::resolve(true, None), Cardinality::ManyToMany);
        assert_eq!(Cardinality::resolve(false, None), Cardinality::ManyToOne);
        assert_eq!(Cardinality::resolve(true, Some(true)), Cardinality::ManyToMany);
        assert_eq!(Cardinality::resolve(true, Some(false)), Cardinality::OneToMany);
        assert_eq!(Cardinality::resolve(false, Some(true)), Cardinality::ManyToOne);
        assert_eq!(Cardinality::resolve(false, Some(false)), Cardinality::OneToOne);
    }

    #[test]
    fn test_cardinality_display() {
        assert_eq!(Cardinality::OneToOne.to_string(), "1:1");
        assert_eq!(Cardinality::ManyToMany.to_string(), "N:N");
    }

    #[test]
    fn test_one_sided_many_to_one_fk_on_left() {
        let rel = RelationshipDescriptor::new(
            end("Post", "posts", Some("author")),
            false,
            end("User", "users", None),
            None,
        )
        .unwrap();

        assert_eq!(rel.cardinality, Cardinality::ManyToOne);
        assert_eq!(
            rel.storage,
            RelationshipStorage::ForeignKey {
                owner: Side::Left,
                table: "posts".into(),
                column: "author".into(),
            }
        );
        assert_eq!(
            rel.storage_for(Side::Left),
            FieldStorage::Local {
                column: "author".into()
            }
        );
        assert_eq!(
            rel.storage_for(Side::Right),
            FieldStorage::Remote {
                table: "posts".into(),
                column: "author".into()
            }
        );
    }

    #[test]
    fn test_one_to_many_fk_on_right() {
        let rel = RelationshipDescriptor::new(
            end("Author", "authors", Some("books")),
            true,
            end("Book", "books", Some("writer")),
            Some(false),
        )
        .unwrap();

        assert_eq!(rel.cardinality, Cardinality::OneToMany);
        assert_eq!(rel.table_name(), "books");
        assert!(!rel.storage_for(Side::Left).is_local());
        assert!(rel.storage_for(Side::Right).is_local());
    }

    #[test]
    fn test_one_to_one_fk_on_right() {
        let rel = RelationshipDescriptor::new(
            end("Profile", "profiles", Some("owner")),
            false,
            end("User", "users", Some("profile")),
            Some(false),
        )
        .unwrap();

        assert_eq!(rel.cardinality, Cardinality::OneToOne);
        assert_eq!(
            rel.storage,
            RelationshipStorage::ForeignKey {
                owner: Side::Right,
                table: "users".into(),
                column: "profile".into(),
            }
        );
    }

    #[test]
    fn test_two_sided_junction_names() {
        let rel = RelationshipDescriptor::new(
            end("Post", "posts", Some("tags")),
            true,
            end("Tag", "tags", Some("posts")),
            Some(true),
        )
        .unwrap();

        assert_eq!(
            rel.storage,
            RelationshipStorage::Junction {
                table: "posts_tags_tags_posts".into(),
                left_column: "posts_left_id".into(),
                right_column: "tags_right_id".into(),
            }
        );
        assert_eq!(
            rel.storage_for(Side::Right),
            FieldStorage::Junction {
                table: "posts_tags_tags_posts".into(),
                near: "tags_right_id".into(),
                far: "posts_left_id".into(),
            }
        );
    }

    #[test]
    fn test_one_sided_junction_name() {
        let rel = RelationshipDescriptor::new(
            end("User", "users", Some("friends")),
            true,
            end("User", "users", None),
            None,
        )
        .unwrap();

        assert_eq!(rel.table_name(), "users_friends_many");
        match rel.storage_for(Side::Left) {
            FieldStorage::Junction { near, far, .. } => {
                assert_eq!(near, "users_left_id");
                assert_eq!(far, "users_right_id");
            }
            other => panic!("Expected junction storage, got {:?}", other),
        }
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::Right.opposite(), Side::Left);
    }
}
