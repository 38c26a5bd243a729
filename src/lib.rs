//! # runtara-relational-store
//!
//! A relational list store for PostgreSQL with relationship-aware filtering.
//!
//! Lists are declared up front as [`ListDefinition`]s. Fields are either
//! scalar columns or relationships to other lists, and relationships can be
//! one-sided (`ref = "Tag"`) or two-sided (`ref = "User.posts"`). The store
//! resolves every relationship to a cardinality (1:1, 1:N, N:1, N:N) and keeps
//! the underlying foreign keys and junction tables consistent as items are
//! created, updated and deleted.
//!
//! ## Features
//!
//! - **Relationship Wiring**: FK constraints for 1:1, 1:N and N:1, junction tables for N:N
//! - **Filter Trees**: `AND`/`OR`, per-type operators (`_not`, `_in`, `_lt`, `_contains_i`, ...)
//! - **Relationship Filters**: nested filters across to-one relationships and
//!   `_some`/`_none`/`_every` across to-many relationships
//! - **Scoped Traversal**: query the items an item's relationship field points at
//! - **Counts**: `first`/`skip`-aware item counts
//! - **SQL Injection Prevention**: identifiers are validated and quoted, values are bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_relational_store::{
//!     ColumnType, FieldDefinition, ListDefinition, QueryArgs, RelationalStore, StoreConfig,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lists = vec![
//!         ListDefinition::new(
//!             "User",
//!             "users",
//!             vec![
//!                 FieldDefinition::new("name", ColumnType::String).not_null(),
//!                 FieldDefinition::relationship("posts", "Post.author").many(),
//!             ],
//!         ),
//!         ListDefinition::new(
//!             "Post",
//!             "posts",
//!             vec![
//!                 FieldDefinition::new("title", ColumnType::String),
//!                 FieldDefinition::relationship("author", "User.posts"),
//!             ],
//!         ),
//!     ];
//!
//!     let config = StoreConfig::builder("postgres://localhost/blog")
//!         .drop_database(true)
//!         .build();
//!     let store = RelationalStore::connect(config, lists).await?;
//!
//!     let ada = store.create("User", json!({ "name": "Ada" })).await?;
//!     store
//!         .create("Post", json!({ "title": "Notes", "author": ada.id }))
//!         .await?;
//!
//!     // Posts written by a user named Ada
//!     let posts = store
//!         .find("Post", &json!({ "author": { "name": "Ada" } }), QueryArgs::new())
//!         .await?;
//!
//!     // Users with at least one post
//!     let authors = store
//!         .count("User", &json!({ "posts_some": { "title_contains_i": "notes" } }))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use runtara_relational_store::StoreConfig;
//!
//! let config = StoreConfig::builder("postgres://localhost/mydb")
//!     .max_connections(10)     // Pool size (default)
//!     .drop_database(false)    // Recreate every table on connect
//!     .wire_on_connect(false)  // Recreate FK constraints and junction tables on connect
//!     .build();
//! ```
//!
//! ## Logging
//!
//! Every executed statement is emitted as a `tracing` debug event with its SQL
//! text and parameter count; startup wiring logs at info level.

#[macro_use]
mod trace;

pub mod config;
pub mod error;
pub mod filter;
pub mod item;
pub mod list;
mod mutator;
pub mod relationship;
mod row;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{StoreConfig, StoreConfigBuilder};
pub use error::{Result, StoreError};
pub use filter::{Filter, Quantifier};
pub use item::{Anchor, Item, QueryArgs, QueryMeta, QueryResult};
pub use list::{FieldDefinition, List, ListDefinition, ListRegistry};
pub use relationship::{Cardinality, RelationshipDescriptor};
pub use store::RelationalStore;
pub use types::ColumnType;

// Re-export SQL utilities for advanced users
pub use sql::compiler::{CompiledQuery, QueryCompiler};
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
