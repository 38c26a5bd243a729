//! RelationalStore - Main entry point for relationship-aware list storage
//!
//! This module provides the `RelationalStore` struct that owns the connection
//! pool and the list registry, sets up tables and relationship wiring, and
//! exposes item mutations and queries.

use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{self, Filter};
use crate::item::{Item, QueryArgs, QueryMeta, QueryResult};
use crate::list::{ListDefinition, ListRegistry};
use crate::mutator;
use crate::relationship::{RelationshipDescriptor, RelationshipStorage};
use crate::row::run_query;
use crate::sql::ddl::DdlGenerator;

/// Relational list store backed by PostgreSQL
///
/// All lists share one connection pool. Each mutation runs in its own
/// transaction; reads run on a pooled connection.
pub struct RelationalStore {
    /// Database connection pool
    pool: PgPool,
    /// Store configuration
    config: StoreConfig,
    /// Lists and resolved relationships
    registry: ListRegistry,
}

impl RelationalStore {
    /// Connect and prepare the database
    ///
    /// This will:
    /// 1. Resolve the list definitions into a registry
    /// 2. Connect to the database
    /// 3. Recreate all tables when `drop_database` is set, or wire
    ///    relationships when `wire_on_connect` is set
    pub async fn connect(config: StoreConfig, lists: Vec<ListDefinition>) -> Result<Self> {
        let registry = ListRegistry::new(lists)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                let database = config
                    .database_name()
                    .unwrap_or_else(|| "<unknown>".to_string());
                tracing::error!(
                    database = %database,
                    error = %e,
                    "Could not connect to database '{}'. If it does not exist yet, create it with `createdb {}`",
                    database,
                    database
                );
                StoreError::Connection(format!("Database connection failed: {}", e))
            })?;

        let store = Self {
            pool,
            config,
            registry,
        };
        store.prepare().await?;
        Ok(store)
    }

    /// Create a store from an existing pool
    ///
    /// Use this when you already have a connection pool and want to
    /// share it with the store. The same startup steps as [`Self::connect`] run.
    pub async fn from_pool(
        pool: PgPool,
        config: StoreConfig,
        lists: Vec<ListDefinition>,
    ) -> Result<Self> {
        let store = Self {
            pool,
            config,
            registry: ListRegistry::new(lists)?,
        };
        store.prepare().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &ListRegistry {
        &self.registry
    }

    async fn prepare(&self) -> Result<()> {
        if self.config.drop_database {
            self.drop_tables().await?;
            self.create_tables().await?;
            self.wire_relationships().await
        } else if self.config.wire_on_connect {
            self.wire_relationships().await
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Schema Operations
    // =========================================================================

    /// Create the table of every list
    ///
    /// Tables are attempted independently; failures are collected.
    pub async fn create_tables(&self) -> Result<()> {
        let generator = DdlGenerator::new(&self.registry);
        let mut errors = Vec::new();

        for list in self.registry.lists() {
            let sql = generator.generate_create_table(list);
            trace_query!(sql, 0);
            match sqlx::query(&sql).execute(&self.pool).await {
                Ok(_) => tracing::info!(list = %list.name, table = %list.table_name, "Created list table"),
                Err(e) => {
                    tracing::warn!(list = %list.name, error = %e, "Failed to create list table");
                    errors.push(StoreError::from(e));
                }
            }
        }

        StoreError::from_batch(errors)
    }

    /// Drop every junction table and list table
    pub async fn drop_tables(&self) -> Result<()> {
        let generator = DdlGenerator::new(&self.registry);
        let mut errors = Vec::new();

        for sql in generator.generate_drop_tables() {
            trace_query!(sql, 0);
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                tracing::warn!(error = %e, sql = %sql, "Failed to drop table");
                errors.push(StoreError::from(e));
            }
        }

        StoreError::from_batch(errors)
    }

    /// Wire every relationship into the schema
    ///
    /// N:N relationships get a freshly created junction table; all others get
    /// an FK constraint and index on the FK side. Relationships are attempted
    /// independently and failures are collected.
    pub async fn wire_relationships(&self) -> Result<()> {
        let generator = DdlGenerator::new(&self.registry);
        let mut errors = Vec::new();

        for rel in self.registry.relationships() {
            let wired = match rel.storage {
                RelationshipStorage::Junction { .. } => self.ensure_junction_table(rel).await,
                RelationshipStorage::ForeignKey { .. } => {
                    self.execute_all(generator.generate_foreign_key(rel)).await
                }
            };
            match wired {
                Ok(()) => tracing::info!(
                    left = %rel.left.list,
                    right = %rel.right.list,
                    cardinality = %rel.cardinality,
                    table = %rel.table_name(),
                    "Wired relationship"
                ),
                Err(e) => {
                    tracing::warn!(
                        left = %rel.left.list,
                        right = %rel.right.list,
                        error = %e,
                        "Failed to wire relationship"
                    );
                    errors.push(e);
                }
            }
        }

        StoreError::from_batch(errors)
    }

    /// Drop and recreate the junction table backing an N:N relationship
    pub async fn ensure_junction_table(&self, rel: &RelationshipDescriptor) -> Result<()> {
        if !matches!(rel.storage, RelationshipStorage::Junction { .. }) {
            return Err(StoreError::configuration(format!(
                "{} relationship between '{}' and '{}' has no junction table",
                rel.cardinality, rel.left.list, rel.right.list
            )));
        }
        let generator = DdlGenerator::new(&self.registry);
        self.execute_all(generator.generate_junction_table(rel)).await
    }

    async fn execute_all(&self, statements: Vec<String>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for sql in statements {
            trace_query!(sql, 0);
            sqlx::query(&sql).execute(&mut *conn).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Item Operations
    // =========================================================================

    /// Create an item
    ///
    /// `data` is a JSON object of field values. Relationship fields take an
    /// item id (to-one) or an array of item ids (to-many). An `id` may be
    /// supplied; otherwise a UUID is generated.
    pub async fn create(&self, list: &str, data: Value) -> Result<Item> {
        let list = self.registry.list(list)?;

        let mut tx = self.pool.begin().await?;
        trace_tx!("begin", "create", list.name);
        let item = mutator::create(&mut tx, &self.registry, list, &data).await?;
        tx.commit().await?;
        trace_tx!("commit", "create", list.name);

        Ok(item)
    }

    /// Update an item
    ///
    /// Only submitted fields change. To-many values replace the current set.
    /// Returns `None` if the item doesn't exist.
    pub async fn update(&self, list: &str, id: &str, data: Value) -> Result<Option<Item>> {
        let list = self.registry.list(list)?;

        let mut tx = self.pool.begin().await?;
        trace_tx!("begin", "update", list.name);
        let item = mutator::update(&mut tx, &self.registry, list, id, &data).await?;
        tx.commit().await?;
        trace_tx!("commit", "update", list.name);

        Ok(item)
    }

    /// Delete an item, detaching every item related to it
    ///
    /// Returns the number of deleted items (0 or 1).
    pub async fn delete(&self, list: &str, id: &str) -> Result<u64> {
        let list = self.registry.list(list)?;

        let mut tx = self.pool.begin().await?;
        trace_tx!("begin", "delete", list.name);
        let deleted = mutator::delete(&mut tx, &self.registry, list, id).await?;
        tx.commit().await?;
        trace_tx!("commit", "delete", list.name);

        Ok(deleted)
    }

    /// Query a list with a JSON filter tree
    ///
    /// `filter` is `null` or an object of filter keys, combinable with `AND`
    /// and `OR` arrays. With `meta.meta` set a count is returned instead of
    /// items.
    pub async fn query(
        &self,
        list: &str,
        filter: &Value,
        args: QueryArgs,
        meta: QueryMeta,
    ) -> Result<QueryResult> {
        let list = self.registry.list(list)?;
        let filter = filter::parse(&self.registry, list, filter)?;
        self.run(list.name.as_str(), &filter, &args, &meta).await
    }

    async fn run(
        &self,
        list: &str,
        filter: &Filter,
        args: &QueryArgs,
        meta: &QueryMeta,
    ) -> Result<QueryResult> {
        let list = self.registry.list(list)?;
        let mut conn = self.pool.acquire().await?;
        run_query(&mut conn, &self.registry, list, filter, args, meta).await
    }

    /// Items matching `filter`
    pub async fn find(&self, list: &str, filter: &Value, args: QueryArgs) -> Result<Vec<Item>> {
        Ok(self
            .query(list, filter, args, QueryMeta::default())
            .await?
            .into_items())
    }

    /// Number of items matching `filter`
    pub async fn count(&self, list: &str, filter: &Value) -> Result<i64> {
        Ok(self
            .query(list, filter, QueryArgs::new(), QueryMeta::count())
            .await?
            .count())
    }

    /// Get an item by id
    pub async fn find_by_id(&self, list: &str, id: &str) -> Result<Option<Item>> {
        let list = self.registry.list(list)?;
        let mut conn = self.pool.acquire().await?;
        mutator::find_by_id(&mut conn, &self.registry, list, id).await
    }

    /// Items that `field` of item `id` in `list` points at
    pub async fn related(
        &self,
        list: &str,
        id: &str,
        field: &str,
        args: QueryArgs,
    ) -> Result<Vec<Item>> {
        let source = self.registry.list(list)?;
        let (_, _, target) = self.registry.relationship_field(source, field)?;
        let meta = QueryMeta::default().from(list, field, id);

        Ok(self
            .run(target.name.as_str(), &Filter::all(), &args, &meta)
            .await?
            .into_items())
    }
}
