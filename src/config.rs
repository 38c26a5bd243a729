//! Configuration for RelationalStore
//!
//! Provides a builder pattern for configuring the store.

use std::str::FromStr;

use sqlx::postgres::PgConnectOptions;

/// Configuration for the relational store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Maximum number of pooled connections (default: 10)
    pub max_connections: u32,
    /// Drop and recreate every list table on connect, then wire relationships (default: false)
    pub drop_database: bool,
    /// Wire relationships right after connecting (default: false)
    ///
    /// Wiring recreates junction tables, so existing N:N rows are lost.
    pub wire_on_connect: bool,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// Name of the database `database_url` connects to, if one can be parsed out of it
    pub fn database_name(&self) -> Option<String> {
        let options = PgConnectOptions::from_str(&self.database_url).ok()?;
        options.get_database().map(str::to_string)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    max_connections: u32,
    drop_database: bool,
    wire_on_connect: bool,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            drop_database: false,
            wire_on_connect: false,
        }
    }

    /// Set the maximum pool size (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Drop and recreate list tables on connect (default: false)
    pub fn drop_database(mut self, enabled: bool) -> Self {
        self.drop_database = enabled;
        self
    }

    /// Enable or disable relationship wiring on connect (default: false)
    pub fn wire_on_connect(mut self, enabled: bool) -> Self {
        self.wire_on_connect = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            max_connections: self.max_connections,
            drop_database: self.drop_database,
            wire_on_connect: self.wire_on_connect,
        }
    }
}
