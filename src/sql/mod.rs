//! SQL utilities for the relational store
//!
//! Provides query compilation, DDL generation, condition predicates and
//! identifier sanitization.

pub mod compiler;
pub mod condition;
pub mod ddl;
pub mod sanitize;

pub use compiler::{CompiledQuery, QueryCompiler};
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, qualified, quote_identifier, validate_identifier};
