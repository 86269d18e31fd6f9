//! Database layer for MoYun

mod cache_repository;
mod connection;
mod migrations;
mod queue_repository;

pub use cache_repository::{CacheRepository, LibSqlCacheRepository};
pub use connection::Database;
pub use queue_repository::{LibSqlPendingChangeRepository, PendingChangeRepository};
