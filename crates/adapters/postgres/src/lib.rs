//! kit-adapter-postgres - PostgreSQL 适配器
//!
//! 连接池管理与版本化迁移，SQL 执行委托给 sqlx

mod config;
mod connection;
mod migration;

pub use config::PostgresConfig;
pub use connection::{check_connection, create_pool};
pub use migration::{Migration, MigrationManager, MigrationRecord};
