//! 版本化迁移管理
//!
//! 迁移按版本号升序应用，每条迁移在单独的事务里执行并记录校验和。
//! 已应用版本的校验和不匹配视为错误。

use kit_errors::{AppError, AppResult};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info};

/// 迁移记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub checksum: String,
}

/// 迁移定义
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        let checksum = Self::calculate_checksum(&up_sql);
        Self {
            version,
            name: name.into(),
            up_sql,
            checksum,
        }
    }

    // 校验和会落库并在 run 时比对，必须是跨版本稳定的摘要
    fn calculate_checksum(sql: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// 迁移管理器
pub struct MigrationManager {
    pool: PgPool,
    table_name: String,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_name: "_migrations".to_string(),
        }
    }

    /// 设置迁移表名
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    async fn ensure_table(&self) -> AppResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                checksum TEXT NOT NULL
            )",
            self.table_name
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to create migration table: {}", e)))?;
        Ok(())
    }

    /// 已应用的迁移，按版本升序
    pub async fn applied(&self) -> AppResult<Vec<MigrationRecord>> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT version, name, applied_at, checksum FROM {} ORDER BY version",
            self.table_name
        );
        sqlx::query_as::<_, MigrationRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to read migration records: {}", e)))
    }

    /// 应用所有未执行的迁移
    pub async fn run(&self, migrations: &[Migration]) -> AppResult<usize> {
        self.ensure_table().await?;
        let applied = self.applied().await?;

        let mut pending: Vec<&Migration> = Vec::new();
        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by_key(|m| m.version);
        for migration in ordered {
            match applied.iter().find(|r| r.version == migration.version) {
                Some(record) => {
                    if record.checksum != migration.checksum {
                        return Err(AppError::database(format!(
                            "Checksum mismatch for migration {} ({})",
                            migration.version, migration.name
                        )));
                    }
                    debug!(version = migration.version, "migration already applied");
                }
                None => pending.push(migration),
            }
        }

        for migration in &pending {
            self.apply(migration).await?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "applied pending migrations");
        }
        Ok(pending.len())
    }

    async fn apply(&self, migration: &Migration) -> AppResult<()> {
        debug!(
            version = migration.version,
            name = %migration.name,
            "applying migration"
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::raw_sql(&migration.up_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!(
                    "Migration {} failed: {}",
                    migration.version, e
                ))
            })?;

        let insert = format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            self.table_name
        );
        sqlx::query(&insert)
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to record migration: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit migration: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        let a = Migration::new(1, "init", "CREATE TABLE t (id BIGINT)");
        let b = Migration::new(1, "init", "CREATE TABLE t (id BIGINT)");
        assert_eq!(a.checksum, b.checksum);
    }

    // 已落库的校验和要能被未来的二进制重算出来，钉死算法
    #[test]
    fn test_checksum_is_sha256_hex() {
        let m = Migration::new(1, "init", "CREATE TABLE widgets (id BIGINT PRIMARY KEY)");
        assert_eq!(
            m.checksum,
            "1a10eeee74e3ebf7e3edc41ccdc42c6170afc2dcfda7285b05c2277276485b4a"
        );
    }

    #[test]
    fn test_checksum_tracks_sql_changes() {
        let a = Migration::new(1, "init", "CREATE TABLE t (id BIGINT)");
        let b = Migration::new(1, "init", "CREATE TABLE t (id TEXT)");
        assert_ne!(a.checksum, b.checksum);
    }
}
