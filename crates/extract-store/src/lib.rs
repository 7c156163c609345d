//! Intermediate store (spec §2.6, §3 "Intermediate store layout"): the
//! per-run, disk-backed `(id, data)` / `(id, parent_id, data)` tables each
//! module writes into during its pull phase and the run manager reads back
//! during the join at output time.
//!
//! Unlike the teacher's fixed-schema, migration-managed tables, these
//! tables are created fresh per run under a shop-derived prefix and
//! unconditionally dropped at the end of the run (or kept, under
//! `Settings.debug`) — there is no static migration set for them.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use extract_core::{AppConfig, ConfigError};

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("duplicate key {id} in {table}")]
    DuplicateKey { table: String, id: i64 },
    #[error("invalid module or table identifier: {0}")]
    InvalidIdentifier(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` and pool settings from env.
///
/// # Errors
///
/// Returns [`StoreError::Config`] if configuration is missing/invalid, or
/// [`StoreError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, StoreError> {
    let app_config = extract_core::load_app_config_from_env()?;
    let pool_config = PoolConfig::from_app_config(&app_config);
    connect_pool(&app_config.database_url, pool_config)
        .await
        .map_err(StoreError::from)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Policy applied when a `(module, id)` row is inserted twice (spec §2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// Fail the insert with [`StoreError::DuplicateKey`].
    Throw,
    /// Overwrite the existing row's `data`.
    Update,
    /// Silently keep the existing row.
    Ignore,
}

fn validate_identifier(raw: &str) -> Result<(), StoreError> {
    let ok = !raw.is_empty()
        && raw.len() <= 48
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && raw.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(raw.to_string()))
    }
}

/// A run's intermediate store: per-module `*_prod`/`*_vars` tables under a
/// shared shop-derived prefix, guaranteed to be dropped on every exit path
/// the caller routes through [`IntermediateStore::drop_all`] (the run
/// manager is responsible for calling it from a `finally`-style guard,
/// since Rust has no async `Drop`).
pub struct IntermediateStore {
    pool: PgPool,
    table_prefix: String,
    created_tables: Mutex<Vec<String>>,
}

impl IntermediateStore {
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] if `table_prefix` is not a
    /// safe SQL identifier fragment (it is interpolated into `CREATE TABLE`
    /// statements — Postgres has no bind-parameter form for identifiers).
    pub fn new(pool: PgPool, table_prefix: &str) -> Result<Self, StoreError> {
        validate_identifier(table_prefix)?;
        Ok(Self {
            pool,
            table_prefix: table_prefix.to_string(),
            created_tables: Mutex::new(Vec::new()),
        })
    }

    fn prod_table(&self, module: &str) -> Result<String, StoreError> {
        validate_identifier(module)?;
        Ok(format!("{}_{}_prod", self.table_prefix, module))
    }

    fn vars_table(&self, module: &str) -> Result<String, StoreError> {
        validate_identifier(module)?;
        Ok(format!("{}_{}_vars", self.table_prefix, module))
    }

    /// Creates `<prefix>_<module>_prod(id BIGINT PRIMARY KEY, data JSONB)`
    /// and `<prefix>_<module>_vars(id BIGINT, parent_id BIGINT, data JSONB)`
    /// with a secondary index on `parent_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a DDL failure.
    pub async fn create_module_tables(&self, module: &str) -> Result<(), StoreError> {
        let prod = self.prod_table(module)?;
        let vars = self.vars_table(module)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {prod} (id BIGINT PRIMARY KEY, data JSONB NOT NULL)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {vars} (id BIGINT PRIMARY KEY, parent_id BIGINT NOT NULL, data JSONB NOT NULL)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {vars}_parent_idx ON {vars} (parent_id)"
        ))
        .execute(&self.pool)
        .await?;

        let mut created = self.created_tables.lock().unwrap();
        created.push(prod);
        created.push(vars);
        Ok(())
    }

    /// Inserts or updates one row in `<module>_prod`.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] under [`DuplicateKeyPolicy::Throw`] when
    /// `id` already exists; [`StoreError::Sqlx`] on other DB failures.
    pub async fn insert_prod(
        &self,
        module: &str,
        id: i64,
        data: &Value,
        policy: DuplicateKeyPolicy,
    ) -> Result<(), StoreError> {
        let table = self.prod_table(module)?;
        self.upsert(&table, id, None, data, policy).await
    }

    /// Inserts or updates one row in `<module>_vars`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert_prod`].
    pub async fn insert_vars(
        &self,
        module: &str,
        id: i64,
        parent_id: i64,
        data: &Value,
        policy: DuplicateKeyPolicy,
    ) -> Result<(), StoreError> {
        let table = self.vars_table(module)?;
        self.upsert(&table, id, Some(parent_id), data, policy).await
    }

    async fn upsert(
        &self,
        table: &str,
        id: i64,
        parent_id: Option<i64>,
        data: &Value,
        policy: DuplicateKeyPolicy,
    ) -> Result<(), StoreError> {
        match policy {
            DuplicateKeyPolicy::Throw => {
                let result = if let Some(parent_id) = parent_id {
                    sqlx::query(&format!(
                        "INSERT INTO {table} (id, parent_id, data) VALUES ($1, $2, $3)"
                    ))
                    .bind(id)
                    .bind(parent_id)
                    .bind(data)
                    .execute(&self.pool)
                    .await
                } else {
                    sqlx::query(&format!("INSERT INTO {table} (id, data) VALUES ($1, $2)"))
                        .bind(id)
                        .bind(data)
                        .execute(&self.pool)
                        .await
                };
                match result {
                    Ok(_) => Ok(()),
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                        Err(StoreError::DuplicateKey {
                            table: table.to_string(),
                            id,
                        })
                    }
                    Err(e) => Err(StoreError::Sqlx(e)),
                }
            }
            DuplicateKeyPolicy::Update => {
                let stmt = if parent_id.is_some() {
                    format!(
                        "INSERT INTO {table} (id, parent_id, data) VALUES ($1, $2, $3) \
                         ON CONFLICT (id) DO UPDATE SET parent_id = EXCLUDED.parent_id, data = EXCLUDED.data"
                    )
                } else {
                    format!(
                        "INSERT INTO {table} (id, data) VALUES ($1, $2) \
                         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data"
                    )
                };
                let query = sqlx::query(&stmt).bind(id);
                let query = if let Some(parent_id) = parent_id {
                    query.bind(parent_id).bind(data)
                } else {
                    query.bind(data)
                };
                query.execute(&self.pool).await?;
                Ok(())
            }
            DuplicateKeyPolicy::Ignore => {
                let stmt = if parent_id.is_some() {
                    format!(
                        "INSERT INTO {table} (id, parent_id, data) VALUES ($1, $2, $3) \
                         ON CONFLICT (id) DO NOTHING"
                    )
                } else {
                    format!("INSERT INTO {table} (id, data) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                };
                let query = sqlx::query(&stmt).bind(id);
                let query = if let Some(parent_id) = parent_id {
                    query.bind(parent_id).bind(data)
                } else {
                    query.bind(data)
                };
                query.execute(&self.pool).await?;
                Ok(())
            }
        }
    }

    /// Looks up one `<module>_prod` row by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a query failure.
    pub async fn query_prod(&self, module: &str, id: i64) -> Result<Option<Value>, StoreError> {
        let table = self.prod_table(module)?;
        let row: Option<(Value,)> = sqlx::query_as(&format!("SELECT data FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Looks up all `<module>_vars` rows under `parent_id`, ascending by id
    /// (spec §5 ordering guarantee: variants under a product in ascending
    /// variant-id order).
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a query failure.
    pub async fn query_vars_by_parent(
        &self,
        module: &str,
        parent_id: i64,
    ) -> Result<Vec<(i64, Value)>, StoreError> {
        let table = self.vars_table(module)?;
        let rows: Vec<(i64, Value)> = sqlx::query_as(&format!(
            "SELECT id, data FROM {table} WHERE parent_id = $1 ORDER BY id ASC"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Iterates all `<module>_prod` ids in ascending order (drives the
    /// primary module's `get_products` walk).
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a query failure.
    pub async fn all_prod_ids(&self, module: &str) -> Result<Vec<i64>, StoreError> {
        let table = self.prod_table(module)?;
        let rows: Vec<(i64,)> = sqlx::query_as(&format!("SELECT id FROM {table} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Returns every `<module>_prod` row, ascending by id. Used by the run
    /// manager's pre-output column-discovery scan (new metafield/translation
    /// keys can appear anywhere in the table, not just on known products).
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a query failure.
    pub async fn all_prod_rows(&self, module: &str) -> Result<Vec<(i64, Value)>, StoreError> {
        let table = self.prod_table(module)?;
        let rows: Vec<(i64, Value)> = sqlx::query_as(&format!("SELECT id, data FROM {table} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Returns every `<module>_vars` row, ascending by id, as `(id, parent_id, data)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] on a query failure.
    pub async fn all_vars_rows(&self, module: &str) -> Result<Vec<(i64, i64, Value)>, StoreError> {
        let table = self.vars_table(module)?;
        let rows: Vec<(i64, i64, Value)> = sqlx::query_as(&format!(
            "SELECT id, parent_id, data FROM {table} ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Drops every table this instance has created. Guaranteed to be called
    /// on every exit path by the run manager unless `Settings.debug` keeps
    /// tables for post-mortem inspection.
    ///
    /// # Errors
    ///
    /// [`StoreError::Sqlx`] if any `DROP TABLE` fails; tables already
    /// dropped are skipped, not retried.
    pub async fn drop_all(&self) -> Result<(), StoreError> {
        let tables = { self.created_tables.lock().unwrap().clone() };
        for table in tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await?;
        }
        self.created_tables.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    fn validate_identifier_accepts_safe_names() {
        assert!(validate_identifier("products").is_ok());
        assert!(validate_identifier("acme123_run").is_ok());
        assert!(validate_identifier("_leading_underscore").is_ok());
    }

    #[test]
    fn validate_identifier_rejects_unsafe_names() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("products; DROP TABLE x;--").is_err());
        assert!(validate_identifier("1leading_digit").is_err());
        assert!(validate_identifier(&"a".repeat(100)).is_err());
    }
}
