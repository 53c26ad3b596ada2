//! Pooled PostgreSQL sample store

use crate::query::{build_sample_query, safe_ident};
use crate::SampleSource;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use peg_analyzer_types::peg::{Filter, RawSample};
use peg_analyzer_types::request::ColumnMap;
use peg_analyzer_types::window::TimeWindow;
use peg_analyzer_types::{AnalyzerError, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Tuning knobs for the store, all sourced from configuration
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub pool_size: u32,
    pub connect_timeout: Duration,
    /// Maximum rows a single fetch may return
    pub fetch_limit: usize,
    /// Retries for transient errors
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            connect_timeout: Duration::from_secs(30),
            fetch_limit: 1_000_000,
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// PostgreSQL-backed PEG sample store
///
/// One instance owns one connection pool; connections are scoped to a
/// single fetch and released on every exit path by the pool guard.
pub struct PegStore {
    pool: PgPool,
    table: String,
    options: StoreOptions,
}

impl PegStore {
    /// Connect a pool and validate the target table name.
    pub async fn connect(url: &str, table: impl Into<String>, options: StoreOptions) -> Result<Self> {
        let table = table.into();
        safe_ident(&table)?;

        let pool = PgPoolOptions::new()
            .max_connections(options.pool_size)
            .acquire_timeout(options.connect_timeout)
            .connect(url)
            .await
            .map_err(|e| AnalyzerError::StoreFailure {
                cause: format!("failed to create pool: {e}"),
            })?;

        info!(table = %table, pool_size = options.pool_size, "Connected PEG store");
        Ok(Self { pool, table, options })
    }

    /// Wrap an existing pool; used by integration tests.
    pub fn with_pool(pool: PgPool, table: impl Into<String>, options: StoreOptions) -> Self {
        Self {
            pool,
            table: table.into(),
            options,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AnalyzerError::StoreFailure {
                cause: format!("health check failed: {e}"),
            })?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode_row(row: &PgRow, columns: &ColumnMap) -> Result<RawSample> {
        let store_err = |e: sqlx::Error| AnalyzerError::StoreFailure {
            cause: format!("row decode failed: {e}"),
        };

        let timestamp: NaiveDateTime = row.try_get("ts").map_err(store_err)?;
        let peg_name: String = row.try_get("peg_name").map_err(store_err)?;
        let value: f64 = row.try_get("value").map_err(store_err)?;
        let ne_key = match &columns.ne {
            Some(_) => row.try_get::<Option<String>, _>("ne_key").map_err(store_err)?,
            None => None,
        };
        let host_name = match &columns.host {
            Some(_) => row
                .try_get::<Option<String>, _>("host_name")
                .map_err(store_err)?,
            None => None,
        };
        let index_name = match &columns.index_name {
            Some(_) => row
                .try_get::<Option<String>, _>("index_name")
                .map_err(store_err)?,
            None => None,
        };

        Ok(RawSample {
            timestamp,
            peg_name,
            value,
            ne_key,
            host_name,
            index_name,
        })
    }
}

/// Transient errors worth a retry: the pool timed out or the wire dropped.
fn is_transient(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
}

#[async_trait]
impl SampleSource for PegStore {
    async fn fetch(
        &self,
        window: &TimeWindow,
        filter: &Filter,
        columns: &ColumnMap,
    ) -> Result<Vec<RawSample>> {
        let limit = self.options.fetch_limit;
        let mut attempt = 0u32;

        let rows = loop {
            // limit + 1 so an overflow is distinguishable from an exact fit
            let mut builder =
                build_sample_query(&self.table, columns, window, filter, (limit + 1) as i64)?;

            match builder.build().fetch_all(&self.pool).await {
                Ok(rows) => break rows,
                Err(e) if is_transient(&e) && attempt < self.options.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Transient store error, retrying");
                    sleep(self.options.retry_delay).await;
                }
                Err(e) => {
                    return Err(AnalyzerError::StoreFailure {
                        cause: format!("query execution failed: {e}"),
                    })
                }
            }
        };

        if rows.len() > limit {
            return Err(AnalyzerError::StoreResultTooLarge { limit });
        }

        debug!(rows = rows.len(), window = %window, "Fetched PEG samples");
        rows.iter().map(|row| Self::decode_row(row, columns)).collect()
    }
}
