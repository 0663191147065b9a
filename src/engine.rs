//! Warehouse execution engine.
//!
//! One live connection, statements issued one at a time, each committed
//! before the next one starts. Redshift speaks the PostgreSQL wire
//! protocol, so the connection is a plain sqlx `PgConnection`.

use std::future::Future;

use sqlx::{Connection, Executor, PgConnection};

use crate::config::ClusterConfig;
use crate::error::{EtlError, EtlResult};

/// A warehouse session the pipeline can drive.
pub trait Warehouse: Send {
    /// Execute one statement and commit it. Returns the affected row count.
    fn execute_committed(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    /// Close the session.
    fn close(self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// A single connection to a Redshift cluster.
pub struct RedshiftWarehouse {
    conn: PgConnection,
}

impl RedshiftWarehouse {
    /// Connect using the cluster settings.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = EtlConfig::load(None)?;
    /// let warehouse = RedshiftWarehouse::connect(&config.cluster).await?;
    /// ```
    pub async fn connect(cluster: &ClusterConfig) -> EtlResult<Self> {
        tracing::info!("Connecting to {}", cluster.redacted_connection_string());

        let conn = PgConnection::connect_with(&cluster.connect_options())
            .await
            .map_err(|e| EtlError::Connection(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl Warehouse for RedshiftWarehouse {
    async fn execute_committed(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        // Dropping an uncommitted transaction rolls it back.
        let mut tx = self.conn.begin().await?;
        let done = (&mut *tx).execute(sql).await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }
}
