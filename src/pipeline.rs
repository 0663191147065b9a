//! Pipeline driver.
//!
//! Runs the catalog against one warehouse session: bulk-load the staging
//! tables, then transform staging into the star schema. Statements run in
//! catalog order and commit individually. The first failure aborts the
//! phase; committed statements stay committed.

use std::fmt;
use std::time::{Duration, Instant};

use crate::catalog::{QueryCatalog, Statement, StatementKind, Table};
use crate::config::ClusterConfig;
use crate::engine::{RedshiftWarehouse, Warehouse};
use crate::error::{EtlError, EtlResult};

/// Pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Disconnected,
    Connected,
    StagingLoaded,
    WarehousePopulated,
    /// Terminal. A rerun starts over from a fresh connection.
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Disconnected => "Disconnected",
            PipelineState::Connected => "Connected",
            PipelineState::StagingLoaded => "StagingLoaded",
            PipelineState::WarehousePopulated => "WarehousePopulated",
            PipelineState::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementOutcome {
    pub kind: StatementKind,
    pub table: Table,
    pub rows_affected: u64,
    pub elapsed: Duration,
}

/// Everything executed during a run, in order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<StatementOutcome>,
    /// State the pipeline ended in once the connection was released.
    pub final_state: PipelineState,
}

impl RunSummary {
    pub fn elapsed(&self) -> Duration {
        self.outcomes.iter().map(|o| o.elapsed).sum()
    }

    /// Rows affected by statements of the given kind.
    pub fn rows(&self, kind: StatementKind) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.rows_affected)
            .sum()
    }
}

fn statement_error(stmt: &Statement, err: sqlx::Error) -> EtlError {
    let table = stmt.table.name();
    match stmt.kind {
        StatementKind::Drop | StatementKind::Create => EtlError::setup(table, err),
        StatementKind::Copy => EtlError::load(table, err),
        StatementKind::Insert => EtlError::insert(table, err),
    }
}

async fn run_sequence<W: Warehouse>(
    warehouse: &mut W,
    statements: &[Statement],
) -> EtlResult<Vec<StatementOutcome>> {
    let mut outcomes = Vec::with_capacity(statements.len());

    for stmt in statements {
        tracing::debug!("{} {}: {}", stmt.kind, stmt.table, stmt.sql);
        let start = Instant::now();

        let rows_affected = match warehouse.execute_committed(&stmt.sql).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("{} {} failed: {}", stmt.kind, stmt.table, e);
                return Err(statement_error(stmt, e));
            }
        };

        let elapsed = start.elapsed();
        tracing::info!(
            "{} {} committed ({} rows, {:.2?})",
            stmt.kind,
            stmt.table,
            rows_affected,
            elapsed
        );
        outcomes.push(StatementOutcome {
            kind: stmt.kind,
            table: stmt.table,
            rows_affected,
            elapsed,
        });
    }

    Ok(outcomes)
}

/// Drop and recreate every table.
pub async fn reset_schema<W: Warehouse>(
    warehouse: &mut W,
    catalog: &QueryCatalog,
) -> EtlResult<Vec<StatementOutcome>> {
    let mut outcomes = run_sequence(warehouse, catalog.drops()).await?;
    outcomes.extend(run_sequence(warehouse, catalog.creates()).await?);
    Ok(outcomes)
}

/// Bulk-load both staging tables from S3.
///
/// Staging tables must already exist. A failed COPY aborts the remaining
/// ones; earlier loads stay committed.
pub async fn load_staging<W: Warehouse>(
    warehouse: &mut W,
    catalog: &QueryCatalog,
) -> EtlResult<Vec<StatementOutcome>> {
    run_sequence(warehouse, catalog.copies()).await
}

/// Fill the fact and dimension tables from staging.
///
/// A failed INSERT aborts the remaining ones; downstream tables may be
/// partially populated.
pub async fn populate_warehouse<W: Warehouse>(
    warehouse: &mut W,
    catalog: &QueryCatalog,
) -> EtlResult<Vec<StatementOutcome>> {
    run_sequence(warehouse, catalog.inserts()).await
}

/// A connected pipeline run.
pub struct Pipeline<W: Warehouse> {
    warehouse: W,
    state: PipelineState,
    reset_schema: bool,
    summary: RunSummary,
}

impl Pipeline<RedshiftWarehouse> {
    /// Open the single warehouse connection for this run.
    pub async fn connect(cluster: &ClusterConfig) -> EtlResult<Self> {
        let warehouse = RedshiftWarehouse::connect(cluster).await?;
        Ok(Self::new(warehouse))
    }
}

impl<W: Warehouse> Pipeline<W> {
    /// Wrap an already connected warehouse session.
    pub fn new(warehouse: W) -> Self {
        tracing::debug!("Pipeline state: {}", PipelineState::Connected);
        Self {
            warehouse,
            state: PipelineState::Connected,
            reset_schema: false,
            summary: RunSummary::default(),
        }
    }

    /// Drop and recreate all tables at the start of [`Pipeline::run`].
    pub fn with_schema_reset(mut self, enabled: bool) -> Self {
        self.reset_schema = enabled;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn require(&self, expected: PipelineState) -> EtlResult<()> {
        if self.state != expected {
            return Err(EtlError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn advance(
        &mut self,
        result: EtlResult<Vec<StatementOutcome>>,
        next: PipelineState,
    ) -> EtlResult<()> {
        match result {
            Ok(outcomes) => {
                self.summary.outcomes.extend(outcomes);
                tracing::debug!("Pipeline state: {} -> {}", self.state, next);
                self.state = next;
                Ok(())
            }
            Err(e) => {
                tracing::debug!("Pipeline state: {} -> {}", self.state, PipelineState::Failed);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    /// Drop and recreate every table. Only valid before loading.
    pub async fn reset_schema(&mut self, catalog: &QueryCatalog) -> EtlResult<()> {
        self.require(PipelineState::Connected)?;
        tracing::info!("Resetting schema ({} tables)", catalog.creates().len());
        let result = reset_schema(&mut self.warehouse, catalog).await;
        self.advance(result, PipelineState::Connected)
    }

    /// Connected -> StagingLoaded.
    pub async fn load_staging(&mut self, catalog: &QueryCatalog) -> EtlResult<()> {
        self.require(PipelineState::Connected)?;
        tracing::info!("Loading {} staging tables", catalog.copies().len());
        let result = load_staging(&mut self.warehouse, catalog).await;
        self.advance(result, PipelineState::StagingLoaded)
    }

    /// StagingLoaded -> WarehousePopulated.
    pub async fn populate_warehouse(&mut self, catalog: &QueryCatalog) -> EtlResult<()> {
        self.require(PipelineState::StagingLoaded)?;
        tracing::info!("Populating {} warehouse tables", catalog.inserts().len());
        let result = populate_warehouse(&mut self.warehouse, catalog).await;
        self.advance(result, PipelineState::WarehousePopulated)
    }

    /// Release the connection, whatever state the pipeline is in.
    pub async fn close(mut self) -> EtlResult<RunSummary> {
        tracing::debug!("Pipeline state: {} -> {}", self.state, PipelineState::Disconnected);
        self.state = PipelineState::Disconnected;
        self.warehouse
            .close()
            .await
            .map_err(|e| EtlError::Connection(e.to_string()))?;
        self.summary.final_state = self.state;
        Ok(self.summary)
    }

    async fn run_phases(&mut self, catalog: &QueryCatalog) -> EtlResult<()> {
        if self.reset_schema {
            self.reset_schema(catalog).await?;
        }
        self.load_staging(catalog).await?;
        self.populate_warehouse(catalog).await
    }

    /// Load staging, populate the warehouse, then disconnect.
    ///
    /// The connection is closed on every exit path. When a phase fails its
    /// error is returned even if closing fails too.
    pub async fn run(mut self, catalog: &QueryCatalog) -> EtlResult<RunSummary> {
        let outcome = self.run_phases(catalog).await;
        let closed = self.close().await;

        match (outcome, closed) {
            (Ok(()), closed) => closed,
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::warn!("Closing the connection after failure also failed: {}", close_err);
                Err(e)
            }
        }
    }
}
