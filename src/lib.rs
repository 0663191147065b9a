//! # songplay-etl
//!
//! Batch ETL from S3 into Redshift. Event logs and song metadata are
//! bulk-loaded unmodified into two staging tables, then transformed inside
//! the warehouse into a star schema:
//!
//! | Table          | Role      | Source                          |
//! |----------------|-----------|---------------------------------|
//! | `stagingEvents`| staging   | `COPY` from the event log prefix |
//! | `stagingSongs` | staging   | `COPY` from the song data prefix |
//! | `factSongPlay` | fact      | events joined to songs          |
//! | `dimUsers`     | dimension | events                          |
//! | `dimSongs`     | dimension | songs                           |
//! | `dimArtists`   | dimension | songs                           |
//! | `dimTime`      | dimension | events                          |
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use songplay_etl::prelude::*;
//!
//! let config = EtlConfig::load(None)?;
//! let catalog = QueryCatalog::new(&config)?;
//! let summary = Pipeline::connect(&config.cluster).await?.run(&catalog).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;

pub mod prelude {
    pub use crate::catalog::{QueryCatalog, Statement, StatementKind, Table, TableRole};
    pub use crate::config::{ClusterConfig, EtlConfig, IamRoleConfig, S3Config};
    pub use crate::engine::{RedshiftWarehouse, Warehouse};
    pub use crate::error::*;
    pub use crate::pipeline::{
        Pipeline, PipelineState, RunSummary, StatementOutcome, load_staging, populate_warehouse,
        reset_schema,
    };
}

/// Load the config, connect, load staging, populate the warehouse, disconnect.
///
/// # Example
///
/// ```rust,ignore
/// let summary = songplay_etl::run(None).await?;
/// println!("{} statements", summary.outcomes.len());
/// ```
pub async fn run(config_path: Option<&std::path::Path>) -> error::EtlResult<pipeline::RunSummary> {
    let config = config::EtlConfig::load(config_path)?;
    let catalog = catalog::QueryCatalog::new(&config)?;
    pipeline::Pipeline::connect(&config.cluster)
        .await?
        .run(&catalog)
        .await
}
