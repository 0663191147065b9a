//! Error types for the pipeline.

use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum EtlError {
    /// A required setting is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The warehouse could not be reached or refused the credentials.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bulk-load statement into a staging table failed.
    #[error("Load error on {table}: {message}")]
    Load { table: &'static str, message: String },

    /// A transform statement into a final table failed.
    #[error("Insert error on {table}: {message}")]
    Insert { table: &'static str, message: String },

    /// A drop or create statement failed.
    #[error("Setup error on {table}: {message}")]
    Setup { table: &'static str, message: String },

    /// A driver phase was called out of order.
    #[error("Invalid pipeline state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Create a load error for the given staging table.
    pub fn load(table: &'static str, err: impl ToString) -> Self {
        Self::Load {
            table,
            message: err.to_string(),
        }
    }

    /// Create an insert error for the given final table.
    pub fn insert(table: &'static str, err: impl ToString) -> Self {
        Self::Insert {
            table,
            message: err.to_string(),
        }
    }

    /// Create a setup error for the given table.
    pub fn setup(table: &'static str, err: impl ToString) -> Self {
        Self::Setup {
            table,
            message: err.to_string(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Connection(_) => 3,
            Self::Load { .. } => 4,
            Self::Insert { .. } => 5,
            Self::Setup { .. } => 6,
            Self::InvalidState { .. } | Self::Io(_) => 1,
        }
    }
}

impl From<toml::de::Error> for EtlError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type EtlResult<T> = Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EtlError::load("stagingEvents", "S3ServiceException: Access Denied");
        assert_eq!(
            err.to_string(),
            "Load error on stagingEvents: S3ServiceException: Access Denied"
        );
    }

    #[test]
    fn test_exit_codes_are_non_zero_and_distinct() {
        let errors = [
            EtlError::Config("missing".into()),
            EtlError::Connection("refused".into()),
            EtlError::load("stagingSongs", "bad"),
            EtlError::insert("dimUsers", "bad"),
            EtlError::setup("dimTime", "bad"),
        ];
        let codes: Vec<i32> = errors.iter().map(EtlError::exit_code).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EtlError::InvalidState {
            expected: "StagingLoaded",
            actual: "Connected",
        };
        assert_eq!(
            err.to_string(),
            "Invalid pipeline state: expected StagingLoaded, found Connected"
        );
        assert_eq!(err.exit_code(), 1);
    }
}
