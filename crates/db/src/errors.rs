use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("duplicate {0} key {1}")]
    Duplicate(&'static str, String),

    #[error("missing {0} row {1}")]
    MissingRow(&'static str, String),

    #[error("{0}")]
    Other(String),
}

/// Simple result type used across the database interface.
pub type DbResult<T> = Result<T, DbError>;
