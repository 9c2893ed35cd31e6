use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Operation not supported by store: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Whether the error means the backing store could not be reached at all,
    /// as opposed to rejecting a specific statement.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// SQLSTATE raised when an `ON CONFLICT` target has no matching unique constraint.
#[cfg(feature = "database")]
const NO_MATCHING_CONFLICT_CONSTRAINT: &str = "42P10";

#[cfg(feature = "database")]
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(NO_MATCHING_CONFLICT_CONSTRAINT) =>
            {
                CoreError::Unsupported(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => CoreError::Unavailable(err.to_string()),
            _ => CoreError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
