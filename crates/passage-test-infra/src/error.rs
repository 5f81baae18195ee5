use std::result::Result as StdResult;
use thiserror::Error;

/// Errors raised while bringing up a disposable backing service.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("Container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("MySQL did not accept connections after {attempts} attempts: {source}")]
    MySqlNotReady {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

pub type Result<T> = StdResult<T, TestInfraError>;
