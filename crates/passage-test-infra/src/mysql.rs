use crate::{Result, TestInfraError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use tracing::debug;
use typed_builder::TypedBuilder;

const MYSQL_PORT: u16 = 3306;

/// How the code-record database is provisioned and reached.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "passage".to_string())]
    database: String,
    #[builder(default = "passage".to_string())]
    username: String,
    #[builder(default = "passage".to_string())]
    password: String,
    #[builder(default = 5)]
    max_connections: u32,
    /// The server logs "ready" before the user database exists, so the first
    /// connections can be refused.
    #[builder(default = 20)]
    connect_attempts: u32,
    #[builder(default = Duration::from_millis(500))]
    retry_delay: Duration,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A throwaway MySQL server plus a pool connected to its database.
///
/// Dropping the value stops the container.
pub struct MySqlServer {
    _container: ContainerAsync<GenericImage>,
    pool: MySqlPool,
}

impl MySqlServer {
    /// Starts the container and waits until the database accepts a pool.
    pub async fn start(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", "8.4")
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(MYSQL_PORT).await?;
        let url = format!(
            "mysql://{}:{}@{}:{}/{}",
            config.username, config.password, host, port, config.database
        );
        let pool = connect_with_retry(&url, &config).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    /// A pool on the configured database. Clones share connections.
    pub fn pool(&self) -> MySqlPool {
        self.pool.clone()
    }
}

async fn connect_with_retry(url: &str, config: &MysqlConfig) -> Result<MySqlPool> {
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 1;

    loop {
        match MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(source) if attempt >= attempts => {
                return Err(TestInfraError::MySqlNotReady { attempts, source });
            }
            Err(err) => {
                debug!(attempt, error = %err, "mysql not ready yet");
                attempt += 1;
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}
