use clap::{Parser, Subcommand, ValueEnum};
use passage_telemetry::LogFormat;
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "PASSAGE_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "PASSAGE_MYSQL_DSN";
pub const REDIS_URL_ENV: &str = "PASSAGE_REDIS_URL";
pub const REDIS_PREFIX_ENV: &str = "PASSAGE_REDIS_PREFIX";
pub const USER_ENV: &str = "PASSAGE_USER";
pub const MAX_ATTEMPTS_ENV: &str = "PASSAGE_MAX_ATTEMPTS";
pub const MAX_BATCH_SIZE_ENV: &str = "PASSAGE_MAX_BATCH_SIZE";
pub const LOG_FORMAT_ENV: &str = "PASSAGE_LOG_FORMAT";

pub const DEFAULT_REDIS_PREFIX: &str = "passage:code:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
    #[value(name = "redis")]
    Redis,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
            StorageBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "passage", about = "Issue and redeem invitation codes")]
pub struct CLI {
    #[arg(
        long,
        global = true,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, global = true, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, global = true, env = REDIS_URL_ENV, required_if_eq("storage", "redis"))]
    pub redis_url: Option<String>,

    #[arg(long, global = true, env = REDIS_PREFIX_ENV, default_value = DEFAULT_REDIS_PREFIX)]
    pub redis_prefix: String,

    /// Acting user: the generator of issued codes, or the redeemer.
    #[arg(long, global = true, env = USER_ENV)]
    pub user: Option<String>,

    #[arg(
        long,
        global = true,
        env = MAX_ATTEMPTS_ENV,
        default_value_t = passage_issuer::settings::DEFAULT_MAX_ATTEMPTS
    )]
    pub max_attempts: u32,

    #[arg(long, global = true, env = MAX_BATCH_SIZE_ENV)]
    pub max_batch_size: Option<usize>,

    #[arg(
        long,
        global = true,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Issue a batch of single-use codes.
    Issue {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Issue one multi-use code for a reward tier.
    IssueMulti {
        #[arg(long)]
        reward: String,
    },
    /// Redeem a single-use code as `--user`.
    Redeem { code: String },
}
