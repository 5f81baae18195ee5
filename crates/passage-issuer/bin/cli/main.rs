mod cli;

use crate::cli::{Command, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use passage_core::{CodeIssuer, CodeRedeemer, IssueError, RecordStore, RedeemError, UserId};
use passage_generator::RandomGenerator;
use passage_issuer::{BatchIssuer, IssuerSettings, RedemptionCoordinator};
use passage_storage::{InMemoryRecordStore, MySqlRecordStore, RedisRecordStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    passage_telemetry::init(config.log_format.into())?;

    info!(
        storage_backend = %config.storage,
        max_attempts = config.max_attempts,
        "starting passage"
    );

    match config.storage {
        StorageBackendArg::InMemory => run(InMemoryRecordStore::new(), &config).await,
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlRecordStore::connect(mysql_dsn).await?;
            store.ensure_schema().await?;
            run(store, &config).await
        }
        StorageBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("redis url is required when storage backend is redis")?;
            let store =
                RedisRecordStore::connect_with_prefix(redis_url, &config.redis_prefix).await?;
            run(store, &config).await
        }
    }
}

async fn run<S: RecordStore>(store: S, config: &CLI) -> anyhow::Result<()> {
    let user = config.user.as_deref().map(UserId::new).transpose()?;
    let store = Arc::new(store);

    match &config.command {
        Command::Issue { count } => {
            let issuer = issuer(store, user, config);
            let codes = issuer
                .issue_batch(*count)
                .await
                .map_err(user_facing_issue)?;
            for code in codes {
                println!("{}", code.code());
            }
        }
        Command::IssueMulti { reward } => {
            let issuer = issuer(store, user, config);
            let code = issuer
                .issue_multi_use(reward)
                .await
                .map_err(user_facing_issue)?;
            println!("{} {}", code.code(), code.tiered_reward_id());
        }
        Command::Redeem { code } => {
            let user = user.context("--user is required to redeem a code")?;
            let redeemer = RedemptionCoordinator::from_shared(store);
            let redeemed = redeemer
                .redeem(code, &user)
                .await
                .map_err(user_facing_redeem)?;
            println!("{} redeemed by {}", redeemed.code(), user);
        }
    }

    Ok(())
}

fn issuer<S: RecordStore>(
    store: Arc<S>,
    generated_by: Option<UserId>,
    config: &CLI,
) -> BatchIssuer<S, RandomGenerator> {
    let settings = IssuerSettings::builder()
        .generated_by(generated_by)
        .max_attempts(config.max_attempts)
        .max_batch_size(config.max_batch_size)
        .build();
    BatchIssuer::from_shared(store, Arc::new(RandomGenerator::new()), settings)
}

fn issue_message(err: &IssueError) -> &'static str {
    match err {
        IssueError::BatchTooLarge { .. } => "batch too large",
        IssueError::Codec(_) => "internal error",
        IssueError::Generation(_)
        | IssueError::CollisionCheck(_)
        | IssueError::ExhaustedRetries { .. } => "try again",
    }
}

fn redeem_message(err: &RedeemError) -> &'static str {
    match err {
        RedeemError::InvalidCode { .. } => "invalid code",
        RedeemError::AlreadyUsed(_) => "code already used",
        RedeemError::Redemption { .. } => "try again",
    }
}

fn user_facing_issue(err: IssueError) -> anyhow::Error {
    let message = issue_message(&err);
    anyhow::Error::new(err).context(message)
}

fn user_facing_redeem(err: RedeemError) -> anyhow::Error {
    let message = redeem_message(&err);
    anyhow::Error::new(err).context(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_core::{LookupFailure, RedemptionFailure, StorageError};

    #[test]
    fn redeem_errors_have_distinct_messages() {
        let invalid = RedeemError::InvalidCode {
            code: "ZZZZZZ".into(),
            reason: LookupFailure::NotFound,
        };
        let used = RedeemError::AlreadyUsed("ZZZZZZ".into());
        let lost = RedeemError::Redemption {
            code: "ZZZZZZ".into(),
            reason: RedemptionFailure::LostRace,
        };

        assert_eq!(redeem_message(&invalid), "invalid code");
        assert_eq!(redeem_message(&used), "code already used");
        assert_eq!(redeem_message(&lost), "try again");
        assert_eq!(user_facing_redeem(used).to_string(), "code already used");
    }

    #[test]
    fn issue_errors_map_to_messages() {
        assert_eq!(
            issue_message(&IssueError::ExhaustedRetries { attempts: 8 }),
            "try again"
        );
        assert_eq!(
            issue_message(&IssueError::Generation(StorageError::Timeout("slow".into()))),
            "try again"
        );
        assert_eq!(
            issue_message(&IssueError::BatchTooLarge {
                requested: 20,
                max: 10
            }),
            "batch too large"
        );
    }
}
