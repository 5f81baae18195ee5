use async_trait::async_trait;
use jiff::Timestamp;
use passage_core::record::Fields;
use passage_core::store::{BatchFetch, Result};
use passage_core::{
    RecordDraft, RecordId, RecordKind, RecordStore, RecordVersion, SavePolicy, StorageError,
    StoredRecord,
};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlConnection, MySqlPool, Row};
use std::collections::HashMap;
use tracing::{debug, trace};

const SCHEMA: &str = include_str!("../ddl/mysql/code_records.sql");

/// Ids per `IN` query; each id binds two of MySQL's 65,535 placeholders.
pub const BATCH_FETCH_CHUNK: usize = 1_000;

/// MySQL implementation of the record store contract.
///
/// Every record is one row of `code_records`, keyed by
/// `(record_kind, record_name)`. The `version` column backs conditional
/// saves; batch saves run in a single transaction.
#[derive(Debug, Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `code_records` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Looks up one chunk of ids with a single `IN` query.
    async fn fetch_chunk(
        &self,
        ids: &[RecordId],
        found: &mut HashMap<RecordId, Result<StoredRecord>>,
    ) -> Result<()> {
        let placeholders = vec!["(?, ?)"; ids.len()].join(", ");
        let sql = format!(
            "SELECT record_kind, record_name, fields, version, created_at \
             FROM code_records \
             WHERE (record_kind, record_name) IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.kind.as_str()).bind(id.name.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        for row in &rows {
            let kind: String = row.try_get("record_kind").map_err(map_sqlx_error)?;
            let name: String = row.try_get("record_name").map_err(map_sqlx_error)?;
            let Some(kind) = RecordKind::from_tag(&kind) else {
                return Err(StorageError::InvalidData(format!("unknown record kind '{kind}'")));
            };
            let id = RecordId { kind, name };
            found.insert(id.clone(), parse_row(id, row));
        }
        Ok(())
    }
}

fn encode_fields(id: &RecordId, fields: &Fields) -> Result<String> {
    serde_json::to_string(fields)
        .map_err(|e| StorageError::InvalidData(format!("cannot encode fields of {id}: {e}")))
}

fn parse_created_at(millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{}': {e}", millis))
    })
}

fn parse_row(id: RecordId, row: &MySqlRow) -> Result<StoredRecord> {
    let raw_fields: String = row.try_get("fields").map_err(map_sqlx_error)?;
    let version: u64 = row.try_get("version").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    let fields = serde_json::from_str::<Fields>(&raw_fields)
        .map_err(|e| StorageError::InvalidData(format!("invalid fields of {id}: {e}")))?;

    Ok(StoredRecord {
        id,
        fields,
        version: RecordVersion::new(version),
        created_at: parse_created_at(created_at)?,
    })
}

async fn select_record(
    conn: &mut MySqlConnection,
    id: &RecordId,
) -> Result<Option<StoredRecord>> {
    let row = sqlx::query(
        r#"
        SELECT fields, version, created_at
        FROM code_records
        WHERE record_kind = ?
          AND record_name = ?
        LIMIT 1
        "#,
    )
    .bind(id.kind.as_str())
    .bind(id.name.as_str())
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx_error)?;

    row.map(|row| parse_row(id.clone(), &row)).transpose()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        select_record(&mut conn, id).await
    }

    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch> {
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_FETCH_CHUNK) {
            self.fetch_chunk(chunk, &mut found).await?;
        }
        trace!(requested = ids.len(), found = found.len(), "batch fetched code records");

        Ok(ids
            .iter()
            .map(|id| {
                let outcome = match found.get(id) {
                    Some(Ok(record)) => Ok(Some(record.clone())),
                    Some(Err(e)) => Err(e.clone()),
                    None => Ok(None),
                };
                (id.clone(), outcome)
            })
            .collect())
    }

    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord> {
        let fields = encode_fields(&draft.id, &draft.fields)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE code_records
            SET fields = ?, version = version + 1
            WHERE record_kind = ?
              AND record_name = ?
              AND version = ?
            "#,
        )
        .bind(fields)
        .bind(draft.id.kind.as_str())
        .bind(draft.id.name.as_str())
        .bind(expected.get())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let actual = select_record(&mut tx, &draft.id)
                .await?
                .map(|record| record.version);
            tx.rollback().await.map_err(map_sqlx_error)?;
            debug!(id = %draft.id, %expected, "conditional save rejected");
            return Err(StorageError::VersionConflict {
                id: draft.id.to_string(),
                expected,
                actual,
            });
        }

        let saved = select_record(&mut tx, &draft.id).await?.ok_or_else(|| {
            StorageError::Operation(format!(
                "record {} vanished inside its own transaction",
                draft.id
            ))
        })?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(saved)
    }

    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>> {
        let now = Timestamp::now().as_millisecond();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for draft in &drafts {
            let fields = encode_fields(&draft.id, &draft.fields)?;
            let statement = match policy {
                SavePolicy::InsertIfAbsent => {
                    r#"
                    INSERT INTO code_records (record_kind, record_name, fields, version, created_at)
                    VALUES (?, ?, ?, 1, ?)
                    "#
                }
                SavePolicy::OverwriteAll => {
                    r#"
                    INSERT INTO code_records (record_kind, record_name, fields, version, created_at)
                    VALUES (?, ?, ?, 1, ?)
                    ON DUPLICATE KEY UPDATE fields = VALUES(fields), version = version + 1
                    "#
                }
            };

            let result = sqlx::query(statement)
                .bind(draft.id.kind.as_str())
                .bind(draft.id.name.as_str())
                .bind(fields)
                .bind(now)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => {}
                // Dropping the transaction rolls back the rows written so far.
                Err(err) if is_unique_violation(&err) => {
                    return Err(StorageError::Conflict(draft.id.to_string()))
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        let mut saved = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            let record = select_record(&mut tx, &draft.id).await?.ok_or_else(|| {
                StorageError::Operation(format!("record {} missing after batch save", draft.id))
            })?;
            saved.push(record);
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(count = saved.len(), ?policy, "batch saved code records");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_uses_milliseconds() {
        let ts = parse_created_at(1_700_000_000_123).unwrap();
        assert_eq!(ts.as_millisecond(), 1_700_000_000_123);
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::InvalidData(_)
        ));
    }
}
