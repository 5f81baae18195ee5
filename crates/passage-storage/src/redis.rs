use async_trait::async_trait;
use jiff::Timestamp;
use passage_core::record::Fields;
use passage_core::store::{BatchFetch, Result};
use passage_core::{
    RecordDraft, RecordId, RecordStore, RecordVersion, SavePolicy, StorageError, StoredRecord,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const DEFAULT_PREFIX: &str = "passage:code:";

const CONDITIONAL_SAVE: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
  return {'missing'}
end
if current ~= ARGV[1] then
  return {'conflict', current}
end
local next_version = tonumber(current) + 1
redis.call('HSET', KEYS[1], 'fields', ARGV[2], 'version', tostring(next_version))
return {'ok', tostring(next_version), redis.call('HGET', KEYS[1], 'created_at')}
"#;

const BATCH_SAVE: &str = r#"
if ARGV[1] == 'insert' then
  for i, key in ipairs(KEYS) do
    if redis.call('EXISTS', key) == 1 then
      return {'conflict', tostring(i)}
    end
    for j = 1, i - 1 do
      if KEYS[j] == key then
        return {'conflict', tostring(i)}
      end
    end
  end
end
local result = {'ok'}
for i, key in ipairs(KEYS) do
  local version = redis.call('HINCRBY', key, 'version', 1)
  redis.call('HSETNX', key, 'created_at', ARGV[2])
  redis.call('HSET', key, 'fields', ARGV[i + 2])
  table.insert(result, tostring(version))
  table.insert(result, redis.call('HGET', key, 'created_at'))
end
return result
"#;

type RawRecord = (Option<String>, Option<u64>, Option<i64>);

/// A Redis-based implementation of [`RecordStore`].
///
/// Each record is a hash with `fields` (JSON), `version` and `created_at`
/// (milliseconds). Conditional saves and batch saves are Lua scripts, so
/// Redis executes each of them atomically. All keys of a batch must live
/// on one node; Redis Cluster deployments are not supported.
#[derive(Clone)]
pub struct RedisRecordStore {
    conn: ::redis::aio::MultiplexedConnection,
    key_prefix: String,
    conditional_save: Arc<::redis::Script>,
    batch_save: Arc<::redis::Script>,
}

impl std::fmt::Debug for RedisRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRecordStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisRecordStore {
    /// Creates a new Redis record store.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: ::redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, DEFAULT_PREFIX)
    }

    /// Creates a new Redis record store with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for record keys (e.g., "myapp:code:")
    pub fn with_prefix(
        conn: ::redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            conditional_save: Arc::new(::redis::Script::new(CONDITIONAL_SAVE)),
            batch_save: Arc::new(::redis::Script::new(BATCH_SAVE)),
        }
    }

    /// Opens a connection to `redis_url` and creates a store on it.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        key_prefix: impl Into<String>,
    ) -> Result<Self> {
        let client = ::redis::Client::open(redis_url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        Ok(Self::with_prefix(conn, key_prefix))
    }

    /// Generates the key for a record.
    fn record_key(&self, id: &RecordId) -> String {
        format!("{}{}:{}", self.key_prefix, id.kind, id.name)
    }
}

fn map_redis_error(err: ::redis::RedisError) -> StorageError {
    let message = err.to_string();
    if err.is_timeout() {
        StorageError::Timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StorageError::Unavailable(message)
    } else {
        StorageError::Query(message)
    }
}

fn encode_fields(id: &RecordId, fields: &Fields) -> Result<String> {
    serde_json::to_string(fields)
        .map_err(|e| StorageError::InvalidData(format!("cannot encode fields of {id}: {e}")))
}

fn parse_created_at(id: &RecordId, raw: &str) -> Result<Timestamp> {
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Timestamp::from_millisecond(millis).ok())
        .ok_or_else(|| StorageError::InvalidData(format!("invalid created_at of {id}: '{raw}'")))
}

fn parse_version(id: &RecordId, raw: &str) -> Result<RecordVersion> {
    raw.parse::<u64>()
        .map(RecordVersion::new)
        .map_err(|_| StorageError::InvalidData(format!("invalid version of {id}: '{raw}'")))
}

fn parse_raw(id: &RecordId, raw: RawRecord) -> Result<Option<StoredRecord>> {
    match raw {
        (None, None, None) => Ok(None),
        (Some(fields), Some(version), Some(created_at)) => {
            let fields = serde_json::from_str::<Fields>(&fields)
                .map_err(|e| StorageError::InvalidData(format!("invalid fields of {id}: {e}")))?;
            let created_at = Timestamp::from_millisecond(created_at).map_err(|e| {
                StorageError::InvalidData(format!("invalid created_at of {id}: {e}"))
            })?;
            Ok(Some(StoredRecord {
                id: id.clone(),
                fields,
                version: RecordVersion::new(version),
                created_at,
            }))
        }
        _ => Err(StorageError::InvalidData(format!("record {id} is missing hash fields"))),
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        let key = self.record_key(id);
        trace!(%id, "Fetching record from Redis");

        let mut conn = self.conn.clone();
        let raw: RawRecord = ::redis::cmd("HMGET")
            .arg(&key)
            .arg("fields")
            .arg("version")
            .arg("created_at")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        parse_raw(id, raw)
    }

    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch> {
        if ids.is_empty() {
            return Ok(BatchFetch::new());
        }

        let mut pipe = ::redis::pipe();
        for id in ids {
            pipe.cmd("HMGET")
                .arg(self.record_key(id))
                .arg("fields")
                .arg("version")
                .arg("created_at");
        }

        let mut conn = self.conn.clone();
        let rows: Vec<RawRecord> = pipe.query_async(&mut conn).await.map_err(map_redis_error)?;
        trace!(requested = ids.len(), "Batch fetched records from Redis");

        Ok(ids
            .iter()
            .zip(rows)
            .map(|(id, raw)| (id.clone(), parse_raw(id, raw)))
            .collect())
    }

    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord> {
        let key = self.record_key(&draft.id);
        let fields = encode_fields(&draft.id, &draft.fields)?;

        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .conditional_save
            .key(&key)
            .arg(expected.get())
            .arg(fields)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        match reply.as_slice() {
            [status, version, created_at] if status == "ok" => Ok(StoredRecord {
                version: parse_version(&draft.id, version)?,
                created_at: parse_created_at(&draft.id, created_at)?,
                id: draft.id,
                fields: draft.fields,
            }),
            [status, actual] if status == "conflict" => {
                debug!(id = %draft.id, %expected, actual = %actual, "Conditional save rejected");
                Err(StorageError::VersionConflict {
                    actual: Some(parse_version(&draft.id, actual)?),
                    id: draft.id.to_string(),
                    expected,
                })
            }
            [status] if status == "missing" => Err(StorageError::VersionConflict {
                id: draft.id.to_string(),
                expected,
                actual: None,
            }),
            other => {
                warn!(id = %draft.id, reply = ?other, "Unexpected conditional save reply");
                Err(StorageError::Operation(format!("unexpected script reply: {other:?}")))
            }
        }
    }

    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut invocation = self.batch_save.prepare_invoke();
        for draft in &drafts {
            invocation.key(self.record_key(&draft.id));
        }
        invocation.arg(match policy {
            SavePolicy::InsertIfAbsent => "insert",
            SavePolicy::OverwriteAll => "overwrite",
        });
        invocation.arg(Timestamp::now().as_millisecond());
        for draft in &drafts {
            invocation.arg(encode_fields(&draft.id, &draft.fields)?);
        }

        let mut conn = self.conn.clone();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        match reply.split_first() {
            Some((status, rest)) if status == "ok" && rest.len() == drafts.len() * 2 => {
                let saved = drafts
                    .into_iter()
                    .zip(rest.chunks_exact(2))
                    .map(|(draft, pair)| {
                        Ok(StoredRecord {
                            version: parse_version(&draft.id, &pair[0])?,
                            created_at: parse_created_at(&draft.id, &pair[1])?,
                            id: draft.id,
                            fields: draft.fields,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                debug!(count = saved.len(), ?policy, "Batch saved records in Redis");
                Ok(saved)
            }
            Some((status, [position])) if status == "conflict" => {
                let id = position
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| drafts.get(i))
                    .map(|draft| draft.id.to_string())
                    .unwrap_or_else(|| format!("batch position {position}"));
                Err(StorageError::Conflict(id))
            }
            _ => {
                warn!(reply = ?reply, "Unexpected batch save reply");
                Err(StorageError::Operation(format!("unexpected script reply: {reply:?}")))
            }
        }
    }
}
