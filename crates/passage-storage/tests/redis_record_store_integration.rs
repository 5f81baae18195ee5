use passage_core::record::Fields;
use passage_core::{
    InviteCode, RecordDraft, RecordId, RecordStore, RecordVersion, SavePolicy, StorageError,
};
use passage_storage::RedisRecordStore;
use passage_test_infra::redis::RedisServer;
use serde_json::json;

struct Fixture {
    _redis: RedisServer,
    store: RedisRecordStore,
}

impl Fixture {
    async fn start() -> Self {
        let redis = RedisServer::new().await.expect("start redis");
        let conn = redis.connection().await.expect("redis connection");
        Self {
            _redis: redis,
            store: RedisRecordStore::with_prefix(conn, "test:code:"),
        }
    }
}

fn id(value: &str) -> RecordId {
    RecordId::single_use(&InviteCode::parse(value).unwrap())
}

fn draft(value: &str, used: bool) -> RecordDraft {
    let mut fields = Fields::new();
    fields.insert("used".into(), json!(used));
    RecordDraft {
        id: id(value),
        fields,
    }
}

#[tokio::test]
async fn batch_save_then_fetch() {
    let fixture = Fixture::start().await;

    let saved = fixture
        .store
        .batch_save(
            vec![draft("AAAAAA", false), draft("BBBBBB", false)],
            SavePolicy::InsertIfAbsent,
        )
        .await
        .unwrap();
    assert!(saved.iter().all(|r| r.version == RecordVersion::INITIAL));

    let got = fixture.store.fetch(&id("BBBBBB")).await.unwrap().unwrap();
    assert_eq!(got.fields["used"], json!(false));
    assert_eq!(got.created_at, saved[1].created_at);

    let found = fixture
        .store
        .batch_fetch(&[id("AAAAAA"), id("ZZZZZZ")])
        .await
        .unwrap();
    assert!(matches!(found[&id("AAAAAA")], Ok(Some(_))));
    assert!(matches!(found[&id("ZZZZZZ")], Ok(None)));
}

#[tokio::test]
async fn insert_if_absent_conflict_writes_nothing() {
    let fixture = Fixture::start().await;
    fixture
        .store
        .batch_save(vec![draft("AAAAAA", false)], SavePolicy::InsertIfAbsent)
        .await
        .unwrap();

    let err = fixture
        .store
        .batch_save(
            vec![draft("BBBBBB", false), draft("AAAAAA", false)],
            SavePolicy::InsertIfAbsent,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(ref id) if id == "single_use/AAAAAA"));
    assert!(fixture.store.fetch(&id("BBBBBB")).await.unwrap().is_none());

    let err = fixture
        .store
        .batch_save(
            vec![draft("CCCCCC", false), draft("CCCCCC", false)],
            SavePolicy::InsertIfAbsent,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
    assert!(fixture.store.fetch(&id("CCCCCC")).await.unwrap().is_none());
}

#[tokio::test]
async fn overwrite_all_keeps_creation_date() {
    let fixture = Fixture::start().await;
    let first = fixture
        .store
        .batch_save(vec![draft("AAAAAA", false)], SavePolicy::InsertIfAbsent)
        .await
        .unwrap();

    let second = fixture
        .store
        .batch_save(vec![draft("AAAAAA", true)], SavePolicy::OverwriteAll)
        .await
        .unwrap();

    assert_eq!(second[0].version, RecordVersion::new(2));
    assert_eq!(second[0].created_at, first[0].created_at);
}

#[tokio::test]
async fn conditional_save_is_compare_and_swap() {
    let fixture = Fixture::start().await;
    fixture
        .store
        .batch_save(vec![draft("AAAAAA", false)], SavePolicy::InsertIfAbsent)
        .await
        .unwrap();

    let saved = fixture
        .store
        .conditional_save(draft("AAAAAA", true), RecordVersion::INITIAL)
        .await
        .unwrap();
    assert_eq!(saved.version, RecordVersion::new(2));

    let err = fixture
        .store
        .conditional_save(draft("AAAAAA", false), RecordVersion::INITIAL)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::VersionConflict { actual: Some(v), .. } if v == RecordVersion::new(2)
    ));

    let current = fixture.store.fetch(&id("AAAAAA")).await.unwrap().unwrap();
    assert_eq!(current.fields["used"], json!(true));
}

#[tokio::test]
async fn concurrent_conditional_saves_have_one_winner() {
    let fixture = Fixture::start().await;
    fixture
        .store
        .batch_save(vec![draft("AAAAAA", false)], SavePolicy::InsertIfAbsent)
        .await
        .unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let store = fixture.store.clone();
        handles.push(tokio::spawn(async move {
            store
                .conditional_save(draft("AAAAAA", true), RecordVersion::INITIAL)
                .await
                .is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
