//! Integration tests for `GdprMapper` record lifecycle over the bundled stores.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gdpr_id_mapper::{
    GdprMapper, HierarchicalHasher, KvStore, MapperError, MapperOptions, MemoryStore,
    PrivateRecord, SqliteStore, StorageError,
};

// ============================================================================
// Helpers
// ============================================================================

const SALT: &[u8] = b"integration-salt";
const TTL: Duration = Duration::from_secs(3600);

fn memory_mapper() -> GdprMapper<MemoryStore> {
    GdprMapper::new(MemoryStore::new(), SALT, TTL)
}

fn sqlite_mapper() -> GdprMapper<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("open in-memory SQLite");
    GdprMapper::new(store, SALT, TTL)
}

/// Record currently stored for `segments`, read straight from the store.
fn stored_record<S: KvStore>(mapper: &GdprMapper<S>, segments: &[&str]) -> PrivateRecord {
    let key = HierarchicalHasher::new(SALT).chain(segments).leaf_key();
    let bytes = mapper
        .store()
        .get(&key)
        .expect("store read")
        .expect("record present");
    PrivateRecord::decode(&bytes).expect("decode record")
}

/// Store that accepts a TTL but never evicts, like a backend with lazy GC.
#[derive(Default)]
struct NoEvictStore(MemoryStore);

impl KvStore for NoEvictStore {
    fn put(&self, key: &[u8], value: &[u8], _ttl: Option<Duration>) -> Result<(), StorageError> {
        self.0.put(key, value, None)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.0.get(key)
    }

    fn delete(&self, key: &[u8]) -> Result<usize, StorageError> {
        self.0.delete(key)
    }

    fn delete_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        self.0.delete_prefix(prefix)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.0.scan_prefix(prefix)
    }
}

/// Store whose every call fails.
struct FailingStore;

fn backend_down() -> StorageError {
    StorageError::Backend {
        message: "backend down".to_string(),
    }
}

impl KvStore for FailingStore {
    fn put(&self, _key: &[u8], _value: &[u8], _ttl: Option<Duration>) -> Result<(), StorageError> {
        Err(backend_down())
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Err(backend_down())
    }

    fn delete(&self, _key: &[u8]) -> Result<usize, StorageError> {
        Err(backend_down())
    }

    fn delete_prefix(&self, _prefix: &[u8]) -> Result<usize, StorageError> {
        Err(backend_down())
    }

    fn scan_prefix(&self, _prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Err(backend_down())
    }
}

// ============================================================================
// Properties shared by every store
// ============================================================================

fn repeat_read_is_stable<S: KvStore>(mapper: &GdprMapper<S>) {
    let first = mapper.query(&["a"], None).expect("first query");
    let second = mapper.query(&["a"], None).expect("second query");
    assert_eq!(first.original_id, second.original_id);
    assert_eq!(first.public_id, second.public_id);
    assert!(second.alive_until >= first.alive_until);
}

fn ancestors_are_materialized<S: KvStore>(mapper: &GdprMapper<S>) {
    mapper.query(&["a", "b"], None).expect("query a/b");
    assert_eq!(mapper.subtree_len(&["a"]).expect("count a"), 2);

    // The ancestor written by the deeper query is the one later reads return.
    let materialized = stored_record(mapper, &["a"]);
    assert_eq!(materialized.original_id, b"a".to_vec());

    let parent = mapper.query(&["a"], None).expect("query a");
    assert_eq!(parent.salt, materialized.salt);
    assert_eq!(parent.public_id, materialized.public_id);
}

fn leaf_clear_removes_one<S: KvStore>(mapper: &GdprMapper<S>) {
    let parent = mapper.query(&["x"], None).expect("query x");
    let child = mapper.query(&["x", "sub"], None).expect("query x/sub");

    assert_eq!(mapper.clear_prefix(&["x", "sub"]).expect("clear"), 1);

    let parent_after = mapper.query(&["x"], None).expect("query x after clear");
    assert_eq!(parent_after.public_id, parent.public_id);

    let child_after = mapper.query(&["x", "sub"], None).expect("query x/sub after clear");
    assert_ne!(child_after.public_id, child.public_id);
}

fn subtree_clear_removes_all<S: KvStore>(mapper: &GdprMapper<S>) {
    let parent = mapper.query(&["x"], None).expect("query x");
    mapper.query(&["x", "sub"], None).expect("query x/sub");

    assert_eq!(mapper.clear_prefix(&["x"]).expect("clear"), 2);
    assert_eq!(mapper.subtree_len(&["x"]).expect("count"), 0);

    let parent_after = mapper.query(&["x"], None).expect("query x after clear");
    assert_ne!(parent_after.public_id, parent.public_id);
}

fn set_overrides_public_id<S: KvStore>(mapper: &GdprMapper<S>) {
    mapper.set(&["x"], b"custom-id", None).expect("set");
    let record = mapper.query(&["x"], None).expect("query");
    assert_eq!(record.public_id, b"custom-id".to_vec());
}

#[test]
fn memory_repeat_read_is_stable() {
    repeat_read_is_stable(&memory_mapper());
}

#[test]
fn sqlite_repeat_read_is_stable() {
    repeat_read_is_stable(&sqlite_mapper());
}

#[test]
fn memory_ancestors_are_materialized() {
    ancestors_are_materialized(&memory_mapper());
}

#[test]
fn sqlite_ancestors_are_materialized() {
    ancestors_are_materialized(&sqlite_mapper());
}

#[test]
fn memory_leaf_clear_removes_one() {
    leaf_clear_removes_one(&memory_mapper());
}

#[test]
fn sqlite_leaf_clear_removes_one() {
    leaf_clear_removes_one(&sqlite_mapper());
}

#[test]
fn memory_subtree_clear_removes_all() {
    subtree_clear_removes_all(&memory_mapper());
}

#[test]
fn sqlite_subtree_clear_removes_all() {
    subtree_clear_removes_all(&sqlite_mapper());
}

#[test]
fn memory_set_overrides_public_id() {
    set_overrides_public_id(&memory_mapper());
}

#[test]
fn sqlite_set_overrides_public_id() {
    set_overrides_public_id(&sqlite_mapper());
}

// ============================================================================
// Hashing
// ============================================================================

#[test]
fn branches_with_same_leaf_segment_differ() {
    let mapper = memory_mapper();
    let left = mapper.query(&["a", "b"], None).expect("query a/b");
    let right = mapper.query(&["c", "b"], None).expect("query c/b");
    assert_eq!(left.original_id, right.original_id);
    assert_ne!(left.public_id, right.public_id);
}

#[test]
fn clearing_one_branch_leaves_sibling_branch() {
    let mapper = memory_mapper();
    mapper.query(&["t", "u1", "s"], None).expect("query t/u1/s");
    let sibling = mapper.query(&["t", "u2"], None).expect("query t/u2");

    assert_eq!(mapper.clear_prefix(&["t", "u1"]).expect("clear"), 2);

    let sibling_after = mapper.query(&["t", "u2"], None).expect("query t/u2 again");
    assert_eq!(sibling_after.public_id, sibling.public_id);
    assert_eq!(mapper.subtree_len(&["t"]).expect("count"), 2);
}

#[test]
fn different_global_salts_give_unrelated_keys() {
    let store = Arc::new(MemoryStore::new());
    let one = GdprMapper::new(Arc::clone(&store), b"salt-one", TTL);
    let two = GdprMapper::new(Arc::clone(&store), b"salt-two", TTL);

    one.query(&["a"], None).expect("query with salt one");
    assert_eq!(two.subtree_len(&["a"]).expect("count"), 0);
    assert_eq!(two.clear_prefix(&["a"]).expect("clear"), 0);
    assert_eq!(store.len(), 1);
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn expired_record_is_recreated_when_store_keeps_it() {
    let store = Arc::new(NoEvictStore::default());
    let mapper = GdprMapper::new(Arc::clone(&store), SALT, TTL);

    let original = mapper.query(&["a"], Some(Duration::ZERO)).expect("query");
    thread::sleep(Duration::from_millis(5));

    let fresh = mapper.query(&["a"], None).expect("query after expiry");
    assert_ne!(fresh.salt, original.salt);
    assert_ne!(fresh.public_id, original.public_id);
    assert_eq!(store.0.len(), 1);
}

#[test]
fn expired_record_is_recreated_when_store_evicts_it() {
    let mapper = sqlite_mapper();
    let original = mapper.query(&["a"], Some(Duration::ZERO)).expect("query");
    thread::sleep(Duration::from_millis(5));

    let fresh = mapper.query(&["a"], None).expect("query after expiry");
    assert_ne!(fresh.public_id, original.public_id);
}

#[test]
fn ttl_override_sets_lifetime() {
    let mapper = memory_mapper();
    let start = chrono::Utc::now();
    let record = mapper
        .query(&["a"], Some(Duration::from_secs(60)))
        .expect("query");
    let lifetime = record.alive_until - start;
    assert!(lifetime >= chrono::TimeDelta::seconds(59));
    assert!(lifetime <= chrono::TimeDelta::seconds(61));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn clear_without_prefix_is_rejected() {
    let mapper = memory_mapper();
    mapper.query(&["a"], None).expect("query");

    let none: [&str; 0] = [];
    let err = mapper.clear_prefix(&none).unwrap_err();
    assert!(matches!(err, MapperError::NoPrefixProvided));
    assert_eq!(err.to_string(), "no prefix provided");
    assert_eq!(mapper.store().len(), 1);
}

#[test]
fn storage_failures_surface() {
    let mapper = GdprMapper::new(FailingStore, SALT, TTL);
    assert!(matches!(
        mapper.query(&["a"], None),
        Err(MapperError::Storage(StorageError::Backend { .. }))
    ));
    assert!(matches!(
        mapper.set(&["a"], b"id", None),
        Err(MapperError::Storage(_))
    ));
    assert!(matches!(
        mapper.clear_prefix(&["a"]),
        Err(MapperError::Storage(_))
    ));
}

// ============================================================================
// Construction and sharing
// ============================================================================

#[test]
fn generated_salt_still_maps_consistently() {
    let mapper =
        GdprMapper::from_options(MemoryStore::new(), &MapperOptions::default()).expect("build");
    let a = mapper.query(&["a"], None).expect("query");
    let b = mapper.query(&["a"], None).expect("query again");
    assert_eq!(a.public_id, b.public_id);
}

#[test]
fn mapper_is_shareable_across_threads() {
    let mapper = Arc::new(memory_mapper());
    let seed = mapper.query(&["shared"], None).expect("seed");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || {
                let leaf = format!("leaf-{i}");
                mapper
                    .query(&["shared", leaf.as_str()], None)
                    .expect("threaded query");
                let parent = mapper.query(&["shared"], None).expect("threaded parent");
                parent.public_id.clone()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("join"), seed.public_id);
    }
    assert_eq!(mapper.subtree_len(&["shared"]).expect("count"), 9);
}

#[test]
fn sqlite_mapping_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.sqlite3");

    let before = {
        let store = SqliteStore::open(&path).expect("open");
        GdprMapper::new(store, SALT, TTL)
            .query(&["tenant", "user"], None)
            .expect("query")
    };

    let store = SqliteStore::open(&path).expect("reopen");
    let after = GdprMapper::new(store, SALT, TTL)
        .query(&["tenant", "user"], None)
        .expect("query after reopen");
    assert_eq!(after.public_id, before.public_id);
}
