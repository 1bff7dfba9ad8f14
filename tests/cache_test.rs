//! Integration tests for the disk-backed [`ResponseCache`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use huginn::cache::request_key;
use huginn::{CacheConfig, ResponseCache};

fn config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig::new()
        .dir(dir)
        .max_entries(100)
        .ttl(Duration::from_secs(3600))
}

fn payload(text: &str) -> Value {
    json!({"model": "m", "messages": [{"role": "user", "content": text}]})
}

#[tokio::test]
async fn store_then_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();

    let response = json!({"choices": [{"message": {"content": "hello"}}]});
    cache.store("/chat/completions", &payload("hi"), &response).await;

    assert_eq!(
        cache.lookup("/chat/completions", &payload("hi")).await,
        Some(response)
    );
    assert_eq!(cache.lookup("/chat/completions", &payload("bye")).await, None);
    assert_eq!(cache.lookup("/completions", &payload("hi")).await, None);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let response = json!({"data": [{"url": "https://img"}]});
    {
        let cache = ResponseCache::open(&config(dir.path())).unwrap();
        cache
            .store("/images/generations", &json!({"prompt": "fox"}), &response)
            .await;
    }

    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    assert!(cache.contains("/images/generations", &json!({"prompt": "fox"})).await);
    assert_eq!(
        cache.lookup("/images/generations", &json!({"prompt": "fox"})).await,
        Some(response)
    );
}

#[tokio::test]
async fn on_disk_layout() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    cache.store("/e", &payload("hi"), &json!({"ok": true})).await;

    let key = request_key("/e", &payload("hi"));
    let index: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("index.json")).unwrap())
            .unwrap();
    assert_eq!(index[&key]["endpoint"], "/e");
    assert_eq!(index[&key]["file"], format!("{key}.json"));
    assert!(index[&key]["timestamp"].as_f64().unwrap() > 0.0);

    let entry: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(format!("{key}.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(entry["key"], key.as_str());
    assert_eq!(entry["response"], json!({"ok": true}));
}

#[tokio::test]
async fn clear_removes_entries_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    for i in 0..3 {
        cache
            .store("/e", &payload(&i.to_string()), &json!({"i": i}))
            .await;
    }
    assert_eq!(cache.len().await, 3);

    cache.clear().await;
    assert!(cache.is_empty().await);
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files, vec!["index.json".to_string()]);
}

#[tokio::test]
async fn capacity_is_never_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path()).max_entries(2)).unwrap();

    cache.store("/e", &payload("a"), &json!({"a": 1})).await;
    cache.store("/e", &payload("b"), &json!({"b": 1})).await;
    cache.store("/e", &payload("c"), &json!({"c": 1})).await;

    assert_eq!(cache.len().await, 2);
    assert!(cache.contains("/e", &payload("c")).await);
}

#[tokio::test]
async fn unreadable_entry_is_a_miss_and_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    cache.store("/e", &payload("hi"), &json!({"ok": true})).await;

    let key = request_key("/e", &payload("hi"));
    std::fs::write(dir.path().join(format!("{key}.json")), "{not json").unwrap();

    assert_eq!(cache.lookup("/e", &payload("hi")).await, None);
    assert!(!cache.contains("/e", &payload("hi")).await);
    assert!(!dir.path().join(format!("{key}.json")).exists());
}

#[tokio::test]
async fn missing_entry_file_is_a_miss_and_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    cache.store("/e", &payload("hi"), &json!({"ok": true})).await;

    let key = request_key("/e", &payload("hi"));
    std::fs::remove_file(dir.path().join(format!("{key}.json"))).unwrap();

    assert_eq!(cache.lookup("/e", &payload("hi")).await, None);
    assert!(cache.is_empty().await);
}

#[test]
fn corrupt_index_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.json"), "garbage").unwrap();

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let cache = ResponseCache::open(&config(dir.path())).unwrap();
    assert!(rt.block_on(cache.is_empty()));
}

#[test]
fn orphaned_files_are_removed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let orphan = dir.path().join("0123456789abcdef0123456789abcdef.json");
    std::fs::write(&orphan, r#"{"key": "x"}"#).unwrap();
    let unrelated = dir.path().join("notes.txt");
    std::fs::write(&unrelated, "keep me").unwrap();
    let settings = dir.path().join("settings.json");
    std::fs::write(&settings, r#"{"important": true}"#).unwrap();
    let uppercase = dir.path().join("0123456789ABCDEF0123456789ABCDEF.json");
    std::fs::write(&uppercase, "{}").unwrap();

    let _cache = ResponseCache::open(&config(dir.path())).unwrap();
    assert!(!orphan.exists());
    assert!(unrelated.exists());
    assert!(settings.exists());
    assert_eq!(
        std::fs::read_to_string(&settings).unwrap(),
        r#"{"important": true}"#
    );
    assert!(uppercase.exists());
}

#[tokio::test]
async fn index_file_field_is_not_trusted() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("cache");
    std::fs::create_dir(&dir).unwrap();
    let victim = root.path().join("victim.json");
    std::fs::write(&victim, "precious").unwrap();

    let key = request_key("/e", &payload("hi"));
    let index = json!({
        key.clone(): {"timestamp": 1.0, "endpoint": "/e", "file": "../victim.json"},
        "../victim": {"timestamp": 2.0, "endpoint": "/e", "file": "../victim.json"},
    });
    std::fs::write(dir.join("index.json"), index.to_string()).unwrap();

    let cache = ResponseCache::open(&config(&dir)).unwrap();
    // Malformed keys are dropped on load.
    assert_eq!(cache.len().await, 1);

    // Expired entry removal and clear only touch files inside the cache dir.
    assert_eq!(cache.lookup("/e", &payload("hi")).await, None);
    cache.clear().await;
    assert!(victim.exists());
    assert_eq!(std::fs::read_to_string(&victim).unwrap(), "precious");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stores_respect_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResponseCache::open(&config(dir.path()).max_entries(5)).unwrap());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .store("/e", &payload(&format!("q{i}")), &json!({"i": i}))
                    .await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.len().await, 5);

    let entry_files = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name != "index.json")
        .count();
    assert_eq!(entry_files, 5);

    let index: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("index.json")).unwrap())
            .unwrap();
    assert_eq!(index.as_object().unwrap().len(), 5);
}

#[test]
fn open_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let cache = ResponseCache::open(&config(&nested)).unwrap();
    assert!(nested.is_dir());
    assert_eq!(cache.dir(), nested.as_path());
}

#[test]
fn request_key_is_deterministic() {
    let a = json!({"model": "m", "temperature": 0.7, "messages": []});
    let b: Value =
        serde_json::from_str(r#"{"messages": [], "temperature": 0.7, "model": "m"}"#).unwrap();
    assert_eq!(request_key("/chat/completions", &a), request_key("/chat/completions", &b));
    assert_eq!(request_key("/chat/completions", &a).len(), 32);
}
