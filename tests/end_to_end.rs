use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use metavault::utils::config::IndexKind;
use metavault::{ChangeType, FieldKey, MetaStore, PerceptualHashes, Settings};
use serde_json::json;
use tempfile::TempDir;

fn open() -> Result<(TempDir, MetaStore)> {
    let dir = tempfile::tempdir()?;
    let store = MetaStore::open(&dir.path().join("meta.db"), Settings::default())?;
    Ok((dir, store))
}

fn write(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

fn ids(store: &MetaStore, query: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = store.search(query, 1000, 0).files.iter().map(|f| f.id).collect();
    ids.sort();
    ids
}

#[test]
fn test_extract_query_reextract() -> Result<()> {
    let (dir, store) = open()?;
    let path = write(dir.path(), "a.jpg", b"jpeg")?;

    let id = store.upsert(&path, &json!({"exif": {"camera_make": "Canon", "iso": "100"}}), None, None)?;
    assert_eq!(ids(&store, "camera:Canon"), vec![id]);

    store.upsert(&path, &json!({"exif": {"camera_make": "Canon", "iso": "200"}}), None, None)?;

    let history = store.history_for_path(&path, 10, 0);
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].category.as_str(), history[0].key.as_str()), ("exif", "iso"));
    assert_eq!(history[0].change_type, ChangeType::Updated);
    assert_eq!(history[0].old_value.as_deref(), Some("100"));
    assert_eq!(history[0].new_value.as_deref(), Some("200"));
    assert_eq!(ids(&store, "iso = 200"), vec![id]);
    assert_eq!(store.stats().total_files, 1);
    Ok(())
}

#[test]
fn test_shortcut_matches_raw_clause() -> Result<()> {
    let (dir, store) = open()?;
    let makes = ["Canon", "Canon Inc.", "canon", "Nikon", "Canon"];
    for (i, make) in makes.iter().enumerate() {
        let path = write(dir.path(), &format!("{}.jpg", i), format!("img {}", i).as_bytes())?;
        store.upsert(&path, &json!({"exif": {"Make": make}}), None, None)?;
    }
    let path = write(dir.path(), "plain.txt", b"no camera")?;
    store.upsert(&path, &json!({"file": {"name": "plain.txt"}}), None, None)?;

    let shortcut = ids(&store, "camera:Canon");
    assert_eq!(shortcut.len(), 2);
    assert_eq!(shortcut, ids(&store, "normalized.camera_make = Canon"));
    assert_eq!(shortcut, ids(&store, "make:Canon"));
    Ok(())
}

#[test]
fn test_size_shortcut_boundary() -> Result<()> {
    let (dir, store) = open()?;
    let five_mb = 5 * 1024 * 1024;
    let exact = write(dir.path(), "exact.bin", &vec![0u8; five_mb])?;
    let over = write(dir.path(), "over.bin", &vec![1u8; five_mb + 1])?;
    let exact_id = store.upsert(&exact, &json!({}), None, None)?;
    let over_id = store.upsert(&over, &json!({}), None, None)?;

    assert_eq!(ids(&store, "size:>5MB"), vec![over_id]);
    assert_eq!(ids(&store, "size:>=5MB"), vec![exact_id, over_id]);
    assert_eq!(ids(&store, "size:5MB"), vec![exact_id]);
    assert_eq!(ids(&store, "size < 5MB"), Vec::<i64>::new());
    Ok(())
}

#[test]
fn test_numeric_and_substring_matching() -> Result<()> {
    let (dir, store) = open()?;
    let a = write(dir.path(), "Holiday_Beach.jpg", b"a")?;
    let b = write(dir.path(), "office.jpg", b"b")?;
    let c = write(dir.path(), "unknown.jpg", b"c")?;
    let a_id = store.upsert(&a, &json!({"exif": {"iso": "800", "lens": "EF 50mm f/1.8"}}), None, None)?;
    let b_id = store.upsert(&b, &json!({"exif": {"iso": "100"}}), None, None)?;
    let c_id = store.upsert(&c, &json!({"exif": {"iso": "auto"}}), None, None)?;

    assert_eq!(ids(&store, "exif.iso > 200"), vec![a_id]);
    assert_eq!(ids(&store, "exif.iso <= 800"), vec![a_id, b_id]);
    assert_eq!(ids(&store, "exif.iso != 100"), vec![a_id, c_id]);
    assert_eq!(ids(&store, "path LIKE holiday"), vec![a_id]);
    assert_eq!(ids(&store, "name:BEACH"), vec![a_id]);
    assert_eq!(ids(&store, "lens:50MM"), vec![a_id]);
    assert_eq!(ids(&store, "exif.iso >= 100 AND lens:50mm"), vec![a_id]);
    Ok(())
}

#[test]
fn test_lone_apostrophe_keeps_clauses_apart() -> Result<()> {
    let (dir, store) = open()?;
    let path = write(dir.path(), "a.jpg", b"a")?;
    let id = store.upsert(&path, &json!({"normalized": {"camera_model": "Tom's cam"}, "exif": {"make": "Canon"}}), None, None)?;
    let other = write(dir.path(), "b.jpg", b"b")?;
    store.upsert(&other, &json!({"normalized": {"camera_model": "Tom's cam"}, "exif": {"make": "Nikon"}}), None, None)?;

    let results = store.search("model:Tom's AND camera:Canon", 10, 0);
    assert_eq!(results.parsed_clauses, 2);
    assert_eq!(results.dropped_clauses, 0);
    assert_eq!(results.files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![id]);
    Ok(())
}

#[test]
fn test_substring_match_uses_token_as_typed() -> Result<()> {
    let (dir, store) = open()?;
    let first = write(dir.path(), "IMG_0042.jpg", b"first")?;
    let second = write(dir.path(), "IMG_1420.jpg", b"second")?;
    let first_id = store.upsert(&first, &json!({}), None, None)?;
    store.upsert(&second, &json!({}), None, None)?;

    assert_eq!(ids(&store, "name:0042"), vec![first_id]);
    assert_eq!(ids(&store, "path CONTAINS _0042."), vec![first_id]);
    Ok(())
}

#[test]
fn test_unparsable_query_is_empty_but_reported() -> Result<()> {
    let (dir, store) = open()?;
    let path = write(dir.path(), "a.jpg", b"a")?;
    store.upsert(&path, &json!({"exif": {"make": "Canon"}}), None, None)?;

    let results = store.search("complete nonsense", 10, 0);
    assert!(results.files.is_empty());
    assert_eq!(results.parsed_clauses, 0);
    assert_eq!(results.dropped_clauses, 1);

    let results = store.search("complete nonsense AND camera:Canon", 10, 0);
    assert_eq!(results.files.len(), 1);
    assert_eq!(results.parsed_clauses, 1);
    assert_eq!(results.dropped_clauses, 1);
    Ok(())
}

#[test]
fn test_results_most_recent_first_and_paged() -> Result<()> {
    let (dir, store) = open()?;
    let mut order = Vec::new();
    for name in ["a", "b", "c"] {
        let path = write(dir.path(), name, name.as_bytes())?;
        order.push(store.upsert(&path, &json!({"tag": {"kind": "photo"}}), None, None)?);
        thread::sleep(Duration::from_millis(20));
    }
    // Re-extracting `a` makes it the most recent.
    store.upsert(&dir.path().join("a"), &json!({"tag": {"kind": "photo"}}), None, None)?;

    let page = |offset: usize| -> Vec<i64> {
        store.search("tag.kind = photo", 2, offset).files.iter().map(|f| f.id).collect()
    };
    assert_eq!(page(0), vec![order[0], order[2]]);
    assert_eq!(page(2), vec![order[1]]);
    Ok(())
}

#[test]
fn test_similarity_threshold_monotonic_with_bktree() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut settings = Settings::default();
    settings.similarity.index = IndexKind::BkTree;
    let store = MetaStore::open(&dir.path().join("meta.db"), settings)?;

    let hashes = ["0000000000000000", "0000000000000003", "00000000000000ff", "ffffffffffffffff", "0000000000000003"];
    for (i, hash) in hashes.iter().enumerate() {
        let path = write(dir.path(), &format!("{}.png", i), format!("{}", i).as_bytes())?;
        let mut map = PerceptualHashes::new();
        map.insert("phash".to_string(), hash.to_string());
        store.upsert(&path, &json!({}), Some(&map), None)?;
    }

    let mut previous: Vec<i64> = Vec::new();
    for threshold in [0, 1, 2, 8, 63, 64] {
        let found = store.find_similar("0000000000000001", threshold, 100);
        assert!(found.iter().all(|m| m.distance <= threshold));
        let ids: Vec<i64> = found.iter().map(|m| m.file_id).collect();
        assert!(previous.iter().all(|id| ids.contains(id)));
        previous = ids;
    }
    assert_eq!(previous.len(), 5);

    // Identical text is skipped, but another file with the same bits is not.
    let found = store.find_similar("0000000000000003", 0, 10);
    assert!(found.is_empty());
    let found = store.find_similar("0000000000000000", 0, 10);
    assert!(found.is_empty());
    let found = store.find_similar("000000000000000F", 4, 10);
    assert_eq!(found.len(), 4);
    Ok(())
}

#[test]
fn test_concurrent_upserts_of_same_file_keep_history_consistent() -> Result<()> {
    let (dir, store) = open()?;
    let store = Arc::new(store);
    let path = write(dir.path(), "shared.jpg", b"shared")?;
    let id = store.upsert(&path, &json!({"c": {"v": "start"}}), None, None)?;

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            let path = path.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    store
                        .upsert(&path, &json!({"c": {"v": format!("{}-{}", t, i)}}), None, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut history = store.history(id, 1000, 0);
    history.reverse();
    assert_eq!(history.len(), 40);
    assert_eq!(history[0].old_value.as_deref(), Some("start"));
    for pair in history.windows(2) {
        assert_eq!(pair[1].old_value, pair[0].new_value);
    }
    let last = history.last().unwrap().new_value.clone().unwrap();
    assert_eq!(store.fields(id)[&FieldKey::new("c", "v")], last);
    Ok(())
}
