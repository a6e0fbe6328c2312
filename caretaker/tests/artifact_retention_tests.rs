//! Artifact store and retention tests
//!
//! Retention is age based: an artifact older than the category's max age is
//! pruned, except that the newest artifact of a category always survives.

mod common;

use caretaker::errors::{EngineError, StorageError};
use caretaker::RetentionPolicy;
use common::fixtures::{days, t0, Harness, TEST_CATEGORY};
use rstest::rstest;

async fn write_at(harness: &Harness, day: i64, label: &str) -> caretaker::Artifact {
    harness.clock.set(t0() + days(day));
    harness
        .store
        .write(TEST_CATEGORY, label, format!("payload from day {}", day).as_bytes())
        .await
        .expect("write succeeds")
}

#[tokio::test]
async fn test_prune_keeps_artifacts_inside_window_and_the_newest() {
    let harness = Harness::new().await;
    write_at(&harness, 0, "app.log.gz").await;
    write_at(&harness, 10, "app.log.gz").await;
    let newest = write_at(&harness, 40, "app.log.gz").await;

    harness.clock.set(t0() + days(41));
    let removed = harness
        .store
        .prune(TEST_CATEGORY, &RetentionPolicy::new(30))
        .await
        .unwrap();

    assert_eq!(removed, 2, "day 0 and day 10 are older than 30 days");
    let remaining = harness.store.list(TEST_CATEGORY).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, newest.name);

    // Long after the window closes the only artifact is still kept
    harness.clock.set(t0() + days(400));
    let removed = harness
        .store
        .prune(TEST_CATEGORY, &RetentionPolicy::new(30))
        .await
        .unwrap();
    assert_eq!(removed, 0);
    assert_eq!(
        harness.store.latest(TEST_CATEGORY).await.unwrap().map(|a| a.name),
        Some(newest.name)
    );
}

#[tokio::test]
async fn test_prune_is_idempotent() {
    let harness = Harness::new().await;
    for day in [0, 5, 20, 35] {
        write_at(&harness, day, "db.sql").await;
    }

    harness.clock.set(t0() + days(36));
    let policy = RetentionPolicy::new(30);
    let first = harness.store.prune(TEST_CATEGORY, &policy).await.unwrap();
    let second = harness.store.prune(TEST_CATEGORY, &policy).await.unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0, "nothing left to remove on the second pass");
    assert_eq!(harness.store.list(TEST_CATEGORY).await.unwrap().len(), 2);
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(30)]
#[tokio::test]
async fn test_prune_never_empties_a_category(#[case] max_age_days: u32) {
    let harness = Harness::new().await;
    write_at(&harness, 0, "a.tar").await;
    write_at(&harness, 1, "b.tar").await;

    harness.clock.set(t0() + days(1000));
    harness
        .store
        .prune(TEST_CATEGORY, &RetentionPolicy::new(max_age_days))
        .await
        .unwrap();

    let remaining = harness.store.list(TEST_CATEGORY).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].label, "b.tar");
}

#[tokio::test]
async fn test_artifact_exactly_at_max_age_survives() {
    let harness = Harness::new().await;
    write_at(&harness, 0, "edge.log").await;
    write_at(&harness, 29, "edge.log").await;

    harness.clock.set(t0() + days(30));
    let removed = harness
        .store
        .prune(TEST_CATEGORY, &RetentionPolicy::new(30))
        .await
        .unwrap();

    assert_eq!(removed, 0, "an age equal to the limit is not expired");
}

#[tokio::test]
async fn test_list_is_newest_first_and_sizes_add_up() {
    let harness = Harness::new().await;
    let a = write_at(&harness, 0, "a.log").await;
    let b = write_at(&harness, 1, "b.log").await;
    let c = write_at(&harness, 2, "c.log").await;

    let listed = harness.store.list(TEST_CATEGORY).await.unwrap();
    let names: Vec<_> = listed.iter().map(|a| a.name.clone()).collect();
    assert_eq!(names, vec![c.name.clone(), b.name.clone(), a.name.clone()]);

    let total = harness.store.total_size(TEST_CATEGORY).await.unwrap();
    assert_eq!(total, a.size_bytes + b.size_bytes + c.size_bytes);

    let bytes = harness.store.read(TEST_CATEGORY, &b.name).await.unwrap();
    assert_eq!(bytes, b"payload from day 1");
}

#[tokio::test]
async fn test_clock_behind_newest_artifact_is_clamped() {
    let harness = Harness::new().await;
    let first = write_at(&harness, 10, "clock.log").await;
    let second = write_at(&harness, 5, "clock.log").await;

    assert!(second.created_at >= first.created_at);
    assert_ne!(second.name, first.name);
    assert_eq!(
        harness.store.latest(TEST_CATEGORY).await.unwrap().map(|a| a.name),
        Some(second.name)
    );
}

#[tokio::test]
async fn test_concurrent_writes_produce_distinct_artifacts() {
    let harness = Harness::new().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = harness.store.clone();
            tokio::spawn(async move {
                store
                    .write(TEST_CATEGORY, "burst.bin", format!("{}", i).as_bytes())
                    .await
            })
        })
        .collect();

    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.await.unwrap().unwrap().name);
    }
    names.sort();
    names.dedup();

    assert_eq!(names.len(), 8, "same instant and label never collide");
    assert_eq!(harness.store.list(TEST_CATEGORY).await.unwrap().len(), 8);
}

#[rstest]
#[case("../escape")]
#[case("nested/dir")]
#[case("")]
#[case(".hidden")]
#[tokio::test]
async fn test_unsafe_names_are_rejected(#[case] category: &str) {
    let harness = Harness::new().await;
    let result = harness.store.write(category, "x.log", b"x").await;

    assert!(matches!(
        result,
        Err(EngineError::Storage(StorageError::InvalidName { .. }))
    ));
}

#[tokio::test]
async fn test_missing_category_lists_empty_and_unknown_artifact_is_not_found() {
    let harness = Harness::new().await;

    assert!(harness.store.list("never-written").await.unwrap().is_empty());
    assert!(harness.store.categories().await.unwrap().is_empty());

    let result = harness.store.read(TEST_CATEGORY, "nope").await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound { kind: "Artifact", .. })
    ));
}

#[tokio::test]
async fn test_partial_and_foreign_files_are_ignored() {
    let harness = Harness::new().await;
    let artifact = write_at(&harness, 0, "real.log").await;

    let dir = harness.store.root().join(TEST_CATEGORY);
    std::fs::write(dir.join(".partial-20260301T020000.000Z-half.log"), b"half").unwrap();
    std::fs::write(dir.join("README"), b"not an artifact").unwrap();

    let listed = harness.store.list(TEST_CATEGORY).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, artifact.name);
    assert_eq!(
        harness.store.categories().await.unwrap(),
        vec![TEST_CATEGORY.to_string()]
    );
}

fn partial_files(harness: &Harness) -> Vec<String> {
    let dir = harness.store.root().join(TEST_CATEGORY);
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
        .filter(|name| name.starts_with(".partial-"))
        .collect()
}

#[tokio::test]
async fn test_stale_partial_files_are_swept_on_write_and_prune() {
    let harness = Harness::new().await;
    write_at(&harness, 0, "real.log").await;
    let dir = harness.store.root().join(TEST_CATEGORY);

    std::fs::write(dir.join(".partial-20260301T020000.000Z-crashed.log"), b"half").unwrap();
    write_at(&harness, 1, "real.log").await;
    assert!(partial_files(&harness).is_empty(), "write sweeps leftovers");

    std::fs::write(dir.join(".partial-20260302T020000.000Z-crashed.log"), b"half").unwrap();
    harness
        .store
        .prune(TEST_CATEGORY, &RetentionPolicy::new(30))
        .await
        .unwrap();
    assert!(partial_files(&harness).is_empty(), "prune sweeps leftovers");
    assert_eq!(harness.store.list(TEST_CATEGORY).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_abandoned_write_leaves_no_partial_file() {
    let harness = Harness::new().await;
    write_at(&harness, 0, "seed.bin").await;

    let payload = vec![7u8; 32 * 1024 * 1024];
    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(1),
        harness.store.write(TEST_CATEGORY, "large.bin", &payload),
    )
    .await;

    // let any blocking file operation of the dropped write settle
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    write_at(&harness, 1, "after.bin").await;

    assert!(partial_files(&harness).is_empty());
    let labels: Vec<_> = harness
        .store
        .list(TEST_CATEGORY)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.label)
        .collect();
    assert!(labels.contains(&"seed.bin".to_string()));
    assert!(labels.contains(&"after.bin".to_string()));
    if abandoned.is_ok() {
        assert!(labels.contains(&"large.bin".to_string()));
    }
}
