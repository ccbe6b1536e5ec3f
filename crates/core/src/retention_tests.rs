// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn make_dir(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    tokio::fs::create_dir_all(&path).await.unwrap();
    path
}

#[tokio::test]
async fn keeps_newest_directories() {
    let root = tempfile::tempdir().unwrap();
    let oldest = make_dir(root.path(), "b1").await;
    // Directory mtimes need to differ for the ordering to be observable
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let middle = make_dir(root.path(), "b2").await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let newest = make_dir(root.path(), "b3").await;

    let pruned = prune_oldest(root.path(), 2).await.unwrap();

    assert_eq!(pruned, vec![oldest.clone()]);
    assert!(!oldest.exists());
    assert!(middle.exists());
    assert!(newest.exists());
}

#[tokio::test]
async fn zero_keep_disables_pruning() {
    let root = tempfile::tempdir().unwrap();
    make_dir(root.path(), "b1").await;

    let pruned = prune_oldest(root.path(), 0).await.unwrap();
    assert!(pruned.is_empty());
    assert!(root.path().join("b1").exists());
}

#[tokio::test]
async fn files_are_left_alone() {
    let root = tempfile::tempdir().unwrap();
    tokio::fs::write(root.path().join("stray.log"), b"x").await.unwrap();
    make_dir(root.path(), "b1").await;

    let pruned = prune_oldest(root.path(), 1).await.unwrap();
    assert!(pruned.is_empty());
    assert!(root.path().join("stray.log").exists());
}

#[tokio::test]
async fn missing_root_is_not_an_error() {
    let root = tempfile::tempdir().unwrap();
    let gone = root.path().join("never-created");
    let pruned = prune_oldest(&gone, 3).await.unwrap();
    assert!(pruned.is_empty());
}
