//! Data-plane and control-plane semantics of the local store, including a
//! replica copy between two stores over a real stub.

use common::proto::{Command, Storage, StorageApi};
use common::rpc::Skeleton;
use common::{DfsError, Path};
use std::sync::Arc;
use storage::fs::{enumerate, prune_empty_dirs};
use storage::LocalStore;
use tempfile::TempDir;

fn p(s: &str) -> Path {
    s.parse().unwrap()
}

fn seeded_store(files: &[(&str, &[u8])]) -> (Arc<LocalStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    for (path, contents) in files {
        let local = p(path).to_local(dir.path());
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(local, contents).unwrap();
    }
    (Arc::new(LocalStore::new(dir.path().to_path_buf())), dir)
}

#[tokio::test]
async fn size_requires_an_existing_file() {
    let (store, dir) = seeded_store(&[("/f", b"hello")]);
    assert_eq!(store.size(&p("/f")).await.unwrap(), 5);

    assert!(matches!(store.size(&p("/missing")).await, Err(DfsError::FileNotFound(_))));

    std::fs::create_dir(dir.path().join("sub")).unwrap();
    assert!(matches!(store.size(&p("/sub")).await, Err(DfsError::FileNotFound(_))));
}

#[tokio::test]
async fn read_enforces_bounds() {
    let (store, _dir) = seeded_store(&[("/f", b"hello world")]);

    assert_eq!(store.read(&p("/f"), 0, 5).await.unwrap(), b"hello");
    assert_eq!(store.read(&p("/f"), 6, 5).await.unwrap(), b"world");
    assert_eq!(store.read(&p("/f"), 11, 0).await.unwrap(), b"");

    assert!(matches!(store.read(&p("/f"), 0, 12).await, Err(DfsError::OutOfBounds(_))));
    assert!(matches!(store.read(&p("/f"), 12, 0).await, Err(DfsError::OutOfBounds(_))));
    assert!(matches!(store.read(&p("/f"), u64::MAX, 1).await, Err(DfsError::OutOfBounds(_))));
    assert!(matches!(store.read(&p("/missing"), 0, 1).await, Err(DfsError::FileNotFound(_))));
}

#[tokio::test]
async fn write_then_read_returns_the_same_bytes() {
    let (store, _dir) = seeded_store(&[("/f", b"")]);

    let data = b"the quick brown fox".to_vec();
    store.write(&p("/f"), 0, data.clone()).await.unwrap();
    assert_eq!(store.read(&p("/f"), 0, data.len() as u32).await.unwrap(), data);

    assert!(matches!(
        store.write(&p("/missing"), 0, b"x".to_vec()).await,
        Err(DfsError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn write_past_end_extends_with_zeros() {
    let (store, _dir) = seeded_store(&[("/f", b"")]);

    store.write(&p("/f"), 4, b"abcd".to_vec()).await.unwrap();
    assert_eq!(store.size(&p("/f")).await.unwrap(), 8);
    assert_eq!(store.read(&p("/f"), 0, 8).await.unwrap(), b"\0\0\0\0abcd");
}

#[tokio::test]
async fn create_makes_missing_ancestors() {
    let (store, dir) = seeded_store(&[]);

    assert!(store.create(&p("/a/b/c")).await.unwrap());
    assert!(dir.path().join("a/b/c").is_file());

    assert!(!store.create(&p("/a/b/c")).await.unwrap());
    assert!(!store.create(&Path::root()).await.unwrap());
}

#[tokio::test]
async fn delete_removes_files_and_whole_directories() {
    let (store, dir) = seeded_store(&[("/a/b/c", b"x"), ("/a/d", b"y"), ("/top", b"z")]);

    assert!(store.delete(&p("/top")).await.unwrap());
    assert!(!store.delete(&p("/top")).await.unwrap());

    assert!(store.delete(&p("/a")).await.unwrap());
    assert!(!dir.path().join("a").exists());

    assert!(!store.delete(&Path::root()).await.unwrap());
}

#[tokio::test]
async fn copy_installs_a_replica_from_another_store() {
    let payload: Vec<u8> = (0..70_000u32).flat_map(|n| n.to_le_bytes()).collect();
    let (source, _source_dir) = seeded_store(&[]);
    source.create(&p("/data/f")).await.unwrap();
    source.write(&p("/data/f"), 0, payload.clone()).await.unwrap();

    let skeleton: Skeleton<StorageApi> =
        Skeleton::bind(source.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
    let source_stub = common::StorageStub::new(skeleton.local_addr());

    let (target, _target_dir) = seeded_store(&[("/data/f", b"stale contents")]);
    assert!(target.copy(&p("/data/f"), &source_stub).await.unwrap());

    assert_eq!(target.size(&p("/data/f")).await.unwrap(), payload.len() as u64);
    assert_eq!(
        target.read(&p("/data/f"), 0, payload.len() as u32).await.unwrap(),
        payload
    );
}

#[tokio::test]
async fn copy_of_a_missing_source_fails() {
    let (source, _source_dir) = seeded_store(&[]);
    let skeleton: Skeleton<StorageApi> =
        Skeleton::bind(source.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
    let source_stub = common::StorageStub::new(skeleton.local_addr());

    let (target, _target_dir) = seeded_store(&[]);
    assert!(matches!(
        target.copy(&p("/nope"), &source_stub).await,
        Err(DfsError::FileNotFound(_))
    ));
}

#[test]
fn enumerate_lists_every_file_relative_to_the_root() {
    let (_store, dir) = seeded_store(&[("/a/b/c", b"x"), ("/a/d", b"y"), ("/top", b"z")]);

    let mut files = enumerate(dir.path()).unwrap();
    files.sort();
    assert_eq!(files, vec![p("/a/b/c"), p("/a/d"), p("/top")]);
}

#[test]
fn prune_drops_empty_directory_chains() {
    let (_store, dir) = seeded_store(&[("/keep/f", b"x")]);
    std::fs::create_dir_all(dir.path().join("empty/nested/deeper")).unwrap();

    prune_empty_dirs(dir.path()).unwrap();

    assert!(!dir.path().join("empty").exists());
    assert!(dir.path().join("keep/f").is_file());
}
