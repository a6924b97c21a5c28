//! Directory operations and registration reconciliation against a live
//! in-process cluster.

mod support;

use common::{DfsError, Path};
use support::{p, service, start_naming, start_storage};

#[tokio::test]
async fn registration_reconciles_duplicates_and_absorbs_new_paths() {
    let naming = start_naming().await;
    let (_s1, _d1) = start_storage(&naming, &[("/a", b"first copy")]).await;

    // The second server announces one duplicate and one new subtree.
    let (_s2, d2) = start_storage(&naming, &[("/a", b"second copy"), ("/b/c", b"nested")]).await;

    // The duplicate was deleted from the second server's root and the
    // directory that emptied out was pruned away with it.
    assert!(!d2.path().join("a").exists());
    assert!(d2.path().join("b/c").is_file());

    let svc = service(&naming);
    assert!(svc.is_directory(&p("/b")).await.unwrap());
    assert!(!svc.is_directory(&p("/b/c")).await.unwrap());
    assert!(!svc.is_directory(&p("/a")).await.unwrap());

    let mut root = svc.list(&Path::root()).await.unwrap();
    root.sort();
    assert_eq!(root, ["a", "b"]);
}

#[tokio::test]
async fn duplicate_registration_is_an_illegal_state() {
    let naming = start_naming().await;
    let (s1, _d1) = start_storage(&naming, &[]).await;

    let registration = common::RegistrationStub::new(naming.registration_addr());
    let err = registration
        .register(s1.storage_stub().clone(), s1.command_stub().clone(), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DfsError::IllegalState(_)));
}

#[tokio::test]
async fn lookup_operations_require_existing_paths() {
    let naming = start_naming().await;
    let (_s1, _d1) = start_storage(&naming, &[("/dir/f", b"x")]).await;
    let svc = service(&naming);

    assert!(matches!(svc.is_directory(&p("/nope")).await, Err(DfsError::FileNotFound(_))));
    assert!(matches!(svc.list(&p("/nope")).await, Err(DfsError::FileNotFound(_))));
    // Listing a file is a lookup failure, not an empty listing.
    assert!(matches!(svc.list(&p("/dir/f")).await, Err(DfsError::FileNotFound(_))));
    assert!(matches!(svc.get_storage(&p("/dir")).await, Err(DfsError::FileNotFound(_))));
}

#[tokio::test]
async fn create_file_is_idempotent_until_deleted() {
    let naming = start_naming().await;
    let (_s1, d1) = start_storage(&naming, &[]).await;
    let svc = service(&naming);

    assert!(svc.create_file(&p("/f")).await.unwrap());
    assert!(!svc.create_file(&p("/f")).await.unwrap());
    assert!(d1.path().join("f").is_file());

    assert!(svc.delete(&p("/f")).await.unwrap());
    assert!(!d1.path().join("f").exists());
    assert!(svc.create_file(&p("/f")).await.unwrap());

    // Root always exists; missing or file parents are lookup failures.
    assert!(!svc.create_file(&Path::root()).await.unwrap());
    assert!(matches!(svc.create_file(&p("/no/dir/f")).await, Err(DfsError::FileNotFound(_))));
    assert!(matches!(svc.create_file(&p("/f/child")).await, Err(DfsError::FileNotFound(_))));
}

#[tokio::test]
async fn create_directory_builds_only_in_existing_parents() {
    let naming = start_naming().await;
    let (_s1, _d1) = start_storage(&naming, &[]).await;
    let svc = service(&naming);

    assert!(svc.create_directory(&p("/dir")).await.unwrap());
    assert!(!svc.create_directory(&p("/dir")).await.unwrap());
    assert!(svc.create_directory(&p("/dir/sub")).await.unwrap());
    assert!(!svc.create_directory(&Path::root()).await.unwrap());
    assert!(matches!(
        svc.create_directory(&p("/missing/sub")).await,
        Err(DfsError::FileNotFound(_))
    ));

    assert!(svc.is_directory(&p("/dir/sub")).await.unwrap());
}

#[tokio::test]
async fn delete_of_a_directory_drops_the_prefix_everywhere() {
    let naming = start_naming().await;
    let (_s1, d1) = start_storage(&naming, &[("/dir/a", b"1")]).await;
    let (_s2, d2) = start_storage(&naming, &[("/dir/b", b"2")]).await;
    let svc = service(&naming);

    assert!(svc.delete(&p("/dir")).await.unwrap());
    assert!(matches!(svc.is_directory(&p("/dir")).await, Err(DfsError::FileNotFound(_))));
    assert!(!d1.path().join("dir").exists());
    assert!(!d2.path().join("dir").exists());

    assert!(!svc.delete(&Path::root()).await.unwrap());
    assert!(matches!(svc.delete(&p("/dir")).await, Err(DfsError::FileNotFound(_))));
}

#[tokio::test]
async fn bytes_written_through_a_storage_stub_read_back_identically() {
    let naming = start_naming().await;
    let (_s1, _d1) = start_storage(&naming, &[("/f", b"")]).await;
    let svc = service(&naming);

    let storage = svc.get_storage(&p("/f")).await.unwrap();
    let payload = b"consistency is a contract".to_vec();
    storage.write(&p("/f"), 0, payload.clone()).await.unwrap();

    assert_eq!(storage.size(&p("/f")).await.unwrap(), payload.len() as u64);
    assert_eq!(storage.read(&p("/f"), 0, payload.len() as u32).await.unwrap(), payload);
}
