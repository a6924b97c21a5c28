//! Replication on read pressure and invalidation on write, observed on the
//! storage servers' actual disks.

mod support;

use support::{p, service, start_naming, start_storage};

async fn read_cycle(svc: &common::ServiceStub, path: &common::Path) {
    svc.lock(path, false).await.unwrap();
    svc.unlock(path, false).await.unwrap();
}

#[tokio::test]
async fn the_twentieth_read_installs_a_replica_exactly_once() {
    let naming = start_naming().await;
    let (_s1, d1) = start_storage(&naming, &[("/f", b"replicate me")]).await;
    let (_s2, d2) = start_storage(&naming, &[]).await;
    let svc = service(&naming);

    for _ in 0..19 {
        read_cycle(&svc, &p("/f")).await;
    }
    assert_eq!(naming.replica_count(&p("/f")), Some(1));
    assert!(!d2.path().join("f").exists());

    // Request 20: coarse = 20, desired = min(floor(0.2 * 20), 3) = 3, but
    // only one fresh server exists.
    read_cycle(&svc, &p("/f")).await;
    assert_eq!(naming.replica_count(&p("/f")), Some(2));
    assert_eq!(std::fs::read(d2.path().join("f")).unwrap(), b"replicate me");
    assert_eq!(std::fs::read(d1.path().join("f")).unwrap(), b"replicate me");

    // No third server: further reads change nothing.
    for _ in 0..20 {
        read_cycle(&svc, &p("/f")).await;
    }
    assert_eq!(naming.replica_count(&p("/f")), Some(2));

    // A third server registering opens the remaining slot; the standing
    // demand (desired = 3) fills it on the next read.
    let (_s3, d3) = start_storage(&naming, &[]).await;
    for _ in 0..20 {
        read_cycle(&svc, &p("/f")).await;
    }
    assert_eq!(naming.replica_count(&p("/f")), Some(3));
    assert_eq!(std::fs::read(d3.path().join("f")).unwrap(), b"replicate me");
}

#[tokio::test]
async fn an_exclusive_cycle_invalidates_every_replica_but_the_primary() {
    let naming = start_naming().await;
    let (s1, d1) = start_storage(&naming, &[("/g", b"original")]).await;
    let (s2, d2) = start_storage(&naming, &[]).await;
    let (s3, d3) = start_storage(&naming, &[]).await;
    let svc = service(&naming);

    // Build read pressure until all three servers hold a copy.
    for _ in 0..20 {
        read_cycle(&svc, &p("/g")).await;
    }
    assert_eq!(naming.replica_count(&p("/g")), Some(3));
    for dir in [&d1, &d2, &d3] {
        assert!(dir.path().join("g").is_file());
    }

    // A writer picks its storage server, writes, and cycles the exclusive
    // lock; afterwards that replica is the only one left.
    let chosen = svc.get_storage(&p("/g")).await.unwrap();
    svc.lock(&p("/g"), true).await.unwrap();
    chosen.write(&p("/g"), 0, b"rewritten".to_vec()).await.unwrap();
    svc.unlock(&p("/g"), true).await.unwrap();

    assert_eq!(naming.replica_count(&p("/g")), Some(1));
    let servers = [(&s1, &d1), (&s2, &d2), (&s3, &d3)];
    for (server, dir) in servers {
        let holds = dir.path().join("g").is_file();
        if server.storage_stub() == &chosen {
            assert!(holds, "the written replica must survive");
            assert_eq!(std::fs::read(dir.path().join("g")).unwrap(), b"rewritten");
        } else {
            assert!(!holds, "stale replicas must be deleted");
        }
    }

    // The sole replica serves subsequent readers.
    let survivor = svc.get_storage(&p("/g")).await.unwrap();
    assert_eq!(survivor, chosen);
    assert_eq!(survivor.read(&p("/g"), 0, 9).await.unwrap(), b"rewritten");
}

#[tokio::test]
async fn exclusive_locks_do_not_count_as_read_pressure() {
    let naming = start_naming().await;
    let (_s1, _d1) = start_storage(&naming, &[("/f", b"data")]).await;
    let (_s2, d2) = start_storage(&naming, &[]).await;
    let svc = service(&naming);

    for _ in 0..25 {
        svc.lock(&p("/f"), true).await.unwrap();
        svc.unlock(&p("/f"), true).await.unwrap();
    }
    assert_eq!(naming.replica_count(&p("/f")), Some(1));
    assert!(!d2.path().join("f").exists());
}
