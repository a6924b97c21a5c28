//! In-process cluster setup shared by the integration suites: a naming
//! server and any number of storage servers on ephemeral loopback ports,
//! each rooted in its own temporary directory.

#![allow(dead_code)]

use common::proto::{RegistrationStub, ServiceStub};
use common::Path;
use naming::NamingServer;
use std::net::{IpAddr, Ipv4Addr};
use storage::StorageServer;
use tempfile::TempDir;

pub fn p(s: &str) -> Path {
    s.parse().unwrap()
}

pub async fn start_naming() -> NamingServer {
    NamingServer::start("127.0.0.1:0".parse().unwrap(), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap()
}

pub fn service(naming: &NamingServer) -> ServiceStub {
    naming.service_stub()
}

/// Starts a storage server seeded with `files` and registers it.
pub async fn start_storage(
    naming: &NamingServer,
    files: &[(&str, &[u8])],
) -> (StorageServer, TempDir) {
    let dir = TempDir::new().unwrap();
    for (path, contents) in files {
        let local = p(path).to_local(dir.path());
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(local, contents).unwrap();
    }

    let registration = RegistrationStub::new(naming.registration_addr());
    let server = StorageServer::start(
        dir.path().to_path_buf(),
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        0,
        0,
        &registration,
    )
    .await
    .unwrap();
    (server, dir)
}
