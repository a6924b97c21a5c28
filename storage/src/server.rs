//! Storage server lifecycle: bind the two skeletons, announce the local file
//! inventory to the naming server, drop whatever it rejects as duplicate,
//! and prune the directories that emptied out.

use crate::fs::{self, LocalStore};
use common::proto::{Command, CommandApi, CommandStub, RegistrationStub, StorageApi, StorageStub};
use common::rpc::Skeleton;
use common::DfsError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct StorageServer {
    store: Arc<LocalStore>,
    storage_skeleton: Skeleton<StorageApi>,
    command_skeleton: Skeleton<CommandApi>,
    storage_stub: StorageStub,
    command_stub: CommandStub,
}

impl StorageServer {
    /// Starts the server rooted at `root` and registers it with the naming
    /// server. `host` is the externally visible address carried by the stubs
    /// handed to the naming server; ports of 0 bind ephemerally.
    pub async fn start(
        root: PathBuf,
        host: IpAddr,
        storage_port: u16,
        command_port: u16,
        naming: &RegistrationStub,
    ) -> Result<Self, DfsError> {
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|_| DfsError::FileNotFound(root.display().to_string()))?;
        if !metadata.is_dir() {
            return Err(DfsError::FileNotFound(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let store = Arc::new(LocalStore::new(root.clone()));
        let bind = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let storage_skeleton: Skeleton<StorageApi> =
            Skeleton::bind(store.clone(), SocketAddr::new(bind, storage_port)).await?;
        let command_skeleton: Skeleton<CommandApi> =
            Skeleton::bind(store.clone(), SocketAddr::new(bind, command_port)).await?;

        let storage_stub =
            StorageStub::new(SocketAddr::new(host, storage_skeleton.local_addr().port()));
        let command_stub =
            CommandStub::new(SocketAddr::new(host, command_skeleton.local_addr().port()));

        let inventory = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || fs::enumerate(&root))
                .await
                .map_err(|err| DfsError::Io(err.to_string()))??
        };
        info!(
            root = %root.display(),
            files = inventory.len(),
            storage = %storage_stub.addr(),
            command = %command_stub.addr(),
            "registering with naming server"
        );

        let duplicates = naming
            .register(storage_stub.clone(), command_stub.clone(), inventory)
            .await?;

        // The naming server already knows these paths; our copies are stale.
        for path in &duplicates {
            match store.delete(path).await {
                Ok(true) => {}
                Ok(false) => warn!(%path, "duplicate already absent locally"),
                Err(err) => warn!(%path, "failed to delete duplicate: {err}"),
            }
        }
        {
            let root = root.clone();
            tokio::task::spawn_blocking(move || fs::prune_empty_dirs(&root))
                .await
                .map_err(|err| DfsError::Io(err.to_string()))??;
        }

        info!(dropped = duplicates.len(), "storage server registered");
        Ok(StorageServer {
            store,
            storage_skeleton,
            command_skeleton,
            storage_stub,
            command_stub,
        })
    }

    pub fn storage_stub(&self) -> &StorageStub {
        &self.storage_stub
    }

    pub fn command_stub(&self) -> &CommandStub {
        &self.command_stub
    }

    pub fn root(&self) -> &std::path::Path {
        self.store.root()
    }

    /// Stops accepting connections on both interfaces. In-flight requests
    /// run to completion.
    pub fn stop(&self) {
        self.storage_skeleton.stop();
        self.command_skeleton.stop();
    }
}
