//! The naming server: `Service` and `Registration` over one shared core.
//!
//! Tree structure and the storage registry live behind a short state mutex
//! that is never held across a suspension point. Lock waits go through the
//! per-node `Arc<NodeLock>`s; entry into the locking protocol is serialized
//! by a single FIFO admission semaphore, which is what keeps writers from
//! being starved by overlapping readers. Outbound storage RPCs (replication,
//! invalidation, deletion) always run with the state mutex released.

use crate::replica;
use crate::tree::{FileMeta, Node, StorageRef, Tree};
use async_trait::async_trait;
use common::proto::{
    CommandStub, Registration, RegistrationApi, Service, ServiceApi, ServiceStub, StorageStub,
};
use common::rpc::Skeleton;
use common::{DfsError, Path, RpcError};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct NamingServer {
    core: Arc<NamingCore>,
    service_skeleton: Skeleton<ServiceApi>,
    registration_skeleton: Skeleton<RegistrationApi>,
}

struct NamingCore {
    state: Mutex<State>,
    /// Fair admission gate: one permit, FIFO. Held from admission through
    /// leaf acquisition, released before replication I/O.
    admission: Semaphore,
}

struct State {
    tree: Tree,
    registry: Vec<StorageRef>,
}

impl NamingServer {
    /// Binds the `Service` and `Registration` skeletons, both dispatching to
    /// the same core.
    pub async fn start(
        service_addr: SocketAddr,
        registration_addr: SocketAddr,
    ) -> Result<Self, RpcError> {
        let core = Arc::new(NamingCore {
            state: Mutex::new(State { tree: Tree::new(), registry: Vec::new() }),
            admission: Semaphore::new(1),
        });

        let service_skeleton: Skeleton<ServiceApi> =
            Skeleton::bind(core.clone(), service_addr).await?;
        let registration_skeleton: Skeleton<RegistrationApi> =
            Skeleton::bind(core.clone(), registration_addr).await?;
        info!(
            service = %service_skeleton.local_addr(),
            registration = %registration_skeleton.local_addr(),
            "naming server started"
        );

        Ok(NamingServer { core, service_skeleton, registration_skeleton })
    }

    pub fn service_addr(&self) -> SocketAddr {
        self.service_skeleton.local_addr()
    }

    pub fn registration_addr(&self) -> SocketAddr {
        self.registration_skeleton.local_addr()
    }

    /// A client stub for this server's bound service address.
    pub fn service_stub(&self) -> ServiceStub {
        ServiceStub::new(self.service_addr())
    }

    /// How many readable replicas a file currently has, if it exists.
    pub fn replica_count(&self, path: &Path) -> Option<usize> {
        let state = self.core.state.lock().unwrap();
        state.tree.file_meta(path).map(|meta| meta.replicas.len())
    }

    /// Stops both skeletons. In-flight operations run to completion.
    pub fn stop(&self) {
        self.service_skeleton.stop();
        self.registration_skeleton.stop();
    }
}

impl NamingCore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Runs one planned replica installation, promoting each target from
    /// pending to replica as its copy lands. On a transport failure the
    /// remaining pending reservations are dropped and the error propagates.
    async fn install_replicas(
        &self,
        path: &Path,
        source: &StorageStub,
        targets: &[StorageRef],
    ) -> Result<(), DfsError> {
        for target in targets {
            let result = target.command.copy(path, source).await;

            let mut state = self.state();
            let Some(meta) = state.tree.file_meta_mut(path) else {
                return Ok(());
            };
            meta.pending.retain(|s| s != target);
            match result {
                Ok(true) => {
                    meta.replicas.push(target.clone());
                    info!(%path, server = %target.storage.addr(), "installed replica");
                }
                Ok(false) => {
                    warn!(%path, server = %target.storage.addr(), "replica copy refused");
                }
                Err(err) => {
                    meta.pending.retain(|s| !targets.contains(s));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Invalidates every replica of `path` other than `primary` by deleting
    /// it remotely. Replicas whose deletion fails stay in the set; the first
    /// failure is reported once the caller finishes releasing locks.
    async fn invalidate_stale(&self, path: &Path, stale: Vec<StorageRef>) -> Option<DfsError> {
        let mut failure = None;
        for server in stale {
            match server.command.delete(path).await {
                Ok(_) => {
                    let mut state = self.state();
                    if let Some(meta) = state.tree.file_meta_mut(path) {
                        meta.replicas.retain(|s| s != &server);
                    }
                    info!(%path, server = %server.storage.addr(), "invalidated stale replica");
                }
                Err(err) => {
                    warn!(%path, server = %server.storage.addr(), "invalidation failed: {err}");
                    failure.get_or_insert(err);
                }
            }
        }
        failure
    }
}

#[async_trait]
impl Service for NamingCore {
    async fn is_directory(&self, path: &Path) -> Result<bool, DfsError> {
        let state = self.state();
        match state.tree.resolve(path) {
            Some(node) => Ok(node.is_directory()),
            None => Err(DfsError::not_found(path)),
        }
    }

    async fn list(&self, path: &Path) -> Result<Vec<String>, DfsError> {
        let state = self.state();
        state.tree.list(path).ok_or_else(|| DfsError::not_found(path))
    }

    async fn create_file(&self, path: &Path) -> Result<bool, DfsError> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };

        let origin = {
            let state = self.state();
            if state.tree.resolve(path).is_some() {
                return Ok(false);
            }
            match state.tree.resolve(&parent) {
                Some(node) if node.is_directory() => {}
                _ => return Err(DfsError::not_found(&parent)),
            }
            if state.registry.is_empty() {
                return Err(DfsError::IllegalState("no storage servers registered".to_string()));
            }
            let pick = rand::rng().random_range(0..state.registry.len());
            state.registry[pick].clone()
        };

        // Materialize the file on its storage server before exposing it.
        if !origin.command.create(path).await? {
            warn!(%path, server = %origin.storage.addr(), "storage server refused create");
            return Ok(false);
        }

        let mut state = self.state();
        Ok(state.tree.insert(path, Node::file(FileMeta::new(origin))))
    }

    async fn create_directory(&self, path: &Path) -> Result<bool, DfsError> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };

        let mut state = self.state();
        if state.tree.resolve(path).is_some() {
            return Ok(false);
        }
        match state.tree.resolve(&parent) {
            Some(node) if node.is_directory() => {}
            _ => return Err(DfsError::not_found(&parent)),
        }
        Ok(state.tree.insert(path, Node::directory()))
    }

    async fn delete(&self, path: &Path) -> Result<bool, DfsError> {
        if path.is_root() {
            return Ok(false);
        }

        enum Plan {
            // Replica holders of the removed file.
            File(Vec<CommandStub>),
            // Directories may have files anywhere: every server drops the prefix.
            Directory(Vec<CommandStub>),
        }

        let plan = {
            let mut state = self.state();
            let Some(node) = state.tree.resolve(path) else {
                return Err(DfsError::not_found(path));
            };
            if node.is_directory() {
                Plan::Directory(state.registry.iter().map(|s| s.command.clone()).collect())
            } else {
                let Some(meta) = state.tree.file_meta(path) else {
                    return Err(DfsError::not_found(path));
                };
                let stubs = meta.replicas.iter().map(|s| s.command.clone()).collect();
                state.tree.remove(path);
                Plan::File(stubs)
            }
        };

        match plan {
            Plan::File(stubs) => {
                let mut ok = true;
                for stub in stubs {
                    match stub.delete(path).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(%path, server = %stub.addr(), "replica missing on delete");
                            ok = false;
                        }
                        Err(err) => {
                            warn!(%path, server = %stub.addr(), "replica delete failed: {err}");
                            ok = false;
                        }
                    }
                }
                Ok(ok)
            }
            Plan::Directory(stubs) => {
                let mut ok = true;
                for stub in stubs {
                    // A server with no files under the prefix answers false;
                    // only transport faults count as failure.
                    if let Err(err) = stub.delete(path).await {
                        warn!(%path, server = %stub.addr(), "prefix delete failed: {err}");
                        ok = false;
                    }
                }
                let mut state = self.state();
                state.tree.remove(path);
                Ok(ok)
            }
        }
    }

    async fn get_storage(&self, path: &Path) -> Result<StorageStub, DfsError> {
        let mut state = self.state();
        let Some(meta) = state.tree.file_meta_mut(path) else {
            return Err(DfsError::not_found(path));
        };
        let pick = rand::rng().random_range(0..meta.replicas.len());
        let choice = meta.replicas[pick].clone();
        meta.primary = choice.clone();
        Ok(choice.storage)
    }

    async fn lock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError> {
        let admission = self
            .admission
            .acquire()
            .await
            .map_err(|_| DfsError::IllegalState("admission gate closed".to_string()))?;

        let (chain, is_file) = {
            let state = self.state();
            let Some(chain) = state.tree.lock_chain(path) else {
                return Err(DfsError::not_found(path));
            };
            let is_file = state.tree.resolve(path).is_some_and(|node| !node.is_directory());
            (chain, is_file)
        };

        chain.acquire(exclusive).await?;

        // Read pressure is accounted and replication targets are reserved
        // inside the admission window, where lock calls are serialized.
        let plan = if !exclusive && is_file {
            let mut state = self.state();
            let State { tree, registry } = &mut *state;
            tree.file_meta_mut(path).and_then(|meta| {
                replica::note_read(meta);
                let targets = replica::plan_replication(meta, registry);
                if targets.is_empty() {
                    None
                } else {
                    // Copy from the longest-held replica.
                    Some((meta.replicas[0].storage.clone(), targets))
                }
            })
        } else {
            None
        };

        drop(admission);

        if let Some((source, targets)) = plan {
            if let Err(err) = self.install_replicas(path, &source, &targets).await {
                chain.release(exclusive).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError> {
        let (chain, stale) = {
            let state = self.state();
            let Some(chain) = state.tree.lock_chain(path) else {
                return Err(DfsError::InvalidArgument(format!("unlock of unknown path {path}")));
            };
            let stale = if exclusive {
                state.tree.file_meta(path).map(|meta| {
                    meta.replicas
                        .iter()
                        .filter(|s| **s != meta.primary)
                        .cloned()
                        .collect::<Vec<_>>()
                })
            } else {
                None
            };
            (chain, stale)
        };

        // The writer's replica becomes canonical while the exclusive lock is
        // still held, so no reader can observe a stale copy.
        let failure = match stale {
            Some(stale) if !stale.is_empty() => self.invalidate_stale(path, stale).await,
            _ => None,
        };

        chain.release(exclusive).await;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Registration for NamingCore {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        paths: Vec<Path>,
    ) -> Result<Vec<Path>, DfsError> {
        let descriptor = StorageRef { storage, command };

        let mut state = self.state();
        if state.registry.contains(&descriptor) {
            return Err(DfsError::IllegalState("storage server already registered".to_string()));
        }
        state.registry.push(descriptor.clone());

        let announced = paths.len();
        let mut duplicates = Vec::new();
        for path in paths {
            if path.is_root() {
                continue;
            }
            if state.tree.resolve(&path).is_some() {
                duplicates.push(path);
            } else if !state.tree.insert_absorbed_file(&path, descriptor.clone()) {
                warn!(%path, "announced path conflicts with the tree; ignoring");
            }
        }

        info!(
            server = %descriptor.storage.addr(),
            announced,
            duplicates = duplicates.len(),
            "storage server registered"
        );
        Ok(duplicates)
    }
}
