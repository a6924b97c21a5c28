//! The four remote interfaces of the filesystem and their wire encodings.
//!
//! Each interface is a marker type implementing [`RemoteInterface`] with a
//! request enum (one variant per operation) and a reply enum; the response
//! on the wire is `Result<Reply, DfsError>`. Server implementations provide
//! the corresponding trait (`Service`, `Registration`, `Storage`, `Command`)
//! and get the [`Dispatch`] wiring for free; clients go through the typed
//! stubs, which fold transport faults into [`DfsError::Remote`].

use crate::error::{DfsError, RpcError};
use crate::path::Path;
use crate::rpc::{Dispatch, RemoteInterface, Stub};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

fn unexpected<T: fmt::Debug>(reply: T) -> DfsError {
    RpcError::Protocol(format!("unexpected reply: {reply:?}")).into()
}

// ---------------------------------------------------------------------------
// Service: the naming server's client-facing interface.

pub enum ServiceApi {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceRequest {
    IsDirectory { path: Path },
    List { path: Path },
    CreateFile { path: Path },
    CreateDirectory { path: Path },
    Delete { path: Path },
    GetStorage { path: Path },
    Lock { path: Path, exclusive: bool },
    Unlock { path: Path, exclusive: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceReply {
    Flag(bool),
    Entries(Vec<String>),
    Storage(StorageStub),
    Done,
}

impl RemoteInterface for ServiceApi {
    const NAME: &'static str = "service";
    type Request = ServiceRequest;
    type Response = Result<ServiceReply, DfsError>;
}

/// The naming server's directory and locking operations.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    async fn is_directory(&self, path: &Path) -> Result<bool, DfsError>;
    async fn list(&self, path: &Path) -> Result<Vec<String>, DfsError>;
    async fn create_file(&self, path: &Path) -> Result<bool, DfsError>;
    async fn create_directory(&self, path: &Path) -> Result<bool, DfsError>;
    async fn delete(&self, path: &Path) -> Result<bool, DfsError>;
    async fn get_storage(&self, path: &Path) -> Result<StorageStub, DfsError>;
    async fn lock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError>;
    async fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError>;
}

#[async_trait]
impl<T: Service> Dispatch<ServiceApi> for T {
    async fn dispatch(&self, request: ServiceRequest) -> Result<ServiceReply, DfsError> {
        match request {
            ServiceRequest::IsDirectory { path } => {
                self.is_directory(&path).await.map(ServiceReply::Flag)
            }
            ServiceRequest::List { path } => self.list(&path).await.map(ServiceReply::Entries),
            ServiceRequest::CreateFile { path } => {
                self.create_file(&path).await.map(ServiceReply::Flag)
            }
            ServiceRequest::CreateDirectory { path } => {
                self.create_directory(&path).await.map(ServiceReply::Flag)
            }
            ServiceRequest::Delete { path } => self.delete(&path).await.map(ServiceReply::Flag),
            ServiceRequest::GetStorage { path } => {
                self.get_storage(&path).await.map(ServiceReply::Storage)
            }
            ServiceRequest::Lock { path, exclusive } => {
                self.lock(&path, exclusive).await.map(|()| ServiceReply::Done)
            }
            ServiceRequest::Unlock { path, exclusive } => {
                self.unlock(&path, exclusive).await.map(|()| ServiceReply::Done)
            }
        }
    }
}

/// Client proxy for [`Service`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceStub {
    stub: Stub<ServiceApi>,
}

impl ServiceStub {
    pub fn new(addr: SocketAddr) -> Self {
        ServiceStub { stub: Stub::new(addr) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.stub.addr()
    }

    pub async fn is_directory(&self, path: &Path) -> Result<bool, DfsError> {
        match self.stub.call(ServiceRequest::IsDirectory { path: path.clone() }).await?? {
            ServiceReply::Flag(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>, DfsError> {
        match self.stub.call(ServiceRequest::List { path: path.clone() }).await?? {
            ServiceReply::Entries(names) => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create_file(&self, path: &Path) -> Result<bool, DfsError> {
        match self.stub.call(ServiceRequest::CreateFile { path: path.clone() }).await?? {
            ServiceReply::Flag(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create_directory(&self, path: &Path) -> Result<bool, DfsError> {
        match self
            .stub
            .call(ServiceRequest::CreateDirectory { path: path.clone() })
            .await??
        {
            ServiceReply::Flag(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, DfsError> {
        match self.stub.call(ServiceRequest::Delete { path: path.clone() }).await?? {
            ServiceReply::Flag(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_storage(&self, path: &Path) -> Result<StorageStub, DfsError> {
        match self.stub.call(ServiceRequest::GetStorage { path: path.clone() }).await?? {
            ServiceReply::Storage(stub) => Ok(stub),
            other => Err(unexpected(other)),
        }
    }

    pub async fn lock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError> {
        match self
            .stub
            .call(ServiceRequest::Lock { path: path.clone(), exclusive })
            .await??
        {
            ServiceReply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), DfsError> {
        match self
            .stub
            .call(ServiceRequest::Unlock { path: path.clone(), exclusive })
            .await??
        {
            ServiceReply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Registration: how storage servers announce themselves.

pub enum RegistrationApi {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationRequest {
    Register { storage: StorageStub, command: CommandStub, paths: Vec<Path> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationReply {
    Duplicates(Vec<Path>),
}

impl RemoteInterface for RegistrationApi {
    const NAME: &'static str = "registration";
    type Request = RegistrationRequest;
    type Response = Result<RegistrationReply, DfsError>;
}

/// The naming server's registration entry point.
#[async_trait]
pub trait Registration: Send + Sync + 'static {
    /// Registers a storage server and reconciles its file inventory.
    /// Returns the paths the caller must delete locally.
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        paths: Vec<Path>,
    ) -> Result<Vec<Path>, DfsError>;
}

#[async_trait]
impl<T: Registration> Dispatch<RegistrationApi> for T {
    async fn dispatch(&self, request: RegistrationRequest) -> Result<RegistrationReply, DfsError> {
        match request {
            RegistrationRequest::Register { storage, command, paths } => self
                .register(storage, command, paths)
                .await
                .map(RegistrationReply::Duplicates),
        }
    }
}

/// Client proxy for [`Registration`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationStub {
    stub: Stub<RegistrationApi>,
}

impl RegistrationStub {
    pub fn new(addr: SocketAddr) -> Self {
        RegistrationStub { stub: Stub::new(addr) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.stub.addr()
    }

    pub async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        paths: Vec<Path>,
    ) -> Result<Vec<Path>, DfsError> {
        match self
            .stub
            .call(RegistrationRequest::Register { storage, command, paths })
            .await??
        {
            RegistrationReply::Duplicates(paths) => Ok(paths),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage: the data plane served by each storage server.

pub enum StorageApi {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageRequest {
    Size { path: Path },
    Read { path: Path, offset: u64, length: u32 },
    Write { path: Path, offset: u64, data: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageReply {
    Size(u64),
    Data(Vec<u8>),
    Written,
}

impl RemoteInterface for StorageApi {
    const NAME: &'static str = "storage";
    type Request = StorageRequest;
    type Response = Result<StorageReply, DfsError>;
}

/// Byte-level file access under a storage server's root.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn size(&self, path: &Path) -> Result<u64, DfsError>;
    async fn read(&self, path: &Path, offset: u64, length: u32) -> Result<Vec<u8>, DfsError>;
    async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<(), DfsError>;
}

#[async_trait]
impl<T: Storage> Dispatch<StorageApi> for T {
    async fn dispatch(&self, request: StorageRequest) -> Result<StorageReply, DfsError> {
        match request {
            StorageRequest::Size { path } => self.size(&path).await.map(StorageReply::Size),
            StorageRequest::Read { path, offset, length } => {
                self.read(&path, offset, length).await.map(StorageReply::Data)
            }
            StorageRequest::Write { path, offset, data } => {
                self.write(&path, offset, data).await.map(|()| StorageReply::Written)
            }
        }
    }
}

/// Client proxy for [`Storage`]. Handed out by the naming server and stored
/// in its replica sets, so it is itself part of the wire vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageStub {
    stub: Stub<StorageApi>,
}

impl StorageStub {
    pub fn new(addr: SocketAddr) -> Self {
        StorageStub { stub: Stub::new(addr) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.stub.addr()
    }

    pub async fn size(&self, path: &Path) -> Result<u64, DfsError> {
        match self.stub.call(StorageRequest::Size { path: path.clone() }).await?? {
            StorageReply::Size(size) => Ok(size),
            other => Err(unexpected(other)),
        }
    }

    pub async fn read(&self, path: &Path, offset: u64, length: u32) -> Result<Vec<u8>, DfsError> {
        match self
            .stub
            .call(StorageRequest::Read { path: path.clone(), offset, length })
            .await??
        {
            StorageReply::Data(data) => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    pub async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<(), DfsError> {
        match self
            .stub
            .call(StorageRequest::Write { path: path.clone(), offset, data })
            .await??
        {
            StorageReply::Written => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Command: the control plane the naming server drives on storage servers.

pub enum CommandApi {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandRequest {
    Create { path: Path },
    Delete { path: Path },
    Copy { path: Path, source: StorageStub },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandReply {
    Flag(bool),
}

impl RemoteInterface for CommandApi {
    const NAME: &'static str = "command";
    type Request = CommandRequest;
    type Response = Result<CommandReply, DfsError>;
}

/// File manipulation driven by the naming server.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    async fn create(&self, path: &Path) -> Result<bool, DfsError>;
    async fn delete(&self, path: &Path) -> Result<bool, DfsError>;
    async fn copy(&self, path: &Path, source: &StorageStub) -> Result<bool, DfsError>;
}

#[async_trait]
impl<T: Command> Dispatch<CommandApi> for T {
    async fn dispatch(&self, request: CommandRequest) -> Result<CommandReply, DfsError> {
        match request {
            CommandRequest::Create { path } => self.create(&path).await.map(CommandReply::Flag),
            CommandRequest::Delete { path } => self.delete(&path).await.map(CommandReply::Flag),
            CommandRequest::Copy { path, source } => {
                self.copy(&path, &source).await.map(CommandReply::Flag)
            }
        }
    }
}

/// Client proxy for [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandStub {
    stub: Stub<CommandApi>,
}

impl CommandStub {
    pub fn new(addr: SocketAddr) -> Self {
        CommandStub { stub: Stub::new(addr) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.stub.addr()
    }

    pub async fn create(&self, path: &Path) -> Result<bool, DfsError> {
        match self.stub.call(CommandRequest::Create { path: path.clone() }).await?? {
            CommandReply::Flag(value) => Ok(value),
        }
    }

    pub async fn delete(&self, path: &Path) -> Result<bool, DfsError> {
        match self.stub.call(CommandRequest::Delete { path: path.clone() }).await?? {
            CommandReply::Flag(value) => Ok(value),
        }
    }

    pub async fn copy(&self, path: &Path, source: &StorageStub) -> Result<bool, DfsError> {
        match self
            .stub
            .call(CommandRequest::Copy { path: path.clone(), source: source.clone() })
            .await??
        {
            CommandReply::Flag(value) => Ok(value),
        }
    }
}
