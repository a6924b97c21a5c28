//! Shared wire types for the distributed filesystem: paths, errors, the RPC
//! substrate, and the four remote interfaces exposed by the naming and
//! storage servers.

pub mod error;
pub mod path;
pub mod proto;
pub mod rpc;

pub use error::{DfsError, RpcError};
pub use path::Path;
pub use proto::{
    Command, CommandStub, Registration, RegistrationStub, Service, ServiceStub, Storage,
    StorageStub,
};
pub use rpc::{Skeleton, Stub};

/// Well-known port for the naming server's client-facing `Service` interface.
pub const SERVICE_PORT: u16 = 6000;

/// Well-known port for the naming server's `Registration` interface.
pub const REGISTRATION_PORT: u16 = 6001;
