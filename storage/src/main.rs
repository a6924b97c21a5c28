use clap::Parser;
use common::proto::RegistrationStub;
use common::REGISTRATION_PORT;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use storage::StorageServer;
use tracing::info;

#[derive(Parser)]
#[command(name = "storage", version, about = "Distributed filesystem storage server")]
struct Cli {
    /// Local directory whose contents are served.
    #[arg(long, value_name = "DIR")]
    root: PathBuf,

    /// Naming server registration endpoint.
    #[arg(long, value_name = "HOST:PORT",
          default_value_t = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), REGISTRATION_PORT))]
    naming: SocketAddr,

    /// Externally visible address advertised in this server's stubs.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,

    /// Data-plane port (0 for system-chosen).
    #[arg(long, default_value_t = 0)]
    storage_port: u16,

    /// Control-plane port (0 for system-chosen).
    #[arg(long, default_value_t = 0)]
    command_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "storage=info,common=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let naming = RegistrationStub::new(cli.naming);
    let server = StorageServer::start(
        cli.root,
        cli.host,
        cli.storage_port,
        cli.command_port,
        &naming,
    )
    .await?;

    info!(
        storage = %server.storage_stub().addr(),
        command = %server.command_stub().addr(),
        "storage server running; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    server.stop();
    Ok(())
}
