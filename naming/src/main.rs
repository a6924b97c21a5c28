use clap::Parser;
use common::{REGISTRATION_PORT, SERVICE_PORT};
use naming::NamingServer;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::info;

#[derive(Parser)]
#[command(name = "naming", version, about = "Distributed filesystem naming server")]
struct Cli {
    /// Port for the client-facing Service interface.
    #[arg(long, default_value_t = SERVICE_PORT)]
    service_port: u16,

    /// Port for storage-server registration.
    #[arg(long, default_value_t = REGISTRATION_PORT)]
    registration_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "naming=info,common=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let bind = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let server = NamingServer::start(
        SocketAddr::new(bind, cli.service_port),
        SocketAddr::new(bind, cli.registration_port),
    )
    .await?;

    info!("naming server running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    server.stop();
    Ok(())
}
