use std::sync::Arc;

use signal_relay::api;
use signal_relay::config::{Config, LogFormat};
use signal_relay::{RelayServer, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.logging.format);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        max_clients = ?config.rooms.max_clients,
        stun_servers = config.ice.stun_servers.len(),
        turn_servers = config.ice.turn_servers.len(),
        "Starting signaling relay"
    );

    let server = Arc::new(RelayServer::new(config.rooms.clone(), config.ice.clone()));

    warp::serve(api::routes::routes(server))
        .run(config.bind_address())
        .await;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
