use std::sync::Arc;
use warp::Filter;

use super::websocket;
use crate::signal::RelayServer;

/// Every HTTP and WebSocket route the relay serves
pub fn routes(
    server: Arc<RelayServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    signal_websocket_route(server.clone())
        .or(health_check(server.clone()))
        .or(config_endpoint(server))
}

pub fn signal_websocket_route(
    server: Arc<RelayServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("signal")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_server(server))
        .map(|ws: warp::ws::Ws, server: Arc<RelayServer>| {
            ws.on_upgrade(move |websocket| websocket::handle_signal_websocket(websocket, server))
        })
}

pub fn health_check(
    server: Arc<RelayServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("signal")
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .then(|server: Arc<RelayServer>| async move {
            let stats = server.stats().await;
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Signaling Relay",
                "version": env!("CARGO_PKG_VERSION"),
                "clients": stats.clients,
                "rooms": stats.rooms,
                "pending": stats.pending
            }))
        })
}

/// ICE servers and room limits. TURN secrets stay on the server.
pub fn config_endpoint(
    server: Arc<RelayServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("signal")
        .and(warp::path("config"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .map(|server: Arc<RelayServer>| {
            let ice = server.ice();
            let turn_urls: Vec<&str> = ice.turn_servers.iter().map(|t| t.url.as_str()).collect();

            warp::reply::json(&serde_json::json!({
                "stunServers": ice.stun_servers,
                "turnServers": turn_urls,
                "maxClients": server.capacity()
            }))
        })
}

fn with_server(
    server: Arc<RelayServer>,
) -> impl Filter<Extract = (Arc<RelayServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}
