pub mod routes;
pub mod websocket;
