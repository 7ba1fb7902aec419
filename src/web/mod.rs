//! HTTP/WebSocket ingress surface: admin API, health checks, the gateway's
//! main dispatch handler, and the Tower middleware stack wrapping all of it.

pub mod admin;
pub mod gateway_handler;
pub mod health;
pub mod middleware;
pub mod router;

pub use router::create_router;
