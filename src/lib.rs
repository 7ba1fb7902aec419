//! Library crate backing the `aussie-gateway` binary, split out so
//! integration tests can exercise the router and components directly
//! (`tower::ServiceExt::oneshot`) without spawning a real listener.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod logging;
pub mod primitives;
pub mod problem;
pub mod proxy;
pub mod ratelimit;
pub mod registry;
pub mod state;
pub mod telemetry;
pub mod web;
pub mod wsgateway;
