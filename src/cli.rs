//! Command-line arguments, parsed with `clap`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "aussie-gateway", about = "API gateway: routing, auth, and rate limiting at the edge")]
pub struct Args {
    /// Optional TOML config file layered over environment-derived defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,

    /// Override `bindAddr`'s port without a config file.
    #[arg(long)]
    pub port: Option<u16>,
}
