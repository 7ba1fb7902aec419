//! Logging setup. Pretty or JSON output, selected from the CLI flag;
//! `tracing_subscriber`'s stock layers cover both without a hand-rolled
//! `FormatEvent` impl.

use crate::cli::TracingFormat;
use tracing_subscriber::EnvFilter;

pub fn setup_logging(tracing_format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,aussie_gateway=info"));

    let subscriber = tracing_subscriber::fmt().with_target(true).with_env_filter(filter);

    match tracing_format {
        TracingFormat::Pretty => subscriber.pretty().init(),
        TracingFormat::Json => subscriber.json().init(),
    }
}
