use aussie_gateway::app::App;
use aussie_gateway::cli::Args;
use aussie_gateway::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    setup_logging(args.tracing);

    let app = match App::new(&args) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("failed to initialize application: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    app.run().await
}
