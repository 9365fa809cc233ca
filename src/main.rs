// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yolo_web::cli::args::{Cli, Commands};
use yolo_web::cli::predict::run_prediction;
use yolo_web::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(config) => server::serve(config).await?,
        Commands::Predict(args) => {
            if let Err(e) = run_prediction(&args).await {
                yolo_web::error!("{e}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
