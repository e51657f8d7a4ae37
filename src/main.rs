use clap::Parser;
use rhkd::cli::Cli;
use rhkd::daemon;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = Cli::parse().into_options();

    if let Err(e) = daemon::run(options).await {
        tracing::error!(error = %e, "daemon failed");
        eprintln!("rhkd: {e}");
        std::process::exit(1);
    }
}
