use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use weft_runner::{Cli, config::RunnerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RunnerConfig::from_env() {
        Ok(config) => config,
        Err(report) => {
            eprintln!("{report}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match weft_runner::run(&cli, &config).await {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if outcome.failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(report) => {
            tracing::error!(error = %report, "runner failed");
            ExitCode::from(2)
        }
    }
}
