use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};
use truthguard_core::TruthGuardConfig;

use truthguard_server::http::{self, HttpState};
use truthguard_server::subsystems::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "truthguard.toml")]
    config: String,

    /// Run the pipeline once, print the verdicts as JSON and exit
    #[arg(long)]
    once: bool,

    /// Feed community to read (overrides `[feed] community`)
    #[arg(long)]
    source: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present; production sets real env vars
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let mut config = match TruthGuardConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if let Some(source) = args.source {
        config.feed.community = source;
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let pipeline = match Pipeline::from_config(&config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("Failed to build pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    if args.once {
        let records = pipeline
            .run_with_cancel(&config.feed.community, &shutdown)
            .await?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let state = Arc::new(HttpState {
        pipeline,
        config,
        shutdown,
    });
    http::start_http_server(state).await?;

    Ok(())
}
