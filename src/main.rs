use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use frontend_tester::cli::commands::{cmd_analyze, cmd_generate, cmd_init};
use frontend_tester::cli::config::{Cli, Commands, EnvOverrides, load_config, resolve_config};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("frontend_tester={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Resolve settings: CLI > config file > env > defaults
    let file = load_config(cli.config.as_deref())?;
    let config = resolve_config(&cli, &file, &EnvOverrides::from_env())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight flows");
            on_signal.cancel();
        }
    });

    match &cli.command {
        Commands::Analyze { url, markup } => {
            cmd_analyze(&config, url, markup.as_deref()).await?;
        }
        Commands::Generate {
            url,
            analysis,
            markup,
            workers,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.workers = (*workers).max(1);
            }
            let all_written =
                cmd_generate(&config, url, analysis.as_deref(), markup.as_deref(), &cancel).await?;
            if !all_written {
                std::process::exit(1);
            }
        }
        Commands::Init => cmd_init(&config)?,
    }

    Ok(())
}
