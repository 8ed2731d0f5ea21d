use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formulate", about = "Natural-language to spreadsheet formula service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the pages and the solution socket.
    Serve {
        #[arg(long, default_value = "./config/formulate.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => {
            let cfg = formulate_config::load_and_validate(&config)
                .with_context(|| format!("failed to load config {config}"))?;
            let api_key = formulate_config::resolve_api_key(&cfg.completion)?;
            tracing::info!(
                max_length = cfg.requests.max_length,
                building_data = cfg.requests.building_data,
                model = %cfg.completion.model,
                "configuration loaded"
            );
            formulate_server::serve(cfg, api_key)
                .await
                .map_err(|e| anyhow::anyhow!("server exited with error: {e}"))
        }
    }
}
