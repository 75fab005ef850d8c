use anyhow::Result;
use clap::Parser;

mod cli;

use loghub::{config, init_tracing, server};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start => {
            let cfg = config::load_config(&args.config)?;
            server::start_server(cfg).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => {
                let cfg = config::load_config(&args.config)?;
                println!("{}", serde_json::to_string_pretty(&config::masked(&cfg))?);
            }
            cli::ConfigCommands::Validate => {
                config::load_config(&args.config)?;
                println!("Configuration OK: {}", args.config.display());
            }
        },
        cli::Commands::Version => {
            println!("loghub v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
