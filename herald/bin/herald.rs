use std::path::PathBuf;

use clap::Parser;
use herald::Herald;
use herald_common::logging;

/// Dispatch a batch of messages through mock providers and print the status log
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of messages to submit
    #[arg(short, long, default_value_t = 3)]
    messages: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let herald = match find_config_file(cli.config)? {
        Some(path) => Herald::load(&path)?,
        None => Herald::default(),
    };

    for event in herald.run(cli.messages).await? {
        println!("{event}");
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `HERALD_CONFIG` environment variable
/// 3. ./herald.config.toml (current working directory)
///
/// Without any of these the built-in defaults are used.
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path));
    }

    if let Ok(env_path) = std::env::var("HERALD_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "HERALD_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let local = PathBuf::from("./herald.config.toml");
    Ok(local.exists().then_some(local))
}
