use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gemini-relay")]
#[command(about = "Relay a Telegram counterpart's messages to a Gemini conversation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a config template (default: RELAY_CONFIG_PATH or ~/.relay/config.json) if none exists.
    Init {
        /// Config file path
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay until Ctrl+C or SIGTERM. Values from the environment (and a .env file) override the config file.
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Env file to load (default: .env in the current directory or a parent, if present)
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },

    /// Load and validate configuration without connecting to anything.
    Check {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Env file to load
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("gemini-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, env_file }) => {
            if let Err(e) = run_relay(config, env_file).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config, env_file }) => {
            match load_settings(config, env_file) {
                Ok(settings) => println!(
                    "configuration ok: model {}, counterpart {}, session {}",
                    settings.gemini_model, settings.target_user_id, settings.session_name
                ),
                Err(e) => {
                    log::error!("configuration invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    if relay::config::write_template(&path)? {
        println!("wrote config template to {}", path.display());
    } else {
        println!("config already exists at {}", path.display());
    }
    Ok(())
}

fn load_settings(
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
) -> anyhow::Result<relay::config::RelaySettings> {
    relay::config::load_env_file(env_file.as_deref())?;
    let (config, path) = relay::config::load_config(config_path)?;
    log::debug!("configuration loaded from {}", path.display());
    config.validate()
}

async fn run_relay(config_path: Option<PathBuf>, env_file: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = load_settings(config_path, env_file)?;
    relay::bot::run_bot(settings).await
}
