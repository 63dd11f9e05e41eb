use std::path::PathBuf;

use clap::Parser;
use deci_server::ServerBuilder;
use deci_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

/// deci: an OpenID Connect identity provider
#[derive(Debug, Parser)]
#[command(name = "deci", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, env = "DECI_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Initialize tracing early with the default level
    deci_server::observability::init_tracing();

    let config_path = cli.config.as_deref().map(|p| p.to_string_lossy().into_owned());
    let cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH),
        "Configuration loaded"
    );
    deci_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
