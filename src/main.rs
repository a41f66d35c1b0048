use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mbee::config::ServerConfig;
use mbee::server::create_router;
use mbee::setup::{self, ADMIN_TOKEN_FILE};

#[derive(Parser)]
#[command(name = "mbee")]
#[command(about = "Model-based engineering collaboration server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory (database, default organization, admin user)
    Init {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Username of the initial system admin
        #[arg(long, default_value = "admin")]
        admin: String,
    },

    /// Start the server
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

fn run_init(config: &ServerConfig, admin: &str) -> anyhow::Result<()> {
    let init = setup::initialize(config, admin)?;

    println!();
    println!("========================================");
    println!("Admin user '{}' token (save this, it won't be shown again):", init.admin);
    println!();
    println!("  {}", init.token);
    println!();
    println!("Token also written to: {}", init.token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mbee=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            config,
            data_dir,
            admin,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            run_init(&config, &admin)?;
        }
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            config.validate()?;

            let token_file = config.data_dir.join(ADMIN_TOKEN_FILE);
            if !token_file.exists() {
                bail!(
                    "Server not initialized. Run 'mbee init' first to create the database and admin user."
                );
            }
            info!("Admin token available at {}", token_file.display());

            let state = Arc::new(setup::open_state(&config)?);
            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
