use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use headb::config::{FileConfig, Secrets, ServerConfig, key_lifetime_from_days};
use headb::identity::Identity;
use headb::oauth::GithubClient;
use headb::server::{AppState, create_router};
use headb::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "headb")]
#[command(about = "Identity and permission server for headb", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and database
    Init {
        /// Data directory for the database and config file
        #[arg(long, env = "HEADB_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HEADB_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short, env = "HEADB_PORT")]
        port: Option<u16>,

        /// Data directory for the database and config file
        #[arg(long, env = "HEADB_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,

        /// Base URL of the OAuth provider's device flow endpoints
        /// (e.g. "https://github.com/login")
        #[arg(long)]
        provider_url: Option<String>,

        /// Base URL of the provider's API, used to look up the signed-in user
        /// (e.g. "https://api.github.com")
        #[arg(long)]
        provider_api_url: Option<String>,

        /// How many days an issued API key stays valid
        #[arg(long)]
        key_lifetime_days: Option<i64>,
    },
}

struct ServeArgs {
    host: Option<String>,
    port: Option<u16>,
    data_dir: PathBuf,
    provider_url: Option<String>,
    provider_api_url: Option<String>,
    key_lifetime_days: Option<i64>,
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;

    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };
    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!("Initialized database at {}", db_path.display());
    Ok(())
}

fn resolve_config(args: ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig {
        data_dir: args.data_dir,
        ..ServerConfig::default()
    };
    config.apply(FileConfig::load(&ServerConfig::config_path(&config.data_dir))?)?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.provider_url {
        config.oauth.set_provider_url(&url);
    }
    if let Some(url) = args.provider_api_url {
        config.oauth.set_api_url(&url);
    }
    if let Some(days) = args.key_lifetime_days {
        config.key_lifetime = key_lifetime_from_days(days)?;
    }

    Ok(config)
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = resolve_config(args)?;

    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Server not initialized. Run 'headb init' first to create the database.");
    }

    let secrets = Secrets::from_env()?;

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let provider = GithubClient::new(&secrets.oauth_client_id, config.oauth.clone())?;
    let identity = Identity::new(
        Arc::new(store),
        Arc::new(provider),
        &secrets,
        config.hashing,
        config.key_lifetime,
    )?;

    let state = Arc::new(AppState::new(identity));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("headb=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => run_init(data_dir)?,
        Commands::Serve {
            host,
            port,
            data_dir,
            provider_url,
            provider_api_url,
            key_lifetime_days,
        } => {
            run_serve(ServeArgs {
                host,
                port,
                data_dir,
                provider_url,
                provider_api_url,
                key_lifetime_days,
            })
            .await?;
        }
    }

    Ok(())
}
