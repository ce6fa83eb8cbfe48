use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hypertrader_core::ConfigLoader;
use hypertrader_directory::UserDirectory;
use hypertrader_exchange_hyperliquid::HyperliquidClient;
use hypertrader_supervisor::{SupervisorSettings, WorkerSupervisor};
use hypertrader_telegram::CommandRouter;
use hypertrader_user_config::UserConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "hypertrader")]
#[command(about = "Multi-user Hyperliquid trading manager", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the manager daemon (Telegram front end + worker supervision)
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Hypertrader.toml")]
        config: String,
        /// Shared worker config template (JSON)
        #[arg(long, default_value = "config/base_config.json")]
        template: PathBuf,
        /// Root directory for per-user working directories
        #[arg(long, default_value = "user_data")]
        user_data_dir: PathBuf,
        /// Use the exchange testnet endpoints
        #[arg(long)]
        testnet: bool,
        /// Telegram bot token (overrides the config file)
        #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Extra admin chat ids, comma separated
        #[arg(long, env = "ADMIN_USER_IDS", value_delimiter = ',')]
        admin_ids: Vec<i64>,
    },
    /// Validate the config file and worker template, then exit
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Hypertrader.toml")]
        config: String,
        /// Shared worker config template (JSON)
        #[arg(long, default_value = "config/base_config.json")]
        template: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            template,
            user_data_dir,
            testnet,
            token,
            admin_ids,
        } => {
            run_manager(&config, template, user_data_dir, testnet, token, admin_ids).await?;
        }
        Commands::CheckConfig { config, template } => {
            check_config(&config, &template)?;
        }
    }

    Ok(())
}

async fn run_manager(
    config_path: &str,
    template: PathBuf,
    user_data_dir: PathBuf,
    testnet: bool,
    token_override: Option<String>,
    extra_admin_ids: Vec<i64>,
) -> Result<()> {
    tracing::info!("Starting manager daemon with config: {}", config_path);

    let config = ConfigLoader::load_from(config_path)?;

    let token = token_override
        .or_else(|| config.telegram.token.clone())
        .context("no Telegram bot token: set TELEGRAM_BOT_TOKEN or telegram.token")?;

    let mut admin_ids = config.telegram.admin_ids.clone();
    for id in extra_admin_ids {
        if !admin_ids.contains(&id) {
            admin_ids.push(id);
        }
    }

    let api_url = config.hyperliquid.resolve_url(testnet).to_string();
    if testnet {
        tracing::info!("Using testnet exchange API: {}", api_url);
    }

    // Ensure the SQLite parent directory exists before the pool connects.
    ensure_sqlite_dir(&config.directory.database_url)?;

    let directory = UserDirectory::new(
        &config.directory.database_url,
        config.directory.max_connections,
    )
    .await?;
    let configs = UserConfigStore::new(&template, &user_data_dir, &config.worker.strategy_asset)?;
    let supervisor = WorkerSupervisor::new(SupervisorSettings::from_config(
        &config.worker,
        &user_data_dir,
    ));
    let exchange = HyperliquidClient::new(api_url);

    tracing::info!(
        "Known users on disk: {}",
        configs.list_user_ids().len()
    );

    let router = CommandRouter::connect(
        &token,
        directory.clone(),
        configs,
        supervisor.clone(),
        exchange,
        admin_ids,
    )
    .await?;

    let shutdown = Arc::new(Notify::new());
    let router_handle = {
        let router = router.clone();
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            router.run(shutdown).await;
        })
    };

    wait_for_shutdown_signal().await;

    // Shutdown order: workers first, then the router, then the store.
    tracing::info!("Stopping all workers...");
    let results = supervisor.stop_all().await;
    let failed = results.values().filter(|stopped| !**stopped).count();
    if failed > 0 {
        tracing::error!("{} worker(s) failed to stop cleanly", failed);
    }

    shutdown.notify_one();
    if let Err(e) = router_handle.await {
        tracing::error!("Router task ended abnormally: {}", e);
    }

    directory.close().await;
    tracing::info!("Manager daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

fn check_config(config_path: &str, template: &std::path::Path) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    println!("Config OK: {config_path}");
    println!("  worker command:   {}", config.worker.command);
    println!("  default strategy: {}", config.worker.default_strategy);
    println!("  database:         {}", config.directory.database_url);
    println!(
        "  telegram token:   {}",
        if config.telegram.token.is_some() {
            "configured"
        } else {
            "from TELEGRAM_BOT_TOKEN"
        }
    );
    println!("  admin ids:        {:?}", config.telegram.admin_ids);

    let raw = std::fs::read_to_string(template)
        .with_context(|| format!("Failed to read template: {}", template.display()))?;
    let doc: serde_json::Value =
        serde_json::from_str(&raw).context("Template is not valid JSON")?;
    let pairs = doc
        .pointer("/exchange/pair_whitelist")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len);
    println!("Template OK: {} ({} pairs)", template.display(), pairs);

    Ok(())
}

fn ensure_sqlite_dir(database_url: &str) -> Result<()> {
    if let Some(file_path) = database_url.strip_prefix("sqlite://") {
        let file_path = file_path.split('?').next().unwrap_or(file_path);
        let path = std::path::Path::new(file_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
