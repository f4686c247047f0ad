use clap::Parser;
use deemas::{
    RuleManager, VERSION, api::ApiState, catalog::ConditionCatalog, parse_duration,
    server::{ApiServer, setup_metrics},
    shutdown_signal,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Manage per-service traffic filtering rules for attack/defense proxies",
    long_about = None
)]
struct Args {
    /// Directory to store state in
    #[arg(short = 'd', long, env = "DEEMAS_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(long, env = "DEEMAS_DEBUG")]
    debug: bool,

    /// Path to log to (use "stdout" or "stderr" for console output)
    #[arg(short = 'l', long, env = "DEEMAS_LOG_PATH", default_value = "stdout")]
    log_path: String,

    /// Address the REST API listens on
    #[arg(long, env = "DEEMAS_LISTEN", default_value = "127.0.0.1:5000")]
    listen: String,

    /// Directory holding default script rules for new services
    #[arg(long, env = "DEEMAS_DEFAULT_RULES_DIR")]
    default_rules_dir: Option<PathBuf>,

    /// YAML file adding or overriding protocol condition definitions
    #[arg(long, env = "DEEMAS_CATALOG")]
    catalog: Option<PathBuf>,

    /// Do not seed default rules when a service is created
    #[arg(long, env = "DEEMAS_NO_BOOTSTRAP")]
    no_bootstrap: bool,

    /// How long to wait on a locked database
    #[arg(
        short = 't',
        long,
        env = "DEEMAS_BUSY_TIMEOUT",
        default_value = "5s",
        value_parser = parse_duration
    )]
    busy_timeout: Duration,

    /// Print version and build information and exit
    #[arg(long = "version-info")]
    version_info: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file if it exists
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Error loading .env file: {}", e);
        }
    }

    let args = Args::parse();

    if args.version_info {
        println!("deemas {}", VERSION);
        return;
    }

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    // keeps the file writer flushing until main returns
    let _log_guard = if args.log_path == "stdout" {
        let _ = subscriber.with(fmt::layer()).try_init();
        None
    } else if args.log_path == "stderr" {
        let _ = subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
        None
    } else {
        let file_appender = tracing_appender::rolling::never("", &args.log_path);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = subscriber
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init();
        Some(guard)
    };

    // Get absolute path for data directory
    let data_dir = match args.data_dir.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to get absolute path for data directory: {}", e);
            std::process::exit(1);
        }
    };

    let db_path = data_dir.join("deemas.sqlite");

    let catalog = match ConditionCatalog::load(args.catalog.as_deref()) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("Failed to load condition catalog: {}", e);
            std::process::exit(1);
        }
    };

    let prometheus = match setup_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let rule_manager = match RuleManager::builder()
        .db_path(&db_path)
        .busy_timeout(args.busy_timeout)
        .catalog(catalog)
        .maybe_default_rules_dir(args.default_rules_dir.as_deref())
        .bootstrap_on_create(!args.no_bootstrap)
        .build()
        .await
    {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to initialize rule manager: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting deemas v{}", VERSION);

    let state = ApiState::new(Arc::clone(&rule_manager), prometheus);
    let server = match ApiServer::bind(&args.listen, state).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start API server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.serve(shutdown_signal()).await {
        error!("API server failed: {}", e);
    }

    info!("Shutting down");

    match Arc::try_unwrap(rule_manager) {
        Ok(manager) => manager.close().await,
        Err(_) => warn!("Rule manager still referenced at shutdown; leaving pool to drop"),
    }
}
