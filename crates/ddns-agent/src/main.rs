// # ddns-agent - DDNS Update Agent
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// - This is a THIN integration layer ONLY
// - DO NOT add scheduling, skip or retry logic here; it lives in ddns-core
// - Configuration is via environment variables ONLY
// - The operator key never reaches this process
//
// The agent is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the IP source, update endpoint, classifier and store
// 4. Translating SIGHUP into a reload request and SIGTERM/SIGINT into shutdown
//
// ## Configuration
//
// - `DDNS_CONFIG_PATH`: Configuration document written by `ddns-publish`
// - `DDNS_AGENT_KEY`: Agent key, 64 hex chars (required to run)
// - `DDNS_STORE_TYPE`: `sqlite` or `memory`
// - `DDNS_DB_PATH`: SQLite history/cache database
// - `DDNS_HTTP_TIMEOUT_SECS`: Per-call timeout, 1..=120
// - `DDNS_RESPONSE_CLASSIFIER`: `http-status`, `namecheap` or `dyndns2`
// - `DDNS_ALLOWED_HOSTS`: Optional comma list of hosts the agent may call
// - `DDNS_HISTORY_RETENTION`: Optional number of history records to keep
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Usage
//
// ```bash
// export DDNS_AGENT_KEY=$(cat /etc/ddns-agent/agent.key)
// ddns-agent                    # run until SIGTERM
// ddns-agent history 50 7:www   # print recent history as JSON lines
// ```

use anyhow::{Context, Result};
use ddns_core::traits::HistoryQuery;
use ddns_core::{
    AgentKey, ClassifierRegistry, ConfigLoader, EngineConfig, EngineEvent, StoreConfig,
    TargetUpdater, UpdateEngine, UrlPolicy,
};
use ddns_endpoint_http::HttpUpdateEndpoint;
use ddns_ip_http::HttpIpSource;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_CONFIG_PATH: &str = "/etc/ddns-agent/config.enc.json";
const DEFAULT_DB_PATH: &str = "/var/lib/ddns-agent/agent.db";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum AgentExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<AgentExitCode> for ExitCode {
    fn from(code: AgentExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    config_path: PathBuf,
    agent_key: Option<SecretString>,
    store_type: String,
    db_path: PathBuf,
    http_timeout_secs: u64,
    response_classifier: String,
    allowed_hosts: Option<String>,
    history_retention: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            config_path: var("DDNS_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            agent_key: var("DDNS_AGENT_KEY").map(SecretString::new),
            store_type: var("DDNS_STORE_TYPE").unwrap_or_else(|| "sqlite".to_string()),
            db_path: var("DDNS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            http_timeout_secs: var("DDNS_HTTP_TIMEOUT_SECS")
                .map(|s| {
                    s.trim()
                        .parse()
                        .with_context(|| format!("DDNS_HTTP_TIMEOUT_SECS is not a number: {s}"))
                })
                .transpose()?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            response_classifier: var("DDNS_RESPONSE_CLASSIFIER")
                .unwrap_or_else(|| ddns_core::registry::DEFAULT_CLASSIFIER.to_string()),
            allowed_hosts: var("DDNS_ALLOWED_HOSTS"),
            history_retention: var("DDNS_HISTORY_RETENTION")
                .map(|s| {
                    s.trim()
                        .parse()
                        .with_context(|| format!("DDNS_HISTORY_RETENTION is not a number: {s}"))
                })
                .transpose()?,
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate everything both the daemon and the history command need
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "sqlite" | "memory" => {}
            _ => anyhow::bail!(
                "DDNS_STORE_TYPE '{}' is not supported. Supported types: sqlite, memory",
                self.store_type
            ),
        }

        if !(1..=120).contains(&self.http_timeout_secs) {
            anyhow::bail!(
                "DDNS_HTTP_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                self.http_timeout_secs
            );
        }

        if self.history_retention == Some(0) {
            anyhow::bail!("DDNS_HISTORY_RETENTION must be at least 1 when set");
        }

        if !ClassifierRegistry::with_builtin().has(&self.response_classifier) {
            anyhow::bail!(
                "DDNS_RESPONSE_CLASSIFIER '{}' is not supported. Supported: {}",
                self.response_classifier,
                ClassifierRegistry::with_builtin().list().join(", ")
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn agent_key(&self) -> Result<AgentKey> {
        let raw = self.agent_key.as_ref().context(
            "DDNS_AGENT_KEY is required. Set it to the 64 hex char key the publisher seals tokens with",
        )?;
        AgentKey::from_hex(raw.expose_secret()).context("DDNS_AGENT_KEY")
    }

    fn store_config(&self) -> StoreConfig {
        match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::Sqlite {
                path: self.db_path.clone(),
            },
        }
    }

    fn url_policy(&self) -> UrlPolicy {
        self.allowed_hosts
            .as_deref()
            .map(UrlPolicy::from_allowlist)
            .unwrap_or_default()
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            history_retention: self.history_retention,
            ..EngineConfig::default()
        }
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run,
    History {
        limit: usize,
        entry_id: Option<String>,
    },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None => Ok(Self::Run),
            Some("history") => {
                let limit = match args.get(1) {
                    Some(raw) => raw
                        .parse()
                        .with_context(|| format!("history limit is not a number: {raw}"))?,
                    None => DEFAULT_HISTORY_LIMIT,
                };
                Ok(Self::History {
                    limit,
                    entry_id: args.get(2).cloned(),
                })
            }
            Some(other) => anyhow::bail!("unknown command '{other}'. Usage: ddns-agent [history [N] [ENTRY_ID]]"),
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return AgentExitCode::ConfigError.into();
        }
    };

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AgentExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return AgentExitCode::ConfigError.into();
    }

    // Initialize tracing; stdout stays clean for the history feed
    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AgentExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AgentExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match command {
            Command::Run => run_agent(config).await,
            Command::History { limit, entry_id } => print_history(&config, limit, entry_id).await,
        }
    })
    .into()
}

/// Run the agent until a shutdown signal arrives
async fn run_agent(config: Config) -> AgentExitCode {
    let engine = match build_engine(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return AgentExitCode::ConfigError;
        }
    };
    let (mut engine, events) = engine;

    info!("Starting ddns-agent");
    info!(
        "Document: {}, store: {}, classifier: {}",
        config.config_path.display(),
        config.store_config().type_name(),
        config.response_classifier
    );

    let event_logger = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    if let Err(e) = install_signal_handlers(engine.reload_handle(), shutdown_tx) {
        error!("Failed to install signal handlers: {:#}", e);
        return AgentExitCode::RuntimeError;
    }

    let result = engine.run(shutdown_rx).await;
    drop(engine);
    let _ = event_logger.await;

    match result {
        Ok(()) => {
            info!("ddns-agent stopped");
            AgentExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Engine error: {}", e);
            AgentExitCode::RuntimeError
        }
    }
}

/// Wire the engine from configuration
async fn build_engine(config: &Config) -> Result<(UpdateEngine, mpsc::Receiver<EngineEvent>)> {
    let key = config.agent_key()?;
    let store = config
        .store_config()
        .open()
        .await
        .context("opening history store")?;
    let classifier = ClassifierRegistry::with_builtin().get(&config.response_classifier)?;
    let endpoint = HttpUpdateEndpoint::new(config.http_timeout())?;
    let ip_source = HttpIpSource::new(config.http_timeout())?;

    let loader = ConfigLoader::new(&config.config_path, config.url_policy());
    let updater = TargetUpdater::new(Arc::new(endpoint), classifier, store, key);

    Ok(UpdateEngine::new(
        loader,
        Box::new(ip_source),
        updater,
        config.engine_config(),
    )?)
}

/// Forward engine events to the log
///
/// The engine logs its own decisions; this adds one line per outcome for
/// operators following the journal.
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ConfigReloaded { entries } => info!("Document loaded: {} entries", entries),
            EngineEvent::ConfigRejected { error } => warn!("Document rejected: {}", error),
            EngineEvent::CycleAborted { reason } => warn!("Cycle aborted: {}", reason),
            EngineEvent::EntryUpdated { entry_id, ip } => info!("{} -> {}", entry_id, ip),
            EngineEvent::EntryFailed { entry_id, error } => warn!("{} failed: {}", entry_id, error),
            EngineEvent::CycleFinished {
                updated,
                skipped,
                failed,
            } => info!(
                "Cycle finished: {} updated, {} skipped, {} failed",
                updated, skipped, failed
            ),
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// SIGHUP requests a reload; SIGTERM or SIGINT stops the engine
#[cfg(unix)]
fn install_signal_handlers(
    reload: ddns_core::ReloadHandle,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<()> {
    let mut sighup =
        signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("Received SIGHUP, reload requested");
            reload.request_reload();
        }
    });

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
        let _ = shutdown_tx.send(());
    });

    Ok(())
}

/// CTRL-C stops the engine; there is no reload signal
#[cfg(not(unix))]
fn install_signal_handlers(
    _reload: ddns_core::ReloadHandle,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: SIGINT"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });
    Ok(())
}

/// Print the newest history records as JSON lines
async fn print_history(config: &Config, limit: usize, entry_id: Option<String>) -> AgentExitCode {
    let store = match config.store_config().open().await {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open history store: {}", e);
            return AgentExitCode::ConfigError;
        }
    };

    let mut query = HistoryQuery::recent(limit);
    if let Some(entry_id) = entry_id {
        query = query.for_entry(entry_id);
    }

    let records = match store.history(query).await {
        Ok(records) => records,
        Err(e) => {
            error!("Cannot read history: {}", e);
            return AgentExitCode::RuntimeError;
        }
    };

    for record in records {
        match serde_json::to_string(&record) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                error!("Cannot encode history record {}: {}", record.id, e);
                return AgentExitCode::RuntimeError;
            }
        }
    }
    AgentExitCode::CleanShutdown
}
