// # ddns-publish - Configuration Publisher
//
// One-shot command run by the administrative surface after every change to
// a secret or target. Reads the exported administrative state, reseals every
// secret for the agent and atomically replaces the agent's document.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `DDNS_OPERATOR_KEY`: Operator key, 64 hex chars (required)
// - `DDNS_AGENT_KEY`: Agent key, 64 hex chars (required)
// - `DDNS_PUBLISH_INPUT`: Path of the JSON export `{secrets, targets}` (required)
// - `DDNS_CONFIG_PATH`: Output document path
// - `DDNS_CHECK_IP_URL`: Public-IP endpoint written into the document
// - `DDNS_UPDATE_URL_TEMPLATE`: Vendor URL template
// - `DDNS_RELOAD_SERVICE`: Service to `systemctl reload` after publishing
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export DDNS_OPERATOR_KEY=$(cat /etc/ddns-admin/operator.key)
// export DDNS_AGENT_KEY=$(cat /etc/ddns-admin/agent.key)
// export DDNS_PUBLISH_INPUT=/var/lib/ddns-admin/export.json
// export DDNS_RELOAD_SERVICE=ddns-agent
//
// ddns-publish
// ```

use anyhow::{Context, Result};
use ddns_core::AgentKey;
use ddns_publisher::{
    AdminState, DEFAULT_CHECK_IP_URL, DEFAULT_CONFIG_PATH, DEFAULT_UPDATE_URL_TEMPLATE,
    DocumentBuilder, OperatorKey, Publisher, Reencryptor, ServiceReload,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes (systemd conventions)
#[derive(Debug, Clone, Copy)]
enum PublishExitCode {
    Published = 0,
    ConfigError = 1,
    PublishFailed = 2,
}

impl From<PublishExitCode> for ExitCode {
    fn from(code: PublishExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

struct Config {
    operator_key: SecretString,
    agent_key: SecretString,
    input_path: PathBuf,
    config_path: PathBuf,
    check_ip_url: String,
    update_url_template: String,
    reload_service: Option<String>,
    log_level: Level,
}

impl Config {
    fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            var(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{name} is required"))
        };

        Ok(Self {
            operator_key: SecretString::new(required("DDNS_OPERATOR_KEY")?),
            agent_key: SecretString::new(required("DDNS_AGENT_KEY")?),
            input_path: PathBuf::from(required("DDNS_PUBLISH_INPUT")?),
            config_path: var("DDNS_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            check_ip_url: var("DDNS_CHECK_IP_URL")
                .unwrap_or_else(|| DEFAULT_CHECK_IP_URL.to_string()),
            update_url_template: var("DDNS_UPDATE_URL_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_UPDATE_URL_TEMPLATE.to_string()),
            reload_service: var("DDNS_RELOAD_SERVICE").filter(|s| !s.trim().is_empty()),
            log_level: parse_level(&var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()))?,
        })
    }

    fn publisher(&self) -> Result<Publisher> {
        let operator = OperatorKey::from_hex(self.operator_key.expose_secret())
            .context("DDNS_OPERATOR_KEY")?;
        let agent = AgentKey::from_hex(self.agent_key.expose_secret()).context("DDNS_AGENT_KEY")?;

        let builder = DocumentBuilder::new(
            Reencryptor::new(operator, agent),
            &self.check_ip_url,
            &self.update_url_template,
        );
        let publisher = Publisher::new(builder, &self.config_path);
        Ok(match &self.reload_service {
            Some(service) => publisher.with_reload(ServiceReload::systemctl(service)),
            None => publisher,
        })
    }
}

fn parse_level(raw: &str) -> Result<Level> {
    match raw.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "DDNS_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            raw
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PublishExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PublishExitCode::ConfigError.into();
    }

    let publisher = match config.publisher() {
        Ok(publisher) => publisher,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return PublishExitCode::ConfigError.into();
        }
    };

    let state = match std::fs::read_to_string(&config.input_path)
        .map_err(anyhow::Error::from)
        .and_then(|json| AdminState::from_json(&json).map_err(anyhow::Error::from))
    {
        Ok(state) => state,
        Err(e) => {
            error!("Cannot read {}: {:#}", config.input_path.display(), e);
            return PublishExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PublishExitCode::PublishFailed.into();
        }
    };

    match rt.block_on(publisher.publish(&state)) {
        Ok(report) => {
            info!(
                "Published {} entries to {}{}",
                report.entries,
                report.path.display(),
                if report.reloaded { " (service reloaded)" } else { "" }
            );
            PublishExitCode::Published.into()
        }
        Err(e) => {
            if e.document_written() {
                error!("{}", e);
            } else {
                error!("Publish aborted, previous document left in place: {}", e);
            }
            PublishExitCode::PublishFailed.into()
        }
    }
}
