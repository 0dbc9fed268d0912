//! Shared store connection, error types, and interrupt handling for the CLI.

use std::fmt::{self, Display, Formatter};
use std::future;
use std::sync::Arc;

use anyhow::anyhow;
use swc_config::{ConfigError, CredentialOverrides, discover_credentials};
use swc_core::CoreError;
use swc_core::PoolReport;
use swc_store::{ObjectStore, SwiftClient};
use swc_telemetry::Metrics;
use tracing::{debug, warn};

use crate::cli::OutputFormat;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        Self::validation(config_message(&error))
    }
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::InvalidInput {
                field,
                reason,
                value: Some(value),
            } => Self::validation(format!("invalid {field} '{value}': {reason}")),
            CoreError::InvalidInput {
                field,
                reason,
                value: None,
            } => Self::validation(format!("invalid {field}: {reason}")),
            CoreError::Glob { pattern, source } => {
                Self::validation(format!("invalid glob '{pattern}': {source}"))
            }
            CoreError::Pattern { pattern, source } => {
                Self::validation(format!("invalid search pattern '{pattern}': {source}"))
            }
            CoreError::Cancelled => Self::failure(anyhow!("interrupted before all jobs finished")),
            other => Self::failure(other),
        }
    }
}

/// Render a configuration error with its field and reason.
pub(crate) fn config_message(error: &ConfigError) -> String {
    match error {
        ConfigError::MissingCredentials => {
            "object store credentials are not configured (set OS_AUTH_TOKEN and OS_STORAGE_URL, \
             or ST_AUTH, ST_USER and ST_KEY)"
                .to_string()
        }
        ConfigError::InvalidCredential { field, reason } => format!("{field} is invalid: {reason}"),
        ConfigError::InvalidField {
            field,
            value,
            reason,
        } => format!("invalid {field} '{value}': {reason}"),
        ConfigError::Directory { path, source } => {
            format!("directory {} is not accessible: {source}", path.display())
        }
        ConfigError::NotADirectory { path } => format!("{} is not a directory", path.display()),
    }
}

/// Turn a pool report into an error when any job failed.
pub(crate) fn require_clean(what: &str, report: &PoolReport) -> CliResult<()> {
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{} of {} {what} failed",
            report.failed,
            report.failed + report.completed
        )))
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) metrics: Metrics,
    pub(crate) output: OutputFormat,
}

impl AppContext {
    /// Resolve credentials from the environment and flags, then authenticate.
    pub(crate) async fn connect(
        overrides: &CredentialOverrides,
        metrics: Metrics,
        output: OutputFormat,
    ) -> CliResult<Self> {
        let credentials = discover_credentials(|key| std::env::var(key).ok(), overrides)?;
        debug!(credentials = ?credentials, "credentials resolved");
        let client = SwiftClient::connect(&credentials).await.map_err(|err| {
            CliError::failure(anyhow::Error::new(err).context("object store authentication failed"))
        })?;
        Ok(Self {
            store: Arc::new(client),
            metrics,
            output,
        })
    }
}

/// Resolves when the user interrupts the process.
pub(crate) async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "interrupt handler unavailable; runs cannot be cancelled");
        future::pending::<()>().await;
    }
    warn!("interrupt received; cancelling in-flight jobs");
}
