pub mod analytics;
pub mod config;
pub mod doctor;
pub mod index;
pub mod migrate;
pub mod seed;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use kendra_core::config::{AppConfig, LoadOptions};
use kendra_core::domain::provision::DateRange;
use kendra_core::errors::{AnalyticsError, InterfaceError};
use kendra_core::service::AnalyticsService;
use kendra_core::similarity::provider_from_config;
use kendra_db::repositories::{load_index, SqlEmbeddingRepository};
use kendra_db::{connect_with_config, DbPool, RepositoryDataSource};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: Some(message.into()),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(command: &str, data: &impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: None,
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 3),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: Some(message.into()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Per-invocation state shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub options: LoadOptions,
    pub correlation_id: String,
}

impl CommandContext {
    pub fn new(options: LoadOptions) -> Self {
        Self { options, correlation_id: Uuid::new_v4().to_string() }
    }

    pub(crate) fn load_config(&self, command: &str) -> Result<AppConfig, CommandResult> {
        AppConfig::load(self.options.clone()).map_err(|error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        })
    }

    /// Maps a core error onto the interface taxonomy and an exit code.
    pub(crate) fn request_failure(&self, error: AnalyticsError) -> Failure {
        let error_class = error.class();
        let interface = error.into_interface(self.correlation_id.clone());
        let exit_code = match interface {
            InterfaceError::ServiceUnavailable { .. } => 4,
            InterfaceError::BadRequest { .. } | InterfaceError::Internal { .. } => 5,
        };
        Failure {
            error_class,
            message: format!("{interface} (correlation_id {})", self.correlation_id),
            exit_code,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Failure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub(crate) fn new(
        error_class: &'static str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }
}

pub(crate) fn finish<T: Serialize>(command: &str, result: Result<T, Failure>) -> CommandResult {
    match result {
        Ok(data) => CommandResult::success_with_data(command, &data),
        Err(failure) => {
            CommandResult::failure(command, failure.error_class, failure.message, failure.exit_code)
        }
    }
}

pub(crate) fn current_thread_runtime(
    command: &str,
) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) async fn connect_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    connect_with_config(&config.database)
        .await
        .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))
}

/// Builds the analytics service over the configured store, reloading persisted
/// embeddings for the configured provider when they exist.
pub(crate) async fn open_analytics(
    config: &AppConfig,
) -> Result<(DbPool, AnalyticsService), Failure> {
    let provider = provider_from_config(&config.embedding)
        .map_err(|error| Failure::new("embedding_provider", error.to_string(), 2))?;
    let pool = connect_pool(config).await?;

    let source = Arc::new(RepositoryDataSource::sql(pool.clone()));
    let analytics = AnalyticsService::from_config(config, source, Arc::clone(&provider));

    let repository = SqlEmbeddingRepository::new(pool.clone());
    match load_index(&repository, provider.name(), provider.dimension()).await {
        Ok(index) if !index.is_empty() => analytics.install_index(index),
        Ok(_) => {}
        Err(error) => warn!(
            event_name = "cli.embedding.reload_failed",
            error = %error,
            "stored embeddings could not be loaded; continuing without an index"
        ),
    }

    Ok((pool, analytics))
}

/// Both bounds or neither.
pub(crate) fn date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Option<DateRange>, AnalyticsError> {
    match (from, to) {
        (Some(start), Some(end)) => DateRange::new(start, end).map(Some),
        (None, None) => Ok(None),
        _ => Err(AnalyticsError::InvalidInput(
            "--from and --to must be given together".to_string(),
        )),
    }
}
