use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use kendra_core::config::AppConfig;

use crate::commands::{CommandContext, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with source attribution. Secrets are never printed.
pub fn run(context: &CommandContext) -> CommandResult {
    let config = match context.load_config("config") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path(context.options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &str, env_keys: &[&str]| {
        field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, env_keys, value)| ConfigEntry { key, value, source: source(key, env_keys) })
        .collect::<Vec<_>>();

    CommandResult::success_with_data("config", &entries)
}

fn effective_values(config: &AppConfig) -> Vec<Entry> {
    let optional = |value: Option<String>| value.unwrap_or_else(|| "<unset>".to_string());
    let api_key = if config.embedding.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        entry("database.url", &["KENDRA_DATABASE_URL"], config.database.url.clone()),
        entry(
            "database.max_connections",
            &["KENDRA_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        entry(
            "database.timeout_secs",
            &["KENDRA_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        entry(
            "embedding.provider",
            &["KENDRA_EMBEDDING_PROVIDER"],
            format!("{:?}", config.embedding.provider),
        ),
        entry("embedding.model", &["KENDRA_EMBEDDING_MODEL"], config.embedding.model.clone()),
        entry(
            "embedding.base_url",
            &["KENDRA_EMBEDDING_BASE_URL"],
            optional(config.embedding.base_url.clone()),
        ),
        entry("embedding.api_key", &["KENDRA_EMBEDDING_API_KEY"], api_key.to_string()),
        entry(
            "embedding.dimension",
            &["KENDRA_EMBEDDING_DIMENSION"],
            config.embedding.dimension.to_string(),
        ),
        entry(
            "embedding.timeout_secs",
            &["KENDRA_EMBEDDING_TIMEOUT_SECS"],
            config.embedding.timeout_secs.to_string(),
        ),
        entry(
            "clustering.cluster_count",
            &["KENDRA_CLUSTERING_CLUSTER_COUNT"],
            config
                .clustering
                .cluster_count
                .map(|count| count.to_string())
                .unwrap_or_else(|| "<auto>".to_string()),
        ),
        entry("clustering.seed", &["KENDRA_CLUSTERING_SEED"], config.clustering.seed.to_string()),
        entry(
            "clustering.max_iterations",
            &["KENDRA_CLUSTERING_MAX_ITERATIONS"],
            config.clustering.max_iterations.to_string(),
        ),
        entry(
            "scoring.volume_weight",
            &["KENDRA_SCORING_VOLUME_WEIGHT"],
            config.scoring.weights.volume.to_string(),
        ),
        entry(
            "scoring.diversity_weight",
            &["KENDRA_SCORING_DIVERSITY_WEIGHT"],
            config.scoring.weights.diversity.to_string(),
        ),
        entry(
            "scoring.efficiency_weight",
            &["KENDRA_SCORING_EFFICIENCY_WEIGHT"],
            config.scoring.weights.efficiency.to_string(),
        ),
        entry(
            "scoring.efficiency_basis",
            &["KENDRA_SCORING_EFFICIENCY_BASIS"],
            format!("{:?}", config.scoring.efficiency_basis),
        ),
        entry(
            "recommender.similar_services",
            &["KENDRA_RECOMMENDER_SIMILAR_SERVICES"],
            config.recommender.similar_services.to_string(),
        ),
        entry(
            "recommender.min_similarity",
            &["KENDRA_RECOMMENDER_MIN_SIMILARITY"],
            config.recommender.min_similarity.to_string(),
        ),
        entry(
            "logging.level",
            &["KENDRA_LOGGING_LEVEL", "KENDRA_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        entry(
            "logging.format",
            &["KENDRA_LOGGING_FORMAT", "KENDRA_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

type Entry = (&'static str, &'static [&'static str], String);

fn entry(key: &'static str, env_keys: &'static [&'static str], value: String) -> Entry {
    (key, env_keys, value)
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("kendra.toml"), PathBuf::from("config/kendra.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
