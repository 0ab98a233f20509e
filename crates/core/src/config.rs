use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clustering::ClusteringParams;
use crate::recommend::RecommenderSettings;
use crate::scoring::{EfficiencyBasis, ScoringSettings};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub clustering: ClusteringParams,
    pub scoring: ScoringSettings,
    pub recommender: RecommenderSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub dimension: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Hashing,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub embedding_provider: Option<EmbeddingProviderKind>,
    pub cluster_count: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://kendra.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            embedding: EmbeddingConfig {
                provider: EmbeddingProviderKind::Hashing,
                model: "text-embedding-3-small".to_string(),
                base_url: None,
                api_key: None,
                dimension: 256,
                timeout_secs: 30,
            },
            clustering: ClusteringParams::default(),
            scoring: ScoringSettings::default(),
            recommender: RecommenderSettings::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported embedding provider `{other}` (expected hashing|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kendra.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(provider) = embedding.provider {
                self.embedding.provider = provider;
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = Some(base_url);
            }
            if let Some(api_key) = embedding.api_key {
                self.embedding.api_key = Some(api_key.into());
            }
            if let Some(dimension) = embedding.dimension {
                self.embedding.dimension = dimension;
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

        if let Some(clustering) = patch.clustering {
            if let Some(cluster_count) = clustering.cluster_count {
                self.clustering.cluster_count = Some(cluster_count);
            }
            if let Some(seed) = clustering.seed {
                self.clustering.seed = seed;
            }
            if let Some(max_iterations) = clustering.max_iterations {
                self.clustering.max_iterations = max_iterations;
            }
            if let Some(tolerance) = clustering.tolerance {
                self.clustering.tolerance = tolerance;
            }
            if let Some(restarts) = clustering.restarts {
                self.clustering.restarts = restarts;
            }
        }

        if let Some(scoring) = patch.scoring {
            if let Some(volume_weight) = scoring.volume_weight {
                self.scoring.weights.volume = volume_weight;
            }
            if let Some(diversity_weight) = scoring.diversity_weight {
                self.scoring.weights.diversity = diversity_weight;
            }
            if let Some(efficiency_weight) = scoring.efficiency_weight {
                self.scoring.weights.efficiency = efficiency_weight;
            }
            if let Some(efficiency_basis) = scoring.efficiency_basis {
                self.scoring.efficiency_basis = efficiency_basis;
            }
        }

        if let Some(recommender) = patch.recommender {
            if let Some(similar_services) = recommender.similar_services {
                self.recommender.similar_services = similar_services;
            }
            if let Some(min_similarity) = recommender.min_similarity {
                self.recommender.min_similarity = min_similarity;
            }
            if let Some(similarity_weight) = recommender.similarity_weight {
                self.recommender.similarity_weight = similarity_weight;
            }
            if let Some(performance_weight) = recommender.performance_weight {
                self.recommender.performance_weight = performance_weight;
            }
            if let Some(type_match_bonus) = recommender.type_match_bonus {
                self.recommender.type_match_bonus = type_match_bonus;
            }
            if let Some(top_services_per_cluster) = recommender.top_services_per_cluster {
                self.recommender.top_services_per_cluster = top_services_per_cluster;
            }
            if let Some(min_volume_threshold) = recommender.min_volume_threshold {
                self.recommender.min_volume_threshold = Some(min_volume_threshold);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KENDRA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KENDRA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("KENDRA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("KENDRA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("KENDRA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KENDRA_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(value) = read_env("KENDRA_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("KENDRA_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = read_env("KENDRA_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(value.into());
        }
        if let Some(value) = read_env("KENDRA_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("KENDRA_EMBEDDING_DIMENSION", &value)?;
        }
        if let Some(value) = read_env("KENDRA_EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = parse_env("KENDRA_EMBEDDING_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KENDRA_CLUSTERING_CLUSTER_COUNT") {
            self.clustering.cluster_count =
                Some(parse_env("KENDRA_CLUSTERING_CLUSTER_COUNT", &value)?);
        }
        if let Some(value) = read_env("KENDRA_CLUSTERING_SEED") {
            self.clustering.seed = parse_env("KENDRA_CLUSTERING_SEED", &value)?;
        }
        if let Some(value) = read_env("KENDRA_CLUSTERING_MAX_ITERATIONS") {
            self.clustering.max_iterations =
                parse_env("KENDRA_CLUSTERING_MAX_ITERATIONS", &value)?;
        }

        if let Some(value) = read_env("KENDRA_SCORING_VOLUME_WEIGHT") {
            self.scoring.weights.volume = parse_env("KENDRA_SCORING_VOLUME_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("KENDRA_SCORING_DIVERSITY_WEIGHT") {
            self.scoring.weights.diversity = parse_env("KENDRA_SCORING_DIVERSITY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("KENDRA_SCORING_EFFICIENCY_WEIGHT") {
            self.scoring.weights.efficiency =
                parse_env("KENDRA_SCORING_EFFICIENCY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("KENDRA_SCORING_EFFICIENCY_BASIS") {
            self.scoring.efficiency_basis = value.parse::<EfficiencyBasis>().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "KENDRA_SCORING_EFFICIENCY_BASIS".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = read_env("KENDRA_RECOMMENDER_SIMILAR_SERVICES") {
            self.recommender.similar_services =
                parse_env("KENDRA_RECOMMENDER_SIMILAR_SERVICES", &value)?;
        }
        if let Some(value) = read_env("KENDRA_RECOMMENDER_MIN_SIMILARITY") {
            self.recommender.min_similarity =
                parse_env("KENDRA_RECOMMENDER_MIN_SIMILARITY", &value)?;
        }

        let log_level = read_env("KENDRA_LOGGING_LEVEL").or_else(|| read_env("KENDRA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KENDRA_LOGGING_FORMAT").or_else(|| read_env("KENDRA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(embedding_provider) = overrides.embedding_provider {
            self.embedding.provider = embedding_provider;
        }
        if let Some(cluster_count) = overrides.cluster_count {
            self.clustering.cluster_count = Some(cluster_count);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_embedding(&self.embedding)?;
        validate_clustering(&self.clustering)?;
        validate_scoring(&self.scoring)?;
        validate_recommender(&self.recommender)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kendra.toml"), PathBuf::from("config/kendra.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if embedding.timeout_secs == 0 || embedding.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "embedding.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if embedding.dimension == 0 || embedding.dimension > 8192 {
        return Err(ConfigError::Validation(
            "embedding.dimension must be in range 1..=8192".to_string(),
        ));
    }

    match embedding.provider {
        EmbeddingProviderKind::Hashing => {}
        EmbeddingProviderKind::OpenAi => {
            let missing = embedding
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "embedding.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        EmbeddingProviderKind::Ollama => {
            let missing =
                embedding.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "embedding.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &embedding.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "embedding.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_clustering(clustering: &ClusteringParams) -> Result<(), ConfigError> {
    if clustering.cluster_count == Some(0) {
        return Err(ConfigError::Validation(
            "clustering.cluster_count must be greater than zero when set".to_string(),
        ));
    }
    if clustering.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "clustering.max_iterations must be greater than zero".to_string(),
        ));
    }
    if !(clustering.tolerance.is_finite() && clustering.tolerance > 0.0) {
        return Err(ConfigError::Validation(
            "clustering.tolerance must be a positive number".to_string(),
        ));
    }
    if clustering.restarts == 0 {
        return Err(ConfigError::Validation(
            "clustering.restarts must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_scoring(scoring: &ScoringSettings) -> Result<(), ConfigError> {
    scoring.weights.validate().map_err(|error| ConfigError::Validation(format!("scoring.{error}")))
}

fn validate_recommender(recommender: &RecommenderSettings) -> Result<(), ConfigError> {
    if recommender.similar_services == 0 {
        return Err(ConfigError::Validation(
            "recommender.similar_services must be greater than zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&recommender.min_similarity) {
        return Err(ConfigError::Validation(
            "recommender.min_similarity must be in range 0..=1".to_string(),
        ));
    }
    let weights = [recommender.similarity_weight, recommender.performance_weight];
    if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0)
        || weights.iter().sum::<f64>() <= 0.0
    {
        return Err(ConfigError::Validation(
            "recommender weights must be non-negative and not both zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&recommender.type_match_bonus) {
        return Err(ConfigError::Validation(
            "recommender.type_match_bonus must be in range 0..=1".to_string(),
        ));
    }
    if recommender.top_services_per_cluster == 0 {
        return Err(ConfigError::Validation(
            "recommender.top_services_per_cluster must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    embedding: Option<EmbeddingPatch>,
    clustering: Option<ClusteringPatch>,
    scoring: Option<ScoringPatch>,
    recommender: Option<RecommenderPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    provider: Option<EmbeddingProviderKind>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    dimension: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClusteringPatch {
    cluster_count: Option<usize>,
    seed: Option<u64>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    restarts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoringPatch {
    volume_weight: Option<f64>,
    diversity_weight: Option<f64>,
    efficiency_weight: Option<f64>,
    efficiency_basis: Option<EfficiencyBasis>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommenderPatch {
    similar_services: Option<usize>,
    min_similarity: Option<f64>,
    similarity_weight: Option<f64>,
    performance_weight: Option<f64>,
    type_match_bonus: Option<f64>,
    top_services_per_cluster: Option<usize>,
    min_volume_threshold: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EmbeddingProviderKind, LoadOptions, LogFormat,
    };
    use crate::scoring::EfficiencyBasis;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.embedding.provider == EmbeddingProviderKind::Hashing,
            "hashing provider should be the offline default",
        )?;
        ensure(config.clustering.seed == 42, "default seed should be 42")?;
        ensure(config.clustering.cluster_count.is_none(), "cluster count should default to auto")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_EMBEDDING_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kendra.toml");
            fs::write(
                &path,
                r#"
[embedding]
provider = "openai"
api_key = "${TEST_EMBEDDING_KEY}"

[scoring]
volume_weight = 0.5
efficiency_basis = "per_active_day"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .embedding
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "sk-from-env")
                    .unwrap_or(false),
                "api key should be loaded from environment",
            )?;
            ensure(config.scoring.weights.volume == 0.5, "volume weight should come from file")?;
            ensure(
                config.scoring.efficiency_basis == EfficiencyBasis::PerActiveDay,
                "efficiency basis should come from file",
            )
        })();

        clear_vars(&["TEST_EMBEDDING_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KENDRA_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("KENDRA_CLUSTERING_SEED", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kendra.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[clustering]
seed = 11
cluster_count = 4

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    cluster_count: Some(9),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.clustering.seed == 7, "env seed should win over file")?;
            ensure(config.clustering.cluster_count == Some(9), "override cluster count should win")
        })();

        clear_vars(&["KENDRA_DATABASE_URL", "KENDRA_CLUSTERING_SEED"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KENDRA_EMBEDDING_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("embedding.api_key")
            );
            ensure(has_message, "validation failure should mention embedding.api_key")
        })();

        clear_vars(&["KENDRA_EMBEDDING_PROVIDER"]);
        result
    }

    #[test]
    fn negative_scoring_weight_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KENDRA_SCORING_DIVERSITY_WEIGHT", "-0.2");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("negative weight should fail validation".to_string()),
                Err(error) => error,
            };
            let mentions_scoring = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("scoring.")
            );
            ensure(mentions_scoring, "validation failure should mention the scoring section")
        })();

        clear_vars(&["KENDRA_SCORING_DIVERSITY_WEIGHT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KENDRA_EMBEDDING_PROVIDER", "openai");
        env::set_var("KENDRA_EMBEDDING_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["KENDRA_EMBEDDING_PROVIDER", "KENDRA_EMBEDDING_API_KEY"]);
        result
    }
}
