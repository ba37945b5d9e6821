use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use yarasmith_classifier::ClassifierConfig;
use yarasmith_cluster::ClusterConfig;
use yarasmith_llm::{RateBudget, RetryPolicy};
use yarasmith_regex::{RegexBounds, default_denylist};

use crate::cli::args::Args;

const ENV_PREFIX: &str = "YARASMITH_";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct YarasmithConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub regex: RegexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_model")]
    pub model: String,

    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Outbound calls allowed per window, shared by every service.
    #[serde(default = "default_rate_limit_calls")]
    pub rate_limit_calls: usize,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// In-flight calls across all services and the syntax checker.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Where threat descriptors are read from.
    #[serde(default = "default_download_folder")]
    pub download_folder: PathBuf,

    /// Where generated rules are written and validated from.
    #[serde(default = "default_rule_folder")]
    pub rule_folder: PathBuf,

    /// Root of the category buckets and the regex store.
    #[serde(default = "default_store_folder")]
    pub store_folder: PathBuf,

    /// Descriptor file stem pattern with a prefix and a number group.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_max_queries_per_run")]
    pub max_queries_per_run: usize,

    #[serde(default = "default_skip_files_larger_than_kb")]
    pub skip_files_larger_than_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    #[serde(default = "default_yara_binary")]
    pub yara_binary: PathBuf,

    #[serde(default = "default_checker_timeout_secs")]
    pub checker_timeout_secs: u64,

    #[serde(default = "default_checker_retries")]
    pub checker_retries: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// When off, rejected rules are classified without correction.
    #[serde(default = "default_true")]
    pub fix_bad_rules: bool,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationConfig {
    #[serde(default = "default_low")]
    pub low: f64,

    #[serde(default = "default_high")]
    pub high: f64,

    #[serde(default = "default_clause_weight")]
    pub clause_weight: f64,

    #[serde(default)]
    pub group_by_cve_year: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusteringConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_min_literal_length")]
    pub min_literal_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegexConfig {
    #[serde(default = "default_regex_min_length")]
    pub min_length: usize,

    #[serde(default = "default_regex_max_length")]
    pub max_length: usize,

    #[serde(default = "default_max_quantifiers")]
    pub max_quantifiers: usize,

    #[serde(default = "default_max_advanced_constructs")]
    pub max_advanced_constructs: usize,

    #[serde(default = "default_max_escaped_characters")]
    pub max_escaped_characters: usize,

    #[serde(default = "default_max_classes_alternation")]
    pub max_classes_alternation: usize,

    #[serde(default = "default_max_wildcard_ratio")]
    pub max_wildcard_ratio: f64,

    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    #[serde(default = "default_max_regexes_per_rule")]
    pub max_regexes_per_rule: usize,

    #[serde(default)]
    pub refine_master_rules: bool,

    #[serde(default = "default_author")]
    pub author: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid path in {field}: {path}")]
    InvalidPath { field: String, path: PathBuf },

    #[error("Invalid range for {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: String,
        valid_range: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_rate_limit_calls() -> usize {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    8
}

fn default_download_folder() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_rule_folder() -> PathBuf {
    PathBuf::from("rules")
}

fn default_store_folder() -> PathBuf {
    PathBuf::from("store")
}

fn default_file_pattern() -> String {
    r"(.+)_(\d+)".to_string()
}

fn default_file_extension() -> String {
    "txt".to_string()
}

fn default_max_queries_per_run() -> usize {
    100
}

fn default_skip_files_larger_than_kb() -> u64 {
    100
}

fn default_yara_binary() -> PathBuf {
    PathBuf::from("yara")
}

fn default_checker_timeout_secs() -> u64 {
    30
}

fn default_checker_retries() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    8
}

fn default_low() -> f64 {
    ClassifierConfig::default().low
}

fn default_high() -> f64 {
    ClassifierConfig::default().high
}

fn default_clause_weight() -> f64 {
    ClassifierConfig::default().clause_weight
}

fn default_similarity_threshold() -> f64 {
    ClusterConfig::default().similarity_threshold
}

fn default_min_cluster_size() -> usize {
    ClusterConfig::default().min_cluster_size
}

fn default_min_literal_length() -> usize {
    5
}

fn default_regex_min_length() -> usize {
    RegexBounds::default().min_length
}

fn default_regex_max_length() -> usize {
    RegexBounds::default().max_length
}

fn default_max_quantifiers() -> usize {
    RegexBounds::default().max_quantifiers
}

fn default_max_advanced_constructs() -> usize {
    RegexBounds::default().max_advanced_constructs
}

fn default_max_escaped_characters() -> usize {
    RegexBounds::default().max_escaped_characters
}

fn default_max_classes_alternation() -> usize {
    RegexBounds::default().max_classes_alternation
}

fn default_max_wildcard_ratio() -> f64 {
    RegexBounds::default().max_wildcard_ratio
}

fn default_max_regexes_per_rule() -> usize {
    10
}

fn default_author() -> String {
    "yarasmith".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rate_limit_calls: default_rate_limit_calls(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_folder: default_download_folder(),
            rule_folder: default_rule_folder(),
            store_folder: default_store_folder(),
            file_pattern: default_file_pattern(),
            file_extension: default_file_extension(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_queries_per_run: default_max_queries_per_run(),
            skip_files_larger_than_kb: default_skip_files_larger_than_kb(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            yara_binary: default_yara_binary(),
            checker_timeout_secs: default_checker_timeout_secs(),
            checker_retries: default_checker_retries(),
            max_attempts: default_max_attempts(),
            fix_bad_rules: true,
            max_workers: default_max_workers(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            low: default_low(),
            high: default_high(),
            clause_weight: default_clause_weight(),
            group_by_cve_year: false,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_cluster_size: default_min_cluster_size(),
            min_literal_length: default_min_literal_length(),
        }
    }
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            min_length: default_regex_min_length(),
            max_length: default_regex_max_length(),
            max_quantifiers: default_max_quantifiers(),
            max_advanced_constructs: default_max_advanced_constructs(),
            max_escaped_characters: default_max_escaped_characters(),
            max_classes_alternation: default_max_classes_alternation(),
            max_wildcard_ratio: default_max_wildcard_ratio(),
            denylist: default_denylist(),
            max_regexes_per_rule: default_max_regexes_per_rule(),
            refine_master_rules: false,
            author: default_author(),
        }
    }
}

impl YarasmithConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let table = Self::read_table(path.as_ref())?;
        Ok(toml::Value::Table(table).try_into()?)
    }

    fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn generate_default_config() -> String {
        let body = toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("# failed to render defaults: {}\n", e));
        format!(
            "# yarasmith configuration\n# Values here are overridden by YARASMITH_* environment variables and CLI flags.\n\n{}",
            body
        )
    }

    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("yarasmith").join("config.toml"))
    }

    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("yarasmith.toml")
    }

    /// Deep merge of the user config, the working directory config and an
    /// explicit file, in that order. Missing implicit files are skipped;
    /// a missing explicit file is an error.
    pub fn load_with_merged_configs(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        let implicit = Self::get_user_config_path()
            .into_iter()
            .chain(std::iter::once(Self::get_current_config_path()));
        for path in implicit {
            if path.exists() {
                log::debug!("Loading config from {}", path.display());
                merge_tables(&mut merged, Self::read_table(&path)?);
            }
        }

        if let Some(path) = explicit {
            merge_tables(&mut merged, Self::read_table(path)?);
        }

        Ok(toml::Value::Table(merged).try_into()?)
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<()> {
        for (key, value) in env_vars {
            let Some(config_key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match config_key {
                "API_MODEL" => self.api.model = value.clone(),
                "API_BASE_URL" => self.api.base_url = Some(value.clone()),
                "API_REQUEST_TIMEOUT_SECS" => self.api.request_timeout_secs = parse_env(config_key, value)?,
                "API_MAX_RETRIES" => self.api.max_retries = parse_env(config_key, value)?,
                "API_RATE_LIMIT_CALLS" => self.api.rate_limit_calls = parse_env(config_key, value)?,
                "API_RATE_LIMIT_WINDOW_SECS" => self.api.rate_limit_window_secs = parse_env(config_key, value)?,
                "API_MAX_CONCURRENT" => self.api.max_concurrent = parse_env(config_key, value)?,
                "PATHS_DOWNLOAD_FOLDER" => self.paths.download_folder = PathBuf::from(value),
                "PATHS_RULE_FOLDER" => self.paths.rule_folder = PathBuf::from(value),
                "PATHS_STORE_FOLDER" => self.paths.store_folder = PathBuf::from(value),
                "GENERATION_MAX_QUERIES_PER_RUN" => {
                    self.generation.max_queries_per_run = parse_env(config_key, value)?
                }
                "VALIDATION_YARA_BINARY" => self.validation.yara_binary = PathBuf::from(value),
                "VALIDATION_MAX_ATTEMPTS" => self.validation.max_attempts = parse_env(config_key, value)?,
                "VALIDATION_FIX_BAD_RULES" => self.validation.fix_bad_rules = parse_env(config_key, value)?,
                "VALIDATION_MAX_WORKERS" => self.validation.max_workers = parse_env(config_key, value)?,
                "CLASSIFICATION_LOW" => self.classification.low = parse_env(config_key, value)?,
                "CLASSIFICATION_HIGH" => self.classification.high = parse_env(config_key, value)?,
                "CLASSIFICATION_GROUP_BY_CVE_YEAR" => {
                    self.classification.group_by_cve_year = parse_env(config_key, value)?
                }
                "CLUSTERING_SIMILARITY_THRESHOLD" => {
                    self.clustering.similarity_threshold = parse_env(config_key, value)?
                }
                "CLUSTERING_MIN_CLUSTER_SIZE" => self.clustering.min_cluster_size = parse_env(config_key, value)?,
                "REGEX_DENYLIST" => {
                    self.regex.denylist = value.split(',').map(|s| s.trim().to_string()).collect();
                }
                "REGEX_REFINE_MASTER_RULES" => self.regex.refine_master_rules = parse_env(config_key, value)?,
                _ => log::debug!("Ignoring unknown environment variable {}", key),
            }
        }
        Ok(())
    }

    pub fn apply_cli_args(&mut self, args: &Args) {
        if let Some(model) = &args.model {
            self.api.model = model.clone();
        }
        if let Some(base_url) = &args.api_base_url {
            self.api.base_url = Some(base_url.clone());
        }
    }

    /// Files, then environment, then CLI flags, then validation.
    pub fn load_with_precedence(
        config_path: Option<&Path>,
        cli_args: &Args,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut config = Self::load_with_merged_configs(config_path).map_err(|e| match config_path {
            Some(path) => anyhow!("Failed to load config file {}: {}", path.display(), e),
            None => anyhow!("Failed to load configuration: {}", e),
        })?;

        config.apply_env_vars(env_vars)?;
        config.apply_cli_args(cli_args);
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.classification;
        if !(c.low >= 0.0 && c.low <= c.high) {
            return Err(ConfigError::InvalidRange {
                field: "classification.low".to_string(),
                value: c.low.to_string(),
                valid_range: format!("0-{}", c.high),
            });
        }

        if !(c.clause_weight >= 0.0) {
            return Err(ConfigError::InvalidRange {
                field: "classification.clause_weight".to_string(),
                value: c.clause_weight.to_string(),
                valid_range: ">= 0".to_string(),
            });
        }

        let threshold = self.clustering.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidRange {
                field: "clustering.similarity_threshold".to_string(),
                value: threshold.to_string(),
                valid_range: "0.0-1.0".to_string(),
            });
        }

        let ratio = self.regex.max_wildcard_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidRange {
                field: "regex.max_wildcard_ratio".to_string(),
                value: ratio.to_string(),
                valid_range: "0.0-1.0".to_string(),
            });
        }

        if self.regex.min_length > self.regex.max_length {
            return Err(ConfigError::InvalidRange {
                field: "regex.min_length".to_string(),
                value: self.regex.min_length.to_string(),
                valid_range: format!("0-{}", self.regex.max_length),
            });
        }

        let non_zero = [
            ("validation.max_attempts", self.validation.max_attempts as usize),
            ("validation.max_workers", self.validation.max_workers),
            ("api.rate_limit_calls", self.api.rate_limit_calls),
            ("api.rate_limit_window_secs", self.api.rate_limit_window_secs as usize),
            ("api.max_concurrent", self.api.max_concurrent),
            ("clustering.min_cluster_size", self.clustering.min_cluster_size),
            ("regex.max_regexes_per_rule", self.regex.max_regexes_per_rule),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Err(e) = regex::Regex::new(&self.paths.file_pattern) {
            return Err(ConfigError::InvalidValue {
                field: "paths.file_pattern".to_string(),
                reason: e.to_string(),
            });
        }

        if self.paths.store_folder.exists() && !self.paths.store_folder.is_dir() {
            return Err(ConfigError::InvalidPath {
                field: "paths.store_folder".to_string(),
                path: self.paths.store_folder.clone(),
            });
        }

        Ok(())
    }

    /// Attempts per rule; a single check when correction is off.
    pub fn effective_max_attempts(&self) -> u32 {
        if self.validation.fix_bad_rules {
            self.validation.max_attempts
        } else {
            1
        }
    }

    pub fn service_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.api.max_retries,
            Duration::from_millis(self.api.base_backoff_ms),
            Duration::from_millis(self.api.max_backoff_ms),
            Duration::from_secs(self.api.request_timeout_secs),
        )
    }

    pub fn checker_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.validation.checker_retries,
            Duration::from_millis(self.api.base_backoff_ms),
            Duration::from_millis(self.api.max_backoff_ms),
            Duration::from_secs(self.validation.checker_timeout_secs),
        )
    }

    pub fn rate_budget(&self) -> RateBudget {
        RateBudget::new(
            self.api.rate_limit_calls,
            Duration::from_secs(self.api.rate_limit_window_secs),
        )
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            low: self.classification.low,
            high: self.classification.high,
            clause_weight: self.classification.clause_weight,
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            similarity_threshold: self.clustering.similarity_threshold,
            min_cluster_size: self.clustering.min_cluster_size,
        }
    }

    pub fn regex_bounds(&self) -> RegexBounds {
        RegexBounds {
            min_length: self.regex.min_length,
            max_length: self.regex.max_length,
            max_quantifiers: self.regex.max_quantifiers,
            max_advanced_constructs: self.regex.max_advanced_constructs,
            max_escaped_characters: self.regex.max_escaped_characters,
            max_classes_alternation: self.regex.max_classes_alternation,
            max_wildcard_ratio: self.regex.max_wildcard_ratio,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", key.to_lowercase(), value))
}

/// Overlay `overlay` onto `base`, recursing into nested tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
