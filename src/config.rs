//! Configuration management
//!
//! Manages engine configuration: model endpoints, pipeline thresholds,
//! cache sizing, and storage paths. Loaded once per process and passed
//! by reference into each component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat and embedding model settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Table-structure classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Answering-pipeline thresholds and limits
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Session result cache sizing
    #[serde(default)]
    pub cache: CacheConfig,
    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Chat and embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model for answering and reflection generation
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model for skeleton embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Sampling temperature for chat calls
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Completion token limit for chat calls
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key is read from the environment, never persisted
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_temperature() -> f64 {
    0.5
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the environment
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var("TABLETUTOR_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .context("No API key found. Set TABLETUTOR_API_KEY or OPENAI_API_KEY")
    }
}

/// Table-structure classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Inference endpoint URL; empty means unset (LLM fallback is used)
    #[serde(default)]
    pub endpoint: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
        }
    }
}

/// Answering-pipeline thresholds and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Confidence below this triggers a guidance round
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Final candidate count returned by the similarity funnel
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Candidate pool size for the lexical funnel stage
    #[serde(default = "default_first_stage_pool")]
    pub first_stage_pool: usize,
    /// Maximum items accepted per batch request
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_top_n() -> usize {
    5
}

fn default_first_stage_pool() -> usize {
    100
}

fn default_batch_limit() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            top_n: default_top_n(),
            first_stage_pool: default_first_stage_pool(),
            batch_limit: default_batch_limit(),
        }
    }
}

/// Session result cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in minutes
    #[serde(default = "default_cache_ttl_minutes")]
    pub ttl_minutes: u64,
    /// Maximum cached sessions
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_ttl_minutes() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_cache_ttl_minutes(),
            capacity: default_cache_capacity(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Record database path; empty means the default data directory
    #[serde(default)]
    pub db_path: String,
}

impl StorageConfig {
    /// Resolve the record database path
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if !self.db_path.is_empty() {
            return Ok(PathBuf::from(&self.db_path));
        }
        Ok(data_dir()?.join("tabletutor.db"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            classifier: ClassifierConfig::default(),
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "tabletutor", "tabletutor")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "tabletutor", "tabletutor")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Models:");
    println!("  chat:                 {}", config.llm.chat_model);
    println!("  embedding:            {}", config.llm.embedding_model);
    println!("  base URL:             {}", config.llm.base_url);
    if config.classifier.endpoint.is_empty() {
        println!("  classifier:           (unset, LLM fallback)");
    } else {
        println!("  classifier:           {}", config.classifier.endpoint);
    }
    println!("Pipeline:");
    println!("  confidence threshold: {}", config.pipeline.confidence_threshold);
    println!("  top N candidates:     {}", config.pipeline.top_n);
    println!("  lexical pool size:    {}", config.pipeline.first_stage_pool);
    println!("  batch limit:          {}", config.pipeline.batch_limit);
    println!("Cache:");
    println!("  TTL (minutes):        {}", config.cache.ttl_minutes);
    println!("  capacity:             {}", config.cache.capacity);
    println!("Storage:");
    println!("  database:             {}", config.storage.resolve_db_path()?.display());

    Ok(())
}

/// Set the guidance confidence threshold
pub fn set_confidence_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("Confidence threshold must be between 0.0 and 1.0");
    }
    let mut config = Config::load()?;
    config.pipeline.confidence_threshold = threshold;
    config.save()?;
    println!("Confidence threshold set to {}", threshold);
    Ok(())
}

/// Set the funnel result size
pub fn set_top_n(top_n: usize) -> Result<()> {
    if top_n == 0 {
        anyhow::bail!("Top N must be at least 1");
    }
    let mut config = Config::load()?;
    config.pipeline.top_n = top_n;
    config.save()?;
    println!("Funnel top N set to {}", top_n);
    Ok(())
}

/// Set the chat model
pub fn set_chat_model(model: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.llm.chat_model = model.to_string();
    config.save()?;
    println!("Chat model set to: {}", model);
    Ok(())
}

/// Set the embedding model
pub fn set_embedding_model(model: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.llm.embedding_model = model.to_string();
    config.save()?;
    println!("Embedding model set to: {}", model);
    Ok(())
}

/// Set the table-structure classifier endpoint
pub fn set_classifier_endpoint(endpoint: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.classifier.endpoint = endpoint.to_string();
    config.save()?;
    println!("Classifier endpoint set to: {}", endpoint);
    Ok(())
}

/// Reset configuration to defaults
pub fn reset_config() -> Result<()> {
    let config = Config::default();
    config.save()?;
    println!("Configuration reset to defaults.");
    Ok(())
}
