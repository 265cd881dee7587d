use crate::config::{
    DEFAULT_BASE_LABEL, DEFAULT_BATCH_SIZE, DEFAULT_BOLT_URI, DEFAULT_OUTPUT_DIR,
    NEO4J_PASSWORD_ENV,
};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Validate against the schema and count, write nothing
    DryRun,
    /// neo4j-admin bulk import CSV files
    Csv,
    /// Write straight into a running Neo4j over Bolt
    Neo4j,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Csv,
            directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Label every node carries in addition to its own
    pub base_label: String,
    pub batch_size: usize,
    /// Delete everything in the database before loading
    pub wipe: bool,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_BOLT_URI.to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            base_label: DEFAULT_BASE_LABEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            wipe: false,
        }
    }
}

/// Everything one pipeline run needs. Built once at start-up and passed down;
/// nothing reads configuration from anywhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// SBGN-ML document to load
    pub input: PathBuf,
    /// Schema configuration YAML
    pub schema_config: PathBuf,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>, schema_config: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            schema_config: schema_config.into(),
            output: OutputConfig::default(),
            neo4j: Neo4jConfig::default(),
        }
    }

    /// Reads the pipeline YAML and applies the `NEO4J_PASSWORD` override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline configuration: {}", path.display()))?;
        let mut config = Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid pipeline configuration: {}", path.display()))?;

        if let Ok(password) = std::env::var(NEO4J_PASSWORD_ENV) {
            debug!("Using Neo4j password from {}", NEO4J_PASSWORD_ENV);
            config.neo4j.password = password;
        }
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("Failed to parse pipeline YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            bail!("'input' must name an SBGN-ML file");
        }
        if self.schema_config.as_os_str().is_empty() {
            bail!("'schema_config' must name a schema YAML file");
        }
        if self.neo4j.batch_size == 0 {
            bail!("'neo4j.batch_size' must be greater than zero");
        }
        if self.neo4j.base_label.trim().is_empty() {
            bail!("'neo4j.base_label' must not be empty");
        }
        Ok(())
    }
}
