use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

fn default_exclude_globs() -> Vec<String> {
    vec!["**/.git".to_string(), "**/.git/**".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    #[serde(default = "default_overview_chars")]
    pub overview_chars: usize,
    #[serde(default = "default_max_domain_phrases")]
    pub max_domain_phrases: usize,
    #[serde(default)]
    pub max_extract_bytes: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            preview_chars: default_preview_chars(),
            summary_chars: default_summary_chars(),
            overview_chars: default_overview_chars(),
            max_domain_phrases: default_max_domain_phrases(),
            max_extract_bytes: None,
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    64
}
fn default_preview_chars() -> usize {
    1500
}
fn default_summary_chars() -> usize {
    300
}
fn default_overview_chars() -> usize {
    500
}
fn default_max_domain_phrases() -> usize {
    10
}

/// Vocabularies used by the keyword enricher.
#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_industries")]
    pub industries: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_technologies")]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub partners: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            industries: default_industries(),
            technologies: default_technologies(),
            clients: Vec::new(),
            partners: Vec::new(),
            products: Vec::new(),
        }
    }
}

fn default_industries() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 7] = [
        (
            "Finance",
            &["investment", "banking", "portfolio", "equity", "trading", "fintech"],
        ),
        (
            "Healthcare",
            &["patient", "clinical", "diagnosis", "hospital", "biotech", "pharma"],
        ),
        (
            "Education",
            &["curriculum", "learning", "pedagogy", "school", "university", "edtech"],
        ),
        (
            "Manufacturing",
            &["supply chain", "factory", "production", "automation", "lean"],
        ),
        (
            "Technology",
            &["AI", "machine learning", "cloud", "data", "software", "IoT"],
        ),
        (
            "Retail",
            &["ecommerce", "inventory", "POS", "customer", "store", "shopping"],
        ),
        (
            "Legal",
            &["compliance", "contract", "litigation", "regulation", "law", "jurisdiction"],
        ),
    ];
    table
        .iter()
        .map(|(industry, words)| {
            (
                industry.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}

fn default_technologies() -> Vec<String> {
    vec![
        "Azure".to_string(),
        "Terraform".to_string(),
        "Kubernetes".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Sqlite,
    Memory,
    Disabled,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default)]
    pub backend: GraphBackend,
    #[serde(default = "default_graph_path")]
    pub path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::default(),
            path: default_graph_path(),
        }
    }
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("./data/docgraph.sqlite")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Defaults-only configuration rooted at `root`, for runs without a file.
    pub fn minimal(root: PathBuf) -> Self {
        Self {
            source: SourceConfig {
                root,
                exclude_globs: default_exclude_globs(),
            },
            pipeline: PipelineConfig::default(),
            enrichment: EnrichmentConfig::default(),
            graph: GraphConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            anyhow::bail!("pipeline.concurrency must be >= 1");
        }
        if self.pipeline.queue_capacity == 0 {
            anyhow::bail!("pipeline.queue_capacity must be >= 1");
        }
        if self.pipeline.max_extract_bytes == Some(0) {
            anyhow::bail!("pipeline.max_extract_bytes must be > 0 when set");
        }
        for (industry, words) in &self.enrichment.industries {
            if words.iter().all(|w| w.trim().is_empty()) {
                anyhow::bail!("enrichment.industries.{} has no keywords", industry);
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_file_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [source]
            root = "/data/km"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.pipeline.max_domain_phrases, 10);
        assert_eq!(config.graph.backend, GraphBackend::Sqlite);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.enrichment.industries.contains_key("Finance"));
        assert_eq!(config.enrichment.technologies.len(), 3);
    }

    #[test]
    fn parses_backend_and_vocabulary_overrides() {
        let config: Config = toml::from_str(
            r#"
            [source]
            root = "/data/km"

            [graph]
            backend = "memory"

            [enrichment]
            technologies = ["Rust"]
            partners = ["Globex"]

            [enrichment.industries]
            Energy = ["solar", "grid"]
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Memory);
        assert_eq!(config.enrichment.technologies, vec!["Rust"]);
        assert_eq!(config.enrichment.industries.len(), 1);
        assert_eq!(config.enrichment.partners, vec!["Globex"]);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::minimal(PathBuf::from("."));
        config.pipeline.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
