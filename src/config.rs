//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so a missing config file yields a working
//! configuration for the default knowledge base. The deployment secrets are
//! usually provided through the environment instead of the file:
//!
//! | Env var | Overrides |
//! |---------|-----------|
//! | `KB_ID` | `knowledge_base.id` |
//! | `AWS_REGION` | `knowledge_base.region` |
//! | `MODEL_ID` | `knowledge_base.model_id` |
//! | `APP_PASSWORD` | `server.password` |
//! | `S3_BUCKET` | `storage.bucket` |
//!
//! ```toml
//! [knowledge_base]
//! id = "ENBRB90GYL"
//! region = "us-east-1"
//! model_id = "anthropic.claude-3-haiku-20240307-v1:0"
//!
//! [citations]
//! style = "footnotes"
//! link_base_url = "https://www.sos.ms.gov/adminsearch/ACCode/"
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::format::CitationStyle;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub citations: CitationsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_id")]
    pub id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Full model ARN; derived from `model_id` and `region` when unset.
    #[serde(default)]
    pub model_arn: Option<String>,
    /// Alternate runtime endpoint (local stubs, VPC endpoints).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            id: default_kb_id(),
            region: default_region(),
            model_id: default_model_id(),
            model_arn: None,
            endpoint_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl KnowledgeBaseConfig {
    /// The generation model ARN sent with every query.
    pub fn model_arn(&self) -> String {
        match self.model_arn {
            Some(ref arn) => arn.clone(),
            None => format!(
                "arn:aws:bedrock:{}::foundation-model/{}",
                self.region, self.model_id
            ),
        }
    }
}

fn default_kb_id() -> String {
    "ENBRB90GYL".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CitationsConfig {
    #[serde(default)]
    pub style: CitationStyle,
    #[serde(default = "default_link_base_url")]
    pub link_base_url: String,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            style: CitationStyle::default(),
            link_base_url: default_link_base_url(),
        }
    }
}

fn default_link_base_url() -> String {
    "https://www.sos.ms.gov/adminsearch/ACCode/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared password for the chat UI. No gate when unset.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    /// Sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            password: None,
            title: default_title(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_session_idle_secs() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    1000
}
fn default_title() -> String {
    "Mississippi SoS Assistant".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
    /// Minimum trimmed first-page characters for a PDF to count as text.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_min_text_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Defaults to the knowledge-base region.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
    /// S3-compatible endpoint (MinIO, LocalStack). Uses path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: None,
            root: default_data_root(),
            endpoint_url: None,
        }
    }
}

fn default_bucket() -> String {
    "ms-sos-regulations-data-december-2025".to_string()
}

impl Config {
    /// Region used for storage calls.
    pub fn storage_region(&self) -> &str {
        self.storage
            .region
            .as_deref()
            .unwrap_or(&self.knowledge_base.region)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("KB_ID") {
            self.knowledge_base.id = v;
        }
        if let Some(v) = var("AWS_REGION") {
            self.knowledge_base.region = v;
        }
        if let Some(v) = var("MODEL_ID") {
            self.knowledge_base.model_id = v;
        }
        if let Some(v) = var("APP_PASSWORD") {
            self.server.password = Some(v);
        }
        if let Some(v) = var("S3_BUCKET") {
            self.storage.bucket = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.knowledge_base.id.trim().is_empty() {
            bail!("knowledge_base.id must not be empty");
        }
        if self.knowledge_base.timeout_secs == 0 {
            bail!("knowledge_base.timeout_secs must be > 0");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket must not be empty");
        }
        if self.metadata.min_text_chars == 0 {
            bail!("metadata.min_text_chars must be > 0");
        }
        if self.server.session_idle_secs == 0 {
            bail!("server.session_idle_secs must be > 0");
        }
        if self.server.max_sessions == 0 {
            bail!("server.max_sessions must be > 0");
        }
        if !is_host_port(&self.server.bind) {
            bail!("server.bind must be HOST:PORT, got: {}", self.server.bind);
        }
        Ok(())
    }
}

/// `host:port` with a numeric port; the host may be a name, an IPv4 address
/// or a bracketed IPv6 address.
fn is_host_port(bind: &str) -> bool {
    match bind.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Load configuration from `path`, then apply environment overrides.
///
/// A missing file is not an error; defaults are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |name| std::env::var(name).ok())
}

fn load_config_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.apply_overrides(lookup);
    config.validate()?;
    Ok(config)
}
