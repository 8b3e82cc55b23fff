//! Configuration loading for Soundlift services
//!
//! Resolution priority: `SOUNDLIFT_CONFIG` environment variable → user config
//! file (`~/.config/soundlift/soundlift.toml`) → compiled defaults.
//!
//! The configuration is read exactly once at process start into an immutable
//! [`PipelineConfig`]; components receive it by reference through their
//! constructors and never consult ambient environment state mid-operation.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete pipeline configuration, resolved once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    /// Named environments (e.g. `dev`, `prod`), each with its own root folder
    #[serde(default)]
    pub environment: HashMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Present only where a promotion source exists; the promotion service
    /// refuses to start without it
    #[serde(default)]
    pub promotion: Option<PromotionConfig>,
}

/// Identity of the local service instance
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Which named environment this instance owns
    #[serde(default = "default_environment_name")]
    pub environment: String,
    /// Ingest service listen address
    #[serde(default = "default_ingest_listen")]
    pub listen_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment_name(),
            listen_addr: default_ingest_listen(),
        }
    }
}

/// One environment's storage locations
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Root folder holding the database, media area, and upload area
    pub root_folder: PathBuf,
    /// Base URL under which this environment's media is served
    pub public_base_url: String,
}

impl EnvironmentConfig {
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("soundlift.db")
    }

    pub fn media_root(&self) -> PathBuf {
        self.root_folder.join("media")
    }

    pub fn upload_root(&self) -> PathBuf {
        self.root_folder.join("upload")
    }
}

/// Ingestion gates and concurrency limits
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Smallest acceptable upload (default 1 KB)
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
    /// Largest acceptable upload (default 100 MB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Bytes of the object head scanned for malicious markers
    #[serde(default = "default_scan_window")]
    pub scan_window_bytes: usize,
    /// Concurrent object ingestions; unset uses the per-environment default
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Upload-area poll interval in seconds; 0 disables the watcher
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_bytes: default_min_bytes(),
            max_bytes: default_max_bytes(),
            scan_window_bytes: default_scan_window(),
            concurrency: None,
            watch_interval_secs: default_watch_interval(),
        }
    }
}

impl IngestConfig {
    /// Concurrency cap for an environment: production absorbs real upload
    /// traffic (10), staging stays small (2)
    pub fn concurrency_for(&self, environment: &str) -> usize {
        self.concurrency
            .unwrap_or(if environment == "prod" { 10 } else { 2 })
    }
}

/// Promotion policy and schedule for one source → target environment pair
#[derive(Debug, Clone, Deserialize)]
pub struct PromotionConfig {
    /// Source environment name (where candidates are staged)
    pub source: String,
    /// Target environment name (where promoted content lands)
    pub target: String,
    /// Promotion service listen address
    #[serde(default = "default_promotion_listen")]
    pub listen_addr: String,
    /// Minimum record age before automatic promotion (the soak window)
    #[serde(default = "default_min_soak_hours")]
    pub min_soak_hours: i64,
    /// Whether an explicit manual promotion may skip the age gate.
    /// Inherited operator behavior, kept as policy pending product
    /// confirmation.
    #[serde(default = "default_true")]
    pub manual_bypasses_age_gate: bool,
    /// Batch size cap per orchestrator run
    #[serde(default = "default_max_promotions")]
    pub max_promotions: usize,
    /// Scheduled batch cadence in hours; 0 disables the schedule
    #[serde(default = "default_schedule_hours")]
    pub schedule_hours: u64,
    /// Concurrent per-track promotions within a batch
    #[serde(default = "default_promotion_concurrency")]
    pub concurrency: usize,
    /// Per-track promotion timeout in seconds
    #[serde(default = "default_track_timeout")]
    pub track_timeout_secs: u64,
}

impl PipelineConfig {
    /// Look up a named environment
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environment
            .get(name)
            .ok_or_else(|| Error::Config(format!("environment '{}' is not configured", name)))
    }

    /// Resolve the promotion source/target environment pair
    pub fn promotion_pair(&self) -> Result<(&PromotionConfig, &EnvironmentConfig, &EnvironmentConfig)> {
        let promotion = self.promotion.as_ref().ok_or_else(|| {
            Error::Config(
                "promotion is not configured; add a [promotion] section with \
                 'source' and 'target' environments"
                    .to_string(),
            )
        })?;
        let source = self.environment(&promotion.source)?;
        let target = self.environment(&promotion.target)?;
        Ok((promotion, source, target))
    }

    fn validate(&self) -> Result<()> {
        if let Some(promotion) = &self.promotion {
            if promotion.source == promotion.target {
                return Err(Error::Config(format!(
                    "promotion source and target are both '{}'",
                    promotion.source
                )));
            }
            self.environment(&promotion.source)?;
            self.environment(&promotion.target)?;
        }
        if !self.environment.is_empty() {
            self.environment(&self.service.environment)?;
        }
        Ok(())
    }
}

/// Load configuration: env var path → user config file → compiled defaults
pub fn load() -> Result<PipelineConfig> {
    let path = resolve_config_path();
    let config = match &path {
        Some(p) if p.exists() => {
            info!("Loading configuration from {}", p.display());
            parse_file(p)?
        }
        _ => {
            info!("No configuration file found, using compiled defaults");
            default_config()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Parse a specific configuration file (used by tests and `--config` style
/// tooling)
pub fn parse_file(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
    let config: PipelineConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SOUNDLIFT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("soundlift").join("soundlift.toml"))
}

/// Compiled defaults: dev and prod environments under the local data dir
fn default_config() -> PipelineConfig {
    let data_root = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("soundlift");

    let mut environment = HashMap::new();
    environment.insert(
        "dev".to_string(),
        EnvironmentConfig {
            root_folder: data_root.join("dev"),
            public_base_url: "https://media.dev.soundlift.local".to_string(),
        },
    );
    environment.insert(
        "prod".to_string(),
        EnvironmentConfig {
            root_folder: data_root.join("prod"),
            public_base_url: "https://media.soundlift.local".to_string(),
        },
    );

    PipelineConfig {
        service: ServiceConfig::default(),
        environment,
        ingest: IngestConfig::default(),
        promotion: Some(PromotionConfig {
            source: "dev".to_string(),
            target: "prod".to_string(),
            listen_addr: default_promotion_listen(),
            min_soak_hours: default_min_soak_hours(),
            manual_bypasses_age_gate: true,
            max_promotions: default_max_promotions(),
            schedule_hours: default_schedule_hours(),
            concurrency: default_promotion_concurrency(),
            track_timeout_secs: default_track_timeout(),
        }),
    }
}

fn default_environment_name() -> String {
    "dev".to_string()
}

fn default_ingest_listen() -> String {
    "127.0.0.1:6710".to_string()
}

fn default_promotion_listen() -> String {
    "127.0.0.1:6711".to_string()
}

fn default_min_bytes() -> u64 {
    1024
}

fn default_max_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_scan_window() -> usize {
    1024
}

fn default_watch_interval() -> u64 {
    60
}

fn default_min_soak_hours() -> i64 {
    24
}

fn default_max_promotions() -> usize {
    10
}

fn default_schedule_hours() -> u64 {
    6
}

fn default_promotion_concurrency() -> usize {
    2
}

fn default_track_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [service]
        environment = "dev"
        listen_addr = "127.0.0.1:7000"

        [environment.dev]
        root_folder = "/srv/soundlift/dev"
        public_base_url = "https://media.dev.example.com"

        [environment.prod]
        root_folder = "/srv/soundlift/prod"
        public_base_url = "https://media.example.com"

        [ingest]
        min_bytes = 2048

        [promotion]
        source = "dev"
        target = "prod"
        min_soak_hours = 12
    "#;

    #[test]
    fn parses_sample_toml() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.service.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.ingest.min_bytes, 2048);
        // Defaults fill unspecified fields
        assert_eq!(config.ingest.max_bytes, 100 * 1024 * 1024);

        let (promotion, source, target) = config.promotion_pair().unwrap();
        assert_eq!(promotion.min_soak_hours, 12);
        assert_eq!(promotion.max_promotions, 10);
        assert!(promotion.manual_bypasses_age_gate);
        assert_eq!(source.media_root(), PathBuf::from("/srv/soundlift/dev/media"));
        assert_eq!(
            target.database_path(),
            PathBuf::from("/srv/soundlift/prod/soundlift.db")
        );
    }

    #[test]
    fn parse_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundlift.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = parse_file(&path).unwrap();
        assert_eq!(config.service.environment, "dev");

        assert!(parse_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn ingest_concurrency_defaults_by_environment() {
        let config = IngestConfig::default();
        assert_eq!(config.concurrency_for("prod"), 10);
        assert_eq!(config.concurrency_for("dev"), 2);

        let pinned = IngestConfig {
            concurrency: Some(4),
            ..IngestConfig::default()
        };
        assert_eq!(pinned.concurrency_for("prod"), 4);
    }

    #[test]
    fn rejects_self_promotion() {
        let toml = r#"
            [environment.dev]
            root_folder = "/srv/dev"
            public_base_url = "https://dev.example"

            [promotion]
            source = "dev"
            target = "dev"
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_unknown_promotion_environment() {
        let toml = r#"
            [environment.dev]
            root_folder = "/srv/dev"
            public_base_url = "https://dev.example"

            [promotion]
            source = "dev"
            target = "prod"
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_promotion_section_is_reported() {
        let toml = r#"
            [environment.dev]
            root_folder = "/srv/dev"
            public_base_url = "https://dev.example"
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert!(config.promotion_pair().is_err());
    }
}
