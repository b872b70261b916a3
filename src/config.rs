//! TOML configuration.
//!
//! Only `[knowledge].root` is required; every other section has defaults.
//! See `config/kd.example.toml` for a complete file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use knowledge_digest_core::merge::{
    MergeSettings, CONTENT_PREFIX_CHARS, DEFAULT_MANIFEST_NAME, DIGEST_MERGE_THRESHOLD,
    FALLBACK_CATEGORY_SLUG, UPLOAD_MERGE_THRESHOLD,
};
use knowledge_digest_core::message::DEFAULT_MERGE_WINDOW_SECS;
use knowledge_digest_core::taxonomy::Taxonomy;
use knowledge_digest_core::title::DEFAULT_TITLE_MAX_CHARS;

/// Most messages a single screening call may carry.
pub const MAX_SCREENING_BATCH: usize = 20;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    pub root: PathBuf,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
}

fn default_url_prefix() -> String {
    "/docs".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

fn default_manifest_name() -> String {
    DEFAULT_MANIFEST_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaxonomyConfig {
    /// Versioned taxonomy file. The built-in taxonomy is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    #[serde(default = "default_upload_threshold")]
    pub upload_threshold: f64,
    #[serde(default = "default_digest_threshold")]
    pub digest_threshold: f64,
    #[serde(default = "default_content_prefix_chars")]
    pub content_prefix_chars: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            upload_threshold: UPLOAD_MERGE_THRESHOLD,
            digest_threshold: DIGEST_MERGE_THRESHOLD,
            content_prefix_chars: CONTENT_PREFIX_CHARS,
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
        }
    }
}

fn default_upload_threshold() -> f64 {
    UPLOAD_MERGE_THRESHOLD
}
fn default_digest_threshold() -> f64 {
    DIGEST_MERGE_THRESHOLD
}
fn default_content_prefix_chars() -> usize {
    CONTENT_PREFIX_CHARS
}
fn default_title_max_chars() -> usize {
    DEFAULT_TITLE_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_merge_window_secs")]
    pub merge_window_secs: i64,
    /// Digest topics below this importance stay out of the knowledge base.
    #[serde(default = "default_kb_min_importance")]
    pub kb_min_importance: u8,
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merge_window_secs: DEFAULT_MERGE_WINDOW_SECS,
            kb_min_importance: 3,
            reports_dir: None,
        }
    }
}

fn default_merge_window_secs() -> i64 {
    DEFAULT_MERGE_WINDOW_SECS
}
fn default_kb_min_importance() -> u8 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Cheaper model for screening. Falls back to `model`.
    #[serde(default)]
    pub screening_model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            screening_model: None,
            url: None,
            api_key_env: default_api_key_env(),
            batch_size: MAX_SCREENING_BATCH,
            batch_delay_ms: 1000,
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    MAX_SCREENING_BATCH
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model used for the economy tier.
    pub fn screening_model(&self) -> Option<&str> {
        self.screening_model.as_deref().or(self.model.as_deref())
    }
}

/// Which pipeline a merge runs in; each has its own auto-merge threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Upload,
    Digest,
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            knowledge: KnowledgeConfig {
                root: PathBuf::from("./content/docs"),
                url_prefix: default_url_prefix(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                manifest_name: default_manifest_name(),
            },
            taxonomy: TaxonomyConfig::default(),
            merge: MergeConfig::default(),
            pipeline: PipelineConfig::default(),
            ai: AiConfig::default(),
        }
    }

    /// Load the configured taxonomy file, or the built-in one.
    pub fn load_taxonomy(&self) -> Result<Taxonomy> {
        match &self.taxonomy.path {
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read taxonomy file: {}", path.display())
                })?;
                Taxonomy::from_toml_str(&content)
                    .with_context(|| format!("Invalid taxonomy file: {}", path.display()))
            }
            None => Ok(Taxonomy::builtin()),
        }
    }

    pub fn merge_settings(&self, stage: MergeStage) -> MergeSettings {
        let threshold = match stage {
            MergeStage::Upload => self.merge.upload_threshold,
            MergeStage::Digest => self.merge.digest_threshold,
        };
        MergeSettings {
            threshold,
            content_prefix_chars: self.merge.content_prefix_chars,
            title_max_chars: self.merge.title_max_chars,
            url_prefix: self.knowledge.url_prefix.clone(),
            manifest_name: self.knowledge.manifest_name.clone(),
            fallback_category: FALLBACK_CATEGORY_SLUG.to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate merge
    for (name, value) in [
        ("merge.upload_threshold", config.merge.upload_threshold),
        ("merge.digest_threshold", config.merge.digest_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if config.merge.title_max_chars == 0 {
        bail!("merge.title_max_chars must be > 0");
    }

    // Validate pipeline
    if config.pipeline.merge_window_secs < 0 {
        bail!("pipeline.merge_window_secs must be >= 0");
    }
    if !(1..=5).contains(&config.pipeline.kb_min_importance) {
        bail!("pipeline.kb_min_importance must be in 1..=5");
    }

    // Validate knowledge
    if config.knowledge.manifest_name.trim().is_empty() {
        bail!("knowledge.manifest_name must not be empty");
    }

    // Validate ai
    if !(1..=MAX_SCREENING_BATCH).contains(&config.ai.batch_size) {
        bail!("ai.batch_size must be in 1..={}", MAX_SCREENING_BATCH);
    }
    match config.ai.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown AI provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.ai.is_enabled() && config.ai.model.is_none() {
        bail!(
            "ai.model must be specified when provider is '{}'",
            config.ai.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let cfg = parse_config("[knowledge]\nroot = \"./kb\"\n").unwrap();
        assert_eq!(cfg.knowledge.url_prefix, "/docs");
        assert_eq!(cfg.knowledge.include_globs, vec!["**/*.md", "**/*.mdx"]);
        assert_eq!(cfg.merge.upload_threshold, 0.4);
        assert_eq!(cfg.merge.digest_threshold, 0.55);
        assert_eq!(cfg.pipeline.merge_window_secs, 300);
        assert!(!cfg.ai.is_enabled());
        assert_eq!(cfg.ai.batch_size, 20);
    }

    #[test]
    fn test_merge_settings_per_stage() {
        let cfg = parse_config(
            "[knowledge]\nroot = \"./kb\"\nurl_prefix = \"/kb\"\n[merge]\nupload_threshold = 0.3\n",
        )
        .unwrap();
        let upload = cfg.merge_settings(MergeStage::Upload);
        let digest = cfg.merge_settings(MergeStage::Digest);
        assert_eq!(upload.threshold, 0.3);
        assert_eq!(digest.threshold, 0.55);
        assert_eq!(upload.url_prefix, "/kb");
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = parse_config("[knowledge]\nroot = \"kb\"\n[merge]\ndigest_threshold = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("merge.digest_threshold"));
    }

    #[test]
    fn test_rejects_oversized_batch() {
        let err =
            parse_config("[knowledge]\nroot = \"kb\"\n[ai]\nbatch_size = 50\n").unwrap_err();
        assert!(err.to_string().contains("ai.batch_size"));
    }

    #[test]
    fn test_enabled_provider_requires_model() {
        let err =
            parse_config("[knowledge]\nroot = \"kb\"\n[ai]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("ai.model"));

        let err = parse_config("[knowledge]\nroot = \"kb\"\n[ai]\nprovider = \"claude\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown AI provider"));
    }

    #[test]
    fn test_screening_model_falls_back() {
        let mut ai = AiConfig {
            model: Some("gpt-4o".to_string()),
            ..AiConfig::default()
        };
        assert_eq!(ai.screening_model(), Some("gpt-4o"));
        ai.screening_model = Some("gpt-4o-mini".to_string());
        assert_eq!(ai.screening_model(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_load_taxonomy_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.toml");
        std::fs::write(
            &path,
            "version = \"7\"\n[[categories]]\nname = \"工具\"\nslug = \"tools\"\n",
        )
        .unwrap();
        let mut cfg = Config::minimal();
        cfg.taxonomy.path = Some(path);
        let taxonomy = cfg.load_taxonomy().unwrap();
        assert_eq!(taxonomy.version(), "7");
        assert_eq!(taxonomy.len(), 1);

        assert_eq!(Config::minimal().load_taxonomy().unwrap().len(), 8);
    }
}
