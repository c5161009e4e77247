use anyhow::{Context, Result};
use rollcall_core::{MatchPolicy, PipelineConfig, DEFAULT_MIN_FACE_SIZE, DEFAULT_TOLERANCE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// CLI configuration: defaults, then `ROLLCALL_*` environment variables,
/// then an optional TOML file, then command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database holding enrolled descriptors.
    pub db_path: PathBuf,
    /// SeetaFace model used when no explicit face box is given.
    pub model_path: PathBuf,
    /// Cosine similarity a match must exceed.
    pub tolerance: f32,
    /// Minimum face side for enrollment, in pixels.
    pub min_face_size: u32,
    pub match_policy: MatchPolicy,
}

/// On-disk TOML layout; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    tolerance: Option<f32>,
    min_face_size: Option<u32>,
    match_policy: Option<MatchPolicy>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            db_path: var("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("subjects.db")),
            model_path: var("ROLLCALL_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("seeta_fd_frontal_v1.0.bin")),
            tolerance: env_parse(&var, "ROLLCALL_TOLERANCE").unwrap_or(DEFAULT_TOLERANCE),
            min_face_size: env_parse(&var, "ROLLCALL_MIN_FACE_SIZE")
                .unwrap_or(DEFAULT_MIN_FACE_SIZE),
            match_policy: env_parse(&var, "ROLLCALL_MATCH_POLICY").unwrap_or_default(),
        }
    }

    /// Overlay values from a TOML file.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        self.merge_toml(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    fn merge_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if let Some(v) = file.tolerance {
            self.tolerance = v;
        }
        if let Some(v) = file.min_face_size {
            self.min_face_size = v;
        }
        if let Some(v) = file.match_policy {
            self.match_policy = v;
        }
        tracing::debug!(config = ?self, "merged config file");
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tolerance: self.tolerance,
            min_face_size: self.min_face_size,
            match_policy: self.match_policy,
        }
    }
}

fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
