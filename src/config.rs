//! Configuration: JSON file with serde defaults, plus env overrides
//!
//! Every knob has a default, so a missing or partial config file is fine.
//! `RAG_DB_PATH` and `RAG_DOCS_DIR` override the file when set, which keeps
//! scripted ingestion runs pointable at scratch stores.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "lorebase.json";

pub const ENV_DB_PATH: &str = "RAG_DB_PATH";
pub const ENV_DOCS_DIR: &str = "RAG_DOCS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,

    #[serde(default = "default_glob_pattern")]
    pub glob_pattern: String,

    #[serde(default = "default_source_type")]
    pub source_type: String,

    #[serde(default)]
    pub search: SearchDefaults,

    #[serde(default)]
    pub context: ContextDefaults,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("lorebase.db")
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_glob_pattern() -> String {
    "*.md".to_string()
}

fn default_source_type() -> String {
    "business_doc".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            docs_dir: default_docs_dir(),
            glob_pattern: default_glob_pattern(),
            source_type: default_source_type(),
            search: SearchDefaults::default(),
            context: ContextDefaults::default(),
        }
    }
}

/// Default weights and limits for hybrid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

fn default_weight() -> f32 {
    0.5
}

fn default_top_k() -> usize {
    10
}

fn default_candidate_k() -> usize {
    100
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            keyword_weight: default_weight(),
            semantic_weight: default_weight(),
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
        }
    }
}

/// Default character budget for context formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDefaults {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_min_entry_budget")]
    pub min_entry_budget: usize,

    #[serde(default = "default_entry_overhead")]
    pub entry_overhead: usize,
}

fn default_max_chars() -> usize {
    4000
}

fn default_min_entry_budget() -> usize {
    100
}

fn default_entry_overhead() -> usize {
    10
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_entry_budget: default_min_entry_budget(),
            entry_overhead: default_entry_overhead(),
        }
    }
}

impl Config {
    /// Load config from `lorebase.json` under `dir`, falling back to
    /// defaults when the file is absent, then apply env overrides.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Override file/default values with `RAG_DB_PATH` / `RAG_DOCS_DIR`
    pub fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            if !db_path.is_empty() {
                self.db_path = PathBuf::from(db_path);
            }
        }
        if let Ok(docs_dir) = std::env::var(ENV_DOCS_DIR) {
            if !docs_dir.is_empty() {
                self.docs_dir = PathBuf::from(docs_dir);
            }
        }
    }
}
