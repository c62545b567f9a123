//! Configuration loading for cdrforge.
//! Reads cdrforge.toml from the current directory, or the path given by
//! `--config` / CDRFORGE_CONFIG.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cdrforge_common::{CdrForgeError, CdrRegion, GenerationParams, TargetPanel, TargetSpec};
use cdrforge_common::target_config::{default_regions, default_temperature, default_variant_count};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_CONFIG_FILE: &str = "cdrforge.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub structure: StructureConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub numbering: Option<NumberingConfig>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_variant_count")]
    pub variant_count: u32,
    #[serde(default = "default_temperature")]
    pub sampling_temperature: f64,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default = "default_regions")]
    pub regions: BTreeSet<CdrRegion>,
}

fn default_output_directory() -> PathBuf { PathBuf::from("results") }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant_count: default_variant_count(),
            sampling_temperature: default_temperature(),
            output_directory: default_output_directory(),
            regions: default_regions(),
        }
    }
}

impl PipelineConfig {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            variant_count: self.variant_count,
            sampling_temperature: self.sampling_temperature,
            regions: self.regions.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructureConfig {
    #[serde(default = "default_structure_url")]
    pub base_url: String,
    #[serde(default = "default_structure_timeout")]
    pub timeout_secs: u64,
}

fn default_structure_url()     -> String { cdrforge_pipeline::pdb::RCSB_DOWNLOAD_URL.to_string() }
fn default_structure_timeout() -> u64    { 30 }

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            base_url: default_structure_url(),
            timeout_secs: default_structure_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    /// Falls back to CDRFORGE_API_KEY when absent.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_endpoint() -> String { "http://127.0.0.1:8000/v1/antibody/generate".to_string() }
fn default_generation_timeout()  -> u64    { 600 }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            api_key: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumberingConfig {
    pub endpoint: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_scheme() -> String { "chothia".to_string() }

/// Blank keys count as absent.
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from))
}

mod tests;

impl Config {
    /// Load configuration.
    ///
    /// An explicitly named file must exist; a missing `./cdrforge.toml`
    /// yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::read(p, true),
            None => Self::read(Path::new(DEFAULT_CONFIG_FILE), false),
        }
    }

    fn read(path: &Path, required: bool) -> anyhow::Result<Self> {
        if !path.exists() {
            if required {
                anyhow::bail!(
                    "Config file not found: {}\n\
                     Copy cdrforge.example.toml to cdrforge.toml and edit it.",
                    path.display()
                );
            }
            tracing::debug!("No {} found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Targets from the `[[targets]]` tables, or the reference panel when none are given.
    pub fn panel(&self) -> TargetPanel {
        if self.targets.is_empty() {
            TargetPanel::default()
        } else {
            TargetPanel { targets: self.targets.clone() }
        }
    }

    pub fn validate(&self) -> Result<(), CdrForgeError> {
        self.pipeline.generation_params().validate()?;
        if self.structure.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(CdrForgeError::Config("timeout_secs must be greater than zero".to_string()));
        }
        if self.generation.endpoint.trim().is_empty() {
            return Err(CdrForgeError::Config("generation.endpoint must not be empty".to_string()));
        }
        if let Some(numbering) = &self.numbering {
            if numbering.endpoint.trim().is_empty() {
                return Err(CdrForgeError::Config("numbering.endpoint must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
