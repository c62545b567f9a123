//! Target panel configuration.
//!
//! A target is an antibody–antigen complex with a known reference structure.
//! Panels can be defined in YAML/JSON or inline in `cdrforge.toml`; the
//! built-in reference panel covers EGFR, PDL1, HER2 and VEGFA.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::entities::{CdrRegion, ChainRole};
use crate::error::{CdrForgeError, Result};

// ── Target Specification ─────────────────────────────────────────────────────

/// Chain id carried by each role in the reference structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRoles {
    pub heavy: String,
    pub light: String,
    pub antigen: String,
}

impl ChainRoles {
    pub fn new(heavy: &str, light: &str, antigen: &str) -> Self {
        Self {
            heavy: heavy.to_string(),
            light: light.to_string(),
            antigen: antigen.to_string(),
        }
    }

    pub fn chain_for(&self, role: ChainRole) -> &str {
        match role {
            ChainRole::Heavy => &self.heavy,
            ChainRole::Light => &self.light,
            ChainRole::Antigen => &self.antigen,
        }
    }

    /// Chain ids in heavy, light, antigen order.
    pub fn chain_ids(&self) -> Vec<&str> {
        ChainRole::ALL.iter().map(|r| self.chain_for(*r)).collect()
    }
}

/// A named antibody–antigen target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target label (e.g., "EGFR")
    pub name: String,

    /// Structure repository identifier (e.g., "1YY9")
    pub structure_id: String,

    /// Chain-role mapping inside that structure
    pub chains: ChainRoles,
}

impl TargetSpec {
    pub fn new(name: &str, structure_id: &str, chains: ChainRoles) -> Self {
        Self {
            name: name.to_string(),
            structure_id: structure_id.to_string(),
            chains,
        }
    }
}

/// The four-target reference panel.
pub fn reference_panel() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new("EGFR", "1YY9", ChainRoles::new("D", "C", "A")),
        TargetSpec::new("PDL1", "5XXY", ChainRoles::new("H", "L", "A")),
        TargetSpec::new("HER2", "1N8Z", ChainRoles::new("B", "A", "C")),
        TargetSpec::new("VEGFA", "1BJ1", ChainRoles::new("H", "L", "W")),
    ]
}

// ── Generation Parameters ────────────────────────────────────────────────────

/// Parameters sent to the generation service for every target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Number of variants requested per target
    #[serde(default = "default_variant_count")]
    pub variant_count: u32,

    /// Sampling temperature (> 0)
    #[serde(default = "default_temperature")]
    pub sampling_temperature: f64,

    /// CDRs the service may redesign
    #[serde(default = "default_regions")]
    pub regions: BTreeSet<CdrRegion>,
}

pub fn default_variant_count() -> u32 { 100 }
pub fn default_temperature() -> f64 { 0.8 }
pub fn default_regions() -> BTreeSet<CdrRegion> { CdrRegion::ALL.into_iter().collect() }

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            variant_count: default_variant_count(),
            sampling_temperature: default_temperature(),
            regions: default_regions(),
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if self.variant_count == 0 {
            return Err(CdrForgeError::Config("variant_count must be a positive integer".to_string()));
        }
        if !(self.sampling_temperature > 0.0) || !self.sampling_temperature.is_finite() {
            return Err(CdrForgeError::Config(format!(
                "sampling_temperature must be a positive number, got {}",
                self.sampling_temperature
            )));
        }
        if self.regions.is_empty() {
            return Err(CdrForgeError::Config("at least one design region is required".to_string()));
        }
        Ok(())
    }
}

// ── Target Panel ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPanel {
    pub targets: Vec<TargetSpec>,
}

impl Default for TargetPanel {
    fn default() -> Self {
        Self { targets: reference_panel() }
    }
}

impl TargetPanel {
    /// Load from YAML file
    pub fn from_yaml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let panel: Self = serde_yaml::from_str(&content)?;
        Ok(panel)
    }

    /// Load from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let panel: Self = serde_json::from_str(&content)?;
        Ok(panel)
    }

    /// Load by extension; anything that is not `.json` is read as YAML.
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        if path.ends_with(".json") {
            Self::from_json(path)
        } else {
            Self::from_yaml(path)
        }
    }

    /// Save to YAML file
    pub fn to_yaml(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Keep only the named targets (case-insensitive). Unknown names are a config error.
    pub fn retain_named(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.targets.iter().any(|t| t.name.eq_ignore_ascii_case(name)) {
                return Err(CdrForgeError::Config(format!("unknown target '{}'", name)));
            }
        }
        self.targets
            .retain(|t| names.iter().any(|n| n.eq_ignore_ascii_case(&t.name)));
        Ok(())
    }

    /// Non-empty, unique names, one chain id per role.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(CdrForgeError::Config("target panel is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for t in &self.targets {
            if t.name.trim().is_empty() {
                return Err(CdrForgeError::Config("target name must not be empty".to_string()));
            }
            if !seen.insert(t.name.to_ascii_lowercase()) {
                return Err(CdrForgeError::Config(format!("duplicate target name '{}'", t.name)));
            }
            if t.structure_id.trim().is_empty() {
                return Err(CdrForgeError::Config(format!("[{}] structure_id must not be empty", t.name)));
            }
            for role in ChainRole::ALL {
                if t.chains.chain_for(role).trim().is_empty() {
                    return Err(CdrForgeError::Config(format!(
                        "[{}] {} chain id must not be empty",
                        t.name,
                        role.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
