//! Core entity types that flow between pipeline stages.
//! Every value here is created and dropped within one pipeline invocation;
//! only the artifacts written from them outlive a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Chain roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    Heavy,
    Light,
    Antigen,
}

impl ChainRole {
    pub const ALL: [ChainRole; 3] = [ChainRole::Heavy, ChainRole::Light, ChainRole::Antigen];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRole::Heavy => "heavy",
            ChainRole::Light => "light",
            ChainRole::Antigen => "antigen",
        }
    }
}

// ---------------------------------------------------------------------------
// CDR regions
// ---------------------------------------------------------------------------

/// One of the six complementarity-determining regions of an antibody.
///
/// Used both to tell the generation service which loops to redesign and to
/// name the annotated region columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CdrRegion {
    #[serde(rename = "CDRH1")]
    H1,
    #[serde(rename = "CDRH2")]
    H2,
    #[serde(rename = "CDRH3")]
    H3,
    #[serde(rename = "CDRL1")]
    L1,
    #[serde(rename = "CDRL2")]
    L2,
    #[serde(rename = "CDRL3")]
    L3,
}

impl CdrRegion {
    pub const ALL: [CdrRegion; 6] = [
        CdrRegion::H1,
        CdrRegion::H2,
        CdrRegion::H3,
        CdrRegion::L1,
        CdrRegion::L2,
        CdrRegion::L3,
    ];

    /// Which variant field the region is read from.
    pub fn chain_role(&self) -> ChainRole {
        match self {
            CdrRegion::H1 | CdrRegion::H2 | CdrRegion::H3 => ChainRole::Heavy,
            CdrRegion::L1 | CdrRegion::L2 | CdrRegion::L3 => ChainRole::Light,
        }
    }

    /// 1, 2 or 3.
    pub fn ordinal(&self) -> usize {
        match self {
            CdrRegion::H1 | CdrRegion::L1 => 1,
            CdrRegion::H2 | CdrRegion::L2 => 2,
            CdrRegion::H3 | CdrRegion::L3 => 3,
        }
    }

    /// Column name used in tabular artifacts, e.g. `heavy_cdr3`.
    pub fn column_name(&self) -> &'static str {
        match self {
            CdrRegion::H1 => "heavy_cdr1",
            CdrRegion::H2 => "heavy_cdr2",
            CdrRegion::H3 => "heavy_cdr3",
            CdrRegion::L1 => "light_cdr1",
            CdrRegion::L2 => "light_cdr2",
            CdrRegion::L3 => "light_cdr3",
        }
    }

    /// Wire name, e.g. `CDRH3`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            CdrRegion::H1 => "CDRH1",
            CdrRegion::H2 => "CDRH2",
            CdrRegion::H3 => "CDRH3",
            CdrRegion::L1 => "CDRL1",
            CdrRegion::L2 => "CDRL2",
            CdrRegion::L3 => "CDRL3",
        }
    }
}

impl fmt::Display for CdrRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Structure record
// ---------------------------------------------------------------------------

/// Raw structure text fetched for one target.
///
/// Targets that name the same structure share one copy of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureRecord {
    pub target: String,
    pub structure_id: String,
    pub text: Arc<str>,
}

// ---------------------------------------------------------------------------
// Chain sequences
// ---------------------------------------------------------------------------

/// Chain id -> one-letter amino-acid sequence, ordered by chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainSequenceSet(BTreeMap<String, String>);

impl ChainSequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: impl Into<String>, sequence: impl Into<String>) {
        self.0.insert(chain_id.into(), sequence.into());
    }

    pub fn get(&self, chain_id: &str) -> Option<&str> {
        self.0.get(chain_id).map(String::as_str)
    }

    pub fn contains(&self, chain_id: &str) -> bool {
        self.0.contains_key(chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as FASTA, one record per chain, headers `>{target}_{chain}`,
    /// sequence lines wrapped at 60 residues.
    pub fn to_fasta(&self, target: &str) -> String {
        let mut out = String::new();
        for (chain, seq) in self.iter() {
            out.push_str(&format!(">{}_{}\n", target, chain));
            if seq.is_empty() {
                out.push('\n');
                continue;
            }
            for line in seq.as_bytes().chunks(60) {
                out.push_str(&String::from_utf8_lossy(line));
                out.push('\n');
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// One candidate antibody returned by the generation service.
///
/// Numeric fields are optional: the service may omit any of them, and an
/// omitted value stays undefined all the way into the combined dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub heavy: String,
    pub light: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub global_score: Option<f64>,
    #[serde(default, rename = "mutations")]
    pub mutation_count: Option<u32>,
    #[serde(default, rename = "seq_recovery")]
    pub sequence_recovery: Option<f64>,
}

impl Variant {
    pub fn new(heavy: &str, light: &str) -> Self {
        Self {
            heavy: heavy.to_string(),
            light: light.to_string(),
            score: None,
            global_score: None,
            mutation_count: None,
            sequence_recovery: None,
        }
    }
}

/// Ordered variants generated for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantBatch {
    pub target: String,
    pub variants: Vec<Variant>,
}

impl VariantBatch {
    pub fn new(target: &str, variants: Vec<Variant>) -> Self {
        Self { target: target.to_string(), variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}
