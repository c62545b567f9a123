//! CDR annotation and per-region diversity.
//!
//! Regions come from an antibody numbering service when one is configured.
//! Without it, or once it fails, fixed residue windows approximate the CDRs:
//!
//! | Chain class | CDR1 | CDR2 | CDR3 |
//! |-------------|------|------|------|
//! | heavy | [26,35) | [52,66) | [99,106) |
//! | light | [24,34) | [50,56) | [89,97) |
//!
//! The chain class for the windows is guessed from length alone (more than
//! 200 residues ⇒ heavy). That rule is a rough approximation and is applied
//! to both the heavy and light fields of every variant.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use cdrforge_common::sandbox::SandboxClient as Client;
use cdrforge_common::{CdrRegion, ChainRole, Variant, VariantBatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Sequences shorter than this carry no regions at all.
pub const MIN_ANNOTATABLE_LEN: usize = 50;

/// Sequences longer than this are treated as heavy chains.
pub const HEAVY_LENGTH_THRESHOLD: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainClass {
    Heavy,
    Light,
}

impl ChainClass {
    pub fn infer(sequence: &str) -> Self {
        if sequence.len() > HEAVY_LENGTH_THRESHOLD {
            ChainClass::Heavy
        } else {
            ChainClass::Light
        }
    }

    pub fn windows(&self) -> [Range<usize>; 3] {
        match self {
            ChainClass::Heavy => [26..35, 52..66, 99..106],
            ChainClass::Light => [24..34, 50..56, 89..97],
        }
    }
}

/// The three CDR substrings of one chain; `None` where undefined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRegions {
    pub cdr1: Option<String>,
    pub cdr2: Option<String>,
    pub cdr3: Option<String>,
}

impl ChainRegions {
    pub fn get(&self, ordinal: usize) -> Option<&str> {
        match ordinal {
            1 => self.cdr1.as_deref(),
            2 => self.cdr2.as_deref(),
            3 => self.cdr3.as_deref(),
            _ => None,
        }
    }
}

/// Window-based CDR extraction.
pub fn extract_regions(sequence: &str) -> ChainRegions {
    if sequence.len() < MIN_ANNOTATABLE_LEN {
        return ChainRegions::default();
    }
    let [r1, r2, r3] = ChainClass::infer(sequence).windows();
    let slice = |r: Range<usize>| sequence.get(r).map(str::to_string);
    ChainRegions {
        cdr1: slice(r1),
        cdr2: slice(r2),
        cdr3: slice(r3),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    Numbering,
    Heuristic,
}

impl RegionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionSource::Numbering => "numbering",
            RegionSource::Heuristic => "heuristic",
        }
    }
}

/// A variant with its six CDR values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedVariant {
    pub variant: Variant,
    pub heavy: ChainRegions,
    pub light: ChainRegions,
    pub source: RegionSource,
}

impl AnnotatedVariant {
    pub fn region(&self, region: CdrRegion) -> Option<&str> {
        let chain = match region.chain_role() {
            ChainRole::Heavy => &self.heavy,
            _ => &self.light,
        };
        chain.get(region.ordinal())
    }
}

// ── Numbering service ────────────────────────────────────────────────────────

/// Schema-aware antibody numbering (IMGT, Chothia, Kabat ...).
#[async_trait]
pub trait NumberingService: Send + Sync {
    async fn number(&self, sequence: &str, scheme: &str) -> anyhow::Result<ChainRegions>;
}

#[derive(Serialize)]
struct NumberingRequest<'a> {
    sequence: &'a str,
    scheme: &'a str,
}

pub struct HttpNumberingService {
    client: Client,
    endpoint: String,
}

impl HttpNumberingService {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl NumberingService for HttpNumberingService {
    #[instrument(skip(self, sequence), fields(len = sequence.len()))]
    async fn number(&self, sequence: &str, scheme: &str) -> anyhow::Result<ChainRegions> {
        let regions = self
            .client
            .post(&self.endpoint)?
            .json(&NumberingRequest { sequence, scheme })
            .send()
            .await?
            .error_for_status()?
            .json::<ChainRegions>()
            .await?;
        Ok(regions)
    }
}

// ── Annotator ────────────────────────────────────────────────────────────────

pub struct RegionAnnotator {
    numbering: Option<Arc<dyn NumberingService>>,
    scheme: String,
}

impl RegionAnnotator {
    /// Annotator that only uses the residue windows.
    pub fn heuristic() -> Self {
        Self {
            numbering: None,
            scheme: String::new(),
        }
    }

    pub fn with_numbering(service: Arc<dyn NumberingService>, scheme: &str) -> Self {
        Self {
            numbering: Some(service),
            scheme: scheme.to_string(),
        }
    }

    /// Annotate every variant of `batch`, keeping batch order.
    ///
    /// The first numbering failure switches the rest of the batch to the
    /// window heuristic.
    pub async fn annotate(&self, batch: &VariantBatch) -> Vec<AnnotatedVariant> {
        let mut service = self.numbering.as_ref();
        let mut table = Vec::with_capacity(batch.len());

        for variant in &batch.variants {
            let numbered = match service {
                Some(svc) => match self.number_pair(svc.as_ref(), variant).await {
                    Ok(pair) => Some(pair),
                    Err(e) => {
                        warn!(
                            "{}: numbering service unavailable ({e:#}), using residue windows for the rest of the batch",
                            batch.target
                        );
                        service = None;
                        None
                    }
                },
                None => None,
            };

            let annotated = match numbered {
                Some((heavy, light)) => AnnotatedVariant {
                    variant: variant.clone(),
                    heavy,
                    light,
                    source: RegionSource::Numbering,
                },
                None => AnnotatedVariant {
                    variant: variant.clone(),
                    heavy: extract_regions(&variant.heavy),
                    light: extract_regions(&variant.light),
                    source: RegionSource::Heuristic,
                },
            };
            table.push(annotated);
        }

        info!("Annotated {} variants for {}", table.len(), batch.target);
        table
    }

    async fn number_pair(
        &self,
        service: &dyn NumberingService,
        variant: &Variant,
    ) -> anyhow::Result<(ChainRegions, ChainRegions)> {
        let heavy = service.number(&variant.heavy, &self.scheme).await?;
        let light = service.number(&variant.light, &self.scheme).await?;
        Ok((heavy, light))
    }
}

// ── Diversity ────────────────────────────────────────────────────────────────

/// Distinct values observed for one region across a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionDiversity {
    pub region: CdrRegion,
    pub unique: usize,
    pub total: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversityReport {
    pub target: String,
    pub batch_size: usize,
    pub regions: Vec<RegionDiversity>,
}

impl DiversityReport {
    pub fn get(&self, region: CdrRegion) -> Option<&RegionDiversity> {
        self.regions.iter().find(|r| r.region == region)
    }
}

/// Per-region uniqueness over an annotated table.
///
/// Undefined values are not counted as distinct but still count towards
/// the batch size. An empty table yields ratio 0 for every region.
pub fn diversity(target: &str, table: &[AnnotatedVariant]) -> DiversityReport {
    let total = table.len();
    let regions = CdrRegion::ALL
        .iter()
        .map(|&region| {
            let unique = table
                .iter()
                .filter_map(|a| a.region(region))
                .collect::<HashSet<_>>()
                .len();
            let ratio = if total == 0 { 0.0 } else { unique as f64 / total as f64 };
            RegionDiversity { region, unique, total, ratio }
        })
        .collect();
    debug!("Computed diversity for {} over {} variants", target, total);
    DiversityReport {
        target: target.to_string(),
        batch_size: total,
        regions,
    }
}
