//! Orchestrator for the antibody variant pipeline.
//!
//! Structures are fetched first, once per distinct identifier. Each target
//! then runs extract → generate on its own branch; the branches run
//! concurrently and share nothing mutable. Annotation and reporting wait
//! for every branch to finish.

use cdrforge_common::{CdrForgeError, ChainRole, Result, TargetSpec, VariantBatch};
use futures_util::future::join_all;
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, TargetArtifacts};
use crate::chains::{extract_chain_sequences, persist_sequences};
use crate::pdb::{FetchedStructures, StructureFetcher};
use crate::regions::{diversity, RegionAnnotator};
use crate::report::{ReportAssembler, ReportOutput, TargetFailure, TargetTable};
use crate::variants::{load_persisted, VariantGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Generate,
    Load,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Generate => "generate",
            Stage::Load => "load",
        }
    }
}

struct BranchOutcome {
    structure_fetched: bool,
    result: std::result::Result<VariantBatch, (Stage, CdrForgeError)>,
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub succeeded: Vec<String>,
    pub failures: Vec<TargetFailure>,
    pub report: ReportOutput,
}

pub struct AntibodyPipeline {
    store: ArtifactStore,
    fetcher: StructureFetcher,
    generator: VariantGenerator,
    annotator: RegionAnnotator,
}

impl AntibodyPipeline {
    pub fn new(
        store: ArtifactStore,
        fetcher: StructureFetcher,
        generator: VariantGenerator,
        annotator: RegionAnnotator,
    ) -> Self {
        Self {
            store,
            fetcher,
            generator,
            annotator,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Full run: every target through generation, then the shared report.
    pub async fn run(&self, targets: &[TargetSpec]) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Running antibody pipeline for {} targets", targets.len());

        // No target can succeed without a credential; stop before any request.
        self.generator.credential_for("all targets")?;

        let structures = self.fetcher.fetch_all(&self.store, targets).await;
        let handles: Vec<TargetArtifacts> = targets.iter().map(|t| self.store.for_target(t)).collect();
        let outcomes = join_all(targets.iter().zip(&handles).map(|(target, handle)| {
            self.run_branch(target, handle, &structures)
                .instrument(info_span!("target", name = %target.name))
        }))
        .await;

        let mut fetched = Vec::new();
        let mut batches = Vec::new();
        let mut failures = Vec::new();
        for (handle, outcome) in handles.into_iter().zip(outcomes) {
            if outcome.structure_fetched {
                fetched.push(handle.clone());
            }
            match outcome.result {
                Ok(batch) => batches.push((handle, batch)),
                Err((stage, e)) => {
                    error!("{} (stage: {})", e, stage.as_str());
                    failures.push(TargetFailure {
                        target: handle.target.clone(),
                        stage: stage.as_str().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.store.write_structure_map(&fetched).await?;
        self.finish(run_id, batches, failures).await
    }

    /// Re-run annotation and reporting from persisted variant batches.
    pub async fn report_only(&self, targets: &[TargetSpec]) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Rebuilding report from persisted variants for {} targets", targets.len());

        let mut batches = Vec::new();
        let mut failures = Vec::new();
        for target in targets {
            let handle = self.store.for_target(target);
            if !fs::try_exists(&handle.variants_json).await.unwrap_or(false) {
                warn!("{}: no persisted variants at {:?}, skipping", target.name, handle.variants_json);
                failures.push(TargetFailure {
                    target: target.name.clone(),
                    stage: Stage::Load.as_str().to_string(),
                    message: format!("no persisted variants at {}", handle.variants_json.display()),
                });
                continue;
            }
            match load_persisted(&target.name, &handle.variants_json).await {
                Ok(batch) => batches.push((handle, batch)),
                Err(e) => {
                    error!("{} (stage: {})", e, Stage::Load.as_str());
                    failures.push(TargetFailure {
                        target: target.name.clone(),
                        stage: Stage::Load.as_str().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.finish(run_id, batches, failures).await
    }

    async fn run_branch(
        &self,
        target: &TargetSpec,
        handle: &TargetArtifacts,
        structures: &FetchedStructures,
    ) -> BranchOutcome {
        let record = match structures.record(target) {
            Ok(r) => r,
            Err(e) => {
                return BranchOutcome {
                    structure_fetched: false,
                    result: Err((Stage::Fetch, e)),
                }
            }
        };

        let result = async {
            let chain_ids = target.chains.chain_ids();
            let sequences =
                extract_chain_sequences(&record, &chain_ids).map_err(|e| (Stage::Extract, e))?;
            persist_sequences(&sequences, handle)
                .await
                .map_err(|e| (Stage::Extract, e))?;
            for role in ChainRole::ALL {
                let chain = target.chains.chain_for(role);
                if !sequences.contains(chain) {
                    warn!(
                        "{}: {} chain {} not present in {}",
                        target.name,
                        role.as_str(),
                        chain,
                        target.structure_id
                    );
                }
            }

            self.generator
                .generate(&record, &target.chains, handle)
                .await
                .map_err(|e| (Stage::Generate, e))
        }
        .await;

        if let Ok(batch) = &result {
            info!("{}: {} variants generated", target.name, batch.len());
        }
        BranchOutcome {
            structure_fetched: true,
            result,
        }
    }

    async fn finish(
        &self,
        run_id: Uuid,
        batches: Vec<(TargetArtifacts, VariantBatch)>,
        failures: Vec<TargetFailure>,
    ) -> Result<RunSummary> {
        let mut tables = Vec::with_capacity(batches.len());
        for (handle, batch) in batches {
            let rows = self.annotator.annotate(&batch).await;
            let diversity = diversity(&batch.target, &rows);
            tables.push(TargetTable {
                artifacts: handle,
                rows,
                diversity,
            });
        }

        let report = ReportAssembler::new(self.store.clone())
            .assemble(&tables, &failures, run_id)
            .await?;

        let succeeded: Vec<String> = tables.iter().map(|t| t.target().to_string()).collect();
        info!(
            "Run {} finished: {} succeeded, {} failed",
            run_id,
            succeeded.len(),
            failures.len()
        );

        Ok(RunSummary {
            run_id,
            succeeded,
            failures,
            report,
        })
    }
}
