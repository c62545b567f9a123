//! cdrforge Pipeline - Antibody variant generation and CDR analysis.
//!
//! Stages, per target:
//! 1. Fetching the reference antibody–antigen structure (RCSB)
//! 2. Extracting heavy, light and antigen chain sequences
//! 3. Generating antibody variants with the external inverse-folding service
//!
//! Then, across all targets:
//! 4. Annotating CDRs and measuring per-region diversity
//! 5. Writing the combined dataset and the summary report

pub mod artifacts;
pub mod pdb;
pub mod chains;
pub mod variants;
pub mod regions;
pub mod report;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use artifacts::{ArtifactStore, TargetArtifacts};
pub use pipeline::{AntibodyPipeline, RunSummary};
pub use regions::RegionAnnotator;
pub use variants::VariantGenerator;
