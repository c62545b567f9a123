//! cdrforge-common: shared types, errors and the sandboxed HTTP client used by every cdrforge crate.

pub mod error;
pub mod entities;
pub mod target_config;
pub mod sandbox;

// Re-export commonly used types
pub use error::{CdrForgeError, Result};
pub use entities::{ChainRole, ChainSequenceSet, CdrRegion, StructureRecord, Variant, VariantBatch};
pub use target_config::{ChainRoles, GenerationParams, TargetPanel, TargetSpec};
