//! Reference structure fetching.
//!
//! Each distinct structure identifier is fetched once per run, however
//! many targets name it; the targets then share the fetched text.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use cdrforge_common::sandbox::SandboxClient as Client;
use cdrforge_common::{CdrForgeError, Result, StructureRecord, TargetSpec};
use futures_util::future::join_all;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::artifacts::{write_artifact, ArtifactStore};

pub const RCSB_DOWNLOAD_URL: &str = "https://files.rcsb.org/download";

/// Remote repository serving structure files by identifier.
#[async_trait]
pub trait StructureRepository: Send + Sync {
    /// Download the PDB-format text for `structure_id`.
    async fn download(&self, structure_id: &str) -> anyhow::Result<String>;
}

/// RCSB Protein Data Bank file server.
pub struct RcsbRepository {
    client: Client,
    base_url: String,
}

impl RcsbRepository {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, RCSB_DOWNLOAD_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StructureRepository for RcsbRepository {
    #[instrument(skip(self))]
    async fn download(&self, structure_id: &str) -> anyhow::Result<String> {
        let url = format!("{}/{}.pdb", self.base_url, structure_id.to_uppercase());
        debug!(url = %url, "Downloading structure");
        let response = self.client.get(&url)?.send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Structures fetched for one run, keyed by upper-cased identifier.
#[derive(Debug, Default)]
pub struct FetchedStructures {
    texts: HashMap<String, std::result::Result<Arc<str>, String>>,
}

impl FetchedStructures {
    /// The structure record for `target`, or the fetch error of its structure.
    pub fn record(&self, target: &TargetSpec) -> Result<StructureRecord> {
        let fetch_error = |reason: String| CdrForgeError::Fetch {
            target: target.name.clone(),
            structure_id: target.structure_id.clone(),
            reason,
        };
        match self.texts.get(&target.structure_id.to_uppercase()) {
            Some(Ok(text)) => Ok(StructureRecord {
                target: target.name.clone(),
                structure_id: target.structure_id.clone(),
                text: Arc::clone(text),
            }),
            Some(Err(reason)) => Err(fetch_error(reason.clone())),
            None => Err(fetch_error("structure was not requested".to_string())),
        }
    }
}

/// Fetches reference structures and persists them under the output tree.
pub struct StructureFetcher {
    repository: Arc<dyn StructureRepository>,
}

impl StructureFetcher {
    pub fn new(repository: Arc<dyn StructureRepository>) -> Self {
        Self { repository }
    }

    /// Fetch every distinct structure named by `targets`, concurrently.
    pub async fn fetch_all(&self, store: &ArtifactStore, targets: &[TargetSpec]) -> FetchedStructures {
        let ids: BTreeSet<String> = targets.iter().map(|t| t.structure_id.to_uppercase()).collect();
        debug!("{} distinct structures for {} targets", ids.len(), targets.len());
        let results = join_all(ids.iter().map(|id| async move {
            self.retrieve(id, &store.structure_path(id)).await.map_err(|e| {
                warn!("Structure {} unavailable: {:#}", id, e);
                format!("{e:#}")
            })
        }))
        .await;

        FetchedStructures {
            texts: ids.into_iter().zip(results).collect(),
        }
    }

    /// Text of `structure_id`, reusing the copy at `path` when present.
    async fn retrieve(&self, structure_id: &str, path: &Path) -> anyhow::Result<Arc<str>> {
        if fs::try_exists(path).await.unwrap_or(false) {
            debug!("Structure {} found in output tree", structure_id);
            let text = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok(text.into());
        }

        info!("Fetching structure {}", structure_id);
        let text = self.repository.download(structure_id).await?;
        if text.trim().is_empty() {
            anyhow::bail!("repository returned an empty file");
        }
        write_artifact(path, text.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(text.into())
    }
}
