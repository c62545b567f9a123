//! Output directory layout and artifact writes.
//!
//! Every target gets an explicit [`TargetArtifacts`] handle when the run
//! starts; later stages read and write through that handle instead of
//! guessing which file belongs to which target from its name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cdrforge_common::{Result, TargetSpec};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub const STRUCTURES_DIR: &str = "structures";
pub const STRUCTURE_MAP_FILE: &str = "structure_map.json";
pub const COMBINED_FILE: &str = "combined_variants.csv";
pub const SUMMARY_FILE: &str = "summary.html";

/// Root of one run's output tree.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// Paths owned by a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetArtifacts {
    pub target: String,
    pub dir: PathBuf,
    pub structure: PathBuf,
    pub sequences_json: PathBuf,
    pub sequences_fasta: PathBuf,
    pub variants_json: PathBuf,
    pub annotated_csv: PathBuf,
    pub diversity_csv: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn structure_path(&self, structure_id: &str) -> PathBuf {
        self.root
            .join(STRUCTURES_DIR)
            .join(format!("{}.pdb", structure_id.to_uppercase()))
    }

    pub fn structure_map_path(&self) -> PathBuf {
        self.root.join(STRUCTURE_MAP_FILE)
    }

    pub fn combined_path(&self) -> PathBuf {
        self.root.join(COMBINED_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    pub fn for_target(&self, target: &TargetSpec) -> TargetArtifacts {
        let dir = self.root.join(dir_name(&target.name));
        TargetArtifacts {
            target: target.name.clone(),
            structure: self.structure_path(&target.structure_id),
            sequences_json: dir.join("sequences.json"),
            sequences_fasta: dir.join("sequences.fasta"),
            variants_json: dir.join("variants.json"),
            annotated_csv: dir.join("annotated_variants.csv"),
            diversity_csv: dir.join("diversity.csv"),
            dir,
        }
    }

    /// Record which structure file each target was fetched into.
    pub async fn write_structure_map(&self, handles: &[TargetArtifacts]) -> Result<PathBuf> {
        let map: BTreeMap<&str, String> = handles
            .iter()
            .map(|h| {
                let rel = h
                    .structure
                    .strip_prefix(&self.root)
                    .unwrap_or(&h.structure)
                    .to_string_lossy()
                    .replace('\\', "/");
                (h.target.as_str(), rel)
            })
            .collect();
        let path = self.structure_map_path();
        write_artifact(&path, serde_json::to_string_pretty(&map)?.as_bytes()).await?;
        Ok(path)
    }
}

/// Filesystem-safe directory name for a target label.
fn dir_name(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers only ever see a complete artifact.
///
/// Each call uses its own temp name; concurrent writers of one path never
/// share a temp file and the last rename wins.
pub async fn write_artifact(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        fs::remove_file(&tmp).await.ok();
        return Err(e.into());
    }
    debug!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdrforge_common::ChainRoles;
    use tempfile::tempdir;

    #[test]
    fn test_target_layout() {
        let store = ArtifactStore::new("results");
        let spec = TargetSpec::new("PD-L1 (atezo)", "5xxy", ChainRoles::new("H", "L", "A"));
        let handle = store.for_target(&spec);
        assert_eq!(handle.dir, PathBuf::from("results/PD-L1__atezo_"));
        assert_eq!(handle.structure, PathBuf::from("results/structures/5XXY.pdb"));
        assert_eq!(handle.variants_json, handle.dir.join("variants.json"));
    }

    #[tokio::test]
    async fn test_write_artifact_creates_parents_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_artifact(&path, b"hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("a/b")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("structures/5XXY.pdb");
        let body = "ATOM\n".repeat(20_000);

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let body = body.clone();
                tokio::spawn(async move { write_artifact(&path, body.as_bytes()).await })
            })
            .collect();
        for w in writers {
            w.await.unwrap().unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
        let entries = std::fs::read_dir(dir.path().join("structures")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_structure_map() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handles = vec![
            store.for_target(&TargetSpec::new("HER2", "1N8Z", ChainRoles::new("B", "A", "C"))),
            store.for_target(&TargetSpec::new("EGFR", "1YY9", ChainRoles::new("D", "C", "A"))),
        ];
        let path = store.write_structure_map(&handles).await.unwrap();
        let map: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(map["EGFR"], "structures/1YY9.pdb");
        assert_eq!(map["HER2"], "structures/1N8Z.pdb");
    }
}
