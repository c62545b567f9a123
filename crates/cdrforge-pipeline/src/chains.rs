//! Chain sequence extraction from PDB-format text.
//!
//! The text is parsed with `pdbtbx` at the loose strictness level; only
//! the first model is read. Residues come in file order, alternate
//! locations are conformers of one residue, and insertion codes start a
//! new residue.

use std::io::BufReader;

use cdrforge_common::{CdrForgeError, ChainSequenceSet, Result, StructureRecord};
use pdbtbx::{Format, ReadOptions, StrictnessLevel};
use tracing::debug;

use crate::artifacts::{write_artifact, TargetArtifacts};

/// One-letter code for a canonical amino acid, `None` for anything else
/// (waters, ligands, modified residues, nucleotides).
pub fn three_to_one(residue: &str) -> Option<char> {
    let code = match residue {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        _ => return None,
    };
    Some(code)
}

/// Sequences of the requested chains that exist in `record`.
///
/// Requested chains that do not occur are left out of the result; a chain
/// that occurs but holds no canonical residue maps to an empty sequence.
pub fn extract_chain_sequences(record: &StructureRecord, chain_ids: &[&str]) -> Result<ChainSequenceSet> {
    let parse_error = |reason: String| CdrForgeError::Parse {
        target: record.target.clone(),
        reason,
    };

    let reader = BufReader::new(record.text.as_bytes());
    let (pdb, warnings) = ReadOptions::default()
        .set_format(Format::Pdb)
        .set_level(StrictnessLevel::Loose)
        .read_raw(reader)
        .map_err(|errors| {
            let reasons: Vec<String> = errors.iter().take(3).map(|e| e.to_string()).collect();
            parse_error(reasons.join("; "))
        })?;
    if !warnings.is_empty() {
        debug!(target = %record.target, "{} PDB parse warnings", warnings.len());
    }

    let model = pdb
        .models()
        .next()
        .filter(|m| m.atom_count() > 0)
        .ok_or_else(|| parse_error("no ATOM or HETATM records found".to_string()))?;

    let mut set = ChainSequenceSet::new();
    for chain in model.chains() {
        if !chain_ids.iter().any(|c| *c == chain.id()) {
            continue;
        }
        let sequence: String = chain
            .residues()
            .filter_map(|residue| residue.name().and_then(three_to_one))
            .collect();
        set.insert(chain.id(), sequence);
    }

    debug!(
        target = %record.target,
        chains = ?set.chain_ids().collect::<Vec<_>>(),
        "Extracted chain sequences"
    );
    Ok(set)
}

/// Persist the sequence mapping as JSON and FASTA.
pub async fn persist_sequences(set: &ChainSequenceSet, artifacts: &TargetArtifacts) -> Result<()> {
    write_artifact(&artifacts.sequences_json, serde_json::to_string_pretty(set)?.as_bytes()).await?;
    write_artifact(&artifacts.sequences_fasta, set.to_fasta(&artifacts.target).as_bytes()).await?;
    Ok(())
}
