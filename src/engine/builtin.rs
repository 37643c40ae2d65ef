//! The built-in structure engine.

use super::ComputationEngine;
use super::structure::{Residue, Structure, is_nucleic_residue, is_protein_residue, one_letter};
use crate::core::{BindingPairs, Chunks, ContactMap, Fragment, StructureFormat};
use crate::error::EngineError;
use std::collections::BTreeMap;

/// Chunk key of the protein part of a complex.
pub const PROTEIN_KEY: &str = "Prot";
/// Chunk key of the nucleic-acid part of a complex.
pub const NUCLEIC_KEY: &str = "NA";

/// Engine working directly on PDB/mmCIF text.
///
/// Stateless; each call parses its input from scratch.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureEngine;

impl StructureEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn ensure_complex(structure: &Structure) -> Result<(), EngineError> {
    let atoms = structure.atoms();
    let has_protein = atoms.iter().any(|a| is_protein_residue(&a.res_name));
    let has_nucleic = atoms.iter().any(|a| is_nucleic_residue(&a.res_name));
    if has_protein && has_nucleic {
        Ok(())
    } else {
        Err(EngineError::NotAComplex)
    }
}

fn ensure_chain(structure: &Structure, chain_id: &str) -> Result<(), EngineError> {
    let valid = structure.chain_ids();
    if valid.iter().any(|c| c == chain_id) {
        Ok(())
    } else {
        Err(EngineError::UnknownChain {
            chain_id: chain_id.to_string(),
            valid,
        })
    }
}

fn residue_id(residue: &Residue<'_>) -> String {
    format!(
        "{}-{}-{}",
        residue.chain_id, residue.res_seq, residue.res_name
    )
}

impl ComputationEngine for StructureEngine {
    fn split_complex(
        &mut self,
        bytes: &[u8],
        format: StructureFormat,
    ) -> Result<Chunks, EngineError> {
        let structure = Structure::parse(bytes, format)?;
        ensure_complex(&structure)?;

        let mut parts = BTreeMap::new();
        parts.insert(
            PROTEIN_KEY.to_string(),
            structure.render(|a| is_protein_residue(&a.res_name)),
        );
        parts.insert(
            NUCLEIC_KEY.to_string(),
            structure.render(|a| is_nucleic_residue(&a.res_name)),
        );
        Ok(Chunks::new(parts))
    }

    fn split_by_chain(
        &mut self,
        bytes: &[u8],
        format: StructureFormat,
    ) -> Result<Chunks, EngineError> {
        let structure = Structure::parse(bytes, format)?;
        let parts = structure
            .chain_ids()
            .into_iter()
            .map(|chain_id| {
                let part = structure.render(|a| a.chain_id == chain_id);
                (chain_id, part)
            })
            .collect();
        Ok(Chunks::new(parts))
    }

    fn extract_fragment(
        &mut self,
        bytes: &[u8],
        chain_id: &str,
        start: Option<i64>,
        end: Option<i64>,
        format: StructureFormat,
    ) -> Result<Fragment, EngineError> {
        let structure = Structure::parse(bytes, format)?;
        ensure_chain(&structure, chain_id)?;

        let residues: Vec<_> = structure
            .residues()
            .into_iter()
            .filter(|r| r.chain_id == chain_id)
            .collect();
        let (Some(first), Some(last)) = (residues.first(), residues.last()) else {
            return Err(EngineError::EmptySelection {
                reason: format!("chain {chain_id} has no residues"),
            });
        };
        let (min, max) = (first.res_seq, last.res_seq);

        let start = start.unwrap_or(min);
        let end = end.unwrap_or(max);
        if start < min || end > max || start > end {
            return Err(EngineError::InvalidRange {
                chain_id: chain_id.to_string(),
                min,
                max,
            });
        }

        let bytes = structure.render(|a| a.chain_id == chain_id && (start..=end).contains(&a.res_seq));
        Ok(Fragment::new(bytes, start, end))
    }

    fn annotate_binding_pairs(
        &mut self,
        bytes: &[u8],
        cutoff: f64,
        format: StructureFormat,
    ) -> Result<BindingPairs, EngineError> {
        let structure = Structure::parse(bytes, format)?;
        ensure_complex(&structure)?;
        if cutoff < 0.0 {
            return Ok(BindingPairs::new(Vec::new()));
        }

        let residues = structure.residues();
        let (protein, nucleic): (Vec<_>, Vec<_>) = residues
            .iter()
            .filter(|r| is_protein_residue(r.res_name) || is_nucleic_residue(r.res_name))
            .partition(|r| is_protein_residue(r.res_name));

        let cutoff_sq = cutoff * cutoff;
        let mut closest: BTreeMap<(String, i64, String, i64, String), f64> = BTreeMap::new();
        for p in &protein {
            for n in &nucleic {
                let best = p
                    .atoms
                    .iter()
                    .flat_map(|a| n.atoms.iter().map(move |b| a.distance_sq(b)))
                    .filter(|d| *d <= cutoff_sq)
                    .reduce(f64::min);
                if let Some(d) = best {
                    let key = (
                        p.chain_id.to_string(),
                        p.res_seq,
                        n.chain_id.to_string(),
                        n.res_seq,
                        format!("{}_{}", residue_id(p), residue_id(n)),
                    );
                    closest
                        .entry(key)
                        .and_modify(|v| *v = v.min(d))
                        .or_insert(d);
                }
            }
        }

        let entries = closest
            .into_iter()
            .map(|((.., id), d)| (id, d.sqrt()))
            .collect();
        Ok(BindingPairs::new(entries))
    }

    fn contact_map(
        &mut self,
        bytes: &[u8],
        chain_id: Option<&str>,
        format: StructureFormat,
    ) -> Result<ContactMap, EngineError> {
        let structure = Structure::parse(bytes, format)?;
        if let Some(chain_id) = chain_id {
            ensure_chain(&structure, chain_id)?;
        }

        let residues: Vec<_> = structure
            .residues()
            .into_iter()
            .filter(|r| chain_id.is_none_or(|c| r.chain_id == c))
            .collect();
        let axis: Vec<String> = residues
            .iter()
            .map(|r| format!("{}-{}-{}", r.chain_id, r.res_seq, one_letter(r.res_name)))
            .collect();
        let positions: Vec<[f64; 3]> = residues.iter().map(Residue::position).collect();

        let n = positions.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = super::structure::distance_sq(positions[i], positions[j]).sqrt();
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Ok(ContactMap::new(axis, values))
    }

    fn name(&self) -> &'static str {
        "structure"
    }
}
