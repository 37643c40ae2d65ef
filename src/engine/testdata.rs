//! Structure files shared by unit tests.

/// Protein chain `A` (residues 1-10) with RNA chain `B` (residues 1-3).
/// Only `A-2 ALA` and `B-1 G` are within 5 Å of each other.
pub(crate) const COMPLEX_PDB: &[u8] = include_bytes!("../../tests/data/complex.pdb");

/// [`COMPLEX_PDB`] as mmCIF, with a second model that must be ignored.
pub(crate) const COMPLEX_CIF: &[u8] = include_bytes!("../../tests/data/complex.cif");

/// Two protein chains `A` (1-10) and `B` (1-5); model 2 adds chain `C`.
pub(crate) const TWO_CHAINS_PDB: &[u8] = include_bytes!("../../tests/data/two_chains.pdb");
