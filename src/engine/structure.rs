//! Line-oriented reader and writer for PDB and mmCIF coordinate files.
//!
//! Only the first model is read. Coordinate records keep their original
//! text so that writing a subset reproduces the input's formatting; all
//! non-coordinate lines around them are carried through unchanged.

use crate::core::StructureFormat;
use crate::error::EngineError;
use std::ops::Range;

/// Standard amino acids.
pub const PROTEIN_RESIDUES: &[&str] = &[
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE", "LEU", "LYS", "MET",
    "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
];

/// RNA and DNA nucleotides.
pub const NUCLEIC_RESIDUES: &[&str] = &["A", "C", "G", "U", "DA", "DC", "DG", "DT"];

/// Returns `true` for a standard amino acid name.
#[must_use]
pub fn is_protein_residue(name: &str) -> bool {
    PROTEIN_RESIDUES.contains(&name)
}

/// Returns `true` for a nucleotide name.
#[must_use]
pub fn is_nucleic_residue(name: &str) -> bool {
    NUCLEIC_RESIDUES.contains(&name)
}

/// One-letter code of a residue, `X` when unknown.
#[must_use]
pub fn one_letter(name: &str) -> char {
    match name {
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
        "A" | "DA" => 'A',
        "C" | "DC" => 'C',
        "G" | "DG" => 'G',
        "U" => 'U',
        "DT" => 'T',
        _ => 'X',
    }
}

/// A coordinate record.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Atom name, e.g. `CA`.
    pub name: String,
    /// Residue name, e.g. `ALA`.
    pub res_name: String,
    /// Chain identifier.
    pub chain_id: String,
    /// Residue sequence number.
    pub res_seq: i64,
    /// Insertion code, empty when absent.
    pub ins_code: String,
    /// Cartesian position in Ångström.
    pub pos: [f64; 3],
    record: String,
}

impl Atom {
    /// Squared distance to another atom.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        distance_sq(self.pos, other.pos)
    }

    fn same_residue(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id
            && self.res_seq == other.res_seq
            && self.ins_code == other.ins_code
            && self.res_name == other.res_name
    }
}

/// Squared euclidean distance.
#[must_use]
pub fn distance_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx.mul_add(dx, dy.mul_add(dy, dz * dz))
}

/// Consecutive atoms sharing chain, number, insertion code and name.
#[derive(Debug, Clone)]
pub struct Residue<'a> {
    /// Chain identifier.
    pub chain_id: &'a str,
    /// Residue sequence number.
    pub res_seq: i64,
    /// Residue name.
    pub res_name: &'a str,
    /// Member atoms in file order.
    pub atoms: Vec<&'a Atom>,
}

impl Residue<'_> {
    /// Position of the `CA` atom, or the centroid of all atoms.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self) -> [f64; 3] {
        if let Some(ca) = self.atoms.iter().find(|a| a.name == "CA") {
            return ca.pos;
        }
        let n = self.atoms.len().max(1) as f64;
        let sum = self.atoms.iter().fold([0.0; 3], |acc, a| {
            [acc[0] + a.pos[0], acc[1] + a.pos[1], acc[2] + a.pos[2]]
        });
        sum.map(|v| v / n)
    }
}

/// Parsed first model of a structure file.
#[derive(Debug, Clone)]
pub struct Structure {
    format: StructureFormat,
    preamble: Vec<String>,
    loop_header: Vec<String>,
    atoms: Vec<Atom>,
    postamble: Vec<String>,
}

impl Structure {
    /// Parses a structure file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] for non-UTF-8 input, malformed
    /// coordinate records or files without any atoms.
    pub fn parse(bytes: &[u8], format: StructureFormat) -> Result<Self, EngineError> {
        let text = std::str::from_utf8(bytes).map_err(|e| EngineError::Parse {
            reason: format!("input is not valid UTF-8: {e}"),
        })?;
        let structure = match format {
            StructureFormat::Pdb => parse_pdb(text)?,
            StructureFormat::Cif => parse_cif(text)?,
        };
        if structure.atoms.is_empty() {
            return Err(EngineError::Parse {
                reason: "no atom records found".to_string(),
            });
        }
        Ok(structure)
    }

    /// File format the structure was read from.
    #[must_use]
    pub const fn format(&self) -> StructureFormat {
        self.format
    }

    /// All atoms of the first model.
    #[must_use]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Chain ids in order of first appearance.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for atom in &self.atoms {
            if !ids.contains(&atom.chain_id) {
                ids.push(atom.chain_id.clone());
            }
        }
        ids
    }

    /// Groups atoms into residues.
    #[must_use]
    pub fn residues(&self) -> Vec<Residue<'_>> {
        let mut residues: Vec<Residue<'_>> = Vec::new();
        let mut previous: Option<&Atom> = None;
        for atom in &self.atoms {
            match (previous, residues.last_mut()) {
                (Some(prev), Some(current)) if prev.same_residue(atom) => current.atoms.push(atom),
                _ => residues.push(Residue {
                    chain_id: &atom.chain_id,
                    res_seq: atom.res_seq,
                    res_name: &atom.res_name,
                    atoms: vec![atom],
                }),
            }
            previous = Some(atom);
        }
        residues
    }

    /// Writes the atoms accepted by `keep`, in the source format.
    #[must_use]
    pub fn render<F>(&self, keep: F) -> Vec<u8>
    where
        F: Fn(&Atom) -> bool,
    {
        let kept: Vec<&Atom> = self.atoms.iter().filter(|a| keep(a)).collect();
        let mut out = String::new();
        for line in &self.preamble {
            push_line(&mut out, line);
        }
        match self.format {
            StructureFormat::Pdb => {
                for (i, atom) in kept.iter().enumerate() {
                    push_line(&mut out, &atom.record);
                    let chain_ends = kept
                        .get(i + 1)
                        .is_none_or(|next| next.chain_id != atom.chain_id);
                    if chain_ends {
                        push_line(&mut out, "TER");
                    }
                }
            }
            StructureFormat::Cif => {
                if !kept.is_empty() {
                    for line in &self.loop_header {
                        push_line(&mut out, line);
                    }
                    for atom in &kept {
                        push_line(&mut out, &atom.record);
                    }
                }
            }
        }
        for line in &self.postamble {
            push_line(&mut out, line);
        }
        if self.format == StructureFormat::Pdb && !self.postamble.iter().any(|l| l.trim() == "END")
        {
            push_line(&mut out, "END");
        }
        out.into_bytes()
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

// Fixed-column field, tolerant of short lines.
fn column(line: &str, range: Range<usize>) -> &str {
    line.get(range.clone())
        .or_else(|| line.get(range.start..))
        .unwrap_or("")
        .trim()
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    field: &str,
    line_no: usize,
) -> Result<T, EngineError> {
    value.parse().map_err(|_| EngineError::Parse {
        reason: format!("line {line_no}: invalid {field} {value:?}"),
    })
}

fn parse_pdb(text: &str) -> Result<Structure, EngineError> {
    let mut preamble = Vec::new();
    let mut postamble = Vec::new();
    let mut atoms = Vec::new();
    let mut past_first_model = false;

    for (index, line) in text.lines().enumerate() {
        let record = line.get(..6).unwrap_or(line).trim_end();
        match record {
            "ENDMDL" => past_first_model = true,
            "MODEL" | "TER" | "ANISOU" | "CONECT" | "MASTER" => {}
            "ATOM" | "HETATM" => {
                if !past_first_model {
                    atoms.push(parse_pdb_atom(line, index + 1)?);
                }
            }
            _ if atoms.is_empty() => preamble.push(line.to_string()),
            _ => postamble.push(line.to_string()),
        }
    }

    Ok(Structure {
        format: StructureFormat::Pdb,
        preamble,
        loop_header: Vec::new(),
        atoms,
        postamble,
    })
}

fn parse_pdb_atom(line: &str, line_no: usize) -> Result<Atom, EngineError> {
    let res_name = column(line, 17..20);
    if res_name.is_empty() {
        return Err(EngineError::Parse {
            reason: format!("line {line_no}: missing residue name"),
        });
    }
    Ok(Atom {
        name: column(line, 12..16).to_string(),
        res_name: res_name.to_string(),
        chain_id: column(line, 21..22).to_string(),
        res_seq: parse_number(column(line, 22..26), "residue number", line_no)?,
        ins_code: column(line, 26..27).to_string(),
        pos: [
            parse_number(column(line, 30..38), "x coordinate", line_no)?,
            parse_number(column(line, 38..46), "y coordinate", line_no)?,
            parse_number(column(line, 46..54), "z coordinate", line_no)?,
        ],
        record: line.to_string(),
    })
}

/// Splits an mmCIF data line into tokens, honouring quotes.
fn cif_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '\'' || c == '"' {
            chars.next();
            while let Some(ch) = chars.next() {
                // a quote only closes when followed by whitespace or end of line
                if ch == c && chars.peek().is_none_or(|n| n.is_whitespace()) {
                    break;
                }
                token.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}

struct AtomSiteColumns {
    count: usize,
    atom_name: usize,
    res_name: usize,
    chain_id: usize,
    res_seq: usize,
    ins_code: Option<usize>,
    x: usize,
    y: usize,
    z: usize,
    model: Option<usize>,
}

impl AtomSiteColumns {
    fn resolve(names: &[String]) -> Result<Self, EngineError> {
        let find = |name: &str| names.iter().position(|n| n == name);
        let require = |preferred: &str, fallback: Option<&str>| {
            find(preferred)
                .or_else(|| fallback.and_then(find))
                .ok_or_else(|| EngineError::Parse {
                    reason: format!("missing _atom_site.{preferred} column"),
                })
        };
        Ok(Self {
            count: names.len(),
            atom_name: require("auth_atom_id", Some("label_atom_id"))?,
            res_name: require("auth_comp_id", Some("label_comp_id"))?,
            chain_id: require("auth_asym_id", Some("label_asym_id"))?,
            res_seq: require("auth_seq_id", Some("label_seq_id"))?,
            ins_code: find("pdbx_PDB_ins_code"),
            x: require("Cartn_x", None)?,
            y: require("Cartn_y", None)?,
            z: require("Cartn_z", None)?,
            model: find("pdbx_PDB_model_num"),
        })
    }
}

fn is_cif_loop_end(trimmed: &str) -> bool {
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with('_')
        || trimmed.starts_with("loop_")
        || trimmed.starts_with("data_")
}

fn cif_value(token: &str) -> &str {
    if token == "?" || token == "." { "" } else { token }
}

fn parse_cif(text: &str) -> Result<Structure, EngineError> {
    let lines: Vec<&str> = text.lines().collect();
    let loop_start = lines
        .windows(2)
        .position(|w| w[0].trim() == "loop_" && w[1].trim_start().starts_with("_atom_site."))
        .ok_or_else(|| EngineError::Parse {
            reason: "no _atom_site loop found".to_string(),
        })?;

    let mut cursor = loop_start + 1;
    let mut names = Vec::new();
    while let Some(line) = lines.get(cursor) {
        let Some(name) = line.trim().strip_prefix("_atom_site.") else {
            break;
        };
        names.push(name.split_whitespace().next().unwrap_or_default().to_string());
        cursor += 1;
    }
    let columns = AtomSiteColumns::resolve(&names)?;
    let loop_header = lines[loop_start..cursor]
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut atoms = Vec::new();
    let mut first_model: Option<String> = None;
    let mut pending: Vec<String> = Vec::new();
    let mut record = String::new();
    while let Some(line) = lines.get(cursor) {
        if is_cif_loop_end(line.trim()) {
            break;
        }
        cursor += 1;
        if !record.is_empty() {
            record.push('\n');
        }
        record.push_str(line);
        pending.extend(cif_tokens(line));
        if pending.len() < columns.count {
            continue;
        }

        let tokens = std::mem::take(&mut pending);
        let raw = std::mem::take(&mut record);
        if let Some(index) = columns.model {
            let model = &tokens[index];
            match &first_model {
                Some(first) if first != model => continue,
                Some(_) => {}
                None => first_model = Some(model.clone()),
            }
        }
        atoms.push(cif_atom(&tokens, &columns, raw, cursor)?);
    }
    if !pending.is_empty() {
        return Err(EngineError::Parse {
            reason: format!("line {cursor}: truncated _atom_site row"),
        });
    }

    Ok(Structure {
        format: StructureFormat::Cif,
        preamble: lines[..loop_start].iter().map(ToString::to_string).collect(),
        loop_header,
        atoms,
        postamble: lines[cursor..].iter().map(ToString::to_string).collect(),
    })
}

fn cif_atom(
    tokens: &[String],
    columns: &AtomSiteColumns,
    record: String,
    line_no: usize,
) -> Result<Atom, EngineError> {
    Ok(Atom {
        name: tokens[columns.atom_name].clone(),
        res_name: tokens[columns.res_name].clone(),
        chain_id: cif_value(&tokens[columns.chain_id]).to_string(),
        res_seq: parse_number(&tokens[columns.res_seq], "residue number", line_no)?,
        ins_code: columns
            .ins_code
            .map(|i| cif_value(&tokens[i]).to_string())
            .unwrap_or_default(),
        pos: [
            parse_number(&tokens[columns.x], "x coordinate", line_no)?,
            parse_number(&tokens[columns.y], "y coordinate", line_no)?,
            parse_number(&tokens[columns.z], "z coordinate", line_no)?,
        ],
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testdata::{COMPLEX_CIF, COMPLEX_PDB, TWO_CHAINS_PDB};

    #[test]
    fn test_parse_pdb_complex() {
        let structure = Structure::parse(COMPLEX_PDB, StructureFormat::Pdb).unwrap();
        assert_eq!(structure.atoms().len(), 36);
        assert_eq!(structure.chain_ids(), vec!["A", "B"]);
        assert_eq!(structure.residues().len(), 13);

        let first = &structure.atoms()[1];
        assert_eq!(first.name, "CA");
        assert_eq!(first.res_name, "MET");
        assert_eq!(first.res_seq, 1);
        assert!((first.pos[0] - 3.8).abs() < 1e-9);
    }

    #[test]
    fn test_parse_pdb_first_model_only() {
        let structure = Structure::parse(TWO_CHAINS_PDB, StructureFormat::Pdb).unwrap();
        assert_eq!(structure.chain_ids(), vec!["A", "B"]);
        assert_eq!(structure.atoms().len(), 45);
    }

    #[test]
    fn test_parse_cif_complex() {
        let structure = Structure::parse(COMPLEX_CIF, StructureFormat::Cif).unwrap();
        assert_eq!(structure.chain_ids(), vec!["A", "B"]);
        assert_eq!(structure.atoms().len(), 36);
        let sugar = structure.atoms().iter().find(|a| a.name == "C1'");
        assert!(sugar.is_some());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Structure::parse(b"hello world\n", StructureFormat::Pdb).unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));

        let err = Structure::parse(b"data_x\n#\n", StructureFormat::Cif).unwrap_err();
        assert!(err.to_string().contains("_atom_site"));
    }

    #[test]
    fn test_parse_rejects_bad_coordinate() {
        let line = "ATOM      1  CA  ALA A   1       x.xxx   0.000   0.000  1.00  0.00           C\n";
        let err = Structure::parse(line.as_bytes(), StructureFormat::Pdb).unwrap_err();
        assert!(err.to_string().contains("x coordinate"));
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        let err = Structure::parse(&[0xff, 0xfe, 0x00], StructureFormat::Pdb).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_render_pdb_keeps_header() {
        let structure = Structure::parse(COMPLEX_PDB, StructureFormat::Pdb).unwrap();
        let out = String::from_utf8(structure.render(|a| a.chain_id == "B")).unwrap();
        assert!(out.starts_with("HEADER"));
        assert!(out.contains("REMARK   1 SYNTHETIC TEST COMPLEX"));
        assert!(!out.contains(" MET A "));
        assert!(out.trim_end().ends_with("END"));

        let reparsed = Structure::parse(out.as_bytes(), StructureFormat::Pdb).unwrap();
        assert_eq!(reparsed.atoms().len(), 6);
    }

    #[test]
    fn test_render_cif_subset_reparses() {
        let structure = Structure::parse(COMPLEX_CIF, StructureFormat::Cif).unwrap();
        let out = structure.render(|a| a.chain_id == "A" && a.res_seq <= 2);
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("data_XXXX"));
        assert!(text.contains("_pdbx_struct_oper_list.id 1"));

        let reparsed = Structure::parse(&out, StructureFormat::Cif).unwrap();
        assert_eq!(reparsed.atoms().len(), 6);
    }

    #[test]
    fn test_cif_tokens_quotes() {
        assert_eq!(
            cif_tokens(r#"ATOM 1 C "C1'" G 'a b' ?"#),
            vec!["ATOM", "1", "C", "C1'", "G", "a b", "?"]
        );
    }

    #[test]
    fn test_residue_position_prefers_ca() {
        let structure = Structure::parse(COMPLEX_PDB, StructureFormat::Pdb).unwrap();
        let residues = structure.residues();
        let ala = &residues[1];
        assert_eq!(ala.res_name, "ALA");
        assert_eq!(ala.position(), [7.6, 0.0, 0.0]);

        let guanine = residues.iter().find(|r| r.chain_id == "B").unwrap();
        let pos = guanine.position();
        assert!((pos[1] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_letter() {
        assert_eq!(one_letter("TRP"), 'W');
        assert_eq!(one_letter("DT"), 'T');
        assert_eq!(one_letter("HOH"), 'X');
    }
}
