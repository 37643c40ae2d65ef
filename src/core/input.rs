//! Batch inputs and structure file formats.

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdb|cif)$").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

static UNSAFE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9._-]+").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Structure file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    /// Legacy fixed-column PDB.
    #[default]
    Pdb,
    /// mmCIF.
    Cif,
}

impl StructureFormat {
    /// Lowercase name, also used as file extension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdb => "pdb",
            Self::Cif => "cif",
        }
    }

    /// Detects the format from a file name's extension.
    ///
    /// Anything other than `.cif` (case-insensitive) is treated as PDB.
    ///
    /// # Examples
    ///
    /// ```
    /// use pskit_bridge::core::StructureFormat;
    ///
    /// assert_eq!(StructureFormat::from_file_name("7U5E.CIF"), StructureFormat::Cif);
    /// assert_eq!(StructureFormat::from_file_name("model.txt"), StructureFormat::Pdb);
    /// ```
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        EXTENSION_RE
            .captures(name)
            .and_then(|c| c.get(1))
            .map_or(Self::Pdb, |m| {
                if m.as_str().eq_ignore_ascii_case("cif") {
                    Self::Cif
                } else {
                    Self::Pdb
                }
            })
    }
}

impl fmt::Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdb" => Ok(Self::Pdb),
            "cif" | "mmcif" => Ok(Self::Cif),
            _ => Err(ValidationError::invalid("format", "must be pdb or cif")),
        }
    }
}

/// Removes a trailing `.pdb`/`.cif` extension.
#[must_use]
pub fn strip_extension(name: &str) -> String {
    EXTENSION_RE.replace(name, "").into_owned()
}

/// Replaces runs of characters outside `[A-Za-z0-9._-]` with `_`.
///
/// # Examples
///
/// ```
/// use pskit_bridge::core::sanitize_key;
///
/// assert_eq!(sanitize_key("A/B chain"), "A_B_chain");
/// ```
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    UNSAFE_KEY_RE.replace_all(key, "_").into_owned()
}

/// Identity of a batch input, kept after its bytes are handed off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Original file name or download name.
    pub source_name: String,
    /// Name used as prefix for derived files.
    pub base_name: String,
    /// File format.
    pub format: StructureFormat,
}

/// One structure file queued for batch processing.
///
/// Immutable once built; processing consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInput {
    descriptor: InputDescriptor,
    bytes: Vec<u8>,
}

impl BatchInput {
    /// Creates an input with explicit names and format.
    #[must_use]
    pub fn new(
        source_name: impl Into<String>,
        base_name: impl Into<String>,
        format: StructureFormat,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            descriptor: InputDescriptor {
                source_name: source_name.into(),
                base_name: base_name.into(),
                format,
            },
            bytes,
        }
    }

    /// Creates an input from a file name, deriving base name and format.
    ///
    /// # Examples
    ///
    /// ```
    /// use pskit_bridge::core::{BatchInput, StructureFormat};
    ///
    /// let input = BatchInput::from_file_name("1abc.cif", b"data_1abc".to_vec());
    /// assert_eq!(input.base_name(), "1abc");
    /// assert_eq!(input.format(), StructureFormat::Cif);
    /// ```
    #[must_use]
    pub fn from_file_name(file_name: &str, bytes: Vec<u8>) -> Self {
        Self::new(
            file_name,
            strip_extension(file_name),
            StructureFormat::from_file_name(file_name),
            bytes,
        )
    }

    /// Source name.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.descriptor.source_name
    }

    /// Base name.
    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.descriptor.base_name
    }

    /// Format.
    #[must_use]
    pub const fn format(&self) -> StructureFormat {
        self.descriptor.format
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Borrows the descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &InputDescriptor {
        &self.descriptor
    }

    /// Splits the input into its descriptor and owned bytes.
    #[must_use]
    pub fn into_parts(self) -> (InputDescriptor, Vec<u8>) {
        (self.descriptor, self.bytes)
    }
}
