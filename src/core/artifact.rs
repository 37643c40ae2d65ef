//! Named output payloads produced by batch processing.

use crate::core::input::{InputDescriptor, StructureFormat, sanitize_key};
use serde::Serialize;

/// Builds the file name of an artifact: `<base>.<sanitized-key>.<format>`.
///
/// # Examples
///
/// ```
/// use pskit_bridge::core::{StructureFormat, artifact_filename};
///
/// assert_eq!(artifact_filename("1abc", "A", StructureFormat::Pdb), "1abc.A.pdb");
/// ```
#[must_use]
pub fn artifact_filename(base: &str, key: &str, format: StructureFormat) -> String {
    format!("{base}.{}.{}", sanitize_key(key), format.as_str())
}

/// One named output payload derived from one batch input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchArtifact {
    /// Source name of the input that produced it.
    pub source_name: String,
    /// Key within the producing result (e.g. chain id).
    pub key: String,
    /// Derived file name.
    pub filename: String,
    /// Payload.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Payload size in bytes.
    pub size: usize,
}

impl BatchArtifact {
    /// Creates an artifact for `key`, deriving its file name from `input`.
    #[must_use]
    pub fn new(input: &InputDescriptor, key: impl Into<String>, bytes: Vec<u8>) -> Self {
        let key = key.into();
        Self {
            source_name: input.source_name.clone(),
            filename: artifact_filename(&input.base_name, &key, input.format),
            size: bytes.len(),
            key,
            bytes,
        }
    }
}

/// Artifacts of one source, in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactGroup {
    /// Shared source name.
    pub source_name: String,
    /// Artifacts of that source.
    pub items: Vec<BatchArtifact>,
}

/// Groups artifacts by source name, keeping first-seen source order.
#[must_use]
pub fn group_by_source(artifacts: Vec<BatchArtifact>) -> Vec<ArtifactGroup> {
    let mut groups: Vec<ArtifactGroup> = Vec::new();
    for artifact in artifacts {
        if let Some(group) = groups
            .iter_mut()
            .find(|g| g.source_name == artifact.source_name)
        {
            group.items.push(artifact);
        } else {
            groups.push(ArtifactGroup {
                source_name: artifact.source_name.clone(),
                items: vec![artifact],
            });
        }
    }
    groups
}
