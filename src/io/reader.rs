//! Structure file reading with memory mapping support.
//!
//! Small files are read directly; large ones (multi-megabyte mmCIF
//! assemblies are common) are memory mapped before being copied into the
//! owned buffer that is handed to the execution context.

// Memory mapping requires unsafe but is sound for read-only access
#![allow(unsafe_code)]

use crate::core::BatchInput;
use crate::error::{CommandError, IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum structure file size (1GB).
const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Structure file reader.
///
/// Chooses the reading strategy by file size:
/// - Small files (< 1MB): read directly into memory
/// - Large files (>= 1MB): memory mapped, then copied
///
/// # Examples
///
/// ```no_run
/// use pskit_bridge::io::FileReader;
///
/// let reader = FileReader::open("7u5e.cif").unwrap();
/// let bytes = reader.read_to_bytes().unwrap();
/// ```
#[derive(Debug)]
pub struct FileReader {
    file: File,
    size: u64,
    path: String,
}

impl FileReader {
    /// Opens a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, can't be opened, or
    /// exceeds the size limit.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        if !path_ref.is_file() {
            return Err(IoError::FileNotFound { path: path_str }.into());
        }

        let file = File::open(path_ref).map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let size = file
            .metadata()
            .map_err(|e| IoError::ReadFailed {
                path: path_str.clone(),
                reason: e.to_string(),
            })?
            .len();

        if size > MAX_FILE_SIZE {
            return Err(IoError::ReadFailed {
                path: path_str,
                reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
            }
            .into());
        }

        Ok(Self {
            file,
            size,
            path: path_str,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or mapping fails.
    pub fn read_to_bytes(&self) -> Result<Vec<u8>> {
        if self.size >= MMAP_THRESHOLD {
            self.read_mmap_bytes()
        } else {
            self.read_direct_bytes()
        }
    }

    fn read_mmap_bytes(&self) -> Result<Vec<u8>> {
        // Safety: the mapping is read-only and dropped before returning
        let mmap = unsafe {
            Mmap::map(&self.file).map_err(|e| IoError::MmapFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };
        Ok(mmap.to_vec())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_direct_bytes(&self) -> Result<Vec<u8>> {
        let mut file = &self.file;
        let mut buffer = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| IoError::ReadFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(buffer)
    }
}

/// Reads a file into memory, choosing the best method.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    FileReader::open(path)?.read_to_bytes()
}

/// Reads one structure file as a batch input.
///
/// The file name (without directories) becomes the source name, and its
/// extension decides the format.
///
/// # Errors
///
/// Returns an error if the path has no file name or cannot be read.
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<BatchInput> {
    let path_ref = path.as_ref();
    let file_name = path_ref
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            CommandError::InvalidArgument(format!("not a file path: {}", path_ref.display()))
        })?;
    let bytes = read_file(path_ref)?;
    tracing::debug!(source = %file_name, size = bytes.len(), "input loaded");
    Ok(BatchInput::from_file_name(&file_name, bytes))
}

/// Reads every path as a batch input, in the given order.
///
/// # Errors
///
/// Returns [`CommandError::NoInputs`] for an empty list, or the first
/// read error.
pub fn read_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<BatchInput>> {
    if paths.is_empty() {
        return Err(CommandError::NoInputs.into());
    }
    paths.iter().map(read_input).collect()
}
