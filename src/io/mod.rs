//! File I/O for pskit-bridge.
//!
//! Reads structure files into batch inputs (memory mapping large files)
//! and writes batch artifacts into a per-source folder layout.

pub mod reader;
pub mod writer;

pub use reader::{FileReader, read_file, read_input, read_inputs};
pub use writer::{WrittenFile, folder_name, unique_name, write_artifacts, write_file};
