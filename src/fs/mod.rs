//! File Provider Module
//!
//! Filesystem access consumed by the core: reading Jam files, probing
//! candidate paths during binding, and reading sources for the header scan.

pub mod types;

pub use types::{FileProvider, FsError, RealFs};
