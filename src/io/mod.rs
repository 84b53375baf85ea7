//! Input plumbing: file pattern expansion and transparent decompression.

pub mod compression;
pub mod glob;
