//! Expansion of file patterns given as inputs.
//!
//! The shell usually expands `*.log` itself, but quoted patterns (and shells
//! that don't glob, such as `cmd.exe`) reach the program verbatim. Any input
//! argument containing `*`, `?` or `[` is therefore matched here.
//!
//! ```no_run
//! use xcut::io::glob::expand_glob;
//!
//! let files = expand_glob("logs/2024-*.log.gz")?;
//! # Ok::<(), xcut::Error>(())
//! ```

use crate::error::{Error, Result};
use glob::glob;
use std::path::PathBuf;

/// True if `arg` contains glob metacharacters.
pub fn is_pattern(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Expand a glob pattern into the sorted list of regular files it matches.
///
/// Supports the usual syntax: `*`, `?`, `**` for any depth, `[abc]` and
/// `[!abc]`. Directories are skipped. No match yields an empty vector.
///
/// # Errors
///
/// Returns [`Error::InvalidGlob`] if the pattern is malformed or a matched
/// directory entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let invalid = |reason: String| Error::InvalidGlob { pattern: pattern.to_string(), reason };
    let paths = glob(pattern).map_err(|e| invalid(e.to_string()))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| invalid(e.to_string()))?;
        if path.is_file() {
            result.push(path);
        }
    }
    // Deterministic order, so sequence numbers are reproducible across runs.
    result.sort();
    Ok(result)
}

/// Like [`expand_glob`], but zero matches is an error.
///
/// # Errors
///
/// Returns [`Error::NoMatchingInput`] if nothing matches, or any error of [`expand_glob`].
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(Error::NoMatchingInput { pattern: pattern.to_string() });
    }
    Ok(files)
}

/// Turn input arguments into paths, expanding patterns in place.
///
/// Plain arguments are kept as given (their existence is checked when the
/// input is opened). Argument order is preserved; matches of one pattern are
/// sorted among themselves.
///
/// # Errors
///
/// Fails if a pattern is malformed or matches no file.
pub fn expand_inputs<S: AsRef<str>>(args: &[S]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        let arg = arg.as_ref();
        if is_pattern(arg) {
            out.extend(expand_glob_required(arg)?);
        } else {
            out.push(PathBuf::from(arg));
        }
    }
    Ok(out)
}
