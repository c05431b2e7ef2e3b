//! Install-root discovery.
//!
//! Each product adapter locates its install root by probing a fixed, ordered
//! list of candidate directories and taking the first match. There is no
//! discovery beyond the static list; a product installed somewhere exotic is
//! simply reported as not installed.

use std::path::{Path, PathBuf};

/// Return the first candidate directory that exists on disk
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_dir()).cloned()
}

/// Return the first candidate file that exists on disk
pub fn first_existing_file(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Expand `%ProgramFiles%`-style candidates against the environment.
///
/// Missing variables drop the candidate rather than producing a bogus path.
pub fn env_candidate(var: &str, suffix: impl AsRef<Path>) -> Option<PathBuf> {
    std::env::var_os(var).map(|base| PathBuf::from(base).join(suffix))
}
