//! Scratch-file management.
//!
//! All streams live in anonymous temporaries under a configurable scratch
//! directory. The engine never relies on environment variables for
//! correctness; the directory defaults to the system temp dir and can be
//! redirected once at start-up.

use std::fs::File;
use std::path::PathBuf;
use std::sync::OnceLock;

use tempfile::{Builder, TempPath};

use strata_core::Result;

static SCRATCH_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Redirects scratch files to `dir`. Only the first call takes effect.
pub fn set_scratch_dir(dir: PathBuf) {
    let _ = SCRATCH_DIR.set(dir);
}

fn scratch_dir() -> PathBuf {
    SCRATCH_DIR.get().cloned().unwrap_or_else(std::env::temp_dir)
}

/// Creates a fresh scratch file. The returned [`TempPath`] unlinks the file
/// when dropped, so a levelized file disappears with its last handle.
pub fn scratch_file() -> Result<(File, TempPath)> {
    let named = Builder::new().prefix("strata-").tempfile_in(scratch_dir())?;
    Ok(named.into_parts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_files_vanish_on_drop() {
        let (_file, path) = scratch_file().unwrap();
        let p = path.to_path_buf();
        assert!(p.exists());
        drop(path);
        assert!(!p.exists());
    }
}
