//! Persistence: submap store JSON format, trajectory export, and point
//! cloud dumps for offline inspection.

pub mod ply;
pub mod store;

pub use ply::write_ply;
pub use store::{load_store, save_store, save_trajectory};

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RefineError, Result};

/// Resolve a stage output subdirectory.
///
/// With no base directory configured this is a no-op. A configured base
/// directory must already exist; the named subdirectory is created inside it.
pub fn prepare_stage_dir(base: Option<&Path>, name: &str) -> Result<Option<PathBuf>> {
    match base {
        None => Ok(None),
        Some(base) => {
            if !base.exists() {
                return Err(RefineError::OutputDir(base.to_path_buf()));
            }
            let dir = base.join(name);
            fs::create_dir_all(&dir)?;
            Ok(Some(dir))
        }
    }
}
