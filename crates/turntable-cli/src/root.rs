use std::path::{Path, PathBuf};
use turntable_core::paths;

/// Resolve the storage root.
///
/// Priority:
/// 1. `--root` flag / `TURNTABLE_ROOT` env var (passed in as `explicit`)
/// 2. `~/turntable-projects`
pub fn resolve_root(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    Ok(paths::default_root()?)
}
