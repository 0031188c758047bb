//! Free disk space on the output filesystem.

use nix::sys::statvfs::statvfs;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Default minimum free space for the output directory (1 GiB).
pub const DEFAULT_MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSpace {
    pub path: PathBuf,
    pub free_bytes: u64,
    pub total_bytes: u64,
}

impl DiskSpace {
    pub fn has_at_least(&self, min_free_bytes: u64) -> bool {
        self.free_bytes >= min_free_bytes
    }
}

/// Space available to unprivileged users on the filesystem holding `path`.
///
/// A path that does not exist yet is measured at its nearest existing ancestor.
pub fn free_space(path: &Path) -> MediaResult<DiskSpace> {
    let target = existing_ancestor(path)
        .ok_or_else(|| MediaError::disk(path, "no existing ancestor directory"))?;

    let stat = statvfs(&target).map_err(|e| MediaError::disk(&target, e.to_string()))?;
    let fragment = stat.fragment_size() as u64;

    Ok(DiskSpace {
        path: target,
        free_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
        total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
    })
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    absolute.ancestors().find(|p| p.exists()).map(Path::to_path_buf)
}

/// Human-readable byte count (`1.5 GiB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
