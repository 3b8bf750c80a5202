//! Free space on the filesystem holding a directory, via sysinfo.

use log::debug;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Closest existing ancestor of `path`, canonicalized. The work directory may not exist yet.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .find_map(|p| p.canonicalize().ok())
        .or_else(|| std::env::current_dir().ok())
}

/// Available bytes on the disk whose mount point is the longest prefix of `path`.
/// `None` when no mounted disk matches.
pub fn available_bytes(path: &Path) -> Option<u64> {
    let path = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(disk) => {
            debug!(
                "Free space: path={}, mount={}, fs={}, available={} bytes",
                path.display(),
                disk.mount_point().display(),
                disk.file_system().to_string_lossy(),
                disk.available_space()
            );
            Some(disk.available_space())
        }
        None => {
            debug!("No disk found for path: {}", path.display());
            None
        }
    }
}
