//! Checking that a path really is an efivarfs mount.

use std::path::Path;

use crate::platform::{Platform, EFIVARFS_MAGIC};

/// True if `path` lives on efivarfs.
///
/// A missing path, a failed `statfs` and a foreign filesystem all count as
/// not mounted.
pub fn is_mounted<P: Platform + ?Sized>(platform: &P, path: &Path) -> bool {
    match platform.fs_magic(path) {
        Ok(magic) if magic == EFIVARFS_MAGIC => true,
        Ok(magic) => {
            tracing::debug!(path = %path.display(), magic, "not efivarfs");
            false
        }
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "statfs failed");
            false
        }
    }
}
