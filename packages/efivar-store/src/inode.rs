//! Clearing and restoring the immutable inode flag.
//!
//! efivarfs marks most variable files immutable so that a stray `rm` cannot
//! brick a machine. Writing or deleting such a variable means clearing
//! `FS_IMMUTABLE_FL` first and, for writes, putting it back afterwards.

use std::io;

use crate::platform::{VarFile, FS_IMMUTABLE_FL};

/// Restores the inode flags captured by [`make_mutable`] when dropped.
///
/// Restoring is best effort. The kernel sets the flag again on the next
/// boot anyway, so a failed restore only leaves the variable writable until
/// then; it is reported as a `warn` event and otherwise ignored.
#[must_use = "dropping the guard immediately restores the immutable flag"]
pub struct MutableGuard<'a, F: VarFile> {
    file: &'a mut F,
    snapshot: Option<u32>,
}

impl<F: VarFile> MutableGuard<'_, F> {
    /// Whether the file was immutable before the guard cleared it.
    pub fn was_immutable(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Restore the original flags now.
    pub fn restore(mut self) {
        self.restore_snapshot();
    }

    /// Leave the flag cleared, e.g. because the file is about to go away.
    pub fn disarm(mut self) {
        self.snapshot = None;
    }

    fn restore_snapshot(&mut self) {
        if let Some(flags) = self.snapshot.take() {
            if let Err(error) = self.file.set_inode_flags(flags) {
                tracing::warn!(
                    %error,
                    flags,
                    "failed to restore immutable flag, it will be reapplied on reboot"
                );
            }
        }
    }
}

impl<F: VarFile> Drop for MutableGuard<'_, F> {
    fn drop(&mut self) {
        self.restore_snapshot();
    }
}

/// Clear `FS_IMMUTABLE_FL` on `file` if it is set.
///
/// The returned guard puts the original flags back when it goes out of
/// scope. If the flag was not set nothing is written, now or later.
pub fn make_mutable<F: VarFile>(file: &mut F) -> io::Result<MutableGuard<'_, F>> {
    let flags = file.inode_flags()?;
    if flags & FS_IMMUTABLE_FL == 0 {
        return Ok(MutableGuard {
            file,
            snapshot: None,
        });
    }

    file.set_inode_flags(flags & !FS_IMMUTABLE_FL)?;
    Ok(MutableGuard {
        file,
        snapshot: Some(flags),
    })
}
