//! The efivarfs backend.
//!
//! Each variable is a file named `Name-GUID` directly under the mount point.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::attributes::VariableAttributes;
use crate::backend::VariableBackend;
use crate::codec;
use crate::descriptor::{self, VariableDescriptor};
use crate::error::{self, Error, Result};
use crate::inode::make_mutable;
use crate::platform::{OpenMode, OsPlatform, Platform};
use crate::probe::is_mounted;

/// Where efivarfs is mounted on a standard Linux system.
pub const DEFAULT_MOUNT: &str = "/sys/firmware/efi/efivars";

/// A [`VariableBackend`] over an efivarfs mount.
///
/// # Example
///
/// ```rust,no_run
/// use efivar_store::{VarFs, VariableBackend, DEFAULT_MOUNT};
///
/// let vars = VarFs::new(DEFAULT_MOUNT);
/// for descriptor in vars.enumerate().unwrap() {
///     println!("{}", descriptor);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VarFs<P: Platform = OsPlatform> {
    mount: PathBuf,
    platform: P,
}

impl VarFs<OsPlatform> {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self::with_platform(mount, OsPlatform)
    }
}

impl Default for VarFs<OsPlatform> {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT)
    }
}

impl<P: Platform> VarFs<P> {
    pub fn with_platform(mount: impl Into<PathBuf>, platform: P) -> Self {
        Self {
            mount: mount.into(),
            platform,
        }
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether the mount path is currently backed by efivarfs.
    pub fn is_mounted(&self) -> bool {
        is_mounted(&self.platform, &self.mount)
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(Error::NotMounted {
                path: self.mount.clone(),
            })
        }
    }

    fn variable_path(&self, name: &str, guid: &Uuid) -> PathBuf {
        self.mount.join(descriptor::file_name(name, guid))
    }
}

/// Map the failure to open an existing variable.
fn classify_open_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::VariableNotFound
    } else if error::is_permission(&err) {
        Error::PermissionDenied
    } else {
        Error::Io(err)
    }
}

/// Map the failure to read or change inode flags.
fn classify_flag_error(err: io::Error) -> Error {
    if error::is_permission(&err) {
        Error::PermissionDenied
    } else {
        Error::Io(err)
    }
}

impl<P: Platform> VariableBackend for VarFs<P> {
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        self.ensure_mounted()?;

        let path = self.variable_path(name, guid);
        tracing::debug!(path = %path.display(), "reading variable");
        let mut file = self
            .platform
            .open(&path, OpenMode::Read)
            .map_err(classify_open_error)?;
        codec::read_record(&mut file)
    }

    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_mounted()?;

        let path = self.variable_path(name, guid);
        let mode = OpenMode::Create {
            append: attrs.contains(VariableAttributes::APPEND_WRITE),
        };
        let _span = tracing::debug_span!("store", path = %path.display()).entered();

        // Only needed to get at the inode flags; a variable that does not
        // exist yet has nothing to clear.
        let mut existing = match self.platform.open(&path, OpenMode::Read) {
            Ok(file) => Some(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) if error::is_permission(&err) => return Err(Error::PermissionDenied),
            Err(err) => return Err(err.into()),
        };
        let _restore = match existing.as_mut() {
            Some(file) => Some(make_mutable(file).map_err(classify_flag_error)?),
            None => None,
        };

        let mut file = self.platform.open(&path, mode).map_err(|err| {
            if error::is_access_denied(&err) {
                // No privileges for the file, or for the directory when the
                // variable has to be created. Retrying will not help.
                Error::PermissionDenied
            } else if error::is_operation_not_permitted(&err) {
                // The file exists but is immutable again: someone else wrote
                // or recreated the variable after we cleared the flag.
                tracing::debug!("variable became immutable again");
                Error::RetryNeeded
            } else {
                Error::Io(err)
            }
        })?;

        let record = codec::encode(attrs, data);
        tracing::debug!(attrs = attrs.bits(), len = record.len(), "writing variable");
        // efivarfs takes the whole record in a single write(2); anything
        // else is an error from the kernel, not a short write to resume.
        file.write_all(&record)?;
        file.flush()?;
        Ok(())
    }

    fn erase(&self, name: &str, guid: &Uuid) -> Result<()> {
        self.ensure_mounted()?;

        let path = self.variable_path(name, guid);
        let _span = tracing::debug_span!("erase", path = %path.display()).entered();

        let mut file = match self.platform.open(&path, OpenMode::Write) {
            Ok(file) => file,
            Err(err) if error::is_operation_not_permitted(&err) => {
                // Immutable inodes refuse write opens; a read handle is
                // enough to clear the flag.
                tracing::debug!("variable is immutable, clearing through a read handle");
                self.platform
                    .open(&path, OpenMode::Read)
                    .map_err(classify_open_error)?
            }
            Err(err) => return Err(classify_open_error(err)),
        };
        make_mutable(&mut file)
            .map_err(classify_flag_error)?
            .disarm();
        drop(file);

        tracing::debug!("removing variable");
        self.platform.remove_file(&path)?;
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<VariableDescriptor>> {
        self.ensure_mounted()?;

        tracing::debug!(mount = %self.mount.display(), "listing variables");
        // Only failing to open the mount itself says anything about access;
        // a broken entry is plain I/O trouble.
        let entries = self
            .platform
            .read_dir(&self.mount)
            .map_err(classify_open_error)?;

        let mut descriptors = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.is_file {
                continue;
            }
            let Some(file_name) = entry.name.to_str() else {
                tracing::debug!(name = ?entry.name, "skipping non UTF-8 entry");
                continue;
            };
            // Too short for a GUID and a hyphen, or no hyphen between the
            // name and the GUID.
            let Some((name, guid)) = VariableDescriptor::split(file_name) else {
                tracing::debug!(file_name, "skipping entry without a GUID suffix");
                continue;
            };
            // Deleted by writing an empty payload.
            if entry.len == 0 {
                tracing::debug!(file_name, "skipping tombstone");
                continue;
            }
            let Ok(guid) = Uuid::parse_str(guid) else {
                tracing::debug!(file_name, "skipping entry with an unparsable GUID");
                continue;
            };
            descriptors.push(VariableDescriptor::new(name, guid));
        }

        descriptors.sort();
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::facade::Efivars;
    use crate::platform::{EFIVARFS_MAGIC, FS_IMMUTABLE_FL};
    use crate::testing::{backend_suite, FakeEfivarfs};

    fn guid() -> Uuid {
        Uuid::parse_str("8be4df61-93ca-11d2-aa0d-00e098032b8c").unwrap()
    }

    fn varfs() -> VarFs<FakeEfivarfs> {
        let fs = FakeEfivarfs::new();
        VarFs::with_platform(fs.mount().to_path_buf(), fs)
    }

    fn stored(vars: &VarFs<FakeEfivarfs>, name: &str) -> Vec<u8> {
        vars.platform()
            .contents(&vars.variable_path(name, &guid()))
            .unwrap()
    }

    #[test]
    fn path_is_name_dash_guid() {
        let vars = VarFs::new("/sys/firmware/efi/efivars");
        assert_eq!(
            vars.variable_path("Boot0001", &guid()),
            PathBuf::from(
                "/sys/firmware/efi/efivars/Boot0001-8be4df61-93ca-11d2-aa0d-00e098032b8c"
            )
        );
    }

    #[test]
    fn store_then_fetch_pads_payload() {
        let vars = varfs();
        vars.store("Test", &guid(), VariableAttributes::NON_VOLATILE, &[0xAA])
            .unwrap();

        let (attrs, data) = vars.fetch("Test", &guid()).unwrap();
        assert_eq!(attrs, VariableAttributes::NON_VOLATILE);
        assert_eq!(data, [0xAA, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(stored(&vars, "Test"), [1, 0, 0, 0, 0xAA, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let vars = varfs();
        let err = vars.fetch("Missing", &guid()).unwrap_err();
        assert!(matches!(err, Error::VariableNotFound));
    }

    #[test]
    fn fetch_tombstone_is_not_found() {
        let vars = varfs();
        vars.platform()
            .insert(&vars.variable_path("Gone", &guid()), Vec::new());
        let err = vars.fetch("Gone", &guid()).unwrap_err();
        assert!(matches!(err, Error::VariableNotFound));
    }

    #[test]
    fn fetch_without_access_is_permission_denied() {
        let vars = varfs();
        let path = vars.variable_path("Secret", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().deny_access(&path);
        let err = vars.fetch("Secret", &guid()).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
    }

    #[test]
    fn not_mounted_wins_over_not_found() {
        let vars = varfs();
        vars.platform().set_magic(0x9fa0);

        assert!(matches!(
            vars.fetch("Missing", &guid()),
            Err(Error::NotMounted { .. })
        ));
        assert!(matches!(
            vars.store("New", &guid(), VariableAttributes::empty(), &[1]),
            Err(Error::NotMounted { .. })
        ));
        assert!(matches!(
            vars.erase("Missing", &guid()),
            Err(Error::NotMounted { .. })
        ));
        assert!(matches!(vars.enumerate(), Err(Error::NotMounted { .. })));
    }

    #[test]
    fn real_directory_is_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let vars = VarFs::new(dir.path());
        assert!(!vars.is_mounted());
        let err = vars.fetch("Boot0001", &guid()).unwrap_err();
        assert!(matches!(err, Error::NotMounted { ref path } if path == dir.path()));

        let vars = VarFs::new(dir.path().join("does-not-exist"));
        assert!(matches!(vars.enumerate(), Err(Error::NotMounted { .. })));
    }

    #[test]
    fn store_clears_and_restores_immutable_flag() {
        let vars = varfs();
        let path = vars.variable_path("Locked", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1, 2]);
        vars.platform().set_flags(&path, FS_IMMUTABLE_FL);

        vars.store("Locked", &guid(), VariableAttributes::RUNTIME_ACCESS, &[9])
            .unwrap();

        assert_eq!(stored(&vars, "Locked"), [4, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(vars.platform().flags(&path), Some(FS_IMMUTABLE_FL));
    }

    #[test]
    fn store_replaces_existing_payload() {
        let vars = varfs();
        vars.store("Var", &guid(), VariableAttributes::NON_VOLATILE, &[1; 20])
            .unwrap();
        vars.store("Var", &guid(), VariableAttributes::NON_VOLATILE, &[2; 3])
            .unwrap();
        let (_, data) = vars.fetch("Var", &guid()).unwrap();
        assert_eq!(data, [2, 2, 2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn append_write_appends() {
        let vars = varfs();
        let attrs = VariableAttributes::NON_VOLATILE | VariableAttributes::APPEND_WRITE;
        vars.store("Log", &guid(), VariableAttributes::NON_VOLATILE, &[1])
            .unwrap();
        vars.store("Log", &guid(), attrs, &[2]).unwrap();

        let (_, data) = vars.fetch("Log", &guid()).unwrap();
        assert_eq!(data, [1, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn racing_writer_needs_retry() {
        let vars = varfs();
        let path = vars.variable_path("Raced", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().set_flags(&path, FS_IMMUTABLE_FL);
        vars.platform().race_next_writes(1);

        let err = vars
            .store("Raced", &guid(), VariableAttributes::NON_VOLATILE, &[5])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(stored(&vars, "Raced"), [7, 0, 0, 0, 1]);

        vars.store("Raced", &guid(), VariableAttributes::NON_VOLATILE, &[5])
            .unwrap();
        assert_eq!(stored(&vars, "Raced")[4], 5);
    }

    #[test]
    fn denied_create_is_permission_denied() {
        let vars = varfs();
        vars.platform().deny_access(vars.mount());
        let err = vars
            .store("New", &guid(), VariableAttributes::NON_VOLATILE, &[1])
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
    }

    #[test]
    fn denied_write_open_is_not_retried() {
        let vars = Efivars::new(varfs());
        let fs = vars.backend().platform();
        let path = vars.backend().variable_path("Locked", &guid());
        fs.insert(&path, vec![7, 0, 0, 0, 1]);
        fs.deny_writes(&path);

        let err = vars
            .write("Locked", &guid(), VariableAttributes::NON_VOLATILE, &[2])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(fs.write_opens(), 1);
        assert_eq!(fs.contents(&path), Some(vec![7, 0, 0, 0, 1]));
    }

    #[test]
    fn erase_without_access_is_permission_denied() {
        let vars = varfs();
        let path = vars.variable_path("Guarded", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().deny_access(&path);

        let err = vars.erase("Guarded", &guid()).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert!(vars.platform().contents(&path).is_some());
    }

    #[test]
    fn erase_with_denied_write_open_is_permission_denied() {
        let vars = varfs();
        let path = vars.variable_path("Guarded", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().deny_writes(&path);

        let err = vars.erase("Guarded", &guid()).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert!(vars.platform().contents(&path).is_some());
    }

    #[test]
    fn erase_removes_immutable_variable() {
        let vars = varfs();
        let path = vars.variable_path("Old", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().set_flags(&path, FS_IMMUTABLE_FL);

        vars.erase("Old", &guid()).unwrap();

        assert!(vars.platform().contents(&path).is_none());
        assert!(matches!(
            vars.fetch("Old", &guid()),
            Err(Error::VariableNotFound)
        ));
    }

    #[test]
    fn erase_missing_is_not_found() {
        let vars = varfs();
        assert!(matches!(
            vars.erase("Missing", &guid()),
            Err(Error::VariableNotFound)
        ));
    }

    #[test]
    fn enumerate_filters_entries() {
        let vars = varfs();
        let fs = vars.platform();
        let mount = vars.mount().to_path_buf();
        let g = guid();

        fs.insert(&mount.join(format!("Boot0001-{}", g)), vec![7, 0, 0, 0, 1]);
        fs.insert(&mount.join(format!("my-var-{}", g)), vec![7, 0, 0, 0, 1]);
        // Tombstone.
        fs.insert(&mount.join(format!("Deleted-{}", g)), Vec::new());
        // Too short to hold a GUID.
        fs.insert(&mount.join("short"), vec![7, 0, 0, 0]);
        // No hyphen before the GUID.
        fs.insert(&mount.join(format!("NoDash_{}", g)), vec![7, 0, 0, 0]);
        // Right shape, not a GUID.
        fs.insert(
            &mount.join("Bad-zzzzzzzz-93ca-11d2-aa0d-00e098032b8c"),
            vec![7, 0, 0, 0],
        );
        fs.insert_dir(&mount.join(format!("Dir-{}", g)));

        let names: Vec<_> = vars
            .enumerate()
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["Boot0001", "my-var"]);
    }

    #[test]
    fn enumerate_reports_broken_entry_as_io() {
        let vars = varfs();
        let path = vars.variable_path("Flaky", &guid());
        vars.platform().insert(&path, vec![7, 0, 0, 0, 1]);
        vars.platform().break_entry(&path);

        let err = vars.enumerate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn enumerate_denied_mount_is_permission_denied() {
        let vars = varfs();
        vars.platform().deny_access(vars.mount());
        assert!(matches!(vars.enumerate(), Err(Error::PermissionDenied)));
    }

    /// Collects formatted log output for the duration of `f`.
    fn captured_logs(f: impl FnOnce()) -> String {
        #[derive(Clone)]
        struct Buffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

        impl Write for Buffer {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Buffer(Default::default());
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn enumerate_logs_mount_path() {
        let vars = varfs();
        let logs = captured_logs(|| {
            vars.enumerate().unwrap();
        });
        assert!(logs.contains("listing variables"), "{}", logs);
        assert!(logs.contains(crate::DEFAULT_MOUNT), "{}", logs);
    }

    #[test]
    fn enumerate_sorts_by_combined_string() {
        let vars = varfs();
        let a = Uuid::from_u128(0xa);
        let b = Uuid::from_u128(0xb);
        for (name, guid) in [("Zed", a), ("Alpha", b), ("Alpha", a), ("Alp", b)] {
            vars.store(name, &guid, VariableAttributes::NON_VOLATILE, &[1])
                .unwrap();
        }
        let listed: Vec<_> = vars
            .enumerate()
            .unwrap()
            .iter()
            .map(|d| d.to_string())
            .collect();
        let mut expected = listed.clone();
        expected.sort();
        assert_eq!(listed, expected);
        assert_eq!(listed.len(), 4);
    }

    #[test]
    fn magic_constant_matches_kernel() {
        assert_eq!(EFIVARFS_MAGIC, 0xde5e81e4);
    }

    #[test]
    fn conforms_to_backend_suite() {
        backend_suite::run_all(varfs);
    }
}
