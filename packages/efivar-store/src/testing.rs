//! Test support: a fake efivarfs and a shared backend test suite.
//!
//! Enabled for this crate's own tests and, for other crates, through the
//! `test-utils` feature.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::platform::{
    DirEntryInfo, OpenMode, Platform, VarFile, EFIVARFS_MAGIC, FS_IMMUTABLE_FL,
};

#[derive(Debug)]
enum Node {
    File { data: Vec<u8>, flags: u32 },
    Dir,
}

#[derive(Debug)]
struct State {
    magic: u32,
    nodes: BTreeMap<PathBuf, Node>,
    denied: BTreeSet<PathBuf>,
    write_denied: BTreeSet<PathBuf>,
    broken_entries: BTreeSet<PathBuf>,
    pending_races: usize,
    write_opens: usize,
}

/// An in-memory [`Platform`] that behaves like efivarfs.
///
/// - every `write(2)` replaces the whole variable, or appends the payload
///   when the file was opened for appending,
/// - a record without payload leaves a zero-length tombstone behind,
/// - immutable files refuse write opens and removal with `EPERM`,
/// - paths marked with [`deny_access`](Self::deny_access) fail with
///   `EACCES`, as do their direct children,
/// - paths marked with [`deny_writes`](Self::deny_writes) can still be
///   opened for reading, but write opens fail with `EACCES`.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct FakeEfivarfs {
    mount: PathBuf,
    state: Arc<Mutex<State>>,
}

impl Default for FakeEfivarfs {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEfivarfs {
    /// An empty efivarfs mounted at `/sys/firmware/efi/efivars`.
    pub fn new() -> Self {
        let mount = PathBuf::from(crate::DEFAULT_MOUNT);
        let mut nodes = BTreeMap::new();
        nodes.insert(mount.clone(), Node::Dir);
        Self {
            mount,
            state: Arc::new(Mutex::new(State {
                magic: EFIVARFS_MAGIC,
                nodes,
                denied: BTreeSet::new(),
                write_denied: BTreeSet::new(),
                broken_entries: BTreeSet::new(),
                pending_races: 0,
                write_opens: 0,
            })),
        }
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change the magic reported by `statfs`.
    pub fn set_magic(&self, magic: u32) {
        self.state().magic = magic;
    }

    /// Create or overwrite a file with raw contents, flags cleared.
    pub fn insert(&self, path: &Path, data: Vec<u8>) {
        self.state()
            .nodes
            .insert(path.to_path_buf(), Node::File { data, flags: 0 });
    }

    pub fn insert_dir(&self, path: &Path) {
        self.state().nodes.insert(path.to_path_buf(), Node::Dir);
    }

    /// Raw file contents, `None` if there is no such file.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.state().nodes.get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn flags(&self, path: &Path) -> Option<u32> {
        match self.state().nodes.get(path) {
            Some(Node::File { flags, .. }) => Some(*flags),
            _ => None,
        }
    }

    pub fn set_flags(&self, path: &Path, new_flags: u32) {
        if let Some(Node::File { flags, .. }) = self.state().nodes.get_mut(path) {
            *flags = new_flags;
        }
    }

    /// Make `path` and everything directly below it inaccessible.
    pub fn deny_access(&self, path: &Path) {
        self.state().denied.insert(path.to_path_buf());
    }

    /// Let `path` be read but not opened for writing.
    pub fn deny_writes(&self, path: &Path) {
        self.state().write_denied.insert(path.to_path_buf());
    }

    /// Listing the parent directory yields an `EIO` error for `path`.
    pub fn break_entry(&self, path: &Path) {
        self.state().broken_entries.insert(path.to_path_buf());
    }

    /// Simulate a concurrent writer: the next `count` write opens of an
    /// existing file find it immutable again.
    pub fn race_next_writes(&self, count: usize) {
        self.state().pending_races = count;
    }

    /// How many times a file was opened for writing.
    pub fn write_opens(&self) -> usize {
        self.state().write_opens
    }
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl State {
    fn is_denied(&self, path: &Path) -> bool {
        self.denied.contains(path) || path.parent().is_some_and(|p| self.denied.contains(p))
    }

    fn file_flags(&mut self, path: &Path) -> io::Result<&mut u32> {
        match self.nodes.get_mut(path) {
            Some(Node::File { flags, .. }) => Ok(flags),
            Some(Node::Dir) => Err(errno(libc::EISDIR)),
            None => Err(errno(libc::ENOENT)),
        }
    }

    /// Common checks for opening an existing file for writing.
    fn open_existing_for_write(&mut self, path: &Path) -> io::Result<()> {
        self.write_opens += 1;
        if self.write_denied.contains(path) {
            return Err(errno(libc::EACCES));
        }
        let race = self.pending_races > 0;
        let flags = self.file_flags(path)?;
        if race {
            *flags |= FS_IMMUTABLE_FL;
        }
        let immutable = *flags & FS_IMMUTABLE_FL != 0;
        if race {
            self.pending_races -= 1;
        }
        if immutable {
            return Err(errno(libc::EPERM));
        }
        Ok(())
    }
}

impl Platform for FakeEfivarfs {
    type File = FakeFile;
    type ReadDir = std::vec::IntoIter<io::Result<DirEntryInfo>>;

    fn fs_magic(&self, path: &Path) -> io::Result<u32> {
        let state = self.state();
        if !state.nodes.contains_key(path) {
            return Err(errno(libc::ENOENT));
        }
        Ok(state.magic)
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<FakeFile> {
        let mut state = self.state();
        if state.is_denied(path) {
            return Err(errno(libc::EACCES));
        }

        let append = match mode {
            OpenMode::Read => {
                state.file_flags(path)?;
                false
            }
            OpenMode::Write => {
                state.open_existing_for_write(path)?;
                false
            }
            OpenMode::Create { append } => {
                if state.nodes.contains_key(path) {
                    state.open_existing_for_write(path)?;
                } else {
                    state.write_opens += 1;
                    if state.write_denied.contains(path) {
                        return Err(errno(libc::EACCES));
                    }
                    let parent_is_dir = path
                        .parent()
                        .is_some_and(|p| matches!(state.nodes.get(p), Some(Node::Dir)));
                    if !parent_is_dir {
                        return Err(errno(libc::ENOENT));
                    }
                    state.nodes.insert(
                        path.to_path_buf(),
                        Node::File {
                            data: Vec::new(),
                            flags: 0,
                        },
                    );
                }
                append
            }
        };

        Ok(FakeFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            writable: mode != OpenMode::Read,
            append,
            position: 0,
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Self::ReadDir> {
        let state = self.state();
        if state.is_denied(path) {
            return Err(errno(libc::EACCES));
        }
        match state.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => return Err(errno(libc::ENOTDIR)),
            None => return Err(errno(libc::ENOENT)),
        }

        let entries: Vec<_> = state
            .nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .filter_map(|(child, node)| {
                if state.broken_entries.contains(child) {
                    return Some(Err(errno(libc::EIO)));
                }
                let name = child.file_name()?.to_os_string();
                Some(Ok(match node {
                    Node::File { data, .. } => DirEntryInfo {
                        name,
                        is_file: true,
                        len: data.len() as u64,
                    },
                    Node::Dir => DirEntryInfo {
                        name,
                        is_file: false,
                        len: 0,
                    },
                }))
            })
            .collect();
        Ok(entries.into_iter())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        if state.is_denied(path) {
            return Err(errno(libc::EACCES));
        }
        if *state.file_flags(path)? & FS_IMMUTABLE_FL != 0 {
            return Err(errno(libc::EPERM));
        }
        state.nodes.remove(path);
        Ok(())
    }
}

/// A handle on a [`FakeEfivarfs`] file.
#[derive(Debug)]
pub struct FakeFile {
    state: Arc<Mutex<State>>,
    path: PathBuf,
    writable: bool,
    append: bool,
    position: usize,
}

impl FakeFile {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Read for FakeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let state = self.state();
            let data = match state.nodes.get(&self.path) {
                Some(Node::File { data, .. }) => data,
                _ => return Err(errno(libc::ENOENT)),
            };
            let remaining = data.get(self.position..).unwrap_or_default();
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            n
        };
        self.position += n;
        Ok(n)
    }
}

impl Write for FakeFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(errno(libc::EBADF));
        }
        // Like efivarfs, every write carries a complete record.
        if buf.len() < crate::codec::HEADER_LEN {
            return Err(errno(libc::EINVAL));
        }
        let append = self.append;
        let mut state = self.state();
        let data = match state.nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => data,
            _ => return Err(errno(libc::ENOENT)),
        };
        let payload = &buf[crate::codec::HEADER_LEN..];
        if append && !data.is_empty() {
            data.extend_from_slice(payload);
        } else if payload.is_empty() {
            data.clear();
        } else {
            *data = buf.to_vec();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl VarFile for FakeFile {
    fn inode_flags(&self) -> io::Result<u32> {
        let path = self.path.clone();
        self.state().file_flags(&path).map(|flags| *flags)
    }

    fn set_inode_flags(&mut self, new_flags: u32) -> io::Result<()> {
        let path = self.path.clone();
        *self.state().file_flags(&path)? = new_flags;
        Ok(())
    }
}

/// Behaviour every [`VariableBackend`](crate::VariableBackend) must share.
///
/// Each check takes a factory so it starts from an empty namespace.
pub mod backend_suite {
    use uuid::Uuid;

    use crate::{Error, VariableAttributes, VariableBackend, VariableDescriptor};

    /// `EFI_GLOBAL_VARIABLE`.
    pub const GLOBAL_GUID: Uuid = Uuid::from_u128(0x8be4df61_93ca_11d2_aa0d_00e098032b8c);

    pub fn run_all<B: VariableBackend>(factory: fn() -> B) {
        round_trip_pads_payload(factory);
        missing_variable_is_not_found(factory);
        erase_hides_variable(factory);
        erase_missing_is_not_found(factory);
        empty_write_deletes(factory);
        enumerate_is_sorted(factory);
        names_may_contain_hyphens(factory);
        boot_entry_scenario(factory);
    }

    pub fn round_trip_pads_payload<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        let attrs = VariableAttributes::BOOTSERVICE_ACCESS | VariableAttributes::RUNTIME_ACCESS;
        backend.store("Pad", &GLOBAL_GUID, attrs, &[0xAA]).unwrap();

        let (read_attrs, data) = backend.fetch("Pad", &GLOBAL_GUID).unwrap();
        assert_eq!(read_attrs, attrs);
        assert_eq!(data, [0xAA, 0, 0, 0, 0, 0, 0, 0]);

        let exact = [0x55; 16];
        backend.store("Exact", &GLOBAL_GUID, attrs, &exact).unwrap();
        assert_eq!(backend.fetch("Exact", &GLOBAL_GUID).unwrap().1, exact);
    }

    pub fn missing_variable_is_not_found<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        assert!(matches!(
            backend.fetch("Missing", &GLOBAL_GUID),
            Err(Error::VariableNotFound)
        ));
    }

    pub fn erase_hides_variable<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        backend
            .store("Doomed", &GLOBAL_GUID, VariableAttributes::NON_VOLATILE, &[1])
            .unwrap();
        backend.erase("Doomed", &GLOBAL_GUID).unwrap();

        assert!(matches!(
            backend.fetch("Doomed", &GLOBAL_GUID),
            Err(Error::VariableNotFound)
        ));
        assert!(backend.enumerate().unwrap().is_empty());
    }

    pub fn erase_missing_is_not_found<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        assert!(matches!(
            backend.erase("Missing", &GLOBAL_GUID),
            Err(Error::VariableNotFound)
        ));
    }

    pub fn empty_write_deletes<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        backend
            .store("Short", &GLOBAL_GUID, VariableAttributes::NON_VOLATILE, &[1])
            .unwrap();
        backend
            .store("Short", &GLOBAL_GUID, VariableAttributes::NON_VOLATILE, &[])
            .unwrap();

        assert!(matches!(
            backend.fetch("Short", &GLOBAL_GUID),
            Err(Error::VariableNotFound)
        ));
        assert!(backend.enumerate().unwrap().is_empty());
    }

    pub fn enumerate_is_sorted<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        let other = Uuid::from_u128(1);
        for (name, guid) in [
            ("Timeout", GLOBAL_GUID),
            ("Boot0001", other),
            ("BootOrder", GLOBAL_GUID),
            ("Boot", GLOBAL_GUID),
        ] {
            backend
                .store(name, &guid, VariableAttributes::NON_VOLATILE, &[1])
                .unwrap();
        }

        let listed: Vec<String> = backend
            .enumerate()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            listed,
            [
                format!("Boot-{}", GLOBAL_GUID),
                format!("Boot0001-{}", other),
                format!("BootOrder-{}", GLOBAL_GUID),
                format!("Timeout-{}", GLOBAL_GUID),
            ]
        );
    }

    pub fn names_may_contain_hyphens<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        backend
            .store("My-Var", &GLOBAL_GUID, VariableAttributes::NON_VOLATILE, &[1])
            .unwrap();
        assert_eq!(
            backend.enumerate().unwrap(),
            [VariableDescriptor::new("My-Var", GLOBAL_GUID)]
        );
    }

    pub fn boot_entry_scenario<B: VariableBackend>(factory: fn() -> B) {
        let backend = factory();
        let guid = Uuid::new_v4();
        let attrs = VariableAttributes::NON_VOLATILE
            | VariableAttributes::BOOTSERVICE_ACCESS
            | VariableAttributes::RUNTIME_ACCESS;
        backend
            .store("Boot0001", &guid, attrs, &[0x01, 0x02, 0x03])
            .unwrap();

        assert_eq!(
            backend.enumerate().unwrap(),
            [VariableDescriptor::new("Boot0001", guid)]
        );
        let (read_attrs, data) = backend.fetch("Boot0001", &guid).unwrap();
        assert_eq!(read_attrs, attrs);
        assert_eq!(data, [0x01, 0x02, 0x03, 0, 0, 0, 0, 0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_file_refuses_write_open() {
        let fs = FakeEfivarfs::new();
        let path = fs.mount().join("Var");
        fs.insert(&path, vec![7, 0, 0, 0]);
        fs.set_flags(&path, FS_IMMUTABLE_FL);

        let err = fs.open(&path, OpenMode::Write).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
        assert!(fs.open(&path, OpenMode::Read).is_ok());
        assert_eq!(
            fs.remove_file(&path).unwrap_err().raw_os_error(),
            Some(libc::EPERM)
        );
    }

    #[test]
    fn header_only_write_leaves_tombstone() {
        let fs = FakeEfivarfs::new();
        let path = fs.mount().join("Var");
        fs.insert(&path, vec![7, 0, 0, 0, 1]);

        let mut file = fs.open(&path, OpenMode::Write).unwrap();
        file.write_all(&[7, 0, 0, 0]).unwrap();
        assert_eq!(fs.contents(&path), Some(Vec::new()));
    }

    #[test]
    fn write_denied_file_stays_readable() {
        let fs = FakeEfivarfs::new();
        let path = fs.mount().join("Var");
        fs.insert(&path, vec![7, 0, 0, 0, 1]);
        fs.deny_writes(&path);

        assert!(fs.open(&path, OpenMode::Read).is_ok());
        for mode in [OpenMode::Write, OpenMode::Create { append: false }] {
            let err = fs.open(&path, mode).unwrap_err();
            assert_eq!(err.raw_os_error(), Some(libc::EACCES));
        }
        assert_eq!(fs.write_opens(), 2);
    }

    #[test]
    fn broken_entry_fails_only_itself() {
        let fs = FakeEfivarfs::new();
        fs.insert(&fs.mount().join("A"), vec![7, 0, 0, 0, 1]);
        fs.insert(&fs.mount().join("B"), vec![7, 0, 0, 0, 1]);
        fs.break_entry(&fs.mount().join("B"));

        let entries: Vec<_> = fs.read_dir(fs.mount()).unwrap().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].as_ref().unwrap().name, "A");
        assert_eq!(
            entries[1].as_ref().unwrap_err().raw_os_error(),
            Some(libc::EIO)
        );
    }

    #[test]
    fn denied_directory_hides_children() {
        let fs = FakeEfivarfs::new();
        fs.deny_access(fs.mount());
        let err = fs
            .open(&fs.mount().join("Var"), OpenMode::Create { append: false })
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
    }
}
