//! The narrow slice of the operating system the backend relies on.
//!
//! [`VarFs`](crate::VarFs) only ever talks to a [`Platform`], so tests can
//! substitute a fake efivarfs without root privileges or a firmware.

use std::ffi::{CString, OsString};
use std::fs::{self, File, OpenOptions, ReadDir};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// The filesystem type reported by `statfs(2)` for efivarfs.
pub const EFIVARFS_MAGIC: u32 = 0xde5e_81e4;

/// `FS_IMMUTABLE_FL` from `linux/fs.h`.
pub const FS_IMMUTABLE_FL: u32 = 0x0000_0010;


/// How a variable file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only. Also used to get at the inode flags of a file that must
    /// not be opened for writing.
    Read,
    /// Write only, the file must already exist.
    Write,
    /// Write only, creating the file if needed. With `append` the payload
    /// is appended to the existing variable data.
    Create { append: bool },
}

/// An open variable file.
pub trait VarFile: Read + Write + Send {
    /// Read the inode flags (`FS_IOC_GETFLAGS`).
    fn inode_flags(&self) -> io::Result<u32>;

    /// Replace the inode flags (`FS_IOC_SETFLAGS`).
    fn set_inode_flags(&mut self, flags: u32) -> io::Result<()>;
}

/// What the backend needs to know about a directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub is_file: bool,
    pub len: u64,
}

pub trait Platform: Send + Sync {
    type File: VarFile;
    type ReadDir: Iterator<Item = io::Result<DirEntryInfo>>;

    /// The filesystem type magic of the filesystem holding `path`.
    fn fs_magic(&self, path: &Path) -> io::Result<u32>;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Self::File>;

    /// Entries of the directory at `path`. Opening the directory fails
    /// with the outer error, a broken entry with an item error.
    fn read_dir(&self, path: &Path) -> io::Result<Self::ReadDir>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// The real thing: `std::fs` plus a couple of Linux ioctls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsPlatform;

/// A [`File`] with inode flag access.
#[derive(Debug)]
pub struct OsFile {
    file: File,
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for OsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl VarFile for OsFile {
    fn inode_flags(&self) -> io::Result<u32> {
        let mut flags: libc::c_int = 0;
        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the call, and the kernel writes one int through the pointer.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                libc::FS_IOC_GETFLAGS as _,
                &mut flags as *mut libc::c_int,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(flags as u32)
    }

    fn set_inode_flags(&mut self, flags: u32) -> io::Result<()> {
        let flags = flags as libc::c_int;
        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the call, and the kernel only reads one int through the pointer.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                libc::FS_IOC_SETFLAGS as _,
                &flags as *const libc::c_int,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Directory iterator of [`OsPlatform`].
#[derive(Debug)]
pub struct OsReadDir {
    inner: ReadDir,
}

impl Iterator for OsReadDir {
    type Item = io::Result<DirEntryInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            match entry.metadata() {
                Ok(metadata) => {
                    return Some(Ok(DirEntryInfo {
                        name: entry.file_name(),
                        is_file: metadata.is_file(),
                        len: metadata.len(),
                    }))
                }
                // Deleted between readdir and lstat.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl Platform for OsPlatform {
    type File = OsFile;
    type ReadDir = OsReadDir;

    fn fs_magic(&self, path: &Path) -> io::Result<u32> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: `statfs` is plain old data, all zeroes is a valid value.
        let mut stat: libc::statfs = unsafe { std::mem::zeroed() };
        // SAFETY: `c_path` is NUL-terminated and outlives the call, `stat`
        // is a valid out pointer.
        let ret = unsafe { libc::statfs(c_path.as_ptr(), &mut stat) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        // f_type is signed on some targets; the magic only occupies 32 bits.
        Ok(stat.f_type as u32)
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<OsFile> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::Write => {
                options.write(true);
            }
            OpenMode::Create { append } => {
                options.write(true).create(true).append(append);
            }
        }
        Ok(OsFile {
            file: options.open(path)?,
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<OsReadDir> {
        Ok(OsReadDir {
            inner: fs::read_dir(path)?,
        })
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
