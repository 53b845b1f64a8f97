//! efivar-store: UEFI variables through efivarfs
//!
//! Linux exposes firmware variables as files under an efivarfs mount, one
//! file per variable, named `Name-GUID`. Each file holds a little-endian
//! attribute word followed by the variable payload.
//!
//! This crate wraps that convention:
//! - `VarFs`: the efivarfs backend (mount probe, record codec, immutable
//!   inode flag handling)
//! - `VariableBackend`: the trait every backend implements
//! - `InMemoryBackend`: a map-backed backend for tests and tooling
//! - `Efivars`: convenience entry points with retries on racing writers
//!
//! # Example
//!
//! ```rust,no_run
//! use efivar_store::{Efivars, VariableAttributes, DEFAULT_MOUNT};
//!
//! let vars = Efivars::probe(DEFAULT_MOUNT)?;
//! let (attrs, data) = vars.simple_read("BootOrder-8be4df61-93ca-11d2-aa0d-00e098032b8c")?;
//! assert!(attrs.contains(VariableAttributes::NON_VOLATILE));
//! # let _ = data;
//! # Ok::<(), efivar_store::Error>(())
//! ```
//!
//! Only Linux provides efivarfs; the production [`OsPlatform`] relies on
//! `statfs(2)` and the `FS_IOC_GETFLAGS`/`FS_IOC_SETFLAGS` ioctls.

pub use uuid::Uuid;

mod attributes;
mod backend;
pub mod codec;
mod descriptor;
mod error;
mod facade;
mod in_memory;
pub mod inode;
pub mod platform;
pub mod probe;
mod retry;
mod varfs;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use attributes::VariableAttributes;
pub use backend::VariableBackend;
pub use descriptor::{VariableDescriptor, GUID_LENGTH};
pub use error::{Error, ErrorKind, Result};
pub use facade::Efivars;
pub use in_memory::InMemoryBackend;
pub use platform::{OsPlatform, Platform, VarFile};
pub use retry::{with_retry, DEFAULT_RETRIES};
pub use varfs::{VarFs, DEFAULT_MOUNT};
