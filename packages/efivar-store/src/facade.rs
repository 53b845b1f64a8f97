//! Convenience entry points over a [`VariableBackend`].

use std::path::PathBuf;

use uuid::Uuid;

use crate::attributes::VariableAttributes;
use crate::backend::VariableBackend;
use crate::descriptor::VariableDescriptor;
use crate::error::{Error, Result};
use crate::retry::{with_retry, DEFAULT_RETRIES};
use crate::varfs::VarFs;

/// Front door for reading and writing variables.
///
/// Mutations are retried while they fail with
/// [`Error::RetryNeeded`]. The `simple_*` methods take the combined
/// `Name-GUID` identifier instead of separate parts.
///
/// # Example
///
/// ```rust
/// use efivar_store::{Efivars, InMemoryBackend, VariableAttributes};
///
/// let vars = Efivars::new(InMemoryBackend::new());
/// let id = "Boot0001-8be4df61-93ca-11d2-aa0d-00e098032b8c";
///
/// vars.simple_write(id, VariableAttributes::NON_VOLATILE, b"hello").unwrap();
/// assert_eq!(vars.simple_list().unwrap(), [id]);
/// ```
#[derive(Debug, Clone)]
pub struct Efivars<B> {
    backend: B,
    retries: usize,
}

impl Efivars<VarFs> {
    /// Open the efivarfs mounted at `mount`, failing early if it is not
    /// mounted there.
    pub fn probe(mount: impl Into<PathBuf>) -> Result<Self> {
        let varfs = VarFs::new(mount);
        if !varfs.is_mounted() {
            return Err(Error::NotMounted {
                path: varfs.mount().to_path_buf(),
            });
        }
        Ok(Self::new(varfs))
    }
}

impl<B: VariableBackend> Efivars<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Set how many extra attempts a racing write gets.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn read(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        self.backend.fetch(name, guid)
    }

    pub fn write(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        with_retry(self.retries, || self.backend.store(name, guid, attrs, data))
    }

    pub fn remove(&self, name: &str, guid: &Uuid) -> Result<()> {
        with_retry(self.retries, || self.backend.erase(name, guid))
    }

    pub fn list(&self) -> Result<Vec<VariableDescriptor>> {
        self.backend.enumerate()
    }

    /// [`read`](Self::read) taking a `Name-GUID` identifier.
    pub fn simple_read(&self, identifier: &str) -> Result<(VariableAttributes, Vec<u8>)> {
        let descriptor: VariableDescriptor = identifier.parse()?;
        self.read(&descriptor.name, &descriptor.guid)
    }

    /// [`write`](Self::write) taking a `Name-GUID` identifier.
    pub fn simple_write(
        &self,
        identifier: &str,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        let descriptor: VariableDescriptor = identifier.parse()?;
        self.write(&descriptor.name, &descriptor.guid, attrs, data)
    }

    /// [`remove`](Self::remove) taking a `Name-GUID` identifier.
    pub fn simple_remove(&self, identifier: &str) -> Result<()> {
        let descriptor: VariableDescriptor = identifier.parse()?;
        self.remove(&descriptor.name, &descriptor.guid)
    }

    /// [`list`](Self::list) as `Name-GUID` strings.
    pub fn simple_list(&self) -> Result<Vec<String>> {
        Ok(self.list()?.iter().map(ToString::to_string).collect())
    }
}
