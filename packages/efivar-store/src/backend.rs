//! The variable backend abstraction.

use std::sync::Arc;

use uuid::Uuid;

use crate::attributes::VariableAttributes;
use crate::descriptor::VariableDescriptor;
use crate::error::Result;

/// Access to a namespace of firmware variables.
///
/// Every call goes to the underlying storage; implementations do not cache.
/// All methods take `&self` so a backend can be shared between threads.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn VariableBackend>`.
pub trait VariableBackend: Send + Sync {
    /// Read the attributes and payload of a variable.
    ///
    /// The payload is returned exactly as stored, including any padding
    /// added when it was written.
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)>;

    /// Create or replace a variable, or append to it when `attrs` contains
    /// [`VariableAttributes::APPEND_WRITE`].
    ///
    /// May fail with [`Error::RetryNeeded`](crate::Error::RetryNeeded);
    /// callers normally go through [`with_retry`](crate::with_retry).
    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()>;

    /// Delete a variable.
    fn erase(&self, name: &str, guid: &Uuid) -> Result<()>;

    /// List every live variable, sorted by its `Name-GUID` string.
    fn enumerate(&self) -> Result<Vec<VariableDescriptor>>;
}

// Blanket implementations for references and smart pointers

impl<T: VariableBackend + ?Sized> VariableBackend for &T {
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        (**self).fetch(name, guid)
    }

    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        (**self).store(name, guid, attrs, data)
    }

    fn erase(&self, name: &str, guid: &Uuid) -> Result<()> {
        (**self).erase(name, guid)
    }

    fn enumerate(&self) -> Result<Vec<VariableDescriptor>> {
        (**self).enumerate()
    }
}

impl<T: VariableBackend + ?Sized> VariableBackend for Box<T> {
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        self.as_ref().fetch(name, guid)
    }

    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        self.as_ref().store(name, guid, attrs, data)
    }

    fn erase(&self, name: &str, guid: &Uuid) -> Result<()> {
        self.as_ref().erase(name, guid)
    }

    fn enumerate(&self) -> Result<Vec<VariableDescriptor>> {
        self.as_ref().enumerate()
    }
}

impl<T: VariableBackend + ?Sized> VariableBackend for Arc<T> {
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        self.as_ref().fetch(name, guid)
    }

    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        self.as_ref().store(name, guid, attrs, data)
    }

    fn erase(&self, name: &str, guid: &Uuid) -> Result<()> {
        self.as_ref().erase(name, guid)
    }

    fn enumerate(&self) -> Result<Vec<VariableDescriptor>> {
        self.as_ref().enumerate()
    }
}
