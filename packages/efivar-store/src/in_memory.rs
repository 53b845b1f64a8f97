//! A backend that keeps variables in process memory.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::attributes::VariableAttributes;
use crate::backend::VariableBackend;
use crate::codec;
use crate::descriptor::VariableDescriptor;
use crate::error::{Error, Result};

/// Variables held in a map instead of on efivarfs.
///
/// Payloads go through the same encoding as on disk, so padding behaves
/// exactly like the real backend.
///
/// # Example
///
/// ```rust
/// use efivar_store::{InMemoryBackend, VariableAttributes, VariableBackend};
/// use uuid::Uuid;
///
/// let vars = InMemoryBackend::new();
/// let guid = Uuid::new_v4();
/// vars.store("Timeout", &guid, VariableAttributes::NON_VOLATILE, &[5, 0]).unwrap();
///
/// let (_, data) = vars.fetch("Timeout", &guid).unwrap();
/// assert_eq!(data, [5, 0, 0, 0, 0, 0, 0, 0]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    variables: Mutex<BTreeMap<VariableDescriptor, (VariableAttributes, Vec<u8>)>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn variables(
        &self,
    ) -> MutexGuard<'_, BTreeMap<VariableDescriptor, (VariableAttributes, Vec<u8>)>> {
        // The map is never left half-updated, so a poisoned lock is still
        // usable.
        self.variables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VariableBackend for InMemoryBackend {
    fn fetch(&self, name: &str, guid: &Uuid) -> Result<(VariableAttributes, Vec<u8>)> {
        self.variables()
            .get(&VariableDescriptor::new(name, *guid))
            .cloned()
            .ok_or(Error::VariableNotFound)
    }

    fn store(
        &self,
        name: &str,
        guid: &Uuid,
        attrs: VariableAttributes,
        data: &[u8],
    ) -> Result<()> {
        let record = codec::encode(attrs, data);
        let (attrs, payload) = codec::decode(&record)?;

        let mut variables = self.variables();
        let key = VariableDescriptor::new(name, *guid);
        if attrs.contains(VariableAttributes::APPEND_WRITE) {
            if let Some((_, existing)) = variables.get_mut(&key) {
                existing.extend_from_slice(payload);
                return Ok(());
            }
        }
        if payload.is_empty() {
            // Writing nothing deletes the variable.
            variables.remove(&key);
        } else {
            variables.insert(key, (attrs, payload.to_vec()));
        }
        Ok(())
    }

    fn erase(&self, name: &str, guid: &Uuid) -> Result<()> {
        self.variables()
            .remove(&VariableDescriptor::new(name, *guid))
            .map(|_| ())
            .ok_or(Error::VariableNotFound)
    }

    fn enumerate(&self) -> Result<Vec<VariableDescriptor>> {
        Ok(self.variables().keys().cloned().collect())
    }
}
