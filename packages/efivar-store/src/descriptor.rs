//! Variable identity: a name plus a vendor GUID.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Length of a GUID in its canonical hyphenated form.
pub const GUID_LENGTH: usize = 36;

/// Identifies a single variable.
///
/// Names are case sensitive and may themselves contain `-`; the GUID is
/// always the trailing [`GUID_LENGTH`] characters of the combined form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub guid: Uuid,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, guid: Uuid) -> Self {
        Self {
            name: name.into(),
            guid,
        }
    }

    /// The `Name-GUID` form, which is also the efivarfs file name.
    pub fn file_name(&self) -> String {
        file_name(&self.name, &self.guid)
    }

    /// Split a `Name-GUID` string without parsing the GUID.
    ///
    /// Returns `None` when the string is too short to hold a separator and
    /// a GUID, or when the character before the GUID is not `-`.
    pub fn split(identifier: &str) -> Option<(&str, &str)> {
        if identifier.len() < GUID_LENGTH + 1 {
            return None;
        }
        let separator = identifier.len() - GUID_LENGTH - 1;
        if identifier.as_bytes()[separator] != b'-' {
            return None;
        }
        // The separator is ASCII, so both halves are on char boundaries.
        Some((&identifier[..separator], &identifier[separator + 1..]))
    }
}

pub(crate) fn file_name(name: &str, guid: &Uuid) -> String {
    format!("{}-{}", name, guid.hyphenated())
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.guid.hyphenated())
    }
}

impl FromStr for VariableDescriptor {
    type Err = Error;

    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        let (name, guid) =
            VariableDescriptor::split(identifier).ok_or_else(|| Error::InvalidIdentifier {
                identifier: identifier.to_string(),
                message: "expected Name-GUID".to_string(),
            })?;
        let guid = Uuid::parse_str(guid).map_err(|e| Error::InvalidIdentifier {
            identifier: identifier.to_string(),
            message: e.to_string(),
        })?;
        Ok(VariableDescriptor::new(name, guid))
    }
}

impl Ord for VariableDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        // Listing order is defined on the combined string, which is not
        // the same as comparing (name, guid) when one name prefixes another.
        self.file_name().cmp(&other.file_name())
    }
}

impl PartialOrd for VariableDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
