//! Variable attribute flags.

use std::fmt;

bitflags::bitflags! {
    /// The attribute word stored in front of every variable payload.
    ///
    /// Only the low eight bits have a defined meaning, but the full 32-bit
    /// word is carried through untouched: the backend never validates a
    /// combination for legality, it just moves the bits between the caller
    /// and the firmware. Build from raw words with
    /// [`from_bits_retain`](Self::from_bits_retain).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct VariableAttributes: u32 {
        /// Variable survives a reset.
        const NON_VOLATILE = 0x0000_0001;
        /// Variable is accessible while boot services are running.
        const BOOTSERVICE_ACCESS = 0x0000_0002;
        /// Variable is accessible after `ExitBootServices`.
        const RUNTIME_ACCESS = 0x0000_0004;
        /// Variable holds a hardware error record.
        const HARDWARE_ERROR_RECORD = 0x0000_0008;
        /// Writes must be authenticated.
        const AUTHENTICATED_WRITE_ACCESS = 0x0000_0010;
        /// Writes must carry a time-based authentication descriptor.
        const TIME_BASED_AUTHENTICATED_WRITE_ACCESS = 0x0000_0020;
        /// Data written to the variable is appended instead of replacing it.
        const APPEND_WRITE = 0x0000_0040;
        /// Variable uses the enhanced authentication format.
        const ENHANCED_AUTHENTICATED_ACCESS = 0x0000_0080;

        // Reserved bits still round-trip through the backend.
        const _ = !0;
    }
}

impl From<u32> for VariableAttributes {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<VariableAttributes> for u32 {
    fn from(attrs: VariableAttributes) -> Self {
        attrs.bits()
    }
}

impl fmt::Display for VariableAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        bitflags::parser::to_writer(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let attrs = VariableAttributes::NON_VOLATILE
            | VariableAttributes::BOOTSERVICE_ACCESS
            | VariableAttributes::RUNTIME_ACCESS;
        assert_eq!(attrs.bits(), 7);
        assert!(attrs.contains(VariableAttributes::RUNTIME_ACCESS));
        assert!(!attrs.contains(VariableAttributes::APPEND_WRITE));
    }

    #[test]
    fn unknown_bits_survive() {
        let attrs = VariableAttributes::from_bits_retain(0x1_0041);
        assert_eq!(attrs.bits(), 0x1_0041);
        assert!(attrs.contains(VariableAttributes::APPEND_WRITE));
    }

    #[test]
    fn display_names_flags() {
        let attrs = VariableAttributes::NON_VOLATILE | VariableAttributes::APPEND_WRITE;
        assert_eq!(attrs.to_string(), "NON_VOLATILE | APPEND_WRITE");
        assert_eq!(VariableAttributes::empty().to_string(), "(none)");
        assert_eq!(
            VariableAttributes::from_bits_retain(0x101).to_string(),
            "NON_VOLATILE | 0x100"
        );
    }
}
