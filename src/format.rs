//! # Format Descriptor
//!
//! The set of values that parameterize one container variant: the magic name,
//! the field delimiter, the format version string and the preferred file
//! extension. A descriptor is supplied once per operation and held immutably
//! for its duration, so sibling formats (for example a reduced reference
//! variant with a different name or delimiter) share the same engine logic.

/// Parameterizes the signature bytes and field separators of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Format name, the leading part of the magic signature.
    pub name: String,
    /// Field terminator byte. Must not appear inside textual fields.
    pub delimiter: u8,
    /// Version string appended to the name to form the magic signature.
    pub version: String,
    /// Preferred container file extension, informational only.
    pub extension: String,
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        FormatDescriptor {
            name: "ArchiveFile".to_string(),
            delimiter: 0,
            version: "001".to_string(),
            extension: ".cat".to_string(),
        }
    }
}

impl FormatDescriptor {
    /// The magic signature written at the start of every container:
    /// the format name immediately followed by the version string.
    pub fn magic(&self) -> Vec<u8> {
        let mut m = Vec::with_capacity(self.name.len() + self.version.len());
        m.extend_from_slice(self.name.as_bytes());
        m.extend_from_slice(self.version.as_bytes());
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_magic() {
        let desc = FormatDescriptor::default();
        assert_eq!(desc.magic(), b"ArchiveFile001");
        assert_eq!(desc.delimiter, 0);
        assert_eq!(desc.extension, ".cat");
    }
}
