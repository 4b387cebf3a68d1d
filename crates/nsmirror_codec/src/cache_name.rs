//! Content-addressed cache entry names.
//!
//! ```text
//! local file:   {name}#{checksum}
//! remote node:  {name}#{checksum}#{sequence}
//! ```
//!
//! `name` may itself contain `#`; fields are split from the right.

use crate::error::{CodecError, CodecResult};

/// Separator between cache name fields.
pub const CACHE_SEPARATOR: char = '#';

/// A local cache file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalCacheName {
    /// Logical name.
    pub name: String,
    /// Hex content checksum.
    pub checksum: String,
}

impl LocalCacheName {
    /// Creates a local name.
    pub fn new(name: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
        }
    }

    /// Parses `{name}#{checksum}`.
    pub fn parse(file_name: &str) -> CodecResult<Self> {
        let (name, checksum) = file_name
            .rsplit_once(CACHE_SEPARATOR)
            .ok_or_else(|| CodecError::malformed_name(file_name, "missing checksum"))?;
        if name.is_empty() || checksum.is_empty() {
            return Err(CodecError::malformed_name(file_name, "empty field"));
        }
        Ok(Self::new(name, checksum))
    }

    /// Formats the file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}{CACHE_SEPARATOR}{}", self.name, self.checksum)
    }
}

/// A remote cache node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteCacheName {
    /// Logical name.
    pub name: String,
    /// Hex content checksum.
    pub checksum: String,
    /// Store-assigned sequence.
    pub sequence: u64,
}

impl RemoteCacheName {
    /// Parses `{name}#{checksum}#{sequence}`.
    pub fn parse(node_name: &str) -> CodecResult<Self> {
        let mut fields = node_name.rsplitn(3, CACHE_SEPARATOR);
        let (Some(sequence), Some(checksum), Some(name)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(CodecError::malformed_name(node_name, "expected name#checksum#sequence"));
        };
        if name.is_empty() || checksum.is_empty() {
            return Err(CodecError::malformed_name(node_name, "empty field"));
        }
        let sequence = sequence
            .parse()
            .map_err(|_| CodecError::malformed_name(node_name, "sequence is not a number"))?;
        Ok(Self {
            name: name.to_string(),
            checksum: checksum.to_string(),
            sequence,
        })
    }

    /// Prefix passed to a sequential create; the store appends the sequence.
    #[must_use]
    pub fn create_prefix(name: &str, checksum: &str) -> String {
        format!("{name}{CACHE_SEPARATOR}{checksum}{CACHE_SEPARATOR}")
    }

    /// The local file name this remote version materializes as.
    #[must_use]
    pub fn local(&self) -> LocalCacheName {
        LocalCacheName::new(self.name.clone(), self.checksum.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_name_parses_from_the_right() {
        let remote = RemoteCacheName::parse("proid.app#0001#deadbeef#0000000007").unwrap();
        assert_eq!(remote.name, "proid.app#0001");
        assert_eq!(remote.checksum, "deadbeef");
        assert_eq!(remote.sequence, 7);
        assert_eq!(remote.local().file_name(), "proid.app#0001#deadbeef");
    }

    #[test]
    fn remote_name_rejects_bad_sequence() {
        assert!(RemoteCacheName::parse("app#abc#xyz").is_err());
        assert!(RemoteCacheName::parse("app#abc").is_err());
    }

    #[test]
    fn local_name_round_trip() {
        let local = LocalCacheName::parse("cfg#0a1b").unwrap();
        assert_eq!(local, LocalCacheName::new("cfg", "0a1b"));
        assert_eq!(local.file_name(), "cfg#0a1b");
        assert!(LocalCacheName::parse("nohash").is_err());
    }

    #[test]
    fn create_prefix_ends_with_separator() {
        assert_eq!(RemoteCacheName::create_prefix("cfg", "ab"), "cfg#ab#");
    }
}
