//! Names.

use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;

type NameInner = SmallVec<[u8; 23]>;

/// A PDF name object.
///
/// Names are case-sensitive byte sequences with value equality. `#hh` escapes
/// are already decoded by the lexer; the stored bytes never contain a zero
/// byte. The hash is computed once at construction and reused on every
/// map lookup.
#[derive(Clone)]
pub struct Name {
    bytes: NameInner,
    hash: u64,
}

impl Name {
    /// Create a new name from a sequence of (already unescaped) bytes.
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(!bytes.contains(&0));

        let mut hasher = FxHasher::default();
        hasher.write(bytes);

        Self {
            bytes: SmallVec::from_slice(bytes),
            hash: hasher.finish(),
        }
    }

    /// The raw bytes of the name, without the leading solidus.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Return a string representation of the name.
    ///
    /// Returns a placeholder in case the name is not UTF-8 encoded.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("{non-utf8 name}")
    }
}

impl Deref for Name {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl AsRef<[u8]> for Name {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for Name {}

impl PartialEq<[u8]> for Name {
    fn eq(&self, other: &[u8]) -> bool {
        self.bytes.as_slice() == other
    }
}

impl PartialEq<&[u8]> for Name {
    fn eq(&self, other: &&[u8]) -> bool {
        self.bytes.as_slice() == *other
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => write!(f, "/{s}"),
            Err(_) => <[u8] as Debug>::fmt(&self.bytes, f),
        }
    }
}
