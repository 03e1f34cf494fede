//! Interned string identifier.
//!
//! Function names, parameter declarations, classes and protocols are all
//! referred to by a compact 32-bit [`Name`] handed out by an [`Interner`].

use std::fmt;

use rustc_hash::FxHashMap;

/// Interned string identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// String interner.
///
/// Interning the same string twice yields the same [`Name`]. The empty
/// string is always [`Name::EMPTY`].
#[derive(Clone, Debug)]
pub struct Interner {
    map: FxHashMap<String, Name>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        let mut interner = Interner {
            map: FxHashMap::default(),
            strings: Vec::new(),
        };
        let empty = interner.intern("");
        debug_assert_eq!(empty, Name::EMPTY);
        interner
    }

    /// Intern a string, returning its existing name if already present.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(&name) = self.map.get(s) {
            return name;
        }
        let raw = u32::try_from(self.strings.len())
            .unwrap_or_else(|_| panic!("interned name count exceeds u32::MAX"));
        let name = Name(raw);
        self.strings.push(s.to_owned());
        self.map.insert(s.to_owned(), name);
        name
    }

    /// Look up a string without interning it.
    pub fn lookup(&self, s: &str) -> Option<Name> {
        self.map.get(s).copied()
    }

    /// Resolve a name back to its string.
    ///
    /// # Panics
    ///
    /// Panics if `name` was not produced by this interner.
    pub fn resolve(&self, name: Name) -> &str {
        match self.strings.get(name.0 as usize) {
            Some(s) => s,
            None => panic!("name {} was not interned by this interner", name.0),
        }
    }

    /// Number of interned strings (including the empty string).
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Always `false`: the empty string is pre-interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
