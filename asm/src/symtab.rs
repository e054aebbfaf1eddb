use std::collections::hash_map::Iter;

use fxhash::FxHashMap;

/// Start addresses of every subroutine, filled in once per name before any
/// bytes are emitted.
pub struct Symtab {
    inner: FxHashMap<String, u16>,
}

impl Symtab {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn insert(&mut self, key: String, address: u16) -> Option<u16> {
        self.inner.insert(key, address)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<u16> {
        self.inner.get(key).copied()
    }

    /// The address as it is written into the image.
    #[inline]
    pub fn bytes(&self, key: &str) -> Option<[u8; 2]> {
        self.get(key).map(u16::to_be_bytes)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<'a> IntoIterator for &'a Symtab {
    type IntoIter = SymtabIter<'a>;
    type Item = (&'a String, &'a u16);

    fn into_iter(self) -> Self::IntoIter {
        SymtabIter {
            inner: self.inner.iter(),
        }
    }
}

pub struct SymtabIter<'a> {
    inner: Iter<'a, String, u16>,
}

impl<'a> Iterator for SymtabIter<'a> {
    type Item = (&'a String, &'a u16);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
