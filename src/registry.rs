//! The uniquing directory that backs every descriptor kind.
//!
//! Mirrors the `Pool`/`PoolKey` pattern from an image-buffer pool: a
//! [`slotmap::SlotMap`] gives each entry a stable, dense key, and a small
//! newtype around that key keeps the different descriptor kinds from being
//! confused with one another at the type level.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::collections::HashMap;

use slotmap::{DefaultKey, Key, KeyData, SlotMap};

use crate::error::Error;

/// A uniqued handle into one of a [`crate::Context`]'s descriptor tables.
///
/// Identity is by key, not by attributes: two `Ref<K>` compare equal iff
/// they name the same table slot, matching the "equality is identity"
/// invariant of the data model.
pub struct Ref<K> {
    key: DefaultKey,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Ref<K> {
    pub(crate) fn new(key: DefaultKey) -> Self {
        Ref {
            key,
            _kind: PhantomData,
        }
    }

    pub(crate) fn key(self) -> DefaultKey {
        self.key
    }

    /// A dense, process-local integer id for this handle, suitable for use
    /// as an index into adjacency tables.
    pub fn id(self) -> u64 {
        self.key.data().as_ffi()
    }

    /// Reconstruct a handle from the dense integer id returned by
    /// [`Ref::id`]. Does not itself validate that the id still names a live
    /// slot in any particular table — pair with a table lookup for that.
    pub fn from_id(id: u64) -> Self {
        Ref::new(KeyData::from_ffi(id).into())
    }
}

impl<K> Clone for Ref<K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K> Copy for Ref<K> {}
impl<K> PartialEq for Ref<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<K> Eq for Ref<K> {}
impl<K> Hash for Ref<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}
impl<K> fmt::Debug for Ref<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:?})", KeyData::from(self.key).as_ffi())
    }
}

/// Anything that can be uniqued by name: a candidate descriptor declares its
/// own name and how to compare itself against the previously-registered
/// descriptor of that name.
pub(crate) trait Named: PartialEq + Clone {
    fn name(&self) -> &str;
}

/// A name-uniqued table of descriptors of one kind.
pub(crate) struct NamedTable<K, D> {
    slots: SlotMap<DefaultKey, D>,
    by_name: HashMap<String, DefaultKey>,
    kind_name: &'static str,
    _kind: PhantomData<fn() -> K>,
}

impl<K, D: Named> NamedTable<K, D> {
    pub(crate) fn new(kind_name: &'static str) -> Self {
        NamedTable {
            slots: SlotMap::new(),
            by_name: HashMap::new(),
            kind_name,
            _kind: PhantomData,
        }
    }

    /// Register `desc`, returning the existing handle if a descriptor with
    /// the same name and identical attributes already exists.
    pub(crate) fn register(&mut self, desc: D) -> Result<Ref<K>, Error> {
        if let Some(&key) = self.by_name.get(desc.name()) {
            if self.slots[key] == desc {
                return Ok(Ref::new(key));
            }
            return Err(Error::DuplicateMismatch {
                kind: self.kind_name,
                name: desc.name().to_string(),
            });
        }
        let name = desc.name().to_string();
        let key = self.slots.insert(desc);
        self.by_name.insert(name, key);
        Ok(Ref::new(key))
    }

    pub(crate) fn by_name(&self, name: &str) -> Result<Ref<K>, Error> {
        self.by_name
            .get(name)
            .map(|&key| Ref::new(key))
            .ok_or_else(|| Error::NotFound {
                kind: self.kind_name,
                name: name.to_string(),
            })
    }

    pub(crate) fn by_id(&self, r: Ref<K>) -> Result<&D, Error> {
        self.slots.get(r.key()).ok_or_else(|| Error::NotFound {
            kind: self.kind_name,
            name: format!("#{}", r.id()),
        })
    }

    /// Look up by the dense integer id returned from [`Ref::id`].
    pub(crate) fn by_raw_id(&self, id: u64) -> Result<Ref<K>, Error> {
        let r = Ref::new(KeyData::from_ffi(id).into());
        if self.slots.contains_key(r.key()) {
            Ok(r)
        } else {
            Err(Error::NotFound {
                kind: self.kind_name,
                name: format!("#{id}"),
            })
        }
    }

    pub(crate) fn get(&self, r: Ref<K>) -> Option<&D> {
        self.slots.get(r.key())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Ref<K>, &D)> {
        self.slots.iter().map(|(key, d)| (Ref::new(key), d))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Dummy {
        name: String,
        attr: u32,
    }
    impl Named for Dummy {
        fn name(&self) -> &str {
            &self.name
        }
    }
    enum DummyKind {}

    #[test]
    fn register_is_idempotent_on_matching_attributes() {
        let mut table: NamedTable<DummyKind, Dummy> = NamedTable::new("dummy");
        let a = table
            .register(Dummy {
                name: "x".into(),
                attr: 1,
            })
            .unwrap();
        let b = table
            .register(Dummy {
                name: "x".into(),
                attr: 1,
            })
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn register_conflict_is_duplicate_mismatch() {
        let mut table: NamedTable<DummyKind, Dummy> = NamedTable::new("dummy");
        table
            .register(Dummy {
                name: "x".into(),
                attr: 1,
            })
            .unwrap();
        let err = table
            .register(Dummy {
                name: "x".into(),
                attr: 2,
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMismatch { .. }));
    }
}
