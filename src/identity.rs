//! Bidirectional mapping between the three window identity schemes.
//!
//! Records are keyed by [`ObjectRef`]; handles and legacy ids are secondary
//! indexes that always point at a live record.

use std::collections::{HashMap, hash_map::Entry};

use crate::{
    BridgeError, Result,
    window::{LegacyId, ObjectRef, WindowHandle, WindowRecord},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyBinding {
    Bound,
    AlreadyBound,
    UnknownRecord,
}

#[derive(Debug, Default)]
pub struct IdentityMap {
    records: HashMap<ObjectRef, WindowRecord>,
    by_handle: HashMap<WindowHandle, ObjectRef>,
    by_legacy: HashMap<LegacyId, ObjectRef>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.records.contains_key(object)
    }

    pub fn resolve(&self, object: &ObjectRef) -> Option<&WindowRecord> {
        self.records.get(object)
    }

    pub fn resolve_mut(&mut self, object: &ObjectRef) -> Option<&mut WindowRecord> {
        self.records.get_mut(object)
    }

    pub fn resolve_legacy(&self, legacy: LegacyId) -> Option<&WindowRecord> {
        self.by_legacy
            .get(&legacy)
            .and_then(|object| self.records.get(object))
    }

    pub fn resolve_handle(&self, handle: WindowHandle) -> Option<&WindowRecord> {
        self.by_handle
            .get(&handle)
            .and_then(|object| self.records.get(object))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowRecord> {
        self.records.values()
    }

    /// Binds `handle` to `object`. Rebinding the same pair is a no-op.
    pub fn bind(&mut self, object: &ObjectRef, handle: WindowHandle) -> Result<()> {
        match self.by_handle.entry(handle) {
            Entry::Occupied(entry) if entry.get() != object => Err(BridgeError::DuplicateHandle {
                handle,
                existing: entry.get().clone(),
                requested: object.clone(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(object.clone());
                Ok(())
            }
        }
    }

    /// Inserts a freshly created record after binding its handle. Nothing is
    /// inserted when the window is already recorded or the handle is already
    /// owned by another window.
    pub fn insert(&mut self, record: WindowRecord) -> Result<&mut WindowRecord> {
        let object = record.object().clone();
        if self.records.contains_key(&object) {
            return Err(BridgeError::DuplicateObject { object });
        }
        self.bind(&object, record.handle())?;

        Ok(self.records.entry(object).or_insert(record))
    }

    pub fn bind_legacy(&mut self, object: &ObjectRef, legacy: LegacyId) -> Result<LegacyBinding> {
        let Some(record) = self.records.get_mut(object) else {
            return Ok(LegacyBinding::UnknownRecord);
        };

        if let Some(owner) = self.by_legacy.get(&legacy)
            && owner != object
        {
            return Err(BridgeError::IdentityConflict {
                legacy,
                owner: owner.clone(),
                requested: object.clone(),
            });
        }

        match record.legacy() {
            Some(current) if current == legacy => Ok(LegacyBinding::AlreadyBound),
            Some(current) => Err(BridgeError::IdentityConflict {
                legacy: current,
                owner: object.clone(),
                requested: object.clone(),
            }),
            None => {
                record.set_legacy(legacy);
                self.by_legacy.insert(legacy, object.clone());
                Ok(LegacyBinding::Bound)
            }
        }
    }

    /// Removes the record and every index pointing at it. Absent objects are
    /// not an error.
    pub fn remove(&mut self, object: &ObjectRef) -> Option<WindowRecord> {
        let record = self.records.remove(object)?;

        if self.by_handle.get(&record.handle()) == Some(object) {
            self.by_handle.remove(&record.handle());
        }
        if let Some(legacy) = record.legacy()
            && self.by_legacy.get(&legacy) == Some(object)
        {
            self.by_legacy.remove(&legacy);
        }

        Some(record)
    }

    pub fn drain(&mut self) -> Vec<WindowRecord> {
        self.by_handle.clear();
        self.by_legacy.clear();
        self.records.drain().map(|(_, record)| record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u32) -> WindowHandle {
        WindowHandle::new(raw).unwrap()
    }

    fn legacy(raw: u32) -> LegacyId {
        LegacyId::new(raw).unwrap()
    }

    fn map_with(objects: &[(&str, u32)]) -> IdentityMap {
        let mut map = IdentityMap::new();
        for (path, raw) in objects {
            map.insert(WindowRecord::new(ObjectRef::from(*path), handle(*raw)))
                .unwrap();
        }
        map
    }

    #[test]
    fn test_resolve_by_every_scheme() {
        let mut map = map_with(&[("/w/1", 11)]);
        let object = ObjectRef::from("/w/1");
        assert_eq!(
            map.bind_legacy(&object, legacy(0x400001)).unwrap(),
            LegacyBinding::Bound
        );

        assert_eq!(map.resolve(&object).unwrap().handle(), handle(11));
        assert_eq!(map.resolve_handle(handle(11)).unwrap().object(), &object);
        assert_eq!(map.resolve_legacy(legacy(0x400001)).unwrap().object(), &object);
    }

    #[test]
    fn test_duplicate_handle_is_rejected() {
        let mut map = map_with(&[("/w/1", 11)]);

        let err = map
            .insert(WindowRecord::new(ObjectRef::from("/w/2"), handle(11)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateHandle { .. }));
        assert_eq!(map.len(), 1);
        assert!(!map.contains(&ObjectRef::from("/w/2")));
    }

    #[test]
    fn test_existing_record_is_never_replaced() {
        let mut map = map_with(&[("/w/1", 11)]);
        let object = ObjectRef::from("/w/1");
        map.bind_legacy(&object, legacy(5)).unwrap();

        let err = map
            .insert(WindowRecord::new(object.clone(), handle(12)))
            .unwrap_err();
        assert_eq!(err, BridgeError::DuplicateObject { object: object.clone() });
        assert!(err.is_invariant_violation());

        assert_eq!(map.len(), 1);
        assert_eq!(map.resolve(&object).unwrap().handle(), handle(11));
        assert_eq!(map.resolve_handle(handle(11)).unwrap().object(), &object);
        assert!(map.resolve_handle(handle(12)).is_none());
        assert_eq!(map.resolve_legacy(legacy(5)).unwrap().object(), &object);
    }

    #[test]
    fn test_rebinding_same_handle_is_idempotent() {
        let mut map = map_with(&[("/w/1", 11)]);
        map.bind(&ObjectRef::from("/w/1"), handle(11)).unwrap();
    }

    #[test]
    fn test_bind_legacy_rules() {
        let mut map = map_with(&[("/w/1", 11), ("/w/2", 12)]);
        let first = ObjectRef::from("/w/1");
        let second = ObjectRef::from("/w/2");

        map.bind_legacy(&first, legacy(5)).unwrap();
        assert_eq!(
            map.bind_legacy(&first, legacy(5)).unwrap(),
            LegacyBinding::AlreadyBound
        );

        let err = map.bind_legacy(&second, legacy(5)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::IdentityConflict {
                legacy: legacy(5),
                owner: first.clone(),
                requested: second.clone(),
            }
        );

        // Once resolved, a legacy id never changes.
        assert!(map.bind_legacy(&first, legacy(6)).is_err());
        assert_eq!(map.resolve(&first).unwrap().legacy(), Some(legacy(5)));

        assert_eq!(
            map.bind_legacy(&ObjectRef::from("/w/9"), legacy(9)).unwrap(),
            LegacyBinding::UnknownRecord
        );
    }

    #[test]
    fn test_remove_purges_indexes() {
        let mut map = map_with(&[("/w/1", 11)]);
        let object = ObjectRef::from("/w/1");
        map.bind_legacy(&object, legacy(5)).unwrap();

        assert!(map.remove(&object).is_some());
        assert!(map.remove(&object).is_none());
        assert!(map.resolve_handle(handle(11)).is_none());
        assert!(map.resolve_legacy(legacy(5)).is_none());

        // Freed ids can be reused by a new window.
        map.insert(WindowRecord::new(ObjectRef::from("/w/2"), handle(11)))
            .unwrap();
        map.bind_legacy(&ObjectRef::from("/w/2"), legacy(5)).unwrap();
    }
}
