//! In-memory item index.
//!
//! Maps identity keys to records and maintains the parent→child
//! back-references. Child keys are derived state: a record appears in its
//! parent's child list whenever both are present in the index.

use std::collections::{BTreeSet, HashMap};

use itemsync_core::{ItemKey, Record};

use crate::error::{Result, StoreError};

/// The item index.
///
/// Lookups are O(1). Filtering is a linear scan, which is acceptable because
/// an index holds a single library's working set.
#[derive(Debug, Default, Clone)]
pub struct ItemIndex {
    items: HashMap<ItemKey, Record>,
    /// Children whose parent is not in the index yet, keyed by parent.
    orphans: HashMap<ItemKey, BTreeSet<ItemKey>>,
}

impl ItemIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a record with this key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Look up a record. `None` means not found.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.items.get(key)
    }

    /// Look up several records, one slot per key, in input order.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<&Record>> {
        keys.iter().map(|k| self.items.get(k.as_ref())).collect()
    }

    /// Iterate over all records in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.items.values()
    }

    /// All keys, sorted.
    pub fn sorted_keys(&self) -> Vec<&ItemKey> {
        let mut keys: Vec<&ItemKey> = self.items.keys().collect();
        keys.sort();
        keys
    }

    /// Records whose parent is `key`, in child-key order.
    pub fn children_of(&self, key: &str) -> Vec<&Record> {
        self.items
            .get(key)
            .map(|parent| {
                parent
                    .child_keys()
                    .iter()
                    .filter_map(|k| self.items.get(k))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys from `keys` that have no local copy.
    pub fn keys_not_present<'a>(&self, keys: &'a [ItemKey]) -> Vec<&'a ItemKey> {
        keys.iter().filter(|k| !self.items.contains_key(*k)).collect()
    }

    /// All records satisfying `predicate`.
    pub fn find_matching<F>(&self, predicate: F) -> Vec<&Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.items.values().filter(|r| predicate(r)).collect()
    }

    /// Insert a record, replacing any existing entry with the same key.
    ///
    /// The replaced entry's child keys carry over. If the record's parent is
    /// present, the record is added to the parent's child keys (at most
    /// once). A record whose parent changed is detached from the old parent.
    ///
    /// Returns the replaced record, if any.
    pub fn insert_or_replace(&mut self, mut record: Record) -> Result<Option<Record>> {
        let key = record.key().cloned().ok_or(StoreError::MissingKey)?;

        let previous = self.items.remove(&key);
        match &previous {
            Some(old) => {
                for child in old.child_keys() {
                    record.add_child_key(child.clone());
                }
                if old.parent_key() != record.parent_key() {
                    self.detach_from_parent(&key, old.parent_key());
                }
            }
            None => {
                if let Some(waiting) = self.orphans.remove(&key) {
                    for child in waiting {
                        let adopts = self
                            .items
                            .get(&child)
                            .is_some_and(|c| c.parent_key() == Some(&key));
                        if adopts {
                            record.add_child_key(child);
                        }
                    }
                }
            }
        }

        if let Some(parent_key) = record.parent_key().filter(|p| **p != key) {
            match self.items.get_mut(parent_key) {
                Some(parent) => {
                    parent.add_child_key(key.clone());
                    debug_assert_eq!(
                        parent.child_keys().iter().filter(|k| **k == key).count(),
                        1,
                        "duplicate child back-reference"
                    );
                }
                None => {
                    self.orphans
                        .entry(parent_key.clone())
                        .or_default()
                        .insert(key.clone());
                }
            }
        }

        self.items.insert(key, record);
        Ok(previous)
    }

    /// Remove a record unconditionally.
    pub fn remove(&mut self, key: &str) -> Option<Record> {
        let record = self.items.remove(key)?;
        if let Some(own_key) = record.key() {
            self.detach_from_parent(own_key, record.parent_key());
            let children: BTreeSet<ItemKey> = record
                .child_keys()
                .iter()
                .filter(|k| self.items.contains_key(*k))
                .cloned()
                .collect();
            if !children.is_empty() {
                self.orphans.insert(own_key.clone(), children);
            }
        }
        Some(record)
    }

    /// Remove a record only if the server has acknowledged it.
    ///
    /// Guards against a remote deletion notice discarding a local copy the
    /// server has never seen. Returns whether removal occurred.
    pub fn remove_if_synced(&mut self, key: &str) -> bool {
        match self.items.get(key) {
            Some(record) if record.is_synced() => self.remove(key).is_some(),
            _ => false,
        }
    }

    /// Recompute every record's child keys from parent keys.
    ///
    /// Idempotent. Must run after every bulk hydration.
    pub fn rebuild_child_links(&mut self) {
        let mut links: Vec<(ItemKey, ItemKey)> = self
            .items
            .values()
            .filter_map(|r| match (r.key(), r.parent_key()) {
                (Some(k), Some(p)) if k != p => Some((k.clone(), p.clone())),
                _ => None,
            })
            .collect();
        links.sort();

        for record in self.items.values_mut() {
            record.clear_child_keys();
        }
        self.orphans.clear();

        for (child, parent) in links {
            match self.items.get_mut(&parent) {
                Some(p) => {
                    p.add_child_key(child);
                }
                None => {
                    self.orphans.entry(parent).or_default().insert(child);
                }
            }
        }
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.items.clear();
        self.orphans.clear();
    }

    fn detach_from_parent(&mut self, child: &ItemKey, parent: Option<&ItemKey>) {
        let Some(parent) = parent else {
            return;
        };
        if let Some(p) = self.items.get_mut(parent) {
            p.remove_child_key(child);
        } else if let Some(waiting) = self.orphans.get_mut(parent) {
            waiting.remove(child);
            if waiting.is_empty() {
                self.orphans.remove(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsync_core::Version;

    fn key(s: &str) -> ItemKey {
        ItemKey::new(s).unwrap()
    }

    fn item(k: &str, synced: bool) -> Record {
        let builder = Record::builder("book").key(key(k)).version(Version(1));
        if synced {
            builder.synced().build()
        } else {
            builder.build()
        }
    }

    fn child(k: &str, parent: &str) -> Record {
        Record::builder("note")
            .key(key(k))
            .parent(key(parent))
            .version(Version(1))
            .synced()
            .build()
    }

    #[test]
    fn test_get_and_get_many() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("AAAA0001", true)).unwrap();

        assert!(index.get("AAAA0001").is_some());
        assert!(index.get("MISSING1").is_none());

        let many = index.get_many(&["MISSING1", "AAAA0001"]);
        assert!(many[0].is_none());
        assert_eq!(many[1].unwrap().key().unwrap().as_str(), "AAAA0001");
    }

    #[test]
    fn test_insert_requires_key() {
        let mut index = ItemIndex::new();
        let err = index.insert_or_replace(Record::new("book"));
        assert!(matches!(err, Err(StoreError::MissingKey)));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("AAAA0001", false)).unwrap();
        let previous = index.insert_or_replace(item("AAAA0001", true)).unwrap();

        assert!(previous.is_some());
        assert_eq!(index.len(), 1);
        assert!(index.get("AAAA0001").unwrap().is_synced());
    }

    #[test]
    fn test_child_back_reference_is_idempotent() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();

        let parent = index.get("PARENT01").unwrap();
        assert_eq!(parent.child_keys(), &[key("CHILD001")]);
    }

    #[test]
    fn test_replacing_parent_keeps_children() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.insert_or_replace(item("PARENT01", true)).unwrap();

        assert_eq!(index.get("PARENT01").unwrap().child_keys().len(), 1);
    }

    #[test]
    fn test_child_before_parent_is_adopted() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.insert_or_replace(item("PARENT01", true)).unwrap();

        assert_eq!(index.children_of("PARENT01").len(), 1);
    }

    #[test]
    fn test_reparenting_detaches_old_parent() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(item("PARENT02", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT02")).unwrap();

        assert!(index.get("PARENT01").unwrap().child_keys().is_empty());
        assert_eq!(index.get("PARENT02").unwrap().child_keys().len(), 1);
    }

    #[test]
    fn test_remove_if_synced_guard() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("UNSYNCED", false)).unwrap();
        index.insert_or_replace(item("SYNCED01", true)).unwrap();

        assert!(!index.remove_if_synced("UNSYNCED"));
        assert!(index.contains("UNSYNCED"));

        assert!(index.remove_if_synced("SYNCED01"));
        assert!(!index.contains("SYNCED01"));

        assert!(!index.remove_if_synced("MISSING1"));
    }

    #[test]
    fn test_remove_child_detaches() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.remove("CHILD001");

        assert!(index.get("PARENT01").unwrap().child_keys().is_empty());
    }

    #[test]
    fn test_removed_parent_readopts_children() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.remove("PARENT01");
        index.insert_or_replace(item("PARENT01", true)).unwrap();

        assert_eq!(index.get("PARENT01").unwrap().child_keys().len(), 1);
    }

    #[test]
    fn test_rebuild_child_links_idempotent() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(child("CHILD002", "PARENT01")).unwrap();
        index.insert_or_replace(item("PARENT01", true)).unwrap();
        index.insert_or_replace(child("CHILD001", "PARENT01")).unwrap();
        index.insert_or_replace(child("ORPHAN01", "NOPARENT")).unwrap();

        index.rebuild_child_links();
        let once = index.get("PARENT01").unwrap().child_keys().to_vec();
        index.rebuild_child_links();
        let twice = index.get("PARENT01").unwrap().child_keys().to_vec();

        assert_eq!(once, twice);
        assert_eq!(once, vec![key("CHILD001"), key("CHILD002")]);
    }

    #[test]
    fn test_find_matching_and_missing_keys() {
        let mut index = ItemIndex::new();
        index.insert_or_replace(item("AAAA0001", true)).unwrap();
        index.insert_or_replace(item("AAAA0002", false)).unwrap();

        let synced = index.find_matching(|r| r.is_synced());
        assert_eq!(synced.len(), 1);

        let wanted = vec![key("AAAA0001"), key("ZZZZ9999")];
        assert_eq!(index.keys_not_present(&wanted), vec![&key("ZZZZ9999")]);
    }
}
