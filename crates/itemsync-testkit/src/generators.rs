//! Proptest generators for property-based testing.

use proptest::prelude::*;
use proptest::sample::Index;

use itemsync_core::{ItemKey, Record, Version};

/// Generate a key from the item key alphabet.
pub fn item_key() -> impl Strategy<Value = ItemKey> {
    "[2-9A-NP-Z]{8}".prop_filter_map("valid key", |s| ItemKey::new(s).ok())
}

/// Generate an established version.
pub fn version() -> impl Strategy<Value = Version> {
    (1u64..1_000_000).prop_map(Version)
}

/// Generate a short title.
pub fn title() -> impl Strategy<Value = String> {
    "[A-Za-z ]{0,24}".prop_map(String::from)
}

/// Parameters for one record of a generated set.
#[derive(Debug, Clone)]
pub struct RecordParams {
    pub version: Version,
    pub title: String,
    /// Parent, as an index into the set's keys.
    pub parent: Option<Index>,
    /// Whether the parent is left out of the set.
    pub orphan: bool,
    pub synced: bool,
}

impl Arbitrary for RecordParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            version(),
            title(),
            any::<Option<Index>>(),
            prop::bool::weighted(0.1),
            any::<bool>(),
        )
            .prop_map(|(version, title, parent, orphan, synced)| RecordParams {
                version,
                title,
                parent,
                orphan,
                synced,
            })
            .boxed()
    }
}

/// Parent key of orphans. Never produced by [`item_key`]: `1` is not in
/// the key alphabet.
pub fn missing_parent() -> ItemKey {
    ItemKey::new("MISSING1").unwrap_or_else(|e| panic!("{e}"))
}

/// Build records with unique keys and parents drawn from the same set.
pub fn records_from_params(entries: Vec<(ItemKey, RecordParams)>) -> Vec<Record> {
    let keys: Vec<ItemKey> = entries.iter().map(|(k, _)| k.clone()).collect();
    entries
        .into_iter()
        .map(|(key, params)| {
            let mut builder = Record::builder("book")
                .key(key.clone())
                .version(params.version)
                .field("title", params.title);
            if params.orphan {
                builder = builder.parent(missing_parent());
            } else if let Some(index) = params.parent {
                let parent = index.get(&keys);
                if *parent != key {
                    builder = builder.parent(parent.clone());
                }
            }
            if params.synced {
                builder = builder.synced();
            }
            builder.build()
        })
        .collect()
}

/// Generate between 1 and `max` records with unique keys.
pub fn record_set(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(item_key(), any::<RecordParams>(), 1..=max)
        .prop_map(|entries| records_from_params(entries.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsync_store::{ItemCollection, ItemIndex};
    use std::collections::BTreeMap;

    fn child_sets(index: &ItemIndex) -> BTreeMap<ItemKey, Vec<ItemKey>> {
        index
            .iter()
            .filter_map(|r| {
                let mut children = r.child_keys().to_vec();
                children.sort();
                r.key().map(|k| (k.clone(), children))
            })
            .collect()
    }

    fn expected_children(records: &[Record]) -> BTreeMap<ItemKey, Vec<ItemKey>> {
        let mut expected: BTreeMap<ItemKey, Vec<ItemKey>> = records
            .iter()
            .filter_map(|r| r.key().map(|k| (k.clone(), Vec::new())))
            .collect();
        for record in records {
            if let (Some(key), Some(parent)) = (record.key(), record.parent_key()) {
                if let Some(children) = expected.get_mut(parent) {
                    children.push(key.clone());
                }
            }
        }
        for children in expected.values_mut() {
            children.sort();
        }
        expected
    }

    proptest! {
        #[test]
        fn test_rebuild_child_links_idempotent(records in record_set(40)) {
            let mut index = ItemIndex::new();
            for record in records.clone() {
                index.insert_or_replace(record).unwrap();
            }

            index.rebuild_child_links();
            let once = child_sets(&index);
            index.rebuild_child_links();
            prop_assert_eq!(&once, &child_sets(&index));
            prop_assert_eq!(once, expected_children(&records));
        }

        #[test]
        fn test_incremental_links_match_rebuild(records in record_set(40)) {
            let mut index = ItemIndex::new();
            for record in records.clone() {
                index.insert_or_replace(record).unwrap();
            }
            let incremental = child_sets(&index);

            index.rebuild_child_links();
            prop_assert_eq!(incremental, child_sets(&index));
        }

        #[test]
        fn test_snapshot_restores_child_links(records in record_set(30)) {
            let mut collection = ItemCollection::new();
            for record in records.clone() {
                collection.index_mut().insert_or_replace(record).unwrap();
            }

            let restored = ItemCollection::restore(collection.dump()).unwrap();
            prop_assert_eq!(child_sets(restored.index()), expected_children(&records));
        }

        #[test]
        fn test_remove_if_synced_guard(records in record_set(20)) {
            let mut index = ItemIndex::new();
            for record in records.clone() {
                index.insert_or_replace(record).unwrap();
            }

            for record in &records {
                let key = record.key().unwrap().as_str();
                prop_assert_eq!(index.remove_if_synced(key), record.is_synced());
                prop_assert_eq!(index.contains(key), !record.is_synced());
            }
        }
    }
}
