//! Snapshots: transportable dumps of an item collection.
//!
//! A dump carries the collection version, every record in key order, and
//! the pending-new queue. Child keys are not stored; restore re-derives them
//! from parent keys.

use serde::{Deserialize, Serialize};

use itemsync_core::{Record, RecordDump, Version};

use crate::collection::{ItemCollection, PendingItem};
use crate::error::{Result, StoreError};
use crate::index::ItemIndex;

/// Serializable form of an [`ItemCollection`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDump {
    /// Collection version watermark at dump time.
    pub collection_version: Version,
    /// Per-record dumps, in key order.
    pub records: Vec<RecordDump>,
    /// Records still waiting for their first write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<RecordDump>,
}

impl CollectionDump {
    /// Encode as JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl ItemCollection {
    /// Dump the collection.
    pub fn dump(&self) -> CollectionDump {
        let records = self
            .index
            .sorted_keys()
            .into_iter()
            .filter_map(|key| self.index.get(key.as_str()))
            .map(Record::dump)
            .collect();

        CollectionDump {
            collection_version: self.version,
            records,
            pending: self.pending_new.iter().map(|p| p.record.dump()).collect(),
        }
    }

    /// Rebuild a collection from a dump.
    ///
    /// Records are inserted in dump order, then child links are re-derived.
    /// A record whose parent is not in the dump simply has no back-reference.
    pub fn restore(dump: CollectionDump) -> Result<Self> {
        let mut index = ItemIndex::new();
        for record_dump in dump.records {
            if record_dump.key.is_none() {
                return Err(StoreError::InvalidData(
                    "dumped record has no identity key".into(),
                ));
            }
            index.insert_or_replace(Record::from_dump(record_dump))?;
        }
        index.rebuild_child_links();

        tracing::debug!(
            items = index.len(),
            version = %dump.collection_version,
            "restored collection"
        );

        Ok(Self {
            index,
            version: dump.collection_version,
            pending_new: dump
                .pending
                .into_iter()
                .map(|d| PendingItem::new(Record::from_dump(d)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsync_core::ItemKey;
    use serde_json::json;

    fn key(s: &str) -> ItemKey {
        ItemKey::new(s).unwrap()
    }

    fn sample() -> ItemCollection {
        let mut collection = ItemCollection::new();
        let index = collection.index_mut();
        index
            .insert_or_replace(
                Record::builder("book")
                    .key(key("BOOK0001"))
                    .version(Version(4))
                    .field("title", "Dune")
                    .synced()
                    .build(),
            )
            .unwrap();
        index
            .insert_or_replace(
                Record::builder("note")
                    .key(key("NOTE0001"))
                    .version(Version(5))
                    .parent(key("BOOK0001"))
                    .field("note", json!("<p>spice</p>"))
                    .synced()
                    .build(),
            )
            .unwrap();
        index
            .insert_or_replace(
                Record::builder("note")
                    .key(key("ORPHAN01"))
                    .parent(key("GONE0001"))
                    .build(),
            )
            .unwrap();
        collection.advance_version(Version(5));
        collection.queue_new(Record::builder("book").field("title", "Emma").build());
        collection
    }

    fn assert_same(a: &ItemCollection, b: &ItemCollection) {
        assert_eq!(a.version(), b.version());
        assert_eq!(a.index().len(), b.index().len());
        for record in a.index().iter() {
            let other = b.index().get(record.key().unwrap().as_str()).unwrap();
            assert_eq!(record.version(), other.version());
            assert_eq!(record.fields(), other.fields());
            assert_eq!(record.parent_key(), other.parent_key());
            assert_eq!(record.is_synced(), other.is_synced());
            assert_eq!(record.child_keys(), other.child_keys());
        }
        assert_eq!(a.pending_new().len(), b.pending_new().len());
    }

    #[test]
    fn test_dump_is_key_ordered_without_child_keys() {
        let dump = sample().dump();
        let keys: Vec<&str> = dump
            .records
            .iter()
            .map(|r| r.key.as_ref().unwrap().as_str())
            .collect();
        assert_eq!(keys, vec!["BOOK0001", "NOTE0001", "ORPHAN01"]);

        let json = String::from_utf8(dump.to_json().unwrap()).unwrap();
        assert!(!json.contains("child"));
    }

    #[test]
    fn test_restore_roundtrip_rederives_children() {
        let original = sample();
        let restored = ItemCollection::restore(original.dump()).unwrap();

        assert_same(&original, &restored);
        assert_eq!(
            restored.index().get("BOOK0001").unwrap().child_keys(),
            &[key("NOTE0001")]
        );
    }

    #[test]
    fn test_restore_via_json_and_cbor() {
        let original = sample();

        let from_json =
            CollectionDump::from_json(&original.dump().to_json().unwrap()).unwrap();
        assert_same(&original, &ItemCollection::restore(from_json).unwrap());

        let from_cbor =
            CollectionDump::from_cbor(&original.dump().to_cbor().unwrap()).unwrap();
        assert_same(&original, &ItemCollection::restore(from_cbor).unwrap());
    }

    #[test]
    fn test_restore_tolerates_orphans() {
        let restored = ItemCollection::restore(sample().dump()).unwrap();
        let orphan = restored.index().get("ORPHAN01").unwrap();
        assert_eq!(orphan.parent_key(), Some(&key("GONE0001")));
    }

    #[test]
    fn test_restore_rejects_keyless_record() {
        let mut dump = sample().dump();
        dump.records.push(Record::new("book").dump());
        assert!(matches!(
            ItemCollection::restore(dump),
            Err(StoreError::InvalidData(_))
        ));
    }
}
