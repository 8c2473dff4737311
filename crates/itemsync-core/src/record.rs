//! Record: a single library item.
//!
//! A record carries its identity, server version, parent linkage and a JSON
//! field set. Child keys are a derived back-reference maintained by the
//! index; they are never part of the wire or dump representation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::{ItemKey, Version};

/// Well-known field names of the item API object.
pub mod field {
    /// Identity key.
    pub const KEY: &str = "key";
    /// Legacy spelling of the identity key.
    pub const ITEM_KEY: &str = "itemKey";
    /// Server version.
    pub const VERSION: &str = "version";
    /// Legacy spelling of the server version.
    pub const ITEM_VERSION: &str = "itemVersion";
    /// Key of the parent item, for notes and attachments.
    pub const PARENT_ITEM: &str = "parentItem";
    /// Item type discriminator ("book", "note", "attachment", ...).
    pub const ITEM_TYPE: &str = "itemType";
    /// Trash flag (1 = in trash).
    pub const DELETED: &str = "deleted";
    /// Keys of the collections an item belongs to.
    pub const COLLECTIONS: &str = "collections";
}

/// A library item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    key: Option<ItemKey>,
    version: Version,
    parent_key: Option<ItemKey>,
    child_keys: Vec<ItemKey>,
    fields: Map<String, Value>,
    dirty: BTreeSet<String>,
    synced: bool,

    /// Child notes written together with this record.
    pub notes: Vec<Record>,
    /// Child attachments written together with this record.
    pub attachments: Vec<Record>,
}

impl Record {
    /// Create a new, keyless local record of the given item type.
    pub fn new(item_type: &str) -> Self {
        let mut record = Self::default();
        record.set(field::ITEM_TYPE, Value::from(item_type));
        record
    }

    /// Start building a record.
    pub fn builder(item_type: &str) -> RecordBuilder {
        RecordBuilder::new(item_type)
    }

    /// Hydrate a record from a raw server field dictionary.
    ///
    /// Identity, version and parent are lifted out of the map; every other
    /// entry becomes a field. A record carrying both an identity and an
    /// established version is considered synced.
    pub fn from_api_object(mut object: Map<String, Value>) -> Result<Self> {
        let key = take_key(&mut object, &[field::KEY, field::ITEM_KEY])?;
        let version = take_version(&mut object)?;
        let parent_key = take_key(&mut object, &[field::PARENT_ITEM])?;

        Ok(Self {
            synced: key.is_some() && version.is_established(),
            key,
            version,
            parent_key,
            fields: object,
            ..Self::default()
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity and version
    // ─────────────────────────────────────────────────────────────────────────

    /// The identity key, if one has been assigned.
    pub fn key(&self) -> Option<&ItemKey> {
        self.key.as_ref()
    }

    /// Assign the identity key.
    ///
    /// Assigning the key the record already has is a no-op; any other key
    /// is refused because identities are immutable.
    pub fn assign_key(&mut self, key: ItemKey) -> Result<()> {
        match &self.key {
            Some(existing) if *existing == key => Ok(()),
            Some(existing) => Err(CoreError::KeyAlreadyAssigned {
                existing: existing.clone(),
                new: key,
            }),
            None => {
                self.key = Some(key);
                Ok(())
            }
        }
    }

    /// The last version the server reported for this record.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Overwrite the version without touching the synced flag.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Whether the server has acknowledged this record.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Record a server acknowledgement at `version`.
    pub fn mark_synced(&mut self, version: Version) {
        self.version = version;
        self.synced = true;
        self.dirty.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Parent/child linkage
    // ─────────────────────────────────────────────────────────────────────────

    /// Key of the parent item.
    pub fn parent_key(&self) -> Option<&ItemKey> {
        self.parent_key.as_ref()
    }

    /// Set or clear the parent item.
    pub fn set_parent_key(&mut self, parent: Option<ItemKey>) {
        if self.parent_key != parent {
            self.parent_key = parent;
            self.dirty.insert(field::PARENT_ITEM.to_string());
        }
    }

    /// Keys of child items currently known locally.
    pub fn child_keys(&self) -> &[ItemKey] {
        &self.child_keys
    }

    /// Add a child back-reference. Returns false if it was already present.
    pub fn add_child_key(&mut self, child: ItemKey) -> bool {
        if self.child_keys.contains(&child) {
            return false;
        }
        self.child_keys.push(child);
        true
    }

    /// Remove a child back-reference. Returns whether it was present.
    pub fn remove_child_key(&mut self, child: &ItemKey) -> bool {
        let before = self.child_keys.len();
        self.child_keys.retain(|k| k != child);
        before != self.child_keys.len()
    }

    /// Drop every child back-reference.
    pub fn clear_child_keys(&mut self) {
        self.child_keys.clear();
    }

    /// Move embedded notes and attachments out of this record.
    pub fn take_children(&mut self) -> Vec<Record> {
        let mut children = std::mem::take(&mut self.notes);
        children.append(&mut self.attachments);
        children
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fields
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a string field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Set a field and mark it dirty.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
    }

    /// All fields except identity, version and parent.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Whether any field changed since the last acknowledgement.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Names of fields changed since the last acknowledgement.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// The item type, if set.
    pub fn item_type(&self) -> Option<&str> {
        self.get_str(field::ITEM_TYPE)
    }

    /// Whether the item sits in the trash.
    pub fn is_trashed(&self) -> bool {
        match self.fields.get(field::DELETED) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
            _ => false,
        }
    }

    /// Move the item into or out of the trash.
    pub fn set_trashed(&mut self, trashed: bool) {
        self.set(field::DELETED, Value::from(u8::from(trashed)));
    }

    /// Keys of the collections this item belongs to.
    pub fn collections(&self) -> Vec<&str> {
        self.fields
            .get(field::COLLECTIONS)
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether the item belongs to the given collection.
    pub fn in_collection(&self, collection_key: &str) -> bool {
        self.collections().contains(&collection_key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encodings
    // ─────────────────────────────────────────────────────────────────────────

    /// The object sent on the write path: the full field set plus identity,
    /// version and parent.
    pub fn write_api_object(&self) -> Value {
        let mut object = self.raw_api_object();
        if let Some(key) = &self.key {
            object.insert(field::KEY.to_string(), Value::from(key.as_str()));
            object.insert(field::VERSION.to_string(), Value::from(self.version.0));
        }
        Value::Object(object)
    }

    /// The raw field object, without identity or version.
    pub fn raw_api_object(&self) -> Map<String, Value> {
        let mut object = self.fields.clone();
        if let Some(parent) = &self.parent_key {
            object.insert(field::PARENT_ITEM.to_string(), Value::from(parent.as_str()));
        }
        object
    }

    /// Produce the persisted form of this record.
    pub fn dump(&self) -> RecordDump {
        RecordDump {
            key: self.key.clone(),
            version: self.version,
            parent_key: self.parent_key.clone(),
            fields: self.fields.clone(),
            dirty: self.dirty.iter().cloned().collect(),
            synced: self.synced,
        }
    }

    /// Rebuild a record from its persisted form. Child keys start empty.
    pub fn from_dump(dump: RecordDump) -> Self {
        Self {
            key: dump.key,
            version: dump.version,
            parent_key: dump.parent_key,
            fields: dump.fields,
            dirty: dump.dirty.into_iter().collect(),
            synced: dump.synced,
            ..Self::default()
        }
    }
}

/// Persisted form of a [`Record`].
///
/// Child keys are intentionally absent; they are re-derived on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDump {
    pub key: Option<ItemKey>,
    pub version: Version,
    pub parent_key: Option<ItemKey>,
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirty: Vec<String>,
    pub synced: bool,
}

/// Builder for records.
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Create a builder for a keyless record.
    pub fn new(item_type: &str) -> Self {
        Self {
            record: Record::new(item_type),
        }
    }

    /// Set the identity key.
    pub fn key(mut self, key: ItemKey) -> Self {
        self.record.key = Some(key);
        self
    }

    /// Set the version.
    pub fn version(mut self, version: Version) -> Self {
        self.record.version = version;
        self
    }

    /// Set the parent item.
    pub fn parent(mut self, parent: ItemKey) -> Self {
        self.record.set_parent_key(Some(parent));
        self
    }

    /// Set a field.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.record.set(name, value.into());
        self
    }

    /// Embed a child note.
    pub fn note(mut self, note: Record) -> Self {
        self.record.notes.push(note);
        self
    }

    /// Embed a child attachment.
    pub fn attachment(mut self, attachment: Record) -> Self {
        self.record.attachments.push(attachment);
        self
    }

    /// Mark the record as acknowledged by the server at its version.
    pub fn synced(mut self) -> Self {
        let version = self.record.version;
        self.record.mark_synced(version);
        self
    }

    /// Finish building.
    pub fn build(self) -> Record {
        self.record
    }
}

fn take_key(object: &mut Map<String, Value>, names: &[&str]) -> Result<Option<ItemKey>> {
    let mut found = None;
    for name in names {
        match object.remove(*name) {
            Some(Value::String(s)) if !s.is_empty() => {
                if found.is_none() {
                    found = Some(ItemKey::new(s)?);
                }
            }
            // The API sends `false` or "" for "no parent".
            Some(Value::String(_)) | Some(Value::Bool(false)) | Some(Value::Null) | None => {}
            Some(other) => {
                return Err(CoreError::MalformedRecord(format!(
                    "field {name} is not a key: {other}"
                )))
            }
        }
    }
    Ok(found)
}

fn take_version(object: &mut Map<String, Value>) -> Result<Version> {
    let mut version = Version::UNESTABLISHED;
    for name in [field::VERSION, field::ITEM_VERSION] {
        let parsed = match object.remove(name) {
            Some(Value::Number(n)) => n.as_u64().map(Version),
            Some(Value::String(s)) => Version::parse_header(&s),
            Some(Value::Null) | None => continue,
            Some(_) => None,
        };
        match parsed {
            Some(v) => version = version.max(v),
            None => {
                return Err(CoreError::MalformedRecord(format!(
                    "field {name} is not a version"
                )))
            }
        }
    }
    Ok(version)
}
