//! Wire message types for the item write/delete API.
//!
//! Writes are `POST`ed as `{"items": [...]}` and answered with three
//! index-keyed buckets. Indices are relative to the request, encoded as JSON
//! object keys ("0", "1", ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use itemsync_core::{field, ItemKey, Record, Version, WriteFailure};

use crate::error::{Result, SyncError};

/// HTTP header names used by the protocol.
pub mod headers {
    /// Library version after the request was processed.
    pub const LAST_MODIFIED_VERSION: &str = "Last-Modified-Version";
    /// Precondition: fail with 412 if the target changed after this version.
    pub const IF_UNMODIFIED_SINCE_VERSION: &str = "If-Unmodified-Since-Version";
    /// Body media type.
    pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Kind of library an endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    #[default]
    User,
    Group,
}

impl LibraryKind {
    /// URL path segment for this kind.
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryKind::User => "users",
            LibraryKind::Group => "groups",
        }
    }
}

/// The library whose items are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LibraryTarget {
    pub kind: LibraryKind,
    pub id: u64,
}

impl LibraryTarget {
    /// A user library.
    pub const fn user(id: u64) -> Self {
        Self {
            kind: LibraryKind::User,
            id,
        }
    }

    /// A group library.
    pub const fn group(id: u64) -> Self {
        Self {
            kind: LibraryKind::Group,
            id,
        }
    }
}

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost";

/// Where item requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub library: LibraryTarget,
}

impl Endpoint {
    /// Create an endpoint. A trailing slash on `base_url` is ignored.
    pub fn new(base_url: impl Into<String>, library: LibraryTarget) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, library }
    }

    /// `<base>/<users|groups>/<id>/items`
    pub fn items_url(&self) -> String {
        format!(
            "{}/{}/{}/items",
            self.base_url,
            self.library.kind.path_segment(),
            self.library.id
        )
    }

    /// `<base>/.../items/<key>`
    pub fn item_url(&self, key: &ItemKey) -> String {
        format!("{}/{}", self.items_url(), key)
    }

    /// `<base>/.../items?itemKey=<k1,k2,...>`
    pub fn items_by_key_url(&self, keys: &[ItemKey]) -> String {
        let joined = keys.iter().map(ItemKey::as_str).collect::<Vec<_>>().join(",");
        format!("{}?itemKey={}", self.items_url(), joined)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, LibraryTarget::default())
    }
}

/// Body of a write request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequestBody {
    pub items: Vec<Value>,
}

impl WriteRequestBody {
    /// Full write objects (fields, key, version, parent) for the given records.
    pub fn for_write(records: &[Record]) -> Self {
        Self {
            items: records.iter().map(Record::write_api_object).collect(),
        }
    }

    /// Creation objects for records the server has not confirmed yet.
    ///
    /// A record that already holds a key is sent with that key and version
    /// 0, so the server creates it under that identity instead of minting
    /// a new one.
    pub fn for_create<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        Self {
            items: records.into_iter().map(create_object).collect(),
        }
    }

    /// Encode as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SyncError::Encoding(e.to_string()))
    }
}

fn create_object(record: &Record) -> Value {
    let mut object = record.raw_api_object();
    if let Some(key) = record.key() {
        object.insert(field::KEY.into(), Value::from(key.as_str()));
        object.insert(field::VERSION.into(), Value::from(Version::UNESTABLISHED.0));
    }
    Value::Object(object)
}

/// A rejected entry in the `failed` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Body of a write response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Index → identity assigned or confirmed by the server.
    #[serde(default)]
    pub success: BTreeMap<String, String>,
    /// Index → marker (the object already matched server state).
    #[serde(default)]
    pub unchanged: BTreeMap<String, Value>,
    /// Index → rejection detail.
    #[serde(default)]
    pub failed: BTreeMap<String, FailedEntry>,
}

/// What happened to one request slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Accepted; carries the identity the server echoed.
    Success(ItemKey),
    /// Already matched server state, or not mentioned at all.
    Unchanged,
    /// Rejected.
    Failed(FailedEntry),
}

impl WriteResponse {
    /// Parse a response body. Anything but a JSON object is malformed.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(SyncError::MalformedResponse("empty write response body".into()));
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        if !value.is_object() {
            return Err(SyncError::MalformedResponse(
                "write response body is not an object".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| SyncError::MalformedResponse(e.to_string()))
    }

    /// Resolve every slot of a request of `len` objects.
    ///
    /// Slots absent from all buckets are `Unchanged`. An index outside the
    /// request, or a success identity that is not a valid key, is malformed.
    pub fn outcomes(&self, len: usize) -> Result<Vec<SlotOutcome>> {
        let mut slots = vec![SlotOutcome::Unchanged; len];

        for (index, key) in &self.success {
            let key = ItemKey::new(key.as_str()).map_err(|_| {
                SyncError::MalformedResponse(format!("invalid identity {key:?} at index {index}"))
            })?;
            slots[slot(index, len)?] = SlotOutcome::Success(key);
        }
        for index in self.unchanged.keys() {
            slots[slot(index, len)?] = SlotOutcome::Unchanged;
        }
        for (index, entry) in &self.failed {
            slots[slot(index, len)?] = SlotOutcome::Failed(entry.clone());
        }

        Ok(slots)
    }
}

impl FailedEntry {
    /// Convert to a [`WriteFailure`], falling back to `record_key` when the
    /// server did not name the record.
    pub fn into_failure(self, record_key: Option<&ItemKey>) -> WriteFailure {
        let key = self
            .key
            .and_then(|k| ItemKey::new(k).ok())
            .or_else(|| record_key.cloned());
        WriteFailure {
            key,
            code: self.code,
            message: self.message,
        }
    }
}

fn slot(index: &str, len: usize) -> Result<usize> {
    match index.parse::<usize>() {
        Ok(i) if i < len => Ok(i),
        _ => Err(SyncError::MalformedResponse(format!(
            "response index {index:?} outside request of {len} object(s)"
        ))),
    }
}
