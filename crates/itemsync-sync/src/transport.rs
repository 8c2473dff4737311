//! Transport abstraction for the item API.
//!
//! The transport performs one HTTP-like request and returns status, headers
//! and body. A non-success status is a normal [`Response`]; `Err` means the
//! request could not be completed at all.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use itemsync_core::Version;

use crate::error::Result;
use crate::messages::headers;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Delete,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    /// A `POST` carrying a JSON body.
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![(headers::CONTENT_TYPE.into(), "application/json".into())],
            body: Some(Bytes::from(body)),
        }
    }

    /// A bodiless `DELETE`.
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Look up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response from the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The `Last-Modified-Version` header, if present and numeric.
    pub fn last_modified_version(&self) -> Option<Version> {
        self.header(headers::LAST_MODIFIED_VERSION)
            .and_then(Version::parse_header)
    }

    /// Body as text, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Transport trait for sending item requests.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// An in-memory versioned item server for testing.
///
/// Every write or delete that changes something bumps the library version by
/// one. Supports precondition checks, per-key rejections, scripted responses
/// and transport failure injection.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

    use serde_json::{Map, Value};
    use tokio::sync::Mutex;

    use crate::error::SyncError;
    use crate::messages::{FailedEntry, WriteResponse};

    /// An item as stored by the remote.
    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredItem {
        pub version: u64,
        pub fields: Map<String, Value>,
    }

    #[derive(Debug, Default)]
    struct RemoteState {
        version: u64,
        items: BTreeMap<String, StoredItem>,
        requests: Vec<Request>,
        fail_requests: HashSet<usize>,
        scripted: VecDeque<Response>,
        scripted_at: HashMap<usize, Response>,
        rejections: HashMap<String, (u16, String)>,
        minted: u64,
    }

    /// In-memory remote implementing [`Transport`].
    #[derive(Debug, Default)]
    pub struct MemoryRemote {
        state: Mutex<RemoteState>,
    }

    impl MemoryRemote {
        /// Create an empty remote at library version 0.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Preload an item at the given version. Raises the library version
        /// to at least `version`.
        pub async fn seed(&self, key: &str, version: u64, fields: Map<String, Value>) {
            let mut state = self.state.lock().await;
            state
                .items
                .insert(key.to_string(), StoredItem { version, fields });
            state.version = state.version.max(version);
        }

        /// Make the `n`th request (1-based, counting every request) fail at
        /// the transport level.
        pub async fn fail_request(&self, n: usize) {
            self.state.lock().await.fail_requests.insert(n);
        }

        /// Answer the next request with `response` instead of processing it.
        pub async fn script_response(&self, response: Response) {
            self.state.lock().await.scripted.push_back(response);
        }

        /// Answer the `n`th request (1-based) with `response`. Requests before
        /// it are processed normally.
        pub async fn script_response_at(&self, n: usize, response: Response) {
            self.state.lock().await.scripted_at.insert(n, response);
        }

        /// Reject any write of `key` with the given code.
        pub async fn reject_key(&self, key: &str, code: u16, message: &str) {
            self.state
                .lock()
                .await
                .rejections
                .insert(key.to_string(), (code, message.to_string()));
        }

        /// Current library version.
        pub async fn library_version(&self) -> u64 {
            self.state.lock().await.version
        }

        /// A stored item.
        pub async fn item(&self, key: &str) -> Option<StoredItem> {
            self.state.lock().await.items.get(key).cloned()
        }

        /// Number of stored items.
        pub async fn item_count(&self) -> usize {
            self.state.lock().await.items.len()
        }

        /// Every request received, including failed ones.
        pub async fn requests(&self) -> Vec<Request> {
            self.state.lock().await.requests.clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryRemote {
        async fn send(&self, request: Request) -> Result<Response> {
            let mut state = self.state.lock().await;
            state.requests.push(request.clone());

            let n = state.requests.len();
            if state.fail_requests.contains(&n) {
                return Err(SyncError::Transport(format!("injected failure on request {n}")));
            }
            if let Some(response) = state.scripted_at.remove(&n) {
                return Ok(response);
            }
            if let Some(response) = state.scripted.pop_front() {
                return Ok(response);
            }

            let (path, query) = match request.url.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (request.url.as_str(), None),
            };
            let Some(pos) = path.rfind("/items") else {
                return Ok(Response::new(404));
            };
            let rest = &path[pos + "/items".len()..];

            let response = match (request.method, rest.strip_prefix('/')) {
                (Method::Post, None) if rest.is_empty() => state.write(&request),
                (Method::Delete, None) if rest.is_empty() => {
                    let keys = query
                        .and_then(|q| q.split('&').find_map(|p| p.strip_prefix("itemKey=")))
                        .map(|k| k.split(',').filter(|k| !k.is_empty()).collect::<Vec<_>>())
                        .unwrap_or_default();
                    state.delete_many(&request, &keys)
                }
                (Method::Delete, Some(key)) => state.delete_one(&request, key),
                _ => Response::new(405),
            };
            Ok(response)
        }
    }

    impl RemoteState {
        fn precondition(request: &Request) -> Option<u64> {
            request
                .header(headers::IF_UNMODIFIED_SINCE_VERSION)
                .and_then(Version::parse_header)
                .map(|v| v.0)
        }

        fn versioned(&self, status: u16) -> Response {
            Response::new(status).with_header(headers::LAST_MODIFIED_VERSION, self.version)
        }

        fn mint_key(&mut self) -> String {
            self.minted += 1;
            format!("S{:07}", self.minted)
        }

        fn write(&mut self, request: &Request) -> Response {
            let body: Value = match request.body.as_deref().map(serde_json::from_slice) {
                Some(Ok(body)) => body,
                _ => return Response::new(400).with_body("invalid JSON body"),
            };
            let Some(items) = body.get("items").and_then(Value::as_array) else {
                return Response::new(400).with_body("missing items array");
            };

            let next = self.version + 1;
            let mut changed = false;
            let mut out = WriteResponse::default();

            for (i, object) in items.iter().enumerate() {
                let index = i.to_string();
                let Some(mut fields) = object.as_object().cloned() else {
                    out.failed.insert(index, failed(None, 400, "item must be an object"));
                    continue;
                };
                let key = fields
                    .remove("key")
                    .and_then(|v| v.as_str().map(str::to_string));
                let version = fields.remove("version").and_then(|v| v.as_u64());

                if let Some((code, message)) =
                    key.as_ref().and_then(|k| self.rejections.get(k)).cloned()
                {
                    out.failed.insert(index, failed(key, code, &message));
                    continue;
                }

                let key = match key {
                    Some(key) => key,
                    None => self.mint_key(),
                };
                match self.items.get(&key) {
                    Some(stored) if version.is_some_and(|v| v != stored.version) => {
                        out.failed.insert(
                            index,
                            failed(Some(key), 412, "item has been modified since specified version"),
                        );
                        continue;
                    }
                    Some(stored) if stored.fields == fields => {
                        out.unchanged.insert(index, Value::from(key));
                        continue;
                    }
                    _ => {}
                }

                self.items.insert(
                    key.clone(),
                    StoredItem {
                        version: next,
                        fields,
                    },
                );
                out.success.insert(index, key);
                changed = true;
            }

            if changed {
                self.version = next;
            }
            match serde_json::to_vec(&out) {
                Ok(body) => self.versioned(200).with_body(body),
                Err(e) => Response::new(500).with_body(e.to_string()),
            }
        }

        fn delete_many(&mut self, request: &Request, keys: &[&str]) -> Response {
            if let Some(expected) = Self::precondition(request) {
                if expected != self.version {
                    return self.versioned(412);
                }
            }
            let removed = keys
                .iter()
                .filter(|k| self.items.remove(**k).is_some())
                .count();
            if removed > 0 {
                self.version += 1;
            }
            self.versioned(204)
        }

        fn delete_one(&mut self, request: &Request, key: &str) -> Response {
            let Some(stored) = self.items.get(key) else {
                return self.versioned(404);
            };
            match Self::precondition(request) {
                None => return self.versioned(428),
                Some(expected) if stored.version > expected => return self.versioned(412),
                Some(_) => {}
            }
            self.items.remove(key);
            self.version += 1;
            self.versioned(204)
        }
    }

    fn failed(key: Option<String>, code: u16, message: &str) -> FailedEntry {
        FailedEntry {
            key,
            code,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryRemote;
    use super::*;
    use crate::error::SyncError;
    use crate::messages::WriteResponse;
    use serde_json::json;

    fn post(items: serde_json::Value) -> Request {
        Request::post_json(
            "http://localhost/users/1/items",
            serde_json::to_vec(&json!({ "items": items })).unwrap(),
        )
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = Response::new(200).with_header("last-modified-version", 17);
        assert_eq!(response.last_modified_version(), Some(Version(17)));
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_memory_remote_write_and_version() {
        let remote = MemoryRemote::new();
        let response = remote
            .send(post(json!([{"key": "AAAA2222", "version": 0, "title": "a"}, {"title": "b"}])))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.last_modified_version(), Some(Version(1)));
        let parsed = WriteResponse::parse(&response.body).unwrap();
        assert_eq!(parsed.success["0"], "AAAA2222");
        assert_eq!(parsed.success["1"], "S0000001");
        assert_eq!(remote.item_count().await, 2);
    }

    #[tokio::test]
    async fn test_memory_remote_unchanged_and_conflict() {
        let remote = MemoryRemote::new();
        remote
            .send(post(json!([{"key": "AAAA2222", "version": 0, "title": "a"}])))
            .await
            .unwrap();

        let response = remote
            .send(post(json!([
                {"key": "AAAA2222", "version": 1, "title": "a"},
                {"key": "AAAA2222", "version": 0, "title": "b"}
            ])))
            .await
            .unwrap();
        let parsed = WriteResponse::parse(&response.body).unwrap();
        assert!(parsed.unchanged.contains_key("0"));
        assert_eq!(parsed.failed["1"].code, 412);
        assert_eq!(remote.library_version().await, 1);
    }

    #[tokio::test]
    async fn test_memory_remote_injected_failure() {
        let remote = MemoryRemote::new();
        remote.fail_request(1).await;

        let err = remote.send(post(json!([]))).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(remote.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_remote_deletes() {
        let remote = MemoryRemote::new();
        remote.seed("AAAA2222", 3, Default::default()).await;
        remote.seed("BBBB3333", 5, Default::default()).await;

        let stale = Request::delete("http://localhost/users/1/items?itemKey=AAAA2222")
            .with_header(headers::IF_UNMODIFIED_SINCE_VERSION, 4);
        assert_eq!(remote.send(stale).await.unwrap().status, 412);

        let single = Request::delete("http://localhost/users/1/items/BBBB3333")
            .with_header(headers::IF_UNMODIFIED_SINCE_VERSION, 5);
        let response = remote.send(single).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.last_modified_version(), Some(Version(6)));

        let many = Request::delete("http://localhost/users/1/items?itemKey=AAAA2222")
            .with_header(headers::IF_UNMODIFIED_SINCE_VERSION, 6);
        assert_eq!(remote.send(many).await.unwrap().status, 204);
        assert_eq!(remote.item_count().await, 0);
    }
}
