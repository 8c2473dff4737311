//! Sync coordinator: chunked, strictly sequential write and delete dispatch.
//!
//! Every operation takes the [`ItemCollection`] by `&mut`, so a collection
//! never sees two overlapping operations. Chunks are sent one at a time and
//! each chunk's response is reconciled into the index before the next chunk
//! is sent.
//!
//! # Cancellation
//!
//! Dropping an operation's future between chunks leaves every chunk already
//! reconciled in place. The request in flight when the future is dropped may
//! still reach the server; its response is never applied locally.

use std::sync::Arc;

use itemsync_core::{
    Batcher, ItemKey, KeyGenerator, RandomKeyGenerator, Record, Version, WriteFailure,
    DEFAULT_CHUNK_SIZE,
};
use itemsync_store::{DurableCache, ItemCollection, PendingItem, StoreError};

use crate::error::{Result, SyncError};
use crate::events::{EventSink, SyncEvent};
use crate::messages::{headers, Endpoint, SlotOutcome, WriteRequestBody, WriteResponse};
use crate::transport::{Request, Response, Transport};

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum operations per request.
    pub chunk_size: usize,
    /// Where requests are sent.
    pub endpoint: Endpoint,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            endpoint: Endpoint::default(),
        }
    }
}

/// Something to delete: a bare key or a record carrying one.
#[derive(Debug, Clone)]
pub enum DeleteTarget<'a> {
    Key(ItemKey),
    Record(&'a Record),
}

impl DeleteTarget<'_> {
    fn into_key(self) -> Option<ItemKey> {
        match self {
            DeleteTarget::Key(key) => Some(key),
            DeleteTarget::Record(record) => record.key().cloned(),
        }
    }
}

impl From<ItemKey> for DeleteTarget<'_> {
    fn from(key: ItemKey) -> Self {
        DeleteTarget::Key(key)
    }
}

impl<'a> From<&'a Record> for DeleteTarget<'a> {
    fn from(record: &'a Record) -> Self {
        DeleteTarget::Record(record)
    }
}

/// Outcome of flushing the pending-new queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Identities assigned to newly created records, in queue order.
    pub created: Vec<ItemKey>,
    /// Entries the server reported as already matching.
    pub unchanged: usize,
    /// Entries rejected by the server; they remain queued.
    pub failed: Vec<WriteFailure>,
}

/// Drives writes, deletes and flushes against one remote library.
pub struct SyncCoordinator<T: Transport> {
    transport: T,
    keys: Arc<dyn KeyGenerator>,
    cache: Option<Arc<dyn DurableCache>>,
    events: Option<Arc<dyn EventSink>>,
    batcher: Batcher,
    config: SyncConfig,
}

impl<T: Transport> SyncCoordinator<T> {
    /// Create a coordinator. A zero chunk size is rejected.
    pub fn new(transport: T, config: SyncConfig) -> Result<Self> {
        Ok(Self {
            transport,
            keys: Arc::new(RandomKeyGenerator),
            cache: None,
            events: None,
            batcher: Batcher::new(config.chunk_size)?,
            config,
        })
    }

    /// Use a specific key generator.
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    /// Persist written records to `cache` after each chunk.
    pub fn with_cache(mut self, cache: Arc<dyn DurableCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Publish events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write path
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or update records on the server.
    ///
    /// Keyless records get a fresh key. Each record is followed by its notes
    /// and then its attachments, all pointing at it as parent. On success
    /// every expanded record is returned, synced, in that order.
    ///
    /// A transport failure stops at the failing chunk and returns
    /// [`SyncError::Incomplete`] with the records already applied; that chunk
    /// and later ones are untouched. Per-record rejections do not stop later
    /// chunks; they are reported at the end as `Incomplete` over
    /// [`SyncError::Rejected`].
    pub async fn write_records(
        &self,
        collection: &mut ItemCollection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let expanded = self.expand(records)?;
        if expanded.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.config.endpoint.items_url();
        let total = self.batcher.chunk_count(expanded.len());
        let chunks = self.batcher.split(&expanded);
        let mut written = Vec::with_capacity(expanded.len());
        let mut rejected = Vec::new();

        for (n, chunk) in chunks.into_iter().enumerate() {
            tracing::debug!(chunk = n + 1, total, items = chunk.len(), "sending write chunk");

            let (records, failures) = match self.send_write_chunk(&url, collection, chunk).await {
                Ok(applied) => applied,
                Err(e) => {
                    tracing::warn!(chunk = n + 1, total, error = %e, "write chunk failed");
                    return Err(SyncError::incomplete(written, e));
                }
            };

            self.persist(&records).await;
            self.emit(SyncEvent::ItemsChanged {
                count: records.len(),
            });
            written.extend(records);
            rejected.extend(failures);
        }

        tracing::info!(
            written = written.len(),
            rejected = rejected.len(),
            version = %collection.version(),
            "write complete"
        );

        if rejected.is_empty() {
            Ok(written)
        } else {
            Err(SyncError::incomplete(written, SyncError::Rejected(rejected)))
        }
    }

    /// Move records to the trash.
    pub async fn trash_records(
        &self,
        collection: &mut ItemCollection,
        keys: &[ItemKey],
    ) -> Result<Vec<Record>> {
        self.set_trashed(collection, keys, true).await
    }

    /// Restore records from the trash.
    pub async fn untrash_records(
        &self,
        collection: &mut ItemCollection,
        keys: &[ItemKey],
    ) -> Result<Vec<Record>> {
        self.set_trashed(collection, keys, false).await
    }

    async fn set_trashed(
        &self,
        collection: &mut ItemCollection,
        keys: &[ItemKey],
        trashed: bool,
    ) -> Result<Vec<Record>> {
        let records: Vec<Record> = collection
            .index()
            .get_many(keys)
            .into_iter()
            .flatten()
            .map(|record| {
                let mut record = record.clone();
                record.set_trashed(trashed);
                record
            })
            .collect();
        if records.len() < keys.len() {
            tracing::debug!(
                missing = keys.len() - records.len(),
                "skipping unknown items"
            );
        }
        self.write_records(collection, records).await
    }

    fn expand(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut expanded = Vec::with_capacity(records.len());
        for mut record in records {
            self.ensure_key(&mut record)?;
            let parent = record.key().cloned();
            let children = record.take_children();
            expanded.push(record);

            for mut child in children {
                self.ensure_key(&mut child)?;
                child.set_parent_key(parent.clone());
                expanded.push(child);
            }
        }
        Ok(expanded)
    }

    fn ensure_key(&self, record: &mut Record) -> Result<()> {
        if record.key().is_none() {
            record.assign_key(self.keys.new_key())?;
            record.set_version(Version::UNESTABLISHED);
        }
        Ok(())
    }

    async fn send_write_chunk(
        &self,
        url: &str,
        collection: &mut ItemCollection,
        chunk: &[Record],
    ) -> Result<(Vec<Record>, Vec<WriteFailure>)> {
        let body = WriteRequestBody::for_write(chunk).to_bytes()?;
        let response = self.transport.send(Request::post_json(url, body)).await?;
        let version = check_status(&response, None, collection.version())?;
        let version = version.ok_or_else(missing_version)?;
        let slots = WriteResponse::parse(&response.body)?.outcomes(chunk.len())?;

        let mut records = Vec::with_capacity(chunk.len());
        let mut failures = Vec::new();
        for (record, slot) in chunk.iter().zip(slots) {
            let mut record = record.clone();
            match slot {
                SlotOutcome::Success(key) => {
                    adopt_key(&mut record, key)?;
                }
                SlotOutcome::Unchanged => {}
                SlotOutcome::Failed(entry) => {
                    let failure = entry.into_failure(record.key());
                    tracing::warn!(%failure, "record rejected");
                    failures.push(failure);
                    continue;
                }
            }
            record.mark_synced(version);
            collection.index_mut().insert_or_replace(record.clone())?;
            records.push(record);
        }

        collection.advance_version(version);
        Ok((records, failures))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pending-new reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Create every record in the collection's pending-new queue.
    ///
    /// Afterwards the queue holds exactly the entries the server rejected,
    /// each with its failure attached. If a chunk cannot be completed, that
    /// chunk and every later one stay queued unchanged and the error is
    /// returned as [`SyncError::Incomplete`] over the records created so far.
    pub async fn flush_unsynced_new(&self, collection: &mut ItemCollection) -> Result<FlushReport> {
        let pending = collection.take_pending();
        let mut report = FlushReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let url = self.config.endpoint.items_url();
        let total = self.batcher.chunk_count(pending.len());
        let chunks = self.batcher.split(&pending);
        let mut retained = Vec::new();
        let mut created = Vec::new();

        for (n, chunk) in chunks.iter().enumerate() {
            tracing::debug!(chunk = n + 1, total, items = chunk.len(), "flushing new items");

            match self
                .send_flush_chunk(&url, collection, chunk, &mut report, &mut created)
                .await
            {
                Ok(failed) => retained.extend(failed),
                Err(e) => {
                    tracing::warn!(chunk = n + 1, total, error = %e, "flush chunk failed");
                    retained.extend(chunks[n..].iter().flat_map(|c| c.iter().cloned()));
                    collection.replace_pending(retained);
                    return Err(SyncError::incomplete(created, e));
                }
            }
        }

        collection.replace_pending(retained);
        if !created.is_empty() {
            self.persist(&created).await;
            self.emit(SyncEvent::ItemsChanged {
                count: created.len(),
            });
        }

        tracing::info!(
            created = report.created.len(),
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "flush complete"
        );
        Ok(report)
    }

    async fn send_flush_chunk(
        &self,
        url: &str,
        collection: &mut ItemCollection,
        chunk: &[PendingItem],
        report: &mut FlushReport,
        created: &mut Vec<Record>,
    ) -> Result<Vec<PendingItem>> {
        let body = WriteRequestBody::for_create(chunk.iter().map(|p| &p.record)).to_bytes()?;
        let response = self.transport.send(Request::post_json(url, body)).await?;
        let version = check_status(&response, None, collection.version())?
            .ok_or_else(missing_version)?;
        let slots = WriteResponse::parse(&response.body)?.outcomes(chunk.len())?;

        // Validate every identity before touching the index.
        let mut staged = Vec::with_capacity(chunk.len());
        for (item, slot) in chunk.iter().zip(slots) {
            if let SlotOutcome::Success(key) = &slot {
                let mut record = item.record.clone();
                adopt_key(&mut record, key.clone())?;
                record.mark_synced(version);
                staged.push((item, slot, Some(record)));
            } else {
                staged.push((item, slot, None));
            }
        }

        let mut failed = Vec::new();
        for (item, slot, record) in staged {
            match (slot, record) {
                (SlotOutcome::Success(key), Some(record)) => {
                    collection.index_mut().insert_or_replace(record.clone())?;
                    report.created.push(key);
                    created.push(record);
                }
                (SlotOutcome::Failed(entry), _) => {
                    let failure = entry.into_failure(item.record.key());
                    tracing::warn!(%failure, "new item rejected");
                    report.failed.push(failure.clone());
                    failed.push(PendingItem {
                        record: item.record.clone(),
                        last_error: Some(failure),
                    });
                }
                _ => report.unchanged += 1,
            }
        }

        collection.advance_version(version);
        Ok(failed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delete path
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete items by key, in chunks.
    ///
    /// Each request carries `If-Unmodified-Since-Version`: `expected` if
    /// given, else the collection watermark once established; later chunks
    /// use the version returned by the previous one. A chunk's keys leave
    /// the index as soon as that chunk succeeds. On failure, chunks already
    /// deleted stay deleted.
    pub async fn delete_records(
        &self,
        collection: &mut ItemCollection,
        targets: Vec<DeleteTarget<'_>>,
        expected: Option<Version>,
    ) -> Result<()> {
        let keys: Vec<ItemKey> = targets
            .into_iter()
            .filter_map(DeleteTarget::into_key)
            .collect();
        if keys.is_empty() {
            return Ok(());
        }

        let total = self.batcher.chunk_count(keys.len());
        let chunks = self.batcher.split(&keys);
        let mut precondition = expected.or_else(|| {
            let watermark = collection.version();
            watermark.is_established().then_some(watermark)
        });

        for (n, chunk) in chunks.into_iter().enumerate() {
            let mut request = Request::delete(self.config.endpoint.items_by_key_url(chunk));
            if let Some(version) = precondition {
                request = request.with_header(headers::IF_UNMODIFIED_SINCE_VERSION, version);
            }
            tracing::debug!(chunk = n + 1, total, items = chunk.len(), "sending delete chunk");

            let response = self.transport.send(request).await?;
            let expected = precondition.unwrap_or(collection.version());
            let returned = check_status(&response, None, expected)?;

            for key in chunk {
                collection.index_mut().remove(key.as_str());
            }
            if let Some(version) = returned {
                collection.advance_version(version);
                precondition = Some(version);
            }
            self.forget(chunk).await;
            self.emit(SyncEvent::DeleteProgress {
                completed: n + 1,
                total,
            });
        }

        tracing::info!(deleted = keys.len(), version = %collection.version(), "delete complete");
        Ok(())
    }

    /// Delete one record, guarded by its own version.
    ///
    /// A 412 answer means the server copy changed since `record` was read;
    /// it is reported as [`SyncError::RecordConflict`] and the local copy is
    /// kept.
    pub async fn delete_record(&self, collection: &mut ItemCollection, record: &Record) -> Result<()> {
        let key = record.key().cloned().ok_or(StoreError::MissingKey)?;
        let request = Request::delete(self.config.endpoint.item_url(&key))
            .with_header(headers::IF_UNMODIFIED_SINCE_VERSION, record.version());

        let response = self.transport.send(request).await?;
        let returned = check_status(&response, Some(&key), record.version())?;

        collection.index_mut().remove(key.as_str());
        if let Some(version) = returned {
            collection.advance_version(version);
        }
        self.forget(std::slice::from_ref(&key)).await;
        self.emit(SyncEvent::DeleteProgress {
            completed: 1,
            total: 1,
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Side effects
    // ─────────────────────────────────────────────────────────────────────────

    async fn persist(&self, records: &[Record]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.persist(records).await {
                tracing::warn!(error = %e, count = records.len(), "failed to cache written items");
            }
        }
    }

    async fn forget(&self, keys: &[ItemKey]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(keys).await {
                tracing::warn!(error = %e, count = keys.len(), "failed to drop deleted items from cache");
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(sink) = &self.events {
            sink.notify(event);
        }
    }
}

/// Map a non-success status to an error and return the response version.
fn check_status(
    response: &Response,
    key: Option<&ItemKey>,
    expected: Version,
) -> Result<Option<Version>> {
    match response.status {
        412 => Err(SyncError::RecordConflict {
            key: key.cloned(),
            version: expected,
        }),
        _ if !response.is_success() => Err(SyncError::HttpStatus {
            status: response.status,
            message: response.body_text(),
        }),
        _ => Ok(response.last_modified_version()),
    }
}

fn missing_version() -> SyncError {
    SyncError::MalformedResponse(format!(
        "missing {} header",
        headers::LAST_MODIFIED_VERSION
    ))
}

/// Take the identity echoed by the server.
fn adopt_key(record: &mut Record, key: ItemKey) -> Result<()> {
    record.assign_key(key).map_err(|e| {
        SyncError::MalformedResponse(format!("server echoed a different identity: {e}"))
    })
}
