//! End-to-end scenarios: a Library against an in-memory remote.

use std::sync::Arc;

use anyhow::{bail, Result};
use proptest::prelude::*;

use itemsync::store::{DurableCache, SqliteCache};
use itemsync::sync::messages::headers;
use itemsync::sync::transport::memory::MemoryRemote;
use itemsync::sync::Response;
use itemsync::{
    CollectionDump, DeleteTarget, Library, LibraryConfig, LibraryError, SyncError, Version,
};
use itemsync_testkit::fixtures::{api_object, book, books, key, note, TestFixture};

fn library(fixture: &TestFixture, chunk_size: usize) -> Result<Library<Arc<MemoryRemote>>> {
    let config = LibraryConfig {
        sync: fixture.config(chunk_size),
        ..LibraryConfig::default()
    };
    Ok(Library::new(Arc::clone(&fixture.remote), config)?
        .with_key_generator(fixture.keys.clone())
        .with_event_sink(fixture.events.clone()))
}

fn sync_error(err: LibraryError) -> Result<SyncError> {
    match err {
        LibraryError::Sync(e) => Ok(e),
        other => bail!("expected a sync error, got {other}"),
    }
}

#[tokio::test]
async fn test_second_chunk_failure_keeps_first_chunk() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let fixture = TestFixture::new();
    fixture.remote.fail_request(2).await;
    let mut library = library(&fixture, 50)?;

    let err = sync_error(library.write(books(120)).await.unwrap_err())?;

    assert_eq!(err.written().len(), 50);
    assert!(matches!(err.root(), SyncError::Transport(_)));
    assert_eq!(library.collection().index().len(), 50);
    assert_eq!(fixture.remote.requests().await.len(), 2);
    assert_eq!(fixture.remote.item_count().await, 50);
    assert_eq!(library.version(), Version(1));

    // Records of the failed and unsent chunks never reached the index.
    assert!(library.get("T0000050").is_some());
    assert!(library.get("T0000051").is_none());
    Ok(())
}

#[tokio::test]
async fn test_flush_retains_only_rejected_entry() -> Result<()> {
    let fixture = TestFixture::new();
    fixture
        .remote
        .script_response(
            Response::new(200)
                .with_header(headers::LAST_MODIFIED_VERSION, 12)
                .with_body(
                    r#"{"success":{"0":"ABCD1234"},"failed":{"2":{"code":409,"message":"conflict"}}}"#,
                ),
        )
        .await;
    let mut library = library(&fixture, 50)?;
    for record in books(3) {
        library.create_later(record);
    }

    let report = library.flush_unsynced_new().await?;

    assert_eq!(report.created, vec![key("ABCD1234")]);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.failed[0].code, 409);

    let pending = library.collection().pending_new();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.get_str("title"), Some("Book 2"));
    assert_eq!(pending[0].last_error.as_ref().map(|e| e.code), Some(409));

    let created = library.get("ABCD1234").expect("created item indexed");
    assert!(created.is_synced());
    assert_eq!(created.version(), Version(12));
    Ok(())
}

#[tokio::test]
async fn test_single_delete_conflict_keeps_record() -> Result<()> {
    let fixture = TestFixture::new();
    let mut library = library(&fixture, 50)?;

    fixture.remote.seed("BOOK0001", 3, Default::default()).await;
    library.load_data_objects(vec![api_object("BOOK0001", 3, None)])?;

    // Another client edits the item after we read it.
    let mut edited = serde_json::Map::new();
    edited.insert("title".into(), "Edited".into());
    fixture.remote.seed("BOOK0001", 5, edited).await;

    let err = sync_error(library.delete_one("BOOK0001").await.unwrap_err())?;
    assert!(matches!(
        err,
        SyncError::RecordConflict { key: Some(ref k), version: Version(3) } if k.as_str() == "BOOK0001"
    ));
    assert!(library.get("BOOK0001").is_some());
    assert!(fixture.remote.item("BOOK0001").await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_multi_delete_reports_progress() -> Result<()> {
    let fixture = TestFixture::new();
    let mut library = library(&fixture, 50)?;
    let written = library.write(books(120)).await?;
    fixture.events.clear();

    let targets: Vec<DeleteTarget<'_>> = written.iter().map(DeleteTarget::from).collect();
    library.delete(targets, None).await?;

    assert!(library.collection().index().is_empty());
    assert_eq!(fixture.remote.item_count().await, 0);
    assert_eq!(fixture.events.delete_progress(), vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(library.version(), Version(6));
    Ok(())
}

#[tokio::test]
async fn test_children_follow_parent_and_link_back() -> Result<()> {
    let fixture = TestFixture::new();
    let mut library = library(&fixture, 2)?;

    let mut parent = book("Dune");
    parent.notes.push(note("first"));
    parent.notes.push(note("second"));
    let written = library.write(vec![parent]).await?;

    assert_eq!(written.len(), 3);
    assert_eq!(fixture.remote.requests().await.len(), 2);
    let parent_key = written[0].key().expect("parent keyed").clone();
    let children = library.collection().index().children_of(parent_key.as_str());
    assert_eq!(children.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_remote_delete_spares_unsynced_copy() -> Result<()> {
    let fixture = TestFixture::new();
    let mut library = library(&fixture, 50)?;
    library.load_data_objects(vec![api_object("REMOTE01", 4, None)])?;
    library
        .collection_mut()
        .index_mut()
        .insert_or_replace(itemsync::Record::builder("book").key(key("LOCAL001")).build())?;

    assert!(library.remote_delete(&key("REMOTE01")).await?);
    assert!(!library.remote_delete(&key("LOCAL001")).await?);
    assert!(library.get("LOCAL001").is_some());
    Ok(())
}

#[tokio::test]
async fn test_snapshot_and_sqlite_cache_survive_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("items.db");
    let fixture = TestFixture::new();

    let dump_bytes = {
        let cache = Arc::new(SqliteCache::open(&path)?);
        let mut library = library(&fixture, 50)?.with_cache(cache);
        let mut parent = book("Dune");
        parent.attachments.push(book("scan.pdf"));
        library.write(vec![parent]).await?;
        library.snapshot().to_cbor()?
    };

    let mut from_cache = library(&fixture, 50)?.with_cache(Arc::new(SqliteCache::open(&path)?));
    assert_eq!(from_cache.hydrate_from_cache().await?, 2);

    let mut from_dump = library(&fixture, 50)?;
    from_dump.restore(CollectionDump::from_cbor(&dump_bytes)?)?;

    for restored in [&from_cache, &from_dump] {
        let parent = restored.get("T0000001").expect("parent restored");
        assert_eq!(parent.child_keys(), &[key("T0000002")]);
        assert!(parent.is_synced());
    }
    assert_eq!(from_dump.version(), Version(1));

    let reopened = SqliteCache::open(&path)?;
    assert_eq!(reopened.len().await?, 2);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_written_records_keyed_and_versioned(count in 1usize..130, chunk_size in 1usize..60) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let fixture = TestFixture::new();
            let mut library = library(&fixture, chunk_size).unwrap();
            library.write(books(3)).await.unwrap();
            let watermark = library.version();

            let written = library.write(books(count)).await.unwrap();

            prop_assert_eq!(written.len(), count);
            prop_assert_eq!(
                fixture.remote.requests().await.len() - 3usize.div_ceil(chunk_size),
                count.div_ceil(chunk_size)
            );
            for record in &written {
                prop_assert!(record.key().is_some_and(|k| !k.as_str().is_empty()));
                prop_assert!(record.version() >= watermark);
                prop_assert!(record.is_synced());
            }
            prop_assert!(written.windows(2).all(|w| w[0].version() <= w[1].version()));
            prop_assert_eq!(written.last().map(|r| r.version()), Some(library.version()));
            Ok(())
        })?;
    }
}
