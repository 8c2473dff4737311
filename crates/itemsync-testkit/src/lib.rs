//! # itemsync testkit
//!
//! Testing utilities for itemsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`MemoryRemote`](itemsync_sync::transport::memory::MemoryRemote)
//!   with deterministic keys and recorded events
//! - **Generators**: Proptest strategies for keys and record sets
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use itemsync_testkit::generators::record_set;
//!
//! proptest! {
//!     #[test]
//!     fn keys_are_unique(records in record_set(20)) {
//!         let mut keys: Vec<_> = records.iter().map(|r| r.key().cloned()).collect();
//!         keys.dedup();
//!         prop_assert_eq!(keys.len(), records.len());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust
//! use itemsync_testkit::fixtures::{books, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let sync = fixture.coordinator(50);
//! assert_eq!(books(3).len(), 3);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{RecordingSink, SequentialKeys, TestFixture};
pub use generators::{record_set, records_from_params, RecordParams};
