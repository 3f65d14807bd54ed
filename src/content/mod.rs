//! Drill content and the tiered content buffer
//!
//! This module provides:
//! - Stitch and question models
//! - The bundled offline dataset and the persisted content cache
//! - Batched network fetch of stitches
//! - The single synthetic-fallback generator
//! - `ContentResolver`, which ties the tiers together and keeps a
//!   look-ahead window warm

pub mod bundled;
pub mod cache_store;
pub mod fallback;
pub mod fetch;
pub mod models;
pub mod resolver;

pub use bundled::BundledDataset;
pub use cache_store::{CacheStoreError, ContentCacheStore};
pub use fetch::{ContentFetcher, FetchError, HttpContentFetcher};
pub use models::*;
pub use resolver::{
    ContentResolver, ContentResolverBuilder, PrefetchHandle, PrefetchReport, ResolverStats,
};
