//! Remote paginated workout API contract.
//!
//! Cursors are opaque strings equal to a record `id`. The engine holds the
//! source as `Arc<dyn RemoteSource>`, so calls return boxed futures.

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::PageResult;

/// Paginated fetch calls consumed by the engine.
///
/// Implementations map every failure into [`crate::SyncError`]; the engine
/// treats all failures alike and applies its own timeout around each call.
pub trait RemoteSource: Send + Sync {
    /// First page, most recent records first.
    fn fetch_initial(&self, page_size: u32) -> BoxFuture<'_, Result<PageResult>>;

    /// Records newer than `before_cursor`, or the latest page when `None`.
    fn fetch_newer<'a>(
        &'a self,
        before_cursor: Option<&'a str>,
        page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>>;

    /// Records older than `after_cursor`.
    fn fetch_older<'a>(
        &'a self,
        after_cursor: &'a str,
        page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>>;
}
