//! # Canonical Collection
//!
//! The ordered, deduplicated record list owned by the engine and the merge
//! algorithm shared by every operation.
//!
//! Records are kept sorted descending by `end_time` (most recent first) and are
//! unique on `id`. Cursors are never stored: [`CanonicalCollection::pagination`]
//! derives them from the first and last record, so they cannot go stale
//! relative to the collection they describe.
//!
//! Merging is pure and synchronous. It never suspends, which lets the engine run
//! it under a plain mutex without readers observing a half-merged list.

use std::collections::HashSet;

use crate::types::{CachedPaginationInfo, PageResult, PaginationState, Record};

/// Where a fetched page sits relative to the records already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// First page of a cold start; replaces an empty collection
    Initial,
    /// Newer records, prepended
    Head,
    /// Older records, appended
    Tail,
}

/// Outcome of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Ids that were not present before the merge
    pub added: usize,
    /// Collection size after the merge
    pub total: usize,
}

/// Ordered, deduplicated record list plus pagination flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalCollection {
    records: Vec<Record>,
    has_more_older: bool,
    has_newer_available: bool,
}

impl CanonicalCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a collection from cached parts.
    ///
    /// Cached records are normalized (first-seen wins, sorted) in case the
    /// cache was written by an older build. Flags come from `info` when present;
    /// without it nothing older is assumed to exist.
    pub fn from_cached(records: Vec<Record>, info: Option<&CachedPaginationInfo>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let mut records: Vec<Record> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        sort_newest_first(&mut records);

        let (has_more_older, has_newer_available) = match info {
            Some(info) if !records.is_empty() => (info.has_more_older, info.has_newer_available),
            _ => (false, false),
        };

        Self {
            records,
            has_more_older,
            has_newer_available,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn newest_id(&self) -> Option<&str> {
        self.records.first().map(|r| r.id.as_str())
    }

    pub fn oldest_id(&self) -> Option<&str> {
        self.records.last().map(|r| r.id.as_str())
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn has_newer_available(&self) -> bool {
        self.has_newer_available
    }

    /// Cursor state derived from the current records.
    pub fn pagination(&self) -> PaginationState {
        PaginationState {
            newest_id: self.newest_id().map(str::to_string),
            oldest_id: self.oldest_id().map(str::to_string),
            has_more_older: self.has_more_older,
            has_newer_available: self.has_newer_available,
        }
    }

    /// Merge a fetched page into the collection.
    ///
    /// 1. Concatenate page and existing records in `direction` order.
    /// 2. Deduplicate by id. The fetched copy replaces an existing copy;
    ///    within the page the first occurrence wins.
    /// 3. Stable sort descending by `end_time`.
    /// 4. Update the flags the page speaks for.
    ///
    /// Merging the same page twice yields the same collection as merging it once.
    pub fn merge_page(&mut self, page: &PageResult, direction: MergeDirection) -> MergeReport {
        let mut fetched_ids: HashSet<String> = HashSet::with_capacity(page.records.len());
        let fetched: Vec<Record> = page
            .records
            .iter()
            .filter(|r| fetched_ids.insert(r.id.clone()))
            .cloned()
            .collect();

        let added = {
            let existing: HashSet<&str> = self.records.iter().map(|r| r.id.as_str()).collect();
            fetched
                .iter()
                .filter(|r| !existing.contains(r.id.as_str()))
                .count()
        };

        let retained = std::mem::take(&mut self.records)
            .into_iter()
            .filter(|r| !fetched_ids.contains(&r.id));

        let mut merged: Vec<Record> = match direction {
            MergeDirection::Initial | MergeDirection::Head => fetched.into_iter().chain(retained).collect(),
            MergeDirection::Tail => retained.chain(fetched).collect(),
        };
        sort_newest_first(&mut merged);
        self.records = merged;

        match direction {
            MergeDirection::Initial => {
                self.has_more_older = page.has_more && !self.records.is_empty();
                self.has_newer_available = page.has_newer;
            }
            MergeDirection::Head => {
                self.has_newer_available = page.has_newer;
            }
            MergeDirection::Tail => {
                // A page that brought nothing new cannot move the cursor, so
                // asking again would return the same page forever.
                self.has_more_older = page.has_more && added > 0;
            }
        }

        MergeReport {
            added,
            total: self.records.len(),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.has_more_older = false;
        self.has_newer_available = false;
    }
}

fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.end_time.cmp(&a.end_time));
}
