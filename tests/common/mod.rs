//! Shared fixtures: a scripted remote source and record builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use workoutsync::{
    KeyValueStore, PageResult, Record, RemoteSource, Result, SyncConfig, SyncEngine, SyncEvent,
};

/// Install a test logger once per binary.
pub fn init_test_logging() {
    workoutsync::init_logging();
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Workout number `n`; larger numbers are more recent.
pub fn workout(n: i64) -> Record {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = base + chrono::Duration::hours(n);
    Record::new(
        format!("w-{:03}", n),
        end - chrono::Duration::minutes(45),
        end,
        if n % 2 == 0 { "Run" } else { "Ride" },
        2700.0,
    )
    .with_distance(8_000.0 + n as f64)
}

/// Workouts `from..=to`, newest first.
pub fn workouts(from: i64, to: i64) -> Vec<Record> {
    (from..=to).rev().map(workout).collect()
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initial { page_size: u32 },
    Newer(Option<String>),
    Older(String),
}

struct Scripted {
    result: Result<PageResult>,
    delay: Duration,
}

/// Remote source answering from per-call scripts. Unscripted calls return an
/// empty terminal page.
#[derive(Default)]
pub struct FakeRemote {
    initial: Mutex<VecDeque<Scripted>>,
    newer: Mutex<VecDeque<Scripted>>,
    older: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_initial(&self, result: Result<PageResult>) {
        self.push(&self.initial, result, Duration::ZERO);
    }

    pub fn push_newer(&self, result: Result<PageResult>) {
        self.push(&self.newer, result, Duration::ZERO);
    }

    pub fn push_newer_delayed(&self, result: Result<PageResult>, delay: Duration) {
        self.push(&self.newer, result, delay);
    }

    pub fn push_older(&self, result: Result<PageResult>) {
        self.push(&self.older, result, Duration::ZERO);
    }

    pub fn push_older_delayed(&self, result: Result<PageResult>, delay: Duration) {
        self.push(&self.older, result, delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(&self, queue: &Mutex<VecDeque<Scripted>>, result: Result<PageResult>, delay: Duration) {
        queue.lock().unwrap().push_back(Scripted { result, delay });
    }

    fn answer(&self, queue: &Mutex<VecDeque<Scripted>>, call: Call) -> BoxFuture<'static, Result<PageResult>> {
        self.calls.lock().unwrap().push(call);
        let next = queue.lock().unwrap().pop_front();
        async move {
            match next {
                Some(scripted) => {
                    if !scripted.delay.is_zero() {
                        tokio::time::sleep(scripted.delay).await;
                    }
                    scripted.result
                }
                None => Ok(PageResult::empty()),
            }
        }
        .boxed()
    }
}

impl RemoteSource for FakeRemote {
    fn fetch_initial(&self, page_size: u32) -> BoxFuture<'_, Result<PageResult>> {
        self.answer(&self.initial, Call::Initial { page_size })
    }

    fn fetch_newer<'a>(
        &'a self,
        before_cursor: Option<&'a str>,
        _page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>> {
        self.answer(&self.newer, Call::Newer(before_cursor.map(str::to_string)))
    }

    fn fetch_older<'a>(
        &'a self,
        after_cursor: &'a str,
        _page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>> {
        self.answer(&self.older, Call::Older(after_cursor.to_string()))
    }
}

pub fn quiet_config() -> SyncConfig {
    SyncConfig {
        background_refresh: false,
        ..SyncConfig::default()
    }
}

pub fn engine_with(
    remote: Arc<FakeRemote>,
    store: Arc<dyn KeyValueStore>,
    config: SyncConfig,
) -> SyncEngine {
    SyncEngine::with_store(remote, store, config).unwrap()
}

/// Wait for the next event, failing the test after two seconds.
pub async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Ordering, uniqueness and cursor invariants of the engine's collection.
pub fn assert_invariants(engine: &SyncEngine) {
    let records = engine.current_records();
    for pair in records.windows(2) {
        assert!(
            pair[0].end_time >= pair[1].end_time,
            "{} sorted before older {}",
            pair[1].id,
            pair[0].id
        );
    }

    let mut seen = std::collections::HashSet::new();
    for r in &records {
        assert!(seen.insert(r.id.clone()), "duplicate id {}", r.id);
    }

    let pagination = engine.pagination();
    assert_eq!(pagination.newest_id, records.first().map(|r| r.id.clone()));
    assert_eq!(pagination.oldest_id, records.last().map(|r| r.id.clone()));
}
