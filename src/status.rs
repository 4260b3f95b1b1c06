//! Shared per-file status tracking with a broadcast change feed.
//!
//! [`StatusTracker`] is a cheap-to-clone handle over one map from file name
//! to [`StatusRecord`]. Every mutation is a single read-modify-write under
//! the map lock, stamps `last_update` and publishes the updated record on a
//! `tokio::sync::broadcast` channel. Slow subscribers lag and lose the
//! oldest records instead of blocking producers.

use crate::output::{file_name_of, StreamTag};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle stage of one file's pipeline run.
///
/// Declaration order is the progression order; a record never moves to an
/// earlier variant during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Started,
    Splitting,
    Rasterizing,
    SearchingBarCode,
    SearchingText,
    ProcessingFileType,
    CreatingSummary,
    Done,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Started => "Started",
            ItemStatus::Splitting => "Splitting",
            ItemStatus::Rasterizing => "Rasterizing",
            ItemStatus::SearchingBarCode => "Searching barcode",
            ItemStatus::SearchingText => "Searching text",
            ItemStatus::ProcessingFileType => "Processing file type",
            ItemStatus::CreatingSummary => "Creating summary",
            ItemStatus::Done => "Done",
        };
        f.write_str(s)
    }
}

/// Current state of one file, as published on the status feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub file_name: String,
    pub status: ItemStatus,
    pub page_count: usize,
    pub thermal_count: usize,
    pub paper_count: usize,
    pub ignored_count: usize,
    /// Pages that finished analysis so far.
    pub pages_analyzed: usize,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusRecord {
    fn new(file_name: String) -> Self {
        let now = Utc::now();
        Self {
            file_name,
            status: ItemStatus::Started,
            page_count: 0,
            thermal_count: 0,
            paper_count: 0,
            ignored_count: 0,
            pages_analyzed: 0,
            started_at: now,
            last_update: now,
            finished_at: None,
            error: None,
        }
    }

    /// Done, or stopped on an error.
    pub fn is_terminal(&self) -> bool {
        self.status == ItemStatus::Done || self.error.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

struct Inner {
    records: Mutex<HashMap<String, StatusRecord>>,
    sender: broadcast::Sender<StatusRecord>,
}

/// Process-wide status map. Clone to share between tasks.
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<Inner>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusTracker")
            .field("records", &self.lock().len())
            .field("subscribers", &self.inner.sender.receiver_count())
            .finish()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` is how many records a subscriber may fall behind before
    /// the oldest ones are dropped for it.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                sender,
            }),
        }
    }

    /// Tracker key for `file`: its file name, so relocating the directory
    /// does not change identity.
    pub fn key_for(file: &Path) -> String {
        file_name_of(file)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StatusRecord>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomic upsert. `apply` returns whether it changed anything; only
    /// changes are stamped and published.
    fn upsert(&self, file: &Path, apply: impl FnOnce(&mut StatusRecord) -> bool) -> bool {
        let key = Self::key_for(file);
        let mut records = self.lock();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| StatusRecord::new(key));
        if !apply(record) {
            return false;
        }
        record.last_update = Utc::now();
        // Sent under the lock so subscribers see per-key updates in order.
        let _ = self.inner.sender.send(record.clone());
        true
    }

    /// Move `file` to `status`.
    ///
    /// Backward moves are ignored and return `false`. `Started` on a record
    /// that already reached a terminal state begins a fresh run for it.
    pub fn update_status(&self, file: &Path, status: ItemStatus) -> bool {
        self.upsert(file, |record| {
            if status == ItemStatus::Started && record.is_terminal() {
                *record = StatusRecord::new(record.file_name.clone());
                return true;
            }
            if record.is_failed() || status < record.status {
                return false;
            }
            record.status = status;
            if status == ItemStatus::Done {
                record.finished_at = Some(Utc::now());
            }
            true
        })
    }

    pub fn update_page_count(&self, file: &Path, page_count: usize) {
        self.upsert(file, |record| {
            record.page_count = page_count;
            true
        });
    }

    pub fn update_stream_count(&self, file: &Path, stream: StreamTag, count: usize) {
        self.upsert(file, |record| {
            match stream {
                StreamTag::Thermal => record.thermal_count = count,
                StreamTag::Paper => record.paper_count = count,
            }
            true
        });
    }

    pub fn update_ignored_count(&self, file: &Path, count: usize) {
        self.upsert(file, |record| {
            record.ignored_count = count;
            true
        });
    }

    /// Bump the analysed-page counter by one.
    pub fn page_analyzed(&self, file: &Path) {
        self.upsert(file, |record| {
            record.pages_analyzed += 1;
            true
        });
    }

    /// Record a terminal error. The status stays at the stage that failed.
    pub fn mark_failed(&self, file: &Path, error: impl Into<String>) {
        let error = error.into();
        self.upsert(file, move |record| {
            record.error = Some(error);
            record.finished_at = Some(Utc::now());
            true
        });
    }

    pub fn get(&self, file: &Path) -> Option<StatusRecord> {
        self.lock().get(&Self::key_for(file)).cloned()
    }

    /// Point-in-time copy of every record, sorted by file name.
    pub fn snapshot(&self) -> Vec<StatusRecord> {
        let mut records: Vec<StatusRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        records
    }

    /// Records not yet Done and not failed.
    pub fn in_flight(&self) -> usize {
        self.lock().values().filter(|r| !r.is_terminal()).count()
    }

    /// Forget every record.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Forget Done and failed records; returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_terminal());
        before - records.len()
    }

    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Run `callback` for every published record on a background task
    /// until the returned handle is cancelled or dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_update<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&StatusRecord) + Send + Sync + 'static,
    {
        let mut subscription = self.subscribe();
        let task = tokio::spawn(async move {
            while let Some(record) = subscription.recv().await {
                callback(&record);
            }
        });
        CallbackHandle { task: Some(task) }
    }
}

/// A live view of the status feed. Dropping it unsubscribes.
pub struct StatusSubscription {
    receiver: broadcast::Receiver<StatusRecord>,
}

impl StatusSubscription {
    /// Next record, skipping over records lost to lag. `None` once every
    /// tracker handle is gone.
    pub async fn recv(&mut self) -> Option<StatusRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Some(record),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "status subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered record without waiting.
    pub fn try_recv(&mut self) -> Option<StatusRecord> {
        loop {
            match self.receiver.try_recv() {
                Ok(record) => return Some(record),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StatusRecord> + Send + 'static {
        BroadcastStream::new(self.receiver).filter_map(|item| item.ok())
    }

    /// Explicitly stop receiving.
    pub fn unsubscribe(self) {}
}

/// Owns the forwarding task created by [`StatusTracker::on_update`].
pub struct CallbackHandle {
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    pub fn cancel(mut self) {
        self.abort();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn status_order_is_declaration_order() {
        assert!(ItemStatus::Started < ItemStatus::Splitting);
        assert!(ItemStatus::Splitting < ItemStatus::Rasterizing);
        assert!(ItemStatus::SearchingBarCode < ItemStatus::SearchingText);
        assert!(ItemStatus::CreatingSummary < ItemStatus::Done);
    }

    #[test]
    fn keyed_by_file_name() {
        let tracker = StatusTracker::new();
        tracker.update_page_count(Path::new("/a/in/labels.pdf"), 4);
        tracker.update_stream_count(Path::new("/b/labels.pdf"), StreamTag::Thermal, 2);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].file_name, "labels.pdf");
        assert_eq!(snapshot[0].page_count, 4);
        assert_eq!(snapshot[0].thermal_count, 2);
    }

    #[test]
    fn backward_moves_are_ignored() {
        let tracker = StatusTracker::new();
        let file = Path::new("a.pdf");
        assert!(tracker.update_status(file, ItemStatus::Splitting));
        assert!(tracker.update_status(file, ItemStatus::SearchingText));
        assert!(!tracker.update_status(file, ItemStatus::Rasterizing));
        assert_eq!(tracker.get(file).unwrap().status, ItemStatus::SearchingText);

        assert!(tracker.update_status(file, ItemStatus::Done));
        let record = tracker.get(file).unwrap();
        assert!(record.finished_at.is_some());
        assert!(record.is_terminal());
    }

    #[test]
    fn failed_record_keeps_stage() {
        let tracker = StatusTracker::new();
        let file = Path::new("a.pdf");
        tracker.update_status(file, ItemStatus::Splitting);
        tracker.mark_failed(file, "no pages");
        assert!(!tracker.update_status(file, ItemStatus::Done));

        let record = tracker.get(file).unwrap();
        assert_eq!(record.status, ItemStatus::Splitting);
        assert_eq!(record.error.as_deref(), Some("no pages"));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn started_after_terminal_restarts() {
        let tracker = StatusTracker::new();
        let file = Path::new("a.pdf");
        tracker.update_status(file, ItemStatus::Done);
        assert!(tracker.update_status(file, ItemStatus::Started));
        let record = tracker.get(file).unwrap();
        assert_eq!(record.status, ItemStatus::Started);
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn clear_drops_records() {
        let tracker = StatusTracker::new();
        tracker.update_status(Path::new("a.pdf"), ItemStatus::Started);
        tracker.clear();
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn clear_finished_keeps_live_records() {
        let tracker = StatusTracker::new();
        tracker.update_status(Path::new("done.pdf"), ItemStatus::Done);
        tracker.update_status(Path::new("live.pdf"), ItemStatus::SearchingText);
        tracker.mark_failed(Path::new("bad.pdf"), "corrupt");

        assert_eq!(tracker.clear_finished(), 2);
        let names: Vec<String> = tracker.snapshot().into_iter().map(|r| r.file_name).collect();
        assert_eq!(names, vec!["live.pdf"]);
    }

    #[tokio::test]
    async fn subscriber_sees_updates_in_order() {
        let tracker = StatusTracker::new();
        let mut sub = tracker.subscribe();
        let file = Path::new("a.pdf");

        tracker.update_status(file, ItemStatus::Splitting);
        tracker.update_page_count(file, 3);
        tracker.update_status(file, ItemStatus::Started); // ignored, not published

        let first = sub.recv().await.unwrap();
        assert_eq!(first.status, ItemStatus::Splitting);
        let second = sub.recv().await.unwrap();
        assert_eq!(second.page_count, 3);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_producer() {
        let tracker = StatusTracker::with_capacity(2);
        let mut sub = tracker.subscribe();
        let file = Path::new("a.pdf");
        for n in 0..10 {
            tracker.update_page_count(file, n);
        }
        // oldest dropped, newest retained
        let mut last = None;
        while let Some(record) = sub.try_recv() {
            last = Some(record.page_count);
        }
        assert_eq!(last, Some(9));
    }

    #[tokio::test]
    async fn concurrent_upserts_are_not_lost() {
        let tracker = StatusTracker::new();
        let file = PathBuf::from("shared.pdf");
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let tracker = tracker.clone();
            let file = file.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    tracker.page_analyzed(&file);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(tracker.get(&file).unwrap().pages_analyzed, 400);
    }

    #[tokio::test]
    async fn callback_handle_stops_delivery() {
        let tracker = StatusTracker::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handle = tracker.on_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.is_active());

        tracker.update_status(Path::new("a.pdf"), ItemStatus::Splitting);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        handle.cancel();
        tokio::task::yield_now().await;
        tracker.update_status(Path::new("a.pdf"), ItemStatus::Done);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_yields_records() {
        let tracker = StatusTracker::new();
        let stream = tracker.subscribe().into_stream();
        tokio::pin!(stream);
        tracker.update_status(Path::new("x.pdf"), ItemStatus::Splitting);
        let record = stream.next().await.unwrap();
        assert_eq!(record.file_name, "x.pdf");
    }
}
