//! In-process priority queue shared by the submission endpoint and the
//! worker pool.
//!
//! Pure priority ordering: lower numeric priority is served first, ties
//! broken by insertion order. Time-gating is not a queue feature — a
//! worker that pops a not-yet-eligible job reinserts it at
//! [`LOW_PRIORITY`] and moves on.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::models::job::Job;

/// Sentinel priority used for delayed reinsertion: back of the line.
pub const LOW_PRIORITY: u8 = 100;

/// Fixed priority class per collect type. Unknown types go to the back.
pub fn priority_for(collect_type: &str) -> u8 {
    match collect_type {
        "ping" => 0,
        "countmax" => 1,
        "rtsp" => 2,
        "ftp" => 3,
        "wectech" => 4,
        "xovis" => 5,
        _ => LOW_PRIORITY,
    }
}

struct Entry {
    /// `(priority, seq)` reversed so the max-heap pops the lowest
    /// priority value first, FIFO within a class.
    key: Reverse<(u8, u64)>,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

#[derive(Default)]
struct QueueInner {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

/// Shared job queue. Enqueue/dequeue are atomic behind a single mutex;
/// contention is negligible at a few dozen workers.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, priority: u8, job: Job) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(Entry {
            key: Reverse((priority, seq)),
            job,
        });
        metrics::gauge!("collector_queue_depth").set(inner.heap.len() as f64);
    }

    /// Non-blocking pop; callers pace their own retry on `None`.
    pub fn try_pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        let entry = inner.heap.pop();
        metrics::gauge!("collector_queue_depth").set(inner.heap.len() as f64);
        entry.map(|e| e.job)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
