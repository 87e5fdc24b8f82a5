use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::synthesizer::Comment;
use crate::error::SinkError;
use crate::interfaces::viewer::CommentSink;

const DELIVERY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const SINK_RECOVERY_PAUSE: Duration = Duration::from_secs(5);
const DEPTH_WARN_THRESHOLD: usize = 24;

#[derive(Debug)]
struct QueueEntry {
    comment: Comment,
    release_at: Instant,
}

enum DispatchStep {
    Deliver(QueueEntry),
    WaitUntil(Instant),
    Idle,
}

/// Paces a burst of generated comments into a human-plausible trickle.
/// Entries are strictly FIFO; release times only ever increase along the
/// queue. Handles are cheap clones sharing one queue.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    entries: Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
    gap: Duration,
}

impl DispatchQueue {
    pub fn new(gap: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                entries: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                gap,
            }),
        }
    }

    /// Appends one cycle's comments in a single locked step. The first entry
    /// releases immediately unless older entries are still pending; each
    /// further entry is spaced one gap after the previous.
    pub fn enqueue(&self, comments: Vec<Comment>) {
        if comments.is_empty() {
            return;
        }
        let now = Instant::now();
        let depth = {
            let mut entries = lock(&self.inner.entries);
            let mut release_at = match entries.back() {
                Some(tail) => (tail.release_at + self.inner.gap).max(now),
                None => now,
            };
            for comment in comments {
                entries.push_back(QueueEntry { comment, release_at });
                release_at += self.inner.gap;
            }
            entries.len()
        };
        if depth > DEPTH_WARN_THRESHOLD {
            warn!(depth, "dispatch queue is backing up");
        } else {
            debug!(depth, "comments enqueued");
        }
        self.inner.notify.notify_one();
    }

    pub fn depth(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    /// Runs until cancelled, delivering due entries to the sink in FIFO
    /// order. On shutdown, entries already due are flushed and future-dated
    /// entries are dropped.
    pub async fn run_dispatcher(self, sink: Arc<dyn CommentSink>, shutdown: CancellationToken) {
        loop {
            match self.next_step() {
                DispatchStep::Deliver(entry) => {
                    if !self.deliver(&sink, entry, &shutdown).await {
                        break;
                    }
                }
                DispatchStep::WaitUntil(release_at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(release_at) => {}
                        _ = self.inner.notify.notified() => {}
                        _ = shutdown.cancelled() => {
                            self.flush_due(&sink).await;
                            break;
                        }
                    }
                }
                DispatchStep::Idle => {
                    tokio::select! {
                        _ = self.inner.notify.notified() => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
        info!("dispatcher stopped");
    }

    fn next_step(&self) -> DispatchStep {
        let mut entries = lock(&self.inner.entries);
        let Some(head) = entries.front() else {
            return DispatchStep::Idle;
        };
        if head.release_at <= Instant::now() {
            match entries.pop_front() {
                Some(entry) => DispatchStep::Deliver(entry),
                None => DispatchStep::Idle,
            }
        } else {
            DispatchStep::WaitUntil(head.release_at)
        }
    }

    /// Returns false when shutdown interrupted a failed delivery.
    async fn deliver(
        &self,
        sink: &Arc<dyn CommentSink>,
        entry: QueueEntry,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut last_error: Option<SinkError> = None;
        for attempt in 1..=DELIVERY_ATTEMPTS {
            match sink.append_comment(&entry.comment).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(attempt, "comment sink append failed: {}", e);
                    last_error = Some(e);
                    if attempt < DELIVERY_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }
            }
        }
        // The sink appears to be down. Keep the entry at the head so
        // nothing reorders, then pause before trying again.
        if let Some(e) = last_error {
            error!(handle = %entry.comment.handle, "comment delivery failed, re-queueing at head: {}", e);
        }
        lock(&self.inner.entries).push_front(entry);
        tokio::select! {
            _ = tokio::time::sleep(SINK_RECOVERY_PAUSE) => true,
            _ = shutdown.cancelled() => false,
        }
    }

    async fn flush_due(&self, sink: &Arc<dyn CommentSink>) {
        let now = Instant::now();
        loop {
            let entry = {
                let mut entries = lock(&self.inner.entries);
                match entries.front() {
                    Some(head) if head.release_at <= now => entries.pop_front(),
                    _ => None,
                }
            };
            let Some(entry) = entry else { break };
            if let Err(e) = sink.append_comment(&entry.comment).await {
                warn!("flush append failed: {}", e);
                break;
            }
        }
        let dropped = self.depth();
        if dropped > 0 {
            info!(dropped, "unreleased comments discarded at shutdown");
        }
    }
}

fn lock(entries: &Mutex<VecDeque<QueueEntry>>) -> MutexGuard<'_, VecDeque<QueueEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
