//! Prefetch queue and producer loop
//!
//! The producer synthesizes and decodes segments ahead of playback into a
//! bounded FIFO. Fetch and play cursors live inside the queue lock, so each
//! push advances `fetch_index` and each pop advances `play_index` in the same
//! critical section. That keeps `play_index <= fetch_index` and
//! `fetch_index - play_index == len() <= capacity` at every observable point.

use crate::audio::pcm;
use crate::audio::types::DecodedAudioBuffer;
use crate::narration::session::PlaybackSession;
use crate::synthesis::SpeechSynthesizer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Queue entry, one per segment in segment order
#[derive(Debug)]
pub enum Prefetched {
    Ready {
        segment_index: usize,
        buffer: DecodedAudioBuffer,
    },
    /// Synthesis or decoding failed; the scheduler steps over it
    Skipped {
        segment_index: usize,
        reason: String,
    },
}

impl Prefetched {
    pub fn segment_index(&self) -> usize {
        match self {
            Prefetched::Ready { segment_index, .. } | Prefetched::Skipped { segment_index, .. } => {
                *segment_index
            }
        }
    }
}

/// Fetch/play cursors at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCursors {
    pub fetch_index: usize,
    pub play_index: usize,
    pub queued: usize,
}

#[derive(Debug)]
struct QueueInner {
    entries: VecDeque<Prefetched>,
    fetch_index: usize,
    play_index: usize,
    closed: bool,
}

/// Bounded single-producer single-consumer queue of prefetched segments
#[derive(Debug)]
pub struct PrefetchQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    space: Notify,
    item: Notify,
}

impl PrefetchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::with_capacity(capacity),
                fetch_index: 0,
                play_index: 0,
                closed: false,
            }),
            capacity: capacity.max(1),
            space: Notify::new(),
            item: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn has_space(&self) -> bool {
        let inner = self.inner.lock();
        !inner.closed && inner.entries.len() < self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn fetch_index(&self) -> usize {
        self.inner.lock().fetch_index
    }

    pub fn play_index(&self) -> usize {
        self.inner.lock().play_index
    }

    pub fn cursors(&self) -> QueueCursors {
        let inner = self.inner.lock();
        QueueCursors {
            fetch_index: inner.fetch_index,
            play_index: inner.play_index,
            queued: inner.entries.len(),
        }
    }

    /// Append an entry and advance `fetch_index`
    ///
    /// Gives the entry back when the queue is full or closed.
    pub fn push(&self, entry: Prefetched) -> Result<usize, Prefetched> {
        let fetch_index = {
            let mut inner = self.inner.lock();
            if inner.closed || inner.entries.len() >= self.capacity {
                return Err(entry);
            }
            inner.entries.push_back(entry);
            inner.fetch_index += 1;
            inner.fetch_index
        };
        self.item.notify_one();
        Ok(fetch_index)
    }

    /// Remove the head entry and advance `play_index`
    pub fn pop(&self) -> Option<Prefetched> {
        let entry = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return None;
            }
            let entry = inner.entries.pop_front()?;
            inner.play_index += 1;
            entry
        };
        self.space.notify_one();
        Some(entry)
    }

    /// Drop queued entries and refuse further pushes and pops
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.entries.clear();
        }
        self.space.notify_waiters();
        self.item.notify_waiters();
    }

    /// Wait until the scheduler frees a slot, at most `poll`
    pub async fn wait_for_space(&self, poll: Duration) {
        let _ = tokio::time::timeout(poll, self.space.notified()).await;
    }

    /// Wait until the producer queues an entry, at most `poll`
    pub async fn wait_for_item(&self, poll: Duration) {
        let _ = tokio::time::timeout(poll, self.item.notified()).await;
    }
}

/// Producer loop: synthesize, decode and queue segments in order
///
/// Runs until every segment is fetched or the session is aborted. A failed
/// segment is queued as `Skipped` so playback can move past it. A synthesis
/// call still in flight at abort time is not interrupted; its result is
/// dropped.
pub(crate) async fn run_producer(
    session: Arc<PlaybackSession>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    poll: Duration,
) {
    let total = session.segment_count();
    let queue = session.queue();

    loop {
        if session.is_aborted() {
            break;
        }
        let fetch_index = queue.fetch_index();
        if fetch_index >= total {
            break;
        }

        if !queue.has_space() {
            tokio::select! {
                _ = session.cancelled() => break,
                _ = queue.wait_for_space(poll) => continue,
            }
        }

        let segment = &session.segments()[fetch_index];
        let result = synthesizer.synthesize(segment).await;

        if session.is_aborted() {
            debug!(
                session_id = %session.id(),
                segment_index = fetch_index,
                "Discarding synthesis result after abort"
            );
            break;
        }

        let entry = match result {
            Ok(payload) => match pcm::decode(&payload) {
                Ok(buffer) => Prefetched::Ready { segment_index: fetch_index, buffer },
                Err(e) => {
                    warn!(
                        session_id = %session.id(),
                        segment_index = fetch_index,
                        "Skipping segment, audio could not be decoded: {}", e
                    );
                    Prefetched::Skipped { segment_index: fetch_index, reason: e.to_string() }
                }
            },
            Err(e) => {
                warn!(
                    session_id = %session.id(),
                    segment_index = fetch_index,
                    "Skipping segment, synthesis failed: {}", e
                );
                Prefetched::Skipped { segment_index: fetch_index, reason: e.to_string() }
            }
        };

        if queue.push(entry).is_err() {
            // Closed by an abort between the check above and the push
            break;
        }
    }

    debug!(
        session_id = %session.id(),
        fetch_index = queue.fetch_index(),
        "Producer finished"
    );
}
