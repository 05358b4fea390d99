//! Playback scheduler loop
//!
//! Drains the prefetch queue in order and places each buffer on the output
//! timeline right after the previous one. The speed multiplier is sampled
//! when a buffer is scheduled, so a speed change affects the next buffer
//! and never the one already playing.

use crate::audio::output::{AudioOutput, ScheduledSource};
use crate::narration::prefetch::Prefetched;
use crate::narration::session::PlaybackSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Scheduler timing
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    /// Upper bound on one wait for the next queued buffer
    pub poll: Duration,
    /// How long before the end of the current buffer the next one is placed
    pub splice_overlap: Duration,
}

/// Run the scheduler until every segment is played or skipped, or the
/// session is aborted
pub(crate) async fn run_scheduler(
    session: Arc<PlaybackSession>,
    output: Arc<dyn AudioOutput>,
    timing: SchedulerTiming,
) {
    let total = session.segment_count();
    let queue = session.queue();
    let overlap = timing.splice_overlap.as_secs_f64();
    let mut next_start_time = 0.0f64;

    loop {
        if session.is_aborted() {
            debug!(session_id = %session.id(), "Scheduler stopped by abort");
            return;
        }
        if queue.play_index() >= total {
            break;
        }

        match queue.pop() {
            Some(Prefetched::Ready { segment_index, buffer }) => {
                session.set_buffering(false);

                let speed = session.speed();
                let now = output.current_time();
                let start_at = next_start_time.max(now);
                let duration = buffer.duration_at(speed);

                let scheduled = session.schedule_on(
                    output.as_ref(),
                    ScheduledSource {
                        segment_index,
                        buffer,
                        start_at,
                        playback_rate: speed,
                    },
                );
                match scheduled {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        debug!(session_id = %session.id(), segment_index, "Aborted before scheduling");
                        return;
                    }
                    Err(e) => {
                        session.fail(format!("audio output refused segment {}: {}", segment_index, e));
                        return;
                    }
                }

                next_start_time = start_at + duration;
                session.record_scheduled(segment_index, start_at, duration, speed);
                trace!(
                    session_id = %session.id(),
                    segment_index,
                    start_at,
                    duration,
                    speed,
                    "Segment scheduled"
                );

                // Wake shortly before this buffer ends to place the next one
                let wake_in = Duration::try_from_secs_f64((next_start_time - now - overlap).max(0.0))
                    .unwrap_or(timing.poll);
                tokio::select! {
                    _ = session.cancelled() => return,
                    _ = tokio::time::sleep(wake_in) => {}
                }
            }
            Some(Prefetched::Skipped { segment_index, reason }) => {
                debug!(session_id = %session.id(), segment_index, "Stepping over failed segment");
                session.record_skipped(segment_index, reason);
            }
            None => {
                session.set_buffering(true);
                tokio::select! {
                    _ = session.cancelled() => return,
                    _ = queue.wait_for_item(timing.poll) => {}
                }
            }
        }
    }

    session.finish();
}
