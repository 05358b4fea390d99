//! Audio output abstraction
//!
//! An output owns a clock and accepts decoded buffers scheduled at absolute
//! times on that clock. The narration scheduler only talks to this trait;
//! the cpal device and the virtual output implement it.

use crate::audio::types::DecodedAudioBuffer;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle of a scheduled source, unique per output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceId(pub u64);

/// Output lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    /// Clock advancing, scheduled sources audible
    Running,
    /// Clock frozen until `resume()` succeeds
    Suspended,
    /// Released or failed; cannot be used again
    Closed,
}

/// A buffer placed on the output timeline
#[derive(Debug)]
pub struct ScheduledSource {
    /// Narration segment the buffer belongs to
    pub segment_index: usize,
    pub buffer: DecodedAudioBuffer,
    /// Output clock time (seconds) playback starts at
    pub start_at: f64,
    /// Varispeed factor; 1.0 plays at the buffer's own rate
    pub playback_rate: f32,
}

/// Real-time audio output with its own clock
pub trait AudioOutput: Send + Sync {
    /// Seconds elapsed on the output clock
    fn current_time(&self) -> f64;

    fn status(&self) -> OutputStatus;

    /// Restart a suspended clock
    fn resume(&self) -> Result<()>;

    /// Queue a buffer at an absolute clock time
    fn schedule(&self, source: ScheduledSource) -> Result<SourceId>;

    /// Stop a source now
    ///
    /// Fails for sources that already finished or were stopped; callers
    /// doing best-effort cleanup ignore the error.
    fn stop_source(&self, id: SourceId) -> Result<()>;

    /// Release the underlying resources
    fn close(&self) -> Result<()>;

    /// Rate the output renders at (Hz)
    fn sample_rate(&self) -> u32;
}

type OutputFactory = Box<dyn Fn() -> Result<Arc<dyn AudioOutput>> + Send + Sync>;

/// Lazily created output owned by one narrating surface
///
/// The output is opened on first `acquire()`, reused by every later session,
/// and closed by `release()`. An output found closed (device lost) is
/// replaced on the next `acquire()`.
pub struct OutputContext {
    factory: OutputFactory,
    slot: Mutex<Option<Arc<dyn AudioOutput>>>,
}

impl OutputContext {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn AudioOutput>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            slot: Mutex::new(None),
        }
    }

    /// Context around an already-open output
    pub fn with_output(output: Arc<dyn AudioOutput>) -> Self {
        Self::new(move || Ok(Arc::clone(&output)))
    }

    /// Current output, opening one if needed
    pub fn acquire(&self) -> Result<Arc<dyn AudioOutput>> {
        let mut slot = self.slot.lock();

        if let Some(output) = slot.as_ref() {
            if output.status() != OutputStatus::Closed {
                return Ok(Arc::clone(output));
            }
            warn!("Audio output was closed, reopening");
        }

        let output = (self.factory)()
            .map_err(|e| Error::OutputUnavailable(format!("Failed to open audio output: {}", e)))?;
        info!(sample_rate = output.sample_rate(), "Audio output acquired");
        *slot = Some(Arc::clone(&output));
        Ok(output)
    }

    /// Output if one is open
    pub fn current(&self) -> Option<Arc<dyn AudioOutput>> {
        self.slot.lock().clone()
    }

    pub fn is_acquired(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Close and forget the output; idempotent
    pub fn release(&self) -> Result<()> {
        let output = self.slot.lock().take();
        match output {
            Some(output) => {
                debug!("Releasing audio output");
                output.close()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::virtual_output::VirtualOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn same(a: &Arc<dyn AudioOutput>, b: &Arc<dyn AudioOutput>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_is_lazy_and_reused() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let context = OutputContext::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(VirtualOutput::new()) as Arc<dyn AudioOutput>)
        });

        assert!(!context.is_acquired());
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        let first = context.acquire().unwrap();
        let second = context.acquire().unwrap();
        assert!(same(&first, &second));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent_and_closes() {
        let output = Arc::new(VirtualOutput::new());
        let context = OutputContext::with_output(output.clone());

        context.acquire().unwrap();
        context.release().unwrap();
        context.release().unwrap();

        assert_eq!(output.status(), OutputStatus::Closed);
        assert!(!context.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_output_is_replaced() {
        let context = OutputContext::new(|| Ok(Arc::new(VirtualOutput::new()) as Arc<dyn AudioOutput>));
        let first = context.acquire().unwrap();
        first.close().unwrap();

        let second = context.acquire().unwrap();
        assert!(!same(&first, &second));
        assert_eq!(second.status(), OutputStatus::Running);
    }

    #[test]
    fn test_factory_failure_is_output_unavailable() {
        let context = OutputContext::new(|| Err(Error::AudioOutput("no device".into())));
        assert!(matches!(context.acquire(), Err(Error::OutputUnavailable(_))));
    }
}
