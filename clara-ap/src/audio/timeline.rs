//! Sample-clock mixing timeline
//!
//! Voices are placed at absolute output frames and summed as the output
//! renders. A voice's playback rate works like a varispeed tape: it scales
//! the read step through the source, so pitch follows speed.

use crate::audio::output::{ScheduledSource, SourceId};

struct Voice {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
    /// Fractional read position in source samples
    position: f64,
    /// Source samples advanced per output frame
    step: f64,
}

impl Voice {
    fn next_sample(&mut self) -> Option<f32> {
        let index = self.position as usize;
        let current = *self.samples.get(index)?;
        let frac = (self.position - index as f64) as f32;
        let sample = match self.samples.get(index + 1) {
            Some(&next) => current + (next - current) * frac,
            None => current,
        };
        self.position += self.step;
        Some(sample)
    }

    fn is_finished(&self) -> bool {
        self.position as usize >= self.samples.len()
    }
}

/// Mixer state shared between the scheduling side and the render callback
pub struct Timeline {
    output_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    next_id: u64,
}

impl Timeline {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate: output_rate.max(1),
            frames_rendered: 0,
            voices: Vec::new(),
            next_id: 0,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Seconds of output rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.output_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Place a source; start times in the past start immediately
    pub fn add(&mut self, source: ScheduledSource) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;

        let requested = (source.start_at.max(0.0) * self.output_rate as f64).round() as u64;
        let rate = if source.playback_rate.is_finite() && source.playback_rate > 0.0 {
            source.playback_rate as f64
        } else {
            1.0
        };
        let step = rate * source.buffer.sample_rate() as f64 / self.output_rate as f64;

        self.voices.push(Voice {
            id,
            samples: source.buffer.into_samples(),
            start_frame: requested.max(self.frames_rendered),
            position: 0.0,
            step,
        });
        id
    }

    /// Drop a voice; false if it already finished or never existed
    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Mix the next `out.len() / channels` frames into `out`
    ///
    /// The mono mix is copied to every channel and clamped to [-1.0, 1.0].
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        out.iter_mut().for_each(|s| *s = 0.0);

        for voice in &mut self.voices {
            let offset = voice.start_frame.saturating_sub(self.frames_rendered);
            if offset >= frames as u64 {
                continue;
            }
            for frame in offset as usize..frames {
                let Some(sample) = voice.next_sample() else {
                    break;
                };
                for value in &mut out[frame * channels..(frame + 1) * channels] {
                    *value += sample;
                }
            }
        }

        out.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
        self.voices.retain(|v| !v.is_finished());
        self.frames_rendered += frames as u64;
    }

    /// Write silence without advancing the clock (suspended output)
    pub fn render_silence(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::DecodedAudioBuffer;

    fn source(samples: Vec<f32>, rate: u32, start_at: f64, playback_rate: f32) -> ScheduledSource {
        ScheduledSource {
            segment_index: 0,
            buffer: DecodedAudioBuffer::new(samples, rate),
            start_at,
            playback_rate,
        }
    }

    #[test]
    fn test_voice_starts_at_scheduled_frame() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.5; 3], 10, 0.2, 1.0));

        let mut out = vec![0.0; 6];
        timeline.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(timeline.active_voices(), 0);
        assert!((timeline.current_time() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_back_to_back_voices_are_gapless() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.25; 2], 10, 0.0, 1.0));
        timeline.add(source(vec![-0.25; 2], 10, 0.2, 1.0));

        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1);
        assert_eq!(out, vec![0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn test_double_rate_halves_length() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.0, 0.2, 0.4, 0.6], 10, 0.0, 2.0));

        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1);
        assert_eq!(&out[..2], &[0.0, 0.4]);
        assert_eq!(&out[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_half_rate_interpolates() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.0, 0.4], 10, 0.0, 0.5));

        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.2).abs() < 1e-6);
        assert!((out[2] - 0.4).abs() < 1e-6);
        assert!((out[3] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_duplicates_and_clamps() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.8], 10, 0.0, 1.0));
        timeline.add(source(vec![0.8], 10, 0.0, 1.0));

        let mut out = vec![0.0; 2];
        timeline.render(&mut out, 2);
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn test_remove_reports_finished_sources() {
        let mut timeline = Timeline::new(10);
        let id = timeline.add(source(vec![0.1; 2], 10, 0.0, 1.0));
        let pending = timeline.add(source(vec![0.1; 2], 10, 5.0, 1.0));

        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1);

        assert!(!timeline.remove(id));
        assert!(timeline.remove(pending));
        assert_eq!(timeline.active_voices(), 0);
    }

    #[test]
    fn test_past_start_is_moved_to_now() {
        let mut timeline = Timeline::new(10);
        let mut out = vec![0.0; 5];
        timeline.render(&mut out, 1);

        timeline.add(source(vec![0.3], 10, 0.0, 1.0));
        timeline.render(&mut out, 1);
        assert_eq!(out[0], 0.3);
    }

    #[test]
    fn test_silence_keeps_clock_frozen() {
        let mut timeline = Timeline::new(10);
        timeline.add(source(vec![0.5; 2], 10, 0.0, 1.0));

        let mut out = vec![1.0; 4];
        timeline.render_silence(&mut out);
        assert_eq!(out, vec![0.0; 4]);
        assert_eq!(timeline.frames_rendered(), 0);
        assert_eq!(timeline.active_voices(), 1);

        timeline.render(&mut out, 1);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
    }
}
