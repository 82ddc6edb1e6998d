//! Decoded waveform types and mixdown helpers.

use serde::Deserialize;

/// Decoded PCM audio as produced by the acquirer: interleaved signed 16-bit
/// samples plus channel count and sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Interleaved sample data, one `i16` per channel per frame.
    pub samples: Vec<i16>,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// How a multi-channel waveform is reduced to the single signal the
/// spectrogram extractor consumes.
///
/// `First` reproduces the historical behavior of reading channel 0 only;
/// `Mix` averages all channels per frame. The choice is explicit
/// configuration so downstream datasets never depend on an implicit pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Use channel 0 and ignore the rest.
    #[default]
    First,
    /// Average all channels per frame.
    Mix,
}

impl Waveform {
    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds, derived from the frame count.
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate.max(1) as f64
    }

    /// Reduce to a mono `f32` signal in `[-1, 1]` according to `policy`.
    pub fn mono_samples(&self, policy: ChannelPolicy) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        const SCALE: f32 = 1.0 / 32_768.0;
        match policy {
            ChannelPolicy::First => self
                .samples
                .iter()
                .step_by(channels)
                .map(|&s| s as f32 * SCALE)
                .collect(),
            ChannelPolicy::Mix => self
                .samples
                .chunks_exact(channels)
                .map(|frame| {
                    let sum: f32 = frame.iter().map(|&s| s as f32 * SCALE).sum();
                    sum / channels as f32
                })
                .collect(),
        }
    }
}
