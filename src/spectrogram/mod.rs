//! Log-mel spectrogram extraction.
//!
//! Deterministic, fixed-parameter transform from a decoded waveform to a
//! 64-band log-mel array. Framing takes full analysis windows only: a
//! waveform with `S` samples yields `floor((S - 1024) / 256) + 1` frames,
//! and anything shorter than one window is an extraction failure rather
//! than an empty artifact.

/// Number of mel bands per frame.
pub const MEL_BANDS: usize = 64;
/// Analysis window (FFT) size in samples.
pub const STFT_N_FFT: usize = 1024;
/// Hop between successive windows in samples.
pub const STFT_HOP: usize = 256;
/// Lower edge of the mel filter bank in Hz.
pub const MEL_FMIN_HZ: f32 = 125.0;
/// Upper edge of the mel filter bank in Hz.
pub const MEL_FMAX_HZ: f32 = 7_500.0;

mod mel;
mod stft;

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

use crate::waveform::{ChannelPolicy, Waveform};
use mel::MelBank;
use stft::{fill_windowed, hann_window, power_spectrum_into};

/// Immutable 2-D array of log-mel energies, stored frame-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    values: Vec<f32>,
    frames: usize,
}

impl Spectrogram {
    /// Number of mel bands (rows).
    pub fn mel_bands(&self) -> usize {
        MEL_BANDS
    }

    /// Number of time frames (columns).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Flat values, frame-major: `values()[frame * MEL_BANDS + band]`.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Energy in dB for one (band, frame) cell. External consumers read
    /// `values()` with the documented frame-major layout instead.
    pub(crate) fn value(&self, band: usize, frame: usize) -> f32 {
        assert!(band < MEL_BANDS, "band {band} out of range");
        assert!(frame < self.frames, "frame {frame} out of range");
        self.values[frame * MEL_BANDS + band]
    }
}

/// Errors that may occur during extraction. All of them are entry-local.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The waveform does not fill a single analysis window.
    #[error("Waveform too short for one analysis window: {samples} samples, need {STFT_N_FFT}")]
    TooShort {
        /// Mono sample count after mixdown.
        samples: usize,
    },
}

/// Fixed-parameter extractor. Construction plans the FFT once; `extract`
/// is a pure function of the waveform samples and the configured
/// channel policy.
pub struct SpectrogramExtractor {
    policy: ChannelPolicy,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrogramExtractor {
    /// Build an extractor using `policy` for channel reduction.
    pub fn new(policy: ChannelPolicy) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            policy,
            window: hann_window(STFT_N_FFT),
            fft: planner.plan_fft_forward(STFT_N_FFT),
        }
    }

    /// Compute the log-mel spectrogram of `waveform`.
    pub fn extract(&self, waveform: &Waveform) -> Result<Spectrogram, ExtractError> {
        let samples = waveform.mono_samples(self.policy);
        if samples.len() < STFT_N_FFT {
            return Err(ExtractError::TooShort {
                samples: samples.len(),
            });
        }
        let frames = (samples.len() - STFT_N_FFT) / STFT_HOP + 1;
        let mel_bank = MelBank::new(waveform.sample_rate, STFT_N_FFT);

        let mut fft_buf = vec![Complex::new(0.0_f32, 0.0); STFT_N_FFT];
        let mut power_buf = vec![0.0_f32; STFT_N_FFT / 2 + 1];
        let mut mel_buf = vec![0.0_f32; MEL_BANDS];
        let mut values = Vec::with_capacity(frames * MEL_BANDS);
        for frame in 0..frames {
            let start = frame * STFT_HOP;
            fill_windowed(&mut fft_buf, &samples[start..start + STFT_N_FFT], &self.window);
            self.fft.process(&mut fft_buf);
            power_spectrum_into(&fft_buf, &mut power_buf);
            mel_bank.apply_into(&power_buf, &mut mel_buf);
            values.extend(mel_buf.iter().map(|&e| power_to_db(e)));
        }
        Ok(Spectrogram { values, frames })
    }
}

/// Convert mel power to decibels with the conventional 1e-10 floor.
fn power_to_db(power: f32) -> f32 {
    const AMIN: f32 = 1e-10;
    let db = 10.0 * power.max(AMIN).log10();
    if db.is_finite() { db } else { 0.0 }
}
