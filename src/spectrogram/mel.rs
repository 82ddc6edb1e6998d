use super::{MEL_BANDS, MEL_FMAX_HZ, MEL_FMIN_HZ};

/// Triangular mel filter bank over the power spectrum of one frame.
///
/// Filters are precomputed as sparse (bin, weight) lists covering the
/// configured 125-7500 Hz range on the HTK mel scale.
pub(super) struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(super) fn new(sample_rate: u32, fft_len: usize) -> Self {
        let bins = band_edge_bins(sample_rate, fft_len, MEL_BANDS, MEL_FMIN_HZ, MEL_FMAX_HZ);
        let mut filters = Vec::with_capacity(MEL_BANDS);
        for m in 0..MEL_BANDS {
            let left = bins[m];
            let center = bins[m + 1];
            let right = bins[m + 2].max(center + 1);
            filters.push(triangle(left, center, right));
        }
        Self { filters }
    }

    /// Accumulate filtered power into `out`, one value per mel band.
    pub(super) fn apply_into(&self, power: &[f32], out: &mut [f32]) {
        for (slot, filter) in out.iter_mut().zip(&self.filters) {
            let mut sum = 0.0_f64;
            for &(bin, weight) in filter {
                let p = power.get(bin).copied().unwrap_or(0.0).max(0.0) as f64;
                sum += p * weight as f64;
            }
            *slot = sum as f32;
        }
    }
}

/// FFT bin indices of the `bands + 2` mel-spaced band edges.
fn band_edge_bins(
    sample_rate: u32,
    fft_len: usize,
    bands: usize,
    f_min: f32,
    f_max: f32,
) -> Vec<usize> {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let f_max = f_max.min(nyquist).max(f_min);
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    (0..bands + 2)
        .map(|i| {
            let t = i as f32 / (bands + 1) as f32;
            let hz = mel_to_hz(mel_min + (mel_max - mel_min) * t);
            freq_to_bin(hz, sample_rate, fft_len)
        })
        .collect()
}

fn triangle(left: usize, center: usize, right: usize) -> Vec<(usize, f32)> {
    let mut weights = Vec::new();
    if right <= left {
        return weights;
    }
    for bin in left..=right {
        let w = if bin < center {
            if center == left {
                0.0
            } else {
                (bin as f32 - left as f32) / (center as f32 - left as f32)
            }
        } else if right == center {
            0.0
        } else {
            (right as f32 - bin as f32) / (right as f32 - center as f32)
        };
        if w > 0.0 {
            weights.push((bin, w));
        }
    }
    weights
}

fn freq_to_bin(freq_hz: f32, sample_rate: u32, fft_len: usize) -> usize {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let freq = freq_hz.clamp(0.0, nyquist);
    (((freq * fft_len as f32) / sample_rate.max(1) as f32).floor() as usize).min(fft_len / 2)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0_f32 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0_f32 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}
