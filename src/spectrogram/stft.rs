use rustfft::num_complex::Complex;

/// Periodic Hann window of length `len`.
pub(super) fn hann_window(len: usize) -> Vec<f32> {
    let n = len.max(1) as f32;
    (0..len)
        .map(|i| {
            let phase = std::f32::consts::TAU * i as f32 / n;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Fill `target` with one windowed frame. `frame` must be exactly one
/// window long; callers frame full windows only.
pub(super) fn fill_windowed(target: &mut [Complex<f32>], frame: &[f32], window: &[f32]) {
    for ((cell, &sample), &win) in target.iter_mut().zip(frame).zip(window) {
        *cell = Complex::new(sanitize(sample) * win, 0.0);
    }
}

fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// One-sided power spectrum of a forward FFT result.
pub(super) fn power_spectrum_into(fft: &[Complex<f32>], out: &mut [f32]) {
    for (bin, slot) in out.iter_mut().enumerate() {
        let c = fft[bin];
        *slot = (c.re * c.re + c.im * c.im).max(0.0);
    }
}
