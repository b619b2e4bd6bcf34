//! # Waveform Normalization
//!
//! Converts an arbitrary-length raw unsigned-8-bit PCM buffer into the fixed-length
//! centered float waveform the classifier accepts.
//!
//! ## Pipeline:
//! 1. **Byte decode**: each byte is unsigned 8-bit PCM, mapped to `(b - 128) / 128`
//!    (centers at 0, range approx [-1, 1))
//! 2. **Resample**: frequency-domain resampling to exactly `target_len` samples,
//!    preserving spectral content up to the Nyquist frequency of the target rate
//!
//! The resampler truncates or zero-pads the spectrum rather than interpolating in
//! the time domain, so the same input bytes always produce the same output floats.

use crate::error::{AppError, AppResult};
use rustfft::{num_complex::Complex, FftPlanner};

/// Converts raw microphone bytes into fixed-length classifier input.
pub struct WaveformNormalizer {
    target_len: usize,
}

impl WaveformNormalizer {
    pub fn new(target_len: usize) -> Self {
        Self { target_len }
    }

    /// Normalize a raw buffer into exactly `target_len` samples in [-1, 1].
    ///
    /// Fails with `InvalidInput` on an empty buffer; never returns a zero-length
    /// or shorter-than-target waveform.
    pub fn normalize(&self, raw: &[u8]) -> AppResult<Vec<f32>> {
        if raw.is_empty() {
            return Err(AppError::InvalidInput("empty audio buffer".to_string()));
        }

        let centered: Vec<f32> = raw.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect();

        let mut waveform = resample_spectral(&centered, self.target_len);

        // Spectral resampling can overshoot the unit range slightly near sharp
        // transients; the classifier contract requires [-1, 1].
        for sample in &mut waveform {
            *sample = sample.clamp(-1.0, 1.0);
        }

        Ok(waveform)
    }
}

/// Frequency-domain resampling of a real signal to exactly `target_len` samples.
///
/// Forward FFT of the input, truncation (downsampling) or zero-padding
/// (upsampling) of the spectrum with standard Nyquist-bin handling, then inverse
/// FFT at the target length. Output length is exactly `target_len` regardless of
/// input length, including single-sample inputs (which yield a constant signal).
fn resample_spectral(input: &[f32], target_len: usize) -> Vec<f32> {
    let n = input.len();
    let m = target_len;

    if n == m {
        return input.to_vec();
    }

    let mut planner = FftPlanner::<f32>::new();

    let mut spectrum: Vec<Complex<f32>> =
        input.iter().map(|&s| Complex::new(s, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    // Keep the shared band: positive frequencies from the front, negative from
    // the back, so spectral content up to the smaller Nyquist survives.
    let shared = n.min(m);
    let nyq = shared / 2 + 1;

    let mut resized = vec![Complex::new(0.0, 0.0); m];
    resized[..nyq].copy_from_slice(&spectrum[..nyq]);
    if shared > 2 {
        let neg = shared - nyq;
        resized[m - neg..].copy_from_slice(&spectrum[n - neg..]);
    }

    // Even shared length leaves an ambiguous Nyquist bin
    if shared % 2 == 0 {
        let half = shared / 2;
        if m < n {
            // Downsampling: fold the negative-Nyquist energy into the kept bin
            let folded = spectrum[n - half];
            resized[half] += folded;
        } else {
            // Upsampling: split the Nyquist bin across +N/2 and -N/2
            resized[half] *= 0.5;
            resized[m - half] = resized[half];
        }
    }

    planner.plan_fft_inverse(m).process(&mut resized);

    // rustfft's inverse is unnormalized (scale 1/m); combined with the length
    // ratio m/n the net factor is 1/n.
    let scale = 1.0 / n as f32;
    resized.iter().map(|c| c.re * scale).collect()
}
