//! Acoustic analysis: silence measurement and codec-robust equality
//!
//! Equality is a lossy comparison built for re-encoded uploads: 13
//! mel-frequency cepstral coefficients per frame, averaged across frames,
//! compared by cosine similarity. Only similarity above a strict threshold
//! counts as equal; anything below is reported, never auto-resolved.

use std::f32::consts::PI;
use std::path::Path;
use thiserror::Error;

/// Sample rate every file is brought to before analysis; keeps MFCC frames
/// comparable across differently-encoded sources.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// Mean-RMS floor below which an exported waveform is considered silent
pub const SILENCE_RMS_FLOOR: f32 = 0.001;

/// Cosine-similarity threshold for acoustic equality
pub const EQUALITY_THRESHOLD: f64 = 0.9999;

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
const MEL_FILTERS: usize = 26;
const MFCC_COEFFS: usize = 13;

/// Acoustic analysis errors
#[derive(Debug, Error)]
pub enum AcousticError {
    /// Cannot read or decode the WAV file
    #[error("WAV read error for {path}: {reason}")]
    WavRead { path: String, reason: String },

    /// File decodes to no samples
    #[error("Empty audio: {0}")]
    EmptyAudio(String),
}

/// Read a WAV file into mono f32 samples at the analysis sample rate
pub fn read_mono(path: &Path) -> Result<Vec<f32>, AcousticError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| AcousticError::WavRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AcousticError::WavRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AcousticError::WavRead {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?
        }
    };

    if interleaved.is_empty() {
        return Err(AcousticError::EmptyAudio(path.display().to_string()));
    }

    // Mix down to mono
    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(resample_linear(&mono, spec.sample_rate, ANALYSIS_SAMPLE_RATE))
}

/// Mean root-mean-square amplitude across the whole file
pub fn mean_rms(path: &Path) -> Result<f32, AcousticError> {
    let samples = read_mono(path)?;
    Ok(rms(&samples))
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Mean MFCC vector (13 coefficients) of a WAV file
pub fn mean_mfcc(path: &Path) -> Result<[f64; MFCC_COEFFS], AcousticError> {
    let samples = read_mono(path)?;
    let filters = mel_filterbank();
    let window = hann_window(FRAME_SIZE);

    let mut sums = [0.0f64; MFCC_COEFFS];
    let mut frames = 0usize;
    let mut start = 0;
    while start + FRAME_SIZE <= samples.len() {
        let coeffs = frame_mfcc(&samples[start..start + FRAME_SIZE], &window, &filters);
        for (sum, c) in sums.iter_mut().zip(coeffs) {
            *sum += c;
        }
        frames += 1;
        start += HOP_SIZE;
    }

    if frames == 0 {
        // Short file: analyze the whole thing zero-padded to one frame
        let mut padded = samples;
        padded.resize(FRAME_SIZE, 0.0);
        let coeffs = frame_mfcc(&padded, &window, &filters);
        return Ok(coeffs);
    }

    for sum in sums.iter_mut() {
        *sum /= frames as f64;
    }
    Ok(sums)
}

/// Codec-robust equality of two WAV files: cosine similarity of mean MFCC
/// vectors above the strict threshold.
pub fn acoustic_equal(a: &Path, b: &Path) -> Result<bool, AcousticError> {
    let (va, vb) = (mean_mfcc(a)?, mean_mfcc(b)?);
    Ok(cosine_similarity(&va, &vb) > EQUALITY_THRESHOLD)
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return if norm_a == norm_b { 1.0 } else { 0.0 };
    }
    dot / (norm_a * norm_b)
}

fn frame_mfcc(frame: &[f32], window: &[f32], filters: &[Vec<f32>]) -> [f64; MFCC_COEFFS] {
    // Windowed power spectrum
    let mut re: Vec<f32> = frame.iter().zip(window).map(|(s, w)| s * w).collect();
    let mut im = vec![0.0f32; FRAME_SIZE];
    fft_in_place(&mut re, &mut im);
    let bins = FRAME_SIZE / 2 + 1;
    let power: Vec<f32> = (0..bins)
        .map(|i| (re[i] * re[i] + im[i] * im[i]) / FRAME_SIZE as f32)
        .collect();

    // Log mel energies
    let mut log_mel = [0.0f64; MEL_FILTERS];
    for (m, filter) in filters.iter().enumerate() {
        let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
        log_mel[m] = (energy.max(1e-10) as f64).ln();
    }

    // DCT-II down to the cepstral coefficients
    let mut coeffs = [0.0f64; MFCC_COEFFS];
    for (k, coeff) in coeffs.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for (m, &e) in log_mel.iter().enumerate() {
            acc += e * (PI as f64 * k as f64 * (m as f64 + 0.5) / MEL_FILTERS as f64).cos();
        }
        *coeff = acc;
    }
    coeffs
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

/// Iterative radix-2 FFT; FRAME_SIZE is a power of two
fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0f32, 0.0f32);
            for k in 0..len / 2 {
                let (a, b) = (start + k, start + k + len / 2);
                let t_re = re[b] * cur_re - im[b] * cur_im;
                let t_im = re[b] * cur_im + im[b] * cur_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over the power-spectrum bins
fn mel_filterbank() -> Vec<Vec<f32>> {
    let bins = FRAME_SIZE / 2 + 1;
    let f_max = ANALYSIS_SAMPLE_RATE as f32 / 2.0;
    let mel_max = hz_to_mel(f_max);

    let points: Vec<f32> = (0..MEL_FILTERS + 2)
        .map(|i| {
            let mel = mel_max * i as f32 / (MEL_FILTERS + 1) as f32;
            mel_to_hz(mel) / f_max * (bins - 1) as f32
        })
        .collect();

    (0..MEL_FILTERS)
        .map(|m| {
            let (left, center, right) = (points[m], points[m + 1], points[m + 2]);
            (0..bins)
                .map(|b| {
                    let b = b as f32;
                    if b > left && b < center {
                        (b - left) / (center - left)
                    } else if b >= center && b < right {
                        (right - b) / (right - center)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Linear-interpolation resample; exact enough for comparison features
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, samples: &[f32], rate: u32) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn sine(freq: f32, rate: u32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn silent_file_is_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "silent.wav", &vec![0.0; 22_050], 22_050);
        assert!(mean_rms(&path).unwrap() < SILENCE_RMS_FLOOR);
    }

    #[test]
    fn tone_is_above_floor() {
        let dir = tempfile::tempdir().unwrap();
        let samples = sine(440.0, 22_050, 0.5, 0.5);
        let path = write_wav(dir.path(), "tone.wav", &samples, 22_050);
        assert!(mean_rms(&path).unwrap() > SILENCE_RMS_FLOOR);
    }

    #[test]
    fn acoustic_equal_is_reflexive() {
        let dir = tempfile::tempdir().unwrap();
        let samples = sine(440.0, 22_050, 0.5, 0.5);
        let path = write_wav(dir.path(), "x.wav", &samples, 22_050);
        assert!(acoustic_equal(&path, &path).unwrap());
    }

    #[test]
    fn resample_survives_equality() {
        // Same tone written at two sample rates: tolerance for re-encoding
        let dir = tempfile::tempdir().unwrap();
        let a = write_wav(dir.path(), "a.wav", &sine(440.0, 22_050, 0.5, 0.5), 22_050);
        let b = write_wav(dir.path(), "b.wav", &sine(440.0, 44_100, 0.5, 0.5), 44_100);
        assert!(acoustic_equal(&a, &b).unwrap());
    }

    #[test]
    fn different_content_is_unequal() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wav(dir.path(), "a.wav", &sine(440.0, 22_050, 0.5, 0.5), 22_050);
        // Chirped mix, spectrally distinct from a pure tone
        let mix: Vec<f32> = sine(220.0, 22_050, 0.5, 0.4)
            .iter()
            .zip(sine(3_000.0, 22_050, 0.5, 0.4))
            .map(|(x, y)| x + y)
            .collect();
        let z = write_wav(dir.path(), "z.wav", &mix, 22_050);
        assert!(!acoustic_equal(&a, &z).unwrap());
    }

    #[test]
    fn cosine_similarity_bounds() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-12);
        let w = [-1.0, -2.0, -3.0];
        assert!((cosine_similarity(&v, &w) + 1.0).abs() < 1e-12);
    }
}
