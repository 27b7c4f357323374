//! Structural similarity and perceptual hashing.
//!
//! Two independent measures are provided:
//! - a global-window SSIM score used by the live detector to decide whether
//!   the screen content moved on
//! - a 256-bit DCT perceptual hash used by post-processing to find
//!   near-duplicate and excluded slides

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use slides_models::{Frame, PerceptualHash};

use crate::encode::{decode_image, frame_to_image};
use crate::error::{MediaError, MediaResult};
use crate::threshold::{validate_threshold, SsimPreset};

// ============================================================================
// Constants
// ============================================================================

const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Side length the image is reduced to before the DCT.
const DCT_SIZE: usize = 64;
/// Side length of the low-frequency block the hash is built from.
const HASH_BLOCK: usize = 16;

// ============================================================================
// SSIM
// ============================================================================

/// Parameters for frame comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsimConfig {
    /// Scores strictly below this count as a change
    pub threshold: f64,
    /// Shrink both frames before scoring
    pub downsample_enabled: bool,
    pub downsample_width: u32,
    pub downsample_height: u32,
}

impl Default for SsimConfig {
    fn default() -> Self {
        Self {
            threshold: SsimPreset::default().threshold(),
            downsample_enabled: true,
            downsample_width: 480,
            downsample_height: 270,
        }
    }
}

impl SsimConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_preset(self, preset: SsimPreset) -> Self {
        self.with_threshold(preset.threshold())
    }

    pub fn without_downsampling(mut self) -> Self {
        self.downsample_enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_threshold(self.threshold)?;
        if self.downsample_enabled && (self.downsample_width == 0 || self.downsample_height == 0) {
            return Err("downsample dimensions must be non-zero".to_string());
        }
        Ok(())
    }

    fn target_size(&self, a: &Frame, b: &Frame) -> Option<(u32, u32)> {
        if self.downsample_enabled {
            Some((self.downsample_width, self.downsample_height))
        } else if (a.width(), a.height()) != (b.width(), b.height()) {
            Some((a.width(), a.height()))
        } else {
            None
        }
    }
}

/// Luma of one RGBA pixel, rounded to the nearest integer.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}

fn to_gray(image: &RgbaImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        *dst = Luma([luma(src[0], src[1], src[2])]);
    }
    gray
}

/// Grayscale copy of a frame, optionally resized first.
pub fn grayscale(frame: &Frame, size: Option<(u32, u32)>) -> MediaResult<GrayImage> {
    let rgba = frame_to_image(frame)?;
    let rgba = match size {
        Some((w, h)) if (w, h) != rgba.dimensions() => {
            imageops::resize(&rgba, w, h, FilterType::Triangle)
        }
        _ => rgba,
    };
    Ok(to_gray(&rgba))
}

/// SSIM over the whole image treated as a single window.
///
/// Both buffers must have the same length. Identical inputs score exactly 1.0.
pub fn ssim_gray(a: &[u8], b: &[u8]) -> MediaResult<f64> {
    if a.len() != b.len() {
        return Err(MediaError::invalid_image(format!(
            "grayscale buffers differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(MediaError::invalid_image("cannot score empty images"));
    }

    let n = a.len() as f64;
    let (sum_a, sum_b) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(sa, sb), (&x, &y)| (sa + x as f64, sb + y as f64));
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        var_a += da * da;
        var_b += db * db;
        cov += da * db;
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    let numerator = (2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2);
    Ok(numerator / denominator)
}

/// SSIM score between two frames under `config`'s downsampling rules.
pub fn ssim(a: &Frame, b: &Frame, config: &SsimConfig) -> MediaResult<f64> {
    let size = config.target_size(a, b);
    let ga = grayscale(a, size)?;
    let gb = grayscale(b, size)?;
    ssim_gray(ga.as_raw(), gb.as_raw())
}

/// Whether `b` differs enough from `a` to count as different content.
pub fn ssim_changed(a: &Frame, b: &Frame, config: &SsimConfig) -> MediaResult<bool> {
    Ok(ssim(a, b, config)? < config.threshold)
}

// ============================================================================
// Perceptual hash
// ============================================================================

/// `cos((2n+1)kπ / 2N)` for the frequencies the hash keeps.
fn cosine_table() -> Vec<[f64; DCT_SIZE]> {
    let n = DCT_SIZE as f64;
    (0..HASH_BLOCK)
        .map(|k| {
            let mut row = [0.0; DCT_SIZE];
            for (i, v) in row.iter_mut().enumerate() {
                *v = ((2.0 * i as f64 + 1.0) * k as f64 * std::f64::consts::PI / (2.0 * n)).cos();
            }
            row
        })
        .collect()
}

/// Low-frequency DCT-II coefficients of a `DCT_SIZE`² grayscale block, `u` major.
fn dct_low_frequencies(pixels: &[u8]) -> Vec<f64> {
    let cos = cosine_table();
    let scale = |k: usize| if k == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };

    // rows first: r[y][u] = Σx p(x, y)·cos_u(x)
    let mut rows = vec![[0.0f64; HASH_BLOCK]; DCT_SIZE];
    for (y, row) in rows.iter_mut().enumerate() {
        let line = &pixels[y * DCT_SIZE..(y + 1) * DCT_SIZE];
        for (u, out) in row.iter_mut().enumerate() {
            *out = line.iter().zip(cos[u].iter()).map(|(&p, c)| p as f64 * c).sum();
        }
    }

    let norm = 2.0 / DCT_SIZE as f64;
    let mut coeffs = Vec::with_capacity(HASH_BLOCK * HASH_BLOCK);
    for u in 0..HASH_BLOCK {
        for v in 0..HASH_BLOCK {
            let sum: f64 = rows.iter().zip(cos[v].iter()).map(|(r, c)| r[u] * c).sum();
            coeffs.push(norm * scale(u) * scale(v) * sum);
        }
    }
    coeffs
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// 256-bit DCT hash of a decoded image.
///
/// The DC term is dropped, so only 255 bits carry information and the top bit
/// is always zero.
pub fn perceptual_hash(image: &DynamicImage) -> PerceptualHash {
    let small = image.resize_exact(DCT_SIZE as u32, DCT_SIZE as u32, FilterType::Triangle);
    let gray = to_gray(&small.to_rgba8());

    let coeffs = dct_low_frequencies(gray.as_raw());
    let ac = &coeffs[1..];
    let threshold = median(ac);

    PerceptualHash::from_bits(ac.iter().map(|&c| c >= threshold))
}

/// Hash an RGBA frame.
pub fn perceptual_hash_frame(frame: &Frame) -> MediaResult<PerceptualHash> {
    let image = DynamicImage::ImageRgba8(frame_to_image(frame)?);
    Ok(perceptual_hash(&image))
}

/// Hash encoded PNG/JPEG bytes.
pub fn perceptual_hash_encoded(bytes: &[u8]) -> MediaResult<PerceptualHash> {
    Ok(perceptual_hash(&decode_image(bytes)?))
}

/// Number of differing bits between two hashes.
pub fn hamming(a: &PerceptualHash, b: &PerceptualHash) -> u32 {
    a.distance(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, shift: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = (((x + shift) * 255) / width.max(1)) as u8;
                data.extend_from_slice(&[v, (y * 255 / height.max(1)) as u8, 128, 255]);
            }
        }
        Frame::from_rgba(width, height, data).unwrap()
    }

    fn checkerboard(size: u32, cell: u32) -> Frame {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let v = if ((x / cell) + (y / cell)) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::from_rgba(size, size, data).unwrap()
    }

    #[test]
    fn test_identical_frames_never_changed() {
        let frame = gradient(64, 36, 0);
        let config = SsimConfig::default().with_threshold(1.0);
        assert_eq!(ssim(&frame, &frame, &config).unwrap(), 1.0);
        assert!(!ssim_changed(&frame, &frame, &config).unwrap());
    }

    #[test]
    fn test_different_content_is_changed() {
        let a = Frame::solid(64, 36, [255, 255, 255, 255]).unwrap();
        let b = checkerboard(64, 8);
        let config = SsimConfig::default().without_downsampling();
        assert!(ssim_changed(&a, &b, &config).unwrap());
    }

    #[test]
    fn test_mismatched_sizes_are_resized() {
        let a = gradient(64, 36, 0);
        let b = gradient(32, 18, 0);
        let config = SsimConfig::default().without_downsampling().with_threshold(0.9);
        assert!(ssim(&a, &b, &config).unwrap() > 0.9);
    }

    #[test]
    fn test_luma_rounds() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        // 0.299 * 100 = 29.9
        assert_eq!(luma(100, 0, 0), 30);
    }

    #[test]
    fn test_ssim_gray_rejects_length_mismatch() {
        assert!(ssim_gray(&[1, 2, 3], &[1, 2]).is_err());
        assert!(ssim_gray(&[], &[]).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(SsimConfig::default().validate().is_ok());
        assert!(SsimConfig::default().with_threshold(0.5).validate().is_err());
        let mut config = SsimConfig::default();
        config.downsample_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hash_is_stable_and_top_bit_clear() {
        let frame = checkerboard(128, 16);
        let h1 = perceptual_hash_frame(&frame).unwrap();
        let h2 = perceptual_hash_frame(&frame).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(hamming(&h1, &h2), 0);
        assert!(!h1.bit(255));
        assert_eq!(h1.to_hex().len(), 64);
    }

    /// Deterministic pseudo-random blocks, upscaled by `cell`, with `offset` added to every channel.
    fn noise_grid(cells: u32, cell: u32, seed: u32, offset: u8) -> Frame {
        let mut state = seed;
        let mut values = Vec::with_capacity((cells * cells) as usize);
        for _ in 0..cells * cells {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            values.push(((state >> 16) % 200) as u8);
        }
        let size = cells * cell;
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let v = values[((y / cell) * cells + x / cell) as usize] + offset;
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::from_rgba(size, size, data).unwrap()
    }

    #[test]
    fn test_hash_distinguishes_content() {
        let a = perceptual_hash_frame(&noise_grid(16, 8, 1, 0)).unwrap();
        let b = perceptual_hash_frame(&noise_grid(16, 8, 99, 0)).unwrap();
        assert!(hamming(&a, &b) > 10);
        assert_eq!(hamming(&a, &b), hamming(&b, &a));
    }

    #[test]
    fn test_hash_ignores_uniform_brightness_shift() {
        let base = perceptual_hash_frame(&noise_grid(16, 8, 7, 0)).unwrap();
        let brighter = perceptual_hash_frame(&noise_grid(16, 8, 7, 20)).unwrap();
        assert!(hamming(&base, &brighter) <= 10);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
