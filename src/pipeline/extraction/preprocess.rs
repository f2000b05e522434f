//! Image normalization ahead of OCR.
//!
//! Pipeline: validate -> decode -> EXIF orientation -> grayscale -> working-size
//! rescale -> conditional denoise -> adaptive threshold -> deskew -> PNG.
//!
//! Every step works on `image` gray buffers. Normalizing an already
//! binarized, deskewed image returns it unchanged.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Longest side above this is downscaled before any per-pixel work.
const MAX_WORKING_DIMENSION: u32 = 4096;

/// Longest side below this is upscaled; Tesseract wants ~10px+ x-height.
const MIN_WORKING_DIMENSION: u32 = 1000;

/// Adaptive threshold window is (2r+1)^2.
const THRESHOLD_RADIUS: u32 = 7;

/// A pixel must be this much darker than its neighbourhood mean to be ink.
const THRESHOLD_OFFSET: i32 = 10;

/// Pixels darker than this are ink regardless of neighbourhood.
const INK_FLOOR: u8 = 40;

/// Noise std-dev above which the median filter runs. Clean scans: 2-8.
const NOISE_THRESHOLD: f32 = 12.0;

/// Laplacian variance below this reads as blurry.
const BLUR_THRESHOLD: f32 = 100.0;

/// RMS contrast below this reads as washed out.
const CONTRAST_THRESHOLD: f32 = 25.0;

/// Skew search range and resolution, degrees.
const SKEW_SEARCH_LIMIT_DEG: f32 = 5.0;
const SKEW_STEP_DEG: f32 = 0.25;

/// Detected skew below this is left uncorrected.
const SKEW_MIN_CORRECTION_DEG: f32 = 0.5;

/// Corrected skew above this is still reported as a quality issue.
const SKEW_REPORT_DEG: f32 = 1.5;

// ═══════════════════════════════════════════════════════════
// Service trait and result types
// ═══════════════════════════════════════════════════════════

/// Turns raw image bytes into a binarized, deskewed page ready for OCR.
pub trait ImageNormalizer: Send + Sync {
    fn normalize(&self, raw_bytes: &[u8]) -> Result<NormalizedImage, ExtractionError>;
}

#[derive(Debug)]
pub struct NormalizedImage {
    /// Binarized page, encoded as PNG for the OCR engine.
    pub png: Vec<u8>,
    /// Same page as a buffer: 0 = ink, 255 = paper.
    pub image: GrayImage,
    pub original_width: u32,
    pub original_height: u32,
    /// Skew angle that was corrected, degrees.
    pub skew_corrected: Option<f32>,
    pub quality: QualityReport,
}

/// Read-only quality scores measured on the grayscale page.
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    /// >95% near-white
    pub is_blank: bool,
    /// >80% near-black
    pub is_dark: bool,
    pub blur_score: f32,
    pub contrast_score: f32,
    pub noise_level: f32,
    /// Human-readable problems, surfaced as warnings.
    pub issues: Vec<String>,
}

// ── BinarizingNormalizer ──────────────────────────────────

/// Production normalizer. Both optional stages are on by default.
#[derive(Debug, Clone)]
pub struct BinarizingNormalizer {
    pub denoise: bool,
    pub deskew: bool,
}

impl Default for BinarizingNormalizer {
    fn default() -> Self {
        Self {
            denoise: true,
            deskew: true,
        }
    }
}

impl ImageNormalizer for BinarizingNormalizer {
    fn normalize(&self, raw_bytes: &[u8]) -> Result<NormalizedImage, ExtractionError> {
        validate_image_bytes(raw_bytes)?;

        let decoded = image::load_from_memory(raw_bytes)
            .map_err(|e| ExtractionError::Preprocessing(format!("Failed to decode image: {e}")))?;
        let oriented = apply_orientation(decoded, read_exif_orientation(raw_bytes));
        let gray = oriented.to_luma8();

        let (original_width, original_height) = gray.dimensions();
        if original_width == 0 || original_height == 0 {
            return Err(ExtractionError::Preprocessing("Image has zero dimensions".into()));
        }

        let gray = rescale_for_ocr(gray);
        let mut quality = assess_quality(&gray);

        let gray = if self.denoise && quality.noise_level > NOISE_THRESHOLD {
            debug!(noise = quality.noise_level, "Applying median denoise");
            median_filter_3x3(&gray)
        } else {
            gray
        };

        let binary = adaptive_threshold(&gray, THRESHOLD_RADIUS, THRESHOLD_OFFSET);

        let skew = if self.deskew { detect_skew_angle(&binary) } else { None };
        let binary = match skew {
            Some(angle) => {
                if angle.abs() > SKEW_REPORT_DEG {
                    quality
                        .issues
                        .push(format!("document skewed by {angle:.2} degrees, corrected"));
                }
                rotate_about_center(&binary, angle)
            }
            None => binary,
        };

        let png = encode_png(&binary)?;

        debug!(
            from = format!("{original_width}x{original_height}"),
            to = format!("{}x{}", binary.width(), binary.height()),
            skew = ?skew,
            issues = quality.issues.len(),
            "Normalized image"
        );

        Ok(NormalizedImage {
            png,
            image: binary,
            original_width,
            original_height,
            skew_corrected: skew,
            quality,
        })
    }
}

// ── Orientation ───────────────────────────────────────────

/// Read EXIF tag 0x0112 (Orientation) from raw bytes via `kamadak-exif`.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(reader) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform.
/// 2 = mirrored, 3 = 180, 4 = flipped, 5-8 = quarter turns (5/7 mirrored).
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ── Geometry ──────────────────────────────────────────────

/// Bring the longest side into [MIN_WORKING_DIMENSION, MAX_WORKING_DIMENSION].
/// An image already inside the band is returned untouched.
fn rescale_for_ocr(img: GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let longest = w.max(h);

    let (target, filter) = if longest > MAX_WORKING_DIMENSION {
        (MAX_WORKING_DIMENSION, FilterType::Triangle)
    } else if longest < MIN_WORKING_DIMENSION {
        (MIN_WORKING_DIMENSION, FilterType::CatmullRom)
    } else {
        return img;
    };

    let scale = target as f32 / longest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Rescaling image for OCR"
    );
    image::imageops::resize(&img, new_w, new_h, filter)
}

/// Rotate by `angle_deg` about the image center so that a line sloping at
/// `angle_deg` becomes horizontal. Nearest-neighbour; uncovered area is paper.
pub fn rotate_about_center(img: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    GrayImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cx + dx * cos - dy * sin).round();
        let sy = (cy + dx * sin + dy * cos).round();
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < w && (sy as u32) < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([255])
        }
    })
}

// ── Filtering ─────────────────────────────────────────────

/// 3x3 median with edge replication. Removes salt-and-pepper specks
/// without eroding stroke edges the way a box blur does.
pub fn median_filter_3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let clamp = |v: i64, max: u32| v.clamp(0, max as i64 - 1) as u32;

    GrayImage::from_fn(w, h, |x, y| {
        let mut window = [0u8; 9];
        let mut i = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = clamp(x as i64 + dx, w);
                let ny = clamp(y as i64 + dy, h);
                window[i] = img.get_pixel(nx, ny).0[0];
                i += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}

/// Local-mean adaptive threshold over a (2r+1)^2 window using an integral
/// image. Output is strictly binary: 0 = ink, 255 = paper.
pub fn adaptive_threshold(img: &GrayImage, radius: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let integral = integral_image(img);
    let stride = w as usize + 1;

    GrayImage::from_fn(w, h, |x, y| {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(w) as usize;
        let y1 = (y + radius + 1).min(h) as usize;

        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];
        let area = ((x1 - x0) * (y1 - y0)) as u64;
        let mean = (sum / area.max(1)) as i32;

        let p = img.get_pixel(x, y).0[0];
        if p < INK_FLOOR || (p as i32) + offset < mean {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Summed-area table with a zero row and column, (w+1) x (h+1).
fn integral_image(img: &GrayImage) -> Vec<u64> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.get_pixel(x as u32, y as u32).0[0] as u64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

// ── Skew ──────────────────────────────────────────────────

/// Estimate text-line skew with a projection profile.
///
/// For each candidate angle, every ink pixel is projected onto the axis
/// perpendicular to a line of that slope (`y - x*tan`). Aligned text lines
/// pile into few bins, so the sum of squared bin counts peaks at the true
/// angle. Candidates are tried nearest-zero first; ties keep the smaller angle.
///
/// Returns `None` for small or near-empty images (< 2% ink) and for angles
/// under the correction floor.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 50 || h < 50 {
        return None;
    }

    let ink: Vec<(f32, f32)> = img
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] < 128)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if (ink.len() as f32) < 0.02 * (w as f32 * h as f32) {
        return None;
    }

    let steps = (SKEW_SEARCH_LIMIT_DEG / SKEW_STEP_DEG).round() as i32;
    let margin = (w as f32 * SKEW_SEARCH_LIMIT_DEG.to_radians().tan()).ceil() as i64 + 1;
    let bin_count = (h as i64 + 2 * margin) as usize;
    let mut bins = vec![0u32; bin_count];

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;

    // 0, +s, -s, +2s, -2s, ...
    let candidates = std::iter::once(0).chain((1..=steps).flat_map(|i| [i, -i]));
    for step in candidates {
        let angle = step as f32 * SKEW_STEP_DEG;
        let tan = angle.to_radians().tan();

        bins.iter_mut().for_each(|b| *b = 0);
        for &(x, y) in &ink {
            let bin = (y - x * tan).round() as i64 + margin;
            if (0..bin_count as i64).contains(&bin) {
                bins[bin as usize] += 1;
            }
        }

        let score: f64 = bins.iter().map(|&c| (c as f64) * (c as f64)).sum();
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < SKEW_MIN_CORRECTION_DEG {
        None
    } else {
        Some(best_angle)
    }
}

// ═══════════════════════════════════════════════════════════
// Quality metrics
// ═══════════════════════════════════════════════════════════

/// Score the grayscale page. Never blocks extraction; issues become warnings.
pub fn assess_quality(img: &GrayImage) -> QualityReport {
    let total = img.width() as usize * img.height() as usize;
    if total == 0 {
        return QualityReport::default();
    }

    let white = img.pixels().filter(|p| p.0[0] > 240).count();
    let dark = img.pixels().filter(|p| p.0[0] < 15).count();

    let mut report = QualityReport {
        is_blank: white as f32 / total as f32 > 0.95,
        is_dark: dark as f32 / total as f32 > 0.80,
        blur_score: compute_laplacian_variance(img),
        contrast_score: compute_contrast_score(img),
        noise_level: assess_noise_level(img),
        issues: Vec::new(),
    };

    if report.is_blank {
        report.issues.push("page appears mostly blank".into());
    }
    if report.is_dark {
        report.issues.push("page appears mostly dark".into());
    }
    // Blank and dark pages are trivially low-contrast and flat.
    if !report.is_blank && !report.is_dark {
        if report.contrast_score < CONTRAST_THRESHOLD {
            report
                .issues
                .push(format!("low contrast ({:.1})", report.contrast_score));
        }
        if report.blur_score < BLUR_THRESHOLD {
            report
                .issues
                .push(format!("image appears blurry ({:.1})", report.blur_score));
        }
    }
    report
}

/// Variance of the 4-neighbour Laplacian. Sharp text > 500, blurry < 100.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
    let (mut sum, mut sum_sq, mut n) = (0.0f64, 0.0f64, 0u64);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
            n += 1;
        }
    }
    variance(sum, sum_sq, n) as f32
}

/// RMS contrast: standard deviation of intensities (0-127.5).
pub fn compute_contrast_score(img: &GrayImage) -> f32 {
    let (sum, sum_sq, n) = img.pixels().fold((0.0f64, 0.0f64, 0u64), |(s, sq, n), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v, n + 1)
    });
    variance(sum, sum_sq, n).sqrt() as f32
}

/// Noise estimate: std-dev of the median block among the smoothest quarter
/// of 5x5 blocks. Clean scans 2-8, degraded 15-30.
pub fn assess_noise_level(img: &GrayImage) -> f32 {
    const BLOCK: u32 = 5;
    let (w, h) = img.dimensions();
    if w < BLOCK || h < BLOCK {
        return 0.0;
    }

    let mut block_variances: Vec<f64> = Vec::new();
    for by in (0..=h - BLOCK).step_by(BLOCK as usize) {
        for bx in (0..=w - BLOCK).step_by(BLOCK as usize) {
            let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
            for y in by..by + BLOCK {
                for x in bx..bx + BLOCK {
                    let v = img.get_pixel(x, y).0[0] as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            block_variances.push(variance(sum, sum_sq, (BLOCK * BLOCK) as u64));
        }
    }

    block_variances.sort_by(|a, b| a.total_cmp(b));
    let smooth = &block_variances[..(block_variances.len() / 4).max(1)];
    smooth[smooth.len() / 2].sqrt() as f32
}

fn variance(sum: f64, sum_sq: f64, n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

// ═══════════════════════════════════════════════════════════
// Byte-level helpers
// ═══════════════════════════════════════════════════════════

/// Reject clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::Preprocessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::Preprocessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::Preprocessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
