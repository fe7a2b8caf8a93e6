//! Image cleanup before OCR and table-geometry analysis.
//!
//! Every function here is a pure image-to-image transform: no I/O, no OCR,
//! no shared state. Two binarization variants exist because they serve
//! different consumers:
//! - `preprocess_image`: thin, clean strokes for text recognition
//! - `enhance_for_table_detection`: inverted, blurred, thickened strokes so
//!   table borders merge into closed contours
//!
//! `deskew_image` runs first on the raw page; both variants run on its output.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use tracing::debug;

use super::types::BoundingBox;
use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Adaptive threshold neighbourhood (pixels, odd).
pub const ADAPTIVE_BLOCK_SIZE: u32 = 11;

/// Constant subtracted from the local mean before comparing.
pub const ADAPTIVE_OFFSET: f32 = 2.0;

/// Speckle removal kernel radius for the OCR variant. 0 = 1x1 kernel.
const SPECKLE_OPEN_RADIUS: u8 = 0;

/// Stroke dilation radius for the OCR variant. 0 = 1x1 kernel.
const STROKE_DILATE_RADIUS: u8 = 0;

/// Canny hysteresis thresholds for the noise-fringe edge map.
const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;

/// Pre-threshold blur for the table variant (5x5 kernel).
const TABLE_BLUR_KERNEL: u32 = 5;

/// Dilation radius for the table variant (3x3 kernel).
const TABLE_DILATE_RADIUS: u8 = 1;

/// Skew angles below this (degrees) are not worth a resampling pass.
const MIN_DESKEW_ANGLE_DEG: f64 = 0.05;

/// Bicubic convolution coefficient (same value as OpenCV's INTER_CUBIC).
const BICUBIC_A: f64 = -0.75;

// ═══════════════════════════════════════════════════════════
// Public pipeline steps
// ═══════════════════════════════════════════════════════════

/// Binarize a page for text recognition.
///
/// Steps: grayscale -> Gaussian adaptive threshold (11 px, offset 2) ->
/// open -> dilate -> subtract Canny edge map (`binary AND NOT edges`).
///
/// Fails with `InvalidInput` when the image has zero pixels.
pub fn preprocess_image(image: &DynamicImage) -> Result<GrayImage, ExtractionError> {
    validate_image(image)?;

    let gray = to_grayscale(image);
    let binary = adaptive_threshold_gaussian(&gray, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET, false);
    let opened = morph_open(&binary, SPECKLE_OPEN_RADIUS);
    let dilated = morph_dilate(&opened, STROKE_DILATE_RADIUS);

    let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);
    let cleaned = subtract_mask(&dilated, &edges);

    debug!(
        size = format!("{}x{}", gray.width(), gray.height()),
        ink_ratio = ink_ratio(&cleaned),
        "Image binarized for OCR"
    );

    Ok(cleaned)
}

/// Binarize a page so table borders survive as thick, connected strokes.
///
/// Steps: grayscale -> 5x5 Gaussian blur -> inverted adaptive threshold ->
/// 3x3 dilation. Foreground (ink) is white in the output.
pub fn enhance_for_table_detection(image: &DynamicImage) -> GrayImage {
    let gray = to_grayscale(image);
    if gray.width() == 0 || gray.height() == 0 {
        return gray;
    }

    let blurred = imageproc::filter::gaussian_blur_f32(&gray, kernel_sigma(TABLE_BLUR_KERNEL));
    let binary = adaptive_threshold_gaussian(&blurred, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET, true);
    morph_dilate(&binary, TABLE_DILATE_RADIUS)
}

/// Rotate the page so its text block is level.
///
/// The tilt is the angle of the minimum-area rectangle around all ink pixels
/// (global Otsu, inverted), normalized into (-45, 45]. The original image is
/// rotated about its centre with bicubic sampling and replicated borders, so
/// the output keeps the input's dimensions and colour type.
pub fn deskew_image(image: &DynamicImage) -> Result<DynamicImage, ExtractionError> {
    validate_image(image)?;

    let gray = to_grayscale(image);
    let angle = match estimate_skew_angle(&gray) {
        Some(angle) if angle.abs() >= MIN_DESKEW_ANGLE_DEG => angle,
        _ => return Ok(image.clone()),
    };

    debug!(angle_degrees = angle, "Deskewing page");

    let rotated = match image {
        DynamicImage::ImageLuma8(img) => DynamicImage::ImageLuma8(rotate_replicate(img, angle)),
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(rotate_replicate(img, angle)),
        DynamicImage::ImageRgba8(img) => DynamicImage::ImageRgba8(rotate_replicate(img, angle)),
        other => DynamicImage::ImageRgb8(rotate_replicate(&other.to_rgb8(), angle)),
    };
    Ok(rotated)
}

/// Estimate the clockwise tilt (degrees, y-down screen coordinates) of the
/// ink on a grayscale page. `None` when the page has no ink at all or is ink
/// everywhere (nothing to measure).
pub fn estimate_skew_angle(gray: &GrayImage) -> Option<f64> {
    let level = imageproc::contrast::otsu_level(gray);

    // Hull of all ink pixels == hull of each row's extreme ink pixels.
    let mut extremes: Vec<(f64, f64)> = Vec::new();
    let mut ink_pixels = 0u64;
    for y in 0..gray.height() {
        let mut first: Option<u32> = None;
        let mut last = 0u32;
        for x in 0..gray.width() {
            if gray.get_pixel(x, y).0[0] <= level {
                ink_pixels += 1;
                first.get_or_insert(x);
                last = x;
            }
        }
        if let Some(first) = first {
            extremes.push((first as f64, y as f64));
            if last != first {
                extremes.push((last as f64, y as f64));
            }
        }
    }

    let total = gray.width() as u64 * gray.height() as u64;
    if ink_pixels == 0 || ink_pixels == total {
        return None;
    }

    let hull = convex_hull(extremes);
    Some(normalize_skew(min_area_rect_angle(&hull)))
}

/// Crop a region out of the page, clamped to the image bounds.
pub fn crop_to_region(image: &DynamicImage, region: &BoundingBox) -> DynamicImage {
    let x = region.x.min(image.width());
    let y = region.y.min(image.height());
    let width = region.width.min(image.width() - x);
    let height = region.height.min(image.height() - y);
    image.crop_imm(x, y, width, height)
}

/// Reject images with no pixels.
pub fn validate_image(image: &DynamicImage) -> Result<(), ExtractionError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractionError::InvalidInput(format!(
            "image has zero pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Pixel helpers (reusable)
// ═══════════════════════════════════════════════════════════

/// Grayscale view of any image. Single-channel input is copied as-is.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
                .round()
                .clamp(0.0, 255.0) as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Local binarization against a Gaussian-weighted neighbourhood mean.
///
/// A pixel is white when `value > mean - offset` (black when `inverted`).
/// The Gaussian sigma follows the usual derivation from the window size, so
/// `block_size = 11` weighs roughly an 11x11 neighbourhood.
pub fn adaptive_threshold_gaussian(
    gray: &GrayImage,
    block_size: u32,
    offset: f32,
    inverted: bool,
) -> GrayImage {
    let local_mean = imageproc::filter::gaussian_blur_f32(gray, kernel_sigma(block_size));
    let (on, off) = if inverted { (0u8, 255u8) } else { (255u8, 0u8) };

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let value = gray.get_pixel(x, y).0[0] as f32;
        let mean = local_mean.get_pixel(x, y).0[0] as f32;
        *pixel = Luma([if value > mean - offset { on } else { off }]);
    }
    out
}

/// Gaussian sigma for a square kernel of `size` pixels (OpenCV's rule for
/// sigma = 0).
fn kernel_sigma(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn morph_open(image: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    morphology::open(image, Norm::LInf, radius)
}

fn morph_dilate(image: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    morphology::dilate(image, Norm::LInf, radius)
}

/// `image AND NOT mask`: every non-zero mask pixel becomes black.
fn subtract_mask(image: &GrayImage, mask: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask.get_pixel(x, y).0[0] > 0 {
            *pixel = Luma([0]);
        }
    }
    out
}

/// Fraction of black pixels in a binary image.
fn ink_ratio(binary: &GrayImage) -> f32 {
    let total = (binary.width() as usize) * (binary.height() as usize);
    if total == 0 {
        return 0.0;
    }
    let dark = binary.pixels().filter(|p| p.0[0] == 0).count();
    dark as f32 / total as f32
}

// ═══════════════════════════════════════════════════════════
// Skew geometry
// ═══════════════════════════════════════════════════════════

/// Andrew's monotone chain. Returns the hull counter-clockwise without the
/// closing point; collinear points are dropped.
fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Edge direction (degrees) of the minimum-area rectangle enclosing a hull.
///
/// One side of the optimal rectangle is collinear with a hull edge, so each
/// edge direction is tried and the smallest enclosing area wins.
fn min_area_rect_angle(hull: &[(f64, f64)]) -> f64 {
    if hull.len() < 2 {
        return 0.0;
    }

    let mut best_area = f64::INFINITY;
    let mut best_angle = 0.0;

    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(px, py) in hull {
            let u = px * ux + py * uy;
            let v = -px * uy + py * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            best_angle = dy.atan2(dx).to_degrees();
        }
    }

    best_angle
}

/// Fold a rectangle edge angle into (-45, 45]: a rectangle's sides repeat
/// every 90 degrees.
fn normalize_skew(angle: f64) -> f64 {
    let mut a = angle % 90.0;
    if a <= -45.0 {
        a += 90.0;
    } else if a > 45.0 {
        a -= 90.0;
    }
    a
}

// ═══════════════════════════════════════════════════════════
// Rotation
// ═══════════════════════════════════════════════════════════

/// Rotate counter-clockwise (on screen) by `angle_deg` about the image centre.
///
/// Inverse-maps every output pixel into the source and samples bicubically;
/// samples falling outside the source take the nearest edge pixel.
fn rotate_replicate<P>(img: &ImageBuffer<P, Vec<u8>>, angle_deg: f64) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = img.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let (cx, cy) = ((w / 2) as f64, (h / 2) as f64);
    let (sin, cos) = angle_deg.to_radians().sin_cos();

    let mut out: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(w, h);
    let mut acc = [0.0f64; 4];

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = dx * cos - dy * sin + cx;
        let sy = dx * sin + dy * cos + cy;

        sample_bicubic(img, sx, sy, channels, &mut acc);
        for (c, value) in pixel.channels_mut().iter_mut().enumerate().take(channels) {
            *value = acc[c].round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

fn sample_bicubic<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    sx: f64,
    sy: f64,
    channels: usize,
    acc: &mut [f64; 4],
) where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = sx.floor();
    let y0 = sy.floor();
    let (fx, fy) = (sx - x0, sy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    acc.iter_mut().for_each(|a| *a = 0.0);

    for j in -1..=2i64 {
        let wy = cubic_weight(fy - j as f64);
        let py = (y0 + j).clamp(0, h - 1) as u32;
        for i in -1..=2i64 {
            let weight = wy * cubic_weight(fx - i as f64);
            if weight == 0.0 {
                continue;
            }
            let px = (x0 + i).clamp(0, w - 1) as u32;
            let src = img.get_pixel(px, py).channels();
            for c in 0..channels {
                acc[c] += weight * src[c] as f64;
            }
        }
    }
}

fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        (BICUBIC_A + 2.0) * t * t * t - (BICUBIC_A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        BICUBIC_A * t * t * t - 5.0 * BICUBIC_A * t * t + 8.0 * BICUBIC_A * t - 4.0 * BICUBIC_A
    } else {
        0.0
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
