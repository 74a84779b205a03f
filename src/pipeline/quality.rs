//! Image quality gate for uploads.
//!
//! Two cheap metrics on the 8-bit luma channel:
//!
//! * **Sharpness**: variance of the 4-neighbour Laplacian. Out-of-focus
//!   photos have weak edges and a low variance.
//! * **Contrast**: standard deviation of pixel intensities. Washed-out or
//!   underexposed scans sit in a narrow band.
//!
//! Blur is checked first. The reported score is the metric that failed, or
//! the sharpness metric when the image passes.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Outcome of [`check_quality`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub is_bad: bool,
    pub reason: String,
    pub score: f64,
}

impl QualityReport {
    fn bad(reason: impl Into<String>, score: f64) -> Self {
        Self {
            is_bad: true,
            reason: reason.into(),
            score,
        }
    }
}

/// Decode `bytes` and run the blur and contrast checks.
///
/// Undecodable input is reported as bad with a score of `0.0`.
pub fn check_quality(bytes: &[u8], blur_threshold: f64, contrast_threshold: f64) -> QualityReport {
    let gray = match image::load_from_memory(bytes) {
        Ok(img) => img.to_luma8(),
        Err(e) => return QualityReport::bad(format!("Unreadable image: {e}"), 0.0),
    };

    let sharpness = laplacian_variance(&gray);
    if sharpness < blur_threshold {
        return QualityReport::bad("Image too blurry", sharpness);
    }

    let contrast = intensity_std_dev(&gray);
    if contrast < contrast_threshold {
        return QualityReport::bad("Image contrast too low", contrast);
    }

    QualityReport {
        is_bad: false,
        reason: "OK".to_string(),
        score: sharpness,
    }
}

/// Variance of `up + down + left + right − 4·centre` over interior pixels.
///
/// Images smaller than 3×3 have no interior and score `0.0`.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| f64::from(img.get_pixel(x, y).0[0]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut n = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
            n += 1.0;
        }
    }
    variance(sum, sum_sq, n)
}

/// Population standard deviation of pixel intensities.
pub fn intensity_std_dev(img: &GrayImage) -> f64 {
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut n = 0.0;
    for p in img.pixels() {
        let v = f64::from(p.0[0]);
        sum += v;
        sum_sq += v * v;
        n += 1.0;
    }
    variance(sum, sum_sq, n).sqrt()
}

fn variance(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma};
    use std::io::Cursor;

    fn checkerboard(size: u32, a: u8, b: u8) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([a])
            } else {
                Luma([b])
            }
        })
    }

    fn png(img: &GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn sharp_high_contrast_image_passes() {
        let report = check_quality(&png(&checkerboard(16, 0, 255)), 450.0, 35.0);
        assert!(!report.is_bad, "{report:?}");
        assert_eq!(report.reason, "OK");
        assert!((report.score - 1020.0 * 1020.0).abs() < 1e-6);
    }

    #[test]
    fn flat_image_is_blurry() {
        let flat = GrayImage::from_pixel(16, 16, Luma([128]));
        let report = check_quality(&png(&flat), 450.0, 35.0);
        assert!(report.is_bad);
        assert_eq!(report.reason, "Image too blurry");
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn low_contrast_image_is_rejected() {
        // Laplacian ±40 → variance 1600, intensity std-dev 5.
        let report = check_quality(&png(&checkerboard(16, 120, 130)), 450.0, 35.0);
        assert!(report.is_bad);
        assert_eq!(report.reason, "Image contrast too low");
        assert!((report.score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn garbage_bytes_are_bad() {
        let report = check_quality(b"definitely not an image", 450.0, 35.0);
        assert!(report.is_bad);
        assert_eq!(report.score, 0.0);
        assert!(report.reason.starts_with("Unreadable image"));
    }

    #[test]
    fn tiny_image_has_no_sharpness() {
        assert_eq!(laplacian_variance(&checkerboard(2, 0, 255)), 0.0);
    }
}
