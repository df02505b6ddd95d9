//! 逐像素比對
//!
//! 以 YIQ 色差判斷每個像素是否相符，容忍度 `t` 對應的最大色差為
//! `35215 × t²`。尺寸不同的兩張圖一律視為 0% 相符。
//!
//! 超過門檻但判定為反鋸齒的邊緣像素不計入不符數量，差異圖中以黃色標示。

use image::{Rgba, RgbaImage};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// 預設像素容忍度
pub const DEFAULT_PIXEL_TOLERANCE: f64 = 0.125;

/// YIQ 色差的理論最大值
const MAX_YIQ_DELTA: f64 = 35215.0;

const MISMATCH_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const ANTI_ALIASED_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelClass {
    Match,
    AntiAliased,
    Mismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("無法讀取圖片 {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub pixel_tolerance: f64,
    /// 相似度達到此值才產生差異圖；`None` 表示不需要差異圖
    pub diff_min_match: Option<f64>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            pixel_tolerance: DEFAULT_PIXEL_TOLERANCE,
            diff_min_match: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub match_percent: f64,
    pub mismatched_pixels: u64,
    pub diff: Option<RgbaImage>,
}

/// 比對兩張同尺寸圖片
pub trait ImageComparator: Send + Sync {
    fn compare(
        &self,
        image_a: &Path,
        image_b: &Path,
        options: &CompareOptions,
    ) -> Result<Comparison, CompareError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PixelComparator;

impl PixelComparator {
    #[must_use]
    pub fn compare_images(a: &RgbaImage, b: &RgbaImage, options: &CompareOptions) -> Comparison {
        let total_pixels = u64::from(a.width()) * u64::from(a.height());

        if a.dimensions() != b.dimensions() || total_pixels == 0 {
            return Comparison {
                match_percent: 0.0,
                mismatched_pixels: total_pixels,
                diff: None,
            };
        }

        let max_delta = MAX_YIQ_DELTA * options.pixel_tolerance * options.pixel_tolerance;
        let mut diff = options
            .diff_min_match
            .map(|_| RgbaImage::new(a.width(), a.height()));
        let mut mismatched_pixels = 0u64;

        for (x, y, pixel_a) in a.enumerate_pixels() {
            let pixel_b = b.get_pixel(x, y);
            let class = if color_delta(pixel_a, pixel_b) <= max_delta {
                PixelClass::Match
            } else if is_anti_aliased(a, b, x, y) || is_anti_aliased(b, a, x, y) {
                PixelClass::AntiAliased
            } else {
                PixelClass::Mismatch
            };

            if class == PixelClass::Mismatch {
                mismatched_pixels += 1;
            }

            if let Some(diff) = diff.as_mut() {
                let color = match class {
                    PixelClass::Match => faded_gray(pixel_a),
                    PixelClass::AntiAliased => ANTI_ALIASED_COLOR,
                    PixelClass::Mismatch => MISMATCH_COLOR,
                };
                diff.put_pixel(x, y, color);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let match_percent =
            (total_pixels - mismatched_pixels) as f64 / total_pixels as f64 * 100.0;

        let diff = match options.diff_min_match {
            Some(min_match) if match_percent >= min_match => diff,
            _ => None,
        };

        Comparison {
            match_percent,
            mismatched_pixels,
            diff,
        }
    }
}

impl ImageComparator for PixelComparator {
    fn compare(
        &self,
        image_a: &Path,
        image_b: &Path,
        options: &CompareOptions,
    ) -> Result<Comparison, CompareError> {
        let a = open_rgba(image_a)?;
        let b = open_rgba(image_b)?;
        Ok(Self::compare_images(&a, &b, options))
    }
}

fn open_rgba(path: &Path) -> Result<RgbaImage, CompareError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| CompareError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// 以白色背景混合透明度
fn blend(channel: u8, alpha: f64) -> f64 {
    255.0 + (f64::from(channel) - 255.0) * alpha
}

fn yiq(pixel: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = pixel.0;
    let alpha = f64::from(a) / 255.0;
    let (r, g, b) = (blend(r, alpha), blend(g, alpha), blend(b, alpha));

    (
        r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23,
        r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89,
        r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94,
    )
}

fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    let (y1, i1, q1) = yiq(a);
    let (y2, i2, q2) = yiq(b);
    let (dy, di, dq) = (y1 - y2, i1 - i2, q1 - q2);
    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}

/// 同一張圖內兩個像素的亮度差（有正負）
fn brightness_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    yiq(a).0 - yiq(b).0
}

/// `(x, y)` 的 3x3 鄰域，以及該點是否位於圖片邊緣
fn neighborhood(
    img: &RgbaImage,
    x: u32,
    y: u32,
) -> (RangeInclusive<u32>, RangeInclusive<u32>, bool) {
    let (x0, y0) = (x.saturating_sub(1), y.saturating_sub(1));
    let x2 = (x + 1).min(img.width() - 1);
    let y2 = (y + 1).min(img.height() - 1);
    let on_edge = x == x0 || x == x2 || y == y0 || y == y2;
    (x0..=x2, y0..=y2, on_edge)
}

/// 周圍同時有較亮與較暗的鄰居，且其中之一在兩張圖中都位於同色區塊內
fn is_anti_aliased(img: &RgbaImage, other: &RgbaImage, x: u32, y: u32) -> bool {
    let (xs, ys, on_edge) = neighborhood(img, x, y);
    let center = img.get_pixel(x, y);
    let mut zeroes = u8::from(on_edge);
    let (mut min, mut max) = (0.0, 0.0);
    let (mut min_at, mut max_at) = (None, None);

    for nx in xs {
        for ny in ys.clone() {
            if (nx, ny) == (x, y) {
                continue;
            }
            let delta = brightness_delta(center, img.get_pixel(nx, ny));
            if delta.abs() < f64::EPSILON {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = Some((nx, ny));
            } else if delta > max {
                max = delta;
                max_at = Some((nx, ny));
            }
        }
    }

    let (Some(lowest), Some(highest)) = (min_at, max_at) else {
        return false;
    };
    [lowest, highest].into_iter().any(|(px, py)| {
        has_many_siblings(img, px, py) && has_many_siblings(other, px, py)
    })
}

/// 至少三個相鄰像素與自己完全相同（邊緣算一個）
fn has_many_siblings(img: &RgbaImage, x: u32, y: u32) -> bool {
    let (xs, ys, on_edge) = neighborhood(img, x, y);
    let center = img.get_pixel(x, y);
    let mut zeroes = u8::from(on_edge);

    for nx in xs {
        for ny in ys.clone() {
            if (nx, ny) != (x, y) && img.get_pixel(nx, ny) == center {
                zeroes += 1;
                if zeroes > 2 {
                    return true;
                }
            }
        }
    }
    false
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn faded_gray(pixel: &Rgba<u8>) -> Rgba<u8> {
    let (luma, _, _) = yiq(pixel);
    let value = (255.0 + (luma - 255.0) * 0.1).clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_identical_images_match_fully() {
        let a = solid(8, 4, [10, 200, 30, 255]);
        let result = PixelComparator::compare_images(&a, &a.clone(), &CompareOptions::default());
        assert!((result.match_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.mismatched_pixels, 0);
        assert!(result.diff.is_none());
    }

    #[test]
    fn test_different_dimensions_never_match() {
        let a = solid(8, 4, [0, 0, 0, 255]);
        let b = solid(4, 8, [0, 0, 0, 255]);
        let result = PixelComparator::compare_images(&a, &b, &CompareOptions::default());
        assert!(result.match_percent.abs() < f64::EPSILON);
        assert_eq!(result.mismatched_pixels, 32);
    }

    #[test]
    fn test_partial_mismatch_percentage() {
        let a = solid(10, 10, [0, 0, 0, 255]);
        let mut b = a.clone();
        for x in 0..10 {
            b.put_pixel(x, 0, Rgba([255, 255, 255, 255]));
        }
        let result = PixelComparator::compare_images(&a, &b, &CompareOptions::default());
        assert_eq!(result.mismatched_pixels, 10);
        assert!((result.match_percent - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_tolerance_absorbs_small_color_noise() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [103, 101, 99, 255]);
        let loose = PixelComparator::compare_images(&a, &b, &CompareOptions::default());
        assert_eq!(loose.mismatched_pixels, 0);

        let strict = CompareOptions {
            pixel_tolerance: 0.0,
            diff_min_match: None,
        };
        let result = PixelComparator::compare_images(&a, &b, &strict);
        assert_eq!(result.mismatched_pixels, 16);
    }

    #[test]
    fn test_diff_only_when_match_reaches_minimum() {
        let a = solid(10, 10, [0, 0, 0, 255]);
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgba([255, 255, 255, 255]));

        let wanted = CompareOptions {
            pixel_tolerance: DEFAULT_PIXEL_TOLERANCE,
            diff_min_match: Some(95.0),
        };
        let diff = PixelComparator::compare_images(&a, &b, &wanted)
            .diff
            .unwrap();
        assert_eq!(*diff.get_pixel(0, 0), MISMATCH_COLOR);
        assert_ne!(*diff.get_pixel(1, 1), MISMATCH_COLOR);

        let too_high = CompareOptions {
            diff_min_match: Some(99.5),
            ..wanted
        };
        assert!(
            PixelComparator::compare_images(&a, &b, &too_high)
                .diff
                .is_none()
        );
    }

    #[test]
    fn test_anti_aliased_edge_is_not_a_mismatch() {
        // 黑白分界線上多了一欄灰色過渡像素
        let a = RgbaImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let mut b = a.clone();
        for y in 0..10 {
            b.put_pixel(5, y, Rgba([128, 128, 128, 255]));
        }

        let options = CompareOptions {
            pixel_tolerance: DEFAULT_PIXEL_TOLERANCE,
            diff_min_match: Some(0.0),
        };
        let result = PixelComparator::compare_images(&a, &b, &options);
        assert_eq!(result.mismatched_pixels, 0);
        assert!((result.match_percent - 100.0).abs() < f64::EPSILON);
        let diff = result.diff.unwrap();
        assert_eq!(*diff.get_pixel(5, 5), ANTI_ALIASED_COLOR);
        assert_ne!(*diff.get_pixel(2, 5), ANTI_ALIASED_COLOR);
    }

    #[test]
    fn test_compare_from_png_files() {
        let temp_dir = TempDir::new().unwrap();
        let path_a = temp_dir.path().join("end_0.png");
        let path_b = temp_dir.path().join("start_0.png");
        solid(6, 6, [50, 60, 70, 255]).save(&path_a).unwrap();
        solid(6, 6, [50, 60, 70, 255]).save(&path_b).unwrap();

        let result = PixelComparator
            .compare(&path_a, &path_b, &CompareOptions::default())
            .unwrap();
        assert!((result.match_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.png");
        let result = PixelComparator.compare(&missing, &missing, &CompareOptions::default());
        assert!(matches!(result, Err(CompareError::Decode { .. })));
    }
}
