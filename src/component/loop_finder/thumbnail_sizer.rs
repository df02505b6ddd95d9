//! 比對用縮圖尺寸計算
//!
//! 規則：
//! 1. 長邊不超過 80px
//! 2. 短邊至少 32px（原始尺寸允許時）
//! 3. 絕不放大超過原始尺寸
//! 4. 寬高皆為偶數（ffmpeg 縮放需要）

use serde::Serialize;

pub const MAX_SIDE: u32 = 80;
pub const MIN_SIDE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 依原始解析度計算縮圖尺寸
///
/// 任一邊為 0 時回傳 80×80。極端長寬比（例如 1920×36）會保持短邊 32px，
/// 長邊則依比例放大，可能超過 80px。
#[must_use]
pub fn compute_size(original_width: u32, original_height: u32) -> ThumbnailSize {
    if original_width == 0 || original_height == 0 {
        return ThumbnailSize::new(MAX_SIDE, MAX_SIDE);
    }

    let orig_w = f64::from(original_width);
    let orig_h = f64::from(original_height);
    let max_side = f64::from(MAX_SIDE);
    let min_side = f64::from(MIN_SIDE);
    let aspect = orig_w / orig_h;

    let (mut width, mut height) = if original_width >= original_height {
        let w = orig_w.min(max_side);
        (w, (w / aspect).round())
    } else {
        let h = orig_h.min(max_side);
        ((h * aspect).round(), h)
    };

    if width >= orig_w || height >= orig_h {
        // 影片本身就很小，直接用原始尺寸
        width = orig_w;
        height = orig_h;
    } else if width < height {
        if width < min_side && orig_w >= min_side {
            width = min_side;
            height = (width / aspect).round();
        }
    } else if height < min_side && orig_h >= min_side {
        height = min_side;
        width = (height * aspect).round();
    }

    ThumbnailSize::new(floor_to_even(width), floor_to_even(height))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_to_even(value: f64) -> u32 {
    let value = value as u32;
    value - value % 2
}
