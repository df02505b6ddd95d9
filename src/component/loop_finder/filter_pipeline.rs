//! 候選影片篩選
//!
//! 先依正規表示式規則篩選，再依中繼資料範圍篩選。輸出維持輸入的相對順序。

use crate::tools::VideoRecord;
use chrono::{DateTime, Utc};
use log::warn;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("第 {index} 條規則的樣式為空白")]
    EmptyPattern { index: usize },

    #[error("篩選範圍不合法: {field}")]
    InvalidBounds { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => write!(f, "包含"),
            Self::Exclude => write!(f, "排除"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FilterTarget {
    /// 不含副檔名的檔名
    #[default]
    BaseName,
    /// 小寫、不含點的副檔名
    Extension,
    /// 完整檔名
    FullName,
}

impl FilterTarget {
    fn field_text(self, video: &VideoRecord) -> String {
        let path = Path::new(&video.display_name);
        match self {
            Self::BaseName => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Extension => path
                .extension()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            Self::FullName => video.display_name.clone(),
        }
    }
}

impl fmt::Display for FilterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseName => write!(f, "檔名"),
            Self::Extension => write!(f, "副檔名"),
            Self::FullName => write!(f, "完整檔名"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRule {
    pub pattern: String,
    pub mode: FilterMode,
    pub target: FilterTarget,
}

impl RegexRule {
    #[must_use]
    pub fn new(pattern: impl Into<String>, mode: FilterMode, target: FilterTarget) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            target,
        }
    }
}

/// 包含端點的數值範圍，未提供的一端不限制
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    #[must_use]
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn validate(&self, field: &'static str) -> Result<(), FilterError> {
        let finite = self.min.is_none_or(f64::is_finite) && self.max.is_none_or(f64::is_finite);
        let ordered = match (self.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        };
        if finite && ordered {
            Ok(())
        } else {
            Err(FilterError::InvalidBounds { field })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl TimeRange {
    fn contains(&self, value: DateTime<Utc>) -> bool {
        self.after.is_none_or(|after| value >= after)
            && self.before.is_none_or(|before| value <= before)
    }

    fn validate(&self, field: &'static str) -> Result<(), FilterError> {
        match (self.after, self.before) {
            (Some(after), Some(before)) if after > before => {
                Err(FilterError::InvalidBounds { field })
            }
            _ => Ok(()),
        }
    }
}

/// 中繼資料篩選條件
///
/// 紀錄缺少對應欄位時該條件不排除該筆；寬、高與長寬比只在寬高都已知時才套用。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFilter {
    pub size_mb: Range,
    pub created: TimeRange,
    pub modified: TimeRange,
    pub duration_seconds: Range,
    pub width: Range,
    pub height: Range,
    pub aspect_ratio: Range,
}

impl MetadataFilter {
    fn validate(&self) -> Result<(), FilterError> {
        self.size_mb.validate("size_mb")?;
        self.created.validate("created")?;
        self.modified.validate("modified")?;
        self.duration_seconds.validate("duration_seconds")?;
        self.width.validate("width")?;
        self.height.validate("height")?;
        self.aspect_ratio.validate("aspect_ratio")
    }

    #[allow(clippy::cast_precision_loss)]
    fn accepts(&self, video: &VideoRecord) -> bool {
        let size_ok = self.size_mb.contains(video.size_bytes as f64 / BYTES_PER_MB);
        let time_ok = self.modified.contains(video.modified_at)
            && video
                .created_at
                .is_none_or(|created| self.created.contains(created));
        let duration_ok = video
            .duration_seconds
            .is_none_or(|duration| self.duration_seconds.contains(duration));
        let shape_ok = video.dimensions().is_none_or(|(width, height)| {
            let (width, height) = (f64::from(width), f64::from(height));
            self.width.contains(width)
                && self.height.contains(height)
                && (height == 0.0 || self.aspect_ratio.contains(width / height))
        });

        size_ok && time_ok && duration_ok && shape_ok
    }
}

struct CompiledRule {
    regex: Regex,
    mode: FilterMode,
    target: FilterTarget,
}

impl CompiledRule {
    fn keeps(&self, video: &VideoRecord) -> bool {
        let matched = self.regex.is_match(&self.target.field_text(video));
        match self.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        }
    }
}

/// 篩選候選影片
///
/// 空白樣式回傳 [`FilterError::EmptyPattern`]；無法編譯的樣式只記錄警告並略過。
/// 第一條有效規則為包含模式時，各規則的保留結果取聯集；為排除模式時取交集。
pub fn apply(
    all_videos: &[VideoRecord],
    rules: &[RegexRule],
    metadata: &MetadataFilter,
) -> Result<Vec<VideoRecord>, FilterError> {
    if let Some(index) = rules.iter().position(|rule| rule.pattern.trim().is_empty()) {
        return Err(FilterError::EmptyPattern { index });
    }
    metadata.validate()?;

    let compiled = compile_rules(rules);
    let kept = regex_mask(all_videos, &compiled);

    Ok(all_videos
        .iter()
        .zip(kept)
        .filter(|(video, keep)| *keep && metadata.accepts(video))
        .map(|(video, _)| video.clone())
        .collect())
}

fn compile_rules(rules: &[RegexRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| {
            match RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some(CompiledRule {
                    regex,
                    mode: rule.mode,
                    target: rule.target,
                }),
                Err(e) => {
                    warn!("略過無效的正規表示式 '{}': {e}", rule.pattern);
                    None
                }
            }
        })
        .collect()
}

fn regex_mask(videos: &[VideoRecord], rules: &[CompiledRule]) -> Vec<bool> {
    let Some(first) = rules.first() else {
        return vec![true; videos.len()];
    };

    let union = first.mode == FilterMode::Include;
    let mut kept = vec![!union; videos.len()];

    for rule in rules {
        for (slot, video) in kept.iter_mut().zip(videos) {
            let keep = rule.keeps(video);
            *slot = if union { *slot || keep } else { *slot && keep };
        }
    }

    kept
}
