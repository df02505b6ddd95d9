use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// 最近使用路徑的保留數量
pub const MAX_RECENT_PATHS: usize = 10;

/// 限制可選資料夾範圍的環境變數
pub const ROOT_DIR_ENV: &str = "LOOP_ROOT_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypeTable {
    #[serde(rename = "VIDEO_FILE")]
    pub video_file: Vec<String>,
}

impl FileTypeTable {
    #[must_use]
    pub fn video_extensions_set(&self) -> HashSet<String> {
        self.video_file
            .iter()
            .map(|ext| ext.to_lowercase())
            .collect()
    }

    #[must_use]
    pub fn is_video_file(&self, path: &Path) -> bool {
        let video_extensions = self.video_extensions_set();
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| video_extensions.contains(&format!(".{}", ext.to_lowercase())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnUs => write!(f, "English"),
            Self::ZhTw => write!(f, "繁體中文"),
        }
    }
}

/// 使用者設定（儲存在 settings.json）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub language: Language,
    /// 判定為相符的最低相似度（百分比）
    pub match_threshold: f64,
    /// 單一像素的色差容忍度（0.0 ~ 1.0）
    pub pixel_tolerance: f64,
    /// 排行榜保留的組合數
    pub top_k: usize,
    /// 每比對幾組回報一次進度
    pub report_every: u64,
    /// 單次 ffmpeg / ffprobe 呼叫的逾時秒數
    pub command_timeout_secs: u64,
    pub recent_paths: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            language: Language::default(),
            match_threshold: 87.5,
            pixel_tolerance: 0.125,
            top_k: 20,
            report_every: 400,
            command_timeout_secs: 60,
            recent_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file_type_table: FileTypeTable,
    pub settings: UserSettings,
    /// `LOOP_ROOT_DIR` 指定的根目錄（啟動時已驗證）
    pub root_folder: Option<PathBuf>,
}
