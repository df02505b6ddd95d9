use crate::config::types::{Config, FileTypeTable, ROOT_DIR_ENV, UserSettings};
use crate::tools::validate_directory_exists;
use anyhow::{Context, Result};
use log::{info, warn};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// 編譯時嵌入的影片副檔名表（不需要外部檔案）
const FILE_TYPE_TABLE_JSON: &str = include_str!("../data/file_type_table.json");

pub const SETTINGS_FILE: &str = "settings.json";

impl Config {
    /// # Errors
    ///
    /// 嵌入的副檔名表無法解析，或 `LOOP_ROOT_DIR` 不是既有資料夾時回傳錯誤
    pub fn new() -> Result<Self> {
        let file_type_table = Self::load_embedded_file_type_table()?;
        let root_folder = Self::load_root_folder(env::var_os(ROOT_DIR_ENV))?;
        let settings = Self::load_settings(Path::new(SETTINGS_FILE)).unwrap_or_else(|e| {
            warn!("設定檔讀取失敗，改用預設值: {e:#}");
            UserSettings::default()
        });

        Ok(Self {
            file_type_table,
            settings,
            root_folder,
        })
    }

    /// 驗證根目錄設定，空字串視為未設定
    pub fn load_root_folder(value: Option<OsString>) -> Result<Option<PathBuf>> {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        let root = validate_directory_exists(Path::new(&value))
            .with_context(|| format!("{ROOT_DIR_ENV} 設定無效"))?;
        info!("限制根目錄: {}", root.display());
        Ok(Some(root))
    }

    pub fn load_settings(path: &Path) -> Result<UserSettings> {
        if !path.exists() {
            return Ok(UserSettings::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    /// 從編譯時嵌入的 JSON 載入影片副檔名表
    fn load_embedded_file_type_table() -> Result<FileTypeTable> {
        serde_json::from_str(FILE_TYPE_TABLE_JSON).context("無法解析嵌入的檔案類型設定")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_table_lists_video_extensions() {
        let table = Config::load_embedded_file_type_table().unwrap();
        let set = table.video_extensions_set();
        for ext in [".mp4", ".mov", ".avi", ".mkv", ".webm", ".m2ts"] {
            assert!(set.contains(ext), "缺少 {ext}");
        }
    }

    #[test]
    fn test_missing_settings_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Config::load_settings(&temp_dir.path().join("none.json")).unwrap();
        assert!((settings.match_threshold - 87.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_broken_settings_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_settings(&path).is_err());
    }

    #[test]
    fn test_root_folder_unset_or_empty_is_none() {
        assert!(Config::load_root_folder(None).unwrap().is_none());
        assert!(
            Config::load_root_folder(Some(OsString::new()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_root_folder_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let root = Config::load_root_folder(Some(temp_dir.path().as_os_str().to_owned()))
            .unwrap()
            .unwrap();
        assert_eq!(root, temp_dir.path().canonicalize().unwrap());

        let missing = temp_dir.path().join("missing");
        assert!(Config::load_root_folder(Some(missing.into_os_string())).is_err());
    }
}
