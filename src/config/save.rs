use crate::config::load::SETTINGS_FILE;
use crate::config::types::{MAX_RECENT_PATHS, UserSettings};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn save_settings(settings: &UserSettings) -> Result<()> {
    save_settings_to(settings, Path::new(SETTINGS_FILE))
}

pub fn save_settings_to(settings: &UserSettings, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;

    Ok(())
}

/// 更新最近使用的路徑
/// 將新路徑加入最前面，去重並限制數量
pub fn add_recent_path(settings: &mut UserSettings, path: &str) {
    settings.recent_paths.retain(|p| p != path);
    settings.recent_paths.insert(0, path.to_string());
    settings.recent_paths.truncate(MAX_RECENT_PATHS);
}

/// 記錄最近使用的路徑並立即寫回設定檔
pub fn record_recent_path(settings: &mut UserSettings, path: &str) -> Result<()> {
    record_recent_path_to(settings, path, Path::new(SETTINGS_FILE))
}

pub fn record_recent_path_to(settings: &mut UserSettings, path: &str, file: &Path) -> Result<()> {
    add_recent_path(settings, path);
    save_settings_to(settings, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load::SETTINGS_FILE;
    use crate::config::types::Config;
    use tempfile::TempDir;

    #[test]
    fn test_add_recent_path_dedupes_and_truncates() {
        let mut settings = UserSettings::default();
        for i in 0..12 {
            add_recent_path(&mut settings, &format!("/videos/{i}"));
        }
        add_recent_path(&mut settings, "/videos/5");

        assert_eq!(settings.recent_paths.len(), MAX_RECENT_PATHS);
        assert_eq!(settings.recent_paths[0], "/videos/5");
        assert_eq!(
            settings
                .recent_paths
                .iter()
                .filter(|p| *p == "/videos/5")
                .count(),
            1
        );
    }

    #[test]
    fn test_save_then_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);

        let mut settings = UserSettings::default();
        settings.match_threshold = 92.0;
        add_recent_path(&mut settings, "/videos/loops");
        save_settings_to(&settings, &path).unwrap();

        let loaded = Config::load_settings(&path).unwrap();
        assert!((loaded.match_threshold - 92.0).abs() < f64::EPSILON);
        assert_eq!(loaded.recent_paths, vec!["/videos/loops".to_string()]);
    }

    #[test]
    fn test_recent_path_survives_later_settings_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);

        let mut settings = UserSettings::default();
        record_recent_path_to(&mut settings, "/videos/a", &path).unwrap();
        assert_eq!(
            Config::load_settings(&path).unwrap().recent_paths,
            vec!["/videos/a".to_string()]
        );

        // 之後修改門檻時寫回的是同一份設定
        settings.match_threshold = 90.0;
        save_settings_to(&settings, &path).unwrap();

        let loaded = Config::load_settings(&path).unwrap();
        assert!((loaded.match_threshold - 90.0).abs() < f64::EPSILON);
        assert_eq!(loaded.recent_paths, vec!["/videos/a".to_string()]);
    }
}
