use super::filter_pipeline::{self, FilterError, MetadataFilter, RegexRule};
use crate::tools::{VideoRecord, ensure_within_root, validate_directory_exists};
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// 一次互動流程的狀態：選定的資料夾、掃描結果與篩選結果
#[derive(Debug, Clone, Default)]
pub struct Session {
    root_folder: Option<PathBuf>,
    selected_folder: Option<PathBuf>,
    all_videos: Vec<VideoRecord>,
    filtered_videos: Vec<VideoRecord>,
}

impl Session {
    /// # Errors
    ///
    /// 根目錄不存在或不是資料夾時回傳錯誤
    pub fn new(root_folder: Option<&Path>) -> Result<Self> {
        let root_folder = root_folder
            .map(|root| {
                validate_directory_exists(root)
                    .with_context(|| format!("根目錄無效: {}", root.display()))
            })
            .transpose()?;

        Ok(Self {
            root_folder,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn root_folder(&self) -> Option<&Path> {
        self.root_folder.as_deref()
    }

    #[must_use]
    pub fn selected_folder(&self) -> Option<&Path> {
        self.selected_folder.as_deref()
    }

    #[must_use]
    pub fn all_videos(&self) -> &[VideoRecord] {
        &self.all_videos
    }

    #[must_use]
    pub fn filtered_videos(&self) -> &[VideoRecord] {
        &self.filtered_videos
    }

    /// 選擇資料夾並清空先前的掃描結果
    pub fn select_folder(&mut self, folder: &Path) -> Result<PathBuf> {
        let folder = validate_directory_exists(folder)?;
        if let Some(root) = &self.root_folder {
            ensure_within_root(&folder, root)?;
        }

        info!("選擇資料夾: {}", folder.display());
        self.selected_folder = Some(folder.clone());
        self.all_videos.clear();
        self.filtered_videos.clear();
        Ok(folder)
    }

    /// 設定掃描結果，篩選結果重設為全部
    pub fn set_videos(&mut self, videos: Vec<VideoRecord>) {
        self.filtered_videos.clone_from(&videos);
        self.all_videos = videos;
    }

    /// 對全部影片重新篩選，回傳候選數量
    ///
    /// # Errors
    ///
    /// 規則驗證失敗時保留原本的篩選結果
    pub fn apply_filters(
        &mut self,
        rules: &[RegexRule],
        metadata: &MetadataFilter,
    ) -> Result<usize, FilterError> {
        self.filtered_videos = filter_pipeline::apply(&self.all_videos, rules, metadata)?;
        info!(
            "篩選結果: {}/{} 部影片",
            self.filtered_videos.len(),
            self.all_videos.len()
        );
        Ok(self.filtered_videos.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::loop_finder::filter_pipeline::{FilterMode, FilterTarget};
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn video(name: &str) -> VideoRecord {
        VideoRecord {
            path: PathBuf::from(name),
            display_name: name.to_string(),
            size_bytes: 1,
            modified_at: Utc::now(),
            created_at: None,
            duration_seconds: None,
            width: None,
            height: None,
        }
    }

    #[test]
    fn test_select_folder_respects_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let inside = root.join("clips");
        let outside = temp_dir.path().join("elsewhere");
        fs::create_dir_all(&inside).unwrap();
        fs::create_dir_all(&outside).unwrap();

        let mut session = Session::new(Some(&root)).unwrap();
        assert!(session.select_folder(&inside).is_ok());
        assert!(session.select_folder(&outside).is_err());
        assert_eq!(
            session.selected_folder(),
            Some(inside.canonicalize().unwrap().as_path())
        );
    }

    #[test]
    fn test_invalid_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Session::new(Some(&temp_dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_filters_keep_previous_result_on_error() {
        let mut session = Session::new(None).unwrap();
        session.set_videos(vec![video("a.mp4"), video("b.mov")]);
        assert_eq!(session.filtered_videos().len(), 2);

        let rules = vec![RegexRule::new("mp4", FilterMode::Include, FilterTarget::Extension)];
        assert_eq!(
            session
                .apply_filters(&rules, &MetadataFilter::default())
                .unwrap(),
            1
        );

        let blank = vec![RegexRule::new("", FilterMode::Include, FilterTarget::Extension)];
        assert!(
            session
                .apply_filters(&blank, &MetadataFilter::default())
                .is_err()
        );
        assert_eq!(session.filtered_videos().len(), 1);
        assert_eq!(session.all_videos().len(), 2);
    }

    #[test]
    fn test_selecting_folder_clears_videos() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = Session::new(None).unwrap();
        session.set_videos(vec![video("a.mp4")]);
        session.select_folder(temp_dir.path()).unwrap();
        assert!(session.all_videos().is_empty());
        assert!(session.filtered_videos().is_empty());
    }
}
