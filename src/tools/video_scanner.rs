use crate::config::FileTypeTable;
use crate::tools::get_video_info;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// 每處理幾個項目回報一次掃描進度
pub const SCAN_REPORT_EVERY: usize = 50;

/// 掃描後的影片紀錄，建立後不再變動
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoRecord {
    /// 寬高皆已知時回傳 (width, height)
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    #[must_use]
    pub fn resolution_label(&self) -> String {
        match self.dimensions() {
            Some((w, h)) => format!("{w}x{h}"),
            None => "?x?".to_string(),
        }
    }
}

/// 掃描進度（已處理項目數, 項目總數）
pub type ScanProgress<'a> = &'a dyn Fn(usize, usize);

/// 掃描資料夾第一層的影片檔並以 ffprobe 補齊長度與解析度
///
/// ffprobe 失敗的檔案仍會保留，只是缺少長度與解析度。
/// 結果依檔名排序。
pub fn scan_video_folder(
    folder: &Path,
    file_type_table: &FileTypeTable,
    probe_timeout: Duration,
    on_progress: ScanProgress<'_>,
) -> Result<Vec<VideoRecord>> {
    let entries: Vec<walkdir::DirEntry> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("無法讀取資料夾: {}", folder.display()))?;

    let total = entries.len();
    let mut videos = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let processed = index + 1;
        if processed % SCAN_REPORT_EVERY == 0 || processed == total {
            on_progress(processed, total);
        }

        if !entry.file_type().is_file() || !file_type_table.is_video_file(entry.path()) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("無法讀取檔案資訊 {}: {e}", entry.path().display());
                continue;
            }
        };

        let mut record = VideoRecord {
            display_name: entry.file_name().to_string_lossy().to_string(),
            size_bytes: metadata.len(),
            modified_at: metadata
                .modified()
                .map_or_else(|_| Utc::now(), DateTime::<Utc>::from),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            duration_seconds: None,
            width: None,
            height: None,
            path: entry.into_path(),
        };

        match get_video_info(&record.path, probe_timeout) {
            Ok(info) => {
                record.duration_seconds = info.duration_seconds;
                record.width = Some(info.width);
                record.height = Some(info.height);
            }
            Err(e) => debug!("ffprobe 失敗 {}: {e:#}", record.path.display()),
        }

        videos.push(record);
    }

    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn video_table() -> FileTypeTable {
        FileTypeTable {
            video_file: vec![".mp4".to_string(), ".mov".to_string()],
        }
    }

    #[test]
    fn test_scan_keeps_only_top_level_videos() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b_clip.mp4"), b"not really a video").unwrap();
        fs::write(temp_dir.path().join("a_clip.MOV"), b"also fake").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"text").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested").join("deep.mp4"), b"deep").unwrap();

        let videos = scan_video_folder(
            temp_dir.path(),
            &video_table(),
            Duration::from_secs(5),
            &|_, _| {},
        )
        .unwrap();

        let names: Vec<_> = videos.iter().map(|v| v.display_name.as_str()).collect();
        assert_eq!(names, vec!["a_clip.MOV", "b_clip.mp4"]);
        assert_eq!(videos[1].size_bytes, 18);
        // 假影片無法被 ffprobe 解析，解析度保持未知
        assert!(videos.iter().all(|v| v.dimensions().is_none()));
    }

    #[test]
    fn test_scan_reports_final_progress() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("x.txt"), b"x").unwrap();
        let last = Cell::new((0, 0));

        scan_video_folder(
            temp_dir.path(),
            &video_table(),
            Duration::from_secs(5),
            &|done, total| last.set((done, total)),
        )
        .unwrap();

        assert_eq!(last.get(), (1, 1));
    }

    #[test]
    fn test_scan_missing_folder_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_video_folder(
            &temp_dir.path().join("missing"),
            &video_table(),
            Duration::from_secs(5),
            &|_, _| {},
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolution_label() {
        let record = VideoRecord {
            path: PathBuf::from("/v/a.mp4"),
            display_name: "a.mp4".to_string(),
            size_bytes: 1,
            modified_at: Utc::now(),
            created_at: None,
            duration_seconds: None,
            width: Some(1920),
            height: Some(1080),
        };
        assert_eq!(record.resolution_label(), "1920x1080");
        assert_eq!(
            VideoRecord {
                height: None,
                ..record
            }
            .resolution_label(),
            "?x?"
        );
    }
}
