//! 比對引擎
//!
//! 一次執行分兩個階段：
//! 1. 為每部候選影片擷取首幀 `start_<i>.png` 與尾幀 `end_<i>.png`
//! 2. 以 N² 的順序比對 `end_<from>` 與 `start_<to>`，包含 from == to 的自我循環
//!
//! 單一影片擷取失敗或單一組比對失敗都不會中止執行。

use super::events::{
    EventSink, LoopEvent, MatchResult, ProgressUpdate, RunPhase, VideoRef, thumb_reference,
};
use super::frame_extractor::{ExtractError, FrameGrabber, FrameOutcome, extract_frame};
use super::pixel_comparator::{CompareOptions, DEFAULT_PIXEL_TOLERANCE, ImageComparator};
use super::run_control::RunControl;
use super::thumbnail_sizer::compute_size;
use super::top_matches::TopMatchesTracker;
use crate::config::UserSettings;
use crate::tools::VideoRecord;
use chrono::Utc;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// 縮圖根資料夾名稱，建立在所選資料夾底下
pub const THUMBNAIL_DIR_NAME: &str = ".seamless-thumbnails";

/// 未知長度時的尾幀基準秒數
const FALLBACK_END_SECONDS: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("沒有可比對的候選影片")]
    NoCandidates,

    #[error("無法建立縮圖資料夾 {path}: {source}")]
    ThumbnailFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub pixel_tolerance: f64,
    pub top_k: usize,
    /// 每比對幾組回報一次進度
    pub report_every: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pixel_tolerance: DEFAULT_PIXEL_TOLERANCE,
            top_k: 20,
            report_every: 400,
        }
    }
}

impl From<&UserSettings> for EngineOptions {
    fn from(settings: &UserSettings) -> Self {
        Self {
            pixel_tolerance: settings.pixel_tolerance,
            top_k: settings.top_k,
            report_every: settings.report_every,
        }
    }
}

/// 一次執行的結果摘要
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub phase: RunPhase,
    pub checked: u64,
    pub total: u64,
    pub matches: usize,
    /// 縮圖擷取失敗的候選索引（遞增）
    pub failed_videos: Vec<usize>,
    pub thumb_dir: PathBuf,
}

/// 在 `<base>/.seamless-thumbnails/` 底下建立以 UTC 時間命名的資料夾
pub fn ensure_thumb_folder(base: &Path) -> io::Result<PathBuf> {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
    let dir = base.join(THUMBNAIL_DIR_NAME).join(stamp);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[must_use]
pub fn start_thumb_name(index: usize) -> String {
    format!("start_{index}.png")
}

#[must_use]
pub fn end_thumb_name(index: usize) -> String {
    format!("end_{index}.png")
}

#[must_use]
pub fn diff_thumb_name(from: usize, to: usize, match_percent: f64) -> String {
    format!("diff_end_{from}_start_{to}_match_{match_percent:.2}.png")
}

/// 尾幀擷取所用的影片長度
fn end_frame_seconds(duration: Option<f64>) -> f64 {
    duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map_or(FALLBACK_END_SECONDS, |d| (d * 0.999).max(FALLBACK_END_SECONDS))
}

pub struct ComparisonEngine<'a> {
    grabber: &'a dyn FrameGrabber,
    comparator: &'a dyn ImageComparator,
    sink: &'a dyn EventSink,
    control: &'a RunControl,
    thumbnail_base: PathBuf,
    options: EngineOptions,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(
        grabber: &'a dyn FrameGrabber,
        comparator: &'a dyn ImageComparator,
        sink: &'a dyn EventSink,
        control: &'a RunControl,
        thumbnail_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            grabber,
            comparator,
            sink,
            control,
            thumbnail_base: thumbnail_base.into(),
            options: EngineOptions::default(),
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// 執行一次完整的擷取與比對
    ///
    /// 開始時會重設 [`RunControl`]。取消不是錯誤，會以
    /// [`RunPhase::Cancelled`] 的摘要正常回傳。
    ///
    /// # Errors
    ///
    /// 沒有候選影片或無法建立縮圖資料夾時，在進入任何階段前回傳錯誤。
    pub fn start_run(
        &self,
        candidates: &[VideoRecord],
        match_threshold: f64,
    ) -> Result<RunSummary, RunError> {
        if candidates.is_empty() {
            warn!("沒有候選影片，略過比對");
            self.emit_progress(
                ProgressUpdate::new(RunPhase::NoCandidates, 0, 0).with_message("沒有可比對的影片"),
            );
            return Err(RunError::NoCandidates);
        }

        self.control.reset();

        let thumb_dir = ensure_thumb_folder(&self.thumbnail_base).map_err(|source| {
            let err = RunError::ThumbnailFolder {
                path: self.thumbnail_base.join(THUMBNAIL_DIR_NAME),
                source,
            };
            error!("{err}");
            self.sink.emit(LoopEvent::Error {
                message: err.to_string(),
            });
            err
        })?;

        info!(
            "開始比對 {} 部影片，門檻 {match_threshold:.2}%，縮圖資料夾: {}",
            candidates.len(),
            thumb_dir.display()
        );
        self.sink.emit(LoopEvent::ResultsCleared);

        let failed_videos = self.thumbnail_phase(candidates, &thumb_dir);

        let total = candidates.len() as u64 * candidates.len() as u64;
        if self.control.is_cancel_requested() {
            info!("縮圖階段已取消");
            self.emit_progress(
                ProgressUpdate::new(RunPhase::Cancelled, 0, total).with_message("已取消"),
            );
            return Ok(RunSummary {
                phase: RunPhase::Cancelled,
                checked: 0,
                total,
                matches: 0,
                failed_videos,
                thumb_dir,
            });
        }

        let summary = self.compare_phase(candidates, match_threshold, &thumb_dir, total);

        info!(
            "比對結束（{}）：{}/{} 組，符合 {} 組",
            summary.phase, summary.checked, summary.total, summary.matches
        );

        Ok(RunSummary {
            failed_videos,
            ..summary
        })
    }

    /// 平行擷取縮圖，回傳失敗的影片索引
    fn thumbnail_phase(&self, candidates: &[VideoRecord], thumb_dir: &Path) -> Vec<usize> {
        let total = candidates.len() as u64 * 2;
        let progress = Mutex::new(0u64);
        let failed = Mutex::new(Vec::new());

        self.emit_progress(
            ProgressUpdate::new(RunPhase::Thumbnails, 0, total).with_message("產生縮圖中"),
        );

        candidates
            .par_iter()
            .enumerate()
            .for_each(|(index, video)| {
                if !self.control.wait_while_paused() {
                    return;
                }

                if let Err(e) = self.extract_thumbnails(index, video, thumb_dir) {
                    error!("縮圖擷取失敗 {}: {e}", video.path.display());
                    failed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(index);
                }

                // 在鎖內送出，確保 current 遞增
                let mut current = progress.lock().unwrap_or_else(PoisonError::into_inner);
                *current += 2;
                self.emit_progress(
                    ProgressUpdate::new(RunPhase::Thumbnails, *current, total)
                        .with_message(format!("縮圖 {}/{}", *current / 2, candidates.len())),
                );
            });

        let mut failed = failed.into_inner().unwrap_or_else(PoisonError::into_inner);
        failed.sort_unstable();
        failed
    }

    fn extract_thumbnails(
        &self,
        index: usize,
        video: &VideoRecord,
        thumb_dir: &Path,
    ) -> Result<(), ExtractError> {
        let (width, height) =
            video
                .dimensions()
                .ok_or(ExtractError::InvalidTargetSize {
                    width: video.width.unwrap_or(0),
                    height: video.height.unwrap_or(0),
                })?;
        let size = compute_size(width, height);

        extract_frame(
            self.grabber,
            &video.path,
            &thumb_dir.join(start_thumb_name(index)),
            None,
            size,
        )?;

        let outcome = extract_frame(
            self.grabber,
            &video.path,
            &thumb_dir.join(end_thumb_name(index)),
            Some(end_frame_seconds(video.duration_seconds)),
            size,
        )?;
        if outcome == FrameOutcome::Degraded {
            debug!("{} 的尾幀以首幀代替", video.display_name);
        }

        Ok(())
    }

    fn compare_phase(
        &self,
        candidates: &[VideoRecord],
        match_threshold: f64,
        thumb_dir: &Path,
        total: u64,
    ) -> RunSummary {
        let report_every = self.options.report_every.max(1);
        let mut overall = TopMatchesTracker::new(self.options.top_k);
        let mut batch = TopMatchesTracker::new(self.options.top_k);
        let mut checked = 0u64;
        let mut matches = 0usize;
        let mut cancelled = false;

        self.emit_progress(
            ProgressUpdate::new(RunPhase::Comparing, 0, total).with_message("比對中"),
        );

        'outer: for (i, from) in candidates.iter().enumerate() {
            if self.control.is_cancel_requested() {
                cancelled = true;
                break;
            }

            for (j, to) in candidates.iter().enumerate() {
                if !self.control.wait_while_paused() {
                    cancelled = true;
                    break 'outer;
                }

                checked += 1;

                // 解析度不同不可能無縫銜接，不呼叫比對器
                if from.dimensions() == to.dimensions() {
                    let match_percent = self.compare_pair(i, j, match_threshold, thumb_dir);

                    if match_percent >= match_threshold {
                        if self.control.is_cancel_requested() {
                            cancelled = true;
                            break 'outer;
                        }
                        let result = self.build_result(
                            (i, from),
                            (j, to),
                            match_percent,
                            thumb_dir,
                        );
                        self.sink.emit(LoopEvent::Match(result));
                        matches += 1;
                    }

                    overall.add(&from.display_name, &to.display_name, match_percent);
                    batch.add(&from.display_name, &to.display_name, match_percent);
                }

                if checked % report_every == 0 || checked == total {
                    self.emit_progress(ProgressUpdate {
                        phase: Some(RunPhase::Comparing),
                        current: checked,
                        total,
                        message: Some(format!("已比對 {checked}/{total} 組")),
                        top_batch: Some(batch.top()),
                        top_overall: Some(overall.top()),
                    });
                }
            }
        }

        let (phase, message) = if cancelled {
            (RunPhase::Cancelled, format!("已取消，完成 {checked}/{total} 組"))
        } else {
            (RunPhase::Completed, format!("完成，共比對 {checked} 組"))
        };

        self.emit_progress(ProgressUpdate {
            phase: Some(phase),
            current: checked,
            total,
            message: Some(message),
            top_batch: Some(batch.top()),
            top_overall: Some(overall.top()),
        });

        RunSummary {
            phase,
            checked,
            total,
            matches,
            failed_videos: Vec::new(),
            thumb_dir: thumb_dir.to_path_buf(),
        }
    }

    /// 比對失敗時記錄錯誤並視為 0%
    fn compare_pair(&self, from: usize, to: usize, match_threshold: f64, thumb_dir: &Path) -> f64 {
        let options = CompareOptions {
            pixel_tolerance: self.options.pixel_tolerance,
            diff_min_match: Some(match_threshold),
        };
        let end = thumb_dir.join(end_thumb_name(from));
        let start = thumb_dir.join(start_thumb_name(to));

        match self.comparator.compare(&end, &start, &options) {
            Ok(comparison) => {
                if let Some(diff) = comparison.diff {
                    let path = thumb_dir.join(diff_thumb_name(from, to, comparison.match_percent));
                    if let Err(e) = diff.save(&path) {
                        warn!("無法儲存差異圖 {}: {e}", path.display());
                    }
                }
                comparison.match_percent
            }
            Err(e) => {
                error!("比對失敗 {from}-{to}: {e}");
                0.0
            }
        }
    }

    fn build_result(
        &self,
        (i, from): (usize, &VideoRecord),
        (j, to): (usize, &VideoRecord),
        match_percent: f64,
        thumb_dir: &Path,
    ) -> MatchResult {
        let diff_name = diff_thumb_name(i, j, match_percent);
        let diff_thumb = thumb_dir
            .join(&diff_name)
            .exists()
            .then(|| thumb_reference(thumb_dir, &diff_name));

        MatchResult {
            id: format!("{i}-{j}"),
            from: video_ref(from),
            to: video_ref(to),
            match_percent,
            resolution: from.resolution_label(),
            from_thumb: thumb_reference(thumb_dir, &end_thumb_name(i)),
            to_thumb: thumb_reference(thumb_dir, &start_thumb_name(j)),
            diff_thumb,
        }
    }

    fn emit_progress(&self, update: ProgressUpdate) {
        self.sink.emit(LoopEvent::Progress(update));
    }
}

fn video_ref(video: &VideoRecord) -> VideoRef {
    VideoRef {
        name: video.display_name.clone(),
        path: video.path.to_string_lossy().into_owned(),
    }
}
