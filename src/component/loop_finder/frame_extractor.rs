//! 頭尾畫格擷取
//!
//! 尾幀依序嘗試 duration−0.1s、duration−1s、duration−5s、duration/2，
//! 第一個產生大於 [`MIN_FRAME_BYTES`] 的檔案即視為成功。全部失敗時退回
//! 擷取首幀並記錄警告，損壞或過短的影片不會中止整個流程。

use super::thumbnail_sizer::ThumbnailSize;
use crate::tools::run_with_timeout;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// 「首幀」實際使用的時間點
pub const FIRST_FRAME_OFFSET: f64 = 0.1;

/// 小於此大小的輸出視為空白或損毀的畫格
pub const MIN_FRAME_BYTES: u64 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("縮圖尺寸無效: {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },
    #[error("畫格擷取失敗: {0}")]
    Grab(String),
    #[error("檔案操作失敗 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameTime {
    First,
    At(f64),
}

impl FrameTime {
    #[must_use]
    pub const fn seconds(self) -> f64 {
        match self {
            Self::First => FIRST_FRAME_OFFSET,
            Self::At(seconds) => seconds,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GrabRequest<'a> {
    pub video_path: &'a Path,
    pub output_path: &'a Path,
    pub at: FrameTime,
    pub size: ThumbnailSize,
}

/// 從影片擷取單一畫格並縮放成指定尺寸
pub trait FrameGrabber: Send + Sync {
    fn grab(&self, request: &GrabRequest<'_>) -> Result<(), ExtractError>;
}

/// 擷取結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// 在指定時間點取得有效畫格
    Exact { at_seconds: f64 },
    /// 所有候選時間點皆失敗，改用首幀
    Degraded,
}

/// 尾幀候選時間點（由晚到早）
#[must_use]
pub fn last_frame_candidates(duration: f64) -> [f64; 4] {
    [duration - 0.1, duration - 1.0, duration - 5.0, duration / 2.0]
}

/// 擷取畫格
///
/// `at_seconds` 為 `None` 時擷取首幀；否則視為影片長度並擷取尾幀。
pub fn extract_frame<G: FrameGrabber + ?Sized>(
    grabber: &G,
    video_path: &Path,
    output_path: &Path,
    at_seconds: Option<f64>,
    size: ThumbnailSize,
) -> Result<FrameOutcome, ExtractError> {
    if size.is_empty() {
        return Err(ExtractError::InvalidTargetSize {
            width: size.width,
            height: size.height,
        });
    }

    let candidates: Vec<FrameTime> = match at_seconds {
        Some(duration) => last_frame_candidates(duration)
            .into_iter()
            .map(FrameTime::At)
            .collect(),
        None => vec![FrameTime::First],
    };

    for at in candidates {
        let seconds = at.seconds();
        if !seconds.is_finite() || seconds < 0.0 {
            continue;
        }

        let request = GrabRequest {
            video_path,
            output_path,
            at,
            size,
        };

        match grabber.grab(&request) {
            Ok(()) if is_usable_frame(output_path) => {
                return Ok(FrameOutcome::Exact {
                    at_seconds: seconds,
                });
            }
            Ok(()) => debug!(
                "畫格過小，視為失敗 {} @ {seconds:.3}s",
                video_path.display()
            ),
            Err(e) => debug!("擷取失敗 {} @ {seconds:.3}s: {e}", video_path.display()),
        }

        remove_partial_output(output_path)?;
    }

    warn!("最後手段：以首幀代替 {} 的畫格", video_path.display());
    // 單色畫面壓縮後可能小於門檻，最後手段不檢查大小
    let last_resort = grabber.grab(&GrabRequest {
        video_path,
        output_path,
        at: FrameTime::First,
        size,
    });
    if let Err(e) = last_resort {
        remove_partial_output(output_path)?;
        return Err(e);
    }

    Ok(FrameOutcome::Degraded)
}

fn is_usable_frame(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > MIN_FRAME_BYTES)
}

fn remove_partial_output(path: &Path) -> Result<(), ExtractError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// 以 ffmpeg 擷取畫格
pub struct FfmpegFrameGrabber {
    timeout: Duration,
}

impl FfmpegFrameGrabber {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_args(request: &GrabRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
        ];

        // 尾幀需要精準 seek
        if matches!(request.at, FrameTime::At(_)) {
            args.push("-accurate_seek".to_string());
        }

        args.extend([
            "-ss".to_string(),
            format!("{:.3}", request.at.seconds()),
            "-i".to_string(),
            request.video_path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", request.size.width, request.size.height),
            request.output_path.to_string_lossy().to_string(),
        ]);

        args
    }
}

impl FrameGrabber for FfmpegFrameGrabber {
    fn grab(&self, request: &GrabRequest<'_>) -> Result<(), ExtractError> {
        let args = Self::build_args(request);
        debug!("ffmpeg {}", args.join(" "));

        let mut command = Command::new("ffmpeg");
        command.args(&args);

        let output = run_with_timeout(command, self.timeout)
            .map_err(|e| ExtractError::Grab(format!("{e:#}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Grab(format!(
                "ffmpeg 擷取失敗: {}",
                stderr.trim()
            )));
        }

        if !request.output_path.exists() {
            return Err(ExtractError::Grab(format!(
                "畫格檔案未建立: {}",
                request.output_path.display()
            )));
        }

        Ok(())
    }
}
