use super::process_runner::run_with_timeout;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub duration_seconds: Option<f64>,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// 使用 ffprobe 取得影片資訊
pub fn get_video_info(path: &Path, timeout: Duration) -> Result<VideoInfo> {
    let mut command = Command::new("ffprobe");
    command
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);

    let output = run_with_timeout(command, timeout)
        .with_context(|| format!("無法執行 ffprobe: {}", path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffprobe 執行失敗: {}", stderr.trim());
    }

    parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("無法解析 ffprobe 輸出: {}", path.display()))
}

fn parse_ffprobe_output(stdout: &str) -> Result<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)?;

    // 第一個同時帶有寬高的視訊串流
    let video_stream = probe
        .streams
        .as_ref()
        .and_then(|streams| {
            streams.iter().find(|s| {
                s.codec_type.as_deref() == Some("video") && s.width.is_some() && s.height.is_some()
            })
        })
        .ok_or_else(|| anyhow::anyhow!("找不到視訊串流"))?;

    let (Some(width), Some(height)) = (video_stream.width, video_stream.height) else {
        bail!("無法取得影片解析度");
    };

    // 影片長度（優先從 format，其次從 stream）
    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .or(video_stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite());

    Ok(VideoInfo {
        duration_seconds,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_skips_streams_without_size() {
        let json = r#"{
            "format": {"duration": "12.5"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video"},
                {"codec_type": "video", "width": 1920, "height": 1080}
            ]
        }"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.duration_seconds, Some(12.5));
    }

    #[test]
    fn test_parse_output_duration_falls_back_to_stream() {
        let json = r#"{
            "format": {},
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "duration": "3.0"}]
        }"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert_eq!(info.duration_seconds, Some(3.0));
    }

    #[test]
    fn test_parse_output_without_video_fails() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_ffprobe_output(json).is_err());
    }
}
