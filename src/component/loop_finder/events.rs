//! 比對過程對外送出的事件
//!
//! 引擎只負責產生事件，傳遞方式由呼叫端的 [`EventSink`] 決定。

use super::top_matches::TopMatch;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    Thumbnails,
    Comparing,
    Completed,
    Cancelled,
    NoCandidates,
}

impl RunPhase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoCandidates)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thumbnails => write!(f, "產生縮圖"),
            Self::Comparing => write!(f, "比對中"),
            Self::Completed => write!(f, "完成"),
            Self::Cancelled => write!(f, "已取消"),
            Self::NoCandidates => write!(f, "沒有候選影片"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub phase: Option<RunPhase>,
    pub current: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_batch: Option<Vec<TopMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_overall: Option<Vec<TopMatch>>,
}

impl ProgressUpdate {
    #[must_use]
    pub const fn new(phase: RunPhase, current: u64, total: u64) -> Self {
        Self {
            phase: Some(phase),
            current,
            total,
            message: None,
            top_batch: None,
            top_overall: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRef {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// `"<from 索引>-<to 索引>"`
    pub id: String,
    pub from: VideoRef,
    pub to: VideoRef,
    pub match_percent: f64,
    pub resolution: String,
    pub from_thumb: String,
    pub to_thumb: String,
    pub diff_thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LoopEvent {
    Progress(ProgressUpdate),
    #[serde(rename = "result")]
    Match(MatchResult),
    ResultsCleared,
    Error { message: String },
}

/// 事件接收端
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoopEvent);
}

impl EventSink for Sender<LoopEvent> {
    fn emit(&self, event: LoopEvent) {
        // 接收端已關閉時直接丟棄
        let _ = self.send(event);
    }
}

/// 以閉包接收事件
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(LoopEvent) + Send + Sync,
{
    fn emit(&self, event: LoopEvent) {
        (self.0)(event);
    }
}

/// 縮圖對外的參照路徑 `/thumbs/<執行資料夾>/<檔名>`
#[must_use]
pub fn thumb_reference(thumb_dir: &Path, file_name: &str) -> String {
    let folder = thumb_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/thumbs/{folder}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;

    #[test]
    fn test_event_tags() {
        let progress = LoopEvent::Progress(ProgressUpdate::new(RunPhase::Comparing, 4, 9));
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["phase"], "comparing");
        assert!(json.get("message").is_none());

        let cleared = serde_json::to_value(LoopEvent::ResultsCleared).unwrap();
        assert_eq!(cleared["type"], "results-cleared");

        let error = serde_json::to_value(LoopEvent::Error {
            message: "x".to_string(),
        })
        .unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "x");
    }

    #[test]
    fn test_match_event_is_tagged_result() {
        let event = LoopEvent::Match(MatchResult {
            id: "0-1".to_string(),
            from: VideoRef {
                name: "a.mp4".to_string(),
                path: "/v/a.mp4".to_string(),
            },
            to: VideoRef {
                name: "b.mp4".to_string(),
                path: "/v/b.mp4".to_string(),
            },
            match_percent: 91.5,
            resolution: "1920x1080".to_string(),
            from_thumb: "/thumbs/run/end_0.png".to_string(),
            to_thumb: "/thumbs/run/start_1.png".to_string(),
            diff_thumb: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["id"], "0-1");
        assert_eq!(json["from"]["name"], "a.mp4");
    }

    #[test]
    fn test_sinks_deliver_events() {
        let (tx, rx) = mpsc::channel::<LoopEvent>();
        tx.emit(LoopEvent::ResultsCleared);
        assert_eq!(rx.recv().unwrap(), LoopEvent::ResultsCleared);

        drop(rx);
        // 接收端關閉後不應 panic
        tx.emit(LoopEvent::ResultsCleared);

        let seen = Mutex::new(Vec::new());
        let sink = FnSink(|event: LoopEvent| seen.lock().unwrap().push(event));
        sink.emit(LoopEvent::ResultsCleared);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_thumb_reference_uses_run_folder_name() {
        let dir = Path::new("/videos/.seamless-thumbnails/2024-06-01T10-20-30");
        assert_eq!(
            thumb_reference(dir, "end_3.png"),
            "/thumbs/2024-06-01T10-20-30/end_3.png"
        );
    }
}
