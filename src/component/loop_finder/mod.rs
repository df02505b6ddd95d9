//! 無縫循環影片搜尋元件
//!
//! 找出「尾幀與另一部（或同一部）影片首幀幾乎相同」的組合：
//! A. 掃描並篩選候選影片
//! B. 平行擷取頭尾縮圖
//! C. 兩兩比對尾幀與首幀
//! D. 串流回報達門檻的結果與排名

mod comparison_engine;
mod events;
mod filter_pipeline;
mod frame_extractor;
mod main;
mod pixel_comparator;
mod run_control;
mod session;
mod thumbnail_sizer;
mod top_matches;

pub use comparison_engine::{
    ComparisonEngine, EngineOptions, RunError, RunSummary, THUMBNAIL_DIR_NAME, diff_thumb_name,
    end_thumb_name, ensure_thumb_folder, start_thumb_name,
};
pub use events::{
    EventSink, FnSink, LoopEvent, MatchResult, ProgressUpdate, RunPhase, VideoRef,
    thumb_reference,
};
pub use filter_pipeline::{
    FilterError, FilterMode, FilterTarget, MetadataFilter, Range, RegexRule, TimeRange,
    apply as apply_filters,
};
pub use frame_extractor::{
    ExtractError, FIRST_FRAME_OFFSET, FfmpegFrameGrabber, FrameGrabber, FrameOutcome, FrameTime,
    GrabRequest, MIN_FRAME_BYTES, extract_frame, last_frame_candidates,
};
pub use main::LoopFinder;
pub use pixel_comparator::{
    CompareError, CompareOptions, Comparison, DEFAULT_PIXEL_TOLERANCE, ImageComparator,
    PixelComparator,
};
pub use run_control::{RunControl, RunState};
pub use session::Session;
pub use thumbnail_sizer::{MAX_SIDE, MIN_SIDE, ThumbnailSize, compute_size};
pub use top_matches::{TopMatch, TopMatchesTracker};
