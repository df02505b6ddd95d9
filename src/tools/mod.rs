mod ffprobe_info;
mod path_validator;
mod process_runner;
mod video_scanner;

pub use ffprobe_info::{VideoInfo, get_video_info};
pub use path_validator::{ensure_within_root, validate_directory_exists};
pub use process_runner::run_with_timeout;
pub use video_scanner::{SCAN_REPORT_EVERY, ScanProgress, VideoRecord, scan_video_folder};
