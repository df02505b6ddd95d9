use super::comparison_engine::{ComparisonEngine, EngineOptions, RunSummary};
use super::events::{LoopEvent, RunPhase};
use super::filter_pipeline::{FilterMode, FilterTarget, MetadataFilter, Range, RegexRule, TimeRange};
use super::frame_extractor::FfmpegFrameGrabber;
use super::pixel_comparator::PixelComparator;
use super::run_control::RunControl;
use super::session::Session;
use super::top_matches::TopMatch;
use crate::config::Config;
use crate::config::save::record_recent_path;
use crate::tools::{VideoRecord, scan_video_folder};
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use console::{Key, Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// 無縫循環影片搜尋
///
/// 流程：
/// 1. 選擇資料夾並掃描影片
/// 2. 設定篩選條件（可略過）
/// 3. 擷取頭尾畫格並兩兩比對
/// 4. 即時列出相似度達門檻的組合
pub struct LoopFinder<'a> {
    config: &'a mut Config,
    control: Arc<RunControl>,
}

impl<'a> LoopFinder<'a> {
    pub const fn new(config: &'a mut Config, control: Arc<RunControl>) -> Self {
        Self { config, control }
    }

    pub fn run(&mut self) -> Result<()> {
        println!("{}", style("=== 無縫循環影片搜尋 ===").cyan().bold());

        let mut session = Session::new(self.config.root_folder.as_deref())?;
        if let Some(root) = session.root_folder() {
            println!(
                "{}",
                style(format!("限制根目錄: {}", root.display())).dim()
            );
        }

        let input_path = self.prompt_folder()?;
        let folder = session.select_folder(Path::new(&input_path))?;
        self.remember_folder(&folder);

        let videos = self.scan(&folder)?;
        if videos.is_empty() {
            println!("{}", style("找不到任何影片檔案").yellow());
            return Ok(());
        }
        session.set_videos(videos);
        print_videos(session.all_videos());

        let wants_filter = Confirm::new()
            .with_prompt("是否設定篩選條件？")
            .default(false)
            .interact()?;
        if wants_filter {
            let rules = prompt_rules()?;
            let metadata = prompt_metadata()?;
            session.apply_filters(&rules, &metadata)?;
        }

        let candidates = session.filtered_videos();
        let total_pairs = candidates.len() * candidates.len();
        println!(
            "\n{}",
            style(format!(
                "候選影片 {} 部，共需比對 {total_pairs} 組（門檻 {:.2}%）",
                candidates.len(),
                self.config.settings.match_threshold
            ))
            .green()
        );

        if candidates.is_empty() {
            println!("{}", style("沒有符合條件的影片").yellow());
            return Ok(());
        }

        let confirmed = Confirm::new()
            .with_prompt("開始比對？")
            .default(true)
            .interact()?;
        if !confirmed {
            println!("{}", style("已取消").yellow());
            return Ok(());
        }

        let (summary, top) = self.run_comparison(candidates, &folder)?;
        print_summary(&summary, &top);

        Ok(())
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.settings.command_timeout_secs.max(1))
    }

    fn prompt_folder(&self) -> Result<String> {
        let recent = &self.config.settings.recent_paths;

        if !recent.is_empty() {
            let mut items: Vec<String> = recent.clone();
            items.push("輸入新路徑".to_string());

            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("選擇影片資料夾")
                .items(&items)
                .default(0)
                .interact()?;

            if selection < recent.len() {
                return Ok(recent[selection].clone());
            }
        }

        let path: String = Input::new()
            .with_prompt("請輸入影片資料夾路徑")
            .interact_text()?;
        Ok(path.trim().to_string())
    }

    fn remember_folder(&mut self, folder: &Path) {
        let path = folder.to_string_lossy();
        if let Err(e) = record_recent_path(&mut self.config.settings, &path) {
            warn!("無法儲存最近使用的路徑: {e}");
        }
    }

    fn scan(&self, folder: &Path) -> Result<Vec<VideoRecord>> {
        println!("{}", style("掃描影片檔案中...").dim());

        let progress_bar = new_progress_bar(0);
        progress_bar.set_message("讀取影片資訊...");

        let on_progress = |done: usize, total: usize| {
            progress_bar.set_length(total as u64);
            progress_bar.set_position(done as u64);
        };
        let videos = scan_video_folder(
            folder,
            &self.config.file_type_table,
            self.command_timeout(),
            &on_progress,
        );

        progress_bar.finish_and_clear();
        let videos = videos?;
        info!("掃描完成: {} 部影片", videos.len());
        Ok(videos)
    }

    /// 在背景執行比對，主執行緒負責顯示事件
    fn run_comparison(
        &self,
        candidates: &[VideoRecord],
        folder: &Path,
    ) -> Result<(RunSummary, Vec<TopMatch>)> {
        let grabber = FfmpegFrameGrabber::new(self.command_timeout());
        let comparator = PixelComparator;
        let options = EngineOptions::from(&self.config.settings);
        let threshold = self.config.settings.match_threshold;
        let control = self.control.as_ref();
        let progress_bar = new_progress_bar(0);
        let finished = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<LoopEvent>();

        println!("{}", style("按 p 暫停/繼續，按 q 取消").dim());

        thread::scope(|scope| -> Result<(RunSummary, Vec<TopMatch>)> {
            let engine_handle = scope.spawn(move || {
                let engine = ComparisonEngine::new(&grabber, &comparator, &tx, control, folder)
                    .with_options(options);
                engine.start_run(candidates, threshold)
            });

            scope.spawn(|| listen_keys(control, &progress_bar, &finished));

            let top = render_events(&rx, &progress_bar);
            finished.store(true, Ordering::SeqCst);
            println!("{}", style("按任意鍵返回...").dim());

            let summary = engine_handle
                .join()
                .map_err(|_| anyhow!("比對執行緒異常終止"))??;
            Ok((summary, top))
        })
    }
}

fn new_progress_bar(len: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(len);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    progress_bar
}

/// 比對期間讀取按鍵：p 暫停或繼續，q / Esc 取消
fn listen_keys(control: &RunControl, progress_bar: &ProgressBar, finished: &AtomicBool) {
    let term = Term::stdout();
    if !term.is_term() {
        return;
    }

    while !finished.load(Ordering::SeqCst) {
        let Ok(key) = term.read_key() else {
            return;
        };
        if finished.load(Ordering::SeqCst) {
            return;
        }

        match key {
            Key::Char('p' | 'P') => {
                let message = if control.toggle_pause() {
                    "已暫停，按 p 繼續"
                } else {
                    "繼續比對"
                };
                progress_bar.println(format!("{}", style(message).yellow()));
            }
            Key::Char('q' | 'Q') | Key::Escape => {
                control.request_cancel();
                progress_bar.println(format!("{}", style("正在取消...").yellow()));
            }
            _ => {}
        }
    }
}

/// 顯示事件直到引擎結束，回傳最後的整體排名
fn render_events(rx: &Receiver<LoopEvent>, progress_bar: &ProgressBar) -> Vec<TopMatch> {
    let mut current_phase = None;
    let mut top = Vec::new();

    for event in rx {
        match event {
            LoopEvent::Progress(update) => {
                if update.phase != current_phase {
                    progress_bar.reset();
                    current_phase = update.phase;
                }
                progress_bar.set_length(update.total);
                progress_bar.set_position(update.current);
                if let Some(message) = update.message {
                    progress_bar.set_message(message);
                }
                if let Some(overall) = update.top_overall {
                    top = overall;
                }
                if update.phase.is_some_and(RunPhase::is_terminal) {
                    progress_bar.finish();
                }
            }
            LoopEvent::Match(result) => {
                progress_bar.println(format!(
                    "  {} {} → {} {} ({})",
                    style("✓").green(),
                    result.from.name,
                    result.to.name,
                    style(format!("{:.2}%", result.match_percent)).bold(),
                    result.resolution
                ));
            }
            LoopEvent::ResultsCleared => {}
            LoopEvent::Error { message } => {
                progress_bar.println(format!("{} {message}", style("錯誤:").red().bold()));
            }
        }
    }

    top
}

fn print_videos(videos: &[VideoRecord]) {
    println!(
        "{}",
        style(format!("找到 {} 個影片檔案", videos.len())).green()
    );

    for (index, video) in videos.iter().enumerate() {
        let duration = video
            .duration_seconds
            .map_or_else(|| "?".to_string(), |d| format!("{d:.1}s"));
        println!(
            "  {}. {} ({}, {})",
            index + 1,
            video.display_name,
            video.resolution_label(),
            duration
        );
    }
}

fn print_summary(summary: &RunSummary, top: &[TopMatch]) {
    println!();
    println!("{}", style("=== 比對結果 ===").cyan().bold());

    let phase = match summary.phase {
        RunPhase::Cancelled => style(summary.phase.to_string()).yellow(),
        _ => style(summary.phase.to_string()).green(),
    };
    println!("狀態: {phase}");
    println!("已比對: {}/{}", summary.checked, summary.total);
    println!("達門檻: {}", style(summary.matches).green());
    if !summary.failed_videos.is_empty() {
        println!(
            "縮圖失敗: {}",
            style(summary.failed_videos.len()).red()
        );
    }
    println!("縮圖資料夾: {}", summary.thumb_dir.display());

    if !top.is_empty() {
        println!();
        println!("{}", style("相似度排名:").bold());
        for (rank, entry) in top.iter().enumerate() {
            println!(
                "  {:>2}. {:.2}%  {} → {}",
                rank + 1,
                entry.match_percent,
                entry.from,
                entry.to
            );
        }
    }
}

fn prompt_rules() -> Result<Vec<RegexRule>> {
    let modes = [FilterMode::Include, FilterMode::Exclude];
    let targets = [
        FilterTarget::BaseName,
        FilterTarget::Extension,
        FilterTarget::FullName,
    ];
    let mut rules = Vec::new();

    loop {
        let add_more = Confirm::new()
            .with_prompt(format!("新增正規表示式規則？（目前 {} 條）", rules.len()))
            .default(rules.is_empty())
            .interact()?;
        if !add_more {
            break;
        }

        let pattern: String = Input::new()
            .with_prompt("樣式")
            .allow_empty(true)
            .interact_text()?;

        let mode = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("模式")
            .items(&modes)
            .default(0)
            .interact()?;

        let target = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("比對欄位")
            .items(&targets)
            .default(0)
            .interact()?;

        rules.push(RegexRule::new(pattern, modes[mode], targets[target]));
    }

    Ok(rules)
}

fn prompt_metadata() -> Result<MetadataFilter> {
    let wants_metadata = Confirm::new()
        .with_prompt("設定大小、時間或解析度範圍？")
        .default(false)
        .interact()?;
    if !wants_metadata {
        return Ok(MetadataFilter::default());
    }

    println!("{}", style("留空表示不限制").dim());

    Ok(MetadataFilter {
        size_mb: prompt_range("檔案大小 (MB)")?,
        created: prompt_time_range("建立日期")?,
        modified: prompt_time_range("修改日期")?,
        duration_seconds: prompt_range("長度 (秒)")?,
        width: prompt_range("寬度")?,
        height: prompt_range("高度")?,
        aspect_ratio: prompt_range("長寬比 (寬/高)")?,
    })
}

fn prompt_range(label: &str) -> Result<Range> {
    Ok(Range::new(
        prompt_optional(&format!("{label} 最小值"), |s| s.parse::<f64>().ok())?,
        prompt_optional(&format!("{label} 最大值"), |s| s.parse::<f64>().ok())?,
    ))
}

fn prompt_time_range(label: &str) -> Result<TimeRange> {
    Ok(TimeRange {
        after: prompt_optional(&format!("{label} 起 (YYYY-MM-DD)"), |s| {
            parse_date(s, false)
        })?,
        before: prompt_optional(&format!("{label} 迄 (YYYY-MM-DD)"), |s| {
            parse_date(s, true)
        })?,
    })
}

/// 迄日包含當天整天
fn parse_date(input: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(time.and_utc())
}

fn prompt_optional<T>(prompt: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .validate_with(|s: &String| -> Result<(), &str> {
            if s.trim().is_empty() || parse(s.trim()).is_some() {
                Ok(())
            } else {
                Err("格式不正確")
            }
        })
        .interact_text()?;

    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    Ok(parse(input))
}
