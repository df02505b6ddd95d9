use env_logger::Env;

/// 未設定 `RUST_LOG` 時的預設過濾條件
const DEFAULT_LOG_FILTER: &str = "warn,seamless_loop_finder=info";

/// 初始化日誌，重複呼叫時忽略
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .format_timestamp_secs()
        .format_target(false)
        .try_init();
}
