use crate::component::loop_finder::RunControl;
use anyhow::{Context, Result};
use std::process;
use std::sync::Arc;

/// Ctrl-C 會要求取消目前的比對；已在取消中再按一次則直接結束程式
pub fn setup_cancel_signal() -> Result<Arc<RunControl>> {
    let control = Arc::new(RunControl::new());
    let signal_control = Arc::clone(&control);

    ctrlc::set_handler(move || {
        if signal_control.is_cancel_requested() {
            eprintln!("\n再次收到中斷信號，強制結束");
            process::exit(130);
        }
        signal_control.request_cancel();
        eprintln!("\n收到中斷信號，正在停止比對...（再按一次強制結束）");
    })
    .context("無法設定 Ctrl-C 處理器")?;

    Ok(control)
}
