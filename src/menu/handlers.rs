use crate::component::LoopFinder;
use crate::component::loop_finder::RunControl;
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use std::sync::Arc;

pub fn run_loop_finder(term: &Term, control: &Arc<RunControl>, config: &mut Config) -> Result<()> {
    let mut finder = LoopFinder::new(config, Arc::clone(control));

    if let Err(e) = finder.run() {
        eprintln!("{} {:#}", style(t!("common.error_prefix")).red().bold(), e);
    }

    pause(term)?;
    Ok(())
}
