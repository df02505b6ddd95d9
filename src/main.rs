use anyhow::Result;
use console::{Term, style};
use log::{info, warn};
use rust_i18n::t;
use seamless_loop_finder::config::Config;
use seamless_loop_finder::init;
use seamless_loop_finder::menu::show_main_menu;
use seamless_loop_finder::signal::setup_cancel_signal;

#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en-US");

fn main() -> Result<()> {
    init::init();
    let term = Term::stdout();
    let control = setup_cancel_signal()?;

    let mut config = Config::new()?;
    rust_i18n::set_locale(config.settings.language.as_str());

    loop {
        match show_main_menu(&term, &control, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style(t!("main_menu.goodbye")).green().bold());
                info!("程式正常結束");
                break;
            }
            Err(e) => {
                warn!("程式錯誤: {e}");
                eprintln!("{} {}", style(t!("main_menu.error_prefix")).red().bold(), e);
                break;
            }
        }
    }

    Ok(())
}
