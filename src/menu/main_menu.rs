use crate::component::loop_finder::RunControl;
use crate::config::save::save_settings;
use crate::config::types::{Config, Language};
use crate::menu::handlers::run_loop_finder;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn show_main_menu(
    term: &Term,
    control: &Arc<RunControl>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_loop_finder"),
        t!("main_menu.opt_settings"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_loop_finder(term, control, config)?;
            Ok(true)
        }
        Some(1) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(_) | None => Ok(false), // 離開或 ESC
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let options = vec![
            t!(
                "settings.opt_threshold",
                value = format!("{:.2}", config.settings.match_threshold)
            ),
            t!(
                "settings.opt_tolerance",
                value = format!("{:.3}", config.settings.pixel_tolerance)
            ),
            t!("settings.opt_language", value = config.settings.language),
            t!("settings.back"),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => show_threshold_menu(term, config)?,
            Some(1) => show_tolerance_menu(term, config)?,
            Some(2) => show_language_menu(term, config)?,
            _ => break, // ESC 或返回
        }
    }

    Ok(())
}

/// 讀取介於 `min` 與 `max` 之間的數值，回傳 `None` 表示未變更
fn prompt_bounded(
    term: &Term,
    prompt: &str,
    current: f64,
    min: f64,
    max: f64,
) -> Result<Option<f64>> {
    let value: f64 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(current)
        .validate_with(|v: &f64| -> Result<(), String> {
            if v.is_finite() && (min..=max).contains(v) {
                Ok(())
            } else {
                Err(t!("settings.out_of_range", min = min, max = max).to_string())
            }
        })
        .interact_text_on(term)?;

    Ok(((value - current).abs() > f64::EPSILON).then_some(value))
}

/// 相似度門檻設定
fn show_threshold_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;
    println!("{}", style(t!("settings.threshold.title")).cyan().bold());

    let Some(value) = prompt_bounded(
        term,
        &t!("settings.threshold.prompt"),
        config.settings.match_threshold,
        0.0,
        100.0,
    )?
    else {
        return Ok(());
    };

    config.settings.match_threshold = value;
    save_settings(&config.settings)?;
    println!("\n{} {value:.2}%", style(t!("settings.saved")).green());
    thread::sleep(Duration::from_secs(1));
    Ok(())
}

/// 像素容忍度設定
fn show_tolerance_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;
    println!("{}", style(t!("settings.tolerance.title")).cyan().bold());
    println!("{}", style(t!("settings.tolerance.hint")).dim());

    let Some(value) = prompt_bounded(
        term,
        &t!("settings.tolerance.prompt"),
        config.settings.pixel_tolerance,
        0.0,
        1.0,
    )?
    else {
        return Ok(());
    };

    config.settings.pixel_tolerance = value;
    save_settings(&config.settings)?;
    println!("\n{} {value:.3}", style(t!("settings.saved")).green());
    thread::sleep(Duration::from_secs(1));
    Ok(())
}

/// 語言設定選單
fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let languages = [Language::EnUs, Language::ZhTw];

    let items: Vec<String> = languages.iter().map(ToString::to_string).collect();

    let default_index = languages
        .iter()
        .position(|&l| l == config.settings.language)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.language.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    // ESC 不儲存
    let Some(selection) = selection else {
        return Ok(());
    };

    let selected_lang = languages[selection];

    if selected_lang != config.settings.language {
        config.settings.language = selected_lang;
        rust_i18n::set_locale(selected_lang.as_str());
        save_settings(&config.settings)?;
        println!(
            "\n{} {}",
            style(t!("settings.saved")).green(),
            selected_lang
        );
        thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}
