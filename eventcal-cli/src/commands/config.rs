use anyhow::Result;
use eventcal_core::config::AppConfig;
use owo_colors::OwoColorize;

pub fn run(config: &AppConfig) -> Result<()> {
    let config_path = AppConfig::config_path()?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    println!("  Events:  {}", config.events_path()?.display());
    println!("  Log:     {}", config.log_path()?.display());

    println!();
    println!("{}", "Watch".bold());
    println!(
        "  Checks every {}",
        humantime::format_duration(config.poll_interval()?)
    );

    let toml = config.to_toml()?;
    if !toml.trim().is_empty() {
        println!();
        println!("{}", "Settings".bold());
        for line in toml.lines() {
            println!("  {}", line.dimmed());
        }
    }

    Ok(())
}
