/// Configuration command handlers
use anyhow::Result;
use scrollguard_core::config::{default_config_path, MonitorConfig, DESKTOP_WATCH_SET_EXAMPLE};

pub fn show_config() -> Result<()> {
    let path = default_config_path()?;
    let config = MonitorConfig::load(&path)?;

    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("defaults ({} not found)", path.display())
    };
    println!("# Effective configuration from {source}");
    print!("{}", config.to_toml()?);
    print!("{DESKTOP_WATCH_SET_EXAMPLE}");
    Ok(())
}
