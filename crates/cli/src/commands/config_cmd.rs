//! `turnstile config` — Show the effective configuration.

use turnstile_config::AppConfig;

pub async fn run(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    print!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}
