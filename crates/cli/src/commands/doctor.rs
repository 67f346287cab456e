//! `turnstile doctor` — Diagnose configuration and capabilities.

use turnstile_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Turnstile Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (see `turnstile config --default`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    let caps = config.capabilities();
    if caps.web_search {
        println!("  ✅ web_search enabled (TAVILY_API_KEY set)");
    } else {
        println!("  ⚠️  web_search disabled — set TAVILY_API_KEY");
        issues += 1;
    }
    if caps.data_providers {
        println!("  ✅ data_providers enabled (RAPID_API_KEY and CREATOR_IQ_API_KEY set)");
    } else {
        println!("  ⚠️  data_providers disabled — needs both RAPID_API_KEY and CREATOR_IQ_API_KEY");
        issues += 1;
    }
    println!("     Tools: {}", caps.tool_names().join(", "));

    println!();
    println!("   Model:          {}", config.default_model);
    println!("   Max iterations: {}", config.agent.max_iterations);
    println!(
        "   Billing:        {}",
        if config.billing.enabled { "enabled" } else { "disabled" }
    );
    println!("   Store:          {}", config.store.backend);
    println!(
        "   Gateway:        {}:{}",
        config.gateway.host, config.gateway.port
    );

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
