//! `deskpilot config`: Configuration management commands.

use deskpilot_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", AppConfig::config_path().display());

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed and validated");

            if !config.has_api_key() {
                println!("   Warning: no API key set (DESKPILOT_API_KEY, OPENAI_API_KEY or GEMINI_API_KEY)");
            }
            if config.gateway.host == "0.0.0.0" {
                println!("   Warning: gateway bound to all interfaces");
            }

            println!();
            println!("   Provider:   {}", config.default_provider);
            println!("   Model:      {}", config.default_model);
            println!("   Gateway:    {}:{}", config.gateway.host, config.gateway.port);
            println!("   Memory:     {} ({})", config.memory.backend, config.memory_path().display());
            println!(
                "   Loop:       {} iterations, doom loop {}/{}",
                config.agent.max_iterations, config.agent.doom_loop_exact, config.agent.doom_loop_name
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&masked(config))?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn masked(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "********";
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}
