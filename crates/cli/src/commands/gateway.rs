//! `deskpilot gateway`: Start the HTTP gateway.

use deskpilot_config::AppConfig;
use deskpilot_gateway::runtime::{demo_toolset, Runtime};

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("DeskPilot Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} ({})", config.default_model, config.default_provider);
    println!("   Memory:    {}", config.memory.backend);

    let toolsets = demo_toolset(&config.tools);
    let runtime = Runtime::from_config(config, toolsets).await?;
    deskpilot_gateway::start(runtime).await?;

    Ok(())
}
