//! `turnstream serve`: start the HTTP gateway.

use std::path::Path;

use turnstream_config::AppConfig;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    eprintln!("turnstream gateway");
    eprintln!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    eprintln!("   Model:     {} ({})", config.model.name, config.model.provider);
    eprintln!("   Tokens:    {}", config.gateway.tokens.len());

    turnstream_gateway::start(config).await?;

    Ok(())
}
