//! `turnstream config`: configuration inspection.

use std::path::Path;

use clap::Subcommand;
use turnstream_config::AppConfig;

const REDACTED: &str = "***REDACTED***";

#[derive(Debug, Clone, Copy, Default, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    #[default]
    Show,
    /// Print the default config file location
    Path,
    /// Print a config file containing every default
    Defaults,
    /// Load and validate the configuration
    Validate,
}

pub fn run(
    config_path: Option<&Path>,
    action: ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = AppConfig::load(config_path)?;
            println!("{}", redacted_toml(&config)?);
        }
        ConfigAction::Path => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
            println!("{}", path.display());
        }
        ConfigAction::Defaults => println!("{}", AppConfig::default_toml()),
        ConfigAction::Validate => validate(config_path)?,
    }
    Ok(())
}

fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    println!("Config OK");

    let mut warnings = Vec::new();
    if config.model.api_key.is_none() {
        warnings.push("No API key set (set TURNSTREAM_API_KEY or OPENAI_API_KEY)");
    }
    if config.gateway.tokens.is_empty() {
        warnings.push("No [gateway.tokens] configured; every /v1 request will be rejected");
    }
    for w in &warnings {
        println!("   warning: {w}");
    }

    println!("   Model:      {} via {}", config.model.name, config.model.base_url);
    println!(
        "   Gateway:    {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "   Iterations: {} (tool timeout {}s, concurrency {})",
        config.agent.max_iterations, config.agent.tool_timeout_secs, config.agent.tool_concurrency
    );
    Ok(())
}

/// Render `config` as TOML with the API key and bearer tokens replaced.
/// Token subjects stay visible.
pub fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut config = config.clone();
    if config.model.api_key.is_some() {
        config.model.api_key = Some(REDACTED.into());
    }
    config.gateway.tokens = config
        .gateway
        .tokens
        .into_values()
        .enumerate()
        .map(|(i, subject)| (format!("{REDACTED}{}", i + 1), subject))
        .collect();
    toml::to_string_pretty(&config)
}
