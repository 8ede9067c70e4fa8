//! Subcommand handlers.

use std::path::Path;

use libpal_core::config::{LibpalConfig, load_config, workspace_config_path};
use libpal_core::providers::GenerationRequest;
use libpal_core::{create_embedder, create_generator};

use crate::{Commands, ConfigAction};

pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Check => handle_check(workspace).await,
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&config_path, LibpalConfig::default().to_toml()?)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Send each backend a tiny request and report whether it answered.
async fn handle_check(workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config.validate()?;

    let embedder = create_embedder(&config.embedding)?;
    match embedder.embed(&["connection test".to_string()]).await {
        Ok(_) => println!(
            "  \x1b[32mok\x1b[0m   embeddings: {} ({} dims)",
            embedder.provider_name(),
            embedder.dimensions()
        ),
        Err(e) => println!("  \x1b[31mfail\x1b[0m embeddings: {e}"),
    }

    let generator = create_generator(&config.generation)?;
    let request = GenerationRequest {
        prompt: "Hello".to_string(),
        temperature: config.generation.temperature,
        max_tokens: 16,
    };
    match generator.generate(&request).await {
        Ok(_) => println!("  \x1b[32mok\x1b[0m   generation: {}", generator.model_name()),
        Err(e) => println!("  \x1b[31mfail\x1b[0m generation: {e}"),
    }
    Ok(())
}
