//! `steward config`: Configuration management commands.

use std::path::Path;

use anyhow::{Context, bail};
use steward_config::{AppConfig, ConfigError};

pub fn validate(config: Result<AppConfig, ConfigError>) -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed and validated");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Default model:  {}", config.default_model);
    println!("   Models:         {}", config.models.len());
    println!("   Max steps:      {}", config.agent.max_steps);
    println!("   Context window: {}", config.session.context_window);
    if config.budget.daily_limit_usd > 0.0 {
        println!("   Daily budget:   ${:.2}", config.budget.daily_limit_usd);
    } else {
        println!("   Daily budget:   unlimited");
    }
    Ok(())
}

/// Problems that do not make the config invalid but will bite at runtime.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(default) = config.models.get(&config.default_model)
        && !default.api_key_env.is_empty()
        && default.api_key.is_none()
        && std::env::var(&default.api_key_env).is_err()
    {
        warnings.push(format!(
            "Default model '{}' needs {} to be set",
            config.default_model, default.api_key_env
        ));
    }
    if !config.models.values().any(|m| m.supports_function_calling) {
        warnings.push("No model supports function calling; tool use will fail".to_string());
    }
    if config.agent.anchor_interval == 0 {
        warnings.push("Task anchoring is disabled (agent.anchor_interval = 0)".to_string());
    }
    warnings
}

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(path: &Path) {
    println!("{}", path.display());
}

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✅ Wrote default configuration to {}", path.display());
    Ok(())
}
