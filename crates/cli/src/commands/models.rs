//! `steward models`: Inspect the registry and dry-run model selection.

use std::sync::Arc;

use clap::ValueEnum;
use steward_config::AppConfig;
use steward_providers::{ModelConfig, ModelRegistry, ModelSelector, SelectionCriteria, SelectionStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Specified,
    Capability,
    CostFirst,
}

impl From<StrategyArg> for SelectionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Specified => Self::Specified,
            StrategyArg::Capability => Self::Capability,
            StrategyArg::CostFirst => Self::CostFirst,
        }
    }
}

pub fn criteria(
    tools: bool,
    image: bool,
    provider: Option<String>,
    tag: Option<String>,
    exclude_local: bool,
    max_cost_input: f64,
    min_context: usize,
) -> SelectionCriteria {
    SelectionCriteria {
        preferred_provider: provider,
        preferred_tag: tag,
        exclude_local,
        max_cost_input,
        min_context_window: min_context,
        ..SelectionCriteria::for_task(tools, image)
    }
}

pub fn list(config: &AppConfig, available_only: bool) {
    let registry = ModelRegistry::from_config(config);
    let models = if available_only {
        registry.list_available_models()
    } else {
        registry.list_models()
    };

    println!("🤖 Models");
    println!("──────────────────────────────────────────────────────────────────────────");
    println!(
        "{:<22} {:<10} {:>5} {:>6} {:>9} {:>9} {:>9}",
        "Key", "Provider", "Tools", "Image", "Context", "In $/M", "Out $/M"
    );
    for m in &models {
        let marker = if m.key == config.default_model { "*" } else { " " };
        println!(
            "{marker}{:<21} {:<10} {:>5} {:>6} {:>9} {:>9.3} {:>9.3}",
            m.key,
            m.provider,
            yes_no(m.supports_function_calling),
            yes_no(m.supports_image()),
            m.context_window,
            m.cost_input,
            m.cost_output,
        );
    }
    println!();
    println!("  {} model(s), * = default", models.len());
}

pub fn select(
    config: &AppConfig,
    strategy: StrategyArg,
    model_key: Option<&str>,
    criteria: &SelectionCriteria,
) -> anyhow::Result<()> {
    let selector = selector(config);
    let model = selector.select(strategy.into(), model_key, criteria)?;
    print_model(&model);
    Ok(())
}

fn selector(config: &AppConfig) -> ModelSelector {
    let registry = Arc::new(ModelRegistry::from_config(config));
    ModelSelector::new(registry, config.default_model.clone())
}

fn print_model(model: &ModelConfig) {
    println!("✅ Selected {} ({})", model.key, model.name);
    println!("   Provider:       {}", model.provider);
    println!("   Model id:       {}", model.id);
    println!("   Context window: {}", model.context_window);
    println!(
        "   Price:          ${:.3} in / ${:.3} out per 1M tokens",
        model.cost_input, model.cost_output
    );
    if !model.tags.is_empty() {
        println!("   Tags:           {}", model.tags.join(", "));
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
