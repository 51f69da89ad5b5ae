//! `steward usage`: Pricing and cost estimates from the model tables.

use anyhow::bail;
use steward_config::AppConfig;
use steward_telemetry::{ModelPricing, PricingTable};

fn pricing_table(config: &AppConfig) -> PricingTable {
    PricingTable::from_entries(
        config
            .models
            .iter()
            .map(|(key, m)| (key.as_str(), ModelPricing::new(m.cost_input, m.cost_output))),
    )
}

/// List configured model pricing.
pub fn pricing(config: &AppConfig) {
    let table = pricing_table(config);
    let models = table.models();

    println!("💰 Model Pricing (per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<30} {:>10} {:>10}", "Model", "Input", "Output");

    for name in &models {
        if let Some(p) = table.get(name) {
            println!(
                "{:<30} ${:>8.3} ${:>8.3}",
                name, p.input_per_m, p.output_per_m
            );
        }
    }

    println!();
    println!("  {} models with pricing data", models.len());
}

/// Estimate cost for a given model and token counts.
pub fn estimate(
    config: &AppConfig,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> anyhow::Result<()> {
    let table = pricing_table(config);
    if table.get(model).is_none() {
        bail!("Model '{model}' is not configured. Use `steward usage pricing` to list models.");
    }

    let cost = table.compute_cost(model, input_tokens, output_tokens);
    println!("💵 Cost estimate for {model}");
    println!("   Input tokens:  {input_tokens}");
    println!("   Output tokens: {output_tokens}");
    println!("   Estimated cost: ${cost:.6}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_mirrors_config_prices() {
        let config = AppConfig::default();
        let table = pricing_table(&config);
        assert_eq!(table.len(), config.models.len());

        // 1M in at 0.27 + 1M out at 1.10
        let cost = table.compute_cost("deepseek-chat", 1_000_000, 1_000_000);
        assert!((cost - 1.37).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_an_error() {
        assert!(estimate(&AppConfig::default(), "ghost", 10, 10).is_err());
        assert!(estimate(&AppConfig::default(), "gpt-4o", 10, 10).is_ok());
    }
}
