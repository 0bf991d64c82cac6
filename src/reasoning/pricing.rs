//! Per-model pricing and request cost calculation.
//!
//! Prices are USD per million tokens, taken from the provider's public
//! pricing page (February 2026). Update here when prices change. Unknown
//! model strings fall back to the capable-tier prices so cost tracking
//! overestimates rather than undercounts.

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
    pub cache_read_per_mtok: f64,
    pub cache_write_per_mtok: f64,
}

const CAPABLE_PRICING: ModelPricing = ModelPricing {
    input_per_mtok: 3.0,
    output_per_mtok: 15.0,
    cache_read_per_mtok: 0.30,
    cache_write_per_mtok: 3.75,
};

const FAST_PRICING: ModelPricing = ModelPricing {
    input_per_mtok: 1.0,
    output_per_mtok: 5.0,
    cache_read_per_mtok: 0.10,
    cache_write_per_mtok: 1.25,
};

/// Pricing for a model string, falling back to capable-tier prices.
pub fn pricing_for(model: &str) -> ModelPricing {
    if model.contains("haiku") {
        FAST_PRICING
    } else {
        CAPABLE_PRICING
    }
}

/// Cost of a single request in USD.
pub fn calculate_cost(
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_write_tokens: u64,
) -> f64 {
    let pricing = pricing_for(model);
    (input_tokens as f64 / 1_000_000.0) * pricing.input_per_mtok
        + (output_tokens as f64 / 1_000_000.0) * pricing.output_per_mtok
        + (cache_read_tokens as f64 / 1_000_000.0) * pricing.cache_read_per_mtok
        + (cache_write_tokens as f64 / 1_000_000.0) * pricing.cache_write_per_mtok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_model_is_cheaper() {
        let capable = calculate_cost("claude-sonnet-4-5-20250929", 10_000, 1_000, 0, 0);
        let fast = calculate_cost("claude-haiku-4-5-20251001", 10_000, 1_000, 0, 0);
        assert!(fast < capable);
    }

    #[test]
    fn known_capable_cost_exact() {
        // 1M input + 100k output on the capable tier: 3.0 + 1.5
        let cost = calculate_cost("claude-sonnet-4-5-20250929", 1_000_000, 100_000, 0, 0);
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn cache_tokens_priced_separately() {
        let without_cache = calculate_cost("claude-haiku-4-5-20251001", 1_000, 500, 0, 0);
        let with_cache = calculate_cost("claude-haiku-4-5-20251001", 1_000, 500, 50_000, 20_000);
        assert!(with_cache > without_cache);
    }

    #[test]
    fn unknown_model_falls_back_to_capable() {
        let unknown = pricing_for("experimental-model-x");
        assert!((unknown.input_per_mtok - CAPABLE_PRICING.input_per_mtok).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(calculate_cost("claude-haiku-4-5-20251001", 0, 0, 0, 0), 0.0);
    }
}
