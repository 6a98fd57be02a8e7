//! Per-model USD pricing, looked up once per call so cost is always
//! recorded — including on a failed call, once tokens have been billed by
//! the provider.

/// Dollars per 1,000 tokens, input and output priced separately.
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPrice {
    #[must_use]
    pub fn cost_usd(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        (f64::from(tokens_in) / 1000.0) * self.input_per_1k
            + (f64::from(tokens_out) / 1000.0) * self.output_per_1k
    }
}

/// Looked up by exact model id; falls back to a conservative default for
/// any model not in the table so cost accounting never silently reports
/// zero for an unrecognized model.
#[must_use]
pub fn price_for(model_id: &str) -> ModelPrice {
    match model_id {
        "gpt-4o" => ModelPrice {
            input_per_1k: 0.0025,
            output_per_1k: 0.010,
        },
        "gpt-4o-mini" => ModelPrice {
            input_per_1k: 0.00015,
            output_per_1k: 0.0006,
        },
        "claude-3-5-sonnet-latest" | "claude-3-5-sonnet-20241022" => ModelPrice {
            input_per_1k: 0.003,
            output_per_1k: 0.015,
        },
        "claude-3-5-haiku-latest" => ModelPrice {
            input_per_1k: 0.0008,
            output_per_1k: 0.004,
        },
        _ => DEFAULT_PRICE,
    }
}

const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_1k: 0.005,
    output_per_1k: 0.015,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_has_asymmetric_pricing() {
        let price = price_for("gpt-4o-mini");
        assert!(price.output_per_1k > price.input_per_1k);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let price = price_for("some-future-model");
        assert_eq!(price.input_per_1k, DEFAULT_PRICE.input_per_1k);
    }

    #[test]
    fn cost_scales_with_token_counts() {
        let price = price_for("gpt-4o-mini");
        let cost = price.cost_usd(1000, 500);
        assert!((cost - (0.00015 + 0.0003)).abs() < 1e-9);
    }
}
