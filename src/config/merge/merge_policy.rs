//! Merge rules: per-stage defaults that survive partially specified tables.

use crate::config::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_REFINEMENTS, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECS,
    DRAFT_TEMPERATURE, EVALUATE_TEMPERATURE, REFINE_TEMPERATURE,
};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = Config::builder();
    for (stage, temperature) in [
        ("draft", DRAFT_TEMPERATURE),
        ("evaluate", EVALUATE_TEMPERATURE),
        ("refine", REFINE_TEMPERATURE),
    ] {
        builder = builder
            .set_default(format!("stages.{}.temperature", stage), f64::from(temperature))?
            .set_default(
                format!("stages.{}.timeout_secs", stage),
                DEFAULT_TIMEOUT_SECS as i64,
            )?
            .set_default(
                format!("stages.{}.max_attempts", stage),
                i64::from(DEFAULT_MAX_ATTEMPTS),
            )?
            .set_default(
                format!("stages.{}.retry_delay_ms", stage),
                DEFAULT_RETRY_DELAY_MS as i64,
            )?;
    }
    builder.set_default("workflow.max_refinements", i64::from(DEFAULT_MAX_REFINEMENTS))
}
