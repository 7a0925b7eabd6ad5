//! Merge rules: defaults, override order, conflict handling.
//!
//! Sources added later win key by key. Tables merge; scalars and arrays are
//! replaced.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Provider name every model role uses unless configured otherwise.
pub const DEFAULT_PROVIDER: &str = "default";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("models.tutor", DEFAULT_PROVIDER)?
        .set_default("models.generator", DEFAULT_PROVIDER)?
        .set_default("models.grader_primary", DEFAULT_PROVIDER)?
        .set_default("models.grader_fallback", DEFAULT_PROVIDER)
}
