//! Selector configuration

use crate::query::WILDCARD_QUERY;
use crate::{Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Default latency bound for the bandwidth objective in ms (9 decimal precision)
pub const DEFAULT_LATENCY_BOUND_MS: f64 = 100.000000000;

/// Selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Latency bound used by the bandwidth objective when none is given
    pub latency_bound_ms: f64,
    /// Policy query must consume every hop of a candidate chain
    pub require_full_coverage: bool,
    /// Fall back to the plain path when the capability dataplane cannot be built
    pub fallback_to_plain_dataplane: bool,
    /// Query applied when no policy query is given
    pub wildcard_query: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            latency_bound_ms: DEFAULT_LATENCY_BOUND_MS,
            require_full_coverage: false,
            fallback_to_plain_dataplane: true,
            wildcard_query: WILDCARD_QUERY.to_string(),
        }
    }
}

impl SelectorConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading selector config from {:?}", path);

        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latency_bound_ms.is_finite() || self.latency_bound_ms < 0.0 {
            return Err(SelectorError::InvalidLatencyBound(self.latency_bound_ms));
        }
        crate::PolicyQuery::parse(&self.wildcard_query)?;
        Ok(())
    }

    pub fn latency_bound(mut self, bound_ms: f64) -> Self {
        self.latency_bound_ms = bound_ms;
        self
    }

    pub fn full_coverage(mut self, required: bool) -> Self {
        self.require_full_coverage = required;
        self
    }

    pub fn plain_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_plain_dataplane = enabled;
        self
    }
}
