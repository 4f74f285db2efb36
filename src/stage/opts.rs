use crate::compose::cache::ComposeOpts;
use crate::foundation::core::InterpolationType;
use crate::foundation::error::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options a stage is opened with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOpts {
    /// Interpolation between bracketing time samples.
    pub interpolation: InterpolationType,
    /// Maximum nesting of composition arcs before an arc is dropped with a diagnostic.
    pub max_composition_depth: usize,
    /// Variant set name to ordered fallback selections, used when no selection is authored.
    pub variant_fallbacks: BTreeMap<String, Vec<String>>,
    /// Time codes per second used when the root layer authors none.
    pub default_time_codes_per_second: f64,
    /// Create an anonymous session layer above the root layer.
    pub session_layer: bool,
}

impl Default for StageOpts {
    fn default() -> Self {
        Self {
            interpolation: InterpolationType::Linear,
            max_composition_depth: 64,
            variant_fallbacks: BTreeMap::new(),
            default_time_codes_per_second: 24.0,
            session_layer: false,
        }
    }
}

impl StageOpts {
    /// Check option ranges.
    pub fn validate(&self) -> StageResult<()> {
        if self.max_composition_depth == 0 {
            return Err(StageError::validation(
                "max_composition_depth must be at least 1",
            ));
        }
        if !(self.default_time_codes_per_second.is_finite()
            && self.default_time_codes_per_second > 0.0)
        {
            return Err(StageError::validation(
                "default_time_codes_per_second must be finite and > 0",
            ));
        }
        for (set, fallbacks) in &self.variant_fallbacks {
            if set.is_empty() || fallbacks.iter().any(String::is_empty) {
                return Err(StageError::validation(format!(
                    "variant fallbacks for '{set}' need non-empty names"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn compose_opts(&self) -> ComposeOpts {
        ComposeOpts {
            max_depth: self.max_composition_depth,
            variant_fallbacks: self.variant_fallbacks.clone(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stage/opts.rs"]
mod tests;
