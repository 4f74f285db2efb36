use crate::foundation::error::{StageError, StageResult};

/// A point on the stage timeline, or the special "default" time.
///
/// Queries at [`TimeCode::DEFAULT`] read the non-animated `default` opinion; numeric times read
/// time samples first and fall back to `default`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeCode(pub f64);

impl TimeCode {
    /// Time used to address non-animated values.
    pub const DEFAULT: Self = Self(f64::NAN);

    /// Numeric time code.
    pub fn new(t: f64) -> Self {
        Self(t)
    }

    /// Return `true` for [`TimeCode::DEFAULT`].
    pub fn is_default(self) -> bool {
        self.0.is_nan()
    }

    /// Numeric value, `None` for the default time.
    pub fn value(self) -> Option<f64> {
        if self.is_default() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl From<f64> for TimeCode {
    fn from(t: f64) -> Self {
        Self(t)
    }
}

/// Affine time mapping `t * scale + offset` carried by references and accumulated through
/// nested arcs.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerOffset {
    /// Time added after scaling.
    pub offset: f64,
    /// Time scale factor, must be finite and non-zero.
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl LayerOffset {
    /// Offset that maps every time to itself.
    pub const IDENTITY: Self = Self {
        offset: 0.0,
        scale: 1.0,
    };

    /// Create a validated offset.
    pub fn new(offset: f64, scale: f64) -> StageResult<Self> {
        if !offset.is_finite() || !scale.is_finite() || scale == 0.0 {
            return Err(StageError::validation(
                "LayerOffset requires finite offset and finite non-zero scale",
            ));
        }
        Ok(Self { offset, scale })
    }

    /// Return `true` when this offset leaves times unchanged.
    pub fn is_identity(self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }

    /// Map a time from the inner (source) space into the outer space.
    pub fn apply(self, t: f64) -> f64 {
        t * self.scale + self.offset
    }

    /// Map a time from the outer space back into the inner space.
    pub fn apply_inverse(self, t: f64) -> f64 {
        (t - self.offset) / self.scale
    }

    /// Offset equivalent to applying `inner` first and then `self`.
    pub fn then_outer(self, inner: Self) -> Self {
        Self {
            offset: inner.offset * self.scale + self.offset,
            scale: inner.scale * self.scale,
        }
    }
}

/// Interpolation applied between the two time samples bracketing a query time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InterpolationType {
    /// Hold the earlier sample until the next one.
    Held,
    /// Interpolate numerically when both samples support it, otherwise hold.
    #[default]
    Linear,
}

/// Relative tolerance comparison used for time codes.
pub(crate) fn is_close(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
