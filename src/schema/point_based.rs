use crate::foundation::core::{TimeCode, is_close};
use crate::layer::Value;
use crate::schema::kind::{SchemaFamily, SchemaKind};
use crate::stage::{Attribute, Prim};

const SAMPLE_EPSILON: f64 = 1e-5;

/// Point-based geometry view over a prim (`Mesh`, `Points`, `BasisCurves`).
#[derive(Clone, Debug, PartialEq)]
pub struct PointBased {
    prim: Prim,
}

fn vec3f_array(value: Option<Value>) -> Option<Vec<[f32; 3]>> {
    match value? {
        Value::Vec3fArray(v) => Some(v),
        _ => None,
    }
}

impl PointBased {
    /// View `prim` as point-based geometry; `None` when its schema is not point based.
    pub fn new(prim: Prim) -> Option<Self> {
        prim.is_a(SchemaFamily::PointBased).then_some(Self { prim })
    }

    /// Viewed prim.
    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    /// `points` attribute.
    pub fn points_attr(&self) -> Attribute {
        self.prim.get_attribute("points")
    }

    /// `velocities` attribute.
    pub fn velocities_attr(&self) -> Attribute {
        self.prim.get_attribute("velocities")
    }

    /// `widths` attribute.
    pub fn widths_attr(&self) -> Attribute {
        self.prim.get_attribute("widths")
    }

    /// `ids` attribute.
    pub fn ids_attr(&self) -> Attribute {
        self.prim.get_attribute("ids")
    }

    /// Positions at each of `times`, extrapolated from the points sample bracketing
    /// `base_time` along velocities when usable, otherwise sampled directly.
    ///
    /// Velocities are usable when their bracketing samples match the points samples (for
    /// `Points`, only the lower one) and both arrays have the same length; position `i` at
    /// time `t` is then `p[i] + v[i] * ((t - lower) / time_codes_per_second) * velocity_scale`.
    /// Otherwise sampled positions are returned up to the first sample whose point count
    /// (or, for `Points`, whose `ids`) differs from the first. The result holds only the
    /// valid leading samples and is empty when nothing can be computed.
    pub fn compute_positions_at_times(
        &self,
        times: &[TimeCode],
        base_time: TimeCode,
        velocity_scale: f32,
    ) -> Vec<Vec<[f32; 3]>> {
        let Some(base) = base_time.value() else {
            return Vec::new();
        };
        let Some(times) = times
            .iter()
            .map(|t| t.value())
            .collect::<Option<Vec<f64>>>()
        else {
            return Vec::new();
        };
        if times.is_empty() {
            return Vec::new();
        }

        let points_attr = self.points_attr();
        if !points_attr.has_value() {
            return Vec::new();
        }
        let Some((lower, upper)) = points_attr.get_bracketing_time_samples(base) else {
            return Vec::new();
        };
        let is_points = self.prim.schema_kind() == SchemaKind::Points;

        let velocities_attr = self.velocities_attr();
        let brackets_match = velocities_attr.has_authored_value()
            && velocities_attr
                .get_bracketing_time_samples(base)
                .is_some_and(|(vl, vu)| {
                    is_close(vl, lower, SAMPLE_EPSILON)
                        && (is_points || is_close(vu, upper, SAMPLE_EPSILON))
                });
        let extrapolation = if brackets_match {
            let at_lower = TimeCode::new(lower);
            match (
                vec3f_array(points_attr.get(at_lower)),
                vec3f_array(velocities_attr.get(at_lower)),
            ) {
                (Some(p), Some(v)) if p.len() == v.len() => Some((p, v)),
                _ => None,
            }
        } else {
            None
        };

        if let Some((points, velocities)) = extrapolation {
            let tcps = self.prim.stage().time_codes_per_second();
            return times
                .iter()
                .map(|t| {
                    let m = ((t - lower) / tcps) as f32 * velocity_scale;
                    points
                        .iter()
                        .zip(&velocities)
                        .map(|(p, v)| [p[0] + v[0] * m, p[1] + v[1] * m, p[2] + v[2] * m])
                        .collect()
                })
                .collect();
        }

        tracing::trace!(prim = %self.prim.path(), "velocities unusable, sampling points");
        let Some(first) = vec3f_array(points_attr.get(TimeCode::new(times[0]))) else {
            return Vec::new();
        };
        let ids_attr = self.ids_attr();
        let ids = |t: f64| match ids_attr.get(TimeCode::new(t)) {
            Some(Value::IntArray(ids)) => Some(ids),
            _ => None,
        };
        let first_ids = if is_points {
            match ids(times[0]) {
                Some(ids) => Some(ids),
                None => return vec![first],
            }
        } else {
            None
        };

        let count = first.len();
        let mut out = vec![first];
        for &t in &times[1..] {
            if let Some(expected) = &first_ids {
                if ids(t).as_ref() != Some(expected) {
                    break;
                }
            }
            match vec3f_array(points_attr.get(TimeCode::new(t))) {
                Some(p) if p.len() == count => out.push(p),
                _ => break,
            }
        }
        out
    }

    /// Positions at `time`; a default `base_time` uses `time` itself as the base.
    pub fn compute_positions_at_time(
        &self,
        time: TimeCode,
        base_time: TimeCode,
        velocity_scale: f32,
    ) -> Option<Vec<[f32; 3]>> {
        let base = if base_time.is_default() {
            time
        } else {
            base_time
        };
        self.compute_positions_at_times(&[time], base, velocity_scale)
            .into_iter()
            .next()
    }

    /// Extent of the points at `time`, grown by half widths when `widths` are authored.
    pub fn compute_extent_at_time(&self, time: TimeCode) -> Option<[[f32; 3]; 2]> {
        let points = vec3f_array(self.points_attr().get(time))?;
        match self.widths_attr().get(time) {
            Some(Value::FloatArray(widths)) if self.prim.schema_kind() == SchemaKind::Points => {
                compute_extent_with_widths(&points, &widths)
            }
            _ => compute_extent(&points),
        }
    }
}

/// Axis-aligned bounds of `points` as `[min, max]`; `None` when empty.
pub fn compute_extent(points: &[[f32; 3]]) -> Option<[[f32; 3]; 2]> {
    let (first, rest) = points.split_first()?;
    let mut min = *first;
    let mut max = *first;
    for p in rest {
        for k in 0..3 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
    }
    Some([min, max])
}

/// Bounds of spheres centered at `points` with diameters `widths`.
///
/// `None` when empty or when the arrays differ in length.
pub fn compute_extent_with_widths(points: &[[f32; 3]], widths: &[f32]) -> Option<[[f32; 3]; 2]> {
    if points.len() != widths.len() || points.is_empty() {
        return None;
    }
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for (p, w) in points.iter().zip(widths) {
        let half = w / 2.0;
        for k in 0..3 {
            min[k] = min[k].min(p[k] - half);
            max[k] = max[k].max(p[k] + half);
        }
    }
    Some([min, max])
}

#[cfg(test)]
#[path = "../../tests/unit/schema/point_based.rs"]
mod tests;
