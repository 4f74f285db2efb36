use crate::foundation::core::InterpolationType;
use crate::foundation::token::Token;
use crate::layer::list_op::{ListOp, Reference};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prim specifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specifier {
    /// Concrete prim definition.
    Def,
    /// Sparse override; defines nothing on its own.
    Over,
    /// Abstract class prim, typically an inherit target.
    Class,
}

/// Field value stored in a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Interned token.
    Token(Token),
    /// Asset path.
    Asset(String),
    /// Scene path.
    Path(Path),
    /// Prim specifier.
    Specifier(Specifier),
    /// Three-component float vector.
    Vec3f([f32; 3]),
    /// Three-component double vector.
    Vec3d([f64; 3]),
    /// Integer array.
    IntArray(Vec<i64>),
    /// Float array.
    FloatArray(Vec<f32>),
    /// Double array.
    DoubleArray(Vec<f64>),
    /// Float vector array (points, velocities, extents).
    Vec3fArray(Vec<[f32; 3]>),
    /// Token array.
    TokenArray(Vec<Token>),
    /// String array.
    StringArray(Vec<String>),
    /// Path array.
    PathArray(Vec<Path>),
    /// String keyed dictionary.
    Dictionary(BTreeMap<String, Value>),
    /// List-edited tokens.
    TokenListOp(ListOp<Token>),
    /// List-edited paths.
    PathListOp(ListOp<Path>),
    /// List-edited references.
    ReferenceListOp(ListOp<Reference>),
    /// Animated values.
    TimeSamples(TimeSamples),
}

impl Value {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Token(_) => "token",
            Self::Asset(_) => "asset",
            Self::Path(_) => "path",
            Self::Specifier(_) => "specifier",
            Self::Vec3f(_) => "float3",
            Self::Vec3d(_) => "double3",
            Self::IntArray(_) => "int[]",
            Self::FloatArray(_) => "float[]",
            Self::DoubleArray(_) => "double[]",
            Self::Vec3fArray(_) => "float3[]",
            Self::TokenArray(_) => "token[]",
            Self::StringArray(_) => "string[]",
            Self::PathArray(_) => "path[]",
            Self::Dictionary(_) => "dictionary",
            Self::TokenListOp(_) => "tokenListOp",
            Self::PathListOp(_) => "pathListOp",
            Self::ReferenceListOp(_) => "referenceListOp",
            Self::TimeSamples(_) => "timeSamples",
        }
    }

    /// Numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Token payload (strings are accepted too).
    pub fn as_token(&self) -> Option<Token> {
        match self {
            Self::Token(t) => Some(t.clone()),
            Self::String(s) => Some(Token::new(s)),
            _ => None,
        }
    }

    /// String-like payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Asset(s) => Some(s),
            Self::Token(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Token array payload.
    pub fn as_token_array(&self) -> Option<&[Token]> {
        match self {
            Self::TokenArray(v) => Some(v),
            _ => None,
        }
    }

    /// Float vector array payload.
    pub fn as_vec3f_array(&self) -> Option<&[[f32; 3]]> {
        match self {
            Self::Vec3fArray(v) => Some(v),
            _ => None,
        }
    }

    /// Integer array payload.
    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Self::IntArray(v) => Some(v),
            _ => None,
        }
    }

    /// Dictionary payload.
    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Specifier payload.
    pub fn as_specifier(&self) -> Option<Specifier> {
        match self {
            Self::Specifier(s) => Some(*s),
            _ => None,
        }
    }

    /// Time samples payload.
    pub fn as_time_samples(&self) -> Option<&TimeSamples> {
        match self {
            Self::TimeSamples(ts) => Some(ts),
            _ => None,
        }
    }

    /// Interpolate from `a` to `b` with normalized factor `t`.
    ///
    /// Returns `None` when the values are not numerically interpolable (different types,
    /// non-numeric payloads, or arrays of different lengths).
    pub fn lerp(a: &Value, b: &Value, t: f64) -> Option<Value> {
        fn lf(a: f32, b: f32, t: f64) -> f32 {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t) as f32
        }
        fn ld(a: f64, b: f64, t: f64) -> f64 {
            a + (b - a) * t
        }
        fn lv3(a: &[f32; 3], b: &[f32; 3], t: f64) -> [f32; 3] {
            [lf(a[0], b[0], t), lf(a[1], b[1], t), lf(a[2], b[2], t)]
        }

        match (a, b) {
            (Self::Float(x), Self::Float(y)) => Some(Self::Float(lf(*x, *y, t))),
            (Self::Double(x), Self::Double(y)) => Some(Self::Double(ld(*x, *y, t))),
            (Self::Vec3f(x), Self::Vec3f(y)) => Some(Self::Vec3f(lv3(x, y, t))),
            (Self::Vec3d(x), Self::Vec3d(y)) => Some(Self::Vec3d([
                ld(x[0], y[0], t),
                ld(x[1], y[1], t),
                ld(x[2], y[2], t),
            ])),
            (Self::FloatArray(x), Self::FloatArray(y)) if x.len() == y.len() => Some(
                Self::FloatArray(x.iter().zip(y).map(|(a, b)| lf(*a, *b, t)).collect()),
            ),
            (Self::DoubleArray(x), Self::DoubleArray(y)) if x.len() == y.len() => Some(
                Self::DoubleArray(x.iter().zip(y).map(|(a, b)| ld(*a, *b, t)).collect()),
            ),
            (Self::Vec3fArray(x), Self::Vec3fArray(y)) if x.len() == y.len() => Some(
                Self::Vec3fArray(x.iter().zip(y).map(|(a, b)| lv3(a, b, t)).collect()),
            ),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Token> for Value {
    fn from(v: Token) -> Self {
        Self::Token(v)
    }
}

impl From<Path> for Value {
    fn from(v: Path) -> Self {
        Self::Path(v)
    }
}

impl From<Vec<[f32; 3]>> for Value {
    fn from(v: Vec<[f32; 3]>) -> Self {
        Self::Vec3fArray(v)
    }
}

/// Time-sampled values sorted by time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSamples {
    samples: Vec<(f64, Value)>, // sorted by time, unique times
}

impl TimeSamples {
    /// Empty sample set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return `true` when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Insert or replace the sample at `time`.
    pub fn insert(&mut self, time: f64, value: Value) {
        let idx = self.samples.partition_point(|(t, _)| *t < time);
        if idx < self.samples.len() && self.samples[idx].0 == time {
            self.samples[idx].1 = value;
        } else {
            self.samples.insert(idx, (time, value));
        }
    }

    /// Remove the sample at `time`, returning it.
    pub fn remove(&mut self, time: f64) -> Option<Value> {
        let idx = self.samples.iter().position(|(t, _)| *t == time)?;
        Some(self.samples.remove(idx).1)
    }

    /// Authored sample times in increasing order.
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|(t, _)| *t).collect()
    }

    /// Value authored exactly at `time`.
    pub fn get(&self, time: f64) -> Option<&Value> {
        self.samples
            .iter()
            .find(|(t, _)| *t == time)
            .map(|(_, v)| v)
    }

    /// Iterate `(time, value)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Value)> {
        self.samples.iter().map(|(t, v)| (*t, v))
    }

    /// Sample times bracketing `time`.
    ///
    /// Times before the first sample bracket to `(first, first)`, after the last to
    /// `(last, last)`, and exact hits to `(time, time)`. A non-finite `time`, such as the
    /// default time code, brackets nothing.
    pub fn bracket(&self, time: f64) -> Option<(f64, f64)> {
        if !time.is_finite() {
            return None;
        }
        let first = self.samples.first()?.0;
        let last = self.samples.last()?.0;
        if time <= first {
            return Some((first, first));
        }
        if time >= last {
            return Some((last, last));
        }
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        let (Some(&(lower, _)), Some(&(upper, _))) = (
            idx.checked_sub(1).and_then(|i| self.samples.get(i)),
            self.samples.get(idx),
        ) else {
            return None;
        };
        if lower == time {
            return Some((lower, lower));
        }
        Some((lower, upper))
    }

    /// Sample the value at `time`, clamping outside the authored range.
    pub fn sample(&self, time: f64, mode: InterpolationType) -> Option<Value> {
        if self.samples.is_empty() {
            return None;
        }

        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            return Some(self.samples[0].1.clone());
        }
        if idx >= self.samples.len() {
            return Some(self.samples[self.samples.len() - 1].1.clone());
        }

        let (ta, a) = &self.samples[idx - 1];
        let (tb, b) = &self.samples[idx];
        if *ta == time {
            return Some(a.clone());
        }
        let denom = tb - ta;
        if denom <= 0.0 {
            return Some(a.clone());
        }
        let u = (time - ta) / denom;
        match mode {
            InterpolationType::Held => Some(a.clone()),
            InterpolationType::Linear => Some(Value::lerp(a, b, u).unwrap_or_else(|| a.clone())),
        }
    }

    /// Copy with every sample time mapped through `f`.
    pub(crate) fn map_times(&self, f: impl Fn(f64) -> f64) -> Self {
        let mut out = Self::new();
        for (t, v) in &self.samples {
            out.insert(f(*t), v.clone());
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/value.rs"]
mod tests;
