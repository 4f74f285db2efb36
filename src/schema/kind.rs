use crate::foundation::token::Token;
use crate::layer::Value;

/// Typed prim schemas known to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// No type name authored.
    Untyped,
    /// Grouping prim.
    Scope,
    /// Transformable grouping prim.
    Xform,
    /// Polygonal mesh.
    Mesh,
    /// Point cloud.
    Points,
    /// Curve batch.
    BasisCurves,
    /// A type name the engine has no schema for.
    Other,
}

/// Abstract schema families a kind can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaFamily {
    /// Anything that can be drawn or grouped for drawing.
    Imageable,
    /// Imageable prims carrying a transform.
    Xformable,
    /// Xformable prims with a bounding extent.
    Boundable,
    /// Boundable geometric primitives.
    Gprim,
    /// Gprims described by a `points` array.
    PointBased,
}

/// Built-in attribute of a schema.
#[derive(Clone, Copy, Debug)]
pub struct AttributeDef {
    /// Attribute name.
    pub name: &'static str,
    /// Value type name.
    pub type_name: &'static str,
    fallback: fn() -> Option<Value>,
}

impl AttributeDef {
    /// Value used when no layer authors one.
    pub fn fallback(&self) -> Option<Value> {
        (self.fallback)()
    }
}

fn none() -> Option<Value> {
    None
}

fn inherited() -> Option<Value> {
    Some(Value::Token(Token::new("inherited")))
}

fn default_purpose() -> Option<Value> {
    Some(Value::Token(Token::new("default")))
}

fn right_handed() -> Option<Value> {
    Some(Value::Token(Token::new("rightHanded")))
}

fn off() -> Option<Value> {
    Some(Value::Bool(false))
}

fn catmull_clark() -> Option<Value> {
    Some(Value::Token(Token::new("catmullClark")))
}

fn cubic() -> Option<Value> {
    Some(Value::Token(Token::new("cubic")))
}

fn bezier() -> Option<Value> {
    Some(Value::Token(Token::new("bezier")))
}

fn nonperiodic() -> Option<Value> {
    Some(Value::Token(Token::new("nonperiodic")))
}

const fn attr(
    name: &'static str,
    type_name: &'static str,
    fallback: fn() -> Option<Value>,
) -> AttributeDef {
    AttributeDef {
        name,
        type_name,
        fallback,
    }
}

const IMAGEABLE: &[AttributeDef] = &[
    attr("visibility", "token", inherited),
    attr("purpose", "token", default_purpose),
];

const XFORMABLE: &[AttributeDef] = &[attr("xformOpOrder", "token[]", none)];

const BOUNDABLE: &[AttributeDef] = &[attr("extent", "float3[]", none)];

const GPRIM: &[AttributeDef] = &[
    attr("doubleSided", "bool", off),
    attr("orientation", "token", right_handed),
    attr("displayColor", "color3f[]", none),
    attr("displayOpacity", "float[]", none),
];

const POINT_BASED: &[AttributeDef] = &[
    attr("points", "point3f[]", none),
    attr("velocities", "vector3f[]", none),
    attr("normals", "normal3f[]", none),
];

const MESH: &[AttributeDef] = &[
    attr("faceVertexCounts", "int[]", none),
    attr("faceVertexIndices", "int[]", none),
    attr("subdivisionScheme", "token", catmull_clark),
];

const POINTS: &[AttributeDef] = &[
    attr("widths", "float[]", none),
    attr("ids", "int64[]", none),
];

const BASIS_CURVES: &[AttributeDef] = &[
    attr("curveVertexCounts", "int[]", none),
    attr("widths", "float[]", none),
    attr("type", "token", cubic),
    attr("basis", "token", bezier),
    attr("wrap", "token", nonperiodic),
];

impl SchemaKind {
    /// Kind for a composed prim type name.
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "" => Self::Untyped,
            "Scope" => Self::Scope,
            "Xform" => Self::Xform,
            "Mesh" => Self::Mesh,
            "Points" => Self::Points,
            "BasisCurves" => Self::BasisCurves,
            _ => Self::Other,
        }
    }

    /// Canonical type name; empty for untyped and unknown kinds.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Untyped | Self::Other => "",
            Self::Scope => "Scope",
            Self::Xform => "Xform",
            Self::Mesh => "Mesh",
            Self::Points => "Points",
            Self::BasisCurves => "BasisCurves",
        }
    }

    /// Return `true` when this kind belongs to `family`.
    pub fn is_a(self, family: SchemaFamily) -> bool {
        let gprim = matches!(self, Self::Mesh | Self::Points | Self::BasisCurves);
        match family {
            SchemaFamily::Imageable => gprim || matches!(self, Self::Scope | Self::Xform),
            SchemaFamily::Xformable => gprim || self == Self::Xform,
            SchemaFamily::Boundable | SchemaFamily::Gprim | SchemaFamily::PointBased => gprim,
        }
    }

    fn tables(self) -> Vec<&'static [AttributeDef]> {
        let mut out = Vec::new();
        if self.is_a(SchemaFamily::Imageable) {
            out.push(IMAGEABLE);
        }
        if self.is_a(SchemaFamily::Xformable) {
            out.push(XFORMABLE);
        }
        if self.is_a(SchemaFamily::Boundable) {
            out.push(BOUNDABLE);
        }
        if self.is_a(SchemaFamily::Gprim) {
            out.push(GPRIM);
        }
        if self.is_a(SchemaFamily::PointBased) {
            out.push(POINT_BASED);
        }
        match self {
            Self::Mesh => out.push(MESH),
            Self::Points => out.push(POINTS),
            Self::BasisCurves => out.push(BASIS_CURVES),
            _ => {}
        }
        out
    }

    /// Every built-in attribute, base schemas first.
    pub fn builtin_attributes(self) -> Vec<&'static AttributeDef> {
        self.tables().into_iter().flatten().collect()
    }

    /// Built-in attribute called `name`.
    pub fn attribute(self, name: &str) -> Option<&'static AttributeDef> {
        self.tables()
            .into_iter()
            .flatten()
            .find(|def| def.name == name)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schema/kind.rs"]
mod tests;
