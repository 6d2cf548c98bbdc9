//! Decoded property values: the tagged variant type that every
//! [`crate::decode`] call produces.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Vector3(Vector3),
    Vector2(Vector2),
    String(String),
    Array(Vec<DecodedValue>),
}

impl DecodedValue {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            DecodedValue::Int32(v) => Some(*v),
            DecodedValue::Int64(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            DecodedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match self {
            DecodedValue::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    /// The `(x, y)` pair of a `Vector2` or the first two components of a
    /// `Vector3`. `m_vecOrigin` on the player class is a `VectorXY`, so
    /// callers that only need the horizontal position should use this
    /// instead of `as_vector3`.
    pub fn as_xy(&self) -> Option<(f32, f32)> {
        match self {
            DecodedValue::Vector2(v) => Some((v.x, v.y)),
            DecodedValue::Vector3(v) => Some((v.x, v.y)),
            _ => None,
        }
    }
}
