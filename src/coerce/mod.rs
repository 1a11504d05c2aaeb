//! Type coercion for structured row writes: type-family resolution and per-family parsing.

mod engine;
mod family;
mod geometry;
mod network;

pub use engine::{coerce_as, coerce_value};
pub use family::TypeFamily;
pub use geometry::{parse_geometry, Geometry, GeometryKind};
