//! Coordinate notation for point, circle, box and lseg.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("valid number regex"));

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    Circle { x: f64, y: f64, r: f64 },
    Box { x1: f64, y1: f64, x2: f64, y2: f64 },
    Lseg { x1: f64, y1: f64, x2: f64, y2: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Circle,
    Box,
    Lseg,
}

impl GeometryKind {
    fn arity(self) -> usize {
        match self {
            GeometryKind::Point => 2,
            GeometryKind::Circle => 3,
            GeometryKind::Box | GeometryKind::Lseg => 4,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point { x, y } => write!(f, "({},{})", x, y),
            Geometry::Circle { x, y, r } => write!(f, "<({},{}),{}>", x, y, r),
            Geometry::Box { x1, y1, x2, y2 } => write!(f, "(({},{}),({},{}))", x1, y1, x2, y2),
            Geometry::Lseg { x1, y1, x2, y2 } => write!(f, "[({},{}),({},{})]", x1, y1, x2, y2),
        }
    }
}

/// Parse JSON input (string notation, number array or object) into a geometry of `kind`.
pub fn parse_geometry(kind: GeometryKind, value: &Value) -> Option<Geometry> {
    let coords = match value {
        Value::String(s) => numbers_from_notation(s)?,
        Value::Array(items) => numbers_from_array(items)?,
        Value::Object(obj) => numbers_from_object(kind, obj)?,
        _ => return None,
    };
    if coords.len() != kind.arity() {
        return None;
    }
    let g = match kind {
        GeometryKind::Point => Geometry::Point { x: coords[0], y: coords[1] },
        GeometryKind::Circle => {
            if coords[2] < 0.0 {
                return None;
            }
            Geometry::Circle { x: coords[0], y: coords[1], r: coords[2] }
        }
        GeometryKind::Box => Geometry::Box { x1: coords[0], y1: coords[1], x2: coords[2], y2: coords[3] },
        GeometryKind::Lseg => Geometry::Lseg { x1: coords[0], y1: coords[1], x2: coords[2], y2: coords[3] },
    };
    Some(g)
}

/// Accepts any mix of numbers and the punctuation `( ) < > [ ] ,` with whitespace.
fn numbers_from_notation(s: &str) -> Option<Vec<f64>> {
    let residue = NUMBER_RE.replace_all(s, "");
    if !residue.chars().all(|c| c.is_whitespace() || "()<>[],".contains(c)) {
        return None;
    }
    NUMBER_RE
        .find_iter(s)
        .map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

fn numbers_from_array(items: &[Value]) -> Option<Vec<f64>> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Number(n) => out.push(n.as_f64()?),
            Value::Array(inner) => out.extend(numbers_from_array(inner)?),
            Value::Object(obj) => out.extend([obj.get("x")?.as_f64()?, obj.get("y")?.as_f64()?]),
            _ => return None,
        }
    }
    Some(out)
}

fn numbers_from_object(kind: GeometryKind, obj: &serde_json::Map<String, Value>) -> Option<Vec<f64>> {
    let num = |k: &str| obj.get(k).and_then(Value::as_f64);
    match kind {
        GeometryKind::Point => Some(vec![num("x")?, num("y")?]),
        GeometryKind::Circle => {
            if let Some(center) = obj.get("center").and_then(Value::as_object) {
                let r = num("radius").or_else(|| num("r"))?;
                Some(vec![center.get("x")?.as_f64()?, center.get("y")?.as_f64()?, r])
            } else {
                Some(vec![num("x")?, num("y")?, num("r").or_else(|| num("radius"))?])
            }
        }
        GeometryKind::Box | GeometryKind::Lseg => Some(vec![num("x1")?, num("y1")?, num("x2")?, num("y2")?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_notations() {
        let expected = Geometry::Point { x: 1.5, y: -2.0 };
        assert_eq!(parse_geometry(GeometryKind::Point, &json!("(1.5,-2)")), Some(expected.clone()));
        assert_eq!(parse_geometry(GeometryKind::Point, &json!("1.5, -2")), Some(expected.clone()));
        assert_eq!(parse_geometry(GeometryKind::Point, &json!([1.5, -2])), Some(expected.clone()));
        assert_eq!(parse_geometry(GeometryKind::Point, &json!({"x": 1.5, "y": -2})), Some(expected));
    }

    #[test]
    fn circle_and_box() {
        assert_eq!(
            parse_geometry(GeometryKind::Circle, &json!("<(0,0),5>")),
            Some(Geometry::Circle { x: 0.0, y: 0.0, r: 5.0 })
        );
        assert_eq!(parse_geometry(GeometryKind::Circle, &json!("<(0,0),-5>")), None);
        assert_eq!(
            parse_geometry(GeometryKind::Box, &json!("((0,0),(2,3))")).map(|g| g.to_string()),
            Some("((0,0),(2,3))".to_string())
        );
    }

    #[test]
    fn rejects_wrong_arity_and_garbage() {
        assert_eq!(parse_geometry(GeometryKind::Point, &json!("(1,2,3)")), None);
        assert_eq!(parse_geometry(GeometryKind::Point, &json!("(a,b)")), None);
        assert_eq!(parse_geometry(GeometryKind::Lseg, &json!(true)), None);
    }
}
