//! Structural type inference over decoded JSON values.
//!
//! [`infer`] walks a [`serde_json::Value`] bottom-up and produces a [`Shape`]
//! tree. Arrays collapse to a single element shape by left-folding [`merge`]
//! over their elements, so a million-row array yields one `Array` node.
//!
//! # Merge rules
//!
//! - `Unknown` is the identity element.
//! - Equal scalar kinds merge to themselves.
//! - Objects merge key-wise; keys seen on only one side are kept as-is.
//! - Arrays merge their element shapes.
//! - Anything else becomes `Varied`. Varied operands are flattened and each
//!   alternative is appended only if no structurally equal one is already
//!   present, so alternatives keep first-seen order.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Classification of a JSON scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ScalarName {
    Number,
    String,
    Boolean,
    Null,
}

/// Inferred schema node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Scalar {
        name: ScalarName,
    },
    /// Field name to field shape. Key order is irrelevant to equality.
    Object {
        children: BTreeMap<String, Shape>,
    },
    /// The merged shape of every element, never one shape per index.
    Array {
        children: Box<Shape>,
    },
    /// Incompatible alternatives observed at the same position, in
    /// first-seen order.
    Varied {
        children: Vec<Shape>,
    },
    /// Nothing was observed at this position.
    Unknown,
}

impl Shape {
    pub fn scalar(name: ScalarName) -> Self {
        Shape::Scalar { name }
    }

    pub fn object<K: Into<String>>(children: impl IntoIterator<Item = (K, Shape)>) -> Self {
        Shape::Object {
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn array(children: Shape) -> Self {
        Shape::Array {
            children: Box::new(children),
        }
    }

    fn into_alternatives(self) -> Vec<Shape> {
        match self {
            Shape::Varied { children } => children,
            Shape::Unknown => Vec::new(),
            other => vec![other],
        }
    }
}

/// Infer the shape of a decoded value.
///
/// `path` labels the root in trace output. Containers deeper than
/// `max_depth` levels are reported as [`Shape::Unknown`]; scalars are always
/// classified. Never fails.
pub fn infer(path: &str, value: &Value, max_depth: usize) -> Shape {
    match value {
        Value::Null => Shape::scalar(ScalarName::Null),
        Value::Bool(_) => Shape::scalar(ScalarName::Boolean),
        Value::Number(_) => Shape::scalar(ScalarName::Number),
        Value::String(_) => Shape::scalar(ScalarName::String),
        Value::Array(items) => {
            if max_depth == 0 {
                trace!(path, "depth bound reached at array");
                return Shape::Unknown;
            }
            let element_path = format!("{}[]", path);
            let element = items
                .iter()
                .map(|item| infer(&element_path, item, max_depth - 1))
                .fold(Shape::Unknown, merge);
            Shape::array(element)
        }
        Value::Object(fields) => {
            if max_depth == 0 {
                trace!(path, "depth bound reached at object");
                return Shape::Unknown;
            }
            Shape::object(fields.iter().map(|(key, field)| {
                let field_path = format!("{}.{}", path, key);
                (key.clone(), infer(&field_path, field, max_depth - 1))
            }))
        }
    }
}

/// Merge two shapes observed at the same position.
///
/// Order-sensitive only in how `Varied` alternatives are listed: those of
/// `a` come first.
pub fn merge(a: Shape, b: Shape) -> Shape {
    match (a, b) {
        (Shape::Unknown, other) | (other, Shape::Unknown) => other,
        (Shape::Scalar { name: x }, Shape::Scalar { name: y }) if x == y => Shape::scalar(x),
        (Shape::Object { children: mut left }, Shape::Object { children: right }) => {
            for (key, shape) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => merge(existing, shape),
                    None => shape,
                };
                left.insert(key, merged);
            }
            Shape::Object { children: left }
        }
        (Shape::Array { children: x }, Shape::Array { children: y }) => Shape::array(merge(*x, *y)),
        (a, b) if a == b => a,
        (a, b) => {
            let mut alternatives = a.into_alternatives();
            for candidate in b.into_alternatives() {
                if !alternatives.contains(&candidate) {
                    alternatives.push(candidate);
                }
            }
            if alternatives.len() == 1 {
                alternatives.remove(0)
            } else {
                Shape::Varied {
                    children: alternatives,
                }
            }
        }
    }
}
