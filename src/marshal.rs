//! Conversion between declarative attribute trees and API struct graphs.
//!
//! [`expand`] turns a declared [`AttrMap`] into the [`ApiStruct`] a remote call
//! takes; [`flatten`] turns a response back into a tree. For every tree written
//! in canonical form for a block (sets as sets, single objects in their
//! declared nesting mode, no read-only attributes), `flatten(expand(t)) == t`.
//!
//! Absence is never turned into a zero value in either direction: an attribute
//! missing from the tree leaves the API field [`Field::Absent`], and an absent
//! API field leaves the attribute out of the flattened tree.

use std::collections::BTreeMap;

use tracing::trace;

use crate::api::{ApiStruct, ApiValue, Field};
use crate::error::EngineError;
use crate::schema::{Block, NestingMode, ScalarKind, Shape};
use crate::types::{AttrMap, AttrSet, AttrValue};

/// Expand a declarative tree into a struct graph according to `block`.
///
/// # Errors
///
/// - [`EngineError::MalformedShape`] when a required attribute is absent.
/// - [`EngineError::TypeMismatch`] when a value disagrees with its declared shape.
pub fn expand(tree: &AttrMap, block: &Block) -> Result<ApiStruct, EngineError> {
    expand_block(tree, block, "")
}

/// Flatten a struct graph back into a declarative tree according to `block`.
///
/// Present-but-empty collections become empty lists or sets. Single objects
/// declared as [`NestingMode::ListOfOne`] always come back as one-element lists.
///
/// # Errors
///
/// [`EngineError::TypeMismatch`] when a field's value disagrees with its
/// declared shape, including unsigned values too large for a tree integer.
pub fn flatten(graph: &ApiStruct, block: &Block) -> Result<AttrMap, EngineError> {
    flatten_block(graph, block, "")
}

fn expand_block(tree: &AttrMap, block: &Block, path: &str) -> Result<ApiStruct, EngineError> {
    let mut out = ApiStruct::new();

    for (name, api_name, attr) in block.fields() {
        let attr_path = join_path(path, name);

        if attr.flags.is_read_only() {
            continue;
        }

        let expanded = match tree.get(name) {
            Some(value) => expand_value(value, &attr.shape, &attr_path)?,
            None => None,
        };

        match expanded {
            Some(value) => out.insert(api_name, value),
            None if attr.flags.required => {
                return Err(EngineError::MalformedShape { path: attr_path });
            },
            None => out.set(api_name, Field::Absent),
        }
    }

    for name in tree.keys() {
        if block.attribute(name).is_none() {
            trace!(attribute = %join_path(path, name), "Ignoring undeclared attribute");
        }
    }

    Ok(out)
}

/// Returns `Ok(None)` when the value stands for "not set" (an empty
/// single-object list).
fn expand_value(
    value: &AttrValue,
    shape: &Shape,
    path: &str,
) -> Result<Option<ApiValue>, EngineError> {
    match shape {
        Shape::Scalar(kind) => expand_scalar(value, *kind, path).map(Some),
        Shape::Sequence(element) => match value {
            AttrValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(expand_element(item, element, &format!("{}.{}", path, i))?);
                }
                Ok(Some(ApiValue::List(out)))
            },
            other => Err(mismatch(path, shape, other)),
        },
        Shape::Set(element) => {
            let items: AttrSet = match value {
                AttrValue::Set(set) => set.clone(),
                AttrValue::List(items) => items.iter().cloned().collect(),
                other => return Err(mismatch(path, shape, other)),
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(expand_element(item, element, &format!("{}.{}", path, i))?);
            }
            Ok(Some(ApiValue::List(out)))
        },
        Shape::Map(element) => match value {
            AttrValue::Map(entries) => {
                let mut out = BTreeMap::new();
                for (key, item) in entries {
                    out.insert(key.clone(), expand_element(item, element, &join_path(path, key))?);
                }
                Ok(Some(ApiValue::Map(out)))
            },
            other => Err(mismatch(path, shape, other)),
        },
        Shape::Nested { block, mode } => match (value, mode) {
            (AttrValue::Map(entries), _) => {
                expand_block(entries, block, path).map(|s| Some(ApiValue::Struct(s)))
            },
            (AttrValue::List(items), NestingMode::ListOfOne) => match items.as_slice() {
                [] => Ok(None),
                [AttrValue::Map(entries)] => {
                    expand_block(entries, block, &format!("{}.0", path))
                        .map(|s| Some(ApiValue::Struct(s)))
                },
                [other] => Err(mismatch(&format!("{}.0", path), shape, other)),
                _ => Err(EngineError::type_mismatch(
                    path,
                    shape.describe(),
                    format!("list of {} elements", items.len()),
                )),
            },
            (other, _) => Err(mismatch(path, shape, other)),
        },
    }
}

fn expand_scalar(value: &AttrValue, kind: ScalarKind, path: &str) -> Result<ApiValue, EngineError> {
    let converted = match (kind, value) {
        (ScalarKind::String, AttrValue::String(s)) => Some(ApiValue::String(s.clone())),
        (ScalarKind::Bool, AttrValue::Bool(b)) => Some(ApiValue::Bool(*b)),
        (ScalarKind::Int64, AttrValue::Int(n)) => Some(ApiValue::Int64(*n)),
        (ScalarKind::Int64, AttrValue::Float(f)) => integral(*f).map(ApiValue::Int64),
        (ScalarKind::UInt64, AttrValue::Int(n)) => u64::try_from(*n).ok().map(ApiValue::UInt64),
        (ScalarKind::UInt64, AttrValue::Float(f)) => integral(*f)
            .and_then(|n| u64::try_from(n).ok())
            .map(ApiValue::UInt64),
        (ScalarKind::Float64, AttrValue::Float(f)) => Some(ApiValue::Float64(*f)),
        (ScalarKind::Float64, AttrValue::Int(n)) => Some(ApiValue::Float64(*n as f64)),
        _ => None,
    };

    converted.ok_or_else(|| EngineError::type_mismatch(path, kind.name(), describe_attr(value)))
}

fn flatten_block(graph: &ApiStruct, block: &Block, path: &str) -> Result<AttrMap, EngineError> {
    let mut out = AttrMap::new();

    for (name, api_name, attr) in block.fields() {
        if let Field::Present(value) = graph.get(&api_name) {
            let attr_path = join_path(path, name);
            out.insert(name.to_string(), flatten_value(value, &attr.shape, &attr_path)?);
        }
    }

    Ok(out)
}

fn flatten_value(value: &ApiValue, shape: &Shape, path: &str) -> Result<AttrValue, EngineError> {
    match (shape, value) {
        (Shape::Scalar(kind), _) => flatten_scalar(value, *kind, path),
        (Shape::Sequence(element), ApiValue::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| flatten_value(item, element, &format!("{}.{}", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::List),
        (Shape::Set(element), ApiValue::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| flatten_value(item, element, &format!("{}.{}", path, i)))
            .collect::<Result<AttrSet, _>>()
            .map(AttrValue::Set),
        (Shape::Map(element), ApiValue::Map(entries)) => entries
            .iter()
            .map(|(key, item)| {
                flatten_value(item, element, &join_path(path, key)).map(|v| (key.clone(), v))
            })
            .collect::<Result<AttrMap, _>>()
            .map(AttrValue::Map),
        (Shape::Nested { block, mode }, ApiValue::Struct(inner)) => match mode {
            NestingMode::Object => flatten_block(inner, block, path).map(AttrValue::Map),
            NestingMode::ListOfOne => {
                let entries = flatten_block(inner, block, &format!("{}.0", path))?;
                Ok(AttrValue::List(vec![AttrValue::Map(entries)]))
            },
        },
        _ => Err(EngineError::type_mismatch(
            path,
            shape.describe(),
            value.type_name(),
        )),
    }
}

fn flatten_scalar(value: &ApiValue, kind: ScalarKind, path: &str) -> Result<AttrValue, EngineError> {
    let converted = match (kind, value) {
        (ScalarKind::String, ApiValue::String(s)) => Some(AttrValue::String(s.clone())),
        (ScalarKind::Bool, ApiValue::Bool(b)) => Some(AttrValue::Bool(*b)),
        (ScalarKind::Int64 | ScalarKind::UInt64, ApiValue::Int64(n)) => Some(AttrValue::Int(*n)),
        (ScalarKind::Int64 | ScalarKind::UInt64, ApiValue::UInt64(n)) => {
            i64::try_from(*n).ok().map(AttrValue::Int)
        },
        (ScalarKind::Float64, ApiValue::Float64(f)) => Some(AttrValue::Float(*f)),
        (ScalarKind::Float64, ApiValue::Int64(n)) => Some(AttrValue::Float(*n as f64)),
        (ScalarKind::Float64, ApiValue::UInt64(n)) => Some(AttrValue::Float(*n as f64)),
        _ => None,
    };

    converted.ok_or_else(|| EngineError::type_mismatch(path, kind.name(), value.type_name()))
}

fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn describe_attr(value: &AttrValue) -> String {
    match value {
        AttrValue::Int(n) if *n < 0 => "negative int".to_string(),
        AttrValue::Float(f) if f.fract() != 0.0 => "fractional float".to_string(),
        other => other.type_name().to_string(),
    }
}

/// A collection element must expand to a value; an empty single-object list
/// would otherwise shorten the collection.
fn expand_element(item: &AttrValue, element: &Shape, path: &str) -> Result<ApiValue, EngineError> {
    expand_value(item, element, path)?
        .ok_or_else(|| EngineError::type_mismatch(path, element.describe(), "empty list"))
}

fn mismatch(path: &str, shape: &Shape, found: &AttrValue) -> EngineError {
    EngineError::type_mismatch(path, shape.describe(), found.type_name())
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}
