//! Validation of declared trees against a block.
//!
//! [`expand`](crate::marshal::expand) stops at the first problem it meets.
//! [`validate`] walks the whole tree and reports every problem as a
//! [`Diagnostic`] with the dotted path of the attribute concerned, so a user
//! can fix a configuration in one pass.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_engine::schema::{Attribute, Block};
//! use hemmer_provider_engine::types::{AttrMap, AttrValue};
//! use hemmer_provider_engine::validation::validate;
//!
//! let block = Block::new()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("count", Attribute::optional_int64());
//!
//! let mut tree = AttrMap::new();
//! tree.insert("name".to_string(), AttrValue::string("web"));
//! assert!(validate(&block, &tree).is_empty());
//!
//! tree.insert("count".to_string(), AttrValue::string("many"));
//! let diagnostics = validate(&block, &tree);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("count".to_string()));
//! ```

use crate::schema::{Attribute, Block, Diagnostic, NestingMode, ScalarKind, Shape};
use crate::types::{AttrMap, AttrValue};

/// Validate a declared tree against a block.
///
/// Returns a list of diagnostics; an empty list means the tree is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present
/// - Computed-only attributes are skipped (the remote API sets them)
/// - Values must match their declared shape, including numeric width
/// - Single objects written as lists may hold at most one element
/// - Collections must respect `min_items` / `max_items`
/// - Undeclared attributes are reported as warnings
pub fn validate(block: &Block, tree: &AttrMap) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(block, tree, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], returning `Err` when any error diagnostic was found.
///
/// Warnings alone do not fail validation.
pub fn validate_result(block: &Block, tree: &AttrMap) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let diagnostics = validate(block, tree);
    if diagnostics.iter().any(is_error) {
        Err(diagnostics)
    } else {
        Ok(diagnostics)
    }
}

/// Whether a tree is free of validation errors.
pub fn is_valid(block: &Block, tree: &AttrMap) -> bool {
    !validate(block, tree).iter().any(is_error)
}

fn is_error(diagnostic: &Diagnostic) -> bool {
    matches!(diagnostic.severity, crate::schema::DiagnosticSeverity::Error)
}

fn validate_block(block: &Block, tree: &AttrMap, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, tree.get(name), &attr_path, diagnostics);
    }

    for name in tree.keys() {
        if block.attribute(name).is_none() {
            let attr_path = join_path(path, name);
            diagnostics.push(
                Diagnostic::warning(format!("Unknown attribute '{}'", attr_path))
                    .with_detail("This attribute is not declared and will be ignored")
                    .with_attribute(attr_path),
            );
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&AttrValue>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_read_only() {
        if value.is_some() {
            diagnostics.push(
                Diagnostic::warning(format!("Attribute '{}' is computed", path))
                    .with_detail("The remote API sets this value; the declared one is ignored")
                    .with_attribute(path),
            );
        }
        return;
    }

    let Some(value) = value else {
        if attr.flags.required {
            diagnostics.push(
                Diagnostic::error(format!("Missing required attribute '{}'", path))
                    .with_detail("This attribute is required and must be provided")
                    .with_attribute(path),
            );
        }
        return;
    };

    if let Some(len) = collection_len(&attr.shape, value) {
        check_item_count(attr, len, path, diagnostics);
    }
    validate_value(&attr.shape, value, path, diagnostics);
}

/// Number of items a value counts as for `min_items` / `max_items`.
fn collection_len(shape: &Shape, value: &AttrValue) -> Option<usize> {
    match (shape, value) {
        (_, AttrValue::List(items)) => Some(items.len()),
        (_, AttrValue::Set(items)) => Some(items.len()),
        (Shape::Map(_), AttrValue::Map(entries)) => Some(entries.len()),
        (Shape::Nested { .. }, AttrValue::Map(_)) => Some(1),
        _ => None,
    }
}

fn check_item_count(attr: &Attribute, len: usize, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let len = len as u32;
    if len < attr.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Attribute '{}' requires at least {} item(s), got {}",
                path, attr.min_items, len
            ))
            .with_attribute(path),
        );
    }
    // max_items of 0 means unlimited
    if attr.max_items > 0 && len > attr.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Attribute '{}' allows at most {} item(s), got {}",
                path, attr.max_items, len
            ))
            .with_attribute(path),
        );
    }
}

fn validate_value(shape: &Shape, value: &AttrValue, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match shape {
        Shape::Scalar(kind) => validate_scalar(*kind, value, path, diagnostics),
        Shape::Sequence(element) => match value {
            AttrValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_value(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            other => diagnostics.push(type_error(path, &shape.describe(), other)),
        },
        Shape::Set(element) => {
            let items: Box<dyn Iterator<Item = &AttrValue>> = match value {
                AttrValue::Set(items) => Box::new(items.iter()),
                AttrValue::List(items) => Box::new(items.iter()),
                other => {
                    diagnostics.push(type_error(path, &shape.describe(), other));
                    return;
                },
            };
            for (i, item) in items.enumerate() {
                validate_value(element, item, &format!("{}.{}", path, i), diagnostics);
            }
        },
        Shape::Map(element) => match value {
            AttrValue::Map(entries) => {
                for (key, item) in entries {
                    validate_value(element, item, &format!("{}.{}", path, key), diagnostics);
                }
            },
            other => diagnostics.push(type_error(path, &shape.describe(), other)),
        },
        Shape::Nested { block, mode } => match (value, mode) {
            (AttrValue::Map(fields), _) => validate_block(block, fields, path, diagnostics),
            (AttrValue::List(items), NestingMode::ListOfOne) => match items.as_slice() {
                [] => {},
                [AttrValue::Map(fields)] => {
                    validate_block(block, fields, &format!("{}.0", path), diagnostics)
                },
                [other] => diagnostics.push(type_error(&format!("{}.0", path), "object", other)),
                _ => diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' holds a single object", path))
                        .with_detail(format!(
                            "Expected at most one element, got {}",
                            items.len()
                        ))
                        .with_attribute(path),
                ),
            },
            (other, _) => diagnostics.push(type_error(path, &shape.describe(), other)),
        },
    }
}

fn validate_scalar(kind: ScalarKind, value: &AttrValue, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let ok = match (kind, value) {
        (ScalarKind::String, AttrValue::String(_)) => true,
        (ScalarKind::Bool, AttrValue::Bool(_)) => true,
        (ScalarKind::Int64, AttrValue::Int(_)) => true,
        (ScalarKind::Int64, AttrValue::Float(f)) => is_integral(*f),
        (ScalarKind::UInt64, AttrValue::Int(n)) => {
            if *n < 0 {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                        .with_detail(format!("Expected a non-negative integer, got {}", n))
                        .with_attribute(path),
                );
                return;
            }
            true
        },
        (ScalarKind::UInt64, AttrValue::Float(f)) => is_integral(*f) && *f >= 0.0,
        (ScalarKind::Float64, AttrValue::Float(_) | AttrValue::Int(_)) => true,
        _ => false,
    };
    if !ok {
        diagnostics.push(type_error(path, kind.name(), value));
    }
}

fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_error(path: &str, expected: &str, got: &AttrValue) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, got.type_name()))
        .with_attribute(path)
}
