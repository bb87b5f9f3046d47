//! Shape descriptors for declarative attribute trees.
//!
//! A [`Block`] lists the attributes of a resource (or of a nested object) and
//! the [`Shape`] each one has. The marshaler walks a tree and a block side by
//! side; the shape decides how each value is converted and which numeric
//! width the remote field expects.

use serde::{Deserialize, Serialize};

/// The declared type of a scalar leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// A string value.
    String,
    /// A boolean value.
    Bool,
    /// A 64-bit signed integer field.
    Int64,
    /// A 64-bit unsigned integer field. Negative inputs are rejected.
    UInt64,
    /// A 64-bit floating point field. Integer inputs are widened.
    Float64,
}

impl ScalarKind {
    /// The name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float64 => "float64",
        }
    }
}

/// How a nested object appears in the declarative tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    /// A bare mapping.
    #[default]
    Object,
    /// A single object written as a one-element list of mappings.
    ///
    /// Existing declarative trees use this form, so the marshaler always
    /// emits it and accepts either it or a bare mapping.
    ListOfOne,
}

/// The shape of an attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// A scalar leaf.
    Scalar(ScalarKind),
    /// An ordered sequence of elements.
    Sequence(Box<Shape>),
    /// An unordered set of distinct elements.
    Set(Box<Shape>),
    /// A string-keyed map of values.
    Map(Box<Shape>),
    /// A nested object with its own attributes.
    Nested {
        /// The nested attributes.
        block: Block,
        /// How the object is written in the tree.
        #[serde(default)]
        mode: NestingMode,
    },
}

impl Shape {
    /// A string leaf.
    pub fn string() -> Self {
        Self::Scalar(ScalarKind::String)
    }

    /// A boolean leaf.
    pub fn bool() -> Self {
        Self::Scalar(ScalarKind::Bool)
    }

    /// A signed 64-bit integer leaf.
    pub fn int64() -> Self {
        Self::Scalar(ScalarKind::Int64)
    }

    /// An unsigned 64-bit integer leaf.
    pub fn uint64() -> Self {
        Self::Scalar(ScalarKind::UInt64)
    }

    /// A 64-bit float leaf.
    pub fn float64() -> Self {
        Self::Scalar(ScalarKind::Float64)
    }

    /// An ordered list of `element`.
    pub fn list(element: Shape) -> Self {
        Self::Sequence(Box::new(element))
    }

    /// A set of `element`.
    pub fn set(element: Shape) -> Self {
        Self::Set(Box::new(element))
    }

    /// A map of `element`.
    pub fn map(element: Shape) -> Self {
        Self::Map(Box::new(element))
    }

    /// A nested object written as a bare mapping.
    pub fn object(block: Block) -> Self {
        Self::Nested {
            block,
            mode: NestingMode::Object,
        }
    }

    /// A nested object written as a one-element list.
    pub fn list_of_one(block: Block) -> Self {
        Self::Nested {
            block,
            mode: NestingMode::ListOfOne,
        }
    }

    /// A short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.name().to_string(),
            Self::Sequence(elem) => format!("list of {}", elem.describe()),
            Self::Set(elem) => format!("set of {}", elem.describe()),
            Self::Map(elem) => format!("map of {}", elem.describe()),
            Self::Nested {
                mode: NestingMode::Object,
                ..
            } => "object".to_string(),
            Self::Nested {
                mode: NestingMode::ListOfOne,
                ..
            } => "single-object list".to_string(),
        }
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the remote API.
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Flags for a computed, read-only attribute.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Flags for an attribute that may be set or left to the remote default.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Whether the attribute is read-only (never sent on expand).
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// A single attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute's shape.
    pub shape: Shape,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// The API field name. Defaults to the PascalCase attribute name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    /// Changing this attribute requires replacing the resource.
    #[serde(default)]
    pub force_new: bool,
    /// Minimum number of elements for collections.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of elements for collections (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    /// Create an attribute with the given shape and flags.
    pub fn new(shape: Shape, flags: AttributeFlags) -> Self {
        Self {
            shape,
            flags,
            api_name: None,
            force_new: false,
            min_items: 0,
            max_items: 0,
            description: None,
        }
    }

    /// A required attribute of any shape.
    pub fn required(shape: Shape) -> Self {
        Self::new(shape, AttributeFlags::required())
    }

    /// An optional attribute of any shape.
    pub fn optional(shape: Shape) -> Self {
        Self::new(shape, AttributeFlags::optional())
    }

    /// A computed attribute of any shape.
    pub fn computed(shape: Shape) -> Self {
        Self::new(shape, AttributeFlags::computed())
    }

    /// A required string attribute.
    pub fn required_string() -> Self {
        Self::required(Shape::string())
    }

    /// An optional string attribute.
    pub fn optional_string() -> Self {
        Self::optional(Shape::string())
    }

    /// A computed string attribute.
    pub fn computed_string() -> Self {
        Self::computed(Shape::string())
    }

    /// A required int64 attribute.
    pub fn required_int64() -> Self {
        Self::required(Shape::int64())
    }

    /// An optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::optional(Shape::int64())
    }

    /// An optional uint64 attribute.
    pub fn optional_uint64() -> Self {
        Self::optional(Shape::uint64())
    }

    /// An optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::optional(Shape::bool())
    }

    /// Override the API field name.
    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = Some(api_name.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set the minimum number of elements.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of elements.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// An ordered list of named attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes, in declaration order.
    #[serde(default)]
    pub attributes: Vec<(String, Attribute)>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute. A later attribute with the same name replaces the earlier one.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        let name = name.into();
        self.attributes.retain(|(existing, _)| *existing != name);
        self.attributes.push((name, attr));
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, attr)| attr)
    }

    /// Iterate over `(name, api_name, attribute)` triples.
    pub fn fields(&self) -> impl Iterator<Item = (&str, String, &Attribute)> {
        self.attributes.iter().map(|(name, attr)| {
            let api_name = attr
                .api_name
                .clone()
                .unwrap_or_else(|| to_api_name(name));
            (name.as_str(), api_name, attr)
        })
    }
}

/// Convert a snake_case attribute name to its PascalCase API field name.
///
/// `ipv6_address_count` becomes `Ipv6AddressCount`.
pub fn to_api_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Prevents the operation from running.
    Error,
    /// Worth reporting, but does not block the operation.
    Warning,
}

/// A validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity.
    pub severity: DiagnosticSeverity,
    /// A short summary.
    pub summary: String,
    /// Details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the attribute concerned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(summary)
        }
    }

    /// Add detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_api_name() {
        assert_eq!(to_api_name("vpc_id"), "VpcId");
        assert_eq!(to_api_name("ipv6_address_count"), "Ipv6AddressCount");
        assert_eq!(to_api_name("name"), "Name");
        assert_eq!(to_api_name("bmc_security_group_ids"), "BmcSecurityGroupIds");
    }

    #[test]
    fn test_fields_use_override() {
        let block = Block::new()
            .with_attribute("chc_id", Attribute::required_string().with_api_name("ChcIds"))
            .with_attribute("instance_name", Attribute::optional_string());

        let fields: Vec<_> = block.fields().map(|(n, api, _)| (n.to_string(), api)).collect();
        assert_eq!(
            fields,
            vec![
                ("chc_id".to_string(), "ChcIds".to_string()),
                ("instance_name".to_string(), "InstanceName".to_string()),
            ]
        );
    }

    #[test]
    fn test_block_replaces_duplicate_names() {
        let block = Block::new()
            .with_attribute("name", Attribute::optional_string())
            .with_attribute("name", Attribute::required_string());

        assert_eq!(block.attributes.len(), 1);
        assert!(block.attribute("name").unwrap().flags.required);
    }

    #[test]
    fn test_attribute_flags() {
        assert!(AttributeFlags::computed().is_read_only());
        assert!(!AttributeFlags::optional_computed().is_read_only());
        assert!(!AttributeFlags::required().is_read_only());
    }

    #[test]
    fn test_shape_describe() {
        assert_eq!(Shape::list(Shape::string()).describe(), "list of string");
        assert_eq!(Shape::set(Shape::uint64()).describe(), "set of uint64");
        assert_eq!(Shape::list_of_one(Block::new()).describe(), "single-object list");
        assert_eq!(Shape::object(Block::new()).describe(), "object");
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("CHC host ID.")
            .with_force_new()
            .sensitive();

        assert_eq!(attr.shape, Shape::string());
        assert!(attr.flags.required);
        assert!(attr.flags.sensitive);
        assert!(attr.force_new);
        assert_eq!(attr.description.as_deref(), Some("CHC host ID."));
    }

    #[test]
    fn test_diagnostic() {
        let diag = Diagnostic::warning("deprecated")
            .with_detail("use something else")
            .with_attribute("name");

        assert_eq!(diag.severity, DiagnosticSeverity::Warning);
        assert_eq!(diag.attribute.as_deref(), Some("name"));
    }
}
