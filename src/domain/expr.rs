//! Structured reference expressions.
//!
//! Template values are parsed into an [`Expr`] tree whose leaves are either
//! literals or typed references (`Ref`, `Fn::GetAtt`). `Fn::Join` becomes an
//! ordered list of parts that may itself contain further joins. `Fn::Sub`
//! keeps its format string; its `${Node}` and `${Node.Attribute}`
//! placeholders count as references. A single [`Substitution`] visitor
//! rewrites matching references into literal identifiers and reproduces
//! everything else unchanged.

use std::collections::HashMap;

use serde_json::{Map, Value};

const REF: &str = "Ref";
const GET_ATT: &str = "Fn::GetAtt";
const JOIN: &str = "Fn::Join";
const SUB: &str = "Fn::Sub";

/// A template value with its references made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A scalar JSON value (string, number, bool or null).
    Literal(Value),
    /// `{"Ref": node}`.
    Ref(String),
    /// `{"Fn::GetAtt": [node, attribute]}` or `{"Fn::GetAtt": "node.attribute"}`.
    GetAtt {
        /// Referenced logical node name.
        node: String,
        /// Attribute name, e.g. `RootResourceId`.
        attribute: String,
        /// Whether the source used the `"node.attribute"` string form.
        dotted: bool,
    },
    /// `{"Fn::Join": [delimiter, [parts...]]}`.
    Join {
        /// Separator placed between parts.
        delimiter: String,
        /// Ordered parts, literals and references mixed.
        parts: Vec<Expr>,
    },
    /// `{"Fn::Sub": format}` or `{"Fn::Sub": [format, {variables}]}`.
    Sub {
        /// Format string with `${...}` placeholders.
        format: String,
        /// Local variables, present only in the list form.
        variables: Option<Vec<(String, Expr)>>,
    },
    /// A JSON array.
    Sequence(Vec<Expr>),
    /// Any other JSON object, key order preserved.
    Map(Vec<(String, Expr)>),
}

impl Expr {
    /// Creates a string literal.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(Value::String(value.into()))
    }

    /// Parses a JSON value into an expression tree.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::Sequence(items.iter().map(Self::from_value).collect()),
            Value::Object(map) => Self::from_object(map),
            scalar => Self::Literal(scalar.clone()),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        if map.len() == 1
            && let Some(expr) = map.iter().next().and_then(|(k, v)| Self::intrinsic(k, v))
        {
            return expr;
        }
        Self::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), Self::from_value(v)))
                .collect(),
        )
    }

    fn intrinsic(key: &str, value: &Value) -> Option<Self> {
        match (key, value) {
            (REF, Value::String(node)) => Some(Self::Ref(node.clone())),
            (GET_ATT, Value::String(path)) => {
                path.split_once('.').map(|(node, attribute)| Self::GetAtt {
                    node: node.to_string(),
                    attribute: attribute.to_string(),
                    dotted: true,
                })
            }
            (GET_ATT, Value::Array(args)) => match args.as_slice() {
                [Value::String(node), Value::String(attribute)] => Some(Self::GetAtt {
                    node: node.clone(),
                    attribute: attribute.clone(),
                    dotted: false,
                }),
                _ => None,
            },
            (JOIN, Value::Array(args)) => match args.as_slice() {
                [Value::String(delimiter), Value::Array(parts)] => Some(Self::Join {
                    delimiter: delimiter.clone(),
                    parts: parts.iter().map(Self::from_value).collect(),
                }),
                _ => None,
            },
            (SUB, Value::String(format)) => Some(Self::Sub {
                format: format.clone(),
                variables: None,
            }),
            (SUB, Value::Array(args)) => match args.as_slice() {
                [Value::String(format), Value::Object(variables)] => Some(Self::Sub {
                    format: format.clone(),
                    variables: Some(
                        variables
                            .iter()
                            .map(|(k, v)| (k.clone(), Self::from_value(v)))
                            .collect(),
                    ),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    /// Converts the expression back into JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Ref(node) => single(REF, Value::String(node.clone())),
            Self::GetAtt {
                node,
                attribute,
                dotted,
            } => {
                let args = if *dotted {
                    Value::String(format!("{node}.{attribute}"))
                } else {
                    Value::Array(vec![
                        Value::String(node.clone()),
                        Value::String(attribute.clone()),
                    ])
                };
                single(GET_ATT, args)
            }
            Self::Join { delimiter, parts } => single(
                JOIN,
                Value::Array(vec![
                    Value::String(delimiter.clone()),
                    Value::Array(parts.iter().map(Self::to_value).collect()),
                ]),
            ),
            Self::Sub { format, variables } => match variables {
                None => single(SUB, Value::String(format.clone())),
                Some(variables) => single(
                    SUB,
                    Value::Array(vec![Value::String(format.clone()), object(variables)]),
                ),
            },
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => object(entries),
        }
    }

    /// Returns the string if this is a string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the value stored under `key` if this is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns a copy of this map with `key` replaced by `value`, or removed
    /// when `value` is `None`. Non-map expressions are returned unchanged.
    #[must_use]
    pub fn with_entry(&self, key: &str, value: Option<Self>) -> Self {
        let Self::Map(entries) = self else {
            return self.clone();
        };
        let entries = entries
            .iter()
            .filter_map(|(k, v)| {
                if k == key {
                    value.clone().map(|value| (k.clone(), value))
                } else {
                    Some((k.clone(), v.clone()))
                }
            })
            .collect();
        Self::Map(entries)
    }

    /// Collects the logical names targeted by every `Ref`, `Fn::GetAtt` and
    /// `Fn::Sub` placeholder, in document order.
    #[must_use]
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Ref(node) | Self::GetAtt { node, .. } => out.push(node),
            Self::Join { parts: items, .. } | Self::Sequence(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Sub { format, variables } => {
                let locals = variables.as_deref().unwrap_or_default();
                for segment in sub_segments(format) {
                    if let SubSegment::Placeholder(name) = segment
                        && !is_local(locals, name)
                    {
                        out.push(placeholder_node(name));
                    }
                }
                for (_, value) in locals {
                    value.collect_references(out);
                }
            }
            Self::Map(entries) => {
                for (_, value) in entries {
                    value.collect_references(out);
                }
            }
        }
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn object(entries: &[(String, Expr)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect(),
    )
}

/// One piece of a `Fn::Sub` format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubSegment<'a> {
    /// Text reproduced as is, including `${!...}` escapes.
    Text(&'a str),
    /// The name inside `${...}`.
    Placeholder(&'a str),
}

fn sub_segments(format: &str) -> Vec<SubSegment<'_>> {
    let mut segments = Vec::new();
    let mut rest = format;
    while let Some(start) = rest.find("${") {
        let after = rest.get(start + 2..).unwrap_or_default();
        let Some(end) = after.find('}') else {
            break;
        };
        let name = after.get(..end).unwrap_or_default();
        if name.starts_with('!') {
            segments.push(SubSegment::Text(rest.get(..start + end + 3).unwrap_or_default()));
        } else {
            segments.push(SubSegment::Text(rest.get(..start).unwrap_or_default()));
            segments.push(SubSegment::Placeholder(name));
        }
        rest = after.get(end + 1..).unwrap_or_default();
    }
    segments.push(SubSegment::Text(rest));
    segments
}

/// Node part of a `${Node}` or `${Node.Attribute}` placeholder.
fn placeholder_node(name: &str) -> &str {
    name.split_once('.').map_or(name, |(node, _)| node)
}

fn is_local(locals: &[(String, Expr)], name: &str) -> bool {
    locals.iter().any(|(k, _)| k == name)
}

/// Rewrites reference leaves into literal identifiers.
///
/// Built from `(old identity -> new identifier)` pairs. `Ref` leaves are
/// matched on the node name, `Fn::GetAtt` leaves on `(node, attribute)`.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    refs: HashMap<String, String>,
    attributes: HashMap<(String, String), String>,
}

impl Substitution {
    /// Creates an empty substitution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `{"Ref": node}` with `replacement`.
    #[must_use]
    pub fn with_ref(mut self, node: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.refs.insert(node.into(), replacement.into());
        self
    }

    /// Replaces `Fn::GetAtt` of `node.attribute` with `replacement`.
    #[must_use]
    pub fn with_attribute(
        mut self,
        node: impl Into<String>,
        attribute: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.attributes
            .insert((node.into(), attribute.into()), replacement.into());
        self
    }

    /// Returns `true` if no pair has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.attributes.is_empty()
    }

    /// Applies the substitution to `expr`, recursing through joins,
    /// sequences and maps.
    #[must_use]
    pub fn apply(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Literal(_) => expr.clone(),
            Expr::Ref(node) => match self.refs.get(node) {
                Some(id) => Expr::literal(id.clone()),
                None => expr.clone(),
            },
            Expr::GetAtt {
                node, attribute, ..
            } => match self.attributes.get(&(node.clone(), attribute.clone())) {
                Some(id) => Expr::literal(id.clone()),
                None => expr.clone(),
            },
            Expr::Join { delimiter, parts } => Expr::Join {
                delimiter: delimiter.clone(),
                parts: parts.iter().map(|part| self.apply(part)).collect(),
            },
            Expr::Sub { format, variables } => {
                let locals = variables.as_deref().unwrap_or_default();
                let format = sub_segments(format)
                    .into_iter()
                    .map(|segment| match segment {
                        SubSegment::Text(text) => text.to_string(),
                        SubSegment::Placeholder(name) => match self.placeholder(locals, name) {
                            Some(id) => id.to_string(),
                            None => format!("${{{name}}}"),
                        },
                    })
                    .collect();
                Expr::Sub {
                    format,
                    variables: variables.as_ref().map(|vars| {
                        vars.iter()
                            .map(|(k, v)| (k.clone(), self.apply(v)))
                            .collect()
                    }),
                }
            }
            Expr::Sequence(items) => {
                Expr::Sequence(items.iter().map(|item| self.apply(item)).collect())
            }
            Expr::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.apply(v)))
                    .collect(),
            ),
        }
    }
}

impl Substitution {
    /// Replacement for a `Fn::Sub` placeholder, unless it names a local
    /// variable.
    fn placeholder(&self, locals: &[(String, Expr)], name: &str) -> Option<&str> {
        if is_local(locals, name) {
            return None;
        }
        match name.split_once('.') {
            Some((node, attribute)) => self
                .attributes
                .get(&(node.to_string(), attribute.to_string())),
            None => self.refs.get(name),
        }
        .map(String::as_str)
    }
}
