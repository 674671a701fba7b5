//! Parsed configuration documents
//!
//! A [`Document`] is an immutable tree of [`Node`]s produced by a
//! [`DocumentLoader`]. Subscribers never see the raw file; they receive the
//! subtree at their [`ConfigPath`] and decode it into their own typed
//! configuration with [`decode_section`].

pub mod duration;
pub mod loader;
pub mod path;

pub use loader::{DocumentFormat, DocumentLoader, FileLoader};
pub use path::ConfigPath;

use crate::core::errors::ReloadError;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single value in a configuration document
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Signed nanoseconds
    ///
    /// The file loaders never produce this; text such as `30s` stays a
    /// string until decoded. Custom loaders and documents built in code use
    /// it for native duration values.
    Duration(i64),
    List(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

impl Node {
    /// Child of a mapping node
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Resolve a path below this node; `None` is the absent marker
    pub fn lookup(&self, path: &ConfigPath) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.get(segment))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Duration(_) => "duration",
            Node::List(_) => "list",
            Node::Map(_) => "map",
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Convert into a JSON value so serde can drive typed decoding
    ///
    /// Durations become integer nanoseconds. Non-finite floats have no JSON
    /// form and are an error naming the offending key.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        self.to_json_at("")
    }

    fn to_json_at(&self, at: &str) -> Result<serde_json::Value, String> {
        use serde_json::Value;

        Ok(match self {
            Node::Null => Value::Null,
            Node::Bool(value) => Value::Bool(*value),
            Node::Int(value) => Value::from(*value),
            Node::Float(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .ok_or_else(|| match at {
                    "" => format!("non-finite number {value} cannot be decoded"),
                    at => format!("{at}: non-finite number {value} cannot be decoded"),
                })?,
            Node::String(value) => Value::String(value.clone()),
            Node::Duration(nanos) => Value::from(*nanos),
            Node::List(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| item.to_json_at(&child_key(at, &index.to_string())))
                    .collect::<Result<_, _>>()?,
            ),
            Node::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json_at(&child_key(at, key))?)))
                    .collect::<Result<serde_json::Map<_, _>, String>>()?,
            ),
        })
    }
}

fn child_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(value) => Node::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Node::Int(int),
                None => Node::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(value) => Node::String(value),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(entries) => Node::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<toml::Value> for Node {
    fn from(value: toml::Value) -> Self {
        use toml::Value;

        match value {
            Value::String(value) => Node::String(value),
            Value::Integer(value) => Node::Int(value),
            Value::Float(value) => Node::Float(value),
            Value::Boolean(value) => Node::Bool(value),
            Value::Datetime(value) => Node::String(value.to_string()),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Table(entries) => Node::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<serde_yaml::Value> for Node {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value;

        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(value) => Node::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Node::Int(int),
                None => Node::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(value) => Node::String(value),
            Value::Sequence(items) => Node::List(
                items
                    .into_iter()
                    .map(Node::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(yaml_key(key)?, Node::try_from(value)?);
                }
                Node::Map(map)
            }
            Value::Tagged(tagged) => Node::try_from(tagged.value)?,
        })
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;

    match key {
        Value::String(key) => Ok(key),
        Value::Bool(key) => Ok(key.to_string()),
        Value::Number(key) => Ok(key.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(format!("unsupported mapping key {other:?}")),
    }
}

/// An immutable parsed configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Node,
    source: Option<PathBuf>,
}

impl Document {
    pub fn new(root: Node) -> Self {
        Self { root, source: None }
    }

    pub fn with_source(root: Node, source: impl Into<PathBuf>) -> Self {
        Self {
            root,
            source: Some(source.into()),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// File the document was parsed from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Project the subtree at `path`; `None` when the path does not resolve
    pub fn get(&self, path: &ConfigPath) -> Option<&Node> {
        self.root.lookup(path)
    }

    pub fn contains(&self, path: &ConfigPath) -> bool {
        self.get(path).is_some()
    }
}

/// Decode a projected subtree into a typed configuration value
pub fn decode_section<T: DeserializeOwned>(node: &Node, path: &ConfigPath) -> Result<T, ReloadError> {
    let decode_error = |message: String| ReloadError::Decode {
        path: path.to_string(),
        message,
    };
    let value = node.to_json().map_err(decode_error)?;
    serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))
}
