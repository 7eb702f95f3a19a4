//! # Resource Model
//!
//! Generic documents flowing through the pipeline.
//!
//! A [`Resource`] wraps a canonical, key-ordered JSON object tree together with
//! its group/version/kind and the per-document [`ResourceOptions`]. Typed access
//! to well-known kinds goes through [`typed`], which maps to and from the
//! `k8s-openapi` structs explicitly.

pub mod typed;

use crate::constants::DEFAULT_NAMESPACE;
use crate::error::PipelineError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

pub use typed::{Document, KindSpecific};

/// Flags carried alongside each document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOptions {
    /// Ask the API server for strict field validation on apply
    pub validate: bool,
    /// The workload must roll out again (e.g. rotated credentials)
    pub needs_restart: bool,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            validate: true,
            needs_restart: false,
        }
    }
}

/// Group/version/kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Split an `apiVersion` such as `apps/v1` (or core `v1`) into group and version
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Destination key of a resource: `namespace/group/version/kind/name`
///
/// The core API group is spelled `core` so every path segment is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    /// Path of the resource relative to an application's deploy directory
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.namespace);
        path.push(&self.group);
        path.push(&self.version);
        path.push(&self.kind);
        path.push(format!("{}.yaml", self.name));
        path
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.namespace, self.group, self.version, self.kind, self.name
        )
    }
}

/// A generic (unstructured) resource document
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    gvk: Gvk,
    object: Map<String, Value>,
    options: ResourceOptions,
}

impl Resource {
    /// Build a resource from a decoded document.
    ///
    /// The document must be an object with a non-empty `apiVersion`, `kind`
    /// and `metadata.name`.
    pub fn from_value(value: Value, options: ResourceOptions) -> Result<Self, PipelineError> {
        let Value::Object(object) = value else {
            return Err(PipelineError::InvalidResource(format!(
                "expected a mapping, found {}",
                value_type(&value)
            )));
        };

        let api_version = non_empty_str(object.get("apiVersion"))
            .ok_or_else(|| PipelineError::InvalidResource("missing apiVersion".to_string()))?;
        let kind = non_empty_str(object.get("kind"))
            .ok_or_else(|| PipelineError::InvalidResource("missing kind".to_string()))?;
        let gvk = Gvk::from_api_version(api_version, kind);

        let has_name = object
            .get("metadata")
            .and_then(|m| non_empty_str(m.get("name")))
            .is_some();
        if !has_name {
            return Err(PipelineError::InvalidResource(format!(
                "{kind} is missing metadata.name"
            )));
        }

        Ok(Self {
            gvk,
            object,
            options,
        })
    }

    /// Decode a single YAML document
    pub fn from_yaml(yaml: &str, options: ResourceOptions) -> Result<Self, PipelineError> {
        Self::from_value(decode_yaml(yaml)?, options)
    }

    pub fn gvk(&self) -> &Gvk {
        &self.gvk
    }

    pub fn kind(&self) -> &str {
        &self.gvk.kind
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Namespace as written in the document, if any
    pub fn declared_namespace(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| non_empty_str(m.get("namespace")))
    }

    /// Namespace, falling back to `default`
    pub fn namespace(&self) -> &str {
        self.declared_namespace().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn options(&self) -> ResourceOptions {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut ResourceOptions {
        &mut self.options
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        let metadata = self
            .object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(metadata) = metadata {
            let annotations = metadata
                .entry("annotations")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(annotations) = annotations {
                annotations.insert(key.to_string(), Value::String(value.into()));
            }
        }
    }

    pub fn id(&self) -> ResourceId {
        let group = if self.gvk.group.is_empty() {
            "core".to_string()
        } else {
            self.gvk.group.clone()
        };
        ResourceId {
            namespace: self.namespace().to_string(),
            group,
            version: self.gvk.version.clone(),
            kind: self.gvk.kind.clone(),
            name: self.name().to_string(),
        }
    }

    pub fn object(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }

    /// Canonical YAML encoding. Keys are emitted in sorted order at every depth.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&canonical(&Value::Object(self.object.clone())))
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.object.get("metadata").and_then(Value::as_object)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind(), self.namespace(), self.name())
    }
}

/// Decode YAML text into a JSON tree. Empty or comment-only input decodes to `null`.
pub fn decode_yaml(text: &str) -> Result<Value, PipelineError> {
    let document: serde_yaml::Value = serde_yaml::from_str(text)?;
    serde_json::to_value(document)
        .map_err(|e| PipelineError::InvalidResource(format!("unsupported document structure: {e}")))
}

/// Rebuild a tree with every mapping's keys in sorted order
fn canonical(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut mapping = serde_yaml::Mapping::with_capacity(keys.len());
            for key in keys {
                mapping.insert(serde_yaml::Value::String(key.clone()), canonical(&map[key]));
            }
            serde_yaml::Value::Mapping(mapping)
        }
        Value::Array(items) => serde_yaml::Value::Sequence(items.iter().map(canonical).collect()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Null => serde_yaml::Value::Null,
        Value::Number(n) => serde_yaml::to_value(n).unwrap_or(serde_yaml::Value::Null),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
