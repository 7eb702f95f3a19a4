//! # Resource Parser
//!
//! Decodes rendered sections into generic resources.
//!
//! A section decodes to a single document. List documents (a bare YAML
//! sequence, or a `*List` kind with an `items` array) are exploded into one
//! resource per element. Lists nested inside lists are rejected.

use crate::error::PipelineError;
use crate::resource::{decode_yaml, Resource, ResourceOptions};
use serde_json::Value;

/// Parse one rendered section into the resources it contains
#[allow(clippy::missing_errors_doc, reason = "See PipelineError")]
pub fn parse_documents(
    rendered: &str,
    options: ResourceOptions,
) -> Result<Vec<Resource>, PipelineError> {
    if rendered.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document = decode_yaml(rendered)?;

    let items = match document {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        document if is_list_object(&document) => match document {
            Value::Object(mut object) => match object.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        },
        document => return Ok(vec![Resource::from_value(document, options)?]),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if item.is_array() || is_list_object(&item) {
                return Err(PipelineError::NestedList { index });
            }
            Resource::from_value(item, options)
        })
        .collect()
}

fn is_list_object(value: &Value) -> bool {
    let Value::Object(object) = value else {
        return false;
    };
    let is_list_kind = object
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"));
    is_list_kind && object.get("items").is_some_and(Value::is_array)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";

    #[test]
    fn test_single_document_is_singleton() {
        let resources = parse_documents(CONFIG_MAP, ResourceOptions::default()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name(), "a");
    }

    #[test]
    fn test_list_kind_is_exploded() {
        let yaml = "apiVersion: v1\nkind: List\nitems:\n- apiVersion: v1\n  kind: ConfigMap\n  metadata:\n    name: a\n- apiVersion: v1\n  kind: Secret\n  metadata:\n    name: b\n";
        let resources = parse_documents(yaml, ResourceOptions::default()).unwrap();
        let names: Vec<_> = resources.iter().map(Resource::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(resources[1].kind(), "Secret");
    }

    #[test]
    fn test_bare_sequence_is_exploded() {
        let yaml = "- apiVersion: v1\n  kind: ConfigMap\n  metadata:\n    name: a\n- apiVersion: v1\n  kind: ConfigMap\n  metadata:\n    name: b\n";
        assert_eq!(
            parse_documents(yaml, ResourceOptions::default())
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_nested_list_is_rejected() {
        let yaml = "apiVersion: v1\nkind: List\nitems:\n- apiVersion: v1\n  kind: ConfigMapList\n  items: []\n";
        let err = parse_documents(yaml, ResourceOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NestedList { index: 0 }));
    }

    #[test]
    fn test_options_are_attached() {
        let options = ResourceOptions {
            validate: false,
            needs_restart: true,
        };
        let resources = parse_documents(CONFIG_MAP, options).unwrap();
        assert_eq!(resources[0].options(), options);
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let err = parse_documents("kind: [unterminated", ResourceOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_empty_render_yields_nothing() {
        assert!(parse_documents("", ResourceOptions::default())
            .unwrap()
            .is_empty());
    }
}
