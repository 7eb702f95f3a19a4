//! # Errors
//!
//! Error types for the resource processing pipeline.
//!
//! Errors are split by blast radius:
//!
//! - **File-scoped**: template, parse, conversion, rewrite and sink failures.
//!   The containing file is abandoned, the run continues with the next file.
//! - **Cluster-scoped**: contract violations inside the pipeline itself
//!   (a rewrite pass that shrinks the working set, a resource losing its name).
//!   These indicate a defective routine and halt the cluster's run.

use crate::render::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render section {section}: {source}")]
    Template {
        section: usize,
        #[source]
        source: TemplateError,
    },

    #[error("failed to parse document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("nested list at element {index} is not supported")]
    NestedList { index: usize },

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    #[error("failed to convert {kind} '{name}': {message}")]
    Conversion {
        kind: String,
        name: String,
        message: String,
    },

    #[error("rewrite '{routine}' failed for {resource}: {source:#}")]
    Rewrite {
        routine: &'static str,
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("rewrite '{routine}' shrank the working set from {before} to {after} resources")]
    ShrinkingRewrite {
        routine: &'static str,
        before: usize,
        after: usize,
    },

    #[error("{kind} resource lost its name during conversion")]
    LostName { kind: String },

    #[error("failed to deliver {resource}: {source:#}")]
    Sink {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resource id {0} was already written in this run")]
    DuplicateResourceId(String),
}

impl PipelineError {
    /// Contract violations halt the whole cluster run instead of a single file
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::ShrinkingRewrite { .. } | PipelineError::LostName { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_violations_are_fatal() {
        let shrink = PipelineError::ShrinkingRewrite {
            routine: "iam-auth",
            before: 2,
            after: 1,
        };
        assert!(shrink.is_fatal());
        assert!(PipelineError::LostName {
            kind: "Deployment".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_file_scoped_errors_are_not_fatal() {
        assert!(!PipelineError::NestedList { index: 0 }.is_fatal());
        assert!(!PipelineError::InvalidResource("missing kind".to_string()).is_fatal());
        assert!(!PipelineError::DuplicateResourceId("a/b".to_string()).is_fatal());
    }

    #[test]
    fn test_shrinking_message_names_routine() {
        let err = PipelineError::ShrinkingRewrite {
            routine: "restart-marker",
            before: 3,
            after: 0,
        };
        assert_eq!(
            err.to_string(),
            "rewrite 'restart-marker' shrank the working set from 3 to 0 resources"
        );
    }
}
