//! # Rewrite Pipeline
//!
//! Drives an ordered list of [`RewriteRoutine`]s over the resources of one
//! source file.
//!
//! Every routine sees each document of the current working set once, in order,
//! and may replace it with any number of successors. A pass must never shrink
//! the working set: a routine that drops resources is defective and the error
//! halts the cluster run.

pub mod iam_auth;
pub mod restart;

pub use iam_auth::IamAuthRewriter;
pub use restart::RestartMarker;

use crate::error::PipelineError;
use crate::resource::{Document, Resource};
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Per-invocation flags handed to routines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Do not read or generate secrets (no IAM or cluster calls)
    pub skip_secrets: bool,
}

/// One rewrite step.
///
/// A routine receives a single resource in generic form and returns its
/// successors. Returning the input unchanged as a singleton is a pass-through.
#[async_trait]
pub trait RewriteRoutine: Send + Sync {
    /// Stable name used in errors and logs
    fn name(&self) -> &'static str;

    async fn rewrite(&self, resource: Resource, options: RewriteOptions) -> Result<Vec<Document>>;
}

/// Ordered set of rewrite routines
#[derive(Default)]
pub struct RewritePipeline {
    routines: Vec<Box<dyn RewriteRoutine>>,
}

impl std::fmt::Debug for RewritePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.routines.iter().map(|r| r.name()).collect();
        f.debug_struct("RewritePipeline")
            .field("routines", &names)
            .finish()
    }
}

impl RewritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_routine(mut self, routine: impl RewriteRoutine + 'static) -> Self {
        self.routines.push(Box::new(routine));
        self
    }

    pub fn routine_names(&self) -> Vec<&'static str> {
        self.routines.iter().map(|r| r.name()).collect()
    }

    /// Run every routine over `resources` and return the final working set
    /// in canonical generic form.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Rewrite`] when a routine fails (file-scoped), and
    /// [`PipelineError::ShrinkingRewrite`] or [`PipelineError::LostName`] on a
    /// contract violation (cluster-scoped, see [`PipelineError::is_fatal`]).
    pub async fn run(
        &self,
        resources: Vec<Resource>,
        options: &RewriteOptions,
    ) -> Result<Vec<Resource>, PipelineError> {
        let mut working: Vec<Document> = resources.into_iter().map(Document::from).collect();

        for routine in &self.routines {
            let before = working.len();
            let mut next = Vec::with_capacity(before);

            for document in working {
                let resource = document.into_generic()?;
                let label = resource.to_string();
                // Copied per call: a routine mutating its options cannot affect siblings
                let call_options = *options;
                let produced = routine
                    .rewrite(resource, call_options)
                    .await
                    .map_err(|source| PipelineError::Rewrite {
                        routine: routine.name(),
                        resource: label,
                        source,
                    })?;
                next.extend(produced);
            }

            if next.len() < before {
                return Err(PipelineError::ShrinkingRewrite {
                    routine: routine.name(),
                    before,
                    after: next.len(),
                });
            }
            debug!(
                routine = routine.name(),
                before = before,
                after = next.len(),
                "Rewrite pass complete"
            );
            working = next;
        }

        working.into_iter().map(Document::into_generic).collect()
    }
}
