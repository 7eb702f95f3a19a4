//! # GitOps Renderer
//!
//! Turns a tree of resource templates into normalized, deployable Kubernetes
//! manifests for GitOps delivery.
//!
//! ## Pipeline
//!
//! 1. **Discovery** ([`discovery`]): walk the source tree, apply exclude and
//!    match globs, order files by phase then path
//! 2. **Render** ([`render`]): split each file into sections, render them as
//!    templates, decode and explode list documents
//! 3. **Rewrite** ([`rewrite`]): run rewrite routines over the file's
//!    resources, including IAM access key issuance and rotation
//! 4. **Sink** ([`sink`]): write canonical YAML to the deploy tree or apply
//!    with server-side apply
//!
//! [`runner`] drives one cluster through these stages and aggregates failures
//! per file.

pub mod cli;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod provider;
pub mod render;
pub mod resource;
pub mod rewrite;
pub mod runner;
pub mod sink;

pub use error::PipelineError;
pub use resource::{Document, Resource, ResourceId, ResourceOptions};
pub use runner::{run_cluster, ClusterRunError, RunContext, RunReport};
