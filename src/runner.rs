//! # Runner
//!
//! Processes one cluster: discovers source files, then for each file in
//! phase order reads, renders, rewrites and delivers its resources.
//!
//! Failures are scoped to the file that caused them and collected into the
//! [`RunReport`]. Contract violations inside the rewrite pipeline
//! ([`PipelineError::is_fatal`]) stop the cluster run instead.

use crate::discovery::{discover_files, DiscoveredFile, DiscoveryOptions};
use crate::error::PipelineError;
use crate::render::{render_file, TemplateRenderer};
use crate::rewrite::{RewriteOptions, RewritePipeline};
use crate::sink::ResourceSink;
use std::fmt;
use std::path::{Component, PathBuf};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

/// Everything a cluster run needs, built once and passed down by reference
#[derive(Debug)]
pub struct RunContext {
    pub cluster: String,
    pub source_dir: PathBuf,
    pub discovery: DiscoveryOptions,
    pub renderer: TemplateRenderer,
    pub pipeline: RewritePipeline,
    pub rewrite_options: RewriteOptions,
    pub sink: ResourceSink,
}

/// A source file that could not be processed
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: PipelineError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Outcome of a cluster run
#[derive(Debug, Default)]
pub struct RunReport {
    pub files_total: usize,
    pub files_done: usize,
    pub sections_total: usize,
    pub sections_skipped: usize,
    pub resources_delivered: usize,
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done {} / skipped {} of {} sections / errors {}",
            self.files_done,
            self.sections_skipped,
            self.sections_total,
            self.failures.len()
        )
    }
}

/// Errors that stop a cluster run
#[derive(Debug, Error)]
pub enum ClusterRunError {
    #[error("failed to discover source files: {0:#}")]
    Discovery(#[source] anyhow::Error),

    #[error("pipeline contract violated while processing {}: {source}", path.display())]
    Invariant {
        path: PathBuf,
        #[source]
        source: PipelineError,
        /// Progress up to the violation
        report: Box<RunReport>,
    },
}

struct FileOutcome {
    sections: usize,
    skipped: usize,
    delivered: usize,
}

/// Application a source file belongs to: its top-level directory, or the
/// cluster name for files at the root of the source tree.
pub fn app_name(file: &DiscoveredFile, cluster: &str) -> String {
    let mut components = file.relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(first)), Some(_)) => first.to_string_lossy().into_owned(),
        _ => cluster.to_string(),
    }
}

/// Process every source file of one cluster.
///
/// # Errors
///
/// Returns [`ClusterRunError`] when discovery fails or the rewrite pipeline
/// violates its contract. Per-file failures are reported in the [`RunReport`].
pub async fn run_cluster(ctx: &mut RunContext) -> Result<RunReport, ClusterRunError> {
    let files = discover_files(&ctx.source_dir, &ctx.discovery).map_err(ClusterRunError::Discovery)?;
    let mut report = RunReport {
        files_total: files.len(),
        ..RunReport::default()
    };
    info!(cluster = %ctx.cluster, files = files.len(), "Discovered source files");

    for file in &files {
        let span = info_span!("file", path = %file.relative.display(), phase = file.phase);
        match process_file(ctx, file).instrument(span).await {
            Ok(outcome) => {
                report.files_done += 1;
                report.sections_total += outcome.sections;
                report.sections_skipped += outcome.skipped;
                report.resources_delivered += outcome.delivered;
                info!(
                    file = %file.relative.display(),
                    resources = outcome.delivered,
                    "done (skipped {} of {} sections)",
                    outcome.skipped,
                    outcome.sections
                );
            }
            Err(err) if err.is_fatal() => {
                error!(file = %file.relative.display(), error = %err, "Pipeline contract violated, stopping cluster run");
                return Err(ClusterRunError::Invariant {
                    path: file.relative.clone(),
                    source: err,
                    report: Box::new(report),
                });
            }
            Err(err) => {
                error!(file = %file.relative.display(), error = %err, "Failed to process file");
                report.failures.push(FileFailure {
                    path: file.relative.clone(),
                    error: err,
                });
            }
        }
    }

    info!(cluster = %ctx.cluster, summary = %report, "Cluster run complete");
    Ok(report)
}

async fn process_file(ctx: &mut RunContext, file: &DiscoveredFile) -> Result<FileOutcome, PipelineError> {
    let content = tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|source| PipelineError::Read {
            path: file.path.clone(),
            source,
        })?;

    let rendered = render_file(&content, &ctx.renderer, ctx.rewrite_options.skip_secrets)?;
    let resources = ctx.pipeline.run(rendered.resources, &ctx.rewrite_options).await?;
    let app = app_name(file, &ctx.cluster);
    let delivered = ctx.sink.deliver_all(&app, &resources).await?;

    Ok(FileOutcome {
        sections: rendered.sections,
        skipped: rendered.skipped,
        delivered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn discovered(relative: &str) -> DiscoveredFile {
        DiscoveredFile {
            path: Path::new("/src").join(relative),
            relative: PathBuf::from(relative),
            phase: 0,
        }
    }

    #[test]
    fn test_app_name_is_top_level_directory() {
        assert_eq!(app_name(&discovered("shop/api/deployment.yaml"), "prod"), "shop");
        assert_eq!(app_name(&discovered("app/deployment.yaml"), "prod"), "app");
    }

    #[test]
    fn test_root_files_use_cluster_name() {
        assert_eq!(app_name(&discovered("namespace.yaml"), "prod"), "prod");
    }

    #[test]
    fn test_report_summary() {
        let report = RunReport {
            files_total: 4,
            files_done: 3,
            sections_total: 7,
            sections_skipped: 2,
            resources_delivered: 9,
            failures: vec![FileFailure {
                path: PathBuf::from("app/broken.yaml"),
                error: PipelineError::NestedList { index: 1 },
            }],
        };
        assert_eq!(report.to_string(), "done 3 / skipped 2 of 7 sections / errors 1");
        assert!(!report.is_success());
    }
}
