//! # CLI
//!
//! Command-line interface of the renderer.
//!
//! ```bash
//! # Render every cluster into its deploy tree
//! gitops-renderer --config renderer.yaml
//!
//! # Re-render one application of one cluster
//! gitops-renderer --config renderer.yaml --cluster prod-eu --match 'shop/*'
//!
//! # Apply live instead of writing files
//! gitops-renderer --config renderer.yaml --cluster prod-eu --apply
//!
//! # Dry run: no AWS or cluster calls, files only
//! gitops-renderer --config renderer.yaml --disable-api
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Version string with the git hash and build time
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Render templated resource trees into deployable GitOps manifests
#[derive(Debug, Parser)]
#[command(name = "gitops-renderer", version = VERSION, long_about = None)]
pub struct Cli {
    /// Run configuration file
    #[arg(short, long, default_value = "renderer.yaml")]
    pub config: PathBuf,

    /// Only process these clusters (repeatable)
    #[arg(long = "cluster", value_name = "NAME")]
    pub clusters: Vec<String>,

    /// Only process files matching this glob, relative to the source tree.
    /// A bare name matches at any depth and `.yaml` is implied.
    #[arg(short = 'm', long = "match", value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Process the TRASH directory instead of the source tree
    #[arg(long)]
    pub trash: bool,

    /// Drop sections that read secrets and do not issue access keys
    #[arg(long)]
    pub skip_secrets: bool,

    /// Server-side apply to the cluster instead of writing the deploy tree
    #[arg(long, conflicts_with = "disable_api")]
    pub apply: bool,

    /// Dry run without AWS or cluster access. Implies --skip-secrets.
    #[arg(long)]
    pub disable_api: bool,
}

impl Cli {
    /// Secret skipping is forced on when the API is disabled
    pub fn skip_secrets(&self) -> bool {
        self.skip_secrets || self.disable_api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_disable_api_implies_skip_secrets() {
        let cli = Cli::parse_from(["gitops-renderer", "--disable-api"]);
        assert!(cli.skip_secrets());
        assert!(!cli.apply);
    }

    #[test]
    fn test_parses_filters() {
        let cli = Cli::parse_from([
            "gitops-renderer",
            "--config",
            "ops/renderer.yaml",
            "--cluster",
            "prod-eu",
            "--cluster",
            "staging",
            "--match",
            "shop/*",
            "--trash",
        ]);
        assert_eq!(cli.config, PathBuf::from("ops/renderer.yaml"));
        assert_eq!(cli.clusters, vec!["prod-eu", "staging"]);
        assert_eq!(cli.pattern.as_deref(), Some("shop/*"));
        assert!(cli.trash);
        assert!(!cli.skip_secrets());
    }

    #[test]
    fn test_apply_conflicts_with_disable_api() {
        assert!(Cli::try_parse_from(["gitops-renderer", "--apply", "--disable-api"]).is_err());
    }
}
