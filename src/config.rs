//! # Configuration
//!
//! Two layers:
//!
//! - [`RendererConfig`]: the run configuration file (YAML) listing clusters,
//!   their source and deploy trees and how to reach them
//! - [`RuntimeSettings`]: process-level settings from environment variables
//!
//! ```yaml
//! clusters:
//!   - name: prod-eu
//!     sourceDir: clusters/prod-eu
//!     deployDir: deploy/prod-eu
//!     kubeContext: prod-eu-admin
//!     awsRegion: eu-west-1
//!     exclude:
//!       - "**/*.draft.yaml"
//!     sealing:
//!       controllerName: sealed-secrets
//!       controllerNamespace: kube-system
//! ```

use crate::constants::{
    DEFAULT_KUBESEAL_PATH, DEFAULT_MAX_KEY_AGE_DAYS, DEFAULT_SEALED_SECRETS_CONTROLLER,
    DEFAULT_SEALED_SECRETS_NAMESPACE,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Run configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    pub clusters: Vec<ClusterConfig>,
}

/// One cluster target
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
    /// Root of the source resource templates
    pub source_dir: PathBuf,
    /// Root of the rendered deploy tree
    pub deploy_dir: PathBuf,
    /// Kubeconfig context (current context when absent)
    #[serde(default)]
    pub kube_context: Option<String>,
    pub aws_region: String,
    /// Globs matched against paths relative to `sourceDir`
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Seal generated secrets with kubeseal. Plain secrets are written when absent.
    #[serde(default)]
    pub sealing: Option<SealingConfig>,
}

/// Sealed-secrets controller the generated secrets are sealed for
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealingConfig {
    #[serde(default = "default_controller_name")]
    pub controller_name: String,
    #[serde(default = "default_controller_namespace")]
    pub controller_namespace: String,
}

fn default_controller_name() -> String {
    DEFAULT_SEALED_SECRETS_CONTROLLER.to_string()
}

fn default_controller_namespace() -> String {
    DEFAULT_SEALED_SECRETS_NAMESPACE.to_string()
}

impl RendererConfig {
    /// Load and validate the configuration file.
    ///
    /// Relative `sourceDir`/`deployDir` paths are resolved against the
    /// directory containing the file.
    #[allow(clippy::missing_errors_doc, reason = "Fails on unreadable or invalid configuration")]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for cluster in &mut config.clusters {
            cluster.source_dir = base.join(&cluster.source_dir);
            cluster.deploy_dir = base.join(&cluster.deploy_dir);
        }
        Ok(config)
    }

    #[allow(clippy::missing_errors_doc, reason = "Fails on invalid configuration")]
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                bail!("cluster name must not be empty");
            }
            if !names.insert(cluster.name.as_str()) {
                bail!("cluster '{}' is defined more than once", cluster.name);
            }
            if cluster.aws_region.is_empty() {
                bail!("cluster '{}' has no awsRegion", cluster.name);
            }
            for pattern in &cluster.exclude {
                glob::Pattern::new(pattern).with_context(|| {
                    format!("cluster '{}' has invalid exclude glob '{pattern}'", cluster.name)
                })?;
            }
        }
        Ok(())
    }

    /// Clusters selected by name, all clusters when `only` is empty
    #[allow(clippy::missing_errors_doc, reason = "Fails when a requested cluster is unknown")]
    pub fn select(&self, only: &[String]) -> Result<Vec<&ClusterConfig>> {
        if only.is_empty() {
            return Ok(self.clusters.iter().collect());
        }
        only.iter()
            .map(|name| {
                self.clusters
                    .iter()
                    .find(|c| &c.name == name)
                    .with_context(|| format!("cluster '{name}' is not configured"))
            })
            .collect()
    }
}

/// Process-level settings
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Default log level when `RUST_LOG` is not set
    pub log_level: String,
    /// Log format (text, json)
    pub log_format: String,
    /// kubeseal binary, resolved from PATH
    pub kubeseal_path: String,
    /// Rotate access keys older than this
    pub max_key_age_days: i64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            kubeseal_path: DEFAULT_KUBESEAL_PATH.to_string(),
            max_key_age_days: DEFAULT_MAX_KEY_AGE_DAYS,
        }
    }
}

impl RuntimeSettings {
    /// Load settings from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", "info"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            kubeseal_path: env_var_or_default_str("KUBESEAL_PATH", DEFAULT_KUBESEAL_PATH),
            max_key_age_days: env_var_or_default("MAX_KEY_AGE_DAYS", DEFAULT_MAX_KEY_AGE_DAYS),
        }
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
