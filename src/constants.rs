//! # Constants
//!
//! Shared constants used throughout the renderer.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Annotation naming the IAM user whose access keys a workload runs with
pub const ANNOTATION_IAM_USER: &str = "iam.amazonaws.com/user";

/// Annotation switching key rotation on or off for a workload
/// Only [`ROTATION_ENABLED`] enables it; any other value opts the workload out
pub const ANNOTATION_ROTATION: &str = "iam.amazonaws.com/rotation";

/// Value of [`ANNOTATION_ROTATION`] that enables rotation
pub const ROTATION_ENABLED: &str = "enabled";

/// Annotation overriding the managed secret name (defaults to the IAM user name)
pub const ANNOTATION_SECRET_NAME: &str = "iam.amazonaws.com/secret-name";

/// Annotation marking a secret whose lifecycle is owned by the renderer
pub const ANNOTATION_MANAGED_SECRET: &str = "gitops-renderer/managed-secret";

/// Pod template annotation stamped on workloads that must roll out again
pub const ANNOTATION_RESTARTED_AT: &str = "gitops-renderer/restarted-at";

/// Environment variable / secret key holding the access key id
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";

/// Environment variable / secret key holding the secret access key
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Maximum age of an access key before it is rotated (days)
pub const DEFAULT_MAX_KEY_AGE_DAYS: i64 = 30;

/// IAM allows at most two access keys per user
pub const MAX_ACCESS_KEYS_PER_USER: usize = 2;

/// Field manager identity used for server-side apply
pub const FIELD_MANAGER: &str = "gitops-renderer";

/// Reserved directory holding resources scheduled for deletion
pub const TRASH_DIR: &str = "TRASH";

/// Filename prefixes applied first, in order. Anything else lands in the final phase.
pub const PHASE_PREFIXES: &[&str] = &["storageclass", "namespace", "addon"];

/// Namespace assumed for resources that do not declare one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default kubeseal binary name (resolved from PATH)
pub const DEFAULT_KUBESEAL_PATH: &str = "kubeseal";

/// Default sealed-secrets controller name
pub const DEFAULT_SEALED_SECRETS_CONTROLLER: &str = "sealed-secrets-controller";

/// Default sealed-secrets controller namespace
pub const DEFAULT_SEALED_SECRETS_NAMESPACE: &str = "kube-system";
