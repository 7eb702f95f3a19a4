//! # Provider Traits
//!
//! Abstract interfaces for the external systems the pipeline talks to.
//!
//! - [`IamBackend`]: access key lookup and rotation (AWS IAM)
//! - [`ClusterBackend`]: managed secret reads and server-side apply (Kubernetes)
//! - [`Sealer`]: turns a plain secret into a sealed one (kubeseal)
//! - [`SecretLookup`]: secret values for template functions (AWS Secrets Manager)
//!
//! Production implementations live in the submodules. Tests substitute
//! in-memory fakes.

pub mod aws;
pub mod cluster;
pub mod kubeseal;

use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Metadata of an existing access key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub created_at: DateTime<Utc>,
}

/// A freshly issued access key, including its secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// IAM backend owning users' access keys
#[async_trait]
pub trait IamBackend: Send + Sync {
    /// Most recently created access key of `user`, if any
    async fn best_key_for_user(&self, user: &str) -> Result<Option<AccessKeyMetadata>>;

    /// Issue a new access key for `user`.
    ///
    /// Users hold at most two keys: when the limit is reached the oldest key
    /// is deleted before the new one is created. The two steps are not atomic.
    async fn rotate_key(&self, user: &str) -> Result<AccessKey>;
}

/// Live cluster access
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Access key id stored in a managed secret.
    ///
    /// `Ok(None)` when the secret does not exist or the key id is missing or
    /// unreadable. API failures are errors.
    async fn managed_secret_key_id(&self, namespace: &str, name: &str) -> Result<Option<String>>;

    /// Server-side apply `resource` as `field_manager`
    async fn apply(&self, resource: &Resource, field_manager: &str) -> Result<()>;
}

/// Seals secrets before they are persisted
#[async_trait]
pub trait Sealer: Send + Sync {
    async fn seal(&self, secret: &Secret) -> Result<Resource>;
}

/// Secret values for the `secret` template function
///
/// Template functions are synchronous, so implementations backed by async
/// clients must bridge to the runtime themselves.
pub trait SecretLookup: Send + Sync {
    fn secret_value(&self, name: &str) -> Result<Option<String>>;
}

/// Stand-in for every backend when API access is disabled.
///
/// Dry runs force secret skipping, so none of these calls should be reached.
/// If one is, it fails instead of touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

const OFFLINE: &str = "API access is disabled for this run";

#[async_trait]
impl IamBackend for Offline {
    async fn best_key_for_user(&self, user: &str) -> Result<Option<AccessKeyMetadata>> {
        anyhow::bail!("{OFFLINE}: cannot look up access keys of IAM user {user}")
    }

    async fn rotate_key(&self, user: &str) -> Result<AccessKey> {
        anyhow::bail!("{OFFLINE}: cannot rotate access key of IAM user {user}")
    }
}

#[async_trait]
impl ClusterBackend for Offline {
    async fn managed_secret_key_id(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        anyhow::bail!("{OFFLINE}: cannot read secret {namespace}/{name}")
    }

    async fn apply(&self, resource: &Resource, _field_manager: &str) -> Result<()> {
        anyhow::bail!("{OFFLINE}: cannot apply {resource}")
    }
}

impl SecretLookup for Offline {
    fn secret_value(&self, name: &str) -> Result<Option<String>> {
        anyhow::bail!("{OFFLINE}: cannot read secret {name}")
    }
}
