//! # Kubernetes Cluster Backend
//!
//! Reads managed secrets and applies resources with server-side apply.
//!
//! Group/version/kind lookups go through API discovery once per kind and are
//! cached for the rest of the run.

use crate::constants::ENV_ACCESS_KEY_ID;
use crate::provider::ClusterBackend;
use crate::resource::{Gvk, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{Config, KubeConfigOptions};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, ApiResource, Scope};
use kube::Client;
use std::collections::HashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Kubernetes API access for managed secret reads and server-side apply
pub struct KubeCluster {
    client: Client,
    discovery_cache: AsyncMutex<HashMap<Gvk, (ApiResource, ApiCapabilities)>>,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Connect using the kubeconfig, optionally pinned to a context
    #[allow(clippy::missing_errors_doc, reason = "Fails when no kubeconfig is usable")]
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                let config = Config::from_kubeconfig(&options)
                    .await
                    .with_context(|| format!("Failed to load kubeconfig context {context}"))?;
                Client::try_from(config).context("Failed to create Kubernetes client")?
            }
            None => Client::try_default()
                .await
                .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?,
        };
        Ok(Self::new(client))
    }

    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovery_cache: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn resolve(&self, gvk: &Gvk) -> Result<(ApiResource, ApiCapabilities)> {
        let mut cache = self.discovery_cache.lock().await;
        if let Some(found) = cache.get(gvk) {
            return Ok(found.clone());
        }

        let request = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let resolved = discovery::pinned_kind(&self.client, &request)
            .await
            .with_context(|| format!("Failed to discover API resource for {gvk}"))?;
        debug!(gvk = %gvk, plural = %resolved.0.plural, "Discovered API resource");
        cache.insert(gvk.clone(), resolved.clone());
        Ok(resolved)
    }
}

#[async_trait]
impl ClusterBackend for KubeCluster {
    async fn managed_secret_key_id(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get secret {namespace}/{name}"))?;

        Ok(secret
            .and_then(|s| s.data)
            .and_then(|data| data.get(ENV_ACCESS_KEY_ID).cloned())
            .and_then(|v| String::from_utf8(v.0).ok()))
    }

    async fn apply(&self, resource: &Resource, field_manager: &str) -> Result<()> {
        let (api_resource, capabilities) = self.resolve(resource.gvk()).await?;

        let api: Api<DynamicObject> = if matches!(capabilities.scope, Scope::Namespaced) {
            Api::namespaced_with(self.client.clone(), resource.namespace(), &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };

        let mut params = PatchParams::apply(field_manager).force();
        if resource.options().validate {
            params = params.validation_strict();
        }

        api.patch(resource.name(), &params, &Patch::Apply(resource.to_value()))
            .await
            .with_context(|| {
                format!(
                    "Failed to apply {} {}/{}",
                    resource.kind(),
                    resource.namespace(),
                    resource.name()
                )
            })?;

        info!(
            kind = resource.kind(),
            namespace = resource.namespace(),
            name = resource.name(),
            "Applied resource"
        );
        Ok(())
    }
}
