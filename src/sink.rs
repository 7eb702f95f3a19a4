//! # Resource Sink
//!
//! Final stage of the pipeline. Resources are either written to the deploy
//! tree as canonical YAML:
//!
//! ```text
//! <deployRoot>/<appName>/<namespace>/<group>/<version>/<kind>/<name>.yaml
//! ```
//!
//! or applied to the cluster with server-side apply.
//!
//! Every resource id is recorded for the lifetime of the sink. A second
//! resource with an id already delivered in the same run is rejected instead
//! of silently overwriting the first.

use crate::constants::FIELD_MANAGER;
use crate::error::PipelineError;
use crate::provider::ClusterBackend;
use crate::resource::{Resource, ResourceId};
use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Where resources are delivered
#[derive(Clone)]
pub enum Delivery {
    /// Write canonical YAML below the deploy root
    Files { deploy_root: PathBuf },
    /// Server-side apply to the cluster
    Live { cluster: Arc<dyn ClusterBackend> },
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Files { deploy_root } => f
                .debug_struct("Files")
                .field("deploy_root", deploy_root)
                .finish(),
            Delivery::Live { .. } => f.debug_struct("Live").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub struct ResourceSink {
    delivery: Delivery,
    delivered: HashSet<(String, ResourceId)>,
}

impl ResourceSink {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            delivered: HashSet::new(),
        }
    }

    pub fn files(deploy_root: impl Into<PathBuf>) -> Self {
        Self::new(Delivery::Files {
            deploy_root: deploy_root.into(),
        })
    }

    pub fn live(cluster: Arc<dyn ClusterBackend>) -> Self {
        Self::new(Delivery::Live { cluster })
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Destination file of `resource` in files mode
    pub fn file_path(deploy_root: &Path, app_name: &str, resource: &Resource) -> PathBuf {
        deploy_root.join(app_name).join(resource.id().relative_path())
    }

    /// Deliver every resource of one source file.
    ///
    /// Ids are checked for collisions before anything is delivered, so a
    /// duplicate leaves no partial output from the file.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DuplicateResourceId`] on a collision, and
    /// [`PipelineError::Sink`] when serializing, writing or applying fails.
    pub async fn deliver_all(
        &mut self,
        app_name: &str,
        resources: &[Resource],
    ) -> Result<usize, PipelineError> {
        let mut batch = HashSet::with_capacity(resources.len());
        for resource in resources {
            let key = (app_name.to_string(), resource.id());
            if self.delivered.contains(&key) || !batch.insert(key.clone()) {
                return Err(PipelineError::DuplicateResourceId(format!(
                    "{app_name}/{}",
                    key.1
                )));
            }
        }

        for resource in resources {
            self.deliver(app_name, resource)
                .await
                .map_err(|source| PipelineError::Sink {
                    resource: resource.to_string(),
                    source,
                })?;
        }
        self.delivered.extend(batch);
        Ok(resources.len())
    }

    async fn deliver(&self, app_name: &str, resource: &Resource) -> anyhow::Result<()> {
        match &self.delivery {
            Delivery::Files { deploy_root } => {
                let path = Self::file_path(deploy_root, app_name, resource);
                let yaml = resource
                    .to_yaml()
                    .with_context(|| format!("Failed to serialize {resource}"))?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                tokio::fs::write(&path, yaml)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                debug!(path = %path.display(), "Wrote resource");
                Ok(())
            }
            Delivery::Live { cluster } => {
                cluster.apply(resource, FIELD_MANAGER).await?;
                info!(resource = %resource, "Delivered resource");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn config_map(name: &str, namespace: Option<&str>) -> Resource {
        let mut metadata = json!({"name": name});
        if let Some(ns) = namespace {
            metadata["namespace"] = json!(ns);
        }
        Resource::from_value(
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": metadata, "data": {"b": "2", "a": "1"}}),
            ResourceOptions::default(),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct RecordingCluster {
        applied: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ClusterBackend for RecordingCluster {
        async fn managed_secret_key_id(&self, _: &str, _: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn apply(&self, resource: &Resource, field_manager: &str) -> anyhow::Result<()> {
            if resource.name() == "rejected" {
                anyhow::bail!("admission webhook denied the request");
            }
            self.applied
                .lock()
                .unwrap()
                .push((resource.id().to_string(), field_manager.to_string()));
            Ok(())
        }
    }

    mod files_tests {
        use super::*;

        #[tokio::test]
        async fn test_writes_below_app_and_resource_id() {
            let dir = TempDir::new().unwrap();
            let mut sink = ResourceSink::files(dir.path());

            let written = sink
                .deliver_all("shop", &[config_map("settings", Some("prod")), config_map("flags", None)])
                .await
                .unwrap();
            assert_eq!(written, 2);

            let first = dir.path().join("shop/prod/core/v1/ConfigMap/settings.yaml");
            let second = dir.path().join("shop/default/core/v1/ConfigMap/flags.yaml");
            assert!(first.is_file());
            assert!(second.is_file());
        }

        #[tokio::test]
        async fn test_output_is_canonical_and_parses_back() {
            let dir = TempDir::new().unwrap();
            let mut sink = ResourceSink::files(dir.path());
            let original = config_map("settings", Some("prod"));
            sink.deliver_all("shop", std::slice::from_ref(&original))
                .await
                .unwrap();

            let path = ResourceSink::file_path(dir.path(), "shop", &original);
            let text = std::fs::read_to_string(path).unwrap();
            assert!(text.find("a: '1'").unwrap() < text.find("b: '2'").unwrap());
            assert_eq!(text, original.to_yaml().unwrap());

            let parsed = Resource::from_yaml(&text, ResourceOptions::default()).unwrap();
            assert_eq!(parsed, original);
        }

        #[tokio::test]
        async fn test_duplicate_id_is_rejected_across_files() {
            let dir = TempDir::new().unwrap();
            let mut sink = ResourceSink::files(dir.path());
            sink.deliver_all("shop", &[config_map("settings", None)])
                .await
                .unwrap();

            let err = sink
                .deliver_all("shop", &[config_map("other", None), config_map("settings", None)])
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::DuplicateResourceId(_)));
            // Nothing from the rejected file was written
            assert!(!dir.path().join("shop/default/core/v1/ConfigMap/other.yaml").exists());
        }

        #[tokio::test]
        async fn test_same_id_in_different_apps_is_allowed() {
            let dir = TempDir::new().unwrap();
            let mut sink = ResourceSink::files(dir.path());
            sink.deliver_all("shop", &[config_map("settings", None)])
                .await
                .unwrap();
            sink.deliver_all("billing", &[config_map("settings", None)])
                .await
                .unwrap();
        }
    }

    mod live_tests {
        use super::*;

        #[tokio::test]
        async fn test_applies_with_field_manager() {
            let cluster = Arc::new(RecordingCluster::default());
            let mut sink = ResourceSink::live(Arc::clone(&cluster) as Arc<dyn ClusterBackend>);

            sink.deliver_all("shop", &[config_map("settings", Some("prod"))])
                .await
                .unwrap();
            assert_eq!(
                cluster.applied.lock().unwrap().as_slice(),
                &[(
                    "prod/core/v1/ConfigMap/settings".to_string(),
                    FIELD_MANAGER.to_string()
                )]
            );
        }

        #[tokio::test]
        async fn test_apply_error_is_wrapped() {
            let cluster = Arc::new(RecordingCluster::default());
            let mut sink = ResourceSink::live(cluster);

            let err = sink
                .deliver_all("shop", &[config_map("rejected", Some("prod"))])
                .await
                .unwrap_err();
            let message = err.to_string();
            assert!(message.contains("ConfigMap prod/rejected"));
            assert!(message.contains("admission webhook"));
        }
    }
}
