//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code, reason = "Each test crate uses a different subset")]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use gitops_renderer::constants::ANNOTATION_MANAGED_SECRET;
use gitops_renderer::discovery::DiscoveryOptions;
use gitops_renderer::provider::{
    AccessKey, AccessKeyMetadata, ClusterBackend, IamBackend, Sealer, SecretLookup,
};
use gitops_renderer::render::{FunctionRegistry, TemplateRenderer};
use gitops_renderer::rewrite::{IamAuthRewriter, RestartMarker, RewriteOptions, RewritePipeline};
use gitops_renderer::runner::RunContext;
use gitops_renderer::sink::ResourceSink;
use gitops_renderer::{Resource, ResourceOptions};
use k8s_openapi::api::core::v1::Secret;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// In-memory IAM with one key slot per user
#[derive(Default)]
pub struct FakeIam {
    pub keys: Mutex<HashMap<String, AccessKeyMetadata>>,
    pub rotations: Mutex<Vec<String>>,
}

impl FakeIam {
    pub fn with_key(user: &str, id: &str, age_days: i64) -> Self {
        let iam = Self::default();
        iam.keys.lock().unwrap().insert(
            user.to_string(),
            AccessKeyMetadata {
                access_key_id: id.to_string(),
                created_at: Utc::now() - Duration::days(age_days),
            },
        );
        iam
    }

    pub fn rotation_count(&self) -> usize {
        self.rotations.lock().unwrap().len()
    }
}

#[async_trait]
impl IamBackend for FakeIam {
    async fn best_key_for_user(&self, user: &str) -> Result<Option<AccessKeyMetadata>> {
        Ok(self.keys.lock().unwrap().get(user).cloned())
    }

    async fn rotate_key(&self, user: &str) -> Result<AccessKey> {
        let mut rotations = self.rotations.lock().unwrap();
        rotations.push(user.to_string());
        let id = format!("AKIA{}{}", user.to_uppercase().replace('-', ""), rotations.len());
        self.keys.lock().unwrap().insert(
            user.to_string(),
            AccessKeyMetadata {
                access_key_id: id.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(AccessKey {
            access_key_id: id,
            secret_access_key: format!("secret-for-{user}"),
        })
    }
}

/// Cluster holding managed secret key ids and recording applies
#[derive(Default)]
pub struct FakeCluster {
    pub stored: Mutex<HashMap<(String, String), String>>,
    pub applied: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_secret(namespace: &str, name: &str, key_id: &str) -> Self {
        let cluster = Self::default();
        cluster.stored.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            key_id.to_string(),
        );
        cluster
    }
}

#[async_trait]
impl ClusterBackend for FakeCluster {
    async fn managed_secret_key_id(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .stored
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn apply(&self, resource: &Resource, _field_manager: &str) -> Result<()> {
        self.applied.lock().unwrap().push(resource.id().to_string());
        Ok(())
    }
}

/// Produces a `SealedSecret` carrying only the key names
pub struct FakeSealer;

#[async_trait]
impl Sealer for FakeSealer {
    async fn seal(&self, secret: &Secret) -> Result<Resource> {
        let encrypted: serde_json::Map<String, serde_json::Value> = secret
            .data
            .iter()
            .flatten()
            .map(|(key, _)| (key.clone(), json!("AgB...sealed")))
            .collect();
        let mut sealed = Resource::from_value(
            json!({
                "apiVersion": "bitnami.com/v1alpha1",
                "kind": "SealedSecret",
                "metadata": {
                    "name": secret.metadata.name,
                    "namespace": secret.metadata.namespace,
                },
                "spec": {"encryptedData": encrypted}
            }),
            ResourceOptions::default(),
        )?;
        sealed.set_annotation(ANNOTATION_MANAGED_SECRET, "true");
        Ok(sealed)
    }
}

/// Secret values from a fixed map
#[derive(Default)]
pub struct StaticSecrets(pub HashMap<String, String>);

impl SecretLookup for StaticSecrets {
    fn secret_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self.0.get(name).cloned())
    }
}

/// Write a source file below `root`, creating directories
pub fn write_source(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Cluster run context wired to fakes, writing files below `deploy`
pub fn file_context(
    source: &Path,
    deploy: &Path,
    iam: Arc<FakeIam>,
    cluster: Arc<FakeCluster>,
    skip_secrets: bool,
) -> RunContext {
    let registry = FunctionRegistry::standard()
        .with_secrets(Arc::new(StaticSecrets::default()), skip_secrets);
    let pipeline = RewritePipeline::new()
        .with_routine(IamAuthRewriter::new(iam, cluster).with_sealer(Arc::new(FakeSealer)))
        .with_routine(RestartMarker::default());

    RunContext {
        cluster: "test-cluster".to_string(),
        source_dir: source.to_path_buf(),
        discovery: DiscoveryOptions::default(),
        renderer: TemplateRenderer::new(&registry).unwrap(),
        pipeline,
        rewrite_options: RewriteOptions { skip_secrets },
        sink: ResourceSink::files(deploy),
    }
}

pub const ANNOTATED_DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: api
  namespace: shop
  annotations:
    iam.amazonaws.com/user: svc-acct
spec:
  selector:
    matchLabels:
      app: api
  template:
    metadata:
      labels:
        app: api
    spec:
      containers:
        - name: api
          image: registry.example.com/api:[[ "1.4.2" ]]
"#;
