//! # IAM Auth Rewriter
//!
//! Wires AWS IAM user credentials into annotated workloads.
//!
//! A `Deployment` or `CronJob` annotated with `iam.amazonaws.com/user` gets:
//!
//! - a managed `Secret` holding an access key for that user, issued (and the
//!   oldest key retired) whenever the current key is missing, older than the
//!   maximum key age, or different from what the cluster secret holds
//! - `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` env references to that
//!   secret on every container and init container
//! - `needs_restart` when a new key was issued
//!
//! Rotation can be switched off per workload with
//! `iam.amazonaws.com/rotation` set to anything but `enabled`.
//!
//! Decisions are remembered for the lifetime of the rewriter. Workloads sharing
//! a managed secret get one secret per run, and a user is issued at most one
//! key per run.
//!
//! Env references are appended, not merged. Running the routine twice over the
//! same resource duplicates them, so it must appear once per pipeline.

use crate::constants::{
    ANNOTATION_IAM_USER, ANNOTATION_MANAGED_SECRET, ANNOTATION_ROTATION, ANNOTATION_SECRET_NAME,
    DEFAULT_MAX_KEY_AGE_DAYS, ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY, ROTATION_ENABLED,
};
use crate::provider::{AccessKey, ClusterBackend, IamBackend, Sealer};
use crate::resource::{Document, KindSpecific, Resource, ResourceOptions};
use crate::rewrite::{RewriteOptions, RewriteRoutine};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::{Container, EnvVar, EnvVarSource, Secret, SecretKeySelector};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Why a new access key is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The user has no access key
    NoKey,
    /// The newest key is older than the maximum key age
    Expired { age_days: i64 },
    /// The cluster secret is missing or holds a different key id
    Mismatch,
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationReason::NoKey => write!(f, "no access key"),
            RotationReason::Expired { age_days } => write!(f, "key is {age_days} days old"),
            RotationReason::Mismatch => write!(f, "stored key id does not match"),
        }
    }
}

/// Keys issued and managed secrets emitted during one run
#[derive(Default)]
struct RunLedger {
    issued: HashMap<String, AccessKey>,
    /// `(namespace, secret name)` -> whether the secret carries a new key
    secrets: HashMap<(String, String), bool>,
}

/// Rewrite routine issuing IAM access keys for annotated workloads.
///
/// Build one per cluster run.
pub struct IamAuthRewriter {
    iam: Arc<dyn IamBackend>,
    cluster: Arc<dyn ClusterBackend>,
    sealer: Option<Arc<dyn Sealer>>,
    max_key_age: Duration,
    ledger: AsyncMutex<RunLedger>,
}

impl fmt::Debug for IamAuthRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamAuthRewriter")
            .field("sealed", &self.sealer.is_some())
            .field("max_key_age", &self.max_key_age)
            .finish_non_exhaustive()
    }
}

impl IamAuthRewriter {
    pub fn new(iam: Arc<dyn IamBackend>, cluster: Arc<dyn ClusterBackend>) -> Self {
        Self {
            iam,
            cluster,
            sealer: None,
            max_key_age: Duration::days(DEFAULT_MAX_KEY_AGE_DAYS),
            ledger: AsyncMutex::new(RunLedger::default()),
        }
    }

    /// Seal generated secrets before they leave the pipeline
    #[must_use]
    pub fn with_sealer(mut self, sealer: Arc<dyn Sealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    #[must_use]
    pub fn with_max_key_age(mut self, max_key_age: Duration) -> Self {
        self.max_key_age = max_key_age;
        self
    }

    /// Decide whether `user` needs a new key. `None` keeps the current one.
    async fn rotation_reason(
        &self,
        user: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<RotationReason>> {
        let Some(key) = self
            .iam
            .best_key_for_user(user)
            .await
            .with_context(|| format!("Failed to look up access keys of IAM user {user}"))?
        else {
            return Ok(Some(RotationReason::NoKey));
        };

        let age = Utc::now() - key.created_at;
        if age > self.max_key_age {
            return Ok(Some(RotationReason::Expired {
                age_days: age.num_days(),
            }));
        }

        let stored = self
            .cluster
            .managed_secret_key_id(namespace, secret_name)
            .await
            .with_context(|| format!("Failed to read managed secret {namespace}/{secret_name}"))?;
        if stored.as_deref() == Some(key.access_key_id.as_str()) {
            debug!(user = user, access_key_id = %key.access_key_id, "Access key is current");
            Ok(None)
        } else {
            Ok(Some(RotationReason::Mismatch))
        }
    }

    async fn secret_document(
        &self,
        key: &AccessKey,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Document> {
        let secret = managed_secret(key, namespace, secret_name);
        match &self.sealer {
            Some(sealer) => {
                let sealed = sealer
                    .seal(&secret)
                    .await
                    .with_context(|| format!("Failed to seal secret {namespace}/{secret_name}"))?;
                Ok(Document::Generic(sealed))
            }
            None => Ok(Document::typed(
                KindSpecific::Secret(Box::new(secret)),
                ResourceOptions::default(),
            )),
        }
    }
}

#[async_trait]
impl RewriteRoutine for IamAuthRewriter {
    fn name(&self) -> &'static str {
        "iam-auth"
    }

    async fn rewrite(&self, resource: Resource, options: RewriteOptions) -> Result<Vec<Document>> {
        if !matches!(resource.kind(), "Deployment" | "CronJob") {
            return Ok(vec![resource.into()]);
        }
        let Some(user) = resource
            .annotation(ANNOTATION_IAM_USER)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
        else {
            return Ok(vec![resource.into()]);
        };
        if resource
            .annotation(ANNOTATION_ROTATION)
            .is_some_and(|r| r != ROTATION_ENABLED)
        {
            debug!(resource = %resource, "IAM rotation disabled by annotation");
            return Ok(vec![resource.into()]);
        }
        let Some(mut workload) = KindSpecific::from_resource(&resource)? else {
            return Ok(vec![resource.into()]);
        };

        let secret_name = resource
            .annotation(ANNOTATION_SECRET_NAME)
            .filter(|n| !n.is_empty())
            .unwrap_or(user.as_str())
            .to_string();
        let namespace = resource.namespace().to_string();
        let mut workload_options = resource.options();

        let mut outputs = Vec::with_capacity(2);
        if options.skip_secrets {
            debug!(resource = %resource, "Secret generation suppressed");
        } else {
            let mut ledger = self.ledger.lock().await;
            let slot = (namespace.clone(), secret_name.clone());
            if let Some(&rotated) = ledger.secrets.get(&slot) {
                debug!(resource = %resource, secret = %secret_name, "Managed secret already emitted in this run");
                workload_options.needs_restart |= rotated;
            } else {
                let key = match ledger.issued.get(&user).cloned() {
                    Some(key) => Some(key),
                    None => match self.rotation_reason(&user, &namespace, &secret_name).await? {
                        Some(reason) => {
                            info!(
                                user = %user,
                                secret = %secret_name,
                                namespace = %namespace,
                                reason = %reason,
                                "Rotating IAM access key"
                            );
                            let key = self
                                .iam
                                .rotate_key(&user)
                                .await
                                .with_context(|| format!("Failed to rotate access key of IAM user {user}"))?;
                            ledger.issued.insert(user.clone(), key.clone());
                            Some(key)
                        }
                        None => None,
                    },
                };
                if let Some(key) = &key {
                    outputs.push(self.secret_document(key, &namespace, &secret_name).await?);
                    workload_options.needs_restart = true;
                }
                ledger.secrets.insert(slot, key.is_some());
            }
        }

        if let Some(pod) = workload.pod_spec_mut() {
            for container in pod.containers.iter_mut() {
                append_credentials(container, &secret_name);
            }
            for container in pod.init_containers.iter_mut().flatten() {
                append_credentials(container, &secret_name);
            }
        }

        outputs.push(Document::typed(workload, workload_options));
        Ok(outputs)
    }
}

/// Plain secret holding `key`, marked as managed
fn managed_secret(key: &AccessKey, namespace: &str, name: &str) -> Secret {
    let data = BTreeMap::from([
        (
            ENV_ACCESS_KEY_ID.to_string(),
            ByteString(key.access_key_id.as_bytes().to_vec()),
        ),
        (
            ENV_SECRET_ACCESS_KEY.to_string(),
            ByteString(key.secret_access_key.as_bytes().to_vec()),
        ),
    ]);
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                ANNOTATION_MANAGED_SECRET.to_string(),
                "true".to_string(),
            )])),
            ..ObjectMeta::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    }
}

fn append_credentials(container: &mut Container, secret_name: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    for key in [ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY] {
        env.push(EnvVar {
            name: key.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret_name.to_string(),
                    key: key.to_string(),
                    ..SecretKeySelector::default()
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        });
    }
}
