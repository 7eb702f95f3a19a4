//! # Kubeseal Sealer
//!
//! Seals secrets with the `kubeseal` binary so that only the in-cluster
//! sealed-secrets controller can decrypt them. The plain secret is written to
//! kubeseal's stdin and the `SealedSecret` is read back from stdout.

use crate::constants::ANNOTATION_MANAGED_SECRET;
use crate::provider::Sealer;
use crate::resource::{Resource, ResourceOptions};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct KubesealSealer {
    binary: PathBuf,
    controller_name: String,
    controller_namespace: String,
    context: Option<String>,
}

impl KubesealSealer {
    /// Resolve the kubeseal binary from `PATH` (or an explicit path)
    #[allow(clippy::missing_errors_doc, reason = "Fails when kubeseal is not installed")]
    pub fn new(
        binary: &str,
        controller_name: impl Into<String>,
        controller_namespace: impl Into<String>,
        context: Option<String>,
    ) -> Result<Self> {
        let binary = which::which(binary)
            .with_context(|| format!("kubeseal binary '{binary}' not found in PATH"))?;
        debug!("Using kubeseal binary at: {:?}", binary);
        Ok(Self {
            binary,
            controller_name: controller_name.into(),
            controller_namespace: controller_namespace.into(),
            context,
        })
    }
}

#[async_trait]
impl Sealer for KubesealSealer {
    async fn seal(&self, secret: &Secret) -> Result<Resource> {
        let plain = serde_yaml::to_string(secret).context("Failed to serialize secret")?;

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("--format")
            .arg("yaml")
            .arg("--controller-name")
            .arg(&self.controller_name)
            .arg("--controller-namespace")
            .arg(&self.controller_namespace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }

        let mut child = cmd.spawn().context("Failed to spawn kubeseal")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(plain.as_bytes())
                .await
                .context("Failed to write secret to kubeseal stdin")?;
            stdin
                .shutdown()
                .await
                .context("Failed to close kubeseal stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for kubeseal")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("kubeseal failed with exit code: {:?}", output.status.code());
            return Err(anyhow!("kubeseal failed: {}", stderr.trim()));
        }

        let sealed = String::from_utf8(output.stdout).context("kubeseal output is not UTF-8")?;
        let mut resource = Resource::from_yaml(&sealed, ResourceOptions::default())
            .context("Failed to parse kubeseal output")?;
        resource.set_annotation(ANNOTATION_MANAGED_SECRET, "true");
        Ok(resource)
    }
}
