//! Restart marker: stamps the pod template of workloads flagged
//! `needs_restart` so the controller rolls them out again.

use crate::constants::ANNOTATION_RESTARTED_AT;
use crate::resource::{Document, KindSpecific, Resource};
use crate::rewrite::{RewriteOptions, RewriteRoutine};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RestartMarker {
    stamp: String,
}

impl Default for RestartMarker {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl RestartMarker {
    /// One timestamp is shared by every workload of the run
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            stamp: time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[async_trait]
impl RewriteRoutine for RestartMarker {
    fn name(&self) -> &'static str {
        "restart-marker"
    }

    async fn rewrite(&self, resource: Resource, _options: RewriteOptions) -> Result<Vec<Document>> {
        let options = resource.options();
        if !options.needs_restart || !matches!(resource.kind(), "Deployment" | "CronJob") {
            return Ok(vec![resource.into()]);
        }
        let Some(mut workload) = KindSpecific::from_resource(&resource)? else {
            return Ok(vec![resource.into()]);
        };

        if let Some(metadata) = workload.pod_template_metadata_mut() {
            metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(ANNOTATION_RESTARTED_AT.to_string(), self.stamp.clone());
            debug!(resource = %resource, restarted_at = %self.stamp, "Marked workload for restart");
        }
        Ok(vec![Document::typed(workload, options)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceOptions;
    use chrono::TimeZone;
    use serde_json::json;

    fn deployment(needs_restart: bool) -> Resource {
        Resource::from_value(
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "api"},
                "spec": {
                    "selector": {"matchLabels": {"app": "api"}},
                    "template": {"spec": {"containers": [{"name": "api", "image": "api:1"}]}}
                }
            }),
            ResourceOptions {
                validate: true,
                needs_restart,
            },
        )
        .unwrap()
    }

    fn marker() -> RestartMarker {
        RestartMarker::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_flagged_workload_is_stamped() {
        let out = marker()
            .rewrite(deployment(true), RewriteOptions::default())
            .await
            .unwrap();
        let resource = out.into_iter().next().unwrap().into_generic().unwrap();
        assert_eq!(
            resource.object()["spec"]["template"]["metadata"]["annotations"][ANNOTATION_RESTARTED_AT],
            json!("2024-05-01T12:00:00Z")
        );
        assert!(resource.options().needs_restart);
    }

    #[tokio::test]
    async fn test_unflagged_workload_is_untouched() {
        let original = deployment(false);
        let out = marker()
            .rewrite(original.clone(), RewriteOptions::default())
            .await
            .unwrap();
        assert_eq!(out, vec![Document::Generic(original)]);
    }
}
