//! # Typed Resources
//!
//! Explicit mapping between generic [`Resource`] documents and the
//! `k8s-openapi` structs for the kinds rewrite routines edit in place.

use super::{Resource, ResourceOptions};
use crate::error::PipelineError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{PodSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

/// A resource decoded into its kind-specific form
#[derive(Debug, Clone, PartialEq)]
pub enum KindSpecific {
    Deployment(Box<Deployment>),
    CronJob(Box<CronJob>),
    Secret(Box<Secret>),
}

impl KindSpecific {
    /// Decode a generic resource if its group/version/kind has a typed form.
    ///
    /// Returns `Ok(None)` for kinds without one.
    pub fn from_resource(resource: &Resource) -> Result<Option<Self>, PipelineError> {
        let gvk = resource.gvk();
        let typed = match (gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()) {
            ("apps", "v1", "Deployment") => Self::Deployment(Box::new(decode(resource)?)),
            ("batch", "v1", "CronJob") => Self::CronJob(Box::new(decode(resource)?)),
            ("", "v1", "Secret") => Self::Secret(Box::new(decode(resource)?)),
            _ => return Ok(None),
        };
        Ok(Some(typed))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            KindSpecific::Deployment(_) => "Deployment",
            KindSpecific::CronJob(_) => "CronJob",
            KindSpecific::Secret(_) => "Secret",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            KindSpecific::Deployment(d) => &d.metadata,
            KindSpecific::CronJob(c) => &c.metadata,
            KindSpecific::Secret(s) => &s.metadata,
        }
    }

    /// Pod spec of a workload's pod template
    pub fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        match self {
            KindSpecific::Deployment(d) => d.spec.as_mut()?.template.spec.as_mut(),
            KindSpecific::CronJob(c) => c
                .spec
                .as_mut()?
                .job_template
                .spec
                .as_mut()?
                .template
                .spec
                .as_mut(),
            KindSpecific::Secret(_) => None,
        }
    }

    /// Metadata of a workload's pod template, created if missing
    pub fn pod_template_metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
        let template = match self {
            KindSpecific::Deployment(d) => &mut d.spec.as_mut()?.template,
            KindSpecific::CronJob(c) => {
                &mut c.spec.as_mut()?.job_template.spec.as_mut()?.template
            }
            KindSpecific::Secret(_) => return None,
        };
        Some(template.metadata.get_or_insert_with(ObjectMeta::default))
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            KindSpecific::Deployment(d) => serde_json::to_value(d.as_ref()),
            KindSpecific::CronJob(c) => serde_json::to_value(c.as_ref()),
            KindSpecific::Secret(s) => serde_json::to_value(s.as_ref()),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(resource: &Resource) -> Result<T, PipelineError> {
    serde_json::from_value(resource.to_value()).map_err(|e| PipelineError::Conversion {
        kind: resource.kind().to_string(),
        name: resource.name().to_string(),
        message: e.to_string(),
    })
}

/// A document in the working set of the rewrite pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Generic(Resource),
    Typed {
        object: KindSpecific,
        options: ResourceOptions,
    },
}

impl Document {
    pub fn typed(object: KindSpecific, options: ResourceOptions) -> Self {
        Document::Typed { object, options }
    }

    pub fn options(&self) -> ResourceOptions {
        match self {
            Document::Generic(resource) => resource.options(),
            Document::Typed { options, .. } => *options,
        }
    }

    /// Convert back to the canonical generic form.
    ///
    /// A typed object without a name cannot be addressed downstream and is a
    /// contract violation, reported as [`PipelineError::LostName`].
    pub fn into_generic(self) -> Result<Resource, PipelineError> {
        match self {
            Document::Generic(resource) => Ok(resource),
            Document::Typed { object, options } => {
                let named = object
                    .metadata()
                    .name
                    .as_deref()
                    .is_some_and(|n| !n.is_empty());
                if !named {
                    return Err(PipelineError::LostName {
                        kind: object.kind().to_string(),
                    });
                }
                let value = object.to_value().map_err(|e| PipelineError::Conversion {
                    kind: object.kind().to_string(),
                    name: object.metadata().name.clone().unwrap_or_default(),
                    message: e.to_string(),
                })?;
                Resource::from_value(value, options)
            }
        }
    }
}

impl From<Resource> for Document {
    fn from(resource: Resource) -> Self {
        Document::Generic(resource)
    }
}
