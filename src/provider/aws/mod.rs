//! # AWS Providers
//!
//! - [`iam`]: access key lookup and rotation
//! - [`secrets_manager`]: secret values for template functions
//!
//! Both clients share one SDK config per cluster, loaded from the default
//! credential chain (environment, profile, IRSA web identity).

pub mod iam;
pub mod secrets_manager;

pub use iam::AwsIamBackend;
pub use secrets_manager::AwsSecretLookup;

use aws_config::SdkConfig;
use tracing::info;

/// Create AWS SDK config using the default credential chain
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    info!(region = region, "Loading AWS configuration from the default credential chain");
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}
