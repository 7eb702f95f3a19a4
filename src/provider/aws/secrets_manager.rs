//! # AWS Secrets Manager Lookup
//!
//! Backs the `secret` template function.

use crate::provider::SecretLookup;
use anyhow::{anyhow, Result};
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use tokio::runtime::Handle;
use tracing::debug;

/// Secrets Manager reader
pub struct AwsSecretLookup {
    client: SecretsManagerClient,
}

impl std::fmt::Debug for AwsSecretLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretLookup").finish_non_exhaustive()
    }
}

impl AwsSecretLookup {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: SecretsManagerClient::new(sdk_config),
        }
    }

    /// Get the latest secret value
    pub async fn get_secret_value(&self, secret_name: &str) -> Result<Option<String>> {
        match self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
        {
            Ok(response) => {
                let value = if let Some(s) = response.secret_string() {
                    Some(s.to_string())
                } else {
                    response
                        .secret_binary()
                        .map(|blob| String::from_utf8_lossy(blob.as_ref()).to_string())
                };

                match value {
                    Some(v) => Ok(Some(v)),
                    None => Err(anyhow!("Secret {secret_name} has no string or binary value")),
                }
            }
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());
                if not_found {
                    debug!(secret = secret_name, "Secret not found in Secrets Manager");
                    Ok(None)
                } else {
                    Err(anyhow!("Failed to get AWS secret {secret_name}: {e}"))
                }
            }
        }
    }
}

impl SecretLookup for AwsSecretLookup {
    fn secret_value(&self, name: &str) -> Result<Option<String>> {
        // Template rendering is synchronous; park this worker while the request runs
        tokio::task::block_in_place(|| Handle::current().block_on(self.get_secret_value(name)))
    }
}
