//! # AWS IAM Backend
//!
//! Reads and rotates IAM user access keys.

use crate::constants::MAX_ACCESS_KEYS_PER_USER;
use crate::provider::{AccessKey, AccessKeyMetadata, IamBackend};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::Client as IamClient;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// IAM backend implementation
pub struct AwsIamBackend {
    client: IamClient,
}

impl std::fmt::Debug for AwsIamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsIamBackend").finish_non_exhaustive()
    }
}

impl AwsIamBackend {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: IamClient::new(sdk_config),
        }
    }

    async fn list_keys(&self, user: &str) -> Result<Vec<AccessKeyMetadata>> {
        let response = self
            .client
            .list_access_keys()
            .user_name(user)
            .send()
            .await
            .with_context(|| format!("Failed to list access keys for IAM user {user}"))?;

        let keys = response
            .access_key_metadata()
            .iter()
            .filter_map(|key| {
                let access_key_id = key.access_key_id()?.to_string();
                let created = key.create_date()?;
                let created_at =
                    DateTime::<Utc>::from_timestamp(created.secs(), created.subsec_nanos())?;
                Some(AccessKeyMetadata {
                    access_key_id,
                    created_at,
                })
            })
            .collect();
        Ok(keys)
    }
}

/// Newest key by creation time
pub fn newest_key(keys: &[AccessKeyMetadata]) -> Option<&AccessKeyMetadata> {
    keys.iter().max_by_key(|key| key.created_at)
}

/// Key to delete before creating a new one, if the user is at the key limit
pub fn key_to_evict(keys: &[AccessKeyMetadata]) -> Option<&AccessKeyMetadata> {
    if keys.len() < MAX_ACCESS_KEYS_PER_USER {
        return None;
    }
    keys.iter().min_by_key(|key| key.created_at)
}

#[async_trait]
impl IamBackend for AwsIamBackend {
    async fn best_key_for_user(&self, user: &str) -> Result<Option<AccessKeyMetadata>> {
        let keys = self.list_keys(user).await?;
        debug!(user = user, keys = keys.len(), "Listed IAM access keys");
        Ok(newest_key(&keys).cloned())
    }

    async fn rotate_key(&self, user: &str) -> Result<AccessKey> {
        let keys = self.list_keys(user).await?;

        if let Some(oldest) = key_to_evict(&keys) {
            // Not atomic: if creation fails below, the user keeps one key fewer
            // until the next run.
            warn!(
                user = user,
                access_key_id = %oldest.access_key_id,
                "Deleting oldest IAM access key to stay within the key limit"
            );
            self.client
                .delete_access_key()
                .user_name(user)
                .access_key_id(&oldest.access_key_id)
                .send()
                .await
                .with_context(|| {
                    format!(
                        "Failed to delete access key {} of IAM user {user}",
                        oldest.access_key_id
                    )
                })?;
        }

        let response = self
            .client
            .create_access_key()
            .user_name(user)
            .send()
            .await
            .with_context(|| format!("Failed to create access key for IAM user {user}"))?;
        let created = response
            .access_key()
            .with_context(|| format!("IAM returned no access key for user {user}"))?;

        info!(
            user = user,
            access_key_id = created.access_key_id(),
            "Created IAM access key"
        );
        Ok(AccessKey {
            access_key_id: created.access_key_id().to_string(),
            secret_access_key: created.secret_access_key().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(id: &str, day: u32) -> AccessKeyMetadata {
        AccessKeyMetadata {
            access_key_id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_newest_key() {
        let keys = vec![key("old", 1), key("new", 20), key("mid", 10)];
        assert_eq!(newest_key(&keys).unwrap().access_key_id, "new");
        assert!(newest_key(&[]).is_none());
    }

    #[test]
    fn test_no_eviction_below_limit() {
        assert!(key_to_evict(&[]).is_none());
        assert!(key_to_evict(&[key("only", 1)]).is_none());
    }

    #[test]
    fn test_oldest_key_evicted_at_limit() {
        let keys = vec![key("new", 20), key("old", 1)];
        assert_eq!(key_to_evict(&keys).unwrap().access_key_id, "old");
    }
}
