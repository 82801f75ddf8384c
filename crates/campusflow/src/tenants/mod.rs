mod domain;

pub use domain::{Career, InstitutionKind, InstitutionProfile, TenantConfig};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Read-only port supplying per-institution configuration documents.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn institution(&self, institution_id: &str) -> Result<Option<TenantConfig>, TenantError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("tenant directory unavailable: {0}")]
    Unavailable(String),
}

/// Directory backed by a plain map, fed at startup (fixtures, demo seeds,
/// tests).
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    institutions: RwLock<HashMap<String, TenantConfig>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, config: TenantConfig) {
        let mut institutions = self.institutions.write().await;
        institutions.insert(config.institution_id.clone(), config);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn institution(&self, institution_id: &str) -> Result<Option<TenantConfig>, TenantError> {
        let institutions = self.institutions.read().await;
        Ok(institutions.get(institution_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tenant() -> TenantConfig {
        TenantConfig {
            institution_id: "uni-x".to_string(),
            profile: InstitutionProfile {
                name: "Universidad X".to_string(),
                short_name: Some("UX".to_string()),
                kind: Some(InstitutionKind::Public),
                city: Some("Cordoba".to_string()),
                province: None,
            },
            careers: vec![
                Career {
                    career_id: "cs101".to_string(),
                    name: "Computer Science".to_string(),
                    code: Some("CS".to_string()),
                    faculty: None,
                    category: None,
                    is_active: true,
                },
                Career {
                    career_id: "hist-old".to_string(),
                    name: "History (legacy plan)".to_string(),
                    code: None,
                    faculty: None,
                    category: None,
                    is_active: false,
                },
            ],
            workflow: None,
        }
    }

    #[tokio::test]
    async fn registered_institutions_are_served_back() {
        let directory = InMemoryTenantDirectory::new();
        directory.register(sample_tenant()).await;

        let found = directory
            .institution("uni-x")
            .await
            .expect("directory responds")
            .expect("institution registered");
        assert_eq!(found.profile.name, "Universidad X");
        assert!(directory
            .institution("uni-zz")
            .await
            .expect("directory responds")
            .is_none());
    }

    #[tokio::test]
    async fn inactive_careers_are_invisible() {
        let directory = InMemoryTenantDirectory::new();
        directory.register(sample_tenant()).await;
        let tenant = directory
            .institution("uni-x")
            .await
            .expect("directory responds")
            .expect("institution registered");

        assert!(tenant.career("cs101").is_some());
        assert!(tenant.career("hist-old").is_none());
        assert!(tenant.career("cs999").is_none());
    }
}
