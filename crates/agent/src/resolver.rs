//! Entity resolution
//!
//! Natural-language names (or UUIDs) to canonical entity ids. Strict
//! exact-name matching for tasks, teams and projects; users get a fuzzy
//! fallback chain ending at the local part of their email. Upstream read
//! failures resolve to "not found" rather than erroring.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use task_agent_config::constants::resolver as tuning;
use task_agent_core::EntityKind;
use task_agent_entities::EntityGateway;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern")
});

/// Name/id resolver over the entity services
pub struct EntityResolver {
    gateway: EntityGateway,
}

impl EntityResolver {
    pub fn new(gateway: EntityGateway) -> Self {
        Self { gateway }
    }

    /// Resolve a name or UUID for the given kind.
    pub async fn resolve(&self, kind: EntityKind, name_or_id: &str) -> Option<String> {
        let needle = name_or_id.trim();
        if needle.is_empty() {
            return None;
        }

        if UUID_RE.is_match(needle) {
            return match self.gateway.exists(kind, needle).await {
                Ok(true) => Some(needle.to_string()),
                _ => None,
            };
        }

        match kind {
            EntityKind::User => self.resolve_user_fuzzy(needle).await,
            _ => self.resolve_exact(kind, needle).await,
        }
    }

    /// Resolve several references in parallel; keys are the inputs.
    pub async fn resolve_multiple(
        &self,
        refs: &[(EntityKind, String)],
    ) -> HashMap<String, Option<String>> {
        let resolutions =
            futures::future::join_all(refs.iter().map(|(kind, name)| async move {
                (name.clone(), self.resolve(*kind, name).await)
            }))
            .await;
        resolutions.into_iter().collect()
    }

    /// Exact case-insensitive match on the canonical name field.
    async fn resolve_exact(&self, kind: EntityKind, name: &str) -> Option<String> {
        let names = self
            .gateway
            .list_names(kind, 1, tuning::LIST_PAGE_SIZE)
            .await
            .map_err(|e| tracing::debug!(kind = %kind, error = %e, "listing failed during resolution"))
            .ok()?;

        let folded = name.to_lowercase();
        names
            .into_iter()
            .find(|(_, candidate)| candidate.to_lowercase() == folded)
            .map(|(id, _)| id)
    }

    /// User resolution with fallbacks: exact name, name prefix, name
    /// substring, then email local-part substring.
    async fn resolve_user_fuzzy(&self, name: &str) -> Option<String> {
        let page = self
            .gateway
            .users
            .find_all(1, tuning::LIST_PAGE_SIZE, None)
            .await
            .map_err(|e| tracing::debug!(error = %e, "user listing failed during resolution"))
            .ok()?;

        let folded = name.to_lowercase();
        let users = page.data;

        if let Some(user) = users.iter().find(|u| u.name.to_lowercase() == folded) {
            return Some(user.id.clone());
        }
        if let Some(user) = users
            .iter()
            .find(|u| u.name.to_lowercase().starts_with(&folded))
        {
            return Some(user.id.clone());
        }
        if let Some(user) = users
            .iter()
            .find(|u| u.name.to_lowercase().contains(&folded))
        {
            return Some(user.id.clone());
        }
        users
            .iter()
            .find(|u| {
                u.email
                    .split('@')
                    .next()
                    .is_some_and(|local| local.to_lowercase().contains(&folded))
            })
            .map(|u| u.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use task_agent_core::{User, UserRole};
    use task_agent_entities::InMemoryEntityStore;

    fn seeded_gateway() -> EntityGateway {
        let store = Arc::new(InMemoryEntityStore::new());
        let now = Utc::now();
        store.insert_user(User {
            id: "U1".into(),
            name: "Youssef Mohamed".into(),
            email: "ymohamed@example.com".into(),
            role: UserRole::Member,
            team_id: None,
            created_at: now,
            updated_at: now,
        });
        store.insert_user(User {
            id: "U2".into(),
            name: "Sara Ali".into(),
            email: "sara.ali@example.com".into(),
            role: UserRole::Admin,
            team_id: None,
            created_at: now,
            updated_at: now,
        });
        EntityGateway::in_memory(store)
    }

    #[tokio::test]
    async fn test_exact_match_case_insensitive() {
        let resolver = EntityResolver::new(seeded_gateway());
        assert_eq!(
            resolver.resolve(EntityKind::User, "youssef mohamed").await,
            Some("U1".to_string())
        );
    }

    #[tokio::test]
    async fn test_fuzzy_chain() {
        let resolver = EntityResolver::new(seeded_gateway());
        // Prefix
        assert_eq!(
            resolver.resolve(EntityKind::User, "Youssef").await,
            Some("U1".to_string())
        );
        // Substring
        assert_eq!(
            resolver.resolve(EntityKind::User, "mohamed").await,
            Some("U1".to_string())
        );
        // Email local part
        assert_eq!(
            resolver.resolve(EntityKind::User, "ymoh").await,
            Some("U1".to_string())
        );
        // No match
        assert_eq!(resolver.resolve(EntityKind::User, "nobody").await, None);
    }

    #[tokio::test]
    async fn test_uuid_requires_existence() {
        let resolver = EntityResolver::new(seeded_gateway());
        let missing = "123e4567-e89b-12d3-a456-426614174000";
        assert_eq!(resolver.resolve(EntityKind::User, missing).await, None);
    }

    #[tokio::test]
    async fn test_resolve_multiple() {
        let resolver = EntityResolver::new(seeded_gateway());
        let refs = vec![
            (EntityKind::User, "Sara".to_string()),
            (EntityKind::User, "ghost".to_string()),
        ];
        let map = resolver.resolve_multiple(&refs).await;
        assert_eq!(map["Sara"], Some("U2".to_string()));
        assert_eq!(map["ghost"], None);
    }
}
