//! Storage layer for Aegis.
//!
//! This crate defines the [`Manager`] trait, the resolver the HTTP surface
//! talks to. A manager loads identities, groups, and policies through
//! bounded read-through caches and persists writes transactionally,
//! invalidating the affected caches (including the compiled-policy cache)
//! on every write.
//!
//! Two implementations are provided:
//!
//! - [`PostgresManager`] — production backend over a `sqlx` connection pool
//! - [`MemoryManager`] — in-memory backend for tests and local development
//!
//! Backends are selected by DSN scheme through [`create_manager`].

mod error;
mod memory;
mod postgres;

use std::sync::Arc;

use url::Url;

use aegis_core::{Group, Identity, Policy, PolicyCompiler};

pub use error::StorageError;
pub use memory::MemoryManager;
pub use postgres::PostgresManager;

/// Synthetic policy id under which a principal's inline policy is persisted.
#[must_use]
pub fn embedded_policy_id(kind: &str, principal_id: &str) -> String {
    format!("__embedded_policy_{kind}_{principal_id}__")
}

/// Loads and saves principals and policies.
///
/// Reads are served through recency caches; any write invalidates the
/// caches of the written kind plus the compiled-policy cache, so a stale
/// compilation can never outlive the policy body it was built from.
#[async_trait::async_trait]
pub trait Manager: Send + Sync {
    /// Load an identity by id. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn get_identity(&self, id: &str) -> Result<Option<Arc<Identity>>, StorageError>;

    /// Load a group by id. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn get_group(&self, id: &str) -> Result<Option<Arc<Group>>, StorageError>;

    /// Load a policy by id. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn get_policy(&self, id: &str) -> Result<Option<Arc<Policy>>, StorageError>;

    /// The groups an identity belongs to, in backend order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn groups_for(&self, identity: &Identity) -> Result<Vec<Arc<Group>>, StorageError>;

    /// Upsert a policy.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn save_policy(&self, policy: &Policy) -> Result<(), StorageError>;

    /// Upsert an identity together with its inline policy and policy links.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn save_identity(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Upsert a group together with its inline policy, policy links, and
    /// member list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn save_group(&self, group: &Group) -> Result<(), StorageError>;
}

/// Create a manager for the given DSN.
///
/// Dispatches on the DSN scheme: `postgres`/`postgresql` connect to
/// PostgreSQL, `memory` builds an in-memory manager. The compiler handle is
/// shared with the caller so write invalidation reaches the same compile
/// cache the evaluation path uses.
///
/// # Errors
///
/// - [`StorageError::InvalidDsn`] when the DSN does not parse or lacks a
///   host
/// - [`StorageError::UnsupportedScheme`] when no backend exists for the
///   scheme
/// - [`StorageError::Database`] when the connection attempt fails
pub async fn create_manager(
    dsn: &str,
    compiler: PolicyCompiler,
) -> Result<Arc<dyn Manager>, StorageError> {
    let url = Url::parse(dsn).map_err(|e| StorageError::InvalidDsn {
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "postgres" | "postgresql" => {
            if url.host_str().is_none() {
                return Err(StorageError::InvalidDsn {
                    reason: "missing host".to_owned(),
                });
            }
            let manager = PostgresManager::connect(dsn, compiler).await?;
            Ok(Arc::new(manager))
        }
        "memory" => Ok(Arc::new(MemoryManager::new(compiler))),
        other => Err(StorageError::UnsupportedScheme {
            scheme: other.to_owned(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unparseable_dsn_is_invalid() {
        let err = create_manager("not a dsn", PolicyCompiler::new())
            .await
            .err()
            .expect("expected an error");
        assert!(matches!(err, StorageError::InvalidDsn { .. }));
    }

    #[tokio::test]
    async fn postgres_dsn_without_host_is_invalid() {
        let err = create_manager("postgres:///dbname", PolicyCompiler::new())
            .await
            .err()
            .expect("expected an error");
        assert!(matches!(err, StorageError::InvalidDsn { .. }));
    }

    #[tokio::test]
    async fn unknown_scheme_is_unsupported() {
        let err = create_manager("mysql://localhost/db", PolicyCompiler::new())
            .await
            .err()
            .expect("expected an error");
        assert!(matches!(
            err,
            StorageError::UnsupportedScheme { scheme } if scheme == "mysql"
        ));
    }

    #[tokio::test]
    async fn memory_scheme_builds_a_manager() {
        let manager = create_manager("memory://", PolicyCompiler::new())
            .await
            .unwrap();
        assert!(manager.get_identity("nobody").await.unwrap().is_none());
    }

    #[test]
    fn embedded_policy_ids_follow_the_naming_scheme() {
        assert_eq!(
            embedded_policy_id("identity", "urn:i:1"),
            "__embedded_policy_identity_urn:i:1__"
        );
        assert_eq!(
            embedded_policy_id("group", "Admins"),
            "__embedded_policy_group_Admins__"
        );
    }
}
