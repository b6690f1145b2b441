//! PostgreSQL manager.
//!
//! Persists the six-table relational layout (`policy`, `identity`,
//! `"group"`, and the three link tables) and serves reads through bounded
//! recency caches. Action and resource lists are stored as JSON-encoded
//! string arrays in `TEXT` columns, never as native SQL arrays, to keep the
//! schema portable.
//!
//! Uses `sqlx` with the Tokio runtime; the schema is auto-created at
//! connect time.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info};

use aegis_core::cache::RecencyMap;
use aegis_core::{
    Group, Identity, InlinePolicy, Policy, PolicyCompiler, PolicyEffect, PolicyVersion, Subject,
};

use crate::error::StorageError;
use crate::{embedded_policy_id, Manager};

const IDENTITY_CACHE_CAPACITY: usize = 128;
const GROUP_CACHE_CAPACITY: usize = 128;
const GROUPS_PER_IDENTITY_CACHE_CAPACITY: usize = 128;
const POLICY_CACHE_CAPACITY: usize = 1024;

/// The manager's read-through caches. Guarded as one unit by a single
/// mutex: loads populate several of them in one pass and writes must
/// invalidate atomically with respect to concurrent reads.
struct Caches {
    identities: RecencyMap<String, Arc<Identity>>,
    groups: RecencyMap<String, Arc<Group>>,
    groups_per_identity: RecencyMap<String, Vec<String>>,
    policies: RecencyMap<String, Arc<Policy>>,
}

impl Caches {
    fn new() -> Self {
        Self {
            identities: RecencyMap::new(IDENTITY_CACHE_CAPACITY),
            groups: RecencyMap::new(GROUP_CACHE_CAPACITY),
            groups_per_identity: RecencyMap::new(GROUPS_PER_IDENTITY_CACHE_CAPACITY),
            policies: RecencyMap::new(POLICY_CACHE_CAPACITY),
        }
    }
}

/// A [`Manager`] backed by PostgreSQL.
pub struct PostgresManager {
    pool: PgPool,
    caches: Mutex<Caches>,
    compiler: PolicyCompiler,
}

impl std::fmt::Debug for PostgresManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresManager").finish_non_exhaustive()
    }
}

impl PostgresManager {
    /// Connect to PostgreSQL and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the connection or migration
    /// fails.
    pub async fn connect(dsn: &str, compiler: PolicyCompiler) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(dsn).await?;

        migrate(&pool).await?;
        info!("postgres storage ready");

        Ok(Self {
            pool,
            caches: Mutex::new(Caches::new()),
            compiler,
        })
    }

    async fn load_policy(
        &self,
        caches: &mut Caches,
        id: &str,
    ) -> Result<Option<Arc<Policy>>, StorageError> {
        if let Some(policy) = caches.policies.get(id) {
            return Ok(Some(Arc::clone(policy)));
        }

        let row: Option<(String, i64, bool, String, String)> = sqlx::query_as(
            "SELECT id, version, effect, actions, resources FROM policy WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, version, effect, actions, resources)) = row else {
            return Ok(None);
        };

        let policy = Arc::new(decode_policy_row(id, version, effect, &actions, &resources)?);
        caches
            .policies
            .insert(policy.id().to_owned(), Arc::clone(&policy));

        Ok(Some(policy))
    }

    async fn load_identity(
        &self,
        caches: &mut Caches,
        id: &str,
    ) -> Result<Option<Arc<Identity>>, StorageError> {
        if let Some(identity) = caches.identities.get(id) {
            return Ok(Some(Arc::clone(identity)));
        }

        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT id, policy_id FROM identity WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, policy_id)) = row else {
            return Ok(None);
        };

        let inline = self.load_inline_policy(caches, policy_id).await?;
        let mut identity = Identity::new(id, inline);

        let linked: Vec<(String,)> =
            sqlx::query_as("SELECT policy_id FROM identity_policy WHERE identity_id = $1")
                .bind(identity.id())
                .fetch_all(&self.pool)
                .await?;
        for (policy_id,) in linked {
            if let Some(policy) = self.load_policy(caches, &policy_id).await? {
                identity.add_policy(policy);
            }
        }

        let identity = Arc::new(identity);
        caches
            .identities
            .insert(identity.id().to_owned(), Arc::clone(&identity));

        Ok(Some(identity))
    }

    async fn load_group(
        &self,
        caches: &mut Caches,
        id: &str,
    ) -> Result<Option<Arc<Group>>, StorageError> {
        if let Some(group) = caches.groups.get(id) {
            return Ok(Some(Arc::clone(group)));
        }

        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT id, policy_id FROM \"group\" WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((name, policy_id)) = row else {
            return Ok(None);
        };

        let inline = self.load_inline_policy(caches, policy_id).await?;
        let mut group = Group::new(name, inline);

        let linked: Vec<(String,)> =
            sqlx::query_as("SELECT policy_id FROM group_policy WHERE group_id = $1")
                .bind(group.name())
                .fetch_all(&self.pool)
                .await?;
        for (policy_id,) in linked {
            if let Some(policy) = self.load_policy(caches, &policy_id).await? {
                group.add_policy(policy);
            }
        }

        // Membership rows hold weak references by id; the materialized
        // member list is rebuilt here on every load.
        let members: Vec<(String,)> =
            sqlx::query_as("SELECT identity_id FROM group_identity WHERE group_id = $1")
                .bind(group.name())
                .fetch_all(&self.pool)
                .await?;
        for (identity_id,) in members {
            if let Some(identity) = self.load_identity(caches, &identity_id).await? {
                group.add_identity(identity);
            }
        }

        let group = Arc::new(group);
        caches.groups.insert(id.to_owned(), Arc::clone(&group));

        Ok(Some(group))
    }

    /// Resolve a principal's `policy_id` FK into its inline policy slot.
    async fn load_inline_policy(
        &self,
        caches: &mut Caches,
        policy_id: Option<String>,
    ) -> Result<InlinePolicy, StorageError> {
        match policy_id {
            Some(id) => Ok(self
                .load_policy(caches, &id)
                .await?
                .map(|p| InlinePolicy::Policy((*p).clone()))
                .unwrap_or_default()),
            None => Ok(InlinePolicy::None),
        }
    }

    /// Upsert the synthetic inline-policy row and the principal row in an
    /// FK-safe order, then replace the principal's link rows.
    async fn save_principal(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: PrincipalTable,
        principal_id: &str,
        inline: &InlinePolicy,
        linked: &[Arc<Policy>],
    ) -> Result<(), StorageError> {
        let synthetic_id = embedded_policy_id(table.kind(), principal_id);

        match inline.as_policy() {
            Some(policy) => {
                // The synthetic row must exist before the principal row
                // can reference it.
                upsert_policy(&mut **tx, policy, &synthetic_id).await?;
                sqlx::query(table.upsert_sql())
                    .bind(principal_id)
                    .bind(&synthetic_id)
                    .execute(&mut **tx)
                    .await?;
            }
            None => {
                // Clear the FK before deleting the synthetic row it may
                // still point at.
                sqlx::query(table.upsert_sql())
                    .bind(principal_id)
                    .bind(None::<&str>)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("DELETE FROM policy WHERE id = $1")
                    .bind(&synthetic_id)
                    .execute(&mut **tx)
                    .await?;
            }
        }

        sqlx::query(table.clear_links_sql())
            .bind(principal_id)
            .execute(&mut **tx)
            .await?;
        for policy in linked {
            sqlx::query(table.insert_link_sql())
                .bind(principal_id)
                .bind(policy.id())
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Manager for PostgresManager {
    async fn get_identity(&self, id: &str) -> Result<Option<Arc<Identity>>, StorageError> {
        let mut caches = self.caches.lock().await;
        self.load_identity(&mut caches, id).await
    }

    async fn get_group(&self, id: &str) -> Result<Option<Arc<Group>>, StorageError> {
        let mut caches = self.caches.lock().await;
        self.load_group(&mut caches, id).await
    }

    async fn get_policy(&self, id: &str) -> Result<Option<Arc<Policy>>, StorageError> {
        let mut caches = self.caches.lock().await;
        self.load_policy(&mut caches, id).await
    }

    async fn groups_for(&self, identity: &Identity) -> Result<Vec<Arc<Group>>, StorageError> {
        let mut caches = self.caches.lock().await;

        let group_ids = if let Some(ids) = caches.groups_per_identity.get(identity.id()) {
            ids.clone()
        } else {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT group_id FROM group_identity WHERE identity_id = $1",
            )
            .bind(identity.id())
            .fetch_all(&self.pool)
            .await?;

            let ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
            caches
                .groups_per_identity
                .insert(identity.id().to_owned(), ids.clone());
            ids
        };

        let mut groups = Vec::with_capacity(group_ids.len());
        for id in &group_ids {
            if let Some(group) = self.load_group(&mut caches, id).await? {
                groups.push(group);
            }
        }

        Ok(groups)
    }

    async fn save_policy(&self, policy: &Policy) -> Result<(), StorageError> {
        let mut caches = self.caches.lock().await;

        upsert_policy(&self.pool, policy, policy.id()).await?;

        caches.policies.clear();
        self.compiler.clear_cache();
        debug!(id = %policy.id(), "policy saved");

        Ok(())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        let mut caches = self.caches.lock().await;

        let mut tx = self.pool.begin().await?;
        self.save_principal(
            &mut tx,
            PrincipalTable::Identity,
            identity.id(),
            identity.inline_policy(),
            identity.linked_policies(),
        )
        .await?;
        tx.commit().await?;

        caches.identities.clear();
        self.compiler.clear_cache();
        debug!(id = %identity.id(), "identity saved");

        Ok(())
    }

    async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        let mut caches = self.caches.lock().await;

        let mut tx = self.pool.begin().await?;
        self.save_principal(
            &mut tx,
            PrincipalTable::Group,
            group.name(),
            group.inline_policy(),
            group.linked_policies(),
        )
        .await?;

        // Replace the membership rows with the group's current member set.
        sqlx::query("DELETE FROM group_identity WHERE group_id = $1")
            .bind(group.name())
            .execute(&mut *tx)
            .await?;
        for member in group.members() {
            sqlx::query("INSERT INTO group_identity (group_id, identity_id) VALUES ($1, $2)")
                .bind(group.name())
                .bind(member.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        caches.groups.clear();
        caches.groups_per_identity.clear();
        self.compiler.clear_cache();
        debug!(id = %group.name(), "group saved");

        Ok(())
    }
}

/// The two principal tables share their save shape; this picks the SQL.
#[derive(Clone, Copy)]
enum PrincipalTable {
    Identity,
    Group,
}

impl PrincipalTable {
    fn kind(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Group => "group",
        }
    }

    fn upsert_sql(self) -> &'static str {
        match self {
            Self::Identity => {
                "INSERT INTO identity (id, policy_id) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET policy_id = EXCLUDED.policy_id"
            }
            Self::Group => {
                "INSERT INTO \"group\" (id, policy_id) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET policy_id = EXCLUDED.policy_id"
            }
        }
    }

    fn clear_links_sql(self) -> &'static str {
        match self {
            Self::Identity => "DELETE FROM identity_policy WHERE identity_id = $1",
            Self::Group => "DELETE FROM group_policy WHERE group_id = $1",
        }
    }

    fn insert_link_sql(self) -> &'static str {
        match self {
            Self::Identity => {
                "INSERT INTO identity_policy (identity_id, policy_id) VALUES ($1, $2)"
            }
            Self::Group => "INSERT INTO group_policy (group_id, policy_id) VALUES ($1, $2)",
        }
    }
}

/// Upsert a policy body under the given row id (the row id differs from the
/// policy's own id for synthetic inline rows).
async fn upsert_policy<'e, E>(executor: E, policy: &Policy, row_id: &str) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let actions = serde_json::to_string(policy.actions()).map_err(|e| StorageError::Corrupt {
        reason: format!("policy '{row_id}' actions: {e}"),
    })?;
    let resources =
        serde_json::to_string(policy.resources()).map_err(|e| StorageError::Corrupt {
            reason: format!("policy '{row_id}' resources: {e}"),
        })?;

    sqlx::query(
        "INSERT INTO policy (id, version, effect, actions, resources) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO UPDATE SET \
             version = EXCLUDED.version, \
             effect = EXCLUDED.effect, \
             actions = EXCLUDED.actions, \
             resources = EXCLUDED.resources",
    )
    .bind(row_id)
    .bind(policy.version().as_i64())
    .bind(policy.effect() == PolicyEffect::Allow)
    .bind(actions)
    .bind(resources)
    .execute(executor)
    .await?;

    Ok(())
}

/// Decode a `policy` row into a [`Policy`], enforcing document invariants.
fn decode_policy_row(
    id: String,
    version: i64,
    effect: bool,
    actions: &str,
    resources: &str,
) -> Result<Policy, StorageError> {
    let actions: Vec<String> =
        serde_json::from_str(actions).map_err(|e| StorageError::Corrupt {
            reason: format!("policy '{id}' actions: {e}"),
        })?;
    let resources: Vec<String> =
        serde_json::from_str(resources).map_err(|e| StorageError::Corrupt {
            reason: format!("policy '{id}' resources: {e}"),
        })?;

    let version = PolicyVersion::try_from(version)?;
    let effect = if effect {
        PolicyEffect::Allow
    } else {
        PolicyEffect::Deny
    };

    Ok(Policy::new(version, id, effect, actions, resources)?)
}

/// Create the six tables when they do not exist yet.
async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS policy (\
             id        TEXT PRIMARY KEY, \
             version   BIGINT NOT NULL, \
             effect    BOOLEAN NOT NULL, \
             actions   TEXT NOT NULL, \
             resources TEXT NOT NULL\
         )",
        "CREATE TABLE IF NOT EXISTS identity (\
             id        TEXT PRIMARY KEY, \
             policy_id TEXT REFERENCES policy (id)\
         )",
        "CREATE TABLE IF NOT EXISTS \"group\" (\
             id        TEXT PRIMARY KEY, \
             policy_id TEXT REFERENCES policy (id)\
         )",
        "CREATE TABLE IF NOT EXISTS identity_policy (\
             identity_id TEXT NOT NULL REFERENCES identity (id) ON DELETE CASCADE, \
             policy_id   TEXT NOT NULL REFERENCES policy (id) ON DELETE CASCADE, \
             PRIMARY KEY (identity_id, policy_id)\
         )",
        "CREATE TABLE IF NOT EXISTS group_policy (\
             group_id  TEXT NOT NULL REFERENCES \"group\" (id) ON DELETE CASCADE, \
             policy_id TEXT NOT NULL REFERENCES policy (id) ON DELETE CASCADE, \
             PRIMARY KEY (group_id, policy_id)\
         )",
        "CREATE TABLE IF NOT EXISTS group_identity (\
             group_id    TEXT NOT NULL REFERENCES \"group\" (id) ON DELETE CASCADE, \
             identity_id TEXT NOT NULL REFERENCES identity (id) ON DELETE CASCADE, \
             PRIMARY KEY (group_id, identity_id)\
         )",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_unknown_versions() {
        let err = decode_policy_row("P".to_owned(), 3, true, "[\"a\"]", "[\"r\"]").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Policy(aegis_core::PolicyError::UnknownVersion(3))
        ));
    }

    #[test]
    fn decode_rejects_malformed_json_columns() {
        let err =
            decode_policy_row("P".to_owned(), 1, true, "not json", "[\"r\"]").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn decode_maps_effect_booleans() {
        let allow = decode_policy_row("P".to_owned(), 1, true, "[\"a\"]", "[\"r\"]").unwrap();
        assert_eq!(allow.effect(), PolicyEffect::Allow);

        let deny = decode_policy_row("P".to_owned(), 1, false, "[\"a\"]", "[\"r\"]").unwrap();
        assert_eq!(deny.effect(), PolicyEffect::Deny);
    }

    #[test]
    fn decode_normalizes_empty_resources() {
        let policy = decode_policy_row("P".to_owned(), 1, true, "[\"a\"]", "[]").unwrap();
        assert_eq!(policy.resources(), ["*"]);
    }
}
