//! Graph model facade over a libSQL database (offline mode).
//!
//! The [`GraphStore`] wraps the database holding everything the pipeline
//! discovers: clusters, namespaces, raw resources, workspaces and SLXs.
//! Components never write SQL; they go through one repository per entity
//! type ([`ClusterRepository`], [`NamespaceRepository`], ...) which exposes
//! `all`, `get`, `save` and relationship traversal.
//!
//! **Access rules:**
//! - pipeline runs: read-write via [`GraphStore::open`]
//! - inspection tooling: read-only via [`GraphStore::open_readonly`]
//!
//! Every `save` is a single upsert statement, so an interrupted run never
//! leaves an entity half-written.

mod cluster;
mod migrations;
mod namespace;
mod resource;
mod workspace;

use std::path::Path;

use libsql::{Connection, Database, params};
use workspacebuilder_shared::{Result, WorkspaceBuilderError};

pub use cluster::ClusterRepository;
pub use namespace::{NamespaceKey, NamespaceRepository};
pub use resource::{ResourceKey, ResourceRepository};
pub use workspace::{SlxKey, SlxRepository, WorkspaceRepository};

/// Typed access to one entity type in the graph.
#[allow(async_fn_in_trait)]
pub trait Repository {
    /// The entity stored by this repository.
    type Entity;
    /// The entity's identity.
    type Key;

    /// Every stored entity, in key order.
    async fn all(&self) -> Result<Vec<Self::Entity>>;

    /// Look up one entity by key.
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Entity>>;

    /// Insert or replace an entity. Changes to a loaded entity are not
    /// visible to anyone else until it is saved.
    async fn save(&self, entity: &Self::Entity) -> Result<()>;
}

/// Primary graph store handle wrapping a libSQL database.
pub struct GraphStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl GraphStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WorkspaceBuilderError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    WorkspaceBuilderError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(WorkspaceBuilderError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Remove every entity, leaving the schema in place.
    pub async fn reset(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch(
                "BEGIN;
                 DELETE FROM slxs;
                 DELETE FROM workspaces;
                 DELETE FROM resources;
                 DELETE FROM namespaces;
                 DELETE FROM clusters;
                 COMMIT;",
            )
            .await
            .map_err(db_err)?;
        tracing::debug!("graph store reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------------

    pub fn clusters(&self) -> ClusterRepository<'_> {
        ClusterRepository::new(self)
    }

    pub fn namespaces(&self) -> NamespaceRepository<'_> {
        NamespaceRepository::new(self)
    }

    pub fn resources(&self) -> ResourceRepository<'_> {
        ResourceRepository::new(self)
    }

    pub fn workspaces(&self) -> WorkspaceRepository<'_> {
        WorkspaceRepository::new(self)
    }

    pub fn slxs(&self) -> SlxRepository<'_> {
        SlxRepository::new(self)
    }
}

/// Map a libSQL error into the storage error variant.
pub(crate) fn db_err(e: libsql::Error) -> WorkspaceBuilderError {
    WorkspaceBuilderError::Storage(e.to_string())
}

/// Decode a JSON column holding a raw captured object.
pub(crate) fn decode_resource(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| WorkspaceBuilderError::Storage(format!("invalid resource json: {e}")))
}

/// Encode a raw captured object for storage.
pub(crate) fn encode_resource(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| WorkspaceBuilderError::Storage(format!("resource json: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use workspacebuilder_shared::{KubernetesCluster, KubernetesNamespace};

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_support::test_store().await;
        let version = store.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("wb_test_{}.db", Uuid::now_v7()));
        let _s1 = GraphStore::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = GraphStore::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn reset_clears_entities() {
        let store = test_support::test_store().await;
        store
            .clusters()
            .save(&KubernetesCluster {
                name: "prod".into(),
                context: "prod-ctx".into(),
            })
            .await
            .unwrap();
        store
            .namespaces()
            .save(&KubernetesNamespace {
                cluster: "prod".into(),
                name: "shop".into(),
                lod: None,
                resource: json!({"metadata": {"name": "shop"}}),
            })
            .await
            .unwrap();

        store.reset().await.expect("reset");

        assert!(store.clusters().all().await.unwrap().is_empty());
        assert!(store.namespaces().all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("wb_test_{}.db", Uuid::now_v7()));
        let rw = GraphStore::open(&tmp).await.unwrap();
        rw.clusters()
            .save(&KubernetesCluster {
                name: "a".into(),
                context: "a".into(),
            })
            .await
            .unwrap();
        drop(rw);

        let ro = GraphStore::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.clusters().all().await.unwrap().len(), 1);
        let result = ro
            .clusters()
            .save(&KubernetesCluster {
                name: "b".into(),
                context: "b".into(),
            })
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
