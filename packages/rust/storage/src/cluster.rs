//! Cluster repository.

use libsql::params;
use workspacebuilder_shared::{KubernetesCluster, Result};

use crate::{GraphStore, Repository, db_err};

/// Repository for [`KubernetesCluster`] nodes, keyed by cluster name.
pub struct ClusterRepository<'a> {
    store: &'a GraphStore,
}

impl<'a> ClusterRepository<'a> {
    pub(crate) fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }
}

impl Repository for ClusterRepository<'_> {
    type Entity = KubernetesCluster;
    type Key = String;

    async fn all(&self) -> Result<Vec<KubernetesCluster>> {
        let mut rows = self
            .store
            .conn
            .query("SELECT name, context FROM clusters ORDER BY name", params![])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(KubernetesCluster {
                name: row.get::<String>(0).map_err(db_err)?,
                context: row.get::<String>(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    async fn get(&self, name: &String) -> Result<Option<KubernetesCluster>> {
        let mut rows = self
            .store
            .conn
            .query(
                "SELECT name, context FROM clusters WHERE name = ?1",
                params![name.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(KubernetesCluster {
                name: row.get::<String>(0).map_err(db_err)?,
                context: row.get::<String>(1).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn save(&self, cluster: &KubernetesCluster) -> Result<()> {
        self.store.check_writable()?;
        self.store
            .conn
            .execute(
                "INSERT INTO clusters (name, context) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET context = excluded.context",
                params![cluster.name.as_str(), cluster.context.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
