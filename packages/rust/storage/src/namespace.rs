//! Namespace repository.

use libsql::params;
use workspacebuilder_shared::{KubernetesNamespace, Lod, Result, WorkspaceBuilderError};

use crate::{GraphStore, Repository, db_err, decode_resource, encode_resource};

/// Identity of a namespace node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceKey {
    pub cluster: String,
    pub name: String,
}

impl NamespaceKey {
    pub fn new(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            name: name.into(),
        }
    }
}

/// Repository for [`KubernetesNamespace`] nodes.
pub struct NamespaceRepository<'a> {
    store: &'a GraphStore,
}

const SELECT_COLUMNS: &str = "SELECT cluster, name, lod, resource_json FROM namespaces";

impl<'a> NamespaceRepository<'a> {
    pub(crate) fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Namespaces belonging to one cluster.
    pub async fn in_cluster(&self, cluster: &str) -> Result<Vec<KubernetesNamespace>> {
        let mut rows = self
            .store
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE cluster = ?1 ORDER BY name"),
                params![cluster],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_namespace(&row)?);
        }
        Ok(results)
    }
}

impl Repository for NamespaceRepository<'_> {
    type Entity = KubernetesNamespace;
    type Key = NamespaceKey;

    async fn all(&self) -> Result<Vec<KubernetesNamespace>> {
        let mut rows = self
            .store
            .conn
            .query(&format!("{SELECT_COLUMNS} ORDER BY cluster, name"), params![])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_namespace(&row)?);
        }
        Ok(results)
    }

    async fn get(&self, key: &NamespaceKey) -> Result<Option<KubernetesNamespace>> {
        let mut rows = self
            .store
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE cluster = ?1 AND name = ?2"),
                params![key.cluster.as_str(), key.name.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_namespace(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, namespace: &KubernetesNamespace) -> Result<()> {
        self.store.check_writable()?;
        let resource_json = encode_resource(&namespace.resource)?;
        self.store
            .conn
            .execute(
                "INSERT INTO namespaces (cluster, name, lod, resource_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(cluster, name) DO UPDATE SET
                   lod = excluded.lod,
                   resource_json = excluded.resource_json",
                params![
                    namespace.cluster.as_str(),
                    namespace.name.as_str(),
                    namespace.lod.map(|l| i64::from(l.0)),
                    resource_json,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Convert a database row to a [`KubernetesNamespace`].
fn row_to_namespace(row: &libsql::Row) -> Result<KubernetesNamespace> {
    let lod = match row.get::<i64>(2).ok() {
        Some(raw) => Some(Lod::try_from(raw).map_err(WorkspaceBuilderError::Storage)?),
        None => None,
    };
    let resource_json: String = row.get(3).map_err(db_err)?;

    Ok(KubernetesNamespace {
        cluster: row.get::<String>(0).map_err(db_err)?,
        name: row.get::<String>(1).map_err(db_err)?,
        lod,
        resource: decode_resource(&resource_json)?,
    })
}
