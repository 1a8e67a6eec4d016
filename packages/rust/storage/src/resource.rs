//! Repository for raw namespaced resources (pods, services, ...).

use libsql::params;
use workspacebuilder_shared::{KubernetesResource, ResourceKind, Result, WorkspaceBuilderError};

use crate::{GraphStore, Repository, db_err, decode_resource, encode_resource};

/// Identity of a resource node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub cluster: String,
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    /// The key identifying an existing resource.
    pub fn of(resource: &KubernetesResource) -> Self {
        Self {
            cluster: resource.cluster.clone(),
            kind: resource.kind,
            namespace: resource.namespace.clone(),
            name: resource.name.clone(),
        }
    }
}

/// Repository for [`KubernetesResource`] nodes.
pub struct ResourceRepository<'a> {
    store: &'a GraphStore,
}

const SELECT_COLUMNS: &str = "SELECT cluster, kind, namespace, name, resource_json FROM resources";

impl<'a> ResourceRepository<'a> {
    pub(crate) fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// All resources captured for a cluster.
    pub async fn in_cluster(&self, cluster: &str) -> Result<Vec<KubernetesResource>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE cluster = ?1 ORDER BY kind, namespace, name"),
            params![cluster],
        )
        .await
    }

    /// Resources of one kind in a cluster.
    pub async fn of_kind(&self, cluster: &str, kind: ResourceKind) -> Result<Vec<KubernetesResource>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE cluster = ?1 AND kind = ?2 ORDER BY namespace, name"),
            params![cluster, kind.as_str()],
        )
        .await
    }

    /// Resources living in a namespace.
    pub async fn in_namespace(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<Vec<KubernetesResource>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE cluster = ?1 AND namespace = ?2 ORDER BY kind, name"),
            params![cluster, namespace],
        )
        .await
    }

    async fn query(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<KubernetesResource>> {
        let mut rows = self.store.conn.query(sql, params).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_resource(&row)?);
        }
        Ok(results)
    }
}

impl Repository for ResourceRepository<'_> {
    type Entity = KubernetesResource;
    type Key = ResourceKey;

    async fn all(&self) -> Result<Vec<KubernetesResource>> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY cluster, kind, namespace, name"),
            params![],
        )
        .await
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<KubernetesResource>> {
        let found = self
            .query(
                &format!(
                    "{SELECT_COLUMNS} WHERE cluster = ?1 AND kind = ?2 AND namespace = ?3 AND name = ?4"
                ),
                params![
                    key.cluster.as_str(),
                    key.kind.as_str(),
                    key.namespace.as_deref().unwrap_or(""),
                    key.name.as_str(),
                ],
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn save(&self, resource: &KubernetesResource) -> Result<()> {
        self.store.check_writable()?;
        let resource_json = encode_resource(&resource.resource)?;
        self.store
            .conn
            .execute(
                "INSERT INTO resources (cluster, kind, namespace, name, resource_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(cluster, kind, namespace, name) DO UPDATE SET
                   resource_json = excluded.resource_json",
                params![
                    resource.cluster.as_str(),
                    resource.kind.as_str(),
                    resource.namespace.as_deref().unwrap_or(""),
                    resource.name.as_str(),
                    resource_json,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Convert a database row to a [`KubernetesResource`].
fn row_to_resource(row: &libsql::Row) -> Result<KubernetesResource> {
    let kind: String = row.get(1).map_err(db_err)?;
    let namespace: String = row.get(2).map_err(db_err)?;
    let resource_json: String = row.get(4).map_err(db_err)?;

    Ok(KubernetesResource {
        cluster: row.get::<String>(0).map_err(db_err)?,
        kind: kind.parse().map_err(WorkspaceBuilderError::Storage)?,
        namespace: (!namespace.is_empty()).then_some(namespace),
        name: row.get::<String>(3).map_err(db_err)?,
        resource: decode_resource(&resource_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_clusters, test_store};
    use serde_json::json;

    fn resource(kind: ResourceKind, namespace: Option<&str>, name: &str) -> KubernetesResource {
        KubernetesResource {
            cluster: "prod".into(),
            kind,
            namespace: namespace.map(String::from),
            name: name.into(),
            resource: json!({"metadata": {"name": name, "namespace": namespace}}),
        }
    }

    #[tokio::test]
    async fn get_by_full_key() {
        let store = test_store().await;
        seed_clusters(&store, &["prod"]).await;
        let repo = store.resources();
        let pod = resource(ResourceKind::Pod, Some("shop"), "web-0");
        repo.save(&pod).await.expect("save");

        let found = repo.get(&ResourceKey::of(&pod)).await.unwrap();
        assert_eq!(found, Some(pod.clone()));

        let other_kind = ResourceKey {
            kind: ResourceKind::Service,
            ..ResourceKey::of(&pod)
        };
        assert!(repo.get(&other_kind).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cluster_scoped_resources_have_no_namespace() {
        let store = test_store().await;
        seed_clusters(&store, &["prod"]).await;
        let repo = store.resources();
        let ingress = resource(ResourceKind::Ingress, None, "edge");
        repo.save(&ingress).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].namespace, None);
    }

    #[tokio::test]
    async fn traversal_queries() {
        let store = test_store().await;
        seed_clusters(&store, &["prod"]).await;
        let repo = store.resources();
        repo.save(&resource(ResourceKind::Pod, Some("shop"), "web-0")).await.unwrap();
        repo.save(&resource(ResourceKind::Pod, Some("shop"), "web-1")).await.unwrap();
        repo.save(&resource(ResourceKind::Service, Some("shop"), "web")).await.unwrap();
        repo.save(&resource(ResourceKind::Pod, Some("billing"), "api-0")).await.unwrap();

        assert_eq!(repo.in_namespace("prod", "shop").await.unwrap().len(), 3);
        assert_eq!(repo.of_kind("prod", ResourceKind::Pod).await.unwrap().len(), 3);
        assert_eq!(repo.in_cluster("prod").await.unwrap().len(), 4);
        assert!(repo.in_cluster("dev").await.unwrap().is_empty());
    }
}
