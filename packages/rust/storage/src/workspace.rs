//! Workspace and SLX repositories.

use libsql::params;
use workspacebuilder_shared::{Lod, Result, RunWhenWorkspace, Slx, WorkspaceBuilderError};

use crate::{GraphStore, Repository, db_err};

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

/// Repository for [`RunWhenWorkspace`] nodes, keyed by workspace name.
pub struct WorkspaceRepository<'a> {
    store: &'a GraphStore,
}

impl<'a> WorkspaceRepository<'a> {
    pub(crate) fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }
}

impl Repository for WorkspaceRepository<'_> {
    type Entity = RunWhenWorkspace;
    type Key = String;

    async fn all(&self) -> Result<Vec<RunWhenWorkspace>> {
        let mut rows = self
            .store
            .conn
            .query(
                "SELECT name, owner_email, default_lod FROM workspaces ORDER BY name",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_workspace(&row)?);
        }
        Ok(results)
    }

    async fn get(&self, name: &String) -> Result<Option<RunWhenWorkspace>> {
        let mut rows = self
            .store
            .conn
            .query(
                "SELECT name, owner_email, default_lod FROM workspaces WHERE name = ?1",
                params![name.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_workspace(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, workspace: &RunWhenWorkspace) -> Result<()> {
        self.store.check_writable()?;
        self.store
            .conn
            .execute(
                "INSERT INTO workspaces (name, owner_email, default_lod) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                   owner_email = excluded.owner_email,
                   default_lod = excluded.default_lod",
                params![
                    workspace.name.as_str(),
                    workspace.owner_email.as_deref(),
                    i64::from(workspace.default_lod.0),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_workspace(row: &libsql::Row) -> Result<RunWhenWorkspace> {
    Ok(RunWhenWorkspace {
        name: row.get::<String>(0).map_err(db_err)?,
        owner_email: row.get::<String>(1).ok(),
        default_lod: lod_column(row, 2)?,
    })
}

// ---------------------------------------------------------------------------
// SLXs
// ---------------------------------------------------------------------------

/// Identity of an SLX: `(workspace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlxKey {
    pub workspace: String,
    pub name: String,
}

impl SlxKey {
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
        }
    }
}

/// Repository for [`Slx`] nodes.
pub struct SlxRepository<'a> {
    store: &'a GraphStore,
}

const SLX_COLUMNS: &str = "SELECT workspace, name, cluster, namespace, lod FROM slxs";

impl<'a> SlxRepository<'a> {
    pub(crate) fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// SLXs owned by a workspace, ordered by name.
    pub async fn in_workspace(&self, workspace: &str) -> Result<Vec<Slx>> {
        let mut rows = self
            .store
            .conn
            .query(
                &format!("{SLX_COLUMNS} WHERE workspace = ?1 ORDER BY name"),
                params![workspace],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_slx(&row)?);
        }
        Ok(results)
    }

    /// Drop every SLX of a workspace (used before regenerating them).
    pub async fn delete_for_workspace(&self, workspace: &str) -> Result<u64> {
        self.store.check_writable()?;
        self.store
            .conn
            .execute("DELETE FROM slxs WHERE workspace = ?1", params![workspace])
            .await
            .map_err(db_err)
    }
}

impl Repository for SlxRepository<'_> {
    type Entity = Slx;
    type Key = SlxKey;

    async fn all(&self) -> Result<Vec<Slx>> {
        let mut rows = self
            .store
            .conn
            .query(&format!("{SLX_COLUMNS} ORDER BY workspace, name"), params![])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_slx(&row)?);
        }
        Ok(results)
    }

    async fn get(&self, key: &SlxKey) -> Result<Option<Slx>> {
        let mut rows = self
            .store
            .conn
            .query(
                &format!("{SLX_COLUMNS} WHERE workspace = ?1 AND name = ?2"),
                params![key.workspace.as_str(), key.name.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_slx(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, slx: &Slx) -> Result<()> {
        self.store.check_writable()?;
        self.store
            .conn
            .execute(
                "INSERT INTO slxs (workspace, name, cluster, namespace, lod)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(workspace, name) DO UPDATE SET
                   cluster = excluded.cluster,
                   namespace = excluded.namespace,
                   lod = excluded.lod",
                params![
                    slx.workspace.as_str(),
                    slx.name.as_str(),
                    slx.cluster.as_str(),
                    slx.namespace.as_str(),
                    i64::from(slx.lod.0),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_slx(row: &libsql::Row) -> Result<Slx> {
    Ok(Slx {
        workspace: row.get::<String>(0).map_err(db_err)?,
        name: row.get::<String>(1).map_err(db_err)?,
        cluster: row.get::<String>(2).map_err(db_err)?,
        namespace: row.get::<String>(3).map_err(db_err)?,
        lod: lod_column(row, 4)?,
    })
}

fn lod_column(row: &libsql::Row, idx: i32) -> Result<Lod> {
    let raw: i64 = row.get(idx).map_err(db_err)?;
    Lod::try_from(raw).map_err(WorkspaceBuilderError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_workspaces, test_store};

    fn slx(workspace: &str, name: &str) -> Slx {
        Slx {
            workspace: workspace.into(),
            name: name.into(),
            cluster: "prod".into(),
            namespace: name.into(),
            lod: Lod::DETAILED,
        }
    }

    #[tokio::test]
    async fn workspace_crud() {
        let store = test_store().await;
        let repo = store.workspaces();
        let ws = RunWhenWorkspace {
            name: "ops".into(),
            owner_email: Some("ops@example.com".into()),
            default_lod: Lod::BASIC,
        };
        repo.save(&ws).await.expect("save");

        assert_eq!(repo.get(&"ops".to_string()).await.unwrap(), Some(ws));
        assert_eq!(repo.all().await.unwrap().len(), 1);

        let no_owner = RunWhenWorkspace {
            name: "dev".into(),
            owner_email: None,
            default_lod: Lod::DETAILED,
        };
        repo.save(&no_owner).await.unwrap();
        let found = repo.get(&"dev".to_string()).await.unwrap().unwrap();
        assert!(found.owner_email.is_none());
    }

    #[tokio::test]
    async fn slxs_traverse_by_workspace() {
        let store = test_store().await;
        seed_workspaces(&store, &["ops", "dev"]).await;
        let repo = store.slxs();
        repo.save(&slx("ops", "shop")).await.unwrap();
        repo.save(&slx("ops", "billing")).await.unwrap();
        repo.save(&slx("dev", "shop")).await.unwrap();

        let names: Vec<String> = repo
            .in_workspace("ops")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["billing", "shop"]);

        assert!(repo.get(&SlxKey::new("dev", "shop")).await.unwrap().is_some());

        let removed = repo.delete_for_workspace("ops").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slx_without_workspace_is_rejected() {
        let store = test_store().await;
        let result = store.slxs().save(&slx("ghost", "shop")).await;
        assert!(matches!(result, Err(WorkspaceBuilderError::Storage(_))));
    }
}
