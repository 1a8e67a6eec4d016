//! SQL migration definitions for the graph store database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: clusters, namespaces, resources, workspaces, slxs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Kubernetes clusters
CREATE TABLE IF NOT EXISTS clusters (
    name    TEXT PRIMARY KEY,
    context TEXT NOT NULL
);

-- Namespaces, owned by a cluster
CREATE TABLE IF NOT EXISTS namespaces (
    cluster       TEXT NOT NULL REFERENCES clusters(name) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    lod           INTEGER,
    resource_json TEXT NOT NULL,
    PRIMARY KEY (cluster, name)
);

-- Other namespaced resources; cluster-scoped objects use namespace = ''
CREATE TABLE IF NOT EXISTS resources (
    cluster       TEXT NOT NULL REFERENCES clusters(name) ON DELETE CASCADE,
    kind          TEXT NOT NULL,
    namespace     TEXT NOT NULL DEFAULT '',
    name          TEXT NOT NULL,
    resource_json TEXT NOT NULL,
    PRIMARY KEY (cluster, kind, namespace, name)
);

CREATE INDEX IF NOT EXISTS idx_resources_namespace ON resources(cluster, namespace);

-- RunWhen workspaces
CREATE TABLE IF NOT EXISTS workspaces (
    name        TEXT PRIMARY KEY,
    owner_email TEXT,
    default_lod INTEGER NOT NULL
);

-- SLXs owned by a workspace, one per admitted namespace
CREATE TABLE IF NOT EXISTS slxs (
    workspace TEXT NOT NULL REFERENCES workspaces(name) ON DELETE CASCADE,
    name      TEXT NOT NULL,
    cluster   TEXT NOT NULL,
    namespace TEXT NOT NULL,
    lod       INTEGER NOT NULL,
    PRIMARY KEY (workspace, name)
);

CREATE INDEX IF NOT EXISTS idx_slxs_namespace ON slxs(cluster, namespace);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
