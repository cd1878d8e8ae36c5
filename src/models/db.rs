//! SQLite persistence for processed projects.
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::EntityType;
use crate::dto::{
    GraphData, GraphEdge, GraphNode, ProjectExport, ProjectMetadata, ProjectSource,
};
use crate::services::{ServiceError, ServiceResult};

/// Accept SQLAlchemy-style URLs (`sqlite:///./app.db`) as well as plain
/// paths, reducing them to the filename sqlx expects.
fn sqlite_path(database_url: &str) -> &str {
    let stripped = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    stripped.strip_prefix("./").unwrap_or(stripped)
}

/// Open (creating if needed) the database and ensure the schema exists.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let path = sqlite_path(database_url);
    let options = if path == ":memory:" || path.is_empty() {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        SqliteConnectOptions::new().filename(path).create_if_missing(true)
    }
    .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(if path == ":memory:" { 1 } else { 5 })
        .connect_with(options)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS projects (
            project_id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            graph_metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS graph_nodes (
            project_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            value INTEGER NOT NULL,
            metadata TEXT NOT NULL,
            PRIMARY KEY (project_id, node_id)
        )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS graph_edges (
            project_id TEXT NOT NULL,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            weight REAL NOT NULL,
            title TEXT NOT NULL,
            metadata TEXT NOT NULL,
            PRIMARY KEY (project_id, source, target)
        )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS project_sources (
            project_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            filename TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Save a graph under a project name, replacing any previous graph stored
/// for that name. Returns the project id.
pub async fn save_project(
    pool: &SqlitePool,
    name: &str,
    graph: &GraphData,
    sources: &[ProjectSource],
) -> ServiceResult<String> {
    let now = Utc::now().to_rfc3339();
    let graph_metadata = serde_json::to_string(&graph.metadata)?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT project_id FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    let mut tx = pool.begin().await?;
    let project_id = match existing {
        Some((project_id,)) => {
            sqlx::query(
                "UPDATE projects SET updated_at = ?, graph_metadata = ? WHERE project_id = ?",
            )
            .bind(&now)
            .bind(&graph_metadata)
            .bind(&project_id)
            .execute(&mut *tx)
            .await?;
            for table in ["graph_nodes", "graph_edges", "project_sources"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE project_id = ?"))
                    .bind(&project_id)
                    .execute(&mut *tx)
                    .await?;
            }
            project_id
        }
        None => {
            let project_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO projects (project_id, name, graph_metadata, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&project_id)
            .bind(name)
            .bind(&graph_metadata)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            project_id
        }
    };

    for node in &graph.nodes {
        sqlx::query(
            "INSERT OR REPLACE INTO graph_nodes (project_id, node_id, entity_type, value, metadata)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project_id)
        .bind(&node.id)
        .bind(node.group.as_str())
        .bind(node.value as i64)
        .bind(serde_json::to_string(&node.metadata)?)
        .execute(&mut *tx)
        .await?;
    }
    for edge in &graph.edges {
        sqlx::query(
            "INSERT OR REPLACE INTO graph_edges (project_id, source, target, weight, title, metadata)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&project_id)
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(edge.value)
        .bind(&edge.title)
        .bind(serde_json::to_string(&edge.metadata)?)
        .execute(&mut *tx)
        .await?;
    }
    for source in sources {
        sqlx::query(
            "INSERT INTO project_sources (project_id, source_type, filename) VALUES (?, ?, ?)",
        )
        .bind(&project_id)
        .bind(&source.source_type)
        .bind(&source.filename)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(project_id)
}

/// Project id stored under a name, if any.
pub async fn find_project(pool: &SqlitePool, name: &str) -> ServiceResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT project_id FROM projects WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(project_id,)| project_id))
}

#[derive(FromRow)]
struct ProjectRow {
    project_id: String,
    name: String,
    description: String,
    created_at: String,
    updated_at: String,
    pdf_count: i64,
    node_count: i64,
    edge_count: i64,
}

impl From<ProjectRow> for ProjectMetadata {
    fn from(row: ProjectRow) -> Self {
        Self {
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            pdf_count: row.pdf_count as usize,
            node_count: row.node_count as usize,
            edge_count: row.edge_count as usize,
        }
    }
}

/// All persisted projects, most recently updated first.
pub async fn list_projects(pool: &SqlitePool) -> ServiceResult<Vec<ProjectMetadata>> {
    let rows: Vec<ProjectRow> = sqlx::query_as(
        "SELECT p.project_id, p.name, p.description, p.created_at, p.updated_at,
                (SELECT COUNT(*) FROM project_sources s
                 WHERE s.project_id = p.project_id AND s.source_type = 'pdf') AS pdf_count,
                (SELECT COUNT(*) FROM graph_nodes n WHERE n.project_id = p.project_id) AS node_count,
                (SELECT COUNT(*) FROM graph_edges e WHERE e.project_id = p.project_id) AS edge_count
         FROM projects p
         ORDER BY p.updated_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ProjectMetadata::from).collect())
}

#[derive(FromRow)]
struct NodeRow {
    node_id: String,
    entity_type: String,
    value: i64,
    metadata: String,
}

#[derive(FromRow)]
struct EdgeRow {
    source: String,
    target: String,
    weight: f64,
    title: String,
    metadata: String,
}

/// Full export of one project, or None if the id is unknown.
pub async fn export_project(
    pool: &SqlitePool,
    project_id: &str,
) -> ServiceResult<Option<ProjectExport>> {
    let project: Option<(String, String, String, String)> = sqlx::query_as(
        "SELECT name, graph_metadata, created_at, updated_at
         FROM projects WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;
    let Some((name, graph_metadata, created_at, updated_at)) = project else {
        return Ok(None);
    };

    let node_rows: Vec<NodeRow> = sqlx::query_as(
        "SELECT node_id, entity_type, value, metadata
         FROM graph_nodes WHERE project_id = ? ORDER BY node_id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    let edge_rows: Vec<EdgeRow> = sqlx::query_as(
        "SELECT source, target, weight, title, metadata
         FROM graph_edges WHERE project_id = ? ORDER BY source, target",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    let source_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT source_type, filename FROM project_sources WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let nodes = node_rows
        .into_iter()
        .map(|row| {
            Ok(GraphNode {
                id: row.node_id,
                group: EntityType::from_str_lossy(&row.entity_type),
                value: row.value as usize,
                metadata: serde_json::from_str(&row.metadata)?,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;
    let edges = edge_rows
        .into_iter()
        .map(|row| {
            Ok(GraphEdge {
                source: row.source,
                target: row.target,
                value: row.weight,
                title: row.title,
                metadata: serde_json::from_str(&row.metadata)?,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    let metadata: std::collections::BTreeMap<String, Value> =
        serde_json::from_str(&graph_metadata)?;

    Ok(Some(ProjectExport {
        project_name: name,
        created_at,
        updated_at,
        graph: GraphData {
            nodes,
            edges,
            metadata,
        },
        sources: source_rows
            .into_iter()
            .map(|(source_type, filename)| ProjectSource {
                source_type,
                filename,
            })
            .collect(),
        settings: Default::default(),
    }))
}

/// Import a previously exported project under its recorded name.
pub async fn import_project(pool: &SqlitePool, export: &ProjectExport) -> ServiceResult<String> {
    save_project(pool, &export.project_name, &export.graph, &export.sources).await
}
