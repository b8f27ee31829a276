use super::models::{new_id, now_rfc3339, ServiceDependency};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};
use std::collections::{HashMap, HashSet};

/// Loads the full edge set for a project, used by `would_cycle` before
/// a caller decides whether to insert (§4.1.1: the read and the
/// conditional write are separate top-level calls left to the caller
/// to sequence, since a single generic-`E` function can't issue both
/// against a non-`Copy` handle like `&mut Transaction`).
pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<ServiceDependency>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ServiceDependency>(
        "SELECT * FROM service_dependencies WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

/// Pure-Rust DFS cycle check: would adding `source -> target` close a
/// cycle given the existing edge set? True if `target` can already
/// reach `source`.
pub fn would_cycle(edges: &[ServiceDependency], source: &str, target: &str) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source_service_id.as_str())
            .or_default()
            .push(edge.target_service_id.as_str());
    }

    let mut visited = HashSet::new();
    let mut stack = vec![target];
    while let Some(node) = stack.pop() {
        if node == source {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(node) {
            stack.extend(neighbors.iter().copied());
        }
    }
    false
}

pub async fn insert_edge<'c, E>(
    exec: E,
    project_id: &str,
    source_service_id: &str,
    target_service_id: &str,
    dependency_type: &str,
) -> Result<ServiceDependency>
where
    E: Executor<'c, Database = Sqlite>,
{
    if source_service_id == target_service_id {
        return Err(SwitchyardError::invalid("a service cannot depend on itself"));
    }

    let edge = ServiceDependency {
        id: new_id(),
        project_id: project_id.to_string(),
        source_service_id: source_service_id.to_string(),
        target_service_id: target_service_id.to_string(),
        dependency_type: dependency_type.to_string(),
        created_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO service_dependencies (id, project_id, source_service_id, target_service_id, dependency_type, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&edge.id)
    .bind(&edge.project_id)
    .bind(&edge.source_service_id)
    .bind(&edge.target_service_id)
    .bind(&edge.dependency_type)
    .bind(&edge.created_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(edge)
}

pub async fn remove_edge<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM service_dependencies WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("service dependency {id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str) -> ServiceDependency {
        ServiceDependency {
            id: new_id(),
            project_id: "p1".to_string(),
            source_service_id: source.to_string(),
            target_service_id: target.to_string(),
            dependency_type: "network".to_string(),
            created_at: now_rfc3339(),
        }
    }

    #[test]
    fn detects_direct_and_transitive_cycles() {
        let edges = vec![edge("a", "b"), edge("b", "c")];
        assert!(would_cycle(&edges, "c", "a"));
        assert!(would_cycle(&edges, "b", "a"));
        assert!(!would_cycle(&edges, "c", "d"));
    }

    #[tokio::test]
    async fn remove_edge_deletes_the_row_and_rejects_unknown_ids() {
        use crate::store::Store;

        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let a = crate::store::service::create(
            pool, "p1", "svc-a", "https://github.com/acme/a", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let b = crate::store::service::create(
            pool, "p1", "svc-b", "https://github.com/acme/b", None, "{}", false, None, None,
        )
        .await
        .unwrap();

        let inserted = insert_edge(pool, "p1", &a.id, &b.id, "network").await.unwrap();
        assert_eq!(list_for_project(pool, "p1").await.unwrap().len(), 1);

        remove_edge(pool, &inserted.id).await.unwrap();
        assert!(list_for_project(pool, "p1").await.unwrap().is_empty());

        assert!(remove_edge(pool, &inserted.id).await.is_err());
    }
}
