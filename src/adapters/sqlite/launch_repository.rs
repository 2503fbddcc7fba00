//! SQLite implementation of the LaunchRepository.
//!
//! Reads outside a merge go through the pool. A merge runs on a
//! [`SqliteUnitOfWork`], which owns one write transaction from the first read
//! of the source trees to the final commit.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::adapters::sqlite::{
    begin_write, format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ItemStatus, ItemType, Launch, LaunchMode, Statistics, TestItem};
use crate::domain::ports::{LaunchFilter, LaunchRepository, LaunchUnitOfWork};

const LAUNCH_COLUMNS: &str = "id, project, name, number, description, mode, status, start_time, end_time, \
     attributes, total, passed, failed, skipped, retired";

const ITEM_COLUMNS: &str = "id, launch_id, parent_id, name, item_type, status, start_time, end_time, \
     description, unique_id, code_ref, parameters, attributes, path, position, \
     total, passed, failed, skipped, has_retries, retry_of, retired";

/// Parents before children; siblings by position, each item ahead of its retries.
const TREE_ORDER: &str = "ORDER BY (LENGTH(path) - LENGTH(REPLACE(path, '.', ''))), position, \
     retry_of IS NOT NULL, start_time, id";

/// SQLite-backed [`LaunchRepository`].
#[derive(Clone)]
pub struct SqliteLaunchRepository {
    pool: SqlitePool,
}

impl SqliteLaunchRepository {
    /// Repository over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LaunchRepository for SqliteLaunchRepository {
    async fn begin(&self) -> DomainResult<Box<dyn LaunchUnitOfWork>> {
        let tx = begin_write(&self.pool).await?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Launch>> {
        let mut conn = self.pool.acquire().await?;
        fetch_launch(&mut conn, id).await
    }

    async fn list(&self, filter: LaunchFilter) -> DomainResult<Vec<Launch>> {
        let mut query = format!("SELECT {LAUNCH_COLUMNS} FROM launches WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if !filter.include_retired {
            query.push_str(" AND retired = 0");
        }

        if let Some(project) = &filter.project {
            query.push_str(" AND project = ?");
            bindings.push(project.clone());
        }

        if let Some(name) = &filter.name {
            query.push_str(" AND name = ?");
            bindings.push(name.clone());
        }

        query.push_str(" ORDER BY start_time DESC, number DESC, id");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut q = sqlx::query_as::<_, LaunchRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<LaunchRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_items(&self, launch_id: Uuid, include_retired: bool) -> DomainResult<Vec<TestItem>> {
        let retired_clause = if include_retired { "" } else { " AND retired = 0" };
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM test_items WHERE launch_id = ?{retired_clause} {TREE_ORDER}"
        ))
        .bind(launch_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

/// One merge's write transaction.
///
/// Dropping it without [`commit`](LaunchUnitOfWork::commit) rolls the
/// transaction back.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl LaunchUnitOfWork for SqliteUnitOfWork {
    async fn find_launch_by_id(&mut self, id: Uuid) -> DomainResult<Option<Launch>> {
        fetch_launch(&mut self.tx, id).await
    }

    async fn find_trees_by_launch_ids(
        &mut self,
        launch_ids: &[Uuid],
    ) -> DomainResult<BTreeMap<Uuid, Vec<TestItem>>> {
        let mut trees: BTreeMap<Uuid, Vec<TestItem>> =
            launch_ids.iter().map(|id| (*id, Vec::new())).collect();
        if launch_ids.is_empty() {
            return Ok(trees);
        }

        let placeholders = vec!["?"; launch_ids.len()].join(", ");
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM test_items WHERE retired = 0 AND launch_id IN ({placeholders}) {TREE_ORDER}"
        );

        let mut q = sqlx::query_as::<_, ItemRow>(&query);
        for id in launch_ids {
            q = q.bind(id.to_string());
        }

        let rows: Vec<ItemRow> = q.fetch_all(&mut *self.tx).await?;
        for row in rows {
            let item: TestItem = row.try_into()?;
            trees.entry(item.launch_id).or_default().push(item);
        }
        Ok(trees)
    }

    async fn save_launch(&mut self, launch: &Launch) -> DomainResult<()> {
        let attributes_json = serde_json::to_string(&launch.attributes)?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO launches (id, project, name, number, description, mode, status, start_time, end_time,
                                     attributes, total, passed, failed, skipped, retired, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   project = excluded.project, name = excluded.name, number = excluded.number,
                   description = excluded.description, mode = excluded.mode, status = excluded.status,
                   start_time = excluded.start_time, end_time = excluded.end_time,
                   attributes = excluded.attributes, total = excluded.total, passed = excluded.passed,
                   failed = excluded.failed, skipped = excluded.skipped, retired = excluded.retired,
                   updated_at = excluded.updated_at"#,
        )
        .bind(launch.id.to_string())
        .bind(&launch.project)
        .bind(&launch.name)
        .bind(launch.number)
        .bind(&launch.description)
        .bind(launch.mode.as_str())
        .bind(launch.status.as_str())
        .bind(format_datetime(&launch.start_time))
        .bind(launch.end_time.as_ref().map(format_datetime))
        .bind(&attributes_json)
        .bind(i64::from(launch.statistics.total))
        .bind(i64::from(launch.statistics.passed))
        .bind(i64::from(launch.statistics.failed))
        .bind(i64::from(launch.statistics.skipped))
        .bind(launch.retired)
        .bind(&now)
        .bind(&now)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn save_test_item(&mut self, item: &TestItem) -> DomainResult<()> {
        let parameters_json = serde_json::to_string(&item.parameters)?;
        let attributes_json = serde_json::to_string(&item.attributes)?;

        sqlx::query(
            r#"INSERT INTO test_items (id, launch_id, parent_id, name, item_type, status, start_time, end_time,
                                       description, unique_id, code_ref, parameters, attributes, path, position,
                                       total, passed, failed, skipped, has_retries, retry_of, retired)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   launch_id = excluded.launch_id, parent_id = excluded.parent_id, name = excluded.name,
                   item_type = excluded.item_type, status = excluded.status,
                   start_time = excluded.start_time, end_time = excluded.end_time,
                   description = excluded.description, unique_id = excluded.unique_id,
                   code_ref = excluded.code_ref, parameters = excluded.parameters,
                   attributes = excluded.attributes, path = excluded.path, position = excluded.position,
                   total = excluded.total, passed = excluded.passed, failed = excluded.failed,
                   skipped = excluded.skipped, has_retries = excluded.has_retries,
                   retry_of = excluded.retry_of, retired = excluded.retired"#,
        )
        .bind(item.id.to_string())
        .bind(item.launch_id.to_string())
        .bind(item.parent_id.map(|id| id.to_string()))
        .bind(&item.name)
        .bind(item.item_type.as_str())
        .bind(item.status.as_str())
        .bind(format_datetime(&item.start_time))
        .bind(item.end_time.as_ref().map(format_datetime))
        .bind(&item.description)
        .bind(&item.unique_id)
        .bind(&item.code_ref)
        .bind(&parameters_json)
        .bind(&attributes_json)
        .bind(&item.path)
        .bind(item.position)
        .bind(i64::from(item.statistics.total))
        .bind(i64::from(item.statistics.passed))
        .bind(i64::from(item.statistics.failed))
        .bind(i64::from(item.statistics.skipped))
        .bind(item.has_retries)
        .bind(item.retry_of.map(|id| id.to_string()))
        .bind(item.retired)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn mark_launch_retired(&mut self, launch_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("UPDATE launches SET retired = 1, updated_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(launch_id.to_string())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::LaunchNotFound(launch_id));
        }

        Ok(())
    }

    async fn retire_launch_items(&mut self, launch_id: Uuid) -> DomainResult<u64> {
        let result = sqlx::query("UPDATE test_items SET retired = 1 WHERE launch_id = ? AND retired = 0")
            .bind(launch_id.to_string())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DomainResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_launch(conn: &mut SqliteConnection, id: Uuid) -> DomainResult<Option<Launch>> {
    let row: Option<LaunchRow> = sqlx::query_as(&format!("SELECT {LAUNCH_COLUMNS} FROM launches WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| r.try_into()).transpose()
}

fn counter(value: i64, column: &str) -> DomainResult<u32> {
    u32::try_from(value).map_err(|_| DomainError::SerializationError(format!("Invalid {column}: {value}")))
}

fn statistics(total: i64, passed: i64, failed: i64, skipped: i64) -> DomainResult<Statistics> {
    Ok(Statistics {
        total: counter(total, "total")?,
        passed: counter(passed, "passed")?,
        failed: counter(failed, "failed")?,
        skipped: counter(skipped, "skipped")?,
    })
}

fn parse_status(s: &str) -> DomainResult<ItemStatus> {
    ItemStatus::from_str(s).ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {s}")))
}

#[derive(sqlx::FromRow)]
struct LaunchRow {
    id: String,
    project: String,
    name: String,
    number: i64,
    description: Option<String>,
    mode: String,
    status: String,
    start_time: String,
    end_time: Option<String>,
    attributes: Option<String>,
    total: i64,
    passed: i64,
    failed: i64,
    skipped: i64,
    retired: bool,
}

impl TryFrom<LaunchRow> for Launch {
    type Error = DomainError;

    fn try_from(row: LaunchRow) -> Result<Self, Self::Error> {
        let mode = LaunchMode::from_str(&row.mode)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid launch mode: {}", row.mode)))?;

        Ok(Launch {
            id: parse_uuid(&row.id)?,
            project: row.project,
            name: row.name,
            number: row.number,
            description: row.description,
            mode,
            status: parse_status(&row.status)?,
            start_time: parse_datetime(&row.start_time)?,
            end_time: parse_optional_datetime(row.end_time)?,
            attributes: parse_json_or_default(row.attributes)?,
            statistics: statistics(row.total, row.passed, row.failed, row.skipped)?,
            retired: row.retired,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    launch_id: String,
    parent_id: Option<String>,
    name: String,
    item_type: String,
    status: String,
    start_time: String,
    end_time: Option<String>,
    description: Option<String>,
    unique_id: Option<String>,
    code_ref: Option<String>,
    parameters: Option<String>,
    attributes: Option<String>,
    path: String,
    position: i64,
    total: i64,
    passed: i64,
    failed: i64,
    skipped: i64,
    has_retries: bool,
    retry_of: Option<String>,
    retired: bool,
}

impl TryFrom<ItemRow> for TestItem {
    type Error = DomainError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let item_type = ItemType::from_str(&row.item_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid item type: {}", row.item_type)))?;

        Ok(TestItem {
            id: parse_uuid(&row.id)?,
            launch_id: parse_uuid(&row.launch_id)?,
            parent_id: parse_optional_uuid(row.parent_id)?,
            name: row.name,
            item_type,
            status: parse_status(&row.status)?,
            start_time: parse_datetime(&row.start_time)?,
            end_time: parse_optional_datetime(row.end_time)?,
            description: row.description,
            unique_id: row.unique_id,
            code_ref: row.code_ref,
            parameters: parse_json_or_default(row.parameters)?,
            attributes: parse_json_or_default(row.attributes)?,
            path: row.path,
            position: row.position,
            statistics: statistics(row.total, row.passed, row.failed, row.skipped)?,
            has_retries: row.has_retries,
            retry_of: parse_optional_uuid(row.retry_of)?,
            retired: row.retired,
        })
    }
}
