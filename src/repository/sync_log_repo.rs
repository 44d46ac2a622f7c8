// ==========================================
// 关税归类引擎 - 同步日志仓储
// ==========================================
// 表: tariff_sync_logs
// 状态机: running → completed | failed（终态不可再变）
// 进度只增不减: 写入使用 MAX(progress, ?)
// ==========================================

use crate::domain::sync::SyncLog;
use crate::domain::types::{SyncStatus, SyncType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str = r#"
    id, sync_type, data_source, status, progress, total_records,
    inserted_count, updated_count, failed_count, taric_version,
    error_message, started_at, completed_at
"#;

/// 同步计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub total_records: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub failed_count: i64,
}

pub struct SyncLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SyncLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        if let Err(e) = repo.ensure_tables() {
            tracing::warn!("tariff_sync_logs ensure failed: {}", e);
        }
        repo
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_tables(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tariff_sync_logs (
              id TEXT PRIMARY KEY,
              sync_type TEXT NOT NULL,
              data_source TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'running',
              progress INTEGER NOT NULL DEFAULT 0,
              total_records INTEGER NOT NULL DEFAULT 0,
              inserted_count INTEGER NOT NULL DEFAULT 0,
              updated_count INTEGER NOT NULL DEFAULT 0,
              failed_count INTEGER NOT NULL DEFAULT 0,
              taric_version TEXT,
              error_message TEXT,
              started_at TEXT NOT NULL,
              completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sync_logs_started
              ON tariff_sync_logs(started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_sync_logs_status
              ON tariff_sync_logs(status);
            "#,
        )?;
        Ok(())
    }

    pub fn create(
        &self,
        id: &str,
        sync_type: SyncType,
        data_source: &str,
        taric_version: Option<&str>,
    ) -> RepositoryResult<SyncLog> {
        let started_at = Utc::now();
        {
            let conn = self.get_conn()?;
            conn.execute(
                r#"
                INSERT INTO tariff_sync_logs (id, sync_type, data_source, status, progress, taric_version, started_at)
                VALUES (?1, ?2, ?3, 'running', 0, ?4, ?5)
                "#,
                params![id, sync_type.as_str(), data_source, taric_version, started_at],
            )?;
        }
        self.find_by_id(id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "SyncLog".to_string(),
            id: id.to_string(),
        })
    }

    /// 更新进度（仅 running 状态，且不回退）
    pub fn update_progress(&self, id: &str, progress: u8) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE tariff_sync_logs
            SET progress = MAX(progress, ?2)
            WHERE id = ?1 AND status = 'running'
            "#,
            params![id, progress.min(100)],
        )?;
        Ok(())
    }

    /// 更新计数（不改变状态）
    pub fn update_counts(&self, id: &str, counts: SyncCounts) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE tariff_sync_logs
            SET total_records = ?2, inserted_count = ?3, updated_count = ?4, failed_count = ?5
            WHERE id = ?1 AND status = 'running'
            "#,
            params![
                id,
                counts.total_records,
                counts.inserted_count,
                counts.updated_count,
                counts.failed_count
            ],
        )?;
        Ok(())
    }

    pub fn complete(&self, id: &str, counts: SyncCounts) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE tariff_sync_logs
            SET status = 'completed', progress = 100,
                total_records = ?2, inserted_count = ?3, updated_count = ?4, failed_count = ?5,
                completed_at = ?6
            WHERE id = ?1 AND status = 'running'
            "#,
            params![
                id,
                counts.total_records,
                counts.inserted_count,
                counts.updated_count,
                counts.failed_count,
                Utc::now()
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "RunningSyncLog".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn fail(&self, id: &str, error_message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE tariff_sync_logs
            SET status = 'failed', error_message = ?2, completed_at = ?3
            WHERE id = ?1 AND status = 'running'
            "#,
            params![id, error_message, Utc::now()],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<SyncLog>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tariff_sync_logs WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            map_sync_log_row,
        )
        .optional()
        .map_err(|e| e.into())
    }

    /// 最近一次同步
    pub fn find_latest(&self) -> RepositoryResult<Option<SyncLog>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM tariff_sync_logs ORDER BY started_at DESC, rowid DESC LIMIT 1",
                SELECT_COLUMNS
            ),
            [],
            map_sync_log_row,
        )
        .optional()
        .map_err(|e| e.into())
    }

    /// 历史（按开始时间倒序）
    pub fn list(&self, limit: u32, offset: u32) -> RepositoryResult<Vec<SyncLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tariff_sync_logs ORDER BY started_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit, offset], map_sync_log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM tariff_sync_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// 进程崩溃遗留的 running 记录标记为 failed（启动时调用）
    pub fn fail_stale_running(&self, error_message: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE tariff_sync_logs
            SET status = 'failed', error_message = ?1, completed_at = ?2
            WHERE status = 'running'
            "#,
            params![error_message, Utc::now()],
        )?;
        Ok(affected)
    }
}

fn map_sync_log_row(row: &Row) -> rusqlite::Result<SyncLog> {
    let sync_type: String = row.get(1)?;
    let status: String = row.get(3)?;
    let progress: i64 = row.get(4)?;
    let started_at: DateTime<Utc> = row.get(11)?;
    let completed_at: Option<DateTime<Utc>> = row.get(12)?;

    Ok(SyncLog {
        id: row.get(0)?,
        sync_type: SyncType::from_str(&sync_type),
        data_source: row.get(2)?,
        status: SyncStatus::from_str(&status),
        progress: progress.clamp(0, 100) as u8,
        total_records: row.get(5)?,
        inserted_count: row.get(6)?,
        updated_count: row.get(7)?,
        failed_count: row.get(8)?,
        taric_version: row.get(9)?,
        error_message: row.get(10)?,
        started_at,
        completed_at,
    })
}
