// ==========================================
// 关税归类引擎 - 反倾销覆盖表仓储
// ==========================================
// 表: china_anti_dumping_rates
// 匹配规则: 同一原产国下，取 hs_code 为查询编码前缀的最长一条
// ==========================================

use crate::domain::tariff::AntiDumpingOverride;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AntiDumpingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AntiDumpingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        if let Err(e) = repo.ensure_tables() {
            tracing::warn!("china_anti_dumping_rates ensure failed: {}", e);
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
            CREATE TABLE IF NOT EXISTS china_anti_dumping_rates (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              hs_code TEXT NOT NULL,
              origin_country_code TEXT NOT NULL,
              duty_rate REAL,
              anti_dumping_rate REAL,
              countervailing_rate REAL,
              goods_description TEXT,
              goods_description_cn TEXT,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at TEXT NOT NULL DEFAULT (datetime('now')),
              updated_at TEXT NOT NULL DEFAULT (datetime('now')),
              UNIQUE (hs_code, origin_country_code)
            );

            CREATE INDEX IF NOT EXISTS idx_anti_dumping_origin
              ON china_anti_dumping_rates(origin_country_code, is_active);
            "#,
        )?;
        Ok(())
    }

    /// 最长前缀匹配
    pub fn find_best_match(
        &self,
        hs_code10: &str,
        origin: &str,
    ) -> RepositoryResult<Option<AntiDumpingOverride>> {
        let conn = self.get_conn()?;
        conn.query_row(
            r#"
            SELECT id, hs_code, origin_country_code, duty_rate, anti_dumping_rate,
                   countervailing_rate, goods_description, goods_description_cn, is_active
            FROM china_anti_dumping_rates
            WHERE origin_country_code = ?2
              AND is_active = 1
              AND ?1 LIKE hs_code || '%'
            ORDER BY LENGTH(hs_code) DESC
            LIMIT 1
            "#,
            params![hs_code10, origin.trim().to_uppercase()],
            map_override_row,
        )
        .optional()
        .map_err(|e| e.into())
    }

    /// 新增或更新（按 hs_code + 原产国），返回记录 id
    pub fn upsert(&self, record: &AntiDumpingOverride) -> RepositoryResult<i64> {
        let hs_code: String = record.hs_code.chars().filter(|c| c.is_ascii_digit()).collect();
        if hs_code.len() < 2 {
            return Err(RepositoryError::FieldValueError {
                field: "hs_code".to_string(),
                message: format!("至少 2 位数字: {}", record.hs_code),
            });
        }
        let origin = record.origin_country_code.trim().to_uppercase();
        if origin.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "origin_country_code".to_string(),
                message: "原产国不能为空".to_string(),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO china_anti_dumping_rates (
              hs_code, origin_country_code, duty_rate, anti_dumping_rate, countervailing_rate,
              goods_description, goods_description_cn, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(hs_code, origin_country_code) DO UPDATE SET
              duty_rate = excluded.duty_rate,
              anti_dumping_rate = excluded.anti_dumping_rate,
              countervailing_rate = excluded.countervailing_rate,
              goods_description = excluded.goods_description,
              goods_description_cn = excluded.goods_description_cn,
              is_active = excluded.is_active,
              updated_at = datetime('now')
            "#,
            params![
                hs_code,
                origin,
                record.duty_rate,
                record.anti_dumping_rate,
                record.countervailing_rate,
                record.goods_description,
                record.goods_description_cn,
                record.is_active
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM china_anti_dumping_rates WHERE hs_code = ?1 AND origin_country_code = ?2",
            params![hs_code, origin],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn list_by_origin(&self, origin: &str) -> RepositoryResult<Vec<AntiDumpingOverride>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, hs_code, origin_country_code, duty_rate, anti_dumping_rate,
                   countervailing_rate, goods_description, goods_description_cn, is_active
            FROM china_anti_dumping_rates
            WHERE origin_country_code = ?1
            ORDER BY hs_code ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![origin.trim().to_uppercase()], map_override_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_override_row(row: &Row) -> rusqlite::Result<AntiDumpingOverride> {
    Ok(AntiDumpingOverride {
        id: row.get(0)?,
        hs_code: row.get(1)?,
        origin_country_code: row.get(2)?,
        duty_rate: row.get(3)?,
        anti_dumping_rate: row.get(4)?,
        countervailing_rate: row.get(5)?,
        goods_description: row.get(6)?,
        goods_description_cn: row.get(7)?,
        is_active: row.get(8)?,
    })
}
