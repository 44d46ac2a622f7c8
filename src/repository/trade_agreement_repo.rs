// ==========================================
// 关税归类引擎 - 贸易协定元数据仓储
// ==========================================
// 表: trade_agreements
// 来源: 同步时从优惠税率行聚合得到
// ==========================================

use crate::domain::tariff::TradeAgreement;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct TradeAgreementRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TradeAgreementRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        if let Err(e) = repo.ensure_tables() {
            tracing::warn!("trade_agreements ensure failed: {}", e);
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
            CREATE TABLE IF NOT EXISTS trade_agreements (
              agreement_code TEXT NOT NULL,
              origin_code TEXT NOT NULL,
              origin_name TEXT,
              measure_type_code TEXT NOT NULL,
              legal_base TEXT,
              code_count INTEGER NOT NULL DEFAULT 0,
              taric_version TEXT,
              updated_at TEXT NOT NULL DEFAULT (datetime('now')),
              PRIMARY KEY (agreement_code, origin_code, measure_type_code)
            );
            "#,
        )?;
        Ok(())
    }

    /// 批量 upsert，返回写入条数
    pub fn upsert_batch(&self, agreements: &[TradeAgreement]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut written = 0;
        for a in agreements {
            written += tx.execute(
                r#"
                INSERT INTO trade_agreements (
                  agreement_code, origin_code, origin_name, measure_type_code,
                  legal_base, code_count, taric_version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(agreement_code, origin_code, measure_type_code) DO UPDATE SET
                  origin_name = COALESCE(excluded.origin_name, origin_name),
                  legal_base = COALESCE(excluded.legal_base, legal_base),
                  code_count = excluded.code_count,
                  taric_version = excluded.taric_version,
                  updated_at = datetime('now')
                "#,
                params![
                    a.agreement_code,
                    a.origin_code,
                    a.origin_name,
                    a.measure_type_code,
                    a.legal_base,
                    a.code_count,
                    a.taric_version
                ],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(written)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<TradeAgreement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT agreement_code, origin_code, origin_name, measure_type_code,
                   legal_base, code_count, taric_version
            FROM trade_agreements
            ORDER BY origin_code ASC, agreement_code ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TradeAgreement {
                    agreement_code: row.get(0)?,
                    origin_code: row.get(1)?,
                    origin_name: row.get(2)?,
                    measure_type_code: row.get(3)?,
                    legal_base: row.get(4)?,
                    code_count: row.get(5)?,
                    taric_version: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
