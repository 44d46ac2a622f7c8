// ==========================================
// 关税归类引擎 - 本地税率镜像仓储
// ==========================================
// 表: tariff_rates
// 唯一键: (hs_code10, origin_country_code)，origin_country_code = '' 表示适用所有国家
// 写入方: 批量同步管道 / lookup_v2(persist)
// ==========================================

use crate::domain::measure::Measure;
use crate::domain::tariff::{Paged, TariffRate, TariffRateQuery, UpsertStats};
use crate::domain::types::DataSource;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SELECT_COLUMNS: &str = r#"
    id, hs_code, hs_code10, origin_country_code,
    duty_rate, third_country_duty, anti_dumping_rate, countervailing_rate, vat_rate,
    goods_description, goods_description_cn, data_source, measures_json,
    taric_version, last_sync_time, is_active
"#;

pub struct TariffRateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TariffRateRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        // best-effort: 建表失败不阻塞启动
        if let Err(e) = repo.ensure_tables() {
            warn!("tariff_rates ensure failed: {}", e);
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
            CREATE TABLE IF NOT EXISTS tariff_rates (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              hs_code TEXT NOT NULL,
              hs_code10 TEXT NOT NULL,
              origin_country_code TEXT NOT NULL DEFAULT '',
              duty_rate REAL,
              third_country_duty REAL,
              anti_dumping_rate REAL,
              countervailing_rate REAL,
              vat_rate REAL,
              goods_description TEXT,
              goods_description_cn TEXT,
              data_source TEXT NOT NULL DEFAULT 'local_database',
              measures_json TEXT NOT NULL DEFAULT '[]',
              taric_version TEXT,
              last_sync_time TEXT NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at TEXT NOT NULL DEFAULT (datetime('now')),
              updated_at TEXT NOT NULL DEFAULT (datetime('now')),
              UNIQUE (hs_code10, origin_country_code)
            );

            CREATE INDEX IF NOT EXISTS idx_tariff_rates_hs_code
              ON tariff_rates(hs_code);
            CREATE INDEX IF NOT EXISTS idx_tariff_rates_origin
              ON tariff_rates(origin_country_code, is_active);
            "#,
        )?;
        Ok(())
    }

    /// 按编码 + 原产国查找；原产国专属行优先，其次 erga omnes 行
    pub fn find_by_code_origin(
        &self,
        hs_code10: &str,
        origin: Option<&str>,
    ) -> RepositoryResult<Option<TariffRate>> {
        let conn = self.get_conn()?;
        let origin = origin_key(origin);
        let sql = format!(
            r#"
            SELECT {}
            FROM tariff_rates
            WHERE hs_code10 = ?1
              AND origin_country_code IN (?2, '')
              AND is_active = 1
            ORDER BY CASE WHEN origin_country_code = ?2 THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        conn.query_row(&sql, params![hs_code10, origin], map_tariff_row)
            .optional()
            .map_err(|e| e.into())
    }

    /// 前缀下的全部有效编码（每个编码一行，原产国专属行优先）
    pub fn find_by_prefix(
        &self,
        prefix: &str,
        origin: Option<&str>,
    ) -> RepositoryResult<Vec<TariffRate>> {
        let conn = self.get_conn()?;
        let origin = origin_key(origin);
        let sql = format!(
            r#"
            SELECT {}
            FROM tariff_rates
            WHERE hs_code10 LIKE ?1 || '%'
              AND origin_country_code IN (?2, '')
              AND is_active = 1
            ORDER BY hs_code10 ASC,
                     CASE WHEN origin_country_code = ?2 THEN 0 ELSE 1 END
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![prefix, origin], map_tariff_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out: Vec<TariffRate> = Vec::with_capacity(rows.len());
        for row in rows {
            if out.last().map(|r| r.hs_code10 == row.hs_code10).unwrap_or(false) {
                continue;
            }
            out.push(row);
        }
        Ok(out)
    }

    /// 过滤 + 分页查询
    pub fn query(&self, query: &TariffRateQuery) -> RepositoryResult<Paged<TariffRate>> {
        let conn = self.get_conn()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(prefix) = query.code_prefix.as_ref().filter(|p| !p.is_empty()) {
            conditions.push("hs_code10 LIKE ? || '%'");
            params.push(Box::new(prefix.clone()));
        }
        if let Some(origin) = query.origin_country_code.as_ref() {
            conditions.push("origin_country_code = ?");
            params.push(Box::new(origin.trim().to_uppercase()));
        }
        if let Some(active) = query.is_active {
            conditions.push("is_active = ?");
            params.push(Box::new(active as i32));
        }
        if let Some(min) = query.min_duty_rate {
            conditions.push("duty_rate >= ?");
            params.push(Box::new(min));
        }
        if let Some(max) = query.max_duty_rate {
            conditions.push("duty_rate <= ?");
            params.push(Box::new(max));
        }
        if let Some(text) = query.text.as_ref().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            conditions.push(
                "(goods_description LIKE ? OR goods_description_cn LIKE ? OR hs_code10 LIKE ?)",
            );
            let pattern = format!("%{}%", text);
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
            params.push(Box::new(format!("{}%", text)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tariff_rates {}", where_clause),
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;

        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let offset = (page as i64 - 1) * page_size as i64;

        let sql = format!(
            "SELECT {} FROM tariff_rates {} ORDER BY hs_code10 ASC, origin_country_code ASC LIMIT {} OFFSET {}",
            SELECT_COLUMNS, where_clause, page_size, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), map_tariff_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(total = total, page = page, page_size = page_size, "本地税率查询完成");
        Ok(Paged {
            items,
            total,
            page,
            page_size,
        })
    }

    /// 批量 upsert（单事务；单行失败计入 failed，不中断批次）
    pub fn upsert_batch(&self, rows: &[TariffRate]) -> RepositoryResult<UpsertStats> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut stats = UpsertStats::default();
        for row in rows {
            match upsert_row(&tx, row) {
                Ok(true) => stats.inserted += 1,
                Ok(false) => stats.updated += 1,
                Err(e) => {
                    warn!(hs_code10 = %row.hs_code10, origin = %row.origin_country_code, error = %e, "税率行写入失败");
                    stats.failed += 1;
                }
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(stats)
    }

    /// 单行 upsert，返回是否为新插入
    pub fn upsert_one(&self, row: &TariffRate) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        upsert_row(&conn, row)
    }

    /// erga omnes 行的描述索引: hs_code10 → (英文, 中文)
    pub fn load_description_index(
        &self,
    ) -> RepositoryResult<HashMap<String, (Option<String>, Option<String>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT hs_code10, goods_description, goods_description_cn
             FROM tariff_rates WHERE origin_country_code = ''",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, Option<String>>(1)?, row.get::<_, Option<String>>(2)?),
            ))
        })?;

        let mut index = HashMap::new();
        for row in rows {
            let (code, descriptions) = row?;
            index.insert(code, descriptions);
        }
        Ok(index)
    }

    pub fn count_active(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tariff_rates WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn origin_key(origin: Option<&str>) -> String {
    origin.map(|o| o.trim().to_uppercase()).unwrap_or_default()
}

/// 写入单行，返回 true 表示插入、false 表示更新
fn upsert_row(conn: &Connection, row: &TariffRate) -> RepositoryResult<bool> {
    let measures_json = serde_json::to_string(&row.measures)?;
    let origin = row.origin_country_code.trim().to_uppercase();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM tariff_rates WHERE hs_code10 = ?1 AND origin_country_code = ?2",
            params![row.hs_code10, origin],
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                r#"
                UPDATE tariff_rates SET
                  hs_code = ?1,
                  duty_rate = ?2,
                  third_country_duty = ?3,
                  anti_dumping_rate = ?4,
                  countervailing_rate = ?5,
                  vat_rate = ?6,
                  goods_description = ?7,
                  goods_description_cn = COALESCE(?8, goods_description_cn),
                  data_source = ?9,
                  measures_json = ?10,
                  taric_version = ?11,
                  last_sync_time = ?12,
                  is_active = ?13,
                  updated_at = datetime('now')
                WHERE id = ?14
                "#,
                params![
                    row.hs_code,
                    row.duty_rate,
                    row.third_country_duty,
                    row.anti_dumping_rate,
                    row.countervailing_rate,
                    row.vat_rate,
                    row.goods_description,
                    row.goods_description_cn,
                    row.data_source.as_str(),
                    measures_json,
                    row.taric_version,
                    row.last_sync_time,
                    row.is_active,
                    id
                ],
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                r#"
                INSERT INTO tariff_rates (
                  hs_code, hs_code10, origin_country_code,
                  duty_rate, third_country_duty, anti_dumping_rate, countervailing_rate, vat_rate,
                  goods_description, goods_description_cn, data_source, measures_json,
                  taric_version, last_sync_time, is_active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    row.hs_code,
                    row.hs_code10,
                    origin,
                    row.duty_rate,
                    row.third_country_duty,
                    row.anti_dumping_rate,
                    row.countervailing_rate,
                    row.vat_rate,
                    row.goods_description,
                    row.goods_description_cn,
                    row.data_source.as_str(),
                    measures_json,
                    row.taric_version,
                    row.last_sync_time,
                    row.is_active
                ],
            )?;
            Ok(true)
        }
    }
}

fn map_tariff_row(row: &Row) -> rusqlite::Result<TariffRate> {
    let measures_json: String = row.get(12)?;
    let measures: Vec<Measure> = serde_json::from_str(&measures_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let data_source: String = row.get(11)?;
    let last_sync_time: DateTime<Utc> = row.get(14)?;

    Ok(TariffRate {
        id: row.get(0)?,
        hs_code: row.get(1)?,
        hs_code10: row.get(2)?,
        origin_country_code: row.get(3)?,
        duty_rate: row.get(4)?,
        third_country_duty: row.get(5)?,
        anti_dumping_rate: row.get(6)?,
        countervailing_rate: row.get(7)?,
        vat_rate: row.get(8)?,
        goods_description: row.get(9)?,
        goods_description_cn: row.get(10)?,
        data_source: DataSource::from_str(&data_source),
        measures,
        taric_version: row.get(13)?,
        last_sync_time,
        is_active: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> TariffRateRepository {
        let conn = Connection::open_in_memory().unwrap();
        TariffRateRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn rate(code10: &str, origin: &str, duty: f64) -> TariffRate {
        TariffRate {
            id: None,
            hs_code: code10[..8].to_string(),
            hs_code10: code10.to_string(),
            origin_country_code: origin.to_string(),
            duty_rate: Some(duty),
            third_country_duty: Some(duty),
            anti_dumping_rate: None,
            countervailing_rate: None,
            vat_rate: Some(20.0),
            goods_description: Some(format!("goods {}", code10)),
            goods_description_cn: None,
            data_source: DataSource::LocalDatabase,
            measures: Vec::new(),
            taric_version: Some("2024-01".to_string()),
            last_sync_time: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn test_corrupt_measures_surface_as_serialization_error() {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let repo = TariffRateRepository::new(conn.clone());
        repo.upsert_one(&rate("8471300000", "", 0.0)).unwrap();
        conn.lock()
            .unwrap()
            .execute("UPDATE tariff_rates SET measures_json = '{broken'", [])
            .unwrap();

        let err = repo.find_by_code_origin("8471300000", None).unwrap_err();
        assert!(matches!(err, RepositoryError::SerializationError { .. }));
    }

    #[test]
    fn test_upsert_counts_inserts_and_updates() {
        let repo = repo();
        let stats = repo
            .upsert_batch(&[rate("8471300000", "", 0.0), rate("8471410000", "", 0.0)])
            .unwrap();
        assert_eq!(stats, UpsertStats { inserted: 2, updated: 0, failed: 0 });

        let stats = repo.upsert_batch(&[rate("8471300000", "", 1.5)]).unwrap();
        assert_eq!(stats, UpsertStats { inserted: 0, updated: 1, failed: 0 });
        assert_eq!(repo.count_active().unwrap(), 2);
    }

    #[test]
    fn test_origin_row_preferred_over_erga_omnes() {
        let repo = repo();
        let mut cn = rate("7318150000", "CN", 3.7);
        cn.anti_dumping_rate = Some(85.0);
        repo.upsert_batch(&[rate("7318150000", "", 3.7), cn]).unwrap();

        let found = repo.find_by_code_origin("7318150000", Some("cn")).unwrap().unwrap();
        assert_eq!(found.anti_dumping_rate, Some(85.0));

        let found = repo.find_by_code_origin("7318150000", Some("US")).unwrap().unwrap();
        assert_eq!(found.origin_country_code, "");

        let by_prefix = repo.find_by_prefix("7318", Some("CN")).unwrap();
        assert_eq!(by_prefix.len(), 1);
        assert_eq!(by_prefix[0].origin_country_code, "CN");
    }

    #[test]
    fn test_query_filters_and_paginates() {
        let repo = repo();
        let rows: Vec<TariffRate> = (0..5)
            .map(|i| rate(&format!("84713000{:02}", i), "", i as f64))
            .collect();
        repo.upsert_batch(&rows).unwrap();

        let page = repo
            .query(&TariffRateQuery {
                code_prefix: Some("8471".to_string()),
                min_duty_rate: Some(1.0),
                page: 1,
                page_size: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages(), 2);
        assert_eq!(page.items[0].hs_code10, "8471300001");
    }
}
