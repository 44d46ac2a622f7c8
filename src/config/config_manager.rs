// ==========================================
// 关税归类引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config::{EngineConfig, EngineConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            conn_guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS config_kv (
                  scope_id TEXT NOT NULL DEFAULT 'global',
                  key TEXT NOT NULL,
                  value TEXT NOT NULL,
                  updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                  PRIMARY KEY (scope_id, key)
                );
                "#,
            )?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析配置值；格式错误时告警并回落到默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + ToString,
    {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有 global 配置（用于 CLI 展示）
    pub fn get_all_global(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }
}

// ==========================================
// EngineConfigReader Trait 实现
// ==========================================
#[async_trait]
impl EngineConfigReader for ConfigManager {
    async fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let d = EngineConfig::default();
        let standard_vat_rate = self.get_standard_vat_rate().await?;

        let config = EngineConfig {
            api_base_url: self.get_config_or_default(config_keys::API_BASE_URL, &d.api_base_url)?,
            http_timeout_ms: self.get_parsed_or(config_keys::HTTP_TIMEOUT_MS, d.http_timeout_ms)?,
            translate_endpoint: self
                .get_config_or_default(config_keys::TRANSLATE_ENDPOINT, &d.translate_endpoint)?,
            translate_timeout_ms: self
                .get_parsed_or(config_keys::TRANSLATE_TIMEOUT_MS, d.translate_timeout_ms)?,
            translate_source_lang: self
                .get_config_or_default(config_keys::TRANSLATE_SOURCE_LANG, &d.translate_source_lang)?,
            translate_target_lang: self
                .get_config_or_default(config_keys::TRANSLATE_TARGET_LANG, &d.translate_target_lang)?,
            translate_enabled: self.get_parsed_or(config_keys::TRANSLATE_ENABLED, d.translate_enabled)?,
            rate_ttl_secs: self.get_parsed_or(config_keys::RATE_TTL_SECS, d.rate_ttl_secs)?,
            validation_ttl_secs: self
                .get_parsed_or(config_keys::VALIDATION_TTL_SECS, d.validation_ttl_secs)?,
            hierarchy_ttl_secs: self
                .get_parsed_or(config_keys::HIERARCHY_TTL_SECS, d.hierarchy_ttl_secs)?,
            search_ttl_secs: self.get_parsed_or(config_keys::SEARCH_TTL_SECS, d.search_ttl_secs)?,
            declarable_ttl_secs: self
                .get_parsed_or(config_keys::DECLARABLE_TTL_SECS, d.declarable_ttl_secs)?,
            countries_ttl_secs: self
                .get_parsed_or(config_keys::COUNTRIES_TTL_SECS, d.countries_ttl_secs)?,
            batch_concurrency: self
                .get_parsed_or(config_keys::BATCH_CONCURRENCY, d.batch_concurrency)?
                .max(1),
            batch_delay_ms: self.get_parsed_or(config_keys::BATCH_DELAY_MS, d.batch_delay_ms)?,
            upsert_batch_size: self
                .get_parsed_or(config_keys::UPSERT_BATCH_SIZE, d.upsert_batch_size)?
                .max(1),
            translation_batch_size: self
                .get_parsed_or(config_keys::TRANSLATION_BATCH_SIZE, d.translation_batch_size)?
                .max(1),
            standard_vat_rate,
            default_page_size: self
                .get_parsed_or(config_keys::DEFAULT_PAGE_SIZE, d.default_page_size)?,
            max_page_size: self.get_parsed_or(config_keys::MAX_PAGE_SIZE, d.max_page_size)?,
        };

        tracing::debug!(
            api_base_url = %config.api_base_url,
            standard_vat_rate = config.standard_vat_rate,
            batch_concurrency = config.batch_concurrency,
            "引擎配置已加载"
        );
        Ok(config)
    }

    async fn get_standard_vat_rate(&self) -> Result<f64, Box<dyn Error>> {
        let rate = self.get_parsed_or(
            config_keys::STANDARD_VAT_RATE,
            EngineConfig::default().standard_vat_rate,
        )?;
        if rate < 0.0 {
            tracing::warn!(rate = rate, "增值税标准税率为负，使用默认值");
            return Ok(EngineConfig::default().standard_vat_rate);
        }
        Ok(rate)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 上游接口
    pub const API_BASE_URL: &str = "tariff_api_base_url";
    pub const HTTP_TIMEOUT_MS: &str = "tariff_http_timeout_ms";

    // 翻译
    pub const TRANSLATE_ENDPOINT: &str = "translate_endpoint";
    pub const TRANSLATE_TIMEOUT_MS: &str = "translate_timeout_ms";
    pub const TRANSLATE_SOURCE_LANG: &str = "translate_source_lang";
    pub const TRANSLATE_TARGET_LANG: &str = "translate_target_lang";
    pub const TRANSLATE_ENABLED: &str = "translate_enabled";

    // 缓存 TTL
    pub const RATE_TTL_SECS: &str = "cache_rate_ttl_secs";
    pub const VALIDATION_TTL_SECS: &str = "cache_validation_ttl_secs";
    pub const HIERARCHY_TTL_SECS: &str = "cache_hierarchy_ttl_secs";
    pub const SEARCH_TTL_SECS: &str = "cache_search_ttl_secs";
    pub const DECLARABLE_TTL_SECS: &str = "cache_declarable_ttl_secs";
    pub const COUNTRIES_TTL_SECS: &str = "cache_countries_ttl_secs";

    // 批量查询
    pub const BATCH_CONCURRENCY: &str = "batch_lookup_concurrency";
    pub const BATCH_DELAY_MS: &str = "batch_lookup_delay_ms";

    // 同步
    pub const UPSERT_BATCH_SIZE: &str = "sync_upsert_batch_size";
    pub const TRANSLATION_BATCH_SIZE: &str = "sync_translation_batch_size";

    // 税率策略
    pub const STANDARD_VAT_RATE: &str = "standard_vat_rate";

    // 分页
    pub const DEFAULT_PAGE_SIZE: &str = "default_page_size";
    pub const MAX_PAGE_SIZE: &str = "max_page_size";
}
