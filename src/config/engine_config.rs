// ==========================================
// 关税归类引擎 - 引擎配置
// ==========================================
// 职责: 汇总引擎运行期常量（上游地址/超时/缓存 TTL/批量参数/增值税策略）
// 读取: EngineConfigReader（默认实现为 ConfigManager，读 config_kv 表）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

/// 上游归类接口默认地址
pub const DEFAULT_API_BASE_URL: &str = "https://www.trade-tariff.service.gov.uk/api/v2/";

/// 默认翻译接口地址
pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    // ===== 上游接口 =====
    pub api_base_url: String,
    pub http_timeout_ms: u64,

    // ===== 翻译 =====
    pub translate_endpoint: String,
    pub translate_timeout_ms: u64,
    pub translate_source_lang: String,
    pub translate_target_lang: String,
    pub translate_enabled: bool,

    // ===== 缓存 TTL（秒） =====
    pub rate_ttl_secs: u64,
    pub validation_ttl_secs: u64,
    pub hierarchy_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub declarable_ttl_secs: u64,
    pub countries_ttl_secs: u64,

    // ===== 批量查询 =====
    pub batch_concurrency: usize,
    pub batch_delay_ms: u64,

    // ===== 同步 =====
    pub upsert_batch_size: usize,
    pub translation_batch_size: usize,

    // ===== 税率策略 =====
    pub standard_vat_rate: f64,

    // ===== 分页 =====
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout_ms: 10_000,
            translate_endpoint: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            translate_timeout_ms: 10_000,
            translate_source_lang: "en".to_string(),
            translate_target_lang: "zh-CN".to_string(),
            translate_enabled: true,
            rate_ttl_secs: 3_600,
            validation_ttl_secs: 3_600,
            hierarchy_ttl_secs: 1_800,
            search_ttl_secs: 600,
            declarable_ttl_secs: 1_800,
            countries_ttl_secs: 7 * 24 * 3_600,
            batch_concurrency: 3,
            batch_delay_ms: 300,
            upsert_batch_size: 500,
            translation_batch_size: 50,
            standard_vat_rate: 20.0,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_millis(self.translate_timeout_ms)
    }

    pub fn rate_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_ttl_secs)
    }

    pub fn validation_ttl(&self) -> Duration {
        Duration::from_secs(self.validation_ttl_secs)
    }

    pub fn hierarchy_ttl(&self) -> Duration {
        Duration::from_secs(self.hierarchy_ttl_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn declarable_ttl(&self) -> Duration {
        Duration::from_secs(self.declarable_ttl_secs)
    }

    pub fn countries_ttl(&self) -> Duration {
        Duration::from_secs(self.countries_ttl_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// 规范化分页参数: page 从 1 开始，page_size 限制在 [1, max_page_size]
    pub fn clamp_page(&self, page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1));
        (page, page_size)
    }
}

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 用途: 引擎装配时读取配置
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait EngineConfigReader: Send + Sync {
    /// 读取完整引擎配置（缺失键回落到默认值）
    async fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>>;

    /// 增值税标准税率
    ///
    /// # 默认值
    /// - 20.0
    async fn get_standard_vat_rate(&self) -> Result<f64, Box<dyn Error>>;
}
