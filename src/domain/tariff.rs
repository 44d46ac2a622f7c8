// ==========================================
// 关税归类引擎 - 本地镜像 / 覆盖表 实体
// ==========================================
// tariff_rates: 远程归类数据的本地非规范化副本（仅同步管道写入）
// china_anti_dumping_rates: 按原产国的反倾销覆盖数据
// trade_agreements: 同步时从优惠税率行提取的协定元数据
// ==========================================

use crate::domain::measure::Measure;
use crate::domain::types::DataSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 本地镜像税率行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffRate {
    pub id: Option<i64>,
    pub hs_code: String,
    pub hs_code10: String,
    /// 空字符串表示适用于所有原产地
    pub origin_country_code: String,
    pub duty_rate: Option<f64>,
    pub third_country_duty: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
    pub countervailing_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub goods_description: Option<String>,
    pub goods_description_cn: Option<String>,
    pub data_source: DataSource,
    pub measures: Vec<Measure>,
    pub taric_version: Option<String>,
    pub last_sync_time: DateTime<Utc>,
    pub is_active: bool,
}

/// 反倾销覆盖行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiDumpingOverride {
    pub id: Option<i64>,
    /// 可为任意长度前缀（按最长前缀匹配）
    pub hs_code: String,
    pub origin_country_code: String,
    pub duty_rate: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
    pub countervailing_rate: Option<f64>,
    pub goods_description: Option<String>,
    pub goods_description_cn: Option<String>,
    pub is_active: bool,
}

/// 贸易协定元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAgreement {
    pub agreement_code: String,
    pub origin_code: String,
    pub origin_name: Option<String>,
    pub measure_type_code: String,
    pub legal_base: Option<String>,
    pub code_count: i64,
    pub taric_version: Option<String>,
}

/// 本地镜像查询过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffRateQuery {
    pub code_prefix: Option<String>,
    pub origin_country_code: Option<String>,
    pub is_active: Option<bool>,
    pub min_duty_rate: Option<f64>,
    pub max_duty_rate: Option<f64>,
    /// 在英文/中文描述中模糊搜索
    pub text: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paged<T> {
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        ((self.total.max(0) as u64 + self.page_size as u64 - 1) / self.page_size as u64) as u32
    }
}

/// 批量写入统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl UpsertStats {
    pub fn absorb(&mut self, other: UpsertStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}
