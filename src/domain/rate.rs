// ==========================================
// 关税归类引擎 - 税率结果
// ==========================================
// RateResult: 引擎对外输出
// PartialRate: 单一数据源提供的部分字段，按优先级合并
// ==========================================

use crate::domain::measure::Measure;
use crate::domain::types::DataSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单一数据源返回的部分税率信息
///
/// 所有字段可选：None 表示“该来源未提供”，合并时不覆盖其他来源。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRate {
    pub duty_rate: Option<f64>,
    pub third_country_duty: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
    pub countervailing_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub goods_description: Option<String>,
    pub goods_description_cn: Option<String>,
    pub measures: Option<Vec<Measure>>,
}

impl PartialRate {
    /// 是否至少提供了一个字段
    pub fn is_empty(&self) -> bool {
        self.duty_rate.is_none()
            && self.third_country_duty.is_none()
            && self.anti_dumping_rate.is_none()
            && self.countervailing_rate.is_none()
            && self.vat_rate.is_none()
            && self.goods_description.is_none()
            && self.goods_description_cn.is_none()
            && self.measures.is_none()
    }
}

/// 税率查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResult {
    /// 8 位 CN 编码
    pub hs_code: String,
    /// 10 位 TARIC 编码
    pub hs_code10: String,
    pub origin_country_code: Option<String>,
    /// 适用税率（有原产地优惠时取优惠税率，否则为第三国税率）
    pub duty_rate: Option<f64>,
    /// 第三国（最惠国）税率
    pub third_country_duty: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
    pub countervailing_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub goods_description: Option<String>,
    pub goods_description_cn: Option<String>,
    /// 最高可信度的贡献来源
    pub data_source: DataSource,
    /// 所有贡献过字段的来源（按合并顺序）
    pub sources: Vec<DataSource>,
    pub measures: Vec<Measure>,
    pub total_measures: usize,
    pub query_time: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
    /// 降级说明（例如远程 API 不可用时使用本地数据）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// 批量查询中单个编码的失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLookupError {
    pub code: String,
    pub error: String,
}

/// 批量查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLookupResult {
    pub results: Vec<RateResult>,
    pub errors: Vec<BatchLookupError>,
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
}
