// ==========================================
// 关税归类引擎 - 校验 / 层级 / 候选 结构
// ==========================================

use crate::domain::rate::RateResult;
use crate::domain::types::{ClassificationLevel, MatchStatus};
use serde::{Deserialize, Serialize};

/// 面包屑节点（章 → 查询层级）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbEntry {
    pub code: String,
    pub level: ClassificationLevel,
    pub description: Option<String>,
}

/// 相似/候选编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateCode {
    pub code: String,
    pub description: Option<String>,
    pub score: u32,
}

/// 编码校验结果
///
/// 校验类问题（长度不足、编码不存在）通过 `error` 字段返回，不抛错。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub input_code: String,
    pub normalized_code: String,
    pub is_valid: bool,
    pub is_declarable: bool,
    pub level: Option<ClassificationLevel>,
    pub has_children: bool,
    pub child_count: usize,
    pub declarable_count: usize,
    pub description: Option<String>,
    pub description_cn: Option<String>,
    pub parent_code: Option<String>,
    pub parent_description: Option<String>,
    pub breadcrumb: Vec<BreadcrumbEntry>,
    pub similar_codes: Vec<CandidateCode>,
    pub error: Option<String>,
    pub warning: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl ValidationResult {
    /// 空白结果（is_valid = false）
    pub fn empty(input_code: &str, normalized_code: &str) -> Self {
        Self {
            input_code: input_code.to_string(),
            normalized_code: normalized_code.to_string(),
            is_valid: false,
            is_declarable: false,
            level: None,
            has_children: false,
            child_count: 0,
            declarable_count: 0,
            description: None,
            description_cn: None,
            parent_code: None,
            parent_description: None,
            breadcrumb: Vec::new(),
            similar_codes: Vec::new(),
            error: None,
            warning: None,
            from_cache: false,
        }
    }

    /// 三态匹配结果
    pub fn match_status(&self) -> MatchStatus {
        match (self.is_valid, self.is_declarable) {
            (true, true) => MatchStatus::Exact,
            (true, false) => MatchStatus::ParentNode,
            (false, _) => MatchStatus::NotFound,
        }
    }
}

/// 可申报编码（附本地税率）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarableCode {
    pub code: String,
    pub description: Option<String>,
    pub description_cn: Option<String>,
    pub duty_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
    pub countervailing_rate: Option<f64>,
}

impl DeclarableCode {
    pub fn new(code: &str, description: Option<String>) -> Self {
        Self {
            code: code.to_string(),
            description,
            description_cn: None,
            duty_rate: None,
            vat_rate: None,
            anti_dumping_rate: None,
            countervailing_rate: None,
        }
    }
}

/// 类（Section）元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInfo {
    pub id: String,
    pub numeral: Option<String>,
    pub title: Option<String>,
}

/// 层级节点摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub code: String,
    pub level: ClassificationLevel,
    pub description: Option<String>,
    pub description_cn: Option<String>,
    pub declarable: bool,
}

/// 按直接父节点分组的可申报编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyGroup {
    pub parent_code: String,
    pub parent_description: Option<String>,
    pub children: Vec<DeclarableCode>,
}

/// 层级树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyTree {
    pub prefix: String,
    pub level: ClassificationLevel,
    pub origin_country_code: Option<String>,
    pub section: Option<SectionInfo>,
    pub node: Option<NodeSummary>,
    pub breadcrumb: Vec<BreadcrumbEntry>,
    /// 章级查询时为下属品目列表
    pub headings: Vec<NodeSummary>,
    /// 品目及以下查询时为分组后的可申报编码
    pub groups: Vec<HierarchyGroup>,
    pub total_declarable: usize,
    #[serde(default)]
    pub from_cache: bool,
}

/// 第二版查询结果（带三态匹配与候选）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaricLookupV2Result {
    pub input_code: String,
    pub normalized_code: String,
    pub match_status: MatchStatus,
    pub validation: ValidationResult,
    pub rate: Option<RateResult>,
    /// parent_node 时为下属可申报编码
    pub children: Vec<DeclarableCode>,
    /// not_found 时的候选（按得分降序，最多 10 个）
    pub candidates: Vec<CandidateCode>,
    pub persisted: bool,
    pub warning: Option<String>,
}

/// 描述搜索命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub hs_code10: String,
    pub origin_country_code: Option<String>,
    pub goods_description: Option<String>,
    pub goods_description_cn: Option<String>,
    pub duty_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub anti_dumping_rate: Option<f64>,
}

/// 描述搜索结果（分页）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: String,
    pub items: Vec<SearchHit>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub from_cache: bool,
}

/// 原产国/地区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryCode {
    pub code: String,
    pub description: Option<String>,
}
