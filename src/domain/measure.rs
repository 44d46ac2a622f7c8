// ==========================================
// 关税归类引擎 - 贸易措施
// ==========================================
// 一条措施 = 一条贸易政策规则（关税/反倾销/增值税/配额等）
// 由关系图解析器从 JSON:API 载荷中展开得到，不落库
// ==========================================

use serde::{Deserialize, Serialize};

/// 已展开的贸易措施
///
/// 关系目标缺失时对应字段为 None，解析不会失败。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub measure_id: String,
    pub measure_type_id: Option<String>,
    pub measure_type_description: Option<String>,
    pub geographical_area_id: Option<String>,
    pub geographical_area_description: Option<String>,
    /// 格式化后的税率表达式（可能包含 HTML 标签），如 `<span>2.00</span> %`
    pub duty_expression: Option<String>,
    pub effective_start: Option<String>,
    pub effective_end: Option<String>,
}

impl Measure {
    /// 措施类型代码是否在给定列表中
    pub fn has_type(&self, type_ids: &[&str]) -> bool {
        self.measure_type_id
            .as_deref()
            .map(|id| type_ids.contains(&id))
            .unwrap_or(false)
    }

    /// 措施类型描述是否包含关键字（大小写不敏感）
    pub fn description_contains(&self, needle: &str) -> bool {
        self.measure_type_description
            .as_deref()
            .map(|d| d.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn area_is(&self, area_id: &str) -> bool {
        self.geographical_area_id.as_deref() == Some(area_id)
    }
}
