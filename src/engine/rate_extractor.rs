// ==========================================
// 关税归类引擎 - 税率提取器
// ==========================================
// 纯函数: 输入已展开的措施列表 (+ 可选原产国)，按措施类型与地理范围优先级选出税率
// 同一编码存在多条重叠措施是常态（普通/优惠/豁免），提取器必须确定性地
// 优先选择适用面最广的税率，除非调用方显式给出了匹配的原产国
// ==========================================

use crate::domain::measure::Measure;
use regex::Regex;
use std::sync::OnceLock;

// ==========================================
// 措施类型 / 地理范围常量
// ==========================================
pub mod measure_types {
    /// 第三国关税 / 最终用途下的非优惠关税
    pub const THIRD_COUNTRY_DUTY: &[&str] = &["103", "105"];
    /// 临时 / 最终反倾销税
    pub const ANTI_DUMPING: &[&str] = &["551", "552"];
    /// 临时 / 最终反补贴税
    pub const COUNTERVAILING: &[&str] = &["553", "554"];
    /// 增值税
    pub const VAT: &[&str] = &["305"];
    /// 关税优惠（含配额内优惠、最终用途优惠）
    pub const TARIFF_PREFERENCE: &[&str] = &["142", "143", "145", "146"];
}

pub mod geo_areas {
    /// Erga omnes: 适用于所有国家
    pub const ERGA_OMNES: &str = "1011";
    /// 所有第三国
    pub const THIRD_COUNTRIES: &str = "1008";
}

/// 英国标准增值税率
pub const UK_STANDARD_VAT_RATE: f64 = 20.0;

/// 欧盟默认增值税率
pub const EU_DEFAULT_VAT_RATE: f64 = 19.0;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%?").expect("static regex"))
}

/// 从格式化字符串中解析百分比
///
/// 去除 HTML 标签后取第一个数字（其后可跟 `%`）。
///
/// # 示例
/// - `<span>2.00</span> %` → 2.0
/// - `12.8 % + 176.8 EUR / 100 kg` → 12.8
/// - `NIHIL` → None
pub fn parse_percentage(formatted: &str) -> Option<f64> {
    let plain = tag_regex().replace_all(formatted, " ");
    let caps = number_regex().captures(&plain)?;
    caps.get(1)?.as_str().parse::<f64>().ok()
}

fn measure_rate(measure: &Measure) -> Option<f64> {
    measure.duty_expression.as_deref().and_then(parse_percentage)
}

/// 地理范围优先级（越小越优先）: erga omnes > 所有第三国 > 其他
fn area_rank(measure: &Measure) -> u8 {
    if measure.area_is(geo_areas::ERGA_OMNES) {
        0
    } else if measure.area_is(geo_areas::THIRD_COUNTRIES) {
        1
    } else {
        2
    }
}

/// 第三国关税
///
/// # 返回
/// - None: 不存在第三国关税措施（税率未知）
/// - Some(0.0): 存在措施但没有税率表达式（免税）
pub fn extract_third_country_duty(measures: &[Measure]) -> Option<f64> {
    let selected = measures
        .iter()
        .filter(|m| m.has_type(measure_types::THIRD_COUNTRY_DUTY))
        .min_by_key(|m| area_rank(m))?;

    Some(measure_rate(selected).unwrap_or(0.0))
}

/// 原产地是否可接受: 未给原产地时全部接受；否则只接受该国或 erga omnes
fn origin_accepts(measure: &Measure, origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(origin) => {
            measure
                .geographical_area_id
                .as_deref()
                .map(|area| area.eq_ignore_ascii_case(origin))
                .unwrap_or(false)
                || measure.area_is(geo_areas::ERGA_OMNES)
        }
    }
}

fn extract_trade_remedy(
    measures: &[Measure],
    origin: Option<&str>,
    type_ids: &[&str],
    keyword: &str,
) -> Option<f64> {
    measures
        .iter()
        .filter(|m| m.has_type(type_ids) || m.description_contains(keyword))
        .find(|m| origin_accepts(m, origin))
        .and_then(measure_rate)
}

/// 反倾销税率
pub fn extract_anti_dumping_rate(measures: &[Measure], origin: Option<&str>) -> Option<f64> {
    extract_trade_remedy(measures, origin, measure_types::ANTI_DUMPING, "anti-dumping")
}

/// 反补贴税率
pub fn extract_countervailing_rate(measures: &[Measure], origin: Option<&str>) -> Option<f64> {
    extract_trade_remedy(measures, origin, measure_types::COUNTERVAILING, "countervailing")
}

/// 增值税率
///
/// # 规则（按顺序）
/// 1. 标准税率在候选中 → 标准税率（0% 通常是特定豁免，不是一般政策）
/// 2. 存在非零税率 → 最大非零税率
/// 3. 存在 VAT 措施且全部为 0 → 0
/// 4. 无 VAT 措施 → 标准税率
pub fn extract_vat_rate(measures: &[Measure], standard_rate: f64) -> f64 {
    let rates: Vec<f64> = measures
        .iter()
        .filter(|m| m.has_type(measure_types::VAT) || m.description_contains("value added tax"))
        .map(|m| measure_rate(m).unwrap_or(0.0))
        .collect();

    if rates.is_empty() {
        return standard_rate;
    }
    if rates.iter().any(|r| (r - standard_rate).abs() < f64::EPSILON) {
        return standard_rate;
    }

    let max_non_zero = rates
        .iter()
        .copied()
        .filter(|r| *r > 0.0)
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));

    max_non_zero.unwrap_or(0.0)
}

/// 原产地优惠税率（取最低）
///
/// 仅在给出原产地时生效，且只接受地理范围等于该原产地的优惠措施。
pub fn extract_preferential_duty(measures: &[Measure], origin: Option<&str>) -> Option<f64> {
    let origin = origin?;
    measures
        .iter()
        .filter(|m| m.has_type(measure_types::TARIFF_PREFERENCE))
        .filter(|m| {
            m.geographical_area_id
                .as_deref()
                .map(|area| area.eq_ignore_ascii_case(origin))
                .unwrap_or(false)
        })
        .map(|m| measure_rate(m).unwrap_or(0.0))
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.min(r))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(type_id: &str, area: Option<&str>, duty: Option<&str>) -> Measure {
        Measure {
            measure_id: format!("{}-{}", type_id, area.unwrap_or("none")),
            measure_type_id: Some(type_id.to_string()),
            geographical_area_id: area.map(|a| a.to_string()),
            duty_expression: duty.map(|d| d.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("<span>2.00</span> %"), Some(2.0));
        assert_eq!(parse_percentage("12.8 % + 176.8 EUR / 100 kg"), Some(12.8));
        assert_eq!(parse_percentage("<strong>0.00</strong>%"), Some(0.0));
        assert_eq!(parse_percentage("35"), Some(35.0));
        assert_eq!(parse_percentage("NIHIL"), None);
        assert_eq!(parse_percentage(""), None);
    }

    #[test]
    fn test_third_country_prefers_erga_omnes() {
        let measures = vec![
            measure("103", Some("CN"), Some("9.0 %")),
            measure("103", Some("1008"), Some("4.0 %")),
            measure("103", Some("1011"), Some("2.0 %")),
        ];
        assert_eq!(extract_third_country_duty(&measures), Some(2.0));

        let measures = vec![
            measure("103", Some("CN"), Some("9.0 %")),
            measure("103", Some("1008"), Some("4.0 %")),
        ];
        assert_eq!(extract_third_country_duty(&measures), Some(4.0));
    }

    #[test]
    fn test_third_country_free_vs_unknown() {
        let free = vec![measure("103", Some("1011"), None)];
        assert_eq!(extract_third_country_duty(&free), Some(0.0));

        let none = vec![measure("305", Some("1011"), Some("20 %"))];
        assert_eq!(extract_third_country_duty(&none), None);
    }

    #[test]
    fn test_anti_dumping_respects_origin() {
        let measures = vec![
            measure("552", Some("CN"), Some("48.5 %")),
            measure("552", Some("VN"), Some("30.0 %")),
        ];
        assert_eq!(extract_anti_dumping_rate(&measures, Some("CN")), Some(48.5));
        assert_eq!(extract_anti_dumping_rate(&measures, Some("vn")), Some(30.0));
        assert_eq!(extract_anti_dumping_rate(&measures, Some("US")), None);
        // 未给原产地时取第一条
        assert_eq!(extract_anti_dumping_rate(&measures, None), Some(48.5));
    }

    #[test]
    fn test_trade_remedy_matches_by_description() {
        let mut m = measure("999", Some("1011"), Some("11.1 %"));
        m.measure_type_description = Some("Definitive Countervailing duty".to_string());
        assert_eq!(extract_countervailing_rate(&[m.clone()], Some("CN")), Some(11.1));
        assert_eq!(extract_anti_dumping_rate(&[m], Some("CN")), None);
    }

    #[test]
    fn test_vat_prefers_standard_rate() {
        let measures = vec![
            measure("305", Some("1011"), Some("0.00 %")),
            measure("305", Some("1011"), Some("20.00 %")),
        ];
        assert_eq!(extract_vat_rate(&measures, UK_STANDARD_VAT_RATE), 20.0);
    }

    #[test]
    fn test_vat_fallbacks() {
        let reduced = vec![
            measure("305", Some("1011"), Some("0.00 %")),
            measure("305", Some("1011"), Some("5.00 %")),
        ];
        assert_eq!(extract_vat_rate(&reduced, UK_STANDARD_VAT_RATE), 5.0);

        let zero = vec![measure("305", Some("1011"), Some("0.00 %"))];
        assert_eq!(extract_vat_rate(&zero, UK_STANDARD_VAT_RATE), 0.0);

        assert_eq!(extract_vat_rate(&[], EU_DEFAULT_VAT_RATE), 19.0);
    }

    #[test]
    fn test_preferential_duty_only_for_matching_origin() {
        let measures = vec![
            measure("142", Some("KR"), Some("0.00 %")),
            measure("142", Some("JP"), Some("1.5 %")),
            measure("103", Some("1011"), Some("2.0 %")),
        ];
        assert_eq!(extract_preferential_duty(&measures, Some("KR")), Some(0.0));
        assert_eq!(extract_preferential_duty(&measures, Some("JP")), Some(1.5));
        assert_eq!(extract_preferential_duty(&measures, Some("CN")), None);
        assert_eq!(extract_preferential_duty(&measures, None), None);
    }
}
