// ==========================================
// 关税归类引擎 - 同步记录合并
// ==========================================
// 商品目录（按文件顺序，缩进还原树形） + 税率行 → 本地镜像行
// - 叶子: 下一行缩进不大于本行；可申报 = 叶子 且 后缀 80
// - 措施继承: 可申报编码继承其全部祖先编码上的措施
// - 每个可申报编码一行 erga omnes（origin = ""），
//   另为每个出现反倾销/反补贴措施的原产国各生成一行
// - 优惠税率行按 (法律依据, 原产国) 汇总为贸易协定
// ==========================================

use crate::domain::measure::Measure;
use crate::domain::sync::{DutyRecord, NomenclatureRecord};
use crate::domain::tariff::{TariffRate, TradeAgreement};
use crate::domain::types::DataSource;
use crate::engine::rate_extractor::{
    extract_anti_dumping_rate, extract_countervailing_rate, extract_preferential_duty,
    extract_third_country_duty, extract_vat_rate, geo_areas, measure_types,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 合并结果
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub rates: Vec<TariffRate>,
    pub agreements: Vec<TradeAgreement>,
    /// 可申报编码数
    pub declarable_count: usize,
}

pub struct RecordMerger {
    standard_vat_rate: f64,
    taric_version: Option<String>,
    synced_at: DateTime<Utc>,
}

impl RecordMerger {
    pub fn new(standard_vat_rate: f64, taric_version: Option<String>) -> Self {
        Self {
            standard_vat_rate,
            taric_version,
            synced_at: Utc::now(),
        }
    }

    pub fn merge(&self, nomenclature: &[NomenclatureRecord], duties: &[DutyRecord]) -> MergeOutput {
        let mut measures_by_code: HashMap<&str, Vec<Measure>> = HashMap::new();
        for duty in duties {
            measures_by_code
                .entry(duty.hs_code10.as_str())
                .or_default()
                .push(to_measure(duty));
        }

        let mut output = MergeOutput::default();
        let mut stack: Vec<&NomenclatureRecord> = Vec::new();

        for (idx, record) in nomenclature.iter().enumerate() {
            while stack
                .last()
                .map(|top| top.indent >= record.indent)
                .unwrap_or(false)
            {
                stack.pop();
            }

            let is_leaf = nomenclature
                .get(idx + 1)
                .map(|next| next.indent <= record.indent)
                .unwrap_or(true);

            if is_leaf && record.product_line_suffix == "80" {
                output.declarable_count += 1;

                // 祖先在前，自身在后；同一编码（不同后缀）只取一次
                let mut seen = BTreeSet::new();
                let measures: Vec<Measure> = stack
                    .iter()
                    .map(|a| a.hs_code10.as_str())
                    .chain(std::iter::once(record.hs_code10.as_str()))
                    .filter(|code| seen.insert(*code))
                    .flat_map(|code| measures_by_code.get(code).cloned().unwrap_or_default())
                    .collect();

                output.rates.extend(self.rows_for(record, measures));
            }

            stack.push(record);
        }

        output.agreements = self.agreements(duties);
        output
    }

    fn rows_for(&self, record: &NomenclatureRecord, measures: Vec<Measure>) -> Vec<TariffRate> {
        let third_country_duty = extract_third_country_duty(&measures);
        let vat_rate = Some(extract_vat_rate(&measures, self.standard_vat_rate));

        let base = TariffRate {
            id: None,
            hs_code: record.hs_code10[..8].to_string(),
            hs_code10: record.hs_code10.clone(),
            origin_country_code: String::new(),
            duty_rate: third_country_duty,
            third_country_duty,
            anti_dumping_rate: extract_anti_dumping_rate(&measures, Some(geo_areas::ERGA_OMNES)),
            countervailing_rate: extract_countervailing_rate(
                &measures,
                Some(geo_areas::ERGA_OMNES),
            ),
            vat_rate,
            goods_description: record.description.clone(),
            goods_description_cn: None,
            data_source: DataSource::LocalDatabase,
            measures: Vec::new(),
            taric_version: self.taric_version.clone(),
            last_sync_time: self.synced_at,
            is_active: true,
        };

        let remedy_origins: BTreeSet<String> = measures
            .iter()
            .filter(|m| is_trade_remedy(m))
            .filter_map(|m| m.geographical_area_id.clone())
            .filter(|area| area != geo_areas::ERGA_OMNES && area != geo_areas::THIRD_COUNTRIES)
            .collect();

        let mut rows = Vec::with_capacity(1 + remedy_origins.len());
        for origin in remedy_origins {
            let origin = Some(origin.as_str());
            rows.push(TariffRate {
                origin_country_code: origin.unwrap_or_default().to_string(),
                duty_rate: extract_preferential_duty(&measures, origin).or(third_country_duty),
                anti_dumping_rate: extract_anti_dumping_rate(&measures, origin),
                countervailing_rate: extract_countervailing_rate(&measures, origin),
                measures: measures.clone(),
                ..base.clone()
            });
        }
        rows.insert(0, TariffRate { measures, ..base });
        rows
    }

    fn agreements(&self, duties: &[DutyRecord]) -> Vec<TradeAgreement> {
        let preferential: Vec<&DutyRecord> = duties
            .iter()
            .filter(|d| measure_types::TARIFF_PREFERENCE.contains(&d.measure_type_code.as_str()))
            .collect();

        let mut grouped: BTreeMap<(String, String), (&DutyRecord, BTreeSet<&str>)> =
            BTreeMap::new();
        for duty in preferential {
            let agreement_code = duty
                .legal_base
                .clone()
                .unwrap_or_else(|| format!("{}-{}", duty.measure_type_code, duty.origin_code));
            grouped
                .entry((agreement_code, duty.origin_code.clone()))
                .or_insert_with(|| (duty, BTreeSet::new()))
                .1
                .insert(duty.hs_code10.as_str());
        }

        grouped
            .into_iter()
            .map(|((agreement_code, origin_code), (first, codes))| TradeAgreement {
                agreement_code,
                origin_code,
                origin_name: first.origin_name.clone(),
                measure_type_code: first.measure_type_code.clone(),
                legal_base: first.legal_base.clone(),
                code_count: codes.len() as i64,
                taric_version: self.taric_version.clone(),
            })
            .collect()
    }
}

fn is_trade_remedy(measure: &Measure) -> bool {
    measure.has_type(measure_types::ANTI_DUMPING)
        || measure.has_type(measure_types::COUNTERVAILING)
        || measure.description_contains("anti-dumping")
        || measure.description_contains("countervailing")
}

fn to_measure(duty: &DutyRecord) -> Measure {
    Measure {
        measure_id: format!("row-{}", duty.row_number),
        measure_type_id: Some(duty.measure_type_code.clone()),
        measure_type_description: duty.measure_type_description.clone(),
        geographical_area_id: Some(duty.origin_code.clone()),
        geographical_area_description: duty.origin_name.clone(),
        duty_expression: duty.duty_expression.clone(),
        effective_start: duty.start_date.clone(),
        effective_end: duty.end_date.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nomenclature(code: &str, suffix: &str, indent: u32) -> NomenclatureRecord {
        NomenclatureRecord {
            row_number: 0,
            hs_code10: code.to_string(),
            product_line_suffix: suffix.to_string(),
            indent,
            description: Some(format!("desc {}", code)),
            start_date: None,
            end_date: None,
        }
    }

    fn duty(code: &str, origin: &str, measure_type: &str, expr: &str) -> DutyRecord {
        DutyRecord {
            row_number: 0,
            hs_code10: code.to_string(),
            origin_code: origin.to_string(),
            origin_name: None,
            measure_type_code: measure_type.to_string(),
            measure_type_description: None,
            duty_expression: Some(expr.to_string()),
            legal_base: None,
            start_date: None,
            end_date: None,
        }
    }

    fn sample_nomenclature() -> Vec<NomenclatureRecord> {
        vec![
            nomenclature("7318000000", "80", 0),
            nomenclature("7318150000", "10", 1),
            nomenclature("7318150000", "80", 2),
            nomenclature("7318160000", "80", 1),
        ]
    }

    #[test]
    fn test_only_declarable_leaves_become_rows() {
        let output = RecordMerger::new(20.0, None).merge(&sample_nomenclature(), &[]);
        let codes: Vec<&str> = output.rates.iter().map(|r| r.hs_code10.as_str()).collect();
        assert_eq!(codes, vec!["7318150000", "7318160000"]);
        assert_eq!(output.declarable_count, 2);
        assert!(output.rates.iter().all(|r| r.vat_rate == Some(20.0)));
    }

    #[test]
    fn test_measures_inherited_and_remedy_rows_per_origin() {
        let duties = vec![
            duty("7318000000", "1011", "103", "3.70 %"),
            duty("7318150000", "CN", "552", "85.00 %"),
            duty("7318150000", "CN", "142", "1.00 %"),
        ];
        let output = RecordMerger::new(20.0, Some("2024-01".to_string()))
            .merge(&sample_nomenclature(), &duties);

        let screws: Vec<&TariffRate> = output
            .rates
            .iter()
            .filter(|r| r.hs_code10 == "7318150000")
            .collect();
        assert_eq!(screws.len(), 2);

        let erga_omnes = screws.iter().find(|r| r.origin_country_code.is_empty()).unwrap();
        assert_eq!(erga_omnes.third_country_duty, Some(3.7));
        assert_eq!(erga_omnes.duty_rate, Some(3.7));
        assert_eq!(erga_omnes.anti_dumping_rate, None);

        let cn = screws.iter().find(|r| r.origin_country_code == "CN").unwrap();
        assert_eq!(cn.anti_dumping_rate, Some(85.0));
        assert_eq!(cn.duty_rate, Some(1.0));
        assert_eq!(cn.third_country_duty, Some(3.7));
        assert_eq!(cn.taric_version.as_deref(), Some("2024-01"));

        // 未继承到兄弟节点
        let bolts = output
            .rates
            .iter()
            .find(|r| r.hs_code10 == "7318160000")
            .unwrap();
        assert_eq!(bolts.third_country_duty, Some(3.7));
        assert_eq!(bolts.measures.len(), 1);
    }

    #[test]
    fn test_agreements_grouped_by_legal_base_and_origin() {
        let mut a = duty("7318150000", "KR", "142", "0.00 %");
        a.legal_base = Some("UK-KR".to_string());
        let mut b = duty("7318160000", "KR", "142", "0.00 %");
        b.legal_base = Some("UK-KR".to_string());
        let c = duty("7318160000", "JP", "142", "0.00 %");

        let output = RecordMerger::new(20.0, None).merge(&sample_nomenclature(), &[a, b, c]);
        assert_eq!(output.agreements.len(), 2);
        let kr = output
            .agreements
            .iter()
            .find(|g| g.origin_code == "KR")
            .unwrap();
        assert_eq!(kr.agreement_code, "UK-KR");
        assert_eq!(kr.code_count, 2);
        let jp = output
            .agreements
            .iter()
            .find(|g| g.origin_code == "JP")
            .unwrap();
        assert_eq!(jp.agreement_code, "142-JP");
    }
}
