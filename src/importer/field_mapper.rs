// ==========================================
// 关税归类引擎 - 字段映射器实现
// ==========================================
// 职责: 源列名（含别名）→ 标准记录
// 编码列取第一个空白分隔的片段；Excel 丢失前导 0 时奇数位左补 0
// ==========================================

use crate::domain::sync::{DutyRecord, NomenclatureRecord};
use crate::engine::normalizer::{pad_right, MAX_CODE_DIGITS, MIN_CODE_DIGITS};
use crate::engine::rate_extractor::geo_areas;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{RawRow, RecordMapper};

/// 标准字段 → 可接受的列名
mod columns {
    pub const CODE: &[&str] = &[
        "Goods code",
        "Commodity code",
        "goods_nomenclature_item_id",
        "commodity__code",
        "hs_code",
        "商品编码",
    ];
    pub const SUFFIX: &[&str] = &[
        "Product line suffix",
        "producline_suffix",
        "productline_suffix",
        "Suffix",
        "后缀",
    ];
    pub const INDENT: &[&str] = &["Indent", "Indents", "number_indents", "缩进"];
    pub const DESCRIPTION: &[&str] = &[
        "Description",
        "Goods description",
        "description",
        "商品描述",
    ];
    pub const START_DATE: &[&str] = &["Start date", "validity_start_date", "measure__effective_start_date", "生效日期"];
    pub const END_DATE: &[&str] = &["End date", "validity_end_date", "measure__effective_end_date", "失效日期"];
    pub const ORIGIN: &[&str] = &[
        "Geographical area ID",
        "geographical_area__id",
        "Origin",
        "origin_code",
        "原产国",
    ];
    pub const ORIGIN_NAME: &[&str] = &[
        "Geographical area description",
        "geographical_area__description",
        "Origin name",
        "原产国名称",
    ];
    pub const MEASURE_TYPE: &[&str] = &[
        "Measure type ID",
        "measure__type__id",
        "measure_type__id",
        "measure_type_code",
        "措施类型",
    ];
    pub const MEASURE_TYPE_DESCRIPTION: &[&str] = &[
        "Measure type description",
        "measure__type__description",
        "measure_type__description",
        "措施类型描述",
    ];
    pub const DUTY: &[&str] = &["Duty", "Duty expression", "measure__duty_expression", "duty_expression", "税率"];
    pub const LEGAL_BASE: &[&str] = &["Legal base", "measure__regulation__id", "legal_base", "法律依据"];
}

pub struct TariffFieldMapper;

impl RecordMapper for TariffFieldMapper {
    fn map_nomenclature(
        &self,
        row: &RawRow,
        row_number: usize,
    ) -> ImportResult<NomenclatureRecord> {
        let raw_code = self.require(row, columns::CODE, "goods code", row_number)?;
        let (hs_code10, inline_suffix) = self.parse_code(&raw_code, row_number)?;

        let product_line_suffix = self
            .get_string(row, columns::SUFFIX)
            .or(inline_suffix)
            .unwrap_or_else(|| "80".to_string());

        let indent = match self.get_string(row, columns::INDENT) {
            None => 0,
            Some(value) => parse_indent(&value).ok_or_else(|| ImportError::FieldMappingError {
                row: row_number,
                message: format!("缩进无法解析为整数: {}", value),
            })?,
        };

        Ok(NomenclatureRecord {
            row_number,
            hs_code10,
            product_line_suffix,
            indent,
            description: self.get_string(row, columns::DESCRIPTION),
            start_date: self.get_string(row, columns::START_DATE),
            end_date: self.get_string(row, columns::END_DATE),
        })
    }

    fn map_duty(&self, row: &RawRow, row_number: usize) -> ImportResult<DutyRecord> {
        let raw_code = self.require(row, columns::CODE, "commodity code", row_number)?;
        let (hs_code10, _) = self.parse_code(&raw_code, row_number)?;
        let measure_type_code =
            self.require(row, columns::MEASURE_TYPE, "measure type", row_number)?;

        Ok(DutyRecord {
            row_number,
            hs_code10,
            origin_code: self
                .get_string(row, columns::ORIGIN)
                .map(|o| o.to_uppercase())
                .unwrap_or_else(|| geo_areas::ERGA_OMNES.to_string()),
            origin_name: self.get_string(row, columns::ORIGIN_NAME),
            measure_type_code,
            measure_type_description: self.get_string(row, columns::MEASURE_TYPE_DESCRIPTION),
            duty_expression: self.get_string(row, columns::DUTY),
            legal_base: self.get_string(row, columns::LEGAL_BASE),
            start_date: self.get_string(row, columns::START_DATE),
            end_date: self.get_string(row, columns::END_DATE),
        })
    }
}

impl TariffFieldMapper {
    /// 提取字符串字段，按别名顺序取第一个非空值
    fn get_string(&self, row: &RawRow, aliases: &[&str]) -> Option<String> {
        for alias in aliases {
            if let Some(v) = row.get(*alias) {
                let trimmed = v.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }

    fn require(
        &self,
        row: &RawRow,
        aliases: &[&str],
        field: &str,
        row_number: usize,
    ) -> ImportResult<String> {
        self.get_string(row, aliases)
            .ok_or_else(|| ImportError::FieldMappingError {
                row: row_number,
                message: format!("缺少必填字段: {}", field),
            })
    }

    /// 编码列 → (10 位编码, 行内后缀)
    ///
    /// "0101210000 80" → ("0101210000", Some("80"))
    fn parse_code(
        &self,
        raw: &str,
        row_number: usize,
    ) -> ImportResult<(String, Option<String>)> {
        let mut tokens = raw.split_whitespace();
        let first = tokens.next().unwrap_or("");
        let inline_suffix = tokens
            .next()
            .filter(|t| t.len() == 2 && t.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);

        // Excel 数值单元格可能带 ".0"
        let first = first.strip_suffix(".0").unwrap_or(first);
        let mut digits: String = first.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() < MIN_CODE_DIGITS {
            return Err(ImportError::FieldMappingError {
                row: row_number,
                message: format!("编码无效: {}", raw),
            });
        }
        if digits.len() % 2 == 1 {
            digits.insert(0, '0');
        }
        digits.truncate(MAX_CODE_DIGITS);

        Ok((pad_right(&digits, MAX_CODE_DIGITS), inline_suffix))
    }
}

fn parse_indent(value: &str) -> Option<u32> {
    let value = value.strip_suffix(".0").unwrap_or(value);
    value.parse::<u32>().ok()
}
