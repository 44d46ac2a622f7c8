// ==========================================
// 上游归类接口 / 翻译器 的内存替身 - 用于集成测试
// ==========================================
// 数据: 第 84 章，品目 8471
//   8471300000/80 (非叶子)
//     8471301000/80, 8471302000/80, 8471309000/80 (叶子)
//   8471410000/10 (非叶子)
//     8471410000/80, 8471490000/80 (叶子)
// 其余编码一律返回 NotFound
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tariff_engine::domain::classification::{CountryCode, SectionInfo};
use tariff_engine::domain::measure::Measure;
use tariff_engine::engine::graph::{CommodityNode, NomenclatureNode};
use tariff_engine::infra::tariff_api::{
    ChapterDetail, CommodityDetail, HeadingDetail, TariffApiClient, TariffApiError,
    TariffApiResult,
};
use tariff_engine::infra::translator::{TranslateError, TranslateResult, Translator};

pub const HEADING_DESCRIPTION: &str = "Automatic data-processing machines";

#[derive(Default)]
pub struct FakeTariffApiClient {
    /// 为 true 时所有请求返回 Unavailable
    pub offline: AtomicBool,
    pub commodity_calls: AtomicUsize,
    pub heading_calls: AtomicUsize,
}

impl FakeTariffApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn commodity_calls(&self) -> usize {
        self.commodity_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> TariffApiResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TariffApiError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

fn section() -> SectionInfo {
    SectionInfo {
        id: "16".to_string(),
        numeral: Some("XVI".to_string()),
        title: Some("Machinery and mechanical appliances".to_string()),
    }
}

fn chapter_node() -> NomenclatureNode {
    NomenclatureNode {
        code10: "8400000000".to_string(),
        description: Some("Nuclear reactors, boilers, machinery".to_string()),
        declarable: false,
    }
}

fn heading_node() -> NomenclatureNode {
    NomenclatureNode {
        code10: "8471000000".to_string(),
        description: Some(HEADING_DESCRIPTION.to_string()),
        declarable: false,
    }
}

fn commodity(code10: &str, suffix: &str, indents: u32, leaf: bool, description: &str) -> CommodityNode {
    CommodityNode {
        sid: format!("{}-{}", code10, suffix),
        code10: code10.to_string(),
        suffix: suffix.to_string(),
        description: Some(description.to_string()),
        indents,
        leaf,
        parent_sid: None,
    }
}

fn commodities_8471() -> Vec<CommodityNode> {
    vec![
        commodity("8471300000", "80", 1, false, "Portable machines"),
        commodity("8471301000", "80", 2, true, "Laptops"),
        commodity("8471302000", "80", 2, true, "Tablets"),
        commodity("8471309000", "80", 2, true, "Other portable machines"),
        commodity("8471410000", "10", 1, false, "Other machines"),
        commodity("8471410000", "80", 2, true, "Comprising a CPU and an input unit"),
        commodity("8471490000", "80", 2, true, "Presented in the form of systems"),
    ]
}

pub fn measure(id: &str, type_id: &str, area: &str, duty: &str) -> Measure {
    Measure {
        measure_id: id.to_string(),
        measure_type_id: Some(type_id.to_string()),
        measure_type_description: None,
        geographical_area_id: Some(area.to_string()),
        geographical_area_description: None,
        duty_expression: Some(duty.to_string()),
        effective_start: None,
        effective_end: None,
    }
}

fn measures_for(code10: &str) -> Vec<Measure> {
    match code10 {
        "8471301000" => vec![
            measure("m1", "103", "1011", "<span>2.00</span> %"),
            measure("m2", "305", "1011", "20.00 %"),
            measure("m3", "552", "CN", "35.00 %"),
        ],
        _ => vec![measure("m9", "103", "1011", "0.00 %")],
    }
}

#[async_trait]
impl TariffApiClient for FakeTariffApiClient {
    async fn get_chapter(&self, chapter: &str) -> TariffApiResult<ChapterDetail> {
        self.check_online()?;
        if chapter != "84" {
            return Err(TariffApiError::NotFound(chapter.to_string()));
        }
        Ok(ChapterDetail {
            code10: "8400000000".to_string(),
            description: chapter_node().description,
            section: Some(section()),
            headings: vec![
                heading_node(),
                NomenclatureNode {
                    code10: "8473000000".to_string(),
                    description: Some("Parts and accessories".to_string()),
                    declarable: false,
                },
            ],
        })
    }

    async fn get_heading(&self, heading: &str) -> TariffApiResult<HeadingDetail> {
        self.heading_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if heading != "8471" {
            return Err(TariffApiError::NotFound(heading.to_string()));
        }
        Ok(HeadingDetail {
            code10: "8471000000".to_string(),
            description: Some(HEADING_DESCRIPTION.to_string()),
            declarable: false,
            section: Some(section()),
            chapter: Some(chapter_node()),
            commodities: commodities_8471(),
            measures: Vec::new(),
        })
    }

    async fn get_commodity(&self, code10: &str) -> TariffApiResult<CommodityDetail> {
        self.commodity_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let all = commodities_8471();
        let Some(node) = all.iter().find(|c| c.code10 == code10 && c.suffix == "80") else {
            return Err(TariffApiError::NotFound(code10.to_string()));
        };
        let ancestors: Vec<CommodityNode> = all
            .iter()
            .filter(|c| c.indents < node.indents && c.code10 != node.code10 && code10.starts_with(&c.code10[..6]))
            .cloned()
            .collect();

        Ok(CommodityDetail {
            code10: node.code10.clone(),
            description: node.description.clone(),
            declarable: node.leaf,
            indents: node.indents,
            section: Some(section()),
            chapter: Some(chapter_node()),
            heading: Some(heading_node()),
            ancestors,
            measures: if node.leaf { measures_for(code10) } else { Vec::new() },
        })
    }

    async fn get_countries(&self) -> TariffApiResult<Vec<CountryCode>> {
        self.check_online()?;
        Ok(["CN", "JP", "US"]
            .iter()
            .map(|code| CountryCode {
                code: code.to_string(),
                description: None,
            })
            .collect())
    }
}

/// 译文 = "译:" + 原文
#[derive(Default)]
pub struct FakeTranslator {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let translator = Self::default();
        translator.fail.store(true, Ordering::SeqCst);
        translator
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> TranslateResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TranslateError::Payload("translator offline".to_string()));
        }
        Ok(format!("译:{}", text))
    }
}
