// ==========================================
// 关税归类引擎 - 上游归类接口客户端
// ==========================================
// 上游: JSON:API 风格的归类/税率服务（章/品目/商品/国家）
// 每次请求 10s 超时（配置在 reqwest Client 上）
// 404 → NotFound；其余失败一律视为上游不可用，由调用方决定是否回落本地
// ==========================================

use crate::domain::classification::{CountryCode, SectionInfo};
use crate::domain::measure::Measure;
use crate::engine::graph::{
    ChapterRef, CommodityNode, HeadingRef, JsonApiDocument, NomenclatureNode, RelationshipGraph,
    Resource, SectionNode,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const USER_AGENT: &str = concat!("tariff-engine/", env!("CARGO_PKG_VERSION"));

/// 上游接口错误
#[derive(Debug, Error)]
pub enum TariffApiError {
    #[error("上游资源不存在: {0}")]
    NotFound(String),

    #[error("上游服务不可用: {0}")]
    Unavailable(String),

    #[error("上游地址无效: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("上游返回异常状态 (status={status}, path={path})")]
    Status { status: u16, path: String },

    #[error("上游载荷格式错误: {0}")]
    Payload(String),
}

impl TariffApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TariffApiError::NotFound(_))
    }
}

pub type TariffApiResult<T> = Result<T, TariffApiError>;

// ==========================================
// 上游视图
// ==========================================

/// 章详情
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDetail {
    pub code10: String,
    pub description: Option<String>,
    pub section: Option<SectionInfo>,
    pub headings: Vec<NomenclatureNode>,
}

/// 品目详情（commodities 为全部后代，按上游顺序）
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingDetail {
    pub code10: String,
    pub description: Option<String>,
    pub declarable: bool,
    pub section: Option<SectionInfo>,
    pub chapter: Option<NomenclatureNode>,
    pub commodities: Vec<CommodityNode>,
    pub measures: Vec<Measure>,
}

impl HeadingDetail {
    /// 4 位品目编码
    pub fn code4(&self) -> &str {
        &self.code10[..self.code10.len().min(4)]
    }

    /// 可申报的后代（叶子且为 80 行）
    pub fn declarable_commodities(&self) -> impl Iterator<Item = &CommodityNode> {
        self.commodities
            .iter()
            .filter(|c| c.leaf && c.suffix == "80")
    }
}

/// 商品/子目详情
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityDetail {
    pub code10: String,
    pub description: Option<String>,
    pub declarable: bool,
    pub indents: u32,
    pub section: Option<SectionInfo>,
    pub chapter: Option<NomenclatureNode>,
    pub heading: Option<NomenclatureNode>,
    pub ancestors: Vec<CommodityNode>,
    pub measures: Vec<Measure>,
}

// ==========================================
// TariffApiClient Trait
// ==========================================
#[async_trait]
pub trait TariffApiClient: Send + Sync {
    /// 章（2 位）
    async fn get_chapter(&self, chapter: &str) -> TariffApiResult<ChapterDetail>;

    /// 品目（4 位）
    async fn get_heading(&self, heading: &str) -> TariffApiResult<HeadingDetail>;

    /// 商品（10 位）；可申报商品与子目分属不同端点，实现需依次尝试
    async fn get_commodity(&self, code10: &str) -> TariffApiResult<CommodityDetail>;

    /// 原产国列表
    async fn get_countries(&self) -> TariffApiResult<Vec<CountryCode>>;
}

// ==========================================
// HttpTariffApiClient
// ==========================================
#[derive(Clone)]
pub struct HttpTariffApiClient {
    http: Client,
    base_url: Url,
}

impl HttpTariffApiClient {
    pub fn new(base: &str, timeout: Duration) -> TariffApiResult<Self> {
        let base_url = Url::parse(base)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    async fn fetch_document(&self, path: &str) -> TariffApiResult<JsonApiDocument> {
        let url = self.url(path)?;
        let started = Instant::now();

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TariffApiError::Unavailable(e.to_string())
                } else {
                    TariffApiError::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TariffApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(TariffApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let doc = response
            .json::<JsonApiDocument>()
            .await
            .map_err(|e| TariffApiError::Payload(e.to_string()))?;

        debug!(
            path = %path,
            status = status.as_u16(),
            included = doc.included.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "上游请求完成"
        );
        Ok(doc)
    }
}

#[async_trait]
impl TariffApiClient for HttpTariffApiClient {
    #[instrument(skip(self))]
    async fn get_chapter(&self, chapter: &str) -> TariffApiResult<ChapterDetail> {
        let doc = self.fetch_document(&format!("chapters/{}", chapter)).await?;
        parse_chapter(&doc)
    }

    #[instrument(skip(self))]
    async fn get_heading(&self, heading: &str) -> TariffApiResult<HeadingDetail> {
        let doc = self.fetch_document(&format!("headings/{}", heading)).await?;
        parse_heading(&doc)
    }

    #[instrument(skip(self))]
    async fn get_commodity(&self, code10: &str) -> TariffApiResult<CommodityDetail> {
        match self.fetch_document(&format!("commodities/{}", code10)).await {
            Ok(doc) => parse_commodity(&doc, true),
            Err(TariffApiError::NotFound(_)) => {
                debug!(code10 = %code10, "商品端点未命中，尝试子目端点");
                match self
                    .fetch_document(&format!("subheadings/{}-80", code10))
                    .await
                {
                    Ok(doc) => parse_commodity(&doc, false),
                    Err(TariffApiError::NotFound(_)) => {
                        Err(TariffApiError::NotFound(code10.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn get_countries(&self) -> TariffApiResult<Vec<CountryCode>> {
        let doc = self.fetch_document("geographical_areas/countries").await?;
        Ok(parse_countries(&doc))
    }
}

// ==========================================
// 载荷解析（纯函数）
// ==========================================

fn primary(doc: &JsonApiDocument) -> TariffApiResult<&Resource> {
    doc.data
        .first()
        .ok_or_else(|| TariffApiError::Payload("缺少主对象".to_string()))
}

fn code10_of(resource: &Resource) -> TariffApiResult<String> {
    resource
        .attr_str("goods_nomenclature_item_id")
        .ok_or_else(|| TariffApiError::Payload(format!("资源 {} 缺少编码", resource.id)))
}

fn description_of(resource: &Resource) -> Option<String> {
    resource
        .attr_str("description")
        .or_else(|| resource.attr_str("formatted_description"))
}

fn section_of(graph: &RelationshipGraph, resource: &Resource) -> Option<SectionInfo> {
    graph
        .related::<SectionNode>(resource, "section")
        .map(|s| SectionInfo {
            id: s.id,
            numeral: s.numeral,
            title: s.title,
        })
}

pub fn parse_chapter(doc: &JsonApiDocument) -> TariffApiResult<ChapterDetail> {
    let graph = RelationshipGraph::from_document(doc);
    let chapter = primary(doc)?;

    let headings = graph
        .related_many::<HeadingRef>(chapter, "headings")
        .into_iter()
        .map(|h| h.0)
        .collect();

    Ok(ChapterDetail {
        code10: code10_of(chapter)?,
        description: description_of(chapter),
        section: section_of(&graph, chapter),
        headings,
    })
}

pub fn parse_heading(doc: &JsonApiDocument) -> TariffApiResult<HeadingDetail> {
    let graph = RelationshipGraph::from_document(doc);
    let heading = primary(doc)?;

    let mut commodities = graph.related_many::<CommodityNode>(heading, "commodities");
    if commodities.is_empty() {
        commodities = graph.all::<CommodityNode>();
    }

    let declarable = heading.attr_bool("declarable").unwrap_or(false);
    let measures = if heading.link_many("import_measures").is_empty() {
        Vec::new()
    } else {
        graph.measures_for(heading, "import_measures")
    };

    Ok(HeadingDetail {
        code10: code10_of(heading)?,
        description: description_of(heading),
        declarable,
        section: section_of(&graph, heading),
        chapter: graph.related::<ChapterRef>(heading, "chapter").map(|c| c.0),
        commodities,
        measures,
    })
}

/// 解析商品/子目
///
/// `from_commodity_endpoint` 为 true 时缺省视为可申报（商品端点只服务可申报编码）。
pub fn parse_commodity(
    doc: &JsonApiDocument,
    from_commodity_endpoint: bool,
) -> TariffApiResult<CommodityDetail> {
    let graph = RelationshipGraph::from_document(doc);
    let commodity = primary(doc)?;

    let declarable = commodity
        .attr_bool("declarable")
        .unwrap_or(from_commodity_endpoint);

    Ok(CommodityDetail {
        code10: code10_of(commodity)?,
        description: description_of(commodity),
        declarable,
        indents: commodity.attr_u32("number_indents").unwrap_or(0),
        section: section_of(&graph, commodity),
        chapter: graph.related::<ChapterRef>(commodity, "chapter").map(|c| c.0),
        heading: graph.related::<HeadingRef>(commodity, "heading").map(|h| h.0),
        ancestors: graph.related_many::<CommodityNode>(commodity, "ancestors"),
        measures: graph.measures_for(commodity, "import_measures"),
    })
}

pub fn parse_countries(doc: &JsonApiDocument) -> Vec<CountryCode> {
    let mut countries: Vec<CountryCode> = doc
        .data
        .as_slice()
        .iter()
        .filter(|r| r.kind == "geographical_area")
        .map(|r| CountryCode {
            code: r
                .attr_str("geographical_area_id")
                .or_else(|| r.attr_str("id"))
                .unwrap_or_else(|| r.id.clone()),
            description: r.attr_str("description"),
        })
        .collect();

    if countries.is_empty() {
        warn!("上游国家列表为空");
    }
    countries.sort_by(|a, b| a.code.cmp(&b.code));
    countries.dedup_by(|a, b| a.code == b.code);
    countries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> JsonApiDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_heading_collects_commodities_in_order() {
        let doc = doc(json!({
            "data": {
                "id": "8471", "type": "heading",
                "attributes": { "goods_nomenclature_item_id": "8471000000", "description": "ADP machines", "declarable": false },
                "relationships": {
                    "section": { "data": { "id": "16", "type": "section" } },
                    "commodities": { "data": [
                        { "id": "1", "type": "commodity" },
                        { "id": "2", "type": "commodity" }
                    ] }
                }
            },
            "included": [
                { "id": "16", "type": "section", "attributes": { "numeral": "XVI", "title": "Machinery" } },
                { "id": "1", "type": "commodity", "attributes": {
                    "goods_nomenclature_item_id": "8471300000", "producline_suffix": "80",
                    "number_indents": 1, "leaf": true, "description": "Portable" } },
                { "id": "2", "type": "commodity", "attributes": {
                    "goods_nomenclature_item_id": "8471410000", "producline_suffix": "10",
                    "number_indents": 1, "leaf": false, "description": "Other" } }
            ]
        }));

        let heading = parse_heading(&doc).unwrap();
        assert_eq!(heading.code4(), "8471");
        assert!(!heading.declarable);
        assert_eq!(heading.section.as_ref().and_then(|s| s.numeral.as_deref()), Some("XVI"));
        assert_eq!(heading.commodities.len(), 2);
        assert_eq!(heading.declarable_commodities().count(), 1);
        assert!(heading.measures.is_empty());
    }

    #[test]
    fn test_parse_subheading_defaults_to_not_declarable() {
        let doc = doc(json!({
            "data": {
                "id": "99", "type": "subheading",
                "attributes": { "goods_nomenclature_item_id": "8471300000", "number_indents": 1 }
            },
            "included": []
        }));
        let detail = parse_commodity(&doc, false).unwrap();
        assert!(!detail.declarable);
        assert!(detail.measures.is_empty());
        assert!(detail.heading.is_none());
    }

    #[test]
    fn test_missing_code_is_payload_error() {
        let doc = doc(json!({ "data": { "id": "1", "type": "chapter", "attributes": {} } }));
        assert!(matches!(parse_chapter(&doc), Err(TariffApiError::Payload(_))));
    }

    #[test]
    fn test_parse_countries_sorted_and_deduped() {
        let doc = doc(json!({
            "data": [
                { "id": "US", "type": "geographical_area", "attributes": { "id": "US", "description": "United States" } },
                { "id": "CN", "type": "geographical_area", "attributes": { "id": "CN", "description": "China" } },
                { "id": "CN", "type": "geographical_area", "attributes": { "id": "CN", "description": "China" } }
            ]
        }));
        let countries = parse_countries(&doc);
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].code, "CN");
    }
}
