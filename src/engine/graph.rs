// ==========================================
// 关税归类引擎 - 关系图解析器 (JSON:API)
// ==========================================
// 上游以 "主对象 + included 集合 + 关系指针" 表示规范化数据
// 本模块建立 (类型, id) → 节点 的索引，并提供按类型检查的解引用
// 关系目标缺失时返回 None，从不硬失败
// ==========================================

use crate::domain::measure::Measure;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// ==========================================
// JSON:API 载荷结构
// ==========================================

/// JSON:API 文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonApiDocument {
    pub data: PrimaryData,
    #[serde(default)]
    pub included: Vec<Resource>,
}

/// 主数据（单个或列表）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Resource),
    Many(Vec<Resource>),
}

impl PrimaryData {
    pub fn as_slice(&self) -> &[Resource] {
        match self {
            PrimaryData::One(r) => std::slice::from_ref(r),
            PrimaryData::Many(rs) => rs.as_slice(),
        }
    }

    pub fn first(&self) -> Option<&Resource> {
        self.as_slice().first()
    }
}

/// 资源对象
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

/// 关系
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<Linkage>,
}

/// 关系指针（单个或列表）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    One(ResourceRef),
    Many(Vec<ResourceRef>),
}

/// 资源引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Resource {
    pub fn attr_str(&self, key: &str) -> Option<String> {
        attr_str(&self.attributes, key)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        match self.attributes.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            _ => None,
        }
    }

    pub fn attr_u32(&self, key: &str) -> Option<u32> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_u64().map(|v| v as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 单值关系指针
    pub fn link_one(&self, rel: &str) -> Option<&ResourceRef> {
        match self.relationships.get(rel)?.data.as_ref()? {
            Linkage::One(r) => Some(r),
            Linkage::Many(rs) => rs.first(),
        }
    }

    /// 多值关系指针
    pub fn link_many(&self, rel: &str) -> Vec<&ResourceRef> {
        match self.relationships.get(rel).and_then(|r| r.data.as_ref()) {
            Some(Linkage::One(r)) => vec![r],
            Some(Linkage::Many(rs)) => rs.iter().collect(),
            None => Vec::new(),
        }
    }
}

/// 读取字符串属性（数字也转为字符串，空串视为 None）
pub fn attr_str(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    match attributes.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ==========================================
// 节点类型
// ==========================================

/// 图中可索引的节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Measure,
    MeasureType,
    GeographicalArea,
    DutyExpression,
    Commodity,
    Heading,
    Chapter,
    Section,
}

impl NodeKind {
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "measure" => Some(NodeKind::Measure),
            "measure_type" => Some(NodeKind::MeasureType),
            "geographical_area" => Some(NodeKind::GeographicalArea),
            "duty_expression" => Some(NodeKind::DutyExpression),
            "commodity" => Some(NodeKind::Commodity),
            "heading" => Some(NodeKind::Heading),
            "chapter" => Some(NodeKind::Chapter),
            "section" => Some(NodeKind::Section),
            _ => None,
        }
    }
}

/// 可从图中按类型解出的节点
pub trait GraphNode: Sized {
    const KIND: NodeKind;

    fn from_resource(resource: &Resource) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureTypeNode {
    pub id: String,
    pub description: Option<String>,
}

impl GraphNode for MeasureTypeNode {
    const KIND: NodeKind = NodeKind::MeasureType;

    fn from_resource(resource: &Resource) -> Option<Self> {
        Some(Self {
            id: resource.attr_str("id").unwrap_or_else(|| resource.id.clone()),
            description: resource.attr_str("description"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeographicalAreaNode {
    pub id: String,
    pub description: Option<String>,
}

impl GraphNode for GeographicalAreaNode {
    const KIND: NodeKind = NodeKind::GeographicalArea;

    fn from_resource(resource: &Resource) -> Option<Self> {
        Some(Self {
            id: resource
                .attr_str("geographical_area_id")
                .or_else(|| resource.attr_str("id"))
                .unwrap_or_else(|| resource.id.clone()),
            description: resource.attr_str("description"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DutyExpressionNode {
    pub id: String,
    pub base: Option<String>,
    pub formatted_base: Option<String>,
}

impl DutyExpressionNode {
    /// 优先使用格式化表达式
    pub fn expression(&self) -> Option<String> {
        self.formatted_base.clone().or_else(|| self.base.clone())
    }
}

impl GraphNode for DutyExpressionNode {
    const KIND: NodeKind = NodeKind::DutyExpression;

    fn from_resource(resource: &Resource) -> Option<Self> {
        Some(Self {
            id: resource.id.clone(),
            base: resource.attr_str("base"),
            formatted_base: resource.attr_str("formatted_base"),
        })
    }
}

/// 品目下的商品节点（含全部后代，靠缩进/父 sid 还原树形）
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityNode {
    pub sid: String,
    pub code10: String,
    pub suffix: String,
    pub description: Option<String>,
    pub indents: u32,
    /// 叶子节点 = 可申报
    pub leaf: bool,
    pub parent_sid: Option<String>,
}

impl GraphNode for CommodityNode {
    const KIND: NodeKind = NodeKind::Commodity;

    fn from_resource(resource: &Resource) -> Option<Self> {
        let code10 = resource.attr_str("goods_nomenclature_item_id")?;
        Some(Self {
            sid: resource
                .attr_str("goods_nomenclature_sid")
                .unwrap_or_else(|| resource.id.clone()),
            code10,
            suffix: resource
                .attr_str("producline_suffix")
                .unwrap_or_else(|| "80".to_string()),
            description: resource
                .attr_str("description")
                .or_else(|| resource.attr_str("formatted_description")),
            indents: resource.attr_u32("number_indents").unwrap_or(0),
            leaf: resource.attr_bool("leaf").unwrap_or(false),
            parent_sid: resource.attr_str("parent_sid"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionNode {
    pub id: String,
    pub numeral: Option<String>,
    pub title: Option<String>,
}

impl GraphNode for SectionNode {
    const KIND: NodeKind = NodeKind::Section;

    fn from_resource(resource: &Resource) -> Option<Self> {
        Some(Self {
            id: resource.attr_str("id").unwrap_or_else(|| resource.id.clone()),
            numeral: resource.attr_str("numeral"),
            title: resource.attr_str("title"),
        })
    }
}

/// 章/品目（included 中作为祖先或子节点出现）
#[derive(Debug, Clone, PartialEq)]
pub struct NomenclatureNode {
    pub code10: String,
    pub description: Option<String>,
    pub declarable: bool,
}

impl NomenclatureNode {
    fn from_any(resource: &Resource) -> Option<Self> {
        Some(Self {
            code10: resource.attr_str("goods_nomenclature_item_id")?,
            description: resource
                .attr_str("description")
                .or_else(|| resource.attr_str("formatted_description")),
            declarable: resource.attr_bool("declarable").unwrap_or(false),
        })
    }
}

/// 品目节点
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingRef(pub NomenclatureNode);

impl GraphNode for HeadingRef {
    const KIND: NodeKind = NodeKind::Heading;

    fn from_resource(resource: &Resource) -> Option<Self> {
        NomenclatureNode::from_any(resource).map(HeadingRef)
    }
}

/// 章节点
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef(pub NomenclatureNode);

impl GraphNode for ChapterRef {
    const KIND: NodeKind = NodeKind::Chapter;

    fn from_resource(resource: &Resource) -> Option<Self> {
        NomenclatureNode::from_any(resource).map(ChapterRef)
    }
}

// ==========================================
// RelationshipGraph
// ==========================================

/// 类型化关系图
pub struct RelationshipGraph {
    nodes: HashMap<(NodeKind, String), Resource>,
    /// included 中各节点的出现顺序（保证输出稳定）
    order: Vec<(NodeKind, String)>,
}

impl RelationshipGraph {
    /// 从 JSON:API 文档建立索引（主对象与 included 都入索引）
    pub fn from_document(doc: &JsonApiDocument) -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        for resource in doc.included.iter().chain(doc.data.as_slice().iter()) {
            graph.insert(resource.clone());
        }
        graph
    }

    fn insert(&mut self, resource: Resource) {
        let Some(kind) = NodeKind::from_type(&resource.kind) else {
            return;
        };
        let key = (kind, resource.id.clone());
        if !self.nodes.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.nodes.insert(key, resource);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 原始资源
    pub fn get(&self, kind: NodeKind, id: &str) -> Option<&Resource> {
        self.nodes.get(&(kind, id.to_string()))
    }

    /// 按引用解出类型化节点
    ///
    /// 引用类型与 T 不符或目标缺失时返回 None。
    pub fn resolve<T: GraphNode>(&self, reference: &ResourceRef) -> Option<T> {
        if NodeKind::from_type(&reference.kind)? != T::KIND {
            return None;
        }
        T::from_resource(self.get(T::KIND, &reference.id)?)
    }

    /// 单值关系
    pub fn related<T: GraphNode>(&self, resource: &Resource, rel: &str) -> Option<T> {
        self.resolve(resource.link_one(rel)?)
    }

    /// 多值关系（缺失目标被跳过）
    pub fn related_many<T: GraphNode>(&self, resource: &Resource, rel: &str) -> Vec<T> {
        resource
            .link_many(rel)
            .into_iter()
            .filter_map(|r| self.resolve(r))
            .collect()
    }

    /// 某类型的全部节点（按出现顺序）
    pub fn all<T: GraphNode>(&self) -> Vec<T> {
        self.order
            .iter()
            .filter(|(kind, _)| *kind == T::KIND)
            .filter_map(|key| self.nodes.get(key))
            .filter_map(T::from_resource)
            .collect()
    }

    /// 展开单条措施
    pub fn hydrate_measure(&self, measure: &Resource) -> Measure {
        let measure_type: Option<MeasureTypeNode> = self.related(measure, "measure_type");
        let area: Option<GeographicalAreaNode> = self.related(measure, "geographical_area");
        let duty: Option<DutyExpressionNode> = self.related(measure, "duty_expression");

        Measure {
            measure_id: measure.id.clone(),
            measure_type_id: measure_type
                .as_ref()
                .map(|t| t.id.clone())
                .or_else(|| measure.link_one("measure_type").map(|r| r.id.clone())),
            measure_type_description: measure_type.and_then(|t| t.description),
            geographical_area_id: area
                .as_ref()
                .map(|a| a.id.clone())
                .or_else(|| measure.link_one("geographical_area").map(|r| r.id.clone())),
            geographical_area_description: area.and_then(|a| a.description),
            duty_expression: duty.and_then(|d| d.expression()),
            effective_start: measure.attr_str("effective_start_date"),
            effective_end: measure.attr_str("effective_end_date"),
        }
    }

    /// 展开主对象某关系下的全部措施（如 import_measures）
    ///
    /// 关系不存在时退化为 included 中的全部措施。
    pub fn measures_for(&self, primary: &Resource, rel: &str) -> Vec<Measure> {
        let refs = primary.link_many(rel);
        if refs.is_empty() {
            return self.measures();
        }
        refs.into_iter()
            .filter(|r| NodeKind::from_type(&r.kind) == Some(NodeKind::Measure))
            .filter_map(|r| self.get(NodeKind::Measure, &r.id))
            .map(|m| self.hydrate_measure(m))
            .collect()
    }

    /// included 中的全部措施
    pub fn measures(&self) -> Vec<Measure> {
        self.order
            .iter()
            .filter(|(kind, _)| *kind == NodeKind::Measure)
            .filter_map(|key| self.nodes.get(key))
            .map(|m| self.hydrate_measure(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> JsonApiDocument {
        serde_json::from_value(json!({
            "data": {
                "id": "93797",
                "type": "commodity",
                "attributes": {
                    "goods_nomenclature_item_id": "8471300000",
                    "description": "Portable automatic data-processing machines",
                    "declarable": true
                },
                "relationships": {
                    "import_measures": {
                        "data": [
                            { "id": "m1", "type": "measure" },
                            { "id": "m2", "type": "measure" },
                            { "id": "missing", "type": "measure" }
                        ]
                    }
                }
            },
            "included": [
                {
                    "id": "m1",
                    "type": "measure",
                    "attributes": { "effective_start_date": "2021-01-01T00:00:00.000Z" },
                    "relationships": {
                        "measure_type": { "data": { "id": "103", "type": "measure_type" } },
                        "geographical_area": { "data": { "id": "1011", "type": "geographical_area" } },
                        "duty_expression": { "data": { "id": "m1-duty_expression", "type": "duty_expression" } }
                    }
                },
                {
                    "id": "m2",
                    "type": "measure",
                    "attributes": {},
                    "relationships": {
                        "measure_type": { "data": { "id": "305", "type": "measure_type" } },
                        "geographical_area": { "data": null },
                        "duty_expression": { "data": { "id": "gone", "type": "duty_expression" } }
                    }
                },
                { "id": "103", "type": "measure_type", "attributes": { "description": "Third country duty" } },
                { "id": "305", "type": "measure_type", "attributes": { "description": "Value added tax" } },
                {
                    "id": "1011",
                    "type": "geographical_area",
                    "attributes": { "geographical_area_id": "1011", "description": "ERGA OMNES" }
                },
                {
                    "id": "m1-duty_expression",
                    "type": "duty_expression",
                    "attributes": { "base": "2.00 %", "formatted_base": "<span>2.00</span> %" }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_hydrates_measures_in_relationship_order() {
        let doc = sample_document();
        let graph = RelationshipGraph::from_document(&doc);
        let primary = doc.data.first().unwrap();
        let measures = graph.measures_for(primary, "import_measures");

        // 缺失的 measure 引用被跳过
        assert_eq!(measures.len(), 2);

        let m1 = &measures[0];
        assert_eq!(m1.measure_type_id.as_deref(), Some("103"));
        assert_eq!(m1.measure_type_description.as_deref(), Some("Third country duty"));
        assert_eq!(m1.geographical_area_id.as_deref(), Some("1011"));
        assert_eq!(m1.geographical_area_description.as_deref(), Some("ERGA OMNES"));
        assert_eq!(m1.duty_expression.as_deref(), Some("<span>2.00</span> %"));
        assert!(m1.effective_start.is_some());
    }

    #[test]
    fn test_missing_targets_become_none() {
        let doc = sample_document();
        let graph = RelationshipGraph::from_document(&doc);
        let m2 = graph.measures().into_iter().find(|m| m.measure_id == "m2").unwrap();

        assert_eq!(m2.measure_type_id.as_deref(), Some("305"));
        assert_eq!(m2.geographical_area_id, None);
        assert_eq!(m2.geographical_area_description, None);
        assert_eq!(m2.duty_expression, None);
    }

    #[test]
    fn test_resolve_checks_node_kind() {
        let doc = sample_document();
        let graph = RelationshipGraph::from_document(&doc);

        let as_type = ResourceRef {
            id: "103".to_string(),
            kind: "measure_type".to_string(),
        };
        assert!(graph.resolve::<MeasureTypeNode>(&as_type).is_some());
        // 同一 id 以错误类型解引用
        assert!(graph.resolve::<GeographicalAreaNode>(&as_type).is_none());

        let unknown = ResourceRef {
            id: "x".to_string(),
            kind: "footnote".to_string(),
        };
        assert!(graph.resolve::<MeasureTypeNode>(&unknown).is_none());
    }
}
