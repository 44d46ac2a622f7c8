// ==========================================
// 关税归类引擎 - 层级与校验服务
// ==========================================
// validate: 按层级分派（章/品目 → 节点本身；子目及以下 → 10 位商品）
//   - 非可申报节点统计其可申报后代（回查所属品目，按有效前缀过滤）
//   - 不存在的编码附带所属品目与至多 5 个共享前 6 位的可申报编码
//   - 上游不可用时回落本地镜像并附带提示，本地也无数据则报错
// get_hierarchy: 章 → 品目列表；品目及以下 → 可申报后代按直接父节点分组
// ==========================================

use crate::config::EngineConfig;
use crate::domain::classification::{
    BreadcrumbEntry, DeclarableCode, HierarchyGroup, HierarchyTree, NodeSummary, ValidationResult,
};
use crate::domain::tariff::TariffRate;
use crate::domain::types::ClassificationLevel;
use crate::engine::cache::{cache_keys, TtlCache};
use crate::engine::candidate::rank_candidates;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph::CommodityNode;
use crate::engine::normalizer::{normalize, pad_right, significant_prefix, NormalizedCode};
use crate::engine::translation::TranslationCache;
use crate::i18n::{t, t_with_args};
use crate::infra::tariff_api::{CommodityDetail, HeadingDetail, TariffApiClient, TariffApiError};
use crate::repository::TariffRateRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 不存在编码附带的相似编码上限
pub const MAX_SIMILAR_CODES: usize = 5;

pub struct HierarchyService {
    client: Arc<dyn TariffApiClient>,
    rates: Arc<TariffRateRepository>,
    cache: Arc<TtlCache>,
    translation: Arc<TranslationCache>,
    config: EngineConfig,
}

impl HierarchyService {
    pub fn new(
        client: Arc<dyn TariffApiClient>,
        rates: Arc<TariffRateRepository>,
        cache: Arc<TtlCache>,
        translation: Arc<TranslationCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            rates,
            cache,
            translation,
            config,
        }
    }

    // ==========================================
    // 校验
    // ==========================================

    /// 校验编码
    ///
    /// 格式错误不报错，作为 `error` 字段返回。
    #[instrument(skip(self))]
    pub async fn validate(&self, input: &str) -> EngineResult<ValidationResult> {
        let code = match normalize(input) {
            Ok(code) => code,
            Err(e) => {
                let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
                let mut result = ValidationResult::empty(input, &digits);
                result.error = Some(e.to_string());
                return Ok(result);
            }
        };

        let key = cache_keys::validation(code.digits());
        if let Some(mut cached) = self.cache.get_as::<ValidationResult>(&key) {
            cached.input_code = input.to_string();
            cached.from_cache = true;
            return Ok(cached);
        }

        let outcome = match code.level() {
            ClassificationLevel::Chapter => self.validate_chapter(input, &code).await,
            ClassificationLevel::Heading => self.validate_heading(input, &code).await,
            _ => self.validate_commodity(input, &code).await,
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(EngineError::UpstreamUnavailable(reason)) => {
                warn!(code = %code.digits(), reason = %reason, "上游不可用，回落本地镜像校验");
                self.validate_from_mirror(input, &code, &reason)?
            }
            Err(e) => return Err(e),
        };

        self.translation.apply(&mut result).await;

        if result.warning.is_none() {
            self.cache
                .set_as(&key, &result, self.config.validation_ttl());
        }

        info!(
            code = %code.digits(),
            level = %code.level(),
            is_valid = result.is_valid,
            is_declarable = result.is_declarable,
            child_count = result.child_count,
            "编码校验完成"
        );
        Ok(result)
    }

    async fn validate_chapter(
        &self,
        input: &str,
        code: &NormalizedCode,
    ) -> EngineResult<ValidationResult> {
        let detail = match self.client.get_chapter(&code.chapter()).await {
            Ok(detail) => detail,
            Err(TariffApiError::NotFound(_)) => {
                let mut result = ValidationResult::empty(input, code.digits());
                result.level = Some(ClassificationLevel::Chapter);
                result.error = Some(t_with_args("tariff.code_not_found", &[("code", code.chapter().as_str())]));
                return Ok(result);
            }
            Err(e) => return Err(e.into()),
        };

        let mut result = ValidationResult::empty(input, code.digits());
        result.is_valid = true;
        result.level = Some(ClassificationLevel::Chapter);
        result.has_children = true;
        result.child_count = detail.headings.len();
        result.declarable_count = detail.headings.iter().filter(|h| h.declarable).count();
        result.description = detail.description.clone();
        result.breadcrumb = vec![BreadcrumbEntry {
            code: code.chapter(),
            level: ClassificationLevel::Chapter,
            description: detail.description,
        }];
        Ok(result)
    }

    async fn validate_heading(
        &self,
        input: &str,
        code: &NormalizedCode,
    ) -> EngineResult<ValidationResult> {
        let heading = match self.client.get_heading(&code.heading()).await {
            Ok(heading) => heading,
            Err(TariffApiError::NotFound(_)) => {
                let mut result = ValidationResult::empty(input, code.digits());
                result.level = Some(ClassificationLevel::Heading);
                result.error = Some(t_with_args("tariff.code_not_found", &[("code", code.heading().as_str())]));
                result.parent_code = Some(code.chapter());
                return Ok(result);
            }
            Err(e) => return Err(e.into()),
        };

        let child_count = immediate_children(&heading.commodities).len();

        let mut result = ValidationResult::empty(input, code.digits());
        result.is_valid = true;
        result.is_declarable = heading.declarable;
        result.level = Some(ClassificationLevel::Heading);
        result.child_count = child_count;
        result.has_children = child_count > 0;
        result.declarable_count = heading.declarable_commodities().count();
        result.description = heading.description.clone();
        result.parent_code = Some(code.chapter());
        result.parent_description = heading.chapter.as_ref().and_then(|c| c.description.clone());
        result.breadcrumb = heading_breadcrumb(code, &heading);
        Ok(result)
    }

    async fn validate_commodity(
        &self,
        input: &str,
        code: &NormalizedCode,
    ) -> EngineResult<ValidationResult> {
        let code10 = code.pad10();

        let detail = match self.client.get_commodity(&code10).await {
            Ok(detail) => detail,
            Err(TariffApiError::NotFound(_)) => return self.not_found_result(input, code).await,
            Err(e) => return Err(e.into()),
        };

        let mut result = ValidationResult::empty(input, code.digits());
        result.is_valid = true;
        result.is_declarable = detail.declarable;
        result.level = Some(code.level());
        result.description = detail.description.clone();

        if !detail.declarable {
            let prefix = significant_prefix(&code10, 6).to_string();
            let count = match self.client.get_heading(&code.heading()).await {
                Ok(heading) => declarable_descendants(&heading, &prefix, &code10).count(),
                Err(e) => {
                    warn!(code10 = %code10, error = %e, "回查品目失败，可申报后代计数为 0");
                    0
                }
            };
            result.child_count = count;
            result.declarable_count = count;
            result.has_children = count > 0;
        }

        let (parent_code, parent_description) = commodity_parent(code, &detail);
        result.parent_code = Some(parent_code);
        result.parent_description = parent_description;
        result.breadcrumb = commodity_breadcrumb(code, &detail);
        Ok(result)
    }

    async fn not_found_result(
        &self,
        input: &str,
        code: &NormalizedCode,
    ) -> EngineResult<ValidationResult> {
        let code10 = code.pad10();
        let mut result = ValidationResult::empty(input, code.digits());
        result.level = Some(code.level());
        result.error = Some(t_with_args("tariff.code_not_found", &[("code", code.digits())]));

        match self.client.get_heading(&code.heading()).await {
            Ok(heading) => {
                result.parent_code = Some(heading.code4().to_string());
                result.parent_description = heading.description.clone();

                let sibling_prefix = &code10[..6];
                let pool: Vec<(String, Option<String>)> = heading
                    .declarable_commodities()
                    .filter(|c| c.code10.starts_with(sibling_prefix))
                    .map(|c| (c.code10.clone(), c.description.clone()))
                    .collect();
                result.similar_codes = rank_candidates(&code10, pool, MAX_SIMILAR_CODES);
            }
            Err(TariffApiError::NotFound(_)) => {
                debug!(heading = %code.heading(), "所属品目也不存在");
            }
            Err(e) => warn!(heading = %code.heading(), error = %e, "读取所属品目失败"),
        }

        Ok(result)
    }

    /// 本地镜像回落
    fn validate_from_mirror(
        &self,
        input: &str,
        code: &NormalizedCode,
        reason: &str,
    ) -> EngineResult<ValidationResult> {
        let prefix = significant_prefix(code.digits(), 2).to_string();
        let rows = self.rates.find_by_prefix(&prefix, None)?;
        if rows.is_empty() {
            return Err(EngineError::UpstreamUnavailable(reason.to_string()));
        }

        let code10 = code.pad10();
        let exact = rows.iter().find(|r| r.hs_code10 == code10);
        let is_declarable = exact.is_some() && code.level() >= ClassificationLevel::Subheading;
        let descendants = rows.iter().filter(|r| r.hs_code10 != code10).count();

        let mut result = ValidationResult::empty(input, code.digits());
        result.is_valid = true;
        result.is_declarable = is_declarable;
        result.level = Some(code.level());
        result.has_children = descendants > 0 || code.level() == ClassificationLevel::Chapter;
        result.child_count = descendants;
        result.declarable_count = descendants;
        result.description = exact.and_then(|r| r.goods_description.clone());
        result.description_cn = exact.and_then(|r| r.goods_description_cn.clone());
        if code.level() > ClassificationLevel::Chapter {
            result.parent_code = Some(code.chapter());
        }
        result.breadcrumb = build_breadcrumb(code, |_| None);
        result.warning = Some(t("tariff.validation_fallback"));
        Ok(result)
    }

    // ==========================================
    // 层级
    // ==========================================

    /// 层级树
    #[instrument(skip(self))]
    pub async fn get_hierarchy(
        &self,
        prefix: &str,
        origin: Option<&str>,
    ) -> EngineResult<HierarchyTree> {
        let code = normalize(prefix)?;
        let origin = normalize_origin(origin);

        let key = cache_keys::hierarchy(code.digits(), origin.as_deref());
        if let Some(mut cached) = self.cache.get_as::<HierarchyTree>(&key) {
            cached.from_cache = true;
            return Ok(cached);
        }

        let mut tree = match code.level() {
            ClassificationLevel::Chapter => self.chapter_tree(&code, origin.clone()).await?,
            _ => self.heading_tree(&code, origin.clone()).await?,
        };

        if let Some(node) = tree.node.as_mut() {
            self.translation.apply(node).await;
        }
        self.translation.apply_all(&mut tree.headings).await;
        for group in tree.groups.iter_mut() {
            self.translation.apply_all(&mut group.children).await;
        }

        self.cache.set_as(&key, &tree, self.config.hierarchy_ttl());
        info!(
            prefix = %code.digits(),
            headings = tree.headings.len(),
            groups = tree.groups.len(),
            total_declarable = tree.total_declarable,
            "层级树构建完成"
        );
        Ok(tree)
    }

    async fn chapter_tree(
        &self,
        code: &NormalizedCode,
        origin: Option<String>,
    ) -> EngineResult<HierarchyTree> {
        let detail = self.client.get_chapter(&code.chapter()).await?;

        let headings: Vec<NodeSummary> = detail
            .headings
            .iter()
            .map(|h| NodeSummary {
                code: h.code10[..4.min(h.code10.len())].to_string(),
                level: ClassificationLevel::Heading,
                description: h.description.clone(),
                description_cn: None,
                declarable: h.declarable,
            })
            .collect();

        Ok(HierarchyTree {
            prefix: code.digits().to_string(),
            level: ClassificationLevel::Chapter,
            origin_country_code: origin,
            section: detail.section.clone(),
            node: Some(NodeSummary {
                code: code.chapter(),
                level: ClassificationLevel::Chapter,
                description: detail.description.clone(),
                description_cn: None,
                declarable: false,
            }),
            breadcrumb: vec![BreadcrumbEntry {
                code: code.chapter(),
                level: ClassificationLevel::Chapter,
                description: detail.description,
            }],
            total_declarable: headings.iter().filter(|h| h.declarable).count(),
            headings,
            groups: Vec::new(),
            from_cache: false,
        })
    }

    async fn heading_tree(
        &self,
        code: &NormalizedCode,
        origin: Option<String>,
    ) -> EngineResult<HierarchyTree> {
        let heading = self.client.get_heading(&code.heading()).await?;
        let code10 = code.pad10();
        let prefix = significant_prefix(&code10, 4).to_string();

        let mut groups = group_declarables(&heading, &prefix);

        if let Some(origin) = origin.as_deref() {
            let rows: HashMap<String, TariffRate> = self
                .rates
                .find_by_prefix(&prefix, Some(origin))?
                .into_iter()
                .map(|r| (r.hs_code10.clone(), r))
                .collect();
            for group in groups.iter_mut() {
                for child in group.children.iter_mut() {
                    if let Some(row) = rows.get(&child.code) {
                        attach_local_rate(child, row);
                    }
                }
            }
        }

        let node = if code.level() == ClassificationLevel::Heading {
            Some(NodeSummary {
                code: heading.code4().to_string(),
                level: ClassificationLevel::Heading,
                description: heading.description.clone(),
                description_cn: None,
                declarable: heading.declarable,
            })
        } else {
            heading
                .commodities
                .iter()
                .find(|c| c.code10 == code10 && c.suffix == "80")
                .map(|c| NodeSummary {
                    code: c.code10.clone(),
                    level: code.level(),
                    description: c.description.clone(),
                    description_cn: None,
                    declarable: c.leaf,
                })
        };

        Ok(HierarchyTree {
            prefix: code.digits().to_string(),
            level: code.level(),
            origin_country_code: origin,
            section: heading.section.clone(),
            node,
            breadcrumb: heading_breadcrumb(code, &heading),
            headings: Vec::new(),
            total_declarable: groups.iter().map(|g| g.children.len()).sum(),
            groups,
            from_cache: false,
        })
    }

    /// 前缀下的可申报编码（平铺）
    #[instrument(skip(self))]
    pub async fn list_declarable_codes(
        &self,
        prefix: &str,
        origin: Option<&str>,
    ) -> EngineResult<Vec<DeclarableCode>> {
        let code = normalize(prefix)?;
        let origin = normalize_origin(origin);

        let key = cache_keys::declarable(code.digits(), origin.as_deref());
        if let Some(cached) = self.cache.get_as::<Vec<DeclarableCode>>(&key) {
            return Ok(cached);
        }

        let codes = if code.level() == ClassificationLevel::Chapter {
            // 章级别逐个品目拉取代价过高，使用本地镜像
            let rows = self.rates.find_by_prefix(code.digits(), origin.as_deref())?;
            let mut codes: Vec<DeclarableCode> = rows
                .iter()
                .map(|row| {
                    let mut c = DeclarableCode::new(&row.hs_code10, row.goods_description.clone());
                    attach_local_rate(&mut c, row);
                    c
                })
                .collect();
            if codes.is_empty() {
                let detail = self.client.get_chapter(&code.chapter()).await?;
                codes = detail
                    .headings
                    .iter()
                    .filter(|h| h.declarable)
                    .map(|h| DeclarableCode::new(&h.code10, h.description.clone()))
                    .collect();
            }
            self.translation.apply_all(&mut codes).await;
            codes
        } else {
            self.get_hierarchy(code.digits(), origin.as_deref())
                .await?
                .groups
                .into_iter()
                .flat_map(|g| g.children)
                .collect()
        };

        self.cache.set_as(&key, &codes, self.config.declarable_ttl());
        Ok(codes)
    }

    /// 候选池: 上游所属品目的可申报编码 + 本地镜像同品目编码
    pub async fn candidate_pool(&self, code: &NormalizedCode) -> Vec<(String, Option<String>)> {
        let mut pool = Vec::new();

        match self.client.get_heading(&code.heading()).await {
            Ok(heading) => pool.extend(
                heading
                    .declarable_commodities()
                    .map(|c| (c.code10.clone(), c.description.clone())),
            ),
            Err(e) => debug!(heading = %code.heading(), error = %e, "候选池: 上游品目不可用"),
        }

        match self.rates.find_by_prefix(&code.heading(), None) {
            Ok(rows) => pool.extend(
                rows.into_iter()
                    .map(|r| (r.hs_code10, r.goods_description)),
            ),
            Err(e) => warn!(heading = %code.heading(), error = %e, "候选池: 本地镜像读取失败"),
        }

        pool
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn normalize_origin(origin: Option<&str>) -> Option<String> {
    origin
        .map(|o| o.trim().to_uppercase())
        .filter(|o| !o.is_empty())
}

/// 品目的直接子节点（缩进最小的一层）
fn immediate_children(commodities: &[CommodityNode]) -> Vec<&CommodityNode> {
    let Some(min_indent) = commodities.iter().map(|c| c.indents).min() else {
        return Vec::new();
    };
    commodities
        .iter()
        .filter(|c| c.indents == min_indent)
        .collect()
}

/// 品目下位于 prefix 之下的可申报后代（不含节点本身）
fn declarable_descendants<'a>(
    heading: &'a HeadingDetail,
    prefix: &'a str,
    self_code10: &'a str,
) -> impl Iterator<Item = &'a CommodityNode> {
    heading
        .declarable_commodities()
        .filter(move |c| c.code10.starts_with(prefix) && c.code10 != self_code10)
}

/// 可申报后代按直接父节点分组（保持上游顺序）
fn group_declarables(heading: &HeadingDetail, prefix: &str) -> Vec<HierarchyGroup> {
    let mut groups: Vec<HierarchyGroup> = Vec::new();
    let mut stack: Vec<&CommodityNode> = Vec::new();

    for commodity in &heading.commodities {
        while stack
            .last()
            .map(|top| top.indents >= commodity.indents)
            .unwrap_or(false)
        {
            stack.pop();
        }

        let declarable = commodity.leaf && commodity.suffix == "80";
        if declarable && commodity.code10.starts_with(prefix) {
            let (parent_code, parent_description) = match stack.last() {
                Some(parent) => (parent.code10.clone(), parent.description.clone()),
                None => (heading.code4().to_string(), heading.description.clone()),
            };
            let child = DeclarableCode::new(&commodity.code10, commodity.description.clone());

            match groups.iter_mut().find(|g| g.parent_code == parent_code) {
                Some(group) => group.children.push(child),
                None => groups.push(HierarchyGroup {
                    parent_code,
                    parent_description,
                    children: vec![child],
                }),
            }
        }

        if !commodity.leaf {
            stack.push(commodity);
        }
    }

    groups
}

fn attach_local_rate(code: &mut DeclarableCode, row: &TariffRate) {
    code.duty_rate = row.duty_rate;
    code.vat_rate = row.vat_rate;
    code.anti_dumping_rate = row.anti_dumping_rate;
    code.countervailing_rate = row.countervailing_rate;
    if code.description_cn.is_none() {
        code.description_cn = row.goods_description_cn.clone();
    }
}

/// 面包屑: 从章到查询层级，每一项编码都是下一项的严格前缀
pub fn build_breadcrumb<F>(code: &NormalizedCode, describe: F) -> Vec<BreadcrumbEntry>
where
    F: Fn(&str) -> Option<String>,
{
    code.level()
        .path()
        .into_iter()
        .map(|level| {
            let entry_code = code.at_level(level);
            let description = describe(&pad_right(&entry_code, 10));
            BreadcrumbEntry {
                code: entry_code,
                level,
                description,
            }
        })
        .collect()
}

fn heading_breadcrumb(code: &NormalizedCode, heading: &HeadingDetail) -> Vec<BreadcrumbEntry> {
    let mut descriptions: HashMap<String, Option<String>> = HashMap::new();
    if let Some(chapter) = heading.chapter.as_ref() {
        descriptions.insert(chapter.code10.clone(), chapter.description.clone());
    }
    descriptions.insert(heading.code10.clone(), heading.description.clone());
    for c in &heading.commodities {
        descriptions
            .entry(c.code10.clone())
            .or_insert_with(|| c.description.clone());
    }
    build_breadcrumb(code, |code10| descriptions.get(code10).cloned().flatten())
}

fn commodity_breadcrumb(code: &NormalizedCode, detail: &CommodityDetail) -> Vec<BreadcrumbEntry> {
    let mut descriptions: HashMap<String, Option<String>> = HashMap::new();
    for node in detail.chapter.iter().chain(detail.heading.iter()) {
        descriptions.insert(node.code10.clone(), node.description.clone());
    }
    for ancestor in &detail.ancestors {
        descriptions
            .entry(ancestor.code10.clone())
            .or_insert_with(|| ancestor.description.clone());
    }
    descriptions.insert(detail.code10.clone(), detail.description.clone());
    build_breadcrumb(code, |code10| descriptions.get(code10).cloned().flatten())
}

fn commodity_parent(code: &NormalizedCode, detail: &CommodityDetail) -> (String, Option<String>) {
    if let Some(parent) = detail
        .ancestors
        .iter()
        .filter(|a| a.code10 != detail.code10)
        .max_by_key(|a| a.indents)
    {
        return (parent.code10.clone(), parent.description.clone());
    }
    (
        code.heading(),
        detail.heading.as_ref().and_then(|h| h.description.clone()),
    )
}
