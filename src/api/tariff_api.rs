// ==========================================
// 关税归类引擎 - 归类/税率 API
// ==========================================
// 职责: 规范化入参 → 缓存 → 引擎服务 → 缓存回写
// 对外: validate_code / get_hierarchy / search_by_description / lookup_rate /
//       lookup_v2 / list_declarable_codes / batch_lookup / list_origin_countries /
//       query_local_rates / upsert_anti_dumping_override
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::EngineConfig;
use crate::domain::classification::{
    CountryCode, DeclarableCode, HierarchyTree, SearchHit, SearchResult, TaricLookupV2Result,
    ValidationResult,
};
use crate::domain::rate::{BatchLookupError, BatchLookupResult, RateResult};
use crate::domain::tariff::{AntiDumpingOverride, Paged, TariffRate, TariffRateQuery};
use crate::domain::types::{DataSource, MatchStatus};
use crate::engine::cache::{cache_keys, TtlCache};
use crate::engine::candidate::{rank_candidates, MAX_CANDIDATES};
use crate::engine::error::EngineError;
use crate::engine::hierarchy::HierarchyService;
use crate::engine::normalizer::normalize;
use crate::engine::resolver::MultiSourceResolver;
use crate::i18n::{t, t_with_args};
use crate::infra::tariff_api::TariffApiClient;
use crate::repository::{AntiDumpingRepository, TariffRateRepository};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct TariffApi {
    hierarchy: Arc<HierarchyService>,
    resolver: Arc<MultiSourceResolver>,
    client: Arc<dyn TariffApiClient>,
    rates: Arc<TariffRateRepository>,
    overrides: Arc<AntiDumpingRepository>,
    cache: Arc<TtlCache>,
    config: EngineConfig,
}

impl TariffApi {
    pub fn new(
        hierarchy: Arc<HierarchyService>,
        resolver: Arc<MultiSourceResolver>,
        client: Arc<dyn TariffApiClient>,
        rates: Arc<TariffRateRepository>,
        overrides: Arc<AntiDumpingRepository>,
        cache: Arc<TtlCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            hierarchy,
            resolver,
            client,
            rates,
            overrides,
            cache,
            config,
        }
    }

    // ==========================================
    // 校验 / 层级
    // ==========================================

    /// 编码校验（格式问题作为结果中的 error 返回）
    pub async fn validate_code(&self, code: &str) -> ApiResult<ValidationResult> {
        Ok(self.hierarchy.validate(code).await?)
    }

    pub async fn get_hierarchy(
        &self,
        prefix: &str,
        origin: Option<&str>,
    ) -> ApiResult<HierarchyTree> {
        Ok(self.hierarchy.get_hierarchy(prefix, origin).await?)
    }

    pub async fn list_declarable_codes(
        &self,
        prefix: &str,
        origin: Option<&str>,
    ) -> ApiResult<Vec<DeclarableCode>> {
        Ok(self.hierarchy.list_declarable_codes(prefix, origin).await?)
    }

    // ==========================================
    // 搜索
    // ==========================================

    /// 按描述搜索本地镜像（英文/中文/编码前缀）
    ///
    /// 给出原产国时，命中行用该原产国专属行覆盖 erga omnes 行。
    #[instrument(skip(self))]
    pub async fn search_by_description(
        &self,
        query: &str,
        chapter: Option<&str>,
        origin: Option<&str>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ApiResult<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::InvalidInput(t("tariff.empty_search_query")));
        }
        let chapter = match chapter.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(normalize(c).map_err(EngineError::from)?.chapter()),
            None => None,
        };
        let origin = origin
            .map(|o| o.trim().to_uppercase())
            .filter(|o| !o.is_empty());
        let (page, page_size) = self.config.clamp_page(page, page_size);

        let key = cache_keys::search(query, chapter.as_deref(), page, page_size, origin.as_deref());
        if let Some(mut cached) = self.cache.get_as::<SearchResult>(&key) {
            cached.from_cache = true;
            return Ok(cached);
        }

        let paged = self.rates.query(&TariffRateQuery {
            code_prefix: chapter,
            origin_country_code: Some(String::new()),
            is_active: Some(true),
            text: Some(query.to_string()),
            page,
            page_size,
            ..Default::default()
        })?;

        let mut items = Vec::with_capacity(paged.items.len());
        for row in &paged.items {
            let row = match origin.as_deref() {
                Some(origin) => self
                    .rates
                    .find_by_code_origin(&row.hs_code10, Some(origin))?
                    .unwrap_or_else(|| row.clone()),
                None => row.clone(),
            };
            items.push(SearchHit {
                hs_code10: row.hs_code10,
                origin_country_code: Some(row.origin_country_code).filter(|o| !o.is_empty()),
                goods_description: row.goods_description,
                goods_description_cn: row.goods_description_cn,
                duty_rate: row.duty_rate,
                vat_rate: row.vat_rate,
                anti_dumping_rate: row.anti_dumping_rate,
            });
        }

        let result = SearchResult {
            query: query.to_string(),
            total_pages: paged.total_pages(),
            total: paged.total,
            page,
            page_size,
            items,
            from_cache: false,
        };
        self.cache.set_as(&key, &result, self.config.search_ttl());
        info!(query = %query, total = result.total, page = page, "描述搜索完成");
        Ok(result)
    }

    // ==========================================
    // 税率
    // ==========================================

    /// 税率查询（带缓存）
    #[instrument(skip(self))]
    pub async fn lookup_rate(&self, code: &str, origin: Option<&str>) -> ApiResult<RateResult> {
        let normalized = normalize(code).map_err(EngineError::from)?;
        let code10 = normalized.pad10();

        let key = cache_keys::rate(&code10, origin);
        if let Some(mut cached) = self.cache.get_as::<RateResult>(&key) {
            debug!(code10 = %code10, "税率缓存命中");
            cached.from_cache = true;
            return Ok(cached);
        }

        let result = self.resolver.resolve_rate(&code10, origin).await?;
        // 降级结果不缓存
        if result.note.is_none() {
            self.cache.set_as(&key, &result, self.config.rate_ttl());
        }
        Ok(result)
    }

    /// 第二版查询: 校验 → exact | parent_node | not_found
    #[instrument(skip(self))]
    pub async fn lookup_v2(
        &self,
        code: &str,
        origin: Option<&str>,
        persist: bool,
    ) -> ApiResult<TaricLookupV2Result> {
        let validation = self.hierarchy.validate(code).await?;
        let match_status = validation.match_status();

        let mut result = TaricLookupV2Result {
            input_code: code.to_string(),
            normalized_code: validation.normalized_code.clone(),
            match_status,
            validation,
            rate: None,
            children: Vec::new(),
            candidates: Vec::new(),
            persisted: false,
            warning: None,
        };
        result.warning = result.validation.warning.clone();

        let Ok(normalized) = normalize(code) else {
            return Ok(result);
        };
        let code10 = normalized.pad10();

        match match_status {
            MatchStatus::Exact => match self.lookup_rate(&code10, origin).await {
                Ok(rate) => {
                    if persist && rate.sources.contains(&DataSource::TradeTariffApi) {
                        result.persisted = self.persist_rate(&code10, origin).await?;
                    }
                    result.rate = Some(rate);
                }
                Err(e) => {
                    warn!(code10 = %code10, error = %e, "可申报编码税率查询失败");
                    result.warning = Some(t_with_args(
                        "tariff.rate_unavailable",
                        &[("error", e.to_string().as_str())],
                    ));
                }
            },
            MatchStatus::ParentNode => {
                match self
                    .hierarchy
                    .list_declarable_codes(normalized.digits(), origin)
                    .await
                {
                    Ok(children) => result.children = children,
                    Err(e) => {
                        warn!(code = %normalized.digits(), error = %e, "下属可申报编码查询失败");
                        result.warning = Some(t_with_args(
                            "tariff.children_unavailable",
                            &[("error", e.to_string().as_str())],
                        ));
                    }
                }
            }
            MatchStatus::NotFound => {
                let pool = self.hierarchy.candidate_pool(&normalized).await;
                let six = &code10[..6];
                let (sharing_six, others): (Vec<_>, Vec<_>) =
                    pool.into_iter().partition(|(c, _)| c.starts_with(six));
                let pool = if sharing_six.is_empty() { others } else { sharing_six };
                result.candidates = rank_candidates(&code10, pool, MAX_CANDIDATES);
            }
        }

        info!(
            code = %code,
            match_status = %result.match_status,
            children = result.children.len(),
            candidates = result.candidates.len(),
            persisted = result.persisted,
            "第二版查询完成"
        );
        Ok(result)
    }

    /// 把上游提供的税率回写镜像（覆盖表等其他来源的字段不写入）
    ///
    /// # 返回
    /// - Ok(true): 已写入
    /// - Ok(false): 上游本次未提供数据
    async fn persist_rate(&self, code10: &str, origin: Option<&str>) -> ApiResult<bool> {
        let Some(remote) = self
            .resolver
            .fetch_from(DataSource::TradeTariffApi, code10, origin)
            .await?
        else {
            return Ok(false);
        };

        let row = TariffRate {
            id: None,
            hs_code: code10[..8].to_string(),
            hs_code10: code10.to_string(),
            origin_country_code: origin.map(|o| o.trim().to_uppercase()).unwrap_or_default(),
            duty_rate: remote.duty_rate,
            third_country_duty: remote.third_country_duty,
            anti_dumping_rate: remote.anti_dumping_rate,
            countervailing_rate: remote.countervailing_rate,
            vat_rate: remote.vat_rate,
            goods_description: remote.goods_description,
            goods_description_cn: remote.goods_description_cn,
            data_source: DataSource::TradeTariffApi,
            measures: remote.measures.unwrap_or_default(),
            taric_version: None,
            last_sync_time: Utc::now(),
            is_active: true,
        };
        let inserted = self.rates.upsert_one(&row)?;
        self.invalidate_local_views();
        info!(
            hs_code10 = %row.hs_code10,
            origin = %row.origin_country_code,
            inserted = inserted,
            "上游税率已回写"
        );
        Ok(true)
    }

    /// 批量税率查询: 分波并发，波间等待
    #[instrument(skip(self, codes), fields(count = codes.len()))]
    pub async fn batch_lookup(
        &self,
        codes: &[String],
        origin: Option<&str>,
        concurrency: Option<usize>,
    ) -> ApiResult<BatchLookupResult> {
        let concurrency = concurrency
            .unwrap_or(self.config.batch_concurrency)
            .max(1);
        let waves: Vec<&[String]> = codes.chunks(concurrency).collect();
        let wave_count = waves.len();

        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (idx, wave) in waves.into_iter().enumerate() {
            let outcomes = join_all(
                wave.iter()
                    .map(|code| async move { (code, self.lookup_rate(code, origin).await) }),
            )
            .await;

            for (code, outcome) in outcomes {
                match outcome {
                    Ok(rate) => results.push(rate),
                    Err(e) => errors.push(BatchLookupError {
                        code: code.clone(),
                        error: e.to_string(),
                    }),
                }
            }

            if idx + 1 < wave_count {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        info!(
            total = codes.len(),
            success = results.len(),
            failed = errors.len(),
            "批量查询完成"
        );
        Ok(BatchLookupResult {
            total_count: codes.len(),
            success_count: results.len(),
            failed_count: errors.len(),
            results,
            errors,
        })
    }

    // ==========================================
    // 元数据 / 本地镜像
    // ==========================================

    /// 原产国列表（7 天缓存）
    pub async fn list_origin_countries(&self) -> ApiResult<Vec<CountryCode>> {
        if let Some(cached) = self.cache.get_as::<Vec<CountryCode>>(cache_keys::COUNTRIES) {
            return Ok(cached);
        }
        let countries = self
            .client
            .get_countries()
            .await
            .map_err(EngineError::from)?;
        self.cache
            .set_as(cache_keys::COUNTRIES, &countries, self.config.countries_ttl());
        Ok(countries)
    }

    /// 本地镜像过滤分页查询
    pub fn query_local_rates(&self, query: TariffRateQuery) -> ApiResult<Paged<TariffRate>> {
        if let (Some(min), Some(max)) = (query.min_duty_rate, query.max_duty_rate) {
            if min > max {
                return Err(ApiError::InvalidInput(format!(
                    "税率范围无效: min={} > max={}",
                    min, max
                )));
            }
        }
        // 0 视为未指定
        let (page, page_size) = self.config.clamp_page(
            Some(query.page).filter(|p| *p > 0),
            Some(query.page_size).filter(|s| *s > 0),
        );
        Ok(self.rates.query(&TariffRateQuery {
            page,
            page_size,
            ..query
        })?)
    }

    /// 维护反倾销覆盖表
    pub fn upsert_anti_dumping_override(&self, record: AntiDumpingOverride) -> ApiResult<i64> {
        for (field, value) in [
            ("duty_rate", record.duty_rate),
            ("anti_dumping_rate", record.anti_dumping_rate),
            ("countervailing_rate", record.countervailing_rate),
        ] {
            if value.map(|v| v < 0.0).unwrap_or(false) {
                return Err(ApiError::InvalidInput(format!("{} 不能为负数", field)));
            }
        }
        let id = self.overrides.upsert(&record)?;
        let invalidated = self.cache.invalidate_prefix(cache_keys::RATE_PREFIX);
        info!(
            id = id,
            hs_code = %record.hs_code,
            origin = %record.origin_country_code,
            invalidated = invalidated,
            "反倾销覆盖已更新"
        );
        Ok(id)
    }

    fn invalidate_local_views(&self) {
        for prefix in [
            cache_keys::SEARCH_PREFIX,
            cache_keys::HIERARCHY_PREFIX,
            cache_keys::DECLARABLE_PREFIX,
        ] {
            self.cache.invalidate_prefix(prefix);
        }
    }
}
