// ==========================================
// 关税归类引擎 - 多数据源税率解析
// ==========================================
// 顺序执行各 RateSource → 纯函数合并 → 翻译装饰 → RateResult
// 上游失败但已有数据: 结果带提示说明；无任何数据: 上升为 UpstreamUnavailable
// 上游明确 NotFound 且无任何数据: NotFound
// ==========================================

use crate::domain::rate::{PartialRate, RateResult};
use crate::domain::types::DataSource;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::rate_source::{merge_in_precedence_order, RateSource, SourceError, SourceOutcome};
use crate::engine::translation::TranslationCache;
use crate::i18n::t_with_args;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct MultiSourceResolver {
    sources: Vec<Arc<dyn RateSource>>,
    translation: Arc<TranslationCache>,
}

impl MultiSourceResolver {
    pub fn new(sources: Vec<Arc<dyn RateSource>>, translation: Arc<TranslationCache>) -> Self {
        Self {
            sources,
            translation,
        }
    }

    /// 解析 10 位编码在指定原产国下的税率
    #[instrument(skip(self))]
    pub async fn resolve_rate(
        &self,
        code10: &str,
        origin: Option<&str>,
    ) -> EngineResult<RateResult> {
        let origin = origin
            .map(|o| o.trim().to_uppercase())
            .filter(|o| !o.is_empty());

        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let result = source.fetch(code10, origin.as_deref()).await;
            debug!(
                source = %source.source(),
                has_data = matches!(result, Ok(Some(_))),
                error = result.as_ref().err().map(|e| e.to_string()),
                "数据源返回"
            );
            outcomes.push(SourceOutcome {
                source: source.source(),
                policy: source.policy(),
                result,
            });
        }

        let merged = merge_in_precedence_order(&outcomes);

        let Some(data_source) = merged.primary_source() else {
            return Err(match merged.first_hard_failure() {
                Some((source, e)) => {
                    warn!(code10 = %code10, source = %source, error = %e, "所有数据源均无数据且存在失败");
                    EngineError::UpstreamUnavailable(e.to_string())
                }
                None => EngineError::NotFound {
                    code: code10.to_string(),
                },
            });
        };

        let note = merged.first_hard_failure().map(|(source, e)| {
            warn!(code10 = %code10, source = %source, error = %e, "数据源失败，使用其余来源结果");
            let error = e.to_string();
            t_with_args(
                "tariff.partial_sources_note",
                &[("source", source.as_str()), ("error", error.as_str())],
            )
        });

        let rate = merged.rate;
        let measures = rate.measures.unwrap_or_default();
        let mut result = RateResult {
            hs_code: code10[..code10.len().min(8)].to_string(),
            hs_code10: code10.to_string(),
            origin_country_code: origin,
            duty_rate: rate.duty_rate,
            third_country_duty: rate.third_country_duty,
            anti_dumping_rate: rate.anti_dumping_rate,
            countervailing_rate: rate.countervailing_rate,
            vat_rate: rate.vat_rate,
            goods_description: rate.goods_description,
            goods_description_cn: rate.goods_description_cn,
            data_source,
            sources: merged.contributors,
            total_measures: measures.len(),
            measures,
            query_time: Utc::now(),
            from_cache: false,
            note,
        };

        self.translation.apply(&mut result).await;

        info!(
            code10 = %code10,
            data_source = %result.data_source,
            sources = result.sources.len(),
            duty_rate = ?result.duty_rate,
            vat_rate = ?result.vat_rate,
            "税率解析完成"
        );
        Ok(result)
    }

    /// 只向指定来源取数（不合并、不翻译）
    ///
    /// # 返回
    /// - Ok(None): 未配置该来源或来源无数据
    pub async fn fetch_from(
        &self,
        source: DataSource,
        code10: &str,
        origin: Option<&str>,
    ) -> EngineResult<Option<PartialRate>> {
        let origin = origin
            .map(|o| o.trim().to_uppercase())
            .filter(|o| !o.is_empty());
        let Some(provider) = self.sources.iter().find(|s| s.source() == source) else {
            return Ok(None);
        };
        match provider.fetch(code10, origin.as_deref()).await {
            Ok(partial) => Ok(partial),
            Err(SourceError::NotFound) => Ok(None),
            Err(e) => Err(EngineError::UpstreamUnavailable(e.to_string())),
        }
    }
}
