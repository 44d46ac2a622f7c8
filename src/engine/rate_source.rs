// ==========================================
// 关税归类引擎 - 税率数据源 / 合并策略
// ==========================================
// 数据源按顺序执行，各自声明合并策略:
//   1. 反倾销覆盖表  FillMissing（排第一，优先于本地镜像）
//   2. 本地镜像      FillMissing
//   3. 上游接口      Overwrite（提供的每个字段都覆盖之前的值）
// merge_in_precedence_order 为纯函数，不做 I/O
// ==========================================

use crate::domain::rate::PartialRate;
use crate::domain::types::DataSource;
use crate::engine::rate_extractor::{
    extract_anti_dumping_rate, extract_countervailing_rate, extract_preferential_duty,
    extract_third_country_duty, extract_vat_rate,
};
use crate::infra::tariff_api::{TariffApiClient, TariffApiError};
use crate::repository::{AntiDumpingRepository, TariffRateRepository};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// 只填充尚为空的字段
    FillMissing,
    /// 自身提供的字段覆盖已有值
    Overwrite,
}

/// 单一数据源错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("数据源未找到该编码")]
    NotFound,

    #[error("数据源不可用: {0}")]
    Unavailable(String),

    #[error("数据源读取失败: {0}")]
    Failed(String),
}

#[async_trait]
pub trait RateSource: Send + Sync {
    fn source(&self) -> DataSource;

    fn policy(&self) -> MergePolicy;

    /// Ok(None) 表示该源对此编码无数据（不是错误）
    async fn fetch(
        &self,
        code10: &str,
        origin: Option<&str>,
    ) -> Result<Option<PartialRate>, SourceError>;
}

/// 单个数据源的执行结果
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: DataSource,
    pub policy: MergePolicy,
    pub result: Result<Option<PartialRate>, SourceError>,
}

/// 合并结果
#[derive(Debug, Clone, Default)]
pub struct MergedRate {
    pub rate: PartialRate,
    /// 实际提供了数据的源（按执行顺序）
    pub contributors: Vec<DataSource>,
    pub failures: Vec<(DataSource, SourceError)>,
}

impl MergedRate {
    pub fn has_data(&self) -> bool {
        !self.contributors.is_empty()
    }

    /// 是否存在非 NotFound 的失败（上游不可用等）
    pub fn first_hard_failure(&self) -> Option<&(DataSource, SourceError)> {
        self.failures
            .iter()
            .find(|(_, e)| !matches!(e, SourceError::NotFound))
    }

    /// 结果的主来源: 上游 > 覆盖表 > 本地镜像
    pub fn primary_source(&self) -> Option<DataSource> {
        [
            DataSource::TradeTariffApi,
            DataSource::ChinaAntiDumpingDatabase,
            DataSource::LocalDatabase,
        ]
        .into_iter()
        .find(|s| self.contributors.contains(s))
    }
}

fn merge_field<T: Clone>(target: &mut Option<T>, incoming: &Option<T>, policy: MergePolicy) {
    match policy {
        MergePolicy::FillMissing => {
            if target.is_none() {
                target.clone_from(incoming);
            }
        }
        MergePolicy::Overwrite => {
            if incoming.is_some() {
                target.clone_from(incoming);
            }
        }
    }
}

fn merge_partial(target: &mut PartialRate, incoming: &PartialRate, policy: MergePolicy) {
    merge_field(&mut target.duty_rate, &incoming.duty_rate, policy);
    merge_field(&mut target.third_country_duty, &incoming.third_country_duty, policy);
    merge_field(&mut target.anti_dumping_rate, &incoming.anti_dumping_rate, policy);
    merge_field(&mut target.countervailing_rate, &incoming.countervailing_rate, policy);
    merge_field(&mut target.vat_rate, &incoming.vat_rate, policy);
    merge_field(&mut target.goods_description, &incoming.goods_description, policy);
    merge_field(&mut target.goods_description_cn, &incoming.goods_description_cn, policy);
    merge_field(&mut target.measures, &incoming.measures, policy);
}

/// 按执行顺序合并各数据源结果
pub fn merge_in_precedence_order(outcomes: &[SourceOutcome]) -> MergedRate {
    let mut merged = MergedRate::default();

    for outcome in outcomes {
        match &outcome.result {
            Ok(Some(partial)) if !partial.is_empty() => {
                merge_partial(&mut merged.rate, partial, outcome.policy);
                merged.contributors.push(outcome.source);
            }
            Ok(_) => {}
            Err(e) => merged.failures.push((outcome.source, e.clone())),
        }
    }

    merged
}

// ==========================================
// 数据源实现
// ==========================================

/// 反倾销覆盖表（需给出原产国）
pub struct OverrideRateSource {
    repo: Arc<AntiDumpingRepository>,
}

impl OverrideRateSource {
    pub fn new(repo: Arc<AntiDumpingRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RateSource for OverrideRateSource {
    fn source(&self) -> DataSource {
        DataSource::ChinaAntiDumpingDatabase
    }

    fn policy(&self) -> MergePolicy {
        MergePolicy::FillMissing
    }

    async fn fetch(
        &self,
        code10: &str,
        origin: Option<&str>,
    ) -> Result<Option<PartialRate>, SourceError> {
        let Some(origin) = origin else {
            return Ok(None);
        };
        let row = self
            .repo
            .find_best_match(code10, origin)
            .map_err(|e| SourceError::Failed(e.to_string()))?;

        Ok(row.map(|r| PartialRate {
            duty_rate: r.duty_rate,
            anti_dumping_rate: r.anti_dumping_rate,
            countervailing_rate: r.countervailing_rate,
            goods_description: r.goods_description,
            goods_description_cn: r.goods_description_cn,
            ..Default::default()
        }))
    }
}

/// 本地镜像
pub struct LocalMirrorRateSource {
    repo: Arc<TariffRateRepository>,
}

impl LocalMirrorRateSource {
    pub fn new(repo: Arc<TariffRateRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RateSource for LocalMirrorRateSource {
    fn source(&self) -> DataSource {
        DataSource::LocalDatabase
    }

    fn policy(&self) -> MergePolicy {
        MergePolicy::FillMissing
    }

    async fn fetch(
        &self,
        code10: &str,
        origin: Option<&str>,
    ) -> Result<Option<PartialRate>, SourceError> {
        let row = self
            .repo
            .find_by_code_origin(code10, origin)
            .map_err(|e| SourceError::Failed(e.to_string()))?;

        Ok(row.map(|r| PartialRate {
            duty_rate: r.duty_rate,
            third_country_duty: r.third_country_duty,
            anti_dumping_rate: r.anti_dumping_rate,
            countervailing_rate: r.countervailing_rate,
            vat_rate: r.vat_rate,
            goods_description: r.goods_description,
            goods_description_cn: r.goods_description_cn,
            measures: if r.measures.is_empty() {
                None
            } else {
                Some(r.measures)
            },
        }))
    }
}

/// 上游接口
pub struct RemoteApiRateSource {
    client: Arc<dyn TariffApiClient>,
    standard_vat_rate: f64,
}

impl RemoteApiRateSource {
    pub fn new(client: Arc<dyn TariffApiClient>, standard_vat_rate: f64) -> Self {
        Self {
            client,
            standard_vat_rate,
        }
    }
}

#[async_trait]
impl RateSource for RemoteApiRateSource {
    fn source(&self) -> DataSource {
        DataSource::TradeTariffApi
    }

    fn policy(&self) -> MergePolicy {
        MergePolicy::Overwrite
    }

    async fn fetch(
        &self,
        code10: &str,
        origin: Option<&str>,
    ) -> Result<Option<PartialRate>, SourceError> {
        let detail = self.client.get_commodity(code10).await.map_err(|e| match e {
            TariffApiError::NotFound(_) => SourceError::NotFound,
            other => SourceError::Unavailable(other.to_string()),
        })?;

        let measures = detail.measures;
        let third_country_duty = extract_third_country_duty(&measures);
        let duty_rate = extract_preferential_duty(&measures, origin).or(third_country_duty);

        Ok(Some(PartialRate {
            duty_rate,
            third_country_duty,
            anti_dumping_rate: extract_anti_dumping_rate(&measures, origin),
            countervailing_rate: extract_countervailing_rate(&measures, origin),
            vat_rate: Some(extract_vat_rate(&measures, self.standard_vat_rate)),
            goods_description: detail.description,
            goods_description_cn: None,
            measures: Some(measures),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        source: DataSource,
        policy: MergePolicy,
        result: Result<Option<PartialRate>, SourceError>,
    ) -> SourceOutcome {
        SourceOutcome {
            source,
            policy,
            result,
        }
    }

    #[test]
    fn test_override_wins_over_local_and_remote_overwrites_supplied_fields() {
        let override_rate = PartialRate {
            anti_dumping_rate: Some(85.0),
            goods_description_cn: Some("螺钉".to_string()),
            ..Default::default()
        };
        let local = PartialRate {
            duty_rate: Some(3.7),
            anti_dumping_rate: Some(10.0),
            vat_rate: Some(19.0),
            goods_description: Some("Screws (local)".to_string()),
            ..Default::default()
        };
        let remote = PartialRate {
            duty_rate: Some(3.0),
            vat_rate: Some(20.0),
            goods_description: Some("Screws".to_string()),
            ..Default::default()
        };

        let merged = merge_in_precedence_order(&[
            outcome(DataSource::ChinaAntiDumpingDatabase, MergePolicy::FillMissing, Ok(Some(override_rate))),
            outcome(DataSource::LocalDatabase, MergePolicy::FillMissing, Ok(Some(local))),
            outcome(DataSource::TradeTariffApi, MergePolicy::Overwrite, Ok(Some(remote))),
        ]);

        assert_eq!(merged.rate.anti_dumping_rate, Some(85.0));
        assert_eq!(merged.rate.duty_rate, Some(3.0));
        assert_eq!(merged.rate.vat_rate, Some(20.0));
        assert_eq!(merged.rate.goods_description.as_deref(), Some("Screws"));
        assert_eq!(merged.rate.goods_description_cn.as_deref(), Some("螺钉"));
        assert_eq!(merged.contributors.len(), 3);
        assert_eq!(merged.primary_source(), Some(DataSource::TradeTariffApi));
    }

    #[test]
    fn test_remote_failure_keeps_local_data() {
        let local = PartialRate {
            duty_rate: Some(2.0),
            ..Default::default()
        };
        let merged = merge_in_precedence_order(&[
            outcome(DataSource::ChinaAntiDumpingDatabase, MergePolicy::FillMissing, Ok(None)),
            outcome(DataSource::LocalDatabase, MergePolicy::FillMissing, Ok(Some(local))),
            outcome(
                DataSource::TradeTariffApi,
                MergePolicy::Overwrite,
                Err(SourceError::Unavailable("timeout".to_string())),
            ),
        ]);

        assert!(merged.has_data());
        assert_eq!(merged.rate.duty_rate, Some(2.0));
        assert_eq!(merged.primary_source(), Some(DataSource::LocalDatabase));
        assert!(merged.first_hard_failure().is_some());
    }

    #[test]
    fn test_empty_partials_do_not_count_as_contributors() {
        let merged = merge_in_precedence_order(&[
            outcome(DataSource::LocalDatabase, MergePolicy::FillMissing, Ok(Some(PartialRate::default()))),
            outcome(DataSource::TradeTariffApi, MergePolicy::Overwrite, Err(SourceError::NotFound)),
        ]);
        assert!(!merged.has_data());
        assert!(merged.first_hard_failure().is_none());
        assert_eq!(merged.primary_source(), None);
    }
}
