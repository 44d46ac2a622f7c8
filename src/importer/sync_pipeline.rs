// ==========================================
// 关税归类引擎 - 批量同步管道实现
// ==========================================
// 流程: 占用槽位 → 建日志 → 解析 → 映射 → 合并 → 翻译 → 写镜像 → 写协定 → 完成
// 槽位占用在写任何日志之前；任何步骤失败都把日志标记为 failed
// 同步完成后清空所有依赖镜像数据的缓存
// ==========================================

use crate::config::EngineConfig;
use crate::domain::sync::{SyncInput, SyncOptions, SyncResult};
use crate::domain::tariff::{TariffRate, UpsertStats};
use crate::domain::types::SyncStatus;
use crate::engine::cache::{cache_keys, TtlCache};
use crate::engine::sync_coordinator::SyncCoordinator;
use crate::engine::translation::TranslationCache;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::TariffFieldMapper;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::{FileParser, RawRow, RecordMapper, TariffSyncer};
use crate::importer::merger::RecordMerger;
use crate::repository::{SyncCounts, SyncLogRepository, TariffRateRepository, TradeAgreementRepository};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// 各步骤完成后的进度
const PROGRESS_NOMENCLATURE: u8 = 10;
const PROGRESS_DUTIES: u8 = 20;
const PROGRESS_MERGED: u8 = 30;
const PROGRESS_TRANSLATED: u8 = 50;
const PROGRESS_UPSERTED: u8 = 90;
const PROGRESS_AGREEMENTS: u8 = 95;

/// 映射后的记录与映射失败行数
struct Mapped<T> {
    records: Vec<T>,
    failed: usize,
}

pub struct TariffSyncPipeline {
    coordinator: SyncCoordinator,
    logs: Arc<SyncLogRepository>,
    rates: Arc<TariffRateRepository>,
    agreements: Arc<TradeAgreementRepository>,
    translation: Arc<TranslationCache>,
    cache: Arc<TtlCache>,
    config: EngineConfig,
    file_parser: Box<dyn FileParser>,
    record_mapper: Box<dyn RecordMapper>,
}

impl TariffSyncPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: SyncCoordinator,
        logs: Arc<SyncLogRepository>,
        rates: Arc<TariffRateRepository>,
        agreements: Arc<TradeAgreementRepository>,
        translation: Arc<TranslationCache>,
        cache: Arc<TtlCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            coordinator,
            logs,
            rates,
            agreements,
            translation,
            cache,
            config,
            file_parser: Box::new(UniversalFileParser),
            record_mapper: Box::new(TariffFieldMapper),
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    fn progress(&self, sync_id: &str, progress: u8) -> ImportResult<()> {
        debug!(sync_id = %sync_id, progress = progress, "同步进度");
        self.logs.update_progress(sync_id, progress)?;
        Ok(())
    }

    fn parse<T, F>(&self, input: &SyncInput, map: F) -> ImportResult<Mapped<T>>
    where
        F: Fn(&dyn RecordMapper, &RawRow, usize) -> ImportResult<T>,
    {
        let raw_rows = self.file_parser.parse_to_raw_records(input)?;
        if raw_rows.is_empty() {
            return Err(ImportError::EmptyInput(input.display_name()));
        }

        let mut records = Vec::with_capacity(raw_rows.len());
        let mut failed = 0;
        let mut first_error = None;
        for (idx, row) in raw_rows.iter().enumerate() {
            // 表头占第 1 行
            match map(self.record_mapper.as_ref(), row, idx + 2) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(file = %input.display_name(), row_number = idx + 2, error = %e, "字段映射失败");
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        if records.is_empty() {
            return Err(first_error.unwrap_or_else(|| ImportError::EmptyInput(input.display_name())));
        }

        info!(
            file = %input.display_name(),
            success = records.len(),
            failed = failed,
            "字段映射完成"
        );
        Ok(Mapped { records, failed })
    }

    /// 翻译新增/变更的描述（失败批次跳过）
    async fn translate_descriptions(
        &self,
        sync_id: &str,
        rows: &mut [TariffRate],
        enabled: bool,
    ) -> ImportResult<usize> {
        let existing = self.rates.load_description_index()?;

        // 描述未变的行沿用已有中文
        for row in rows.iter_mut() {
            if let Some((Some(en), Some(cn))) = existing.get(&row.hs_code10) {
                if row.goods_description.as_deref() == Some(en.as_str()) {
                    row.goods_description_cn = Some(cn.clone());
                    self.translation.seed(en, cn);
                }
            }
        }

        if !enabled || !self.translation.is_enabled() {
            self.progress(sync_id, PROGRESS_TRANSLATED)?;
            return Ok(0);
        }

        let mut seen = HashSet::new();
        let pending: Vec<String> = rows
            .iter()
            .filter(|r| r.goods_description_cn.is_none())
            .filter_map(|r| r.goods_description.clone())
            .filter(|d| seen.insert(d.clone()))
            .collect();

        let batch_size = self.config.translation_batch_size.max(1);
        let batch_count = pending.len().div_ceil(batch_size).max(1);
        let mut translated = 0;

        for (idx, batch) in pending.chunks(batch_size).enumerate() {
            match self.translation.warm_batch(batch).await {
                Ok(n) => translated += n,
                Err(e) => warn!(sync_id = %sync_id, batch = idx, error = %e, "翻译批次失败，继续同步"),
            }
            let span = (PROGRESS_TRANSLATED - PROGRESS_MERGED) as usize;
            self.progress(
                sync_id,
                PROGRESS_MERGED + (span * (idx + 1) / batch_count) as u8,
            )?;
        }

        for row in rows.iter_mut().filter(|r| r.goods_description_cn.is_none()) {
            if let Some(description) = row.goods_description.as_deref() {
                row.goods_description_cn = self.translation.cached(description);
            }
        }

        self.progress(sync_id, PROGRESS_TRANSLATED)?;
        Ok(translated)
    }

    fn upsert_rates(&self, sync_id: &str, rows: &[TariffRate], mapping_failed: usize) -> ImportResult<UpsertStats> {
        let batch_size = self.config.upsert_batch_size.max(1);
        let batch_count = rows.len().div_ceil(batch_size).max(1);
        let span = (PROGRESS_UPSERTED - PROGRESS_TRANSLATED) as usize;
        let mut stats = UpsertStats::default();

        for (idx, batch) in rows.chunks(batch_size).enumerate() {
            stats.absorb(self.rates.upsert_batch(batch)?);
            self.logs.update_counts(
                sync_id,
                counts(rows.len(), stats, mapping_failed),
            )?;
            self.progress(
                sync_id,
                PROGRESS_TRANSLATED + (span * (idx + 1) / batch_count) as u8,
            )?;
        }

        self.progress(sync_id, PROGRESS_UPSERTED)?;
        Ok(stats)
    }

    fn invalidate_caches(&self) -> usize {
        [
            cache_keys::RATE_PREFIX,
            cache_keys::VALIDATION_PREFIX,
            cache_keys::HIERARCHY_PREFIX,
            cache_keys::SEARCH_PREFIX,
            cache_keys::DECLARABLE_PREFIX,
        ]
        .into_iter()
        .map(|prefix| self.cache.invalidate_prefix(prefix))
        .sum()
    }

    async fn execute(&self, sync_id: &str, options: &SyncOptions) -> ImportResult<SyncResult> {
        let started = Instant::now();

        // === 步骤 1: 商品目录 ===
        let nomenclature = self.parse(&options.nomenclature, |m, row, n| m.map_nomenclature(row, n))?;
        self.progress(sync_id, PROGRESS_NOMENCLATURE)?;

        // === 步骤 2: 税率 ===
        let duties = self.parse(&options.duties, |m, row, n| m.map_duty(row, n))?;
        self.progress(sync_id, PROGRESS_DUTIES)?;

        // === 步骤 3: 合并 ===
        let merged = RecordMerger::new(self.config.standard_vat_rate, options.taric_version.clone())
            .merge(&nomenclature.records, &duties.records);
        info!(
            sync_id = %sync_id,
            declarable = merged.declarable_count,
            rows = merged.rates.len(),
            agreements = merged.agreements.len(),
            "记录合并完成"
        );
        self.progress(sync_id, PROGRESS_MERGED)?;

        // === 步骤 4: 翻译 ===
        let mut rows = merged.rates;
        let translated_count = self
            .translate_descriptions(sync_id, &mut rows, options.translate)
            .await?;

        // === 步骤 5: 写入镜像 ===
        let mapping_failed = nomenclature.failed + duties.failed;
        let stats = self.upsert_rates(sync_id, &rows, mapping_failed)?;

        // === 步骤 6: 贸易协定 ===
        let agreement_count = self.agreements.upsert_batch(&merged.agreements)?;
        self.progress(sync_id, PROGRESS_AGREEMENTS)?;

        // === 步骤 7: 完成 ===
        self.logs
            .complete(sync_id, counts(rows.len(), stats, mapping_failed))?;
        let invalidated = self.invalidate_caches();
        debug!(sync_id = %sync_id, invalidated = invalidated, "缓存已失效");

        Ok(SyncResult {
            sync_id: sync_id.to_string(),
            status: SyncStatus::Completed,
            total_records: rows.len(),
            inserted_count: stats.inserted,
            updated_count: stats.updated,
            failed_count: stats.failed + mapping_failed,
            translated_count,
            agreement_count,
            taric_version: options.taric_version.clone(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }
}

fn counts(total: usize, stats: UpsertStats, mapping_failed: usize) -> SyncCounts {
    SyncCounts {
        total_records: total as i64,
        inserted_count: stats.inserted as i64,
        updated_count: stats.updated as i64,
        failed_count: (stats.failed + mapping_failed) as i64,
    }
}

#[async_trait]
impl TariffSyncer for TariffSyncPipeline {
    #[instrument(skip(self, options), fields(sync_id))]
    async fn run_sync(&self, options: SyncOptions) -> ImportResult<SyncResult> {
        let sync_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("sync_id", sync_id.as_str());

        // 先占槽位，冲突时不写任何日志
        let _guard = self.coordinator.try_start(&sync_id)?;

        self.logs.create(
            &sync_id,
            options.sync_type(),
            &options.data_source,
            options.taric_version.as_deref(),
        )?;
        info!(
            sync_id = %sync_id,
            nomenclature = %options.nomenclature.display_name(),
            duties = %options.duties.display_name(),
            "开始批量同步"
        );

        match self.execute(&sync_id, &options).await {
            Ok(result) => {
                info!(
                    sync_id = %sync_id,
                    total = result.total_records,
                    inserted = result.inserted_count,
                    updated = result.updated_count,
                    failed = result.failed_count,
                    translated = result.translated_count,
                    elapsed_ms = result.elapsed_ms,
                    "批量同步完成"
                );
                Ok(result)
            }
            Err(e) => {
                error!(sync_id = %sync_id, error = %e, "批量同步失败");
                if let Err(log_err) = self.logs.fail(&sync_id, &e.to_string()) {
                    warn!(sync_id = %sync_id, error = %log_err, "同步日志标记失败出错");
                }
                Err(e)
            }
        }
    }
}
