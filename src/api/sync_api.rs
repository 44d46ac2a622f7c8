// ==========================================
// 关税归类引擎 - 批量同步 API
// ==========================================
// 职责: 触发同步、查询同步状态/历史
// 同一时间至多一个同步任务；冲突同步返回 Conflict 且不写日志
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::sync::{SyncLog, SyncOptions, SyncResult};
use crate::domain::tariff::TradeAgreement;
use crate::importer::{TariffSyncPipeline, TariffSyncer};
use crate::repository::{SyncLogRepository, TradeAgreementRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// 默认/最大历史条数
const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 200;

/// 同步历史响应（带分页信息）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryResponse {
    pub logs: Vec<SyncLog>,
    /// 总记录数
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// 同步状态响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// 进程内是否有同步正在运行
    pub is_running: bool,
    pub log: Option<SyncLog>,
}

pub struct SyncApi {
    pipeline: Arc<TariffSyncPipeline>,
    logs: Arc<SyncLogRepository>,
    agreements: Arc<TradeAgreementRepository>,
}

impl SyncApi {
    pub fn new(
        pipeline: Arc<TariffSyncPipeline>,
        logs: Arc<SyncLogRepository>,
        agreements: Arc<TradeAgreementRepository>,
    ) -> Self {
        Self {
            pipeline,
            logs,
            agreements,
        }
    }

    /// 执行一次完整同步
    pub async fn run_sync(&self, options: SyncOptions) -> ApiResult<SyncResult> {
        Ok(self.pipeline.run_sync(options).await?)
    }

    /// 查询指定同步任务；未指定时返回最近一次
    pub fn get_sync_status(&self, sync_id: Option<&str>) -> ApiResult<SyncStatusResponse> {
        let log = match sync_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => Some(
                self.logs
                    .find_by_id(id)?
                    .ok_or_else(|| ApiError::NotFound(format!("同步任务(id={})不存在", id)))?,
            ),
            None => self.logs.find_latest()?,
        };

        Ok(SyncStatusResponse {
            is_running: self.pipeline.coordinator().is_running(),
            log,
        })
    }

    /// 同步历史（按开始时间倒序）
    pub fn list_sync_history(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ApiResult<SyncHistoryResponse> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0);

        let logs = self.logs.list(limit, offset)?;
        let total = self.logs.count()?;
        info!(total = total, returned = logs.len(), "查询同步历史");

        Ok(SyncHistoryResponse {
            logs,
            total,
            limit,
            offset,
        })
    }

    /// 同步得到的贸易协定
    pub fn list_trade_agreements(&self) -> ApiResult<Vec<TradeAgreement>> {
        Ok(self.agreements.list_all()?)
    }
}
