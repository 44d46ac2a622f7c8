// ==========================================
// 关税归类引擎 - 引擎层错误类型
// ==========================================
// 上游 404 → NotFound；其余上游失败 → UpstreamUnavailable（允许回落本地）
// ==========================================

use crate::engine::normalizer::CodeValidationError;
use crate::infra::tariff_api::TariffApiError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("编码格式错误: {0}")]
    InvalidCode(#[from] CodeValidationError),

    #[error("编码不存在: {code}")]
    NotFound { code: String },

    #[error("上游服务不可用: {0}")]
    UpstreamUnavailable(String),

    #[error("同步任务正在运行: sync_id={sync_id}")]
    SyncConflict { sync_id: String },

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, EngineError::UpstreamUnavailable(_))
    }
}

impl From<TariffApiError> for EngineError {
    fn from(err: TariffApiError) -> Self {
        match err {
            TariffApiError::NotFound(code) => EngineError::NotFound { code },
            other => EngineError::UpstreamUnavailable(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
