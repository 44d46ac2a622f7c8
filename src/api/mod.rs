// ==========================================
// 关税归类引擎 - API 层
// ==========================================
// 职责: 对外业务接口，供 CLI 与宿主应用调用
// ==========================================

pub mod error;
pub mod sync_api;
pub mod tariff_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use sync_api::{SyncApi, SyncHistoryResponse, SyncStatusResponse};
pub use tariff_api::TariffApi;
