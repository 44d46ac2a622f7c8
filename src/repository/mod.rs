// ==========================================
// 关税归类引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod anti_dumping_repo;
pub mod error;
pub mod sync_log_repo;
pub mod tariff_rate_repo;
pub mod trade_agreement_repo;

// 重导出核心仓储
pub use anti_dumping_repo::AntiDumpingRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use sync_log_repo::{SyncCounts, SyncLogRepository};
pub use tariff_rate_repo::TariffRateRepository;
pub use trade_agreement_repo::TradeAgreementRepository;
