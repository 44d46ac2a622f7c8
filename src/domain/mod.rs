// ==========================================
// 关税归类引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod classification;
pub mod measure;
pub mod rate;
pub mod sync;
pub mod tariff;
pub mod types;

// 重导出核心类型
pub use classification::{
    BreadcrumbEntry, CandidateCode, CountryCode, DeclarableCode, HierarchyGroup, HierarchyTree,
    NodeSummary, SearchHit, SearchResult, SectionInfo, TaricLookupV2Result, ValidationResult,
};
pub use measure::Measure;
pub use rate::{BatchLookupError, BatchLookupResult, PartialRate, RateResult};
pub use sync::{DutyRecord, NomenclatureRecord, SyncInput, SyncLog, SyncOptions, SyncResult};
pub use tariff::{
    AntiDumpingOverride, Paged, TariffRate, TariffRateQuery, TradeAgreement, UpsertStats,
};
pub use types::{ClassificationLevel, DataSource, MatchStatus, SyncStatus, SyncType};
