// ==========================================
// 关税归类引擎 - 引擎层
// ==========================================
// 职责: 编码规范化、层级校验、税率多源合并、缓存与翻译装饰
// 红线: 引擎不拼 SQL，数据访问经由 repository / infra
// ==========================================

pub mod cache;
pub mod candidate;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod normalizer;
pub mod rate_extractor;
pub mod rate_source;
pub mod resolver;
pub mod sync_coordinator;
pub mod translation;

pub use cache::{cache_keys, TtlCache};
pub use candidate::rank_candidates;
pub use error::{EngineError, EngineResult};
pub use hierarchy::HierarchyService;
pub use normalizer::{normalize, CodeValidationError, NormalizedCode};
pub use rate_source::{
    merge_in_precedence_order, LocalMirrorRateSource, MergePolicy, OverrideRateSource,
    RateSource, RemoteApiRateSource,
};
pub use resolver::MultiSourceResolver;
pub use sync_coordinator::{SyncCoordinator, SyncGuard, SyncState};
pub use translation::{Translatable, TranslationCache};
