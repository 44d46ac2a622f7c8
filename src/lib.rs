// ==========================================
// 关税归类引擎 - 核心库
// ==========================================
// HS/TARIC 编码规范化与层级校验、多源税率合并、
// 描述搜索、批量同步到本地 SQLite 镜像
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 批量同步
pub mod importer;

// 配置层 - 引擎配置
pub mod config;

// 外部服务适配层 - 上游归类接口 / 翻译
pub mod infra;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 实例装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ClassificationLevel, DataSource, MatchStatus, SyncStatus, SyncType};

// 领域实体
pub use domain::classification::{
    CandidateCode, DeclarableCode, HierarchyTree, SearchResult, TaricLookupV2Result,
    ValidationResult,
};
pub use domain::rate::{BatchLookupResult, RateResult};
pub use domain::sync::{SyncInput, SyncLog, SyncOptions, SyncResult};

// 引擎
pub use engine::{normalize, HierarchyService, MultiSourceResolver, SyncCoordinator, TtlCache};

// API
pub use api::{ApiError, ApiResult, SyncApi, TariffApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "关税归类引擎";
