// ==========================================
// 关税归类引擎 - 应用状态
// ==========================================
// 职责: 打开数据库、加载配置、装配仓储/引擎/API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{SyncApi, TariffApi};
use crate::config::{ConfigManager, EngineConfig, EngineConfigReader};
use crate::db::open_sqlite_connection;
use crate::engine::rate_source::{LocalMirrorRateSource, OverrideRateSource, RemoteApiRateSource};
use crate::engine::{
    HierarchyService, MultiSourceResolver, RateSource, SyncCoordinator, TranslationCache, TtlCache,
};
use crate::i18n::t;
use crate::importer::TariffSyncPipeline;
use crate::infra::{HttpTariffApiClient, HttpTranslator, TariffApiClient, Translator};
use crate::repository::{
    AntiDumpingRepository, SyncLogRepository, TariffRateRepository, TradeAgreementRepository,
};

/// 应用状态
///
/// 持有所有 API 实例与共享资源（单一 SQLite 连接、TTL 缓存、同步协调器）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效中的引擎配置
    pub config: EngineConfig,

    /// 归类/税率 API
    pub tariff_api: Arc<TariffApi>,

    /// 批量同步 API
    pub sync_api: Arc<SyncApi>,

    /// 响应缓存（同步完成后整体失效）
    pub cache: Arc<TtlCache>,
}

impl AppState {
    /// 使用 HTTP 上游与 HTTP 翻译创建应用状态
    ///
    /// # 说明
    /// 1. 打开数据库并读取 config_kv 配置
    /// 2. 构造上游客户端与翻译器
    /// 3. 装配各层实例
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));
        let config = load_config(conn.clone()).await?;

        let client: Arc<dyn TariffApiClient> = Arc::new(
            HttpTariffApiClient::new(&config.api_base_url, config.http_timeout())
                .map_err(|e| format!("无法创建上游归类客户端: {}", e))?,
        );
        let translator: Option<Arc<dyn Translator>> = if config.translate_enabled {
            Some(Arc::new(
                HttpTranslator::new(&config.translate_endpoint, config.translate_timeout())
                    .map_err(|e| format!("无法创建翻译客户端: {}", e))?,
            ))
        } else {
            None
        };

        Ok(Self::assemble(db_path, conn, config, client, translator))
    }

    /// 使用外部提供的上游客户端/翻译器创建应用状态（宿主集成与测试使用）
    pub fn with_services(
        db_path: String,
        conn: Connection,
        config: EngineConfig,
        client: Arc<dyn TariffApiClient>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        Self::assemble(db_path, Arc::new(Mutex::new(conn)), config, client, translator)
    }

    fn assemble(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        config: EngineConfig,
        client: Arc<dyn TariffApiClient>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        // ==========================================
        // 仓储层
        // ==========================================
        let rates = Arc::new(TariffRateRepository::new(conn.clone()));
        let overrides = Arc::new(AntiDumpingRepository::new(conn.clone()));
        let logs = Arc::new(SyncLogRepository::new(conn.clone()));
        let agreements = Arc::new(TradeAgreementRepository::new(conn));

        // 上次进程退出时遗留的 running 记录
        match logs.fail_stale_running(&t("sync.interrupted")) {
            Ok(0) => {}
            Ok(n) => tracing::warn!(count = n, "已将遗留的运行中同步标记为失败"),
            Err(e) => tracing::warn!(error = %e, "遗留同步记录清理失败(将继续启动)"),
        }

        // ==========================================
        // 引擎层
        // ==========================================
        let cache = Arc::new(TtlCache::new());
        let translation = Arc::new(match translator {
            Some(translator) => TranslationCache::new(
                translator,
                &config.translate_source_lang,
                &config.translate_target_lang,
            ),
            None => TranslationCache::disabled(),
        });

        // 顺序即合并优先级
        let sources: Vec<Arc<dyn RateSource>> = vec![
            Arc::new(OverrideRateSource::new(overrides.clone())),
            Arc::new(LocalMirrorRateSource::new(rates.clone())),
            Arc::new(RemoteApiRateSource::new(client.clone(), config.standard_vat_rate)),
        ];
        let resolver = Arc::new(MultiSourceResolver::new(sources, translation.clone()));

        let hierarchy = Arc::new(HierarchyService::new(
            client.clone(),
            rates.clone(),
            cache.clone(),
            translation.clone(),
            config.clone(),
        ));

        let pipeline = Arc::new(TariffSyncPipeline::new(
            SyncCoordinator::new(),
            logs.clone(),
            rates.clone(),
            agreements.clone(),
            translation,
            cache.clone(),
            config.clone(),
        ));

        // ==========================================
        // API 层
        // ==========================================
        let tariff_api = Arc::new(TariffApi::new(
            hierarchy,
            resolver,
            client,
            rates,
            overrides,
            cache.clone(),
            config.clone(),
        ));
        let sync_api = Arc::new(SyncApi::new(pipeline, logs, agreements));

        tracing::info!("AppState初始化完成");

        Self {
            db_path,
            config,
            tariff_api,
            sync_api,
            cache,
        }
    }
}

async fn load_config(conn: Arc<Mutex<Connection>>) -> Result<EngineConfig, String> {
    let manager = ConfigManager::from_connection(conn).map_err(|e| format!("无法创建ConfigManager: {}", e))?;
    manager
        .load_engine_config()
        .await
        .map_err(|e| format!("无法加载引擎配置: {}", e))
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 TARIFF_ENGINE_DB_PATH，其次为用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("TARIFF_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./tariff_engine.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("tariff-engine");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("tariff_engine.db");
        }
    }

    path.to_string_lossy().to_string()
}
