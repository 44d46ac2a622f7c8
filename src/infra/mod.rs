// ==========================================
// 关税归类引擎 - 外部服务适配层
// ==========================================
// 职责: 上游归类接口 / 机器翻译 的 HTTP 客户端
// 红线: 只做请求与载荷解析，不含业务规则
// ==========================================

pub mod tariff_api;
pub mod translator;

pub use tariff_api::{
    ChapterDetail, CommodityDetail, HeadingDetail, HttpTariffApiClient, TariffApiClient,
    TariffApiError, TariffApiResult,
};
pub use translator::{HttpTranslator, TranslateError, Translator};
