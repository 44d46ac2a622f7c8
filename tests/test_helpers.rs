// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、测试配置、应用状态装配、同步输入文件
// ==========================================

#![allow(dead_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tariff_engine::app::AppState;
use tariff_engine::config::EngineConfig;
use tariff_engine::db::open_sqlite_connection;
use tariff_engine::infra::{TariffApiClient, Translator};
use tempfile::NamedTempFile;

/// 创建临时测试数据库
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是有效 UTF-8")?
        .to_string();
    Ok((temp_file, db_path))
}

/// 测试配置: 批量查询不等待，翻译开启
pub fn test_config() -> EngineConfig {
    EngineConfig {
        batch_delay_ms: 0,
        upsert_batch_size: 2,
        translation_batch_size: 2,
        ..EngineConfig::default()
    }
}

/// 使用替身服务装配应用状态
pub fn build_state(
    db_path: &str,
    client: Arc<dyn TariffApiClient>,
    translator: Option<Arc<dyn Translator>>,
) -> Result<AppState, Box<dyn Error>> {
    let conn = open_sqlite_connection(db_path)?;
    Ok(AppState::with_services(
        db_path.to_string(),
        conn,
        test_config(),
        client,
        translator,
    ))
}

/// 写入测试文件，返回路径
pub fn write_file(dir: &Path, name: &str, content: &str) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// 第 73 章（螺钉）商品目录: 7318150000 下再分两行，7318160000 为叶子
pub const NOMENCLATURE_CSV: &str = "\
Goods code,Product line suffix,Indent,Description
7318000000,80,0,\"Screws, bolts, nuts\"
7318150000,10,1,Other screws and bolts
7318151000,80,2,Screws for wood
7318159000,80,2,Other screws
7318160000,80,1,Nuts
";

/// 税率: 品目级第三国关税（子孙继承），螺钉对 CN 反倾销，对 KR 优惠
pub const DUTIES_CSV: &str = "\
Goods code,Geographical area ID,Geographical area description,Measure type ID,Duty,Legal base
7318000000,1011,ERGA OMNES,103,3.70 %,
7318159000,CN,China,552,85.00 %,R1234
7318159000,KR,South Korea,142,0.00 %,UK-KR
7318160000,KR,South Korea,142,0.00 %,UK-KR
";
