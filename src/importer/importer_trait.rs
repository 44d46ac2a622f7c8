// ==========================================
// 关税归类引擎 - 同步导入 Trait
// ==========================================
// 职责: 定义同步导入接口（不包含实现）
// ==========================================

use crate::domain::sync::{DutyRecord, NomenclatureRecord, SyncInput, SyncOptions, SyncResult};
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// 原始行记录（列名 → 值）
pub type RawRow = HashMap<String, String>;

// ==========================================
// TariffSyncer Trait
// ==========================================
// 用途: 批量同步主接口
// 实现者: TariffSyncPipeline
#[async_trait]
pub trait TariffSyncer: Send + Sync {
    /// 执行一次完整同步
    ///
    /// # 返回
    /// - Ok(SyncResult): 同步结果（写入统计、翻译条数、协定条数）
    /// - Err(SyncAlreadyRunning): 已有同步在运行，不写任何同步日志
    /// - Err: 文件/数据库错误（同步日志被标记为 failed）
    ///
    /// # 流程与进度
    /// 1. 解析商品目录 (10)
    /// 2. 解析税率文件 (20)
    /// 3. 按编码合并，措施沿祖先继承 (30)
    /// 4. 分批翻译新增/变更描述 (30 → 50)
    /// 5. 分批写入本地镜像 (50 → 90)
    /// 6. 写入贸易协定元数据 (95)
    /// 7. 标记完成 (100)
    async fn run_sync(&self, options: SyncOptions) -> ImportResult<SyncResult>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录
    fn parse_to_raw_records(&self, input: &SyncInput) -> ImportResult<Vec<RawRow>>;
}

// ==========================================
// RecordMapper Trait
// ==========================================
// 用途: 字段映射接口
// 实现者: TariffFieldMapper
pub trait RecordMapper: Send + Sync {
    /// 商品目录行
    fn map_nomenclature(&self, row: &RawRow, row_number: usize)
        -> ImportResult<NomenclatureRecord>;

    /// 税率行
    fn map_duty(&self, row: &RawRow, row_number: usize) -> ImportResult<DutyRecord>;
}
