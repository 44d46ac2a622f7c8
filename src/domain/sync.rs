// ==========================================
// 关税归类引擎 - 批量同步实体
// ==========================================
// SyncLog 生命周期: running → completed | failed
// 全进程同一时刻至多一个 running
// ==========================================

use crate::domain::types::{SyncStatus, SyncType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 同步日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    pub id: String,
    pub sync_type: SyncType,
    pub data_source: String,
    pub status: SyncStatus,
    /// 0-100，单调不减
    pub progress: u8,
    pub total_records: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub failed_count: i64,
    pub taric_version: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 同步输入（本地路径或上传缓冲区）
#[derive(Debug, Clone)]
pub enum SyncInput {
    Path(PathBuf),
    Upload { file_name: String, data: Vec<u8> },
}

impl SyncInput {
    /// 用于日志/错误信息的显示名
    pub fn display_name(&self) -> String {
        match self {
            SyncInput::Path(path) => path.display().to_string(),
            SyncInput::Upload { file_name, .. } => file_name.clone(),
        }
    }

    /// 小写扩展名
    pub fn extension(&self) -> String {
        let name = match self {
            SyncInput::Path(path) => path.to_string_lossy().to_string(),
            SyncInput::Upload { file_name, .. } => file_name.clone(),
        };
        std::path::Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
    }
}

/// 同步参数
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub nomenclature: SyncInput,
    pub duties: SyncInput,
    pub data_source: String,
    pub taric_version: Option<String>,
    /// 是否翻译新增/变更的描述
    pub translate: bool,
}

impl SyncOptions {
    pub fn sync_type(&self) -> SyncType {
        match (&self.nomenclature, &self.duties) {
            (SyncInput::Path(_), SyncInput::Path(_)) => SyncType::Full,
            _ => SyncType::Upload,
        }
    }
}

/// 同步结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub sync_id: String,
    pub status: SyncStatus,
    pub total_records: usize,
    pub inserted_count: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    pub translated_count: usize,
    pub agreement_count: usize,
    pub taric_version: Option<String>,
    pub elapsed_ms: i64,
}

// ==========================================
// 文件记录（字段映射后）
// ==========================================

/// 商品编码目录行
#[derive(Debug, Clone, PartialEq)]
pub struct NomenclatureRecord {
    pub row_number: usize,
    pub hs_code10: String,
    pub product_line_suffix: String,
    pub indent: u32,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// 税率行
#[derive(Debug, Clone, PartialEq)]
pub struct DutyRecord {
    pub row_number: usize,
    pub hs_code10: String,
    pub origin_code: String,
    pub origin_name: Option<String>,
    pub measure_type_code: String,
    pub measure_type_description: Option<String>,
    pub duty_expression: Option<String>,
    pub legal_base: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
