// ==========================================
// 关税归类引擎 - 导入层
// ==========================================
// 职责: 归类目录 / 税率文件批量同步到本地镜像
// 支持: Excel, CSV（本地路径或上传缓冲区）
// ==========================================

pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod importer_trait;
pub mod merger;
pub mod sync_pipeline;

pub use error::{ImportError, ImportResult};
pub use field_mapper::TariffFieldMapper;
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use importer_trait::{FileParser, RawRow, RecordMapper, TariffSyncer};
pub use merger::{MergeOutput, RecordMerger};
pub use sync_pipeline::TariffSyncPipeline;
