// ==========================================
// 关税归类引擎 - 应用层
// ==========================================
// 职责: 装配各层实例，供 CLI 与宿主应用使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
