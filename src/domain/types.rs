// ==========================================
// 关税归类引擎 - 领域类型定义
// ==========================================
// 归类层级 / 匹配状态 / 数据来源 / 同步状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 归类层级 (Classification Level)
// ==========================================
// 由规范化后的位数唯一决定:
// 2 → 章, 3-4 → 品目, 5-6 → 子目, 7-8 → CN, 9-10 → TARIC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLevel {
    Chapter,
    Heading,
    Subheading,
    Cn,
    Taric,
}

impl ClassificationLevel {
    /// 按位数判定层级（位数 < 2 返回 None）
    pub fn from_digit_count(len: usize) -> Option<Self> {
        match len {
            2 => Some(ClassificationLevel::Chapter),
            3 | 4 => Some(ClassificationLevel::Heading),
            5 | 6 => Some(ClassificationLevel::Subheading),
            7 | 8 => Some(ClassificationLevel::Cn),
            9 | 10 => Some(ClassificationLevel::Taric),
            _ => None,
        }
    }

    /// 该层级的标准位数
    pub fn width(&self) -> usize {
        match self {
            ClassificationLevel::Chapter => 2,
            ClassificationLevel::Heading => 4,
            ClassificationLevel::Subheading => 6,
            ClassificationLevel::Cn => 8,
            ClassificationLevel::Taric => 10,
        }
    }

    /// 从章到当前层级（含）的全部层级
    pub fn path(&self) -> Vec<ClassificationLevel> {
        Self::all()
            .into_iter()
            .filter(|level| level <= self)
            .collect()
    }

    pub fn all() -> [ClassificationLevel; 5] {
        [
            ClassificationLevel::Chapter,
            ClassificationLevel::Heading,
            ClassificationLevel::Subheading,
            ClassificationLevel::Cn,
            ClassificationLevel::Taric,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLevel::Chapter => "chapter",
            ClassificationLevel::Heading => "heading",
            ClassificationLevel::Subheading => "subheading",
            ClassificationLevel::Cn => "cn",
            ClassificationLevel::Taric => "taric",
        }
    }
}

impl fmt::Display for ClassificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 匹配状态 (Match Status)
// ==========================================
// 三种结果不可混淆: 报关单需要知道编码能否直接申报
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Exact,      // 存在且可申报
    ParentNode, // 存在但为类目节点，需继续细分
    NotFound,   // 不存在，给出候选
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Exact => write!(f, "exact"),
            MatchStatus::ParentNode => write!(f, "parent_node"),
            MatchStatus::NotFound => write!(f, "not_found"),
        }
    }
}

// ==========================================
// 数据来源 (Data Source)
// ==========================================
// 合并优先级由 RateSource 的顺序与 MergePolicy 决定，这里只记录出处
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    ChinaAntiDumpingDatabase,
    LocalDatabase,
    TradeTariffApi,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::ChinaAntiDumpingDatabase => "china_anti_dumping_database",
            DataSource::LocalDatabase => "local_database",
            DataSource::TradeTariffApi => "trade_tariff_api",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "china_anti_dumping_database" => DataSource::ChinaAntiDumpingDatabase,
            "trade_tariff_api" => DataSource::TradeTariffApi,
            _ => DataSource::LocalDatabase,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 同步状态 (Sync Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => SyncStatus::Running,
            "completed" => SyncStatus::Completed,
            _ => SyncStatus::Failed,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 同步类型 (Sync Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,   // 全量: 以文件为准覆盖镜像表
    Upload, // 上传: 来自前端上传的缓冲区
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "upload" => SyncType::Upload,
            _ => SyncType::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ClassificationLevel::from_digit_count(1), None);
        assert_eq!(ClassificationLevel::from_digit_count(2), Some(ClassificationLevel::Chapter));
        assert_eq!(ClassificationLevel::from_digit_count(3), Some(ClassificationLevel::Heading));
        assert_eq!(ClassificationLevel::from_digit_count(6), Some(ClassificationLevel::Subheading));
        assert_eq!(ClassificationLevel::from_digit_count(7), Some(ClassificationLevel::Cn));
        assert_eq!(ClassificationLevel::from_digit_count(9), Some(ClassificationLevel::Taric));
        assert_eq!(ClassificationLevel::from_digit_count(11), None);
    }

    #[test]
    fn test_level_path_is_ordered() {
        let path = ClassificationLevel::Cn.path();
        assert_eq!(
            path,
            vec![
                ClassificationLevel::Chapter,
                ClassificationLevel::Heading,
                ClassificationLevel::Subheading,
                ClassificationLevel::Cn,
            ]
        );
    }

    #[test]
    fn test_data_source_round_trip_str() {
        for source in [
            DataSource::ChinaAntiDumpingDatabase,
            DataSource::LocalDatabase,
            DataSource::TradeTariffApi,
        ] {
            assert_eq!(DataSource::from_str(source.as_str()), source);
        }
        assert_eq!(
            serde_json::to_string(&MatchStatus::ParentNode).unwrap(),
            "\"parent_node\""
        );
    }
}
