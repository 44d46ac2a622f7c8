// ==========================================
// 关税归类引擎 - 编码规范化
// ==========================================
// 去除非数字字符 → 截断到 10 位 → 按位数判定层级
// 补齐/截断到目标宽度由调用方决定（品目查询取前 4 位，税率查询右补 0 到 10 位）
// ==========================================

use crate::domain::types::ClassificationLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 最短有效位数
pub const MIN_CODE_DIGITS: usize = 2;

/// 最长位数（TARIC）
pub const MAX_CODE_DIGITS: usize = 10;

/// 编码格式错误（作为结构化结果返回，不抛出）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeValidationError {
    #[error("编码为空")]
    Empty,

    #[error("编码长度不足: 至少 {min} 位数字，实际 {actual} 位")]
    TooShort { min: usize, actual: usize },
}

/// 规范化后的编码
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedCode {
    digits: String,
    level: ClassificationLevel,
}

impl NormalizedCode {
    /// 规范化后的数字串（2-10 位）
    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn level(&self) -> ClassificationLevel {
        self.level
    }

    /// 右补 0 到 10 位
    pub fn pad10(&self) -> String {
        pad_right(&self.digits, MAX_CODE_DIGITS)
    }

    /// 截断/补齐到指定宽度
    pub fn at_width(&self, width: usize) -> String {
        if self.digits.len() >= width {
            self.digits[..width].to_string()
        } else {
            pad_right(&self.digits, width)
        }
    }

    /// 截断/补齐到指定层级的标准宽度
    pub fn at_level(&self, level: ClassificationLevel) -> String {
        self.at_width(level.width())
    }

    /// 章（前 2 位）
    pub fn chapter(&self) -> String {
        self.at_width(2)
    }

    /// 品目（前 4 位，不足右补 0）
    pub fn heading(&self) -> String {
        self.at_width(4)
    }
}

/// 规范化编码
///
/// # 规则
/// - 去除所有非数字字符
/// - 超过 10 位截断为 10 位
/// - 少于 2 位返回 CodeValidationError
///
/// # 性质
/// - normalize(normalize(x).digits()) == normalize(x)
pub fn normalize(input: &str) -> Result<NormalizedCode, CodeValidationError> {
    let mut digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(if input.trim().is_empty() {
            CodeValidationError::Empty
        } else {
            CodeValidationError::TooShort {
                min: MIN_CODE_DIGITS,
                actual: 0,
            }
        });
    }

    if digits.len() < MIN_CODE_DIGITS {
        return Err(CodeValidationError::TooShort {
            min: MIN_CODE_DIGITS,
            actual: digits.len(),
        });
    }

    digits.truncate(MAX_CODE_DIGITS);

    // 2..=10 位一定有对应层级
    let level = ClassificationLevel::from_digit_count(digits.len()).ok_or(
        CodeValidationError::TooShort {
            min: MIN_CODE_DIGITS,
            actual: digits.len(),
        },
    )?;

    Ok(NormalizedCode { digits, level })
}

/// 右补 0
pub fn pad_right(digits: &str, width: usize) -> String {
    let mut out = digits.to_string();
    while out.len() < width {
        out.push('0');
    }
    out
}

/// 有效前缀: 去掉尾部成对的 "00"，但不短于 min_len
///
/// 例: 8471300000 → 847130, 8471000000 → 8471
pub fn significant_prefix(code: &str, min_len: usize) -> &str {
    let mut end = code.len();
    while end >= min_len + 2 && &code[end - 2..end] == "00" {
        end -= 2;
    }
    &code[..end]
}
