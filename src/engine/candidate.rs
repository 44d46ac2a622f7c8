// ==========================================
// 关税归类引擎 - 候选编码匹配
// ==========================================
// 编码不存在时，从共享前 6 位（或前 4 位）的可申报编码中打分排序
// 得分 = Σ(10 - i)，i 为公共前缀内的位置（从 0 开始），遇到第一个不同位停止
// 越靠前的位权重越高: 章一致远比末位一致重要
// ==========================================

use crate::domain::classification::CandidateCode;
use std::collections::HashSet;

/// 候选上限
pub const MAX_CANDIDATES: usize = 10;

/// 计算候选得分
pub fn score(input: &str, candidate: &str) -> u32 {
    input
        .bytes()
        .zip(candidate.bytes())
        .take(10)
        .enumerate()
        .take_while(|(_, (a, b))| a == b)
        .map(|(i, _)| 10 - i as u32)
        .sum()
}

/// 公共前缀长度
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// 从可申报编码池中挑选候选
///
/// # 规则
/// 1. 只保留与输入共享至少前 4 位的编码（共享 6 位的自然排在前面）
/// 2. 按得分降序、编码升序排序，截断到 `limit`（不超过 10）
/// 3. 同一编码只保留一次（保留首次出现的描述），输入本身不作为候选
pub fn rank_candidates(
    input_code10: &str,
    pool: Vec<(String, Option<String>)>,
    limit: usize,
) -> Vec<CandidateCode> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<CandidateCode> = pool
        .into_iter()
        .filter(|(code, _)| code != input_code10 && seen.insert(code.clone()))
        .filter(|(code, _)| common_prefix_len(input_code10, code) >= 4)
        .map(|(code, description)| CandidateCode {
            score: score(input_code10, &code),
            code,
            description,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.code.cmp(&b.code)));
    ranked.truncate(limit.min(MAX_CANDIDATES));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_weights_leading_digits() {
        // 共享 6 位: 10+9+8+7+6+5
        assert_eq!(score("8471309999", "8471300000"), 45);
        // 共享 4 位: 10+9+8+7
        assert_eq!(score("8471309999", "8471801000"), 34);
        assert_eq!(score("8471309999", "9471309999"), 0);
        assert_eq!(score("8471300000", "8471300000"), 55);
    }

    #[test]
    fn test_ranking_orders_by_shared_prefix() {
        let pool = vec![
            ("8471801000".to_string(), None),
            ("8471300000".to_string(), Some("Portable".to_string())),
        ];
        let ranked = rank_candidates("8471309999", pool, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].code, "8471300000");
        assert_eq!(ranked[0].description.as_deref(), Some("Portable"));
        assert_eq!(ranked[1].code, "8471801000");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_four_digit_matches_are_capped() {
        let pool: Vec<(String, Option<String>)> = (0..15)
            .map(|i| (format!("84718{:05}", i), None))
            .collect();
        let ranked = rank_candidates("8471309999", pool, 20);
        assert_eq!(ranked.len(), MAX_CANDIDATES);
        assert!(ranked.iter().all(|c| c.code.starts_with("8471")));
        // 同分时按编码升序
        assert!(ranked.windows(2).all(|w| w[0].code <= w[1].code));
    }

    #[test]
    fn test_excludes_input_and_unrelated_codes() {
        let pool = vec![
            ("8471309999".to_string(), None),
            ("8501100000".to_string(), None),
            ("8471309999".to_string(), None),
        ];
        assert!(rank_candidates("8471309999", pool, 10).is_empty());
    }
}
