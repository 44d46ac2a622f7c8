// ==========================================
// 关税归类引擎 - 机器翻译客户端
// ==========================================
// 商品描述 英 → 中；翻译失败永远不影响主流程（由 TranslationCache 吞掉）
// ==========================================

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("翻译地址无效: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("翻译请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("翻译结果格式错误: {0}")]
    Payload(String),

    #[error("翻译结果数量不符: 期望 {expected}，实际 {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

pub type TranslateResult<T> = Result<T, TranslateError>;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslateResult<String>;

    /// 批量翻译，输出与输入一一对应
    async fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> TranslateResult<Vec<String>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.translate(text, source, target).await?);
        }
        Ok(out)
    }
}

/// 基于公共翻译端点的实现
///
/// 响应形如 `[[["译文","原文",...], ...], ...]`，译文按片段拼接。
pub struct HttpTranslator {
    http: Client,
    endpoint: Url,
}

impl HttpTranslator {
    pub fn new(endpoint: &str, timeout: Duration) -> TranslateResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslateResult<String> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client", "gtx")
            .append_pair("sl", source)
            .append_pair("tl", target)
            .append_pair("dt", "t")
            .append_pair("q", text);

        let body: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let translated = extract_segments(&body)?;
        debug!(chars = text.len(), "翻译完成");
        Ok(translated)
    }
}

/// 从嵌套数组中拼出译文
pub fn extract_segments(body: &Value) -> TranslateResult<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Payload("缺少译文片段".to_string()))?;

    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(TranslateError::Payload("译文为空".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_segments_joins_pieces() {
        let body = json!([[["便携式", "Portable ", null], ["计算机", "computers", null]], null, "en"]);
        assert_eq!(extract_segments(&body).unwrap(), "便携式计算机");
    }

    #[test]
    fn test_extract_segments_rejects_empty() {
        assert!(extract_segments(&json!([[]])).is_err());
        assert!(extract_segments(&json!({})).is_err());
    }
}
