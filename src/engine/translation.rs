// ==========================================
// 关税归类引擎 - 翻译缓存 / 翻译装饰器
// ==========================================
// 进程内 原文 → 译文 映射，译文一旦得到即复用
// 单条翻译失败只记 warn，返回 None，绝不向上传播
// 批量预热（同步管道）按批返回 Err，由调用方决定是否继续
// ==========================================

use crate::domain::classification::{DeclarableCode, NodeSummary, ValidationResult};
use crate::domain::rate::RateResult;
use crate::infra::translator::{TranslateError, Translator};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 可被翻译装饰器补全中文描述的结构
pub trait Translatable {
    fn source_text(&self) -> Option<&str>;

    fn has_translation(&self) -> bool;

    fn set_translation(&mut self, translated: String);
}

impl Translatable for RateResult {
    fn source_text(&self) -> Option<&str> {
        self.goods_description.as_deref()
    }

    fn has_translation(&self) -> bool {
        self.goods_description_cn.is_some()
    }

    fn set_translation(&mut self, translated: String) {
        self.goods_description_cn = Some(translated);
    }
}

impl Translatable for ValidationResult {
    fn source_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn has_translation(&self) -> bool {
        self.description_cn.is_some()
    }

    fn set_translation(&mut self, translated: String) {
        self.description_cn = Some(translated);
    }
}

impl Translatable for DeclarableCode {
    fn source_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn has_translation(&self) -> bool {
        self.description_cn.is_some()
    }

    fn set_translation(&mut self, translated: String) {
        self.description_cn = Some(translated);
    }
}

impl Translatable for NodeSummary {
    fn source_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn has_translation(&self) -> bool {
        self.description_cn.is_some()
    }

    fn set_translation(&mut self, translated: String) {
        self.description_cn = Some(translated);
    }
}

/// 翻译缓存
pub struct TranslationCache {
    translator: Option<Arc<dyn Translator>>,
    source_lang: String,
    target_lang: String,
    entries: Mutex<HashMap<String, String>>,
}

impl TranslationCache {
    pub fn new(translator: Arc<dyn Translator>, source_lang: &str, target_lang: &str) -> Self {
        Self {
            translator: Some(translator),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 不做任何远程翻译（只使用已预置的译文）
    pub fn disabled() -> Self {
        Self {
            translator: None,
            source_lang: String::new(),
            target_lang: String::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.translator.is_some()
    }

    /// 预置译文（例如本地镜像中已有的中文描述）
    pub fn seed(&self, source: &str, translated: &str) {
        let source = source.trim();
        if source.is_empty() || translated.trim().is_empty() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(source.to_string(), translated.to_string());
        }
    }

    pub fn cached(&self, source: &str) -> Option<String> {
        self.entries.lock().ok()?.get(source.trim()).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 翻译单条文本（失败返回 None）
    pub async fn translate(&self, source: &str) -> Option<String> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }
        if let Some(hit) = self.cached(source) {
            return Some(hit);
        }
        let translator = self.translator.as_ref()?;

        match translator
            .translate(source, &self.source_lang, &self.target_lang)
            .await
        {
            Ok(translated) => {
                self.seed(source, &translated);
                Some(translated)
            }
            Err(e) => {
                warn!(error = %e, chars = source.len(), "翻译失败，保留原文");
                None
            }
        }
    }

    /// 批量预热缓存，返回本批新翻译的条数
    pub async fn warm_batch(&self, sources: &[String]) -> Result<usize, TranslateError> {
        let Some(translator) = self.translator.as_ref() else {
            return Ok(0);
        };

        let mut seen = HashSet::new();
        let pending: Vec<String> = sources
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| self.cached(s).is_none())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        let translated = translator
            .translate_batch(&pending, &self.source_lang, &self.target_lang)
            .await?;
        if translated.len() != pending.len() {
            return Err(TranslateError::CountMismatch {
                expected: pending.len(),
                actual: translated.len(),
            });
        }

        for (source, target) in pending.iter().zip(translated.iter()) {
            self.seed(source, target);
        }
        debug!(count = pending.len(), "翻译批次完成");
        Ok(pending.len())
    }

    /// 翻译装饰器: 已有译文则跳过，失败保持原样
    pub async fn apply<T: Translatable + Send>(&self, item: &mut T) {
        if item.has_translation() {
            return;
        }
        let Some(source) = item.source_text().map(str::to_string) else {
            return;
        };
        if let Some(translated) = self.translate(&source).await {
            item.set_translation(translated);
        }
    }

    pub async fn apply_all<T: Translatable + Send>(&self, items: &mut [T]) {
        for item in items.iter_mut() {
            self.apply(item).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::translator::TranslateResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTranslator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Translator for CountingTranslator {
        async fn translate(&self, text: &str, _: &str, _: &str) -> TranslateResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TranslateError::Payload("down".to_string()));
            }
            Ok(format!("译:{}", text))
        }
    }

    fn cache(fail: bool) -> (Arc<CountingTranslator>, TranslationCache) {
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            fail,
        });
        let cache = TranslationCache::new(translator.clone(), "en", "zh-CN");
        (translator, cache)
    }

    #[tokio::test]
    async fn test_translate_is_cached() {
        let (translator, cache) = cache(false);
        assert_eq!(cache.translate("Horses").await.as_deref(), Some("译:Horses"));
        assert_eq!(cache.translate(" Horses ").await.as_deref(), Some("译:Horses"));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let (_, cache) = cache(true);
        let mut code = DeclarableCode::new("0101210000", Some("Pure-bred".to_string()));
        cache.apply(&mut code).await;
        assert_eq!(code.description_cn, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_apply_skips_existing_translation() {
        let (translator, cache) = cache(false);
        let mut code = DeclarableCode::new("0101210000", Some("Pure-bred".to_string()));
        code.description_cn = Some("纯种".to_string());
        cache.apply(&mut code).await;
        assert_eq!(code.description_cn.as_deref(), Some("纯种"));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warm_batch_dedupes_and_skips_seeded() {
        let (translator, cache) = cache(false);
        cache.seed("Asses", "驴");
        let texts = vec!["Horses".to_string(), "Asses".to_string(), "Horses".to_string()];
        assert_eq!(cache.warm_batch(&texts).await.unwrap(), 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached("Asses").as_deref(), Some("驴"));
    }

    #[tokio::test]
    async fn test_disabled_cache_uses_seeds_only() {
        let cache = TranslationCache::disabled();
        cache.seed("Horses", "马");
        assert_eq!(cache.translate("Horses").await.as_deref(), Some("马"));
        assert_eq!(cache.translate("Asses").await, None);
        assert_eq!(cache.warm_batch(&["Asses".to_string()]).await.unwrap(), 0);
    }
}
