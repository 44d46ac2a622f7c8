// ==========================================
// 关税归类引擎 - 进程内 TTL 缓存
// ==========================================
// 全进程单实例（通过 Arc 共享），重启即失效
// 值以 serde_json::Value 存储，按需反序列化为具体类型
// 过期条目读取即视为未命中，不会隐式返回陈旧数据
// ==========================================

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// TTL 缓存
#[derive(Default)]
pub struct TtlCache {
    inner: Mutex<CacheInner>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取原始值（过期返回 None 并清除条目）
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();

        let hit = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };

        if hit.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        hit
    }

    /// 写入原始值
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// 读取并反序列化为 T
    ///
    /// 反序列化失败（例如结构升级）视为未命中。
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "缓存值反序列化失败，视为未命中");
                self.remove(key);
                None
            }
        }
    }

    /// 序列化 T 并写入
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl),
            Err(e) => warn!(key = %key, error = %e, "缓存值序列化失败，跳过写入"),
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.remove(key);
        }
    }

    /// 删除指定前缀的所有条目（同步完成后清理税率缓存）
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before - inner.entries.len();
        debug!(prefix = %prefix, removed = removed, "缓存前缀失效");
        removed
    }

    /// 清除所有过期条目
    pub fn purge_expired(&self) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self.inner.lock() {
            Ok(inner) => CacheStats {
                entries: inner.entries.len(),
                hits: inner.hits,
                misses: inner.misses,
            },
            Err(_) => CacheStats::default(),
        }
    }
}

// ==========================================
// 缓存键
// ==========================================
// 键必须包含所有影响结果的参数
pub mod cache_keys {
    pub const RATE_PREFIX: &str = "taric:rate:";
    pub const VALIDATION_PREFIX: &str = "taric:validate:";
    pub const HIERARCHY_PREFIX: &str = "taric:hierarchy:";
    pub const SEARCH_PREFIX: &str = "taric:search:";
    pub const DECLARABLE_PREFIX: &str = "taric:declarable:";
    pub const COUNTRIES: &str = "taric:countries";

    fn origin_part(origin: Option<&str>) -> String {
        origin
            .map(|o| o.trim().to_uppercase())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "ALL".to_string())
    }

    pub fn rate(code10: &str, origin: Option<&str>) -> String {
        format!("{}{}:{}", RATE_PREFIX, code10, origin_part(origin))
    }

    pub fn validation(normalized: &str) -> String {
        format!("{}{}", VALIDATION_PREFIX, normalized)
    }

    pub fn hierarchy(prefix: &str, origin: Option<&str>) -> String {
        format!("{}{}:{}", HIERARCHY_PREFIX, prefix, origin_part(origin))
    }

    pub fn search(
        query: &str,
        chapter: Option<&str>,
        page: u32,
        page_size: u32,
        origin: Option<&str>,
    ) -> String {
        format!(
            "{}{}:{}:{}:{}:{}",
            SEARCH_PREFIX,
            query.trim().to_lowercase(),
            chapter.unwrap_or("*"),
            page,
            page_size,
            origin_part(origin)
        )
    }

    pub fn declarable(prefix: &str, origin: Option<&str>) -> String {
        format!("{}{}:{}", DECLARABLE_PREFIX, prefix, origin_part(origin))
    }
}
