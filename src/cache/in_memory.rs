//! 进程内缓存实现
//!
//! RwLock<HashMap> 存放序列化后的条目；get 时惰性判断过期并删除过期条目。
//! 单键 set 是一次 insert，天然原子；同键并发写入为后写者胜。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cache::{CacheEntry, ResultCache};

/// 可注入时钟
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Clock,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// 使用自定义时钟（测试中推进时间）
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// 当前存放的条目数（含尚未被读取淘汰的过期条目）
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl ResultCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = (self.clock)();
        let entry = self.entry(key)?;
        if entry.is_expired(now) {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            // 只删除仍然过期的那一份，避免误删并发写入的新值
            if entries.get(key).is_some_and(|e| e.is_expired(now)) {
                entries.remove(key);
            }
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache entry undecodable, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) {
        let entry = CacheEntry::new(key, value, ttl, (self.clock)());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }
}
