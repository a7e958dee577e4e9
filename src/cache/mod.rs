//! 工具结果缓存：带 TTL 的键值存储，键为工具名 + 规范化参数的确定性指纹
//!
//! 过期在读取时判断（惰性过期，无后台清理）；过期条目视为未命中，可被覆盖。
//! 值以 JSON 文本跨越序列化边界存取，与外部共享缓存服务的语义一致。

pub mod in_memory;
pub mod key;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use in_memory::{Clock, InMemoryCache};
pub use key::{cache_key, canonical_json};

/// 单条缓存条目（序列化后的值 + 过期时间）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: &Value, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            key: key.into(),
            value: value.to_string(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 缓存服务；实现需自行保证跨 Run 并发安全，单键写入原子（后写者胜）
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// 命中且未过期时返回值，否则 None；后端故障按未命中处理
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: &Value, ttl: Duration);
}
