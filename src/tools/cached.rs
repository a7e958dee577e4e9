//! 缓存装饰器：cached(capability, key_fn, ttl)
//!
//! 包装任意 Tool：先按 key_fn 计算键查缓存，命中直接返回；未命中则调用内部工具，
//! 成功结果写入缓存（每次未命中至多一次写入），失败结果不缓存。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{cache_key, ResultCache};
use crate::tools::Tool;

pub type KeyFn = Arc<dyn Fn(&str, &Value) -> String + Send + Sync>;

pub struct CachedTool {
    inner: Arc<dyn Tool>,
    cache: Arc<dyn ResultCache>,
    key_fn: KeyFn,
    ttl: Duration,
}

/// 用默认键函数（工具名 + 规范化参数）包装工具
pub fn cached(inner: Arc<dyn Tool>, cache: Arc<dyn ResultCache>, ttl: Duration) -> CachedTool {
    CachedTool::new(inner, cache, ttl)
}

impl CachedTool {
    pub fn new(inner: Arc<dyn Tool>, cache: Arc<dyn ResultCache>, ttl: Duration) -> Self {
        Self {
            inner,
            cache,
            key_fn: Arc::new(cache_key),
            ttl,
        }
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl Tool for CachedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let key = (self.key_fn)(self.inner.name(), &args);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(tool = %self.inner.name(), key = %key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(tool = %self.inner.name(), key = %key, "cache miss");
        let value = self.inner.execute(args).await?;
        self.cache.set(&key, &value, self.ttl).await;
        Ok(value)
    }
}
