//! # 路径缓存
//!
//! 记忆 URL 路径到解析结果（资源或“不存在”）的映射，避免每次请求都遍历文件系统。
//!
//! - 滑动过期：每次命中都把过期时间重置为 `now + timeout`，并移到最新端。
//! - 容量淘汰：插入后超过容量时从最旧端逐个淘汰。
//! - 过期清理：插入后从最旧端清除所有已过期条目；查询遇到过期条目时立即删除。
//! - 所有操作都在同一把锁内完成，锁只覆盖单次操作。

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::warn;
use lru::LruCache;

use crate::resolver::Resource;

/// 时间来源，测试时可替换。
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 一次解析的结果，“不存在”同样会被缓存。
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Arc<Resource>),
    NotFound,
}

#[derive(Clone)]
struct CacheEntry {
    value: Lookup,
    expires_at: Instant,
}

pub struct PathCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    timeout: Duration,
    clock: Box<dyn Clock>,
}

/// 过期时间上限，避免 `Instant` 加法溢出
const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 3600);

impl PathCache {
    // 根据容量和过期时间构造
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self::with_clock(capacity, timeout, Box::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, timeout: Duration, clock: Box<dyn Clock>) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(capacity) => capacity,
            None => panic!("调用PathCache::new时指定的大小是0。如果需要自动设置大小，请在调用处进行处理，而不是传入0"),
        };
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            timeout: timeout.min(MAX_TIMEOUT),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("路径缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    // 查询，命中时刷新过期时间
    pub fn get(&self, web_path: &str) -> Option<Lookup> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired = match entries.get_mut(web_path) {
            Some(entry) if now <= entry.expires_at => {
                entry.expires_at = now + self.timeout;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(web_path);
        }
        None
    }

    // 放入
    pub fn insert(&self, web_path: &str, value: Lookup) {
        let now = self.clock.now();
        let mut entries = self.lock();
        // LruCache 满时 push 会自动淘汰最旧的条目
        entries.push(
            web_path.to_string(),
            CacheEntry {
                value,
                expires_at: now + self.timeout,
            },
        );
        while let Some((_, oldest)) = entries.peek_lru() {
            if now > oldest.expires_at {
                entries.pop_lru();
            } else {
                break;
            }
        }
    }

    /// 驱逐一条可能已经失效的映射，返回它是否存在。
    pub fn invalidate(&self, web_path: &str) -> bool {
        self.lock().pop(web_path).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
