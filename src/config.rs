//! # 配置模块
//!
//! 两层配置：
//! - `config/development.toml`：服务器运行参数与挂载点列表（[`Config`]）。
//! - `web.json`：`file_types` 与 `index`（[`WebConfig`]），与内置默认值合并。

use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use log::{error, warn};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{exception::Exception, param::MIME_TYPES};

/// 单个挂载点的原始配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MountConfig {
    /// 本地目录
    pub path: String,
    /// URL 前缀
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    worker_threads: usize,
    cache_size: usize,
    local: bool,
    #[serde(default = "default_cache_timeout")]
    cache_timeout: u64,
    #[serde(default = "default_exec_timeout")]
    exec_timeout: u64,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    executor: Option<String>,
    #[serde(default)]
    web_config: Option<String>,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    #[serde(default = "default_streaming_threshold")]
    streaming_threshold: u64,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default)]
    mounts: Vec<MountConfig>,
}

/// 路径缓存条目的最长保留时间：30 天
const MAX_CACHE_TIMEOUT: u64 = 30 * 24 * 3600;

fn default_prefix() -> String {
    "/".to_string()
}

fn default_cache_size() -> usize {
    1000
}

fn default_cache_timeout() -> u64 {
    60
}

fn default_exec_timeout() -> u64 {
    10
}

fn default_max_body_size() -> usize {
    8 * 1024 * 1024
}

fn default_streaming_threshold() -> u64 {
    10485760 // 10MB
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 7878,
            worker_threads: 0,
            cache_size: default_cache_size(),
            local: true,
            cache_timeout: default_cache_timeout(),
            exec_timeout: default_exec_timeout(),
            debug: false,
            executor: None,
            web_config: None,
            max_body_size: default_max_body_size(),
            streaming_threshold: default_streaming_threshold(),
            chunk_size: default_chunk_size(),
            mounts: vec![MountConfig {
                path: "www".to_string(),
                prefix: default_prefix(),
            }],
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename).map_err(|e| Exception::ConfigError {
            reason: format!("无法读取配置文件 {}: {}", filename, e),
        })?;
        Ok(Self::from_toml_str(&str_val))
    }

    /// 解析失败时回退到默认配置，与启动脚本的容错习惯保持一致。
    pub fn from_toml_str(str_val: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用路径缓存，因此该值将被改为{}。", default_cache_size());
            raw_config.cache_size = default_cache_size();
        }
        if raw_config.exec_timeout == 0 {
            warn!("exec_timeout被设置为0，将使用默认值{}秒。", default_exec_timeout());
            raw_config.exec_timeout = default_exec_timeout();
        }
        if raw_config.chunk_size == 0 {
            warn!("chunk_size被设置为0，将使用默认值{}字节。", default_chunk_size());
            raw_config.chunk_size = default_chunk_size();
        }
        if raw_config.streaming_threshold == 0 {
            warn!("streaming_threshold被设置为0，将使用默认值{}字节。", default_streaming_threshold());
            raw_config.streaming_threshold = default_streaming_threshold();
        }
        if raw_config.cache_timeout > MAX_CACHE_TIMEOUT {
            warn!("cache_timeout过大，已限制为{}秒。", MAX_CACHE_TIMEOUT);
            raw_config.cache_timeout = MAX_CACHE_TIMEOUT;
        }
        if raw_config.mounts.is_empty() {
            warn!("没有配置任何挂载点，所有请求都将返回404。");
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout)
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn executor(&self) -> Option<PathBuf> {
        self.executor.as_ref().map(PathBuf::from)
    }

    pub fn web_config(&self) -> Option<&str> {
        self.web_config.as_deref()
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn streaming_threshold(&self) -> u64 {
        self.streaming_threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn mounts(&self) -> &[MountConfig] {
        &self.mounts
    }

    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    pub fn set_exec_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.exec_timeout = timeout.as_secs().max(1);
        self
    }

    pub fn set_executor(&mut self, executor: Option<String>) -> &mut Self {
        self.executor = executor;
        self
    }

    pub fn set_mounts(&mut self, mounts: Vec<MountConfig>) -> &mut Self {
        self.mounts = mounts;
        self
    }
}

/// `web.json` 的强类型表示。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebConfig {
    /// 后缀（带前导点号）到 MIME 的映射，`*` 为兜底
    pub file_types: HashMap<String, String>,
    /// 目录请求时依次尝试的索引文件名
    #[serde(default)]
    pub index: Vec<String>,
}

impl WebConfig {
    /// 内置默认值：`param.rs` 中的 MIME 表，索引依次为 `index.html`、`index`。
    pub fn defaults() -> Self {
        Self {
            file_types: MIME_TYPES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            index: vec!["index.html".to_string(), "index".to_string()],
        }
    }

    pub fn from_json(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename).map_err(|e| Exception::ConfigError {
            reason: format!("无法读取Web配置 {}: {}", filename, e),
        })?;
        Self::from_json_str(&str_val)
    }

    /// 把用户 JSON 合并到默认值之上再反序列化。
    pub fn from_json_str(str_val: &str) -> Result<Self, Exception> {
        let user: Value = serde_json::from_str(str_val).map_err(|e| Exception::ConfigError {
            reason: format!("Web配置不是合法的JSON: {}", e),
        })?;
        let defaults = serde_json::to_value(Self::defaults()).map_err(|e| Exception::ConfigError {
            reason: e.to_string(),
        })?;
        let merged = merge(defaults, user);
        serde_json::from_value(merged).map_err(|e| Exception::ConfigError {
            reason: format!("Web配置字段类型错误: {}", e),
        })
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

/// 合并规则：顶层键由用户覆盖；值同为对象的键逐键合并；其余类型整体替换。
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(Value::Object(inner)) if value.is_object() => {
                        merge_objects(inner, value)
                    }
                    _ => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

// 嵌套对象只合并一层键，值一律替换
fn merge_objects(mut base: Map<String, Value>, overlay: Value) -> Value {
    if let Value::Object(overlay) = overlay {
        for (key, value) in overlay {
            base.insert(key, value);
        }
    }
    Value::Object(base)
}
