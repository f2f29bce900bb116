//! # 挂载表
//!
//! 每个挂载点把一个 URL 前缀绑定到一个本地目录。本地目录只在启动时规范化一次，
//! 之后不再重新解析；挂载表在进程生命周期内只读。

use std::path::{Path, PathBuf};

use log::info;

use crate::{config::MountConfig, exception::Exception};

#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    local_dir: PathBuf,
    /// URL 前缀按段保存，根挂载为空
    prefix: Vec<String>,
}

impl Mount {
    /// 本地目录必须存在且是目录。
    pub fn new(local_dir: &Path, url_prefix: &str) -> Result<Self, Exception> {
        let local_dir = local_dir.canonicalize().map_err(|e| Exception::ConfigError {
            reason: format!("挂载目录 {} 无法解析: {}", local_dir.display(), e),
        })?;
        if !local_dir.is_dir() {
            return Err(Exception::ConfigError {
                reason: format!("挂载目录 {} 不是目录", local_dir.display()),
            });
        }
        Ok(Self {
            local_dir,
            prefix: split_segments(url_prefix),
        })
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn url_prefix(&self) -> String {
        format!("/{}", self.prefix.join("/"))
    }

    pub fn prefix_segments(&self) -> &[String] {
        &self.prefix
    }

    /// 前缀按段匹配：`/api` 匹配 `/api/x`，不匹配 `/apix`。
    fn matches(&self, segments: &[String]) -> bool {
        segments.len() >= self.prefix.len()
            && self.prefix.iter().zip(segments).all(|(a, b)| a == b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new(mounts: Vec<Mount>) -> Self {
        Self { mounts }
    }

    pub fn from_config(mounts: &[MountConfig]) -> Result<Self, Exception> {
        let mut table = Vec::with_capacity(mounts.len());
        for m in mounts {
            let mount = Mount::new(Path::new(&m.path), &m.prefix)?;
            info!("挂载 {} -> {}", mount.url_prefix(), mount.local_dir().display());
            table.push(mount);
        }
        Ok(Self::new(table))
    }

    /// 返回前缀最长的匹配挂载点，长度相同时先声明者优先。
    pub fn resolve(&self, url_path: &str) -> Option<&Mount> {
        self.resolve_segments(&split_segments(url_path))
    }

    pub fn resolve_segments(&self, segments: &[String]) -> Option<&Mount> {
        let mut found: Option<&Mount> = None;
        for mount in &self.mounts {
            if !mount.matches(segments) {
                continue;
            }
            match found {
                Some(f) if f.prefix.len() >= mount.prefix.len() => {}
                _ => found = Some(mount),
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}
