//! # 资源解析引擎
//!
//! 把一个 URL 路径映射到某个挂载点下的具体本地文件。规则按顺序为：
//!
//! 1. 规范化 URL：去掉空段和 `.`；出现 `..`、NUL 或反斜杠直接视为越界。
//! 2. 选出前缀最长的挂载点，拼出候选路径。
//! 3. 候选是目录：依次尝试配置的索引名，对 `目录/索引名` 递归套用本流程。
//! 4. 候选是普通文件：命中。
//! 5. 候选不存在：**后缀别名**，在父目录中寻找 `名字.任意后缀` 的普通文件。
//!    精确匹配永远优先于别名；别名之间非可执行文件优先，其次按文件名字节序。
//! 6. 最终选中的文件必须在展开符号链接后仍位于挂载目录之内。
//!
//! 解析只读取文件系统元数据，从不执行文件；任何 I/O 错误都按“不存在”处理。

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    config::WebConfig,
    exception::Exception,
    mime::MimeResolver,
    mount::{Mount, MountTable},
    util::{contained_path, is_executable, path_contains},
};

/// 索引回退的最大递归深度。
const MAX_INDEX_DEPTH: usize = 4;

/// 一次解析的结果。创建后不可变，由路径缓存以 `Arc` 共享。
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    web_path: String,
    local_path: PathBuf,
    mime: String,
    executable: bool,
}

impl Resource {
    pub fn new(web_path: String, local_path: PathBuf, mime: String, executable: bool) -> Self {
        Self {
            web_path,
            local_path,
            mime,
            executable,
        }
    }

    pub fn web_path(&self) -> &str {
        &self.web_path
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn executable(&self) -> bool {
        self.executable
    }
}

/// 别名候选文件。
#[derive(Debug, Clone, PartialEq)]
pub struct AliasCandidate {
    pub file_name: String,
    pub path: PathBuf,
    pub executable: bool,
}

/// 从别名候选中选出一个，结果与目录遍历顺序无关。
pub fn choose_alias(mut candidates: Vec<AliasCandidate>) -> Option<AliasCandidate> {
    candidates.sort_by(|a, b| {
        a.executable
            .cmp(&b.executable)
            .then_with(|| a.file_name.as_bytes().cmp(b.file_name.as_bytes()))
    });
    candidates.into_iter().next()
}

/// 把 URL 路径拆成段。
pub fn normalize_path(url_path: &str) -> Result<Vec<String>, Exception> {
    let mut segments = Vec::new();
    for seg in url_path.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." || seg.contains('\0') || seg.contains('\\') {
            return Err(Exception::ContainmentViolation);
        }
        segments.push(seg.to_string());
    }
    Ok(segments)
}

struct Found {
    local_path: PathBuf,
    /// 决定 MIME 的逻辑文件名
    logical_name: String,
}

pub struct ResourceResolver {
    mounts: MountTable,
    index: Vec<String>,
    mime: MimeResolver,
}

impl ResourceResolver {
    pub fn new(mounts: MountTable, web: &WebConfig) -> Self {
        let index = web
            .index
            .iter()
            .filter(|name| {
                let plain = !name.is_empty()
                    && !name.contains('/')
                    && !name.contains('\\')
                    && name.as_str() != "."
                    && name.as_str() != "..";
                if !plain {
                    warn!("忽略非法的索引文件名：{:?}", name);
                }
                plain
            })
            .cloned()
            .collect();
        Self {
            mounts,
            index,
            mime: MimeResolver::new(&web.file_types),
        }
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn mime(&self) -> &MimeResolver {
        &self.mime
    }

    /// 规范化后的 URL 路径，也是路径缓存的键。
    pub fn cache_key(url_path: &str) -> Result<String, Exception> {
        Ok(format!("/{}", normalize_path(url_path)?.join("/")))
    }

    pub fn resolve(&self, url_path: &str) -> Result<Resource, Exception> {
        let segments = normalize_path(url_path)?;
        let mount = self
            .mounts
            .resolve_segments(&segments)
            .ok_or(Exception::FileNotFound)?;
        let rel = &segments[mount.prefix_segments().len()..];
        let found = self.find(mount, rel, 0)?;

        let web_path = format!("/{}", segments.join("/"));
        let mime = self.mime.mime_for(&found.logical_name).to_string();
        let executable = is_executable(&found.local_path);
        debug!(
            "解析 {} -> {} (mime={}, executable={})",
            web_path,
            found.local_path.display(),
            mime,
            executable
        );
        Ok(Resource::new(web_path, found.local_path, mime, executable))
    }

    /// 缓存中的资源在使用前重新检查：路径上的目录可能在解析之后被替换成了越界的符号链接。
    pub fn still_contained(&self, resource: &Resource) -> bool {
        match self.mounts.resolve(resource.web_path()) {
            Some(mount) => path_contains(mount.local_dir(), resource.local_path()),
            None => false,
        }
    }

    fn find(&self, mount: &Mount, rel: &[String], depth: usize) -> Result<Found, Exception> {
        let candidate = join(mount.local_dir(), rel);
        match fs::metadata(&candidate) {
            Ok(meta) if meta.is_dir() => {
                if !path_contains(mount.local_dir(), &candidate) {
                    return Err(Exception::ContainmentViolation);
                }
                if depth >= MAX_INDEX_DEPTH {
                    return Err(Exception::FileNotFound);
                }
                self.find_index(mount, rel, depth)
            }
            Ok(meta) if meta.is_file() => {
                let local_path = contained_path(mount.local_dir(), &candidate)
                    .ok_or(Exception::ContainmentViolation)?;
                Ok(Found {
                    local_path,
                    logical_name: rel.last().cloned().unwrap_or_default(),
                })
            }
            // 设备文件、FIFO 等一律不提供
            Ok(_) => Err(Exception::FileNotFound),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.find_alias(mount, rel),
            Err(e) => {
                debug!("读取 {} 的元数据失败: {}", candidate.display(), e);
                Err(Exception::FileNotFound)
            }
        }
    }

    fn find_index(&self, mount: &Mount, rel: &[String], depth: usize) -> Result<Found, Exception> {
        for name in &self.index {
            let mut next = rel.to_vec();
            next.push(name.clone());
            match self.find(mount, &next, depth + 1) {
                Ok(found) => return Ok(found),
                Err(Exception::ContainmentViolation) => return Err(Exception::ContainmentViolation),
                Err(_) => continue,
            }
        }
        Err(Exception::FileNotFound)
    }

    fn find_alias(&self, mount: &Mount, rel: &[String]) -> Result<Found, Exception> {
        let (name, parent_rel) = rel.split_last().ok_or(Exception::FileNotFound)?;
        let parent = join(mount.local_dir(), parent_rel);
        match parent.canonicalize() {
            Ok(real) if real.starts_with(mount.local_dir()) => {}
            Ok(_) => return Err(Exception::ContainmentViolation),
            Err(_) => return Err(Exception::FileNotFound),
        }

        let prefix = format!("{}.", name);
        let entries = fs::read_dir(&parent).map_err(|_| Exception::FileNotFound)?;
        let candidates: Vec<AliasCandidate> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                // 非 UTF-8 文件名无法与 URL 对应
                let file_name = entry.file_name().into_string().ok()?;
                if !file_name.starts_with(&prefix) {
                    return None;
                }
                let path = entry.path();
                if !fs::metadata(&path).ok()?.is_file() {
                    return None;
                }
                Some(AliasCandidate {
                    executable: is_executable(&path),
                    file_name,
                    path,
                })
            })
            .collect();

        let chosen = choose_alias(candidates).ok_or(Exception::FileNotFound)?;
        let local_path = contained_path(mount.local_dir(), &chosen.path)
            .ok_or(Exception::ContainmentViolation)?;
        debug!("后缀别名：{} -> {}", name, chosen.file_name);
        Ok(Found {
            local_path,
            logical_name: name.clone(),
        })
    }
}

fn join(root: &Path, rel: &[String]) -> PathBuf {
    rel.iter().fold(root.to_path_buf(), |p, seg| p.join(seg))
}
