//! # 请求分发
//!
//! `AppContext` 持有所有连接共享的状态（配置、解析器、路径缓存、执行引擎），
//! 由 `main.rs` 包装在 `Arc` 中交给每个连接任务。

use std::{sync::Arc, time::Instant};

use log::{debug, error, info, warn};
use tokio::{
    fs::File as TokioFile,
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

use crate::{
    cache::{Lookup, PathCache},
    config::{Config, WebConfig},
    exception::Exception,
    exec::ExecutionEngine,
    mount::MountTable,
    param::HttpRequestMethod,
    request::Request,
    resolver::{Resource, ResourceResolver},
    response::Response,
};

pub struct AppContext {
    config: Config,
    resolver: ResourceResolver,
    cache: PathCache,
    engine: ExecutionEngine,
}

impl AppContext {
    /// 按配置构建挂载表、路径缓存与执行引擎。挂载目录不存在时返回 `ConfigError`。
    pub fn new(config: Config, web: &WebConfig) -> Result<Self, Exception> {
        let mounts = MountTable::from_config(config.mounts())?;
        let resolver = ResourceResolver::new(mounts, web);
        let cache = PathCache::new(config.cache_size(), config.cache_timeout());
        let engine = ExecutionEngine::new(config.executor(), config.exec_timeout());
        Ok(Self::from_parts(config, resolver, cache, engine))
    }

    pub fn from_parts(
        config: Config,
        resolver: ResourceResolver,
        cache: PathCache,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            config,
            resolver,
            cache,
            engine,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    /// 先查路径缓存，未命中时解析并写回。
    ///
    /// 不存在的路径以 `Lookup::NotFound` 缓存；越界访问不缓存，每次都会记录日志。
    /// 命中的资源会重新检查是否仍在挂载目录内，失效时驱逐并重新解析。
    pub fn lookup_resource(&self, url_path: &str, id: u128) -> Result<Arc<Resource>, Exception> {
        let key = ResourceResolver::cache_key(url_path)?;
        match self.cache.get(&key) {
            Some(Lookup::Found(resource)) if self.resolver.still_contained(&resource) => {
                debug!("[ID{}]路径缓存命中：{}", id, key);
                return Ok(resource);
            }
            Some(Lookup::Found(resource)) => {
                warn!(
                    "[ID{}]缓存的{}已不在挂载目录内，重新解析",
                    id,
                    resource.local_path().display()
                );
                self.cache.invalidate(&key);
            }
            Some(Lookup::NotFound) => {
                debug!("[ID{}]路径缓存命中（不存在）：{}", id, key);
                return Err(Exception::FileNotFound);
            }
            None => debug!("[ID{}]路径缓存未命中：{}", id, key),
        }

        match self.resolver.resolve(&key) {
            Ok(resource) => {
                let resource = Arc::new(resource);
                self.cache.insert(&key, Lookup::Found(Arc::clone(&resource)));
                Ok(resource)
            }
            Err(Exception::FileNotFound) => {
                self.cache.insert(&key, Lookup::NotFound);
                Err(Exception::FileNotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// 处理一个已解析的请求，任何错误都会被转换为对应状态码的响应。
    pub async fn handle(&self, request: &Request, id: u128) -> Response {
        let start_time = Instant::now();
        let mut response = self.dispatch(request, id).await;
        response.set_version(*request.version());
        debug!(
            "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
            id,
            start_time.elapsed().as_millis()
        );
        info!(
            "[ID{}] {}, {}, {}, {}, {}, {}, ",
            id,
            request.version(),
            request.path(),
            request.method(),
            response.status_code(),
            response.information(),
            request.user_agent(),
        );
        response
    }

    /// 按 `chunk_size` 分块写出流式响应的文件内容，返回写出的字节数。
    ///
    /// 打开或读取文件失败说明缓存的映射已经失效，对应条目会被驱逐；写入失败只向上传递。
    pub async fn stream_body<W>(
        &self,
        writer: &mut W,
        request: &Request,
        response: &Response,
        id: u128,
    ) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let path = match response.stream_path() {
            Some(path) => path,
            None => return Ok(0),
        };
        let mut file = match TokioFile::open(path).await {
            Ok(file) => file,
            Err(e) => {
                self.evict(request, id);
                return Err(e);
            }
        };
        let mut buffer = vec![0u8; self.config.chunk_size()];
        let mut total_sent = 0u64;
        loop {
            let n = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.evict(request, id);
                    return Err(e);
                }
            };
            writer.write_all(&buffer[..n]).await?;
            total_sent += n as u64;
        }
        debug!("[ID{}]流式传输完成，共发送 {} 字节", id, total_sent);
        Ok(total_sent)
    }

    fn evict(&self, request: &Request, id: u128) {
        if let Ok(key) = ResourceResolver::cache_key(request.path()) {
            if self.cache.invalidate(&key) {
                warn!("[ID{}]无法读取{}对应的文件，已驱逐缓存", id, key);
            }
        }
    }

    async fn dispatch(&self, request: &Request, id: u128) -> Response {
        let accept_encoding = request.accept_encoding();
        let debug_mode = self.config.debug();
        let method = request.method();
        if method == HttpRequestMethod::Options {
            return Response::from_status_code(204, accept_encoding, id);
        }

        let resource = match self.lookup_resource(request.path(), id) {
            Ok(resource) => resource,
            Err(Exception::ContainmentViolation) => {
                warn!("[ID{}]请求的路径：{} 逃出了挂载目录，返回404", id, request.path());
                return Response::from_exception(&Exception::ContainmentViolation, accept_encoding, debug_mode, id);
            }
            Err(e) => {
                warn!("[ID{}]请求的路径：{} 无法解析：{}", id, request.path(), e);
                return Response::from_exception(&e, accept_encoding, debug_mode, id);
            }
        };

        let headonly = method == HttpRequestMethod::Head;
        if resource.executable() {
            // HEAD 不运行程序
            if headonly {
                return Response::from_executable_head(&resource);
            }
            let params = request.params();
            return match self
                .engine
                .execute(&resource, &params, request.cookies(), id)
                .await
            {
                Ok(output) => Response::from_execution(output),
                Err(e) => {
                    error!("[ID{}]执行{}失败：{}", id, resource.local_path().display(), e);
                    if e.invalidates_cache() {
                        self.cache.invalidate(resource.web_path());
                    }
                    Response::from_exception(&e, accept_encoding, debug_mode, id)
                }
            };
        }

        match Response::from_file(&resource, accept_encoding, headonly, &self.config, id) {
            Ok(response) => response,
            Err(e) => {
                self.cache.invalidate(resource.web_path());
                Response::from_exception(&e, accept_encoding, debug_mode, id)
            }
        }
    }
}
