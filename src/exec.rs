// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 执行引擎
//!
//! 以类 CGI 的方式运行被标记为可执行的资源：
//!
//! - 参数：`[executor?, 本地路径, --name value..., ...]`，只接受合法标识符作为参数名，
//!   `_` 转换为 `-`，空值丢弃。
//! - 环境变量：清空后只保留 `PATH`，每个合法 Cookie 以 `COOKIE_<name>` 传入。
//! - stdout 原样作为响应体，stderr 按旁路协议解析出 Cookie 与响应头。
//! - 子进程在独立进程组中运行；超时后整个进程组被 `SIGKILL`，不保留任何部分输出。

use std::{
    ffi::OsString,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use bytes::Bytes;
use log::{debug, error, warn};
use tokio::{process::Command, time::timeout};

use crate::{
    exception::Exception,
    protocol::{self, COOKIE_PREFIX},
    request::Params,
    resolver::Resource,
    util::is_identifier,
};

/// 成功执行后的输出。
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub body: Bytes,
    pub mime: String,
    pub cookies: Vec<String>,
    pub headers: Vec<(String, String)>,
}

pub type ExecutionResult = Result<ExecutionOutput, Exception>;

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    executor: Option<PathBuf>,
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(executor: Option<PathBuf>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 组装命令行参数（不含程序本身）。
    pub fn build_args(&self, resource: &Resource, params: &Params) -> (OsString, Vec<OsString>) {
        let mut args: Vec<OsString> = Vec::new();
        let program = match &self.executor {
            Some(executor) => {
                args.push(resource.local_path().as_os_str().to_os_string());
                executor.as_os_str().to_os_string()
            }
            None => resource.local_path().as_os_str().to_os_string(),
        };
        args.extend(marshal_params(params).into_iter().map(OsString::from));
        (program, args)
    }

    pub async fn execute(
        &self,
        resource: &Resource,
        params: &Params,
        cookies: &[(String, String)],
        id: u128,
    ) -> ExecutionResult {
        let (program, args) = self.build_args(resource, params);
        debug!("[ID{}]执行 {:?} {:?}", id, program, args);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env_clear()
            .envs(marshal_cookies(cookies))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        if let Some(dir) = resource.local_path().parent() {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| {
            error!("[ID{}]无法启动子进程 {:?}: {}", id, program, e);
            Exception::InternalError {
                reason: format!("spawn {:?}: {}", program, e),
            }
        })?;
        let pgid = child.id();

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("[ID{}]与子进程通信失败: {}", id, e);
                return Err(Exception::InternalError {
                    reason: format!("wait: {}", e),
                });
            }
            Err(_) => {
                warn!(
                    "[ID{}]子进程运行超过{}秒，杀死整个进程组",
                    id,
                    self.timeout.as_secs_f32()
                );
                if let Some(pgid) = pgid {
                    kill_process_group(pgid);
                }
                return Err(Exception::ExecTimeout {
                    limit_secs: self.timeout.as_secs(),
                });
            }
        };
        debug!(
            "[ID{}]子进程退出：{}，用时{}ms，stdout {} bytes，stderr {} bytes",
            id,
            output.status,
            start.elapsed().as_millis(),
            output.stdout.len(),
            output.stderr.len()
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!("[ID{}]子进程以非零状态退出：{}", id, output.status);
            return Err(Exception::ProcessError {
                status: output.status.code(),
                stderr,
            });
        }

        let channel = protocol::parse(&output.stderr);
        Ok(ExecutionOutput {
            body: Bytes::from(output.stdout),
            mime: resource.mime().to_string(),
            cookies: channel.cookies,
            headers: channel.headers,
        })
    }
}

/// `foo_bar=[x, ""]` -> `--foo-bar x`；非法参数名整个丢弃。
pub fn marshal_params(params: &Params) -> Vec<String> {
    let mut args = Vec::new();
    for (name, values) in params.iter() {
        if !is_identifier(name) {
            warn!("丢弃非法参数名：{:?}", name);
            continue;
        }
        args.push(format!("--{}", name.replace('_', "-")));
        args.extend(values.iter().filter(|v| !v.is_empty()).cloned());
    }
    args
}

/// 只传递名字是合法标识符的 Cookie。
pub fn marshal_cookies(cookies: &[(String, String)]) -> Vec<(String, String)> {
    cookies
        .iter()
        .filter(|(name, _)| is_identifier(name))
        .map(|(name, value)| (format!("{}{}", COOKIE_PREFIX, name), value.clone()))
        .collect()
}

fn kill_process_group(pgid: u32) {
    // SAFETY: killpg 只接收整数参数，不涉及内存访问。
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) 失败: {}", pgid, std::io::Error::last_os_error());
    }
}
