// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖协议解析错误、资源解析错误（未找到 / 越界访问）以及子进程执行错误。
//! - **语义映射**：每个变体都对应一个 HTTP 状态码，见 [`Exception::status_code`]。
//! - **作用域**：任何异常都只影响单个请求，不会导致服务器进程退出。

use std::fmt;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行格式不正确。
    MalformedRequest,
    /// 客户端使用了服务器不支持的 HTTP 方法（例如 DELETE）。对应 `405 Method Not Allowed`。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求路径无法解码（例如非法的百分号编码）。对应 `400 Bad Request`。
    InvalidPath,
    /// 请求体超过了配置的上限。对应 `413 Content Too Large`。
    PayloadTooLarge,
    /// 没有任何挂载点或文件能匹配该路径。对应 `404 Not Found`，不视为错误。
    FileNotFound,
    /// 解析出的路径经过符号链接展开后逃出了挂载目录，或路径中含有 `..`。
    ///
    /// 对客户端的表现与 `FileNotFound` 完全一致，避免泄露挂载结构。
    ContainmentViolation,
    /// 子进程以非零状态退出。`stderr` 仅在 debug 模式下返回给客户端。
    ProcessError { status: Option<i32>, stderr: String },
    /// 启动子进程或与其通信失败。
    InternalError { reason: String },
    /// 子进程超过了墙钟时间上限，整个进程组已被杀死。
    ExecTimeout { limit_secs: u64 },
    /// 配置文件缺失或格式错误，只会在启动阶段出现。
    ConfigError { reason: String },
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest | UnsupportedHttpVersion | InvalidPath => 400,
            UnSupportedRequestMethod => 405,
            PayloadTooLarge => 413,
            FileNotFound | ContainmentViolation => 404,
            ProcessError { .. } | InternalError { .. } | ExecTimeout { .. } | ConfigError { .. } => 500,
        }
    }

    /// 是否说明路径缓存中的映射可能已经过期，需要被驱逐。
    pub fn invalidates_cache(&self) -> bool {
        matches!(self, InternalError { .. } | ExecTimeout { .. })
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request line"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            InvalidPath => write!(f, "Invalid path (400)"),
            PayloadTooLarge => write!(f, "Request body too large (413)"),
            FileNotFound => write!(f, "File not found (404)"),
            ContainmentViolation => write!(f, "Path escapes its mount directory"),
            ProcessError { status, stderr } => match status {
                Some(code) => write!(f, "process exited with status {}:\n{}", code, stderr),
                None => write!(f, "process terminated by signal:\n{}", stderr),
            },
            InternalError { reason } => write!(f, "internal error: {}", reason),
            ExecTimeout { limit_secs } => write!(f, "process exceeded the {}s time limit", limit_secs),
            ConfigError { reason } => write!(f, "configuration error: {}", reason),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_looks_like_not_found() {
        assert_eq!(ContainmentViolation.status_code(), FileNotFound.status_code());
        assert_eq!(ContainmentViolation.status_code(), 404);
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(MalformedRequest.status_code(), 400);
        assert_eq!(UnSupportedRequestMethod.status_code(), 405);
        assert_eq!(PayloadTooLarge.status_code(), 413);
    }

    #[test]
    fn test_execution_failures_are_500() {
        let process = ProcessError { status: Some(2), stderr: "boom".to_string() };
        let internal = InternalError { reason: "spawn".to_string() };
        let timeout = ExecTimeout { limit_secs: 10 };
        for e in [process, internal, timeout] {
            assert_eq!(e.status_code(), 500);
        }
    }

    #[test]
    fn test_only_internal_failures_invalidate_cache() {
        assert!(InternalError { reason: "x".to_string() }.invalidates_cache());
        assert!(ExecTimeout { limit_secs: 1 }.invalidates_cache());
        assert!(!ProcessError { status: Some(1), stderr: String::new() }.invalidates_cache());
        assert!(!FileNotFound.invalidates_cache());
    }

    #[test]
    fn test_process_error_display_carries_stderr() {
        let e = ProcessError { status: Some(3), stderr: "trace".to_string() };
        let s = e.to_string();
        assert!(s.contains("status 3"));
        assert!(s.contains("trace"));
    }
}
