use crate::{
    config::Config,
    exception::Exception,
    exec::ExecutionOutput,
    param::*,
    resolver::Resource,
    util::HtmlBuilder,
};

use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    allow: Option<Vec<HttpRequestMethod>>,
    cookies: Vec<String>,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
    /// 大文件不读入内存，由连接处理器按块发送
    stream_path: Option<PathBuf>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            allow: None,
            cookies: Vec::new(),
            headers: Vec::new(),
            content: None,
            stream_path: None,
        }
    }

    /// 静态文件。`headonly` 时只填充长度与类型。
    pub fn from_file(
        resource: &Resource,
        accept_encoding: &[HttpEncoding],
        headonly: bool,
        config: &Config,
        id: u128,
    ) -> Result<Self, Exception> {
        let path = resource.local_path();
        let mime = resource.mime();
        let file_size = fs::metadata(path)
            .map_err(|e| {
                error!("[ID{}]无法获取文件{}的元数据: {}", id, path.display(), e);
                Exception::InternalError {
                    reason: format!("stat {}: {}", path.display(), e),
                }
            })?
            .len();

        let mut response = Self::new();
        response.content_type = Some(mime.to_string());
        response.content_length = file_size;
        if headonly {
            return Ok(response);
        }

        if file_size > config.streaming_threshold() {
            debug!(
                "[ID{}]文件大小 {} bytes 超过流式阈值，使用流式传输",
                id, file_size
            );
            response.stream_path = Some(path.to_path_buf());
            return Ok(response);
        }

        let contents = fs::read(path).map_err(|e| {
            error!("[ID{}]无法读取文件{}: {}", id, path.display(), e);
            Exception::InternalError {
                reason: format!("read {}: {}", path.display(), e),
            }
        })?;

        response.content_encoding = if should_skip_compression(mime) {
            None
        } else {
            decide_encoding(accept_encoding)
        };
        let contents = match compress(contents, response.content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("[ID{}]压缩文件{}失败: {}，返回未压缩内容", id, path.display(), e);
                response.content_encoding = None;
                fs::read(path).map_err(|e| Exception::InternalError {
                    reason: format!("read {}: {}", path.display(), e),
                })?
            }
        };
        response.content_length = contents.len() as u64;
        response.content = Some(Bytes::from(contents));
        Ok(response)
    }

    /// 可执行文件的输出：stdout 原样作为响应体，不压缩。
    pub fn from_execution(output: ExecutionOutput) -> Self {
        let mut response = Self::new();
        response.content_type = Some(output.mime);
        response.content_length = output.body.len() as u64;
        response.cookies = output.cookies;
        response.headers = output.headers;
        response.content = Some(output.body);
        response
    }

    /// HEAD 请求命中可执行文件时不运行它，只返回类型。
    pub fn from_executable_head(resource: &Resource) -> Self {
        let mut response = Self::new();
        response.content_type = Some(resource.mime().to_string());
        response
    }

    pub fn from_status_code(code: u16, accept_encoding: &[HttpEncoding], id: u128) -> Self {
        let mut response = Self::new();
        if code == 204 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
            response.set_code(code);
            return response;
        }
        if code == 405 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
        }
        response.content_encoding = decide_encoding(accept_encoding);
        let content = match code {
            404 => HtmlBuilder::from_status_code(404, Some(
                r"<h2>噢！</h2><p>你指定的网页无法找到。</p>"
            )),
            405 => HtmlBuilder::from_status_code(405, Some(
                r"<h2>噢！</h2><p>本服务器仅支持GET、HEAD、POST与OPTIONS方法。</p>"
            )),
            500 => HtmlBuilder::from_status_code(500, Some(
                r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"
            )),
            _ => HtmlBuilder::from_status_code(code, None),
        }
        .build()
        .into_bytes();
        let content = match compress(content.clone(), response.content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("[ID{}]压缩错误页面失败: {}", id, e);
                response.content_encoding = None;
                content
            }
        };
        response.content_length = content.len() as u64;
        response.content = Some(Bytes::from(content));
        response.content_type = Some("text/html;charset=utf-8".to_string());
        response.set_code(code);
        response
    }

    /// debug 模式下的诊断信息，永远是纯文本。
    pub fn from_diagnostic(code: u16, text: &str) -> Self {
        let mut response = Self::new();
        let bytes = Bytes::from(text.to_string());
        response.content_length = bytes.len() as u64;
        response.content = Some(bytes);
        response.content_type = Some("text/plain;charset=utf-8".to_string());
        response.set_code(code);
        response
    }

    /// 根据异常生成响应；`debug` 为真时附带诊断文本。
    pub fn from_exception(e: &Exception, accept_encoding: &[HttpEncoding], debug: bool, id: u128) -> Self {
        let code = e.status_code();
        if debug {
            let text = match e {
                Exception::ProcessError { stderr, .. } => format!("execution error:\n{}", stderr),
                Exception::FileNotFound | Exception::ContainmentViolation => {
                    return Self::from_status_code(code, accept_encoding, id)
                }
                other => format!("server error:\n{}", other),
            };
            return Self::from_diagnostic(code, &text);
        }
        // 程序失败时客户端只看到空的 500
        if let Exception::ProcessError { .. } = e {
            let mut response = Self::new();
            response.set_code(code);
            return response;
        }
        Self::from_status_code(code, accept_encoding, id)
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    pub fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    fn header_string(&self) -> String {
        let version = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let mut header = format!("{} {} {}{}", version, self.status_code, self.information, CRLF);
        if let Some(t) = &self.content_type {
            header.push_str(&format!("Content-Type: {}{}", t, CRLF));
        }
        if let Some(e) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content_length, CRLF));
        header.push_str(&format!("Date: {}{}", format_date(&self.date), CRLF));
        header.push_str(&format!("Server: {}{}", self.server_name, CRLF));
        if let Some(a) = &self.allow {
            let methods: Vec<String> = a.iter().map(|m| m.to_string()).collect();
            header.push_str(&format!("Allow: {}{}", methods.join(", "), CRLF));
        }
        for cookie in &self.cookies {
            header.push_str(&format!("Set-Cookie: {}{}", cookie, CRLF));
        }
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        header.push_str("Connection: close");
        header.push_str(CRLF);
        header.push_str(CRLF);
        header
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        [
            self.header_string().as_bytes(),
            match &self.content {
                Some(c) => c.as_ref(),
                None => &[],
            },
        ]
        .concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn stream_path(&self) -> Option<&Path> {
        self.stream_path.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_path.is_some()
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        None => Ok(data),
    }
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/x-rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/octet-stream",
        "font/woff",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else {
        None
    }
}
