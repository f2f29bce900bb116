// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责把 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（方法、路径、版本），路径会做百分号解码并与查询串分离。
//! 2. 常用标头：`User-Agent`、`Accept-Encoding`、`Cookie`、`Content-Type`、`Content-Length`。
//! 3. 参数：查询串与 POST 表单（`application/x-www-form-urlencoded` 或 `multipart/form-data`）。

use bytes::Bytes;
use log::{debug, error};
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

use crate::{exception::Exception, param::*};

/// 按首次出现顺序保存的多值参数表。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Vec<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, values)) => values.push(value.to_string()),
            None => self.entries.push((name.to_string(), vec![value.to_string()])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 空值会被保留，交给执行引擎决定是否丢弃。
    pub fn from_urlencoded(input: &[u8]) -> Self {
        let mut params = Self::new();
        for (k, v) in form_urlencoded::parse(input) {
            params.push(&k, &v);
        }
        params
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k.as_ref(), v.as_ref());
        }
        params
    }
}

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// 解码后的路径，不含查询串
    path: String,
    version: HttpVersion,
    user_agent: String,
    accept_encoding: Vec<HttpEncoding>,
    cookies: Vec<(String, String)>,
    content_type: Option<String>,
    content_length: Option<usize>,
    query: Params,
    body: Bytes,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// `buffer` 包含请求头与（可能存在的）请求体，`id` 仅用于日志追踪。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, body) = match find_subsequence(buffer, b"\r\n\r\n") {
            Some(pos) => (&buffer[..pos], &buffer[pos + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };
        // 请求头必须是 UTF-8，请求体可以是任意字节
        let request_string = match std::str::from_utf8(head) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let request_lines: Vec<&str> = request_string.split(CRLF).collect();

        // 1. 解析请求行 (e.g., "GET /index.html?x=1 HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();
        if first_line_parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[2].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let target = first_line_parts[1];
        let (raw_path, raw_query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        // `+` 在路径中不代表空格；不完整的转义序列原样保留
        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| {
                error!("[ID{}]无法解码请求路径：{}", id, raw_path);
                Exception::InvalidPath
            })?
            .into_owned();
        let query = Params::from_urlencoded(raw_query.as_bytes());

        // 2. 迭代各行解析 Headers，字段名大小写不敏感
        let mut user_agent = String::new();
        let mut accept_encoding = vec![];
        let mut cookies = vec![];
        let mut content_type = None;
        let mut content_length = None;
        for line in request_lines.iter().skip(1) {
            let (name, value) = match line.split_once(':') {
                Some((n, v)) => (n.trim().to_lowercase(), v.trim()),
                None => continue,
            };
            match name.as_str() {
                "user-agent" => user_agent = value.to_string(),
                "accept-encoding" => {
                    if value.contains("gzip") {
                        accept_encoding.push(HttpEncoding::Gzip);
                    }
                    if value.contains("deflate") {
                        accept_encoding.push(HttpEncoding::Deflate);
                    }
                }
                "cookie" => cookies.extend(parse_cookies(value)),
                "content-type" => content_type = Some(value.to_string()),
                "content-length" => content_length = value.parse::<usize>().ok(),
                _ => {}
            }
        }
        debug!("[ID{}]请求头解析完毕，Cookie {} 个", id, cookies.len());

        let body = match content_length {
            Some(len) if len <= body.len() => Bytes::copy_from_slice(&body[..len]),
            _ => Bytes::copy_from_slice(body),
        };

        Ok(Self {
            method,
            path,
            version,
            user_agent,
            accept_encoding,
            cookies,
            content_type,
            content_length,
            query,
            body,
        })
    }

    /// 交给可执行文件的参数：POST 使用表单参数，其余方法使用查询参数。
    pub fn params(&self) -> Params {
        if self.method != HttpRequestMethod::Post {
            return self.query.clone();
        }
        let content_type = self.content_type.as_deref().unwrap_or("");
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "application/x-www-form-urlencoded" => Params::from_urlencoded(&self.body),
            "multipart/form-data" => match boundary(content_type) {
                Some(b) => parse_multipart(&self.body, &b),
                None => Params::new(),
            },
            _ => Params::new(),
        }
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn query(&self) -> &Params {
        &self.query
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case("boundary") {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// 只提取表单字段，文件内容按文本处理。
fn parse_multipart(body: &[u8], boundary: &str) -> Params {
    let mut params = Params::new();
    let delimiter = format!("--{}", boundary);
    let mut rest = body;
    while let Some(start) = find_subsequence(rest, delimiter.as_bytes()) {
        rest = &rest[start + delimiter.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        let end = find_subsequence(rest, delimiter.as_bytes()).unwrap_or(rest.len());
        let part = &rest[..end];
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);
        if let Some(split) = find_subsequence(part, b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&part[..split]);
            let value = String::from_utf8_lossy(&part[split + 4..]);
            if let Some(name) = disposition_name(&headers) {
                params.push(&name, &value);
            }
        }
    }
    params
}

fn disposition_name(headers: &str) -> Option<String> {
    let line = headers
        .split("\r\n")
        .find(|l| l.to_lowercase().starts_with("content-disposition"))?;
    line.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim() == "name" {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_request() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.path(), "/");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(request.accept_encoding().contains(&HttpEncoding::Deflate));
    }

    #[test]
    fn test_query_string_split_from_path() {
        let request_str = "GET /page?id=123&name=test&id=456 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.path(), "/page");
        assert_eq!(request.query().get("id").unwrap(), &["123", "456"]);
        assert_eq!(request.params().get("name").unwrap(), &["test"]);
    }

    #[test]
    fn test_percent_decoded_path() {
        let request_str = "GET /a%20b/%2e%2e/c HTTP/1.1\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert_eq!(request.path(), "/a b/../c");
    }

    #[test]
    fn test_non_utf8_path_is_invalid() {
        for target in ["/%ff", "/%c3%28", "/a/%80b"] {
            let request_str = format!("GET {} HTTP/1.1\r\n\r\n", target);
            let result = Request::try_from(request_str.as_bytes(), 0);
            assert_eq!(result.unwrap_err(), Exception::InvalidPath);
        }
    }

    #[test]
    fn test_incomplete_escape_kept_literally() {
        let request = Request::try_from(b"GET /100%zz/%e HTTP/1.1\r\n\r\n".as_slice(), 0).unwrap();
        assert_eq!(request.path(), "/100%zz/%e");
    }

    #[test]
    fn test_cookies() {
        let request_str = "GET / HTTP/1.1\r\nCookie: session=abc; theme=\"dark\"; bad\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert_eq!(
            request.cookies(),
            &[
                ("session".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn test_post_urlencoded_uses_body() {
        let request_str = "POST /submit?from=query HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 21\r\n\r\nuser=alice&note=a+b&x";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        let params = request.params();

        assert_eq!(request.method(), HttpRequestMethod::Post);
        assert_eq!(params.get("user").unwrap(), &["alice"]);
        assert_eq!(params.get("note").unwrap(), &["a b"]);
        assert_eq!(params.get("x").unwrap(), &[""]);
        assert!(params.get("from").is_none());
    }

    #[test]
    fn test_post_multipart() {
        let body = "--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello world\r\n--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nline1\r\nline2\r\n--XyZ--\r\n";
        let request_str = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        let params = request.params();
        assert_eq!(params.get("title").unwrap(), &["hello world"]);
        assert_eq!(params.get("file").unwrap(), &["line1\r\nline2"]);
    }

    #[test]
    fn test_post_unknown_content_type_has_no_params() {
        let request_str = "POST /x?a=1 HTTP/1.1\r\nContent-Type: application/json\r\n\r\n{}";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert!(request.params().is_empty());
    }

    #[test]
    fn test_unsupported_method() {
        let request_str = "DELETE /resource HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let result = Request::try_from(request_str.as_bytes(), 0);
        assert_eq!(result.unwrap_err(), Exception::UnSupportedRequestMethod);
    }

    #[test]
    fn test_malformed_request_line() {
        for line in ["", "GET /", "GET /a b HTTP/1.1"] {
            let request_str = format!("{}\r\n\r\n", line);
            let result = Request::try_from(request_str.as_bytes(), 0);
            assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
        }
    }

    #[test]
    fn test_unsupported_http_version() {
        let request_str = "GET / HTTP/2.0\r\nHost: localhost:7878\r\n\r\n";
        let result = Request::try_from(request_str.as_bytes(), 0);
        assert_eq!(result.unwrap_err(), Exception::UnsupportedHttpVersion);
    }

    #[test]
    fn test_invalid_utf8_head() {
        let buffer = vec![0xFF, 0xFE, 0xFD];
        let result = Request::try_from(&buffer, 0);
        assert_eq!(result.unwrap_err(), Exception::RequestIsNotUtf8);
    }

    #[test]
    fn test_binary_body_is_allowed() {
        let mut buffer = b"POST /bin HTTP/1.1\r\nContent-Length: 3\r\n\r\n".to_vec();
        buffer.extend_from_slice(&[0xFF, 0x00, 0xFE]);
        let request = Request::try_from(&buffer, 0).unwrap();
        assert_eq!(request.body().as_ref(), &[0xFF, 0x00, 0xFE]);
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request_str = "GET / HTTP/1.1\r\nhost: localhost:7878\r\nuser-agent: Test\r\naccept-encoding: gzip\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.accept_encoding(), &[HttpEncoding::Gzip]);
    }

    #[test]
    fn test_lowercase_method() {
        let request_str = "get / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert_eq!(request.method(), HttpRequestMethod::Get);
    }

    #[test]
    fn test_params_from_iter_groups_values() {
        let params: Params = vec![("a", "1"), ("b", "2"), ("a", "3")].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a").unwrap(), &["1", "3"]);
        let names: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
