//! # stderr 旁路协议
//!
//! 可执行文件的 stdout 完全用作响应体，Cookie 和响应头则通过 stderr 传回：
//!
//! ```text
//! 任意日志输出……
//! ----------ENV----------\n
//! COOKIE_session=abc123\0CACHE_CONTROL=no-store
//! ```
//!
//! 只解析**最后一个**标记行之后的字节；记录以 NUL 分隔，形如 `NAME=VALUE`。

/// 标记行，之前的内容视为普通日志。
pub const ENV_MARKER: &[u8] = b"----------ENV----------\n";

/// Cookie 记录名前缀，同时也是传给子进程的环境变量前缀。
pub const COOKIE_PREFIX: &str = "COOKIE_";

/// 映射为 `Cache-Control` 响应头的记录名。
pub const CACHE_CONTROL: &str = "CACHE_CONTROL";

/// 从旁路中解析出的响应元数据。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideChannel {
    /// `name=value`，按出现顺序
    pub cookies: Vec<String>,
    pub headers: Vec<(String, String)>,
}

impl SideChannel {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.headers.is_empty()
    }
}

/// 解析子进程的 stderr。没有标记行时返回空结果。
pub fn parse(stderr: &[u8]) -> SideChannel {
    let mut channel = SideChannel::default();
    let region = match rfind(stderr, ENV_MARKER) {
        Some(pos) => &stderr[pos + ENV_MARKER.len()..],
        None => return channel,
    };

    for record in region.split(|b| *b == 0) {
        let record = String::from_utf8_lossy(record);
        let record = record.trim_end_matches(&['\r', '\n'][..]);
        // 残留的换行会导致响应头注入
        if record.is_empty() || record.contains(&['\r', '\n'][..]) {
            continue;
        }
        let (name, value) = match record.split_once('=') {
            Some(pair) => pair,
            None => continue,
        };
        if let Some(cookie) = name.strip_prefix(COOKIE_PREFIX) {
            if !cookie.is_empty() {
                channel.cookies.push(format!("{}={}", cookie, value));
            }
        } else if name == CACHE_CONTROL {
            channel.headers.push(("Cache-Control".to_string(), value.to_string()));
        }
    }
    channel
}

/// 生成旁路数据，供测试脚本与辅助工具使用。
pub fn encode(records: &[(&str, &str)]) -> Vec<u8> {
    let mut out = ENV_MARKER.to_vec();
    for (i, (name, value)) in records.iter().enumerate() {
        if i > 0 {
            out.push(0);
        }
        out.extend_from_slice(name.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
    }
    out
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_and_cache_control_after_noise() {
        let mut stderr = b"warning: something happened\nmore noise\n".to_vec();
        stderr.extend_from_slice(ENV_MARKER);
        stderr.extend_from_slice(b"COOKIE_session=abc123\0CACHE_CONTROL=no-store");

        let channel = parse(&stderr);
        assert_eq!(channel.cookies, vec!["session=abc123".to_string()]);
        assert_eq!(
            channel.headers,
            vec![("Cache-Control".to_string(), "no-store".to_string())]
        );
    }

    #[test]
    fn test_only_last_marker_counts() {
        let mut stderr = ENV_MARKER.to_vec();
        stderr.extend_from_slice(b"COOKIE_stale=1\n");
        stderr.extend_from_slice(ENV_MARKER);
        stderr.extend_from_slice(b"COOKIE_fresh=2");

        let channel = parse(&stderr);
        assert_eq!(channel.cookies, vec!["fresh=2".to_string()]);
    }

    #[test]
    fn test_no_marker_means_nothing() {
        let channel = parse(b"COOKIE_a=1\0CACHE_CONTROL=no-store");
        assert!(channel.is_empty());
        assert!(parse(b"").is_empty());
    }

    #[test]
    fn test_records_without_equals_are_ignored() {
        let mut stderr = ENV_MARKER.to_vec();
        stderr.extend_from_slice(b"\0garbage\0COOKIE_a=1\0\0OTHER=x");
        let channel = parse(&stderr);
        assert_eq!(channel.cookies, vec!["a=1".to_string()]);
        assert!(channel.headers.is_empty());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let mut stderr = ENV_MARKER.to_vec();
        stderr.extend_from_slice(b"COOKIE_token=a=b=c");
        assert_eq!(parse(&stderr).cookies, vec!["token=a=b=c".to_string()]);
    }

    #[test]
    fn test_trailing_newline_trimmed_and_injection_dropped() {
        let mut stderr = ENV_MARKER.to_vec();
        stderr.extend_from_slice(b"CACHE_CONTROL=max-age=60\n\0COOKIE_x=1\r\nSet-Cookie: evil=1");
        let channel = parse(&stderr);
        assert_eq!(
            channel.headers,
            vec![("Cache-Control".to_string(), "max-age=60".to_string())]
        );
        assert!(channel.cookies.is_empty());
    }

    #[test]
    fn test_empty_cookie_name_ignored() {
        let mut stderr = ENV_MARKER.to_vec();
        stderr.extend_from_slice(b"COOKIE_=1");
        assert!(parse(&stderr).is_empty());
    }

    #[test]
    fn test_encode_is_understood_by_parse() {
        let bytes = encode(&[("COOKIE_user", "alice"), ("CACHE_CONTROL", "private")]);
        assert!(bytes.starts_with(ENV_MARKER));
        let channel = parse(&bytes);
        assert_eq!(channel.cookies, vec!["user=alice".to_string()]);
        assert_eq!(channel.headers[0].1, "private");
    }

    #[test]
    fn test_marker_must_be_complete() {
        let channel = parse(b"----------ENV----------COOKIE_a=1");
        assert!(channel.is_empty());
    }
}
