//! # MIME 类型解析
//!
//! 根据资源的*逻辑*文件名（URL 最后一段，或索引回退时使用的索引名）推断 `Content-Type`。
//! 磁盘上实际文件的后缀不参与判断：`/report` 即便由 `report.py` 提供，也按无后缀处理。

use std::collections::HashMap;

/// 兜底类型在 `file_types` 中的键。
pub const WILDCARD: &str = "*";

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct MimeResolver {
    /// 键已转为小写，带前导点号
    types: HashMap<String, String>,
    wildcard: String,
}

impl MimeResolver {
    pub fn new(file_types: &HashMap<String, String>) -> Self {
        let wildcard = file_types
            .get(WILDCARD)
            .cloned()
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let types = file_types
            .iter()
            .filter(|(k, _)| k.as_str() != WILDCARD)
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        Self { types, wildcard }
    }

    /// 为逻辑路径选择 MIME 类型。
    ///
    /// 后缀链从最长到最短依次尝试，因此 `x.tar.gz` 先查 `.tar.gz` 再查 `.gz`。
    pub fn mime_for(&self, web_path: &str) -> &str {
        let name = web_path.rsplit('/').next().unwrap_or("");
        for suffix in suffix_chain(name) {
            if let Some(mime) = self.types.get(&suffix.to_ascii_lowercase()) {
                return mime;
            }
        }
        &self.wildcard
    }

    pub fn wildcard(&self) -> &str {
        &self.wildcard
    }
}

/// `a.tar.gz` -> [".tar.gz", ".gz"]；无后缀时为空。
fn suffix_chain(name: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    // 跳过第一个字符，`.bashrc` 这类隐藏文件整体视为后缀
    for (i, c) in name.char_indices().skip(1) {
        if c == '.' && i + 1 < name.len() {
            chain.push(&name[i..]);
        }
    }
    if name.starts_with('.') && name.len() > 1 {
        chain.insert(0, name);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(pairs: &[(&str, &str)]) -> MimeResolver {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MimeResolver::new(&map)
    }

    #[test]
    fn test_suffix_chain() {
        assert_eq!(suffix_chain("x.tar.gz"), vec![".tar.gz", ".gz"]);
        assert_eq!(suffix_chain("index.html"), vec![".html"]);
        assert!(suffix_chain("report").is_empty());
        assert!(suffix_chain("trailing.").is_empty());
        assert_eq!(suffix_chain(".bashrc"), vec![".bashrc"]);
    }

    #[test]
    fn test_compound_suffix_preferred() {
        let r = resolver(&[
            (".tar.gz", "application/x-compressed-tar"),
            (".gz", "application/gzip"),
            ("*", "text/plain"),
        ]);
        assert_eq!(r.mime_for("/dl/x.tar.gz"), "application/x-compressed-tar");
        assert_eq!(r.mime_for("/dl/x.gz"), "application/gzip");
    }

    #[test]
    fn test_compound_suffix_falls_back_to_last() {
        let r = resolver(&[(".gz", "application/gzip"), ("*", "text/plain")]);
        assert_eq!(r.mime_for("/x.tar.gz"), "application/gzip");
    }

    #[test]
    fn test_wildcard_when_nothing_matches() {
        let r = resolver(&[(".html", "text/html"), ("*", "text/plain")]);
        assert_eq!(r.mime_for("/x.tar.gz"), "text/plain");
        assert_eq!(r.mime_for("/report"), "text/plain");
        assert_eq!(r.mime_for("/"), "text/plain");
    }

    #[test]
    fn test_case_insensitive_suffix() {
        let r = resolver(&[(".HTML", "text/html"), ("*", "text/plain")]);
        assert_eq!(r.mime_for("/INDEX.Html"), "text/html");
    }

    #[test]
    fn test_missing_wildcard_uses_octet_stream() {
        let r = resolver(&[(".html", "text/html")]);
        assert_eq!(r.mime_for("/x"), "application/octet-stream");
        assert_eq!(r.wildcard(), "application/octet-stream");
    }

    #[test]
    fn test_only_last_segment_counts() {
        let r = resolver(&[(".d", "text/x-d"), ("*", "text/plain")]);
        assert_eq!(r.mime_for("/conf.d/readme"), "text/plain");
    }
}
