use std::{
    ffi::CString,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::Regex;

use crate::param::STATUS_CODES;

lazy_static! {
    /// 只接受 ASCII 标识符，比 Unicode 标识符更严格。
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// 错误页面生成器。
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <!-- 本文件由 mountserve 自动生成 -->
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 判断参数名 / Cookie 名是否是合法标识符。
///
/// 不合法的名字会被直接丢弃，防止通过构造的键名向子进程注入命令行选项。
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// `target` 经过符号链接展开后是否仍位于 `root` 之内。
///
/// `root` 必须已经是规范化路径。任何 I/O 错误都视为不包含。
pub fn path_contains(root: &Path, target: &Path) -> bool {
    contained_path(root, target).is_some()
}

/// 与 [`path_contains`] 相同，但返回展开后的真实路径。
pub fn contained_path(root: &Path, target: &Path) -> Option<PathBuf> {
    let real = target.canonicalize().ok()?;
    if real.starts_with(root) {
        Some(real)
    } else {
        None
    }
}

/// 当前进程是否对该文件拥有执行权限。
pub fn is_executable(path: &Path) -> bool {
    let c_path = match CString::new(path.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return false,
    };
    // SAFETY: c_path 是以 NUL 结尾的合法 C 字符串，access 不会保留该指针。
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}
