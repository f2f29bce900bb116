// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试套件
    //!
    //! 模拟常见的攻击向量，验证服务器不会泄露挂载目录之外的内容：
    //! - 路径遍历（明文、百分号编码、空字节）
    //! - 符号链接逃逸
    //! - 参数与 Cookie 注入
    //! - 旁路协议中的响应头注入

    use std::{fs, os::unix::fs::PermissionsExt, path::Path};

    use mountserve::{
        config::{Config, MountConfig, WebConfig},
        exception::Exception,
        handler::AppContext,
        request::Request,
    };
    use tempfile::TempDir;

    struct Fixture {
        _outside: TempDir,
        site: TempDir,
        ctx: AppContext,
    }

    /// 挂载目录旁边放一个不应被访问的 secret.txt。
    fn fixture(debug: bool) -> Fixture {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "TOP-SECRET").unwrap();
        let site = TempDir::new().unwrap();
        fs::write(site.path().join("index.html"), "home").unwrap();
        std::os::unix::fs::symlink(outside.path(), site.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            site.path().join("shortcut.txt"),
        )
        .unwrap();

        let mut config = Config::new();
        config.set_debug(debug).set_mounts(vec![MountConfig {
            path: site.path().to_string_lossy().into_owned(),
            prefix: "/".to_string(),
        }]);
        let ctx = AppContext::new(config, &WebConfig::defaults()).unwrap();
        Fixture {
            _outside: outside,
            site,
            ctx,
        }
    }

    fn script(root: &Path, name: &str, body: &str) {
        let path = root.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// 发送请求，返回状态码与完整响应文本。
    async fn send_request(ctx: &AppContext, raw: &str) -> (u16, String) {
        match Request::try_from(raw.as_bytes(), 0) {
            Ok(request) => {
                let response = ctx.handle(&request, 0).await;
                let text = String::from_utf8_lossy(&response.as_bytes()).to_string();
                (response.status_code(), text)
            }
            Err(e) => (e.status_code(), e.to_string()),
        }
    }

    async fn assert_hidden(ctx: &AppContext, path: &str) {
        let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
        let (status, text) = send_request(ctx, &raw).await;
        assert_ne!(status, 200, "{} 不应返回 200", path);
        assert!(!text.contains("TOP-SECRET"), "{} 泄露了挂载目录之外的内容", path);
    }

    /// ## 攻击向量：基础路径遍历
    #[tokio::test]
    async fn test_path_traversal_simple() {
        let f = fixture(false);
        for path in ["/../secret.txt", "/../../etc/passwd", "/a/b/../../../etc/passwd"] {
            assert_hidden(&f.ctx, path).await;
        }
    }

    /// ## 攻击向量：URL 编码混淆遍历
    #[tokio::test]
    async fn test_path_traversal_encoded() {
        let f = fixture(false);
        for path in [
            "/%2e%2e/etc/passwd",
            "/%2E%2E%2Fetc%2Fpasswd",
            "/..%2f..%2fetc/passwd",
            "/..%5c..%5cetc/passwd",
        ] {
            assert_hidden(&f.ctx, path).await;
        }
    }

    /// ## 攻击向量：空字节注入
    #[tokio::test]
    async fn test_null_byte_injection() {
        let f = fixture(false);
        assert_hidden(&f.ctx, "/index.html%00.txt").await;
    }

    /// ## 攻击向量：符号链接逃逸
    #[tokio::test]
    async fn test_symlink_escape() {
        let f = fixture(false);
        assert_hidden(&f.ctx, "/link/secret.txt").await;
        assert_hidden(&f.ctx, "/shortcut.txt").await;
        assert_hidden(&f.ctx, "/shortcut").await;
    }

    /// 越界访问与不存在的文件对客户端不可区分，debug 模式也一样。
    #[tokio::test]
    async fn test_containment_indistinguishable_from_not_found() {
        for debug in [false, true] {
            let f = fixture(debug);
            let (escape_status, escape) = send_request(&f.ctx, "GET /link/secret.txt HTTP/1.1\r\n\r\n").await;
            let (missing_status, missing) = send_request(&f.ctx, "GET /nothing.txt HTTP/1.1\r\n\r\n").await;
            assert_eq!(escape_status, 404);
            assert_eq!(missing_status, 404);
            let body = |text: &str| text.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
            assert_eq!(body(&escape), body(&missing));
        }
    }

    /// ## 健壮性测试：非标准 HTTP 版本与方法
    #[tokio::test]
    async fn test_malformed_request_line() {
        let f = fixture(false);
        let (status, _) = send_request(&f.ctx, "GET / HTTP/9.9\r\n\r\n").await;
        assert_eq!(status, 400);
        let (status, _) = send_request(&f.ctx, "DELETE / HTTP/1.1\r\n\r\n").await;
        assert_eq!(status, 405);
        let (status, _) = send_request(&f.ctx, "GARBAGE\r\n\r\n").await;
        assert_eq!(status, 400);
    }

    /// ## 攻击向量：参数注入
    /// 非法参数名不会出现在子进程的命令行中。
    #[tokio::test]
    async fn test_parameter_injection() {
        let f = fixture(false);
        script(f.site.path(), "args.sh", "printf '[%s]' \"$@\"\n");
        let (status, text) = send_request(
            &f.ctx,
            "GET /args?ok=1&%3B%20rm%20-rf%20%2F=x&--exec=y&a%20b=z HTTP/1.1\r\n\r\n",
        )
        .await;
        assert_eq!(status, 200);
        assert!(text.ends_with("[--ok][1]"));
        assert!(!text.contains("rm -rf"));
        assert!(!text.contains("exec"));
    }

    /// ## 攻击向量：Cookie 注入
    /// 名字不是合法标识符的 Cookie 不会进入子进程环境。
    #[tokio::test]
    async fn test_cookie_name_injection() {
        let f = fixture(false);
        script(f.site.path(), "env.sh", "env\n");
        let (_, text) = send_request(
            &f.ctx,
            "GET /env HTTP/1.1\r\nCookie: good=1; LD_PRELOAD=/tmp/x.so; a-b=2\r\n\r\n",
        )
        .await;
        assert!(text.contains("COOKIE_good=1"));
        assert!(text.contains("COOKIE_LD_PRELOAD=/tmp/x.so"));
        assert!(!text.lines().any(|l| l.starts_with("LD_PRELOAD=")));
        assert!(!text.contains("a-b"));
    }

    /// ## 攻击向量：响应头注入
    /// 旁路记录中残留的 CR/LF 会使整条记录被丢弃。
    #[tokio::test]
    async fn test_crlf_injection_from_program() {
        let f = fixture(false);
        script(
            f.site.path(),
            "inject.sh",
            "echo '----------ENV----------' >&2\nprintf 'COOKIE_a=1\\r\\nX-Evil: yes\\000CACHE_CONTROL=private' >&2\nprintf ok\n",
        );
        let (status, text) = send_request(&f.ctx, "GET /inject HTTP/1.1\r\n\r\n").await;
        assert_eq!(status, 200);
        assert!(!text.contains("X-Evil"));
        assert!(!text.contains("Set-Cookie"));
        assert!(text.contains("Cache-Control: private\r\n"));
    }

    /// 执行失败时，非 debug 模式不会泄露 stderr。
    #[tokio::test]
    async fn test_stderr_hidden_without_debug() {
        let f = fixture(false);
        script(f.site.path(), "leak.sh", "echo 'password=hunter2' >&2\nexit 1\n");
        let (status, text) = send_request(&f.ctx, "GET /leak HTTP/1.1\r\n\r\n").await;
        assert_eq!(status, 500);
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_percent_encoded_dotdot_is_rejected_after_decoding() {
        let request = Request::try_from(b"GET /%2e%2e/x HTTP/1.1\r\n\r\n".as_slice(), 0).unwrap();
        assert_eq!(request.path(), "/../x");
        assert_eq!(
            mountserve::resolver::normalize_path(request.path()).unwrap_err(),
            Exception::ContainmentViolation
        );
    }
}
