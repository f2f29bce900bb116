// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 多挂载点静态 / CGI 服务器
//!
//! - 多个本地目录挂载到不同的 URL 前缀下，最长前缀优先
//! - 普通文件按 MIME 直接返回，可执行文件以类 CGI 方式运行
//! - 带 TTL 的 LRU 路径缓存
//! - 大文件流式传输
//! - 后台管理控制台（CLI 指令交互）

use mountserve::{
    config::{Config, WebConfig},
    exception::Exception,
    handler::AppContext,
    request::{find_subsequence, Request},
    response::Response,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    sync::Notify,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    process::ExitCode,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// 请求头的上限，超过后直接返回 400。
const MAX_HEADER_SIZE: usize = 64 * 1024;

fn main() -> ExitCode {
    // 1. 初始化日志系统
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
        return ExitCode::FAILURE;
    }

    // 2. 加载配置
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("配置文件已载入");
    let web = match config.web_config() {
        Some(path) => match WebConfig::from_json(path) {
            Ok(web) => web,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => WebConfig::defaults(),
    };
    info!("已载入{}种文件类型，索引文件：{:?}", web.file_types.len(), web.index);

    // 3. 根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = match AppContext::new(config, &web) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(ctx)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(ctx: Arc<AppContext>) -> Result<(), Exception> {
    let port = ctx.config().port();
    let address = match ctx.config().local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let listener = TcpListener::bind(SocketAddrV4::new(address, port))
        .await
        .map_err(|e| Exception::ConfigError {
            reason: format!("无法绑定端口：{}，错误：{}", port, e),
        })?;
    info!("端口{}绑定完成", port);

    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicUsize::new(0));
    tokio::spawn(console(
        Arc::clone(&ctx),
        Arc::clone(&shutdown),
        Arc::clone(&active_connection),
    ));

    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let ctx = Arc::clone(&ctx);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, &ctx).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
    Ok(())
}

/// 后台管理控制台，从标准输入读取指令。
async fn console(ctx: Arc<AppContext>, shutdown: Arc<Notify>, active_connection: Arc<AtomicUsize>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器将停止接受新连接...");
                shutdown.notify_one();
                break;
            }
            "status" => {
                println!("== Mountserve 状态 ===");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!(
                    "路径缓存: {}/{} 条",
                    ctx.cache().len(),
                    ctx.cache().capacity()
                );
                println!("挂载点数: {}", ctx.resolver().mounts().len());
                println!("=====================");
            }
            "flush" => {
                ctx.cache().clear();
                println!("路径缓存已清空");
            }
            "help" => {
                println!("== Mountserve Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("flush  - 清空路径缓存");
                println!("help   - 显示此帮助信息");
                println!("=====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

/// 读取请求头以及 `Content-Length` 指定长度的请求体。
async fn read_request(stream: &mut TcpStream, max_body_size: usize, id: u128) -> Result<Option<Vec<u8>>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find_subsequence(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
        if buffer.len() > MAX_HEADER_SIZE {
            error!("[ID{}]请求头超过{}字节", id, MAX_HEADER_SIZE);
            return Err(Exception::MalformedRequest);
        }
        let n = stream.read(&mut chunk).await.map_err(|e| {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            Exception::InternalError { reason: e.to_string() }
        })?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let content_length = content_length(&buffer[..header_end]);
    if content_length > max_body_size {
        warn!("[ID{}]请求体{}字节超过上限{}字节", id, content_length, max_body_size);
        return Err(Exception::PayloadTooLarge);
    }
    let total = header_end + content_length;
    while buffer.len() < total {
        let n = stream.read(&mut chunk).await.map_err(|e| Exception::InternalError {
            reason: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    buffer.truncate(total);
    Ok(Some(buffer))
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// # 连接处理器
///
/// 每个连接只处理一个请求，响应带 `Connection: close`。
async fn handle_connection(stream: &mut TcpStream, id: u128, ctx: &AppContext) {
    let config = ctx.config();
    let buffer = match read_request(stream, config.max_body_size(), id).await {
        Ok(Some(buffer)) => buffer,
        Ok(None) => return,
        Err(e) => {
            let response = Response::from_exception(&e, &[], config.debug(), id);
            let _ = stream.write_all(&response.as_bytes()).await;
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let request = match Request::try_from(&buffer, id) {
        Ok(req) => req,
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}", id, e);
            let response = Response::from_exception(&e, &[], config.debug(), id);
            let _ = stream.write_all(&response.as_bytes()).await;
            return;
        }
    };

    let response = ctx.handle(&request, id).await;

    if let Err(e) = stream.write_all(&response.as_bytes()).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    if response.is_streaming() {
        debug!("[ID{}]使用流式传输模式发送大文件", id);
        if let Err(e) = ctx.stream_body(stream, &request, &response, id).await {
            error!("[ID{}]流式传输失败: {}", id, e);
            return;
        }
    }
    let _ = stream.flush().await;
}
