// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发
//!
//! 按方法与资源类型决定如何构建响应：
//!
//! | 方法 | 静态资源 | 动态资源 | 不存在 |
//! |------|----------|----------|--------|
//! | GET  | 200/206/416 | 执行脚本，200 或 500 | 首页回退、目录列表或 404 |
//! | POST | 405 | 501 | 404 |
//! | 其它 | 501 | 501 | 501 |
//!
//! 路径先经过百分号解码与 `..` 检查，失败直接返回 400。
//! 响应的协议版本跟随请求：`HTTP/1.0` 原样回复，其余按 `HTTP/1.1`。

use std::{
    io::SeekFrom,
    path::Path,
    sync::Arc,
};

use log::{debug, error, warn};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};

use crate::{
    exception::Exception,
    param::{
        HttpRequestMethod, HttpStatus, HttpVersion, INDEX_FILES, SCRIPT_CONTENT_TYPE,
    },
    range::{self, RangeWindow},
    request::Request,
    resolver::{ResourceKind, ResourceResolver},
    response::{get_mime, Response},
    script::{ScriptEngine, ScriptRecord},
    util::{split_path, DirEntryInfo, HtmlBuilder},
};

const LISTING_CONTENT_TYPE: &str = "text/html;charset=utf-8";

/// 把请求映射为响应。本身不持有可变状态，可在所有工作者之间共享。
pub struct Dispatcher {
    resolver: Arc<dyn ResourceResolver>,
    engine: Arc<dyn ScriptEngine>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn ResourceResolver>, engine: Arc<dyn ScriptEngine>) -> Self {
        Self { resolver, engine }
    }

    /// 为一个已解析的请求构建响应。这里不会失败，所有错误都变成对应状态码的响应。
    pub async fn dispatch(&self, request: &Request, id: u128) -> Response {
        let mut response = self.route(request, id).await;
        response.set_version(HttpVersion::from_token(request.version()));
        response
    }

    async fn route(&self, request: &Request, id: u128) -> Response {
        let (path, query) = match split_path(request.path()) {
            Ok(p) => p,
            Err(e) => {
                warn!("[ID{}]请求的路径：{} 非法（{}），返回400", id, request.path(), e);
                return Response::from_exception(e);
            }
        };
        let kind = self.resolver.resolve(&path);
        debug!("[ID{}]路径{}解析为{:?}", id, path, kind);

        match request.method() {
            HttpRequestMethod::Get => match kind {
                ResourceKind::Static(file) => self.serve_static(request, &file, id).await,
                ResourceKind::Dynamic(script) => {
                    self.serve_script(request, &script, query.as_deref(), id)
                        .await
                }
                ResourceKind::NotFound if path.ends_with('/') => {
                    match self.try_index(request, &path, query.as_deref(), id).await {
                        Some(response) => response,
                        None => self.list_dir(&path, id).await,
                    }
                }
                ResourceKind::NotFound => {
                    warn!("[ID{}]请求的路径：{} 不存在，返回404", id, path);
                    Response::from_exception(Exception::FileNotFound)
                }
            },
            HttpRequestMethod::Post => match kind {
                ResourceKind::Static(_) => {
                    warn!("[ID{}]静态资源{}不支持POST，返回405", id, path);
                    let mut response = Response::from_status_code(HttpStatus::MethodNotAllowed);
                    response.set_raw("Allow", "GET");
                    response
                }
                ResourceKind::Dynamic(_) => {
                    warn!("[ID{}]动态资源暂不支持POST，返回501", id);
                    Response::from_status_code(HttpStatus::NotImplemented)
                }
                ResourceKind::NotFound => {
                    warn!("[ID{}]请求的路径：{} 不存在，返回404", id, path);
                    Response::from_exception(Exception::FileNotFound)
                }
            },
            HttpRequestMethod::Other(method) => {
                warn!("[ID{}]不支持的请求方法{}，返回501", id, method);
                Response::from_status_code(HttpStatus::NotImplemented)
            }
        }
    }

    /// 目录请求的首页回退。候选文件只解析一次，不会再次进入目录处理。
    async fn try_index(
        &self,
        request: &Request,
        dir: &str,
        query: Option<&str>,
        id: u128,
    ) -> Option<Response> {
        for name in INDEX_FILES {
            let candidate = [dir, name].concat();
            match self.resolver.resolve(&candidate) {
                ResourceKind::Static(file) => {
                    debug!("[ID{}]使用首页{}", id, candidate);
                    return Some(self.serve_static(request, &file, id).await);
                }
                ResourceKind::Dynamic(script) => {
                    debug!("[ID{}]使用首页脚本{}", id, candidate);
                    return Some(self.serve_script(request, &script, query, id).await);
                }
                ResourceKind::NotFound => continue,
            }
        }
        None
    }

    async fn serve_static(&self, request: &Request, file: &Path, id: u128) -> Response {
        let total = match fs::metadata(file).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                error!("[ID{}]无法读取文件{}的元数据: {}", id, file.display(), e);
                return Response::from_exception(Exception::FileUnreadable);
            }
        };
        let mime = get_mime(file);

        let range = match request.range() {
            Some(r) => r,
            None => {
                return match fs::read(file).await {
                    Ok(content) => {
                        let mut response = Response::new();
                        response
                            .set_raw("Accept-Ranges", "bytes")
                            .set_content(content, mime);
                        response
                    }
                    Err(e) => {
                        error!("[ID{}]读取文件{}失败: {}", id, file.display(), e);
                        Response::from_exception(Exception::FileUnreadable)
                    }
                };
            }
        };

        let window = match range::compute(range, total) {
            Ok(w) => w,
            Err(e) => {
                warn!("[ID{}]无法满足的Range：{}（{}），返回416", id, range, e);
                let mut response = Response::from_exception(e);
                response.set_raw("Content-Range", &format!("bytes */{}", total));
                return response;
            }
        };
        debug!(
            "[ID{}]Range窗口：起始{}，长度{}",
            id,
            window.begin_at(),
            window.length()
        );

        match read_window(file, &window).await {
            Ok(content) => {
                let status = match window.is_full(total) {
                    true => HttpStatus::Ok,
                    false => HttpStatus::PartialContent,
                };
                let mut response = Response::new();
                response
                    .set_code(status)
                    .set_raw("Accept-Ranges", "bytes")
                    .set_raw("Content-Range", &window.content_range(total))
                    .set_content(content, mime);
                response
            }
            Err(e) => {
                error!("[ID{}]读取文件{}的指定范围失败: {}", id, file.display(), e);
                Response::from_exception(Exception::FileUnreadable)
            }
        }
    }

    async fn serve_script(
        &self,
        request: &Request,
        script: &Path,
        query: Option<&str>,
        id: u128,
    ) -> Response {
        let input = script_input(request, query);
        let engine = Arc::clone(&self.engine);
        let source = script.to_path_buf();
        debug!("[ID{}]执行脚本{}", id, source.display());

        // 解释器进程是阻塞调用，放到专门的阻塞线程中执行
        let output = match tokio::task::spawn_blocking(move || engine.execute(&source, &input)).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("[ID{}]脚本{}执行失败: {}", id, script.display(), e);
                return Response::from_exception(e);
            }
            Err(e) => {
                error!("[ID{}]脚本任务异常退出: {}", id, e);
                return Response::from_exception(Exception::ScriptExecuteFailed);
            }
        };

        let mut response = Response::new();
        for (name, value) in output.headers.iter() {
            response.set_raw(name, value);
        }
        if !response.headers().contains_ignore_case("Content-Type") {
            response.set_raw("Content-Type", SCRIPT_CONTENT_TYPE);
        }
        response.set_content_raw(output.body);
        response
    }

    async fn list_dir(&self, path: &str, id: u128) -> Response {
        let dir = self.resolver.real_path(path);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) => {
                warn!("[ID{}]目录{}不可用（{}），返回404", id, dir.display(), e);
                return Response::from_exception(Exception::FileNotFound);
            }
        };

        let mut entries = Vec::new();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("[ID{}]遍历目录{}失败: {}", id, dir.display(), e);
                    return Response::from_exception(Exception::FileUnreadable);
                }
            };
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!("[ID{}]跳过无法访问的目录项{:?}: {}", id, entry.file_name(), e);
                    continue;
                }
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        debug!("[ID{}]目录{}共有{}项", id, dir.display(), entries.len());

        let html = HtmlBuilder::from_dir(path, &mut entries).build();
        let mut response = Response::new();
        response.set_content(html, LISTING_CONTENT_TYPE);
        response
    }
}

/// 组装脚本的 `request` 表：全部标头，再加上保留键。保留键与标头重名时以保留键为准。
fn script_input(request: &Request, query: Option<&str>) -> ScriptRecord {
    let mut input = ScriptRecord::new();
    for (name, value) in request.headers().iter() {
        input.insert(name.to_string(), value.to_string());
    }
    input.insert("http_version".to_string(), request.version().to_string());
    input.insert("request_method".to_string(), request.method().to_string());
    if let Some(query) = query {
        input.insert("query_string".to_string(), query.to_string());
    }
    input
}

async fn read_window(file: &Path, window: &RangeWindow) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(file).await?;
    file.seek(SeekFrom::Start(window.begin_at())).await?;
    let mut content = Vec::with_capacity(window.length() as usize);
    file.take(window.length()).read_to_end(&mut content).await?;
    if content.len() as u64 != window.length() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "文件在读取过程中被截断",
        ));
    }
    Ok(content)
}
