// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{
    exception::Exception,
    header::HeaderFields,
    param::*,
    util::HtmlBuilder,
};

use bytes::Bytes;
use chrono::prelude::*;
use log::{debug, error, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "Content-Length";
const CONTENT_TYPE: &str = "Content-Type";
const CONNECTION: &str = "Connection";

/// 一次请求对应的响应。
///
/// 标头按设置顺序序列化；`Content-Length` 由正文长度决定，不能通过 `set_raw` 修改。
/// 每个响应只序列化一次，随后被丢弃。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status: HttpStatus,
    headers: HeaderFields,
    content: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        let mut headers = HeaderFields::new();
        headers.set("Date", &format_date(&Utc::now()));
        headers.set("Server", SERVER_NAME);
        headers.set(CONTENT_LENGTH, "0");
        Self {
            version: HttpVersion::V1_1,
            status: HttpStatus::Ok,
            headers,
            content: Bytes::new(),
        }
    }

    /// 带有简单 HTML 说明页面的错误响应
    pub fn from_status_code(status: HttpStatus) -> Self {
        let content = match status {
            HttpStatus::NotFound => HtmlBuilder::from_status_code(
                status,
                Some(r"<h2>噢！</h2><p>你指定的网页无法找到。</p>"),
            ),
            HttpStatus::MethodNotAllowed => HtmlBuilder::from_status_code(
                status,
                Some(r"<h2>噢！</h2><p>静态资源只支持GET方法。</p>"),
            ),
            HttpStatus::InternalServerError => HtmlBuilder::from_status_code(
                status,
                Some(r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"),
            ),
            _ => HtmlBuilder::from_status_code(status, None),
        }
        .build();
        let mut response = Self::new();
        response
            .set_code(status)
            .set_content(content.into_bytes(), "text/html;charset=utf-8");
        response
    }

    /// 按异常对应的状态码构建错误响应，没有状态码的异常按 500 处理
    pub fn from_exception(e: Exception) -> Self {
        let status = e
            .status_code()
            .and_then(HttpStatus::from_code)
            .unwrap_or(HttpStatus::InternalServerError);
        Self::from_status_code(status)
    }

    pub fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    pub fn set_code(&mut self, status: HttpStatus) -> &mut Self {
        self.status = status;
        self
    }

    /// 设置任意标头字段。`Content-Length` 由正文决定，这里会被忽略。
    pub fn set_raw(&mut self, name: &str, value: &str) -> &mut Self {
        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            warn!("忽略对{}的直接设置：{}", name, value);
            return self;
        }
        self.headers.set(name, value);
        self
    }

    /// 设置正文及其类型，同时更新 `Content-Length`
    pub fn set_content(&mut self, content: impl Into<Bytes>, content_type: &str) -> &mut Self {
        self.headers.set(CONTENT_TYPE, content_type);
        self.set_content_raw(content)
    }

    /// 只设置正文，不改动 `Content-Type`
    pub fn set_content_raw(&mut self, content: impl Into<Bytes>) -> &mut Self {
        self.content = content.into();
        self.headers
            .set(CONTENT_LENGTH, &self.content.len().to_string());
        self
    }

    /// 序列化为线路格式：状态行、按设置顺序排列的标头、空行、原样的正文。
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version,
            self.status.code(),
            self.status.reason(),
            CRLF
        );
        for (name, value) in self.headers.iter() {
            header.push_str(&[name, ": ", value, CRLF].concat());
        }
        header.push_str(CRLF);
        [header.as_bytes(), &self.content[..]].concat()
    }

    /// 强制加上 `Connection: close` 后把完整响应写入流。
    ///
    /// 写入失败不会重试，调用方应当直接放弃该连接。
    pub async fn send_to<W>(&mut self, stream: &mut W, id: u128) -> Result<(), Exception>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.headers.remove_ignore_case(CONNECTION);
        self.headers.set(CONNECTION, "close");
        let response_bytes = self.as_bytes();
        debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());

        if let Err(e) = stream.write_all(&response_bytes).await {
            error!("[ID{}]发送响应失败: {}", id, e);
            return Err(Exception::WriteFailed);
        }
        if let Err(e) = stream.flush().await {
            error!("[ID{}]刷新响应失败: {}", id, e);
            return Err(Exception::WriteFailed);
        }
        Ok(())
    }
}

impl Response {
    pub fn status(&self) -> HttpStatus {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.code()
    }

    pub fn information(&self) -> &str {
        self.status.reason()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn get_content_length(&self) -> u64 {
        self.content.len() as u64
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

/// 按扩展名推断 MIME 类型，未知类型按二进制流处理
pub fn get_mime(path: &std::path::Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| MIME_TYPES.get(e.to_ascii_lowercase().as_str()).copied())
        .unwrap_or("application/octet-stream")
}
