// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Web 服务器协议参数与常量模块
//!
//! 该模块定义了服务器遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 服务器会发出的状态码及其原因短语（Reason Phrase）。
//! - 文件后缀名到 MIME 类型的映射表。
//! - HTTP 方法、版本的强类型枚举。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "naive-webserver";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 标头块的结束标记：一个空行
pub const HEADER_TERMINATOR: &str = "\r\n\r\n";

/// 脚本输出记录中作为响应体的保留键
pub const SCRIPT_OUTPUT_KEY: &str = "output";

/// 脚本未指定 `Content-Type` 时使用的类型
pub const SCRIPT_CONTENT_TYPE: &str = "text/html;charset=utf-8";

/// 目录下依次尝试的首页文件
pub const INDEX_FILES: [&str; 2] = ["index.html", "index.lua"];

lazy_static! {
    /// 文件后缀名到 MIME 类型（Media Type）的映射表。
    ///
    /// 用于设置响应头中的 `Content-Type` 字段。未收录的后缀统一按二进制流处理。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("apk", "application/vnd.android.package-archive");
        map.insert("bmp", "image/bmp");
        map.insert("css", "text/css;charset=utf-8");
        map.insert("csv", "text/csv");
        map.insert("doc", "application/msword");
        map.insert("exe", "application/x-msdownload");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html;charset=utf-8");
        map.insert("html", "text/html;charset=utf-8");
        map.insert("ico", "image/x-icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript;charset=utf-8");
        map.insert("json", "application/json");
        map.insert("lua", "text/x-lua");
        map.insert("mkv", "video/x-matroska");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("mpg", "video/mpeg");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("rmvb", "application/vnd.rn-realmedia-vbr");
        map.insert("svg", "image/svg+xml");
        map.insert("swf", "application/x-shockwave-flash");
        map.insert("tar", "application/x-tar");
        map.insert("torrent", "application/x-bittorrent");
        map.insert("txt", "text/plain");
        map.insert("wasm", "application/wasm");
        map.insert("webm", "video/webm");
        map.insert("webp", "image/webp");
        map.insert("xhtml", "application/xhtml+xml");
        map.insert("xml", "text/xml");
        map.insert("zip", "application/zip");
        map
    };
}

/// 响应状态行使用的协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

impl HttpVersion {
    /// 根据请求中的版本字符串选择响应版本，未知版本一律按 HTTP/1.1 回复。
    pub fn from_token(token: &str) -> Self {
        match token {
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => HttpVersion::V1_1,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

/// HTTP 请求方法
///
/// 方法名大小写敏感：只有精确的 `GET` 与 `POST` 会被识别，其余一律保留原文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 提交数据（动态资源上尚未实现）
    Post,
    /// 其它任何方法，保留收到的原始字符串
    Other(String),
}

impl From<&str> for HttpRequestMethod {
    fn from(token: &str) -> Self {
        match token {
            "GET" => HttpRequestMethod::Get,
            "POST" => HttpRequestMethod::Post,
            other => HttpRequestMethod::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Other(m) => write!(f, "{}", m),
        }
    }
}

/// 服务器会发出的全部状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok,
    PartialContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    RangeNotSatisfiable,
    InternalServerError,
    NotImplemented,
}

impl HttpStatus {
    pub fn code(&self) -> u16 {
        match self {
            HttpStatus::Ok => 200,
            HttpStatus::PartialContent => 206,
            HttpStatus::BadRequest => 400,
            HttpStatus::NotFound => 404,
            HttpStatus::MethodNotAllowed => 405,
            HttpStatus::RangeNotSatisfiable => 416,
            HttpStatus::InternalServerError => 500,
            HttpStatus::NotImplemented => 501,
        }
    }

    /// 标准原因短语，参考 RFC 9110。
    pub fn reason(&self) -> &'static str {
        match self {
            HttpStatus::Ok => "OK",
            HttpStatus::PartialContent => "Partial Content",
            HttpStatus::BadRequest => "Bad Request",
            HttpStatus::NotFound => "Not Found",
            HttpStatus::MethodNotAllowed => "Method Not Allowed",
            HttpStatus::RangeNotSatisfiable => "Range Not Satisfiable",
            HttpStatus::InternalServerError => "Internal Server Error",
            HttpStatus::NotImplemented => "Not Implemented",
        }
    }

    /// 从数字状态码还原，集合之外的状态码返回 `None`。
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(HttpStatus::Ok),
            206 => Some(HttpStatus::PartialContent),
            400 => Some(HttpStatus::BadRequest),
            404 => Some(HttpStatus::NotFound),
            405 => Some(HttpStatus::MethodNotAllowed),
            416 => Some(HttpStatus::RangeNotSatisfiable),
            500 => Some(HttpStatus::InternalServerError),
            501 => Some(HttpStatus::NotImplemented),
            _ => None,
        }
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_is_case_sensitive() {
        assert_eq!(HttpRequestMethod::from("GET"), HttpRequestMethod::Get);
        assert_eq!(HttpRequestMethod::from("POST"), HttpRequestMethod::Post);
        assert_eq!(
            HttpRequestMethod::from("get"),
            HttpRequestMethod::Other("get".to_string())
        );
        assert_eq!(HttpRequestMethod::from("get").to_string(), "get");
    }

    #[test]
    fn test_status_code_roundtrip() {
        for code in [200, 206, 400, 404, 405, 416, 500, 501] {
            let status = HttpStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert!(HttpStatus::from_code(302).is_none());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(HttpStatus::RangeNotSatisfiable.to_string(), "416 Range Not Satisfiable");
    }

    #[test]
    fn test_version_from_token() {
        assert_eq!(HttpVersion::from_token("HTTP/1.0"), HttpVersion::V1_0);
        assert_eq!(HttpVersion::from_token("HTTP/1.1"), HttpVersion::V1_1);
        assert_eq!(HttpVersion::from_token("HTTP/9"), HttpVersion::V1_1);
        assert_eq!(HttpVersion::V1_0.to_string(), "HTTP/1.0");
    }
}
