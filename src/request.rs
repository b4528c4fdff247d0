// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将行读取器收集到的原始标头块解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）按前两个空格拆分为方法、路径、版本。
//! 2. 每个标头行在第一个冒号处拆分，值只去掉开头的空格。
//! 3. 重复的字段名以最后一次出现为准。
//!
//! 解析过程不接触文件系统，也不调用脚本引擎。

use crate::{
    exception::Exception,
    header::HeaderFields,
    param::{HttpRequestMethod, CRLF, HEADER_TERMINATOR},
};
use log::error;

/// 表示一个完整的 HTTP 请求元数据。
///
/// 服务器从不读取请求体，因此这里只有标头部分。解析完成后不可变。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法，大小写敏感
    method: HttpRequestMethod,
    /// 请求的资源路径（未解码，可能带有查询字符串）
    path: String,
    /// 协议版本字符串，例如 `HTTP/1.1`
    version: String,
    /// 全部标头字段
    headers: HeaderFields,
}

impl Request {
    /// 从原始标头块构建 `Request`。
    ///
    /// `buffer` 应当以 `\r\n\r\n` 结尾；结束标记之后的内容会被忽略。
    ///
    /// # 错误处理
    /// - 非 UTF-8 字节：[`Exception::RequestIsNotUtf8`]
    /// - 请求行少于两个空格：[`Exception::MalformedFirstLine`]
    /// - 任一标头行缺少冒号：[`Exception::MalformedFieldLine`]，整个请求作废
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let header_part = match request_string.find(HEADER_TERMINATOR) {
            Some(end) => &request_string[..end],
            None => request_string.strip_suffix(CRLF).unwrap_or(request_string),
        };
        let mut lines = header_part.split(CRLF);

        let first_line = lines.next().unwrap_or("");
        let mut parts = first_line.splitn(3, ' ');
        let (method, path, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(path), Some(version)) => (method, path, version),
            _ => {
                error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
                return Err(Exception::MalformedFirstLine);
            }
        };

        let mut headers = HeaderFields::new();
        for line in lines {
            match line.split_once(':') {
                Some((name, value)) => headers.set(name, value.trim_start_matches(' ')),
                None => {
                    error!("[ID{}]HTTP标头行格式不正确：{}", id, line);
                    return Err(Exception::MalformedFieldLine);
                }
            }
        }

        Ok(Self {
            method: HttpRequestMethod::from(method),
            path: path.to_string(),
            version: version.to_string(),
            headers,
        })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取协议版本字符串
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 获取请求路径（含查询参数，未解码）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取请求方法
    pub fn method(&self) -> &HttpRequestMethod {
        &self.method
    }

    /// 获取全部标头
    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    /// 按字段名精确获取标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// 获取用户代理字符串，没有时为空串
    pub fn user_agent(&self) -> &str {
        self.headers.get_ignore_case("User-Agent").unwrap_or("")
    }

    /// 获取 Range 标头的原始值
    pub fn range(&self) -> Option<&str> {
        self.headers.get_ignore_case("Range")
    }
}
