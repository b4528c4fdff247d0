// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 Web 服务器在请求处理生命周期中可能抛出的各类异常情况。
//!
//! ## 分类
//! - **传输错误**：读写 Socket 失败，连接直接放弃，不会重试。
//! - **请求格式错误**：请求行或标头行非法，能安全响应时返回 `400`。
//! - **资源错误**：文件已解析为静态资源却无法读取，返回 `500`。
//! - **范围错误**：Range 请求非法或无法满足，返回 `416`。
//! - **脚本错误**：Lua 脚本加载、执行失败或输出无法解析，返回 `500`。
//! - **工作池错误**：工作池已关闭或排队已满，连接被丢弃。

use std::fmt;

/// 服务器处理请求过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回。底层的 `io::Error` 细节在出错处记录日志，
/// 这里只保留语义分类，因此它可以被自由复制。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 在读到 CRLF 之前对端关闭了连接。
    StreamClosed,
    /// 读取 Socket 时发生传输层错误。
    StreamError,
    /// 写出响应时发生传输层错误。
    WriteFailed,
    /// 单行或整个标头块超过了配置的上限。
    LineTooLong,
    /// 请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行中的空格少于两个。
    MalformedFirstLine,
    /// 某个标头行中没有冒号。
    MalformedFieldLine,
    /// 请求路径的百分号编码非法，或包含越权的 `..` 片段。
    InvalidPath,
    /// Range 标头中没有 `bytes=` 单位。
    NoBytesUnit,
    /// Range 标头的区间非法或无法满足。
    InvalidRange,
    /// 资源不存在。
    FileNotFound,
    /// 资源存在但无法读取。
    FileUnreadable,
    /// 无法启动 Lua 解释器。
    ScriptExecuteFailed,
    /// Lua 脚本运行时出错。
    ScriptCodeError,
    /// Lua 脚本的输出无法解析为响应记录。
    ScriptOutputMalformed,
    /// 工作池已经关闭，不再接收新的连接。
    PoolShutdown,
    /// 工作池与排队区均已占满，连接被拒绝。
    PoolSaturated,
}

use Exception::*;

impl Exception {
    /// 将异常映射到应当返回给客户端的 HTTP 状态码。
    ///
    /// 返回 `None` 表示连接已经不可用，只能直接关闭。
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StreamError | WriteFailed | PoolShutdown | PoolSaturated => None,
            StreamClosed | LineTooLong | RequestIsNotUtf8 | MalformedFirstLine
            | MalformedFieldLine | InvalidPath => Some(400),
            FileNotFound => Some(404),
            NoBytesUnit | InvalidRange => Some(416),
            FileUnreadable | ScriptExecuteFailed | ScriptCodeError | ScriptOutputMalformed => {
                Some(500)
            }
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamClosed => write!(f, "Stream closed before a complete line was received"),
            StreamError => write!(f, "Failed to read from stream"),
            WriteFailed => write!(f, "Failed to write to stream"),
            LineTooLong => write!(f, "Request header is too large"),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedFirstLine => write!(f, "Malformed request line"),
            MalformedFieldLine => write!(f, "Malformed header field line"),
            InvalidPath => write!(f, "Invalid path (400)"),
            NoBytesUnit => write!(f, "Range header has no bytes unit"),
            InvalidRange => write!(f, "Range not satisfiable (416)"),
            FileNotFound => write!(f, "File not found (404)"),
            FileUnreadable => write!(f, "File is not readable (500)"),
            ScriptExecuteFailed => write!(f, "Couldn't invoke Lua interpreter"),
            ScriptCodeError => write!(f, "An error happened in lua code"),
            ScriptOutputMalformed => write!(f, "Lua script produced a malformed response record"),
            PoolShutdown => write!(f, "Worker pool is shutting down"),
            PoolSaturated => write!(f, "Worker pool and its backlog are saturated"),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_have_no_status() {
        assert_eq!(StreamError.status_code(), None);
        assert_eq!(WriteFailed.status_code(), None);
        assert_eq!(PoolSaturated.status_code(), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(MalformedFirstLine.status_code(), Some(400));
        assert_eq!(MalformedFieldLine.status_code(), Some(400));
        assert_eq!(InvalidRange.status_code(), Some(416));
        assert_eq!(NoBytesUnit.status_code(), Some(416));
        assert_eq!(ScriptCodeError.status_code(), Some(500));
        assert_eq!(FileNotFound.status_code(), Some(404));
    }
}
