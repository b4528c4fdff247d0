// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 行读取器
//!
//! 从字节流中逐字节读取以 CRLF 结尾的行，不做任何预读，
//! 因此不会越过标头与正文之间的边界。该模块对 HTTP 语义一无所知，
//! 仅有 [`recv_header`] 知道“空行结束标头块”这一约定。
//!
//! 本层不设超时，读取阻塞多久完全取决于底层传输。

use crate::{exception::Exception, param::HEADER_TERMINATOR};

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

/// 读取下一行，返回的字节包含结尾的 CRLF。
///
/// `limit` 是单行允许的最大字节数，超出时返回 [`Exception::LineTooLong`]。
pub async fn read_line<R>(stream: &mut R, limit: usize) -> Result<Vec<u8>, Exception>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut line = Vec::new();
    read_line_into(stream, &mut line, limit).await?;
    Ok(line)
}

/// 将下一行追加到 `buf` 末尾，返回本行的长度。
///
/// 出错时已经读到的字节仍保留在 `buf` 中，调用方据此判断是否“收到过内容”。
/// `limit` 约束的是 `buf` 的总长度。
pub async fn read_line_into<R>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> Result<usize, Exception>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let start = buf.len();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte).await {
            Ok(0) => return Err(Exception::StreamClosed),
            Ok(_) => {}
            Err(e) => {
                debug!("读取字节流时遇到错误: {}", e);
                return Err(Exception::StreamError);
            }
        }
        buf.push(byte[0]);
        if buf[start..].ends_with(b"\r\n") {
            return Ok(buf.len() - start);
        }
        if buf.len() >= limit {
            return Err(Exception::LineTooLong);
        }
    }
}

/// 持续读取行，直到缓冲区中出现空行结束标记 `\r\n\r\n`。
///
/// 每行都止于其第一个 CRLF，所以结束标记只可能出现在缓冲区末尾。
pub async fn recv_header<R>(stream: &mut R, raw: &mut Vec<u8>, limit: usize) -> Result<(), Exception>
where
    R: AsyncRead + Unpin + ?Sized,
{
    loop {
        read_line_into(stream, raw, limit).await?;
        if raw.ends_with(HEADER_TERMINATOR.as_bytes()) {
            return Ok(());
        }
    }
}
