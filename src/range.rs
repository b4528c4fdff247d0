// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 范围请求计算
//!
//! 把 `Range` 标头的值与资源总长度换算成一个字节窗口 `(起始偏移, 长度)`。
//! 支持三种写法：`bytes=A-B`、`bytes=A-`、`bytes=-B`。不支持多段范围。
//!
//! 计算得到的窗口必须落在 `[0, total)` 之内且长度为正，否则一律视为
//! [`Exception::InvalidRange`]，包括 `bytes=-0` 这种零长度窗口。

use crate::exception::Exception;

const BYTES_UNIT: &str = "bytes=";

/// 一段可以直接从文件中截取的字节窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    begin_at: u64,
    length: u64,
}

impl RangeWindow {
    pub fn begin_at(&self) -> u64 {
        self.begin_at
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// 最后一个字节的偏移（闭区间）
    pub fn end_at(&self) -> u64 {
        self.begin_at + self.length - 1
    }

    /// 窗口覆盖整个资源时应当返回 200 而不是 206
    pub fn is_full(&self, total: u64) -> bool {
        self.length == total
    }

    /// `Content-Range` 标头的值，例如 `bytes 0-99/1000`
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.begin_at, self.end_at(), total)
    }
}

/// 根据 `Range` 标头计算字节窗口。
pub fn compute(range: &str, total: u64) -> Result<RangeWindow, Exception> {
    let window = match range.find(BYTES_UNIT) {
        Some(index) => &range[index + BYTES_UNIT.len()..],
        None => return Err(Exception::NoBytesUnit),
    };
    let (begin_part, end_part) = window.split_once('-').ok_or(Exception::InvalidRange)?;

    let begin = parse_bound(begin_part)?;
    let end = parse_bound(end_part)?;
    let total = total as i128;

    let (begin_at, length) = match (begin, end) {
        (None, None) => return Err(Exception::InvalidRange),
        // bytes=-B
        (None, Some(suffix)) => (total - suffix, suffix),
        // bytes=A-
        (Some(begin), None) => (begin, total - begin),
        // bytes=A-B
        (Some(begin), Some(end)) => (begin, (total - begin).min(end - begin + 1)),
    };

    if begin_at < 0 || length <= 0 || begin_at + length > total {
        return Err(Exception::InvalidRange);
    }
    Ok(RangeWindow {
        begin_at: begin_at as u64,
        length: length as u64,
    })
}

/// 解析区间的一端，空串表示该端缺省。
fn parse_bound(part: &str) -> Result<Option<i128>, Exception> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }
    match part.parse::<u64>() {
        Ok(value) => Ok(Some(value as i128)),
        Err(_) => Err(Exception::InvalidRange),
    }
}
