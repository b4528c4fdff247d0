// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::{exception::Exception, param::HttpStatus};

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

/// 目录列表中的一项，由调用方从文件系统收集
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl HtmlBuilder {
    pub fn from_status_code(status: HttpStatus, note: Option<&str>) -> Self {
        let title = format!("{}", status.code());
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = note.unwrap_or(status.reason());
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            status.code(),
            description
        );
        Self { title, css, body }
    }

    /// 生成目录列表页面。链接经过 URL 编码，显示的文件名经过 HTML 转义。
    pub fn from_dir(path: &str, entries: &mut Vec<DirEntryInfo>) -> Self {
        let mut body = String::new();
        sort_dir_entries(entries);

        let escaped_path = html_escape(path);
        body.push_str(&format!("<h1>Index of {}</h1><hr>", escaped_path));
        body.push_str("<table>");
        body.push_str(
            r#"
            <tr>
                <td>Name</td>
                <td>Size</td>
                <td>Last modified</td>
            </tr>
            <tr>
                <td><a href="../">..</a></td>
                <td></td>
                <td></td>
            </tr>
            "#,
        );
        for entry in entries.iter() {
            let formatted_time = match entry.modified {
                Some(time) => {
                    let local_time: DateTime<Local> = time.into();
                    local_time.format("%Y-%m-%d %H:%M:%S %Z").to_string()
                }
                None => "-".to_string(),
            };
            let mut href = url_encode(&entry.name);
            let mut text = html_escape(&entry.name);
            let size = if entry.is_dir {
                href.push('/');
                text.push('/');
                "-".to_string()
            } else {
                format_file_size(entry.size)
            };
            body.push_str(&format!(
                r#"
                <tr>
                    <td><a href='{}'>{}</a></td>
                    <td>{}</td>
                    <td>{}</td>
                </tr>
                "#,
                href, text, size, formatted_time
            ));
        }
        body.push_str("</table>");
        let title = format!("Index of {}", escaped_path);
        let css = r"
            table {
                border-collapse: collapse;
                width: 100%;
            }

            td {
                padding: 8px;
                white-space: pre-wrap;
                border: none;
            }"
        .to_string();
        HtmlBuilder { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
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

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

// 目录在前，其余按名称排序
fn sort_dir_entries(entries: &mut [DirEntryInfo]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' | b','
        )
}

/// 百分号编码，未保留字符原样输出，其余字节编码为 `%XX`。
pub fn url_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for &byte in input.as_bytes() {
        if is_unreserved(byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// 百分号解码。`%` 后面不是两位十六进制数，或解码结果不是 UTF-8 时返回错误。
pub fn url_decode(input: &str) -> Result<String, Exception> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let high = bytes.get(i + 1).and_then(|b| hex_value(*b));
            let low = bytes.get(i + 2).and_then(|b| hex_value(*b));
            match (high, low) {
                (Some(h), Some(l)) => decoded.push(h * 16 + l),
                _ => return Err(Exception::InvalidPath),
            }
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| Exception::InvalidPath)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// 将原始请求路径拆分为解码后的路径与原始查询字符串。
///
/// 解码后的路径必须以 `/` 开头，且任何一段都不能是 `..`。
pub fn split_path(raw: &str) -> Result<(String, Option<String>), Exception> {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (raw, None),
    };
    let decoded = url_decode(path)?;
    if !decoded.starts_with('/') || decoded.split('/').any(|segment| segment == "..") {
        return Err(Exception::InvalidPath);
    }
    Ok((decoded, query))
}

pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> DirEntryInfo {
        DirEntryInfo {
            name: name.to_string(),
            is_dir,
            size: 2048,
            modified: Some(SystemTime::now()),
        }
    }

    #[test]
    fn test_file_size() {
        assert_eq!(format_file_size(9926), "9.7 KB".to_string());
        assert_eq!(format_file_size(51800), "50.6 KB".to_string());
    }

    #[test]
    fn test_format_file_size_edge_cases() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1024 - 1), "1023.0 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1099511627776), "1.0 TB");
    }

    #[test]
    fn test_html_builder_from_status_code() {
        let html = HtmlBuilder::from_status_code(HttpStatus::NotFound, Some("测试404")).build();
        assert!(html.contains("404"));
        assert!(html.contains("测试404"));
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("</html>"));
    }

    #[test]
    fn test_html_builder_from_status_code_no_note() {
        let html = HtmlBuilder::from_status_code(HttpStatus::NotImplemented, None).build();
        assert!(html.contains("501"));
        assert!(html.contains("Not Implemented"));
    }

    #[test]
    fn test_sort_dir_entries() {
        let mut entries = vec![entry("b.txt", false), entry("z", true), entry("a.txt", false)];
        sort_dir_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_dir_listing_links_encoded() {
        let mut entries = vec![entry("my file.txt", false), entry("sub dir", true)];
        let html = HtmlBuilder::from_dir("/", &mut entries).build();

        assert!(html.contains("<a href='my%20file.txt'>my file.txt</a>"));
        assert!(html.contains("<a href='sub%20dir/'>sub dir/</a>"));
        assert!(html.contains("2.0 KB"));
    }

    #[test]
    fn test_dir_listing_escapes_names() {
        let mut entries = vec![entry("<b>.txt", false)];
        let html = HtmlBuilder::from_dir("/", &mut entries).build();

        assert!(html.contains("&lt;b&gt;.txt"));
        assert!(html.contains("%3Cb%3E.txt"));
        assert!(!html.contains("<b>.txt"));
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("abc-_.!~*'(),"), "abc-_.!~*'(),");
        assert_eq!(url_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(url_encode("中"), "%E4%B8%AD");
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a%20b").unwrap(), "a b");
        assert_eq!(url_decode("%E4%b8%AD").unwrap(), "中");
        assert_eq!(url_decode("plain").unwrap(), "plain");
    }

    #[test]
    fn test_url_decode_invalid() {
        assert_eq!(url_decode("%2"), Err(Exception::InvalidPath));
        assert_eq!(url_decode("%zz"), Err(Exception::InvalidPath));
        assert_eq!(url_decode("%FF"), Err(Exception::InvalidPath));
    }

    #[test]
    fn test_url_encode_decode_inverse() {
        for name in ["报告 2024.pdf", "a&b=c", "100%"] {
            assert_eq!(url_decode(&url_encode(name)).unwrap(), name);
        }
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/a%20b.html?x=1&y=2").unwrap(),
            ("/a b.html".to_string(), Some("x=1&y=2".to_string()))
        );
        assert_eq!(split_path("/").unwrap(), ("/".to_string(), None));
    }

    #[test]
    fn test_split_path_rejects_traversal() {
        assert_eq!(split_path("/../etc/passwd"), Err(Exception::InvalidPath));
        assert_eq!(split_path("/a/%2E%2E/b"), Err(Exception::InvalidPath));
        assert_eq!(split_path("relative"), Err(Exception::InvalidPath));
        assert!(split_path("/a..b").is_ok());
    }
}
